//! 시간 추상화: readiness/전달 확인 폴링 루프에 주입됩니다.
//!
//! 폴링 루프는 `tokio::time`을 직접 호출하지 않고 [`Clock`]을 통해서만
//! 현재 시각을 읽고 대기합니다. 테스트는 [`ManualClock`]으로 가상 시간을 주입하여
//! 타임아웃과 백오프 정책을 실제 대기 없이 검증합니다.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

/// 폴링 루프가 사용하는 시계
pub trait Clock: Send + Sync + 'static {
    /// 현재 시각
    fn now(&self) -> Instant;

    /// 주어진 시간만큼 대기합니다.
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

/// tokio 런타임 시계 (기본값)
///
/// `#[tokio::test(start_paused = true)]` 환경에서는 tokio의 자동 시간 진행을 따릅니다.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// 로그 필드용 밀리초 값 (`u64` 범위를 넘으면 포화)
pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[derive(Debug)]
struct ManualState {
    elapsed: Duration,
    sleeps: Vec<Duration>,
}

/// 가상 시계
///
/// `sleep` 호출 시 실제로 대기하지 않고 내부 시각을 즉시 진행시키며,
/// 각 대기 시간을 기록합니다. 복제본은 같은 시각을 공유합니다.
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    state: Arc<Mutex<ManualState>>,
}

impl ManualClock {
    /// 현재 시각에서 시작하는 가상 시계를 생성합니다.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            state: Arc::new(Mutex::new(ManualState {
                elapsed: Duration::ZERO,
                sleeps: Vec::new(),
            })),
        }
    }

    /// 시계를 수동으로 진행시킵니다 (sleep 기록에는 남지 않음).
    pub fn advance(&self, duration: Duration) {
        let mut state = self.lock();
        state.elapsed += duration;
    }

    /// 생성 이후 진행된 가상 시간
    pub fn elapsed(&self) -> Duration {
        self.lock().elapsed
    }

    /// 지금까지 호출된 sleep 시간 목록
    pub fn sleeps(&self) -> Vec<Duration> {
        self.lock().sleeps.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.lock().elapsed
    }

    async fn sleep(&self, duration: Duration) {
        {
            let mut state = self.lock();
            state.elapsed += duration;
            state.sleeps.push(duration);
        }
        // 다른 태스크가 진행할 기회를 줍니다.
        tokio::task::yield_now().await;
    }
}
