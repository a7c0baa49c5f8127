//! 채널 kind별 동작 정의

use std::time::Duration;

use chanprobe_core::config::MemoryKindConfig;

/// 인메모리 채널 kind 하나의 동작
///
/// 하네스는 kind에 따라 분기하지 않으므로, kind 간 차이는 모두 여기서 표현합니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelBehavior {
    /// 채널이 생성되는 API 버전
    pub native_api_version: String,
    /// 구독이 참조할 수 있는 API 버전
    pub served_versions: Vec<String>,
    /// 생성 후 ready 되기까지의 시간 (`None`이면 ready 되지 않음)
    pub ready_after: Option<Duration>,
    /// 이벤트 하나당 구독자에게 전달하는 사본 수
    pub copies: u32,
    /// 발행 후 구독자 출력에 나타나기까지의 지연
    pub delivery_delay: Duration,
}

impl ChannelBehavior {
    /// 즉시 ready 되고 한 번씩 전달하는 동작. native 버전만 제공합니다.
    pub fn new(native_api_version: impl Into<String>) -> Self {
        let native_api_version = native_api_version.into();
        Self {
            served_versions: vec![native_api_version.clone()],
            native_api_version,
            ready_after: Some(Duration::ZERO),
            copies: 1,
            delivery_delay: Duration::ZERO,
        }
    }

    /// 추가로 제공할 API 버전
    pub fn serving(mut self, version: impl Into<String>) -> Self {
        let version = version.into();
        if !self.served_versions.contains(&version) {
            self.served_versions.push(version);
        }
        self
    }

    /// ready 되기까지의 시간
    pub fn ready_after(mut self, delay: Duration) -> Self {
        self.ready_after = Some(delay);
        self
    }

    /// 절대 ready 되지 않게 합니다.
    pub fn never_ready(mut self) -> Self {
        self.ready_after = None;
        self
    }

    /// 이벤트당 전달 사본 수 (0이면 유실, 2 이상이면 중복)
    pub fn copies(mut self, copies: u32) -> Self {
        self.copies = copies;
        self
    }

    /// 전달 지연
    pub fn delivery_delay(mut self, delay: Duration) -> Self {
        self.delivery_delay = delay;
        self
    }

    /// `version`으로 이 kind의 채널을 참조할 수 있는지 여부
    pub fn serves(&self, version: &str) -> bool {
        self.served_versions.iter().any(|v| v == version)
    }

    /// 생성 후 `elapsed`가 지났을 때 ready 여부
    pub fn is_ready_after(&self, elapsed: Duration) -> bool {
        self.ready_after.is_some_and(|delay| elapsed >= delay)
    }
}

impl From<&MemoryKindConfig> for ChannelBehavior {
    fn from(config: &MemoryKindConfig) -> Self {
        let behavior = config
            .served_versions
            .iter()
            .fold(Self::new(&config.native_api_version), |b, v| b.serving(v))
            .copies(config.copies)
            .delivery_delay(Duration::from_millis(config.delivery_delay_ms));
        if config.never_ready {
            behavior.never_ready()
        } else {
            behavior.ready_after(Duration::from_millis(config.ready_after_ms))
        }
    }
}
