//! readiness 대기: 시나리오 리소스가 모두 ready 될 때까지 폴링합니다.
//!
//! 전부 ready 되거나 최대 대기 시간이 지날 때까지 고정 간격으로
//! `Cluster::status`를 조회합니다. 일부만 ready인 상태는 성공이 아닙니다.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use chanprobe_core::cluster::Cluster;
use chanprobe_core::error::{ScenarioError, ScenarioStep};
use chanprobe_core::types::ResourceRef;

use crate::clock::{Clock, TokioClock, millis};

/// readiness 대기 정책
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessPolicy {
    /// 상태 폴링 간격
    pub poll_interval: Duration,
    /// 최대 대기 시간
    pub max_wait: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            max_wait: Duration::from_secs(120),
        }
    }
}

/// 모든 리소스가 ready 되었을 때의 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Readiness {
    /// 대기한 시간
    pub waited: Duration,
    /// 상태 조회 라운드 수
    pub polls: u32,
}

/// 리소스 ready 대기 장벽
pub struct ReadinessGate<C: Cluster, K: Clock = TokioClock> {
    cluster: Arc<C>,
    clock: Arc<K>,
    poll_interval: Duration,
}

impl<C: Cluster, K: Clock> ReadinessGate<C, K> {
    /// 새 readiness 게이트를 생성합니다.
    pub fn new(cluster: Arc<C>, clock: Arc<K>, poll_interval: Duration) -> Self {
        Self {
            cluster,
            clock,
            poll_interval,
        }
    }

    /// 모든 리소스가 ready 될 때까지 대기합니다.
    ///
    /// # Errors
    ///
    /// - `ScenarioError::ReadinessTimeout`: `max_wait` 안에 ready 되지 않은 리소스가 있음
    /// - `ScenarioError::Cancelled`: 대기 중 취소됨
    pub async fn wait_all(
        &self,
        resources: &[ResourceRef],
        max_wait: Duration,
        cancel: &CancellationToken,
    ) -> Result<Readiness, ScenarioError> {
        let start = self.clock.now();
        let mut pending: Vec<(ResourceRef, Option<String>)> =
            resources.iter().cloned().map(|r| (r, None)).collect();
        let mut polls = 0u32;

        loop {
            polls = polls.saturating_add(1);
            pending = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled()),
                still = self.poll_once(pending) => still,
            };

            let waited = self.clock.now().saturating_duration_since(start);
            if pending.is_empty() {
                debug!(polls, waited_ms = millis(waited), "all resources ready");
                return Ok(Readiness { waited, polls });
            }

            if waited >= max_wait {
                return Err(ScenarioError::ReadinessTimeout {
                    waited,
                    not_ready: pending.iter().map(describe).collect(),
                });
            }

            let nap = self.poll_interval.min(max_wait - waited);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled()),
                _ = self.clock.sleep(nap) => {}
            }
        }
    }

    async fn poll_once(
        &self,
        pending: Vec<(ResourceRef, Option<String>)>,
    ) -> Vec<(ResourceRef, Option<String>)> {
        let mut still = Vec::with_capacity(pending.len());
        for (resource, _) in pending {
            match self.cluster.status(&resource).await {
                Ok(status) if status.ready => {
                    debug!(resource = %resource, "resource ready");
                }
                Ok(status) => {
                    debug!(resource = %resource, reason = ?status.reason, "resource not ready");
                    still.push((resource, status.reason));
                }
                Err(e) => {
                    debug!(resource = %resource, error = %e, "status check failed");
                    still.push((resource, Some(e.to_string())));
                }
            }
        }
        still
    }
}

fn cancelled() -> ScenarioError {
    ScenarioError::Cancelled {
        step: ScenarioStep::Readiness,
    }
}

fn describe((resource, reason): &(ResourceRef, Option<String>)) -> String {
    match reason {
        Some(reason) => format!("{resource}: {reason}"),
        None => resource.to_string(),
    }
}
