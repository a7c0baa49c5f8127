//! 전달 확인: 구독자 출력에서 발행한 payload를 찾습니다.
//!
//! [`DeliveryVerifier::confirm`]은 구독자가 지금까지 남긴 출력 전체를 반복해서 읽고,
//! 기대한 payload가 한 번이라도 나타나면 성공합니다. 최소 한 번 전달(at-least-once)
//! 환경에서는 같은 payload가 여러 번 나타날 수 있으므로 중복은 실패가 아닙니다.
//!
//! # 예산
//!
//! 읽기 시도 횟수(`max_attempts`)와 경과 시간(`max_wait`) 중 먼저 소진되는 쪽에서
//! 멈춥니다. 예산이 소진되었을 때:
//!
//! - 한 번이라도 출력을 읽었다면 `matched = false` (채널의 전달 실패)
//! - 한 번도 읽지 못했다면 `ScenarioError::SubscriberUnreachable` (인프라 실패)

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use chanprobe_core::cluster::LogSource;
use chanprobe_core::error::{ScenarioError, ScenarioStep};
use chanprobe_core::metrics as m;
use chanprobe_core::types::ResourceRef;

use crate::clock::{Clock, TokioClock};

/// 실패 리포트에 남길 출력 끝부분의 최대 길이 (문자)
pub const SNIPPET_MAX_CHARS: usize = 256;

/// 폴링 간격 증가 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum DeliveryBackoff {
    /// 항상 같은 간격
    Fixed,
    /// 매 시도마다 두 배, `max_interval`에서 멈춤
    Exponential {
        /// 최대 간격
        max_interval: Duration,
    },
}

impl DeliveryBackoff {
    /// 현재 간격 다음의 간격을 계산합니다.
    pub fn next(&self, current: Duration) -> Duration {
        match self {
            Self::Fixed => current,
            Self::Exponential { max_interval } => current.saturating_mul(2).min(*max_interval),
        }
    }
}

/// 전달 확인 정책
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryPolicy {
    /// 첫 폴링 간격
    pub poll_interval: Duration,
    /// 간격 증가 방식
    pub backoff: DeliveryBackoff,
    /// 최대 읽기 시도 횟수
    pub max_attempts: u32,
    /// 최대 대기 시간
    pub max_wait: Duration,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            backoff: DeliveryBackoff::Fixed,
            max_attempts: 120,
            max_wait: Duration::from_secs(120),
        }
    }
}

/// 전달 확인 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    /// payload 발견 여부
    pub matched: bool,
    /// 확인을 시작한 뒤 결과가 나올 때까지 걸린 시간
    pub observed_after: Duration,
    /// 읽기 시도 횟수
    pub attempts: u32,
    /// 마지막 출력에서 payload가 나타난 횟수 (진단용)
    pub occurrences: usize,
    /// 찾지 못했을 때 마지막으로 읽은 출력의 끝부분
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

impl VerificationResult {
    /// `matched = false`를 `DeliveryNotObserved` 에러로 변환합니다.
    pub fn into_outcome(self, payload: &str) -> Result<VerificationResult, ScenarioError> {
        if self.matched {
            Ok(self)
        } else {
            Err(ScenarioError::DeliveryNotObserved {
                payload: payload.to_owned(),
                attempts: self.attempts,
                elapsed: self.observed_after,
                snippet: self.snippet,
            })
        }
    }
}

/// 구독자 출력 폴링 검증기
pub struct DeliveryVerifier<L: LogSource, K: Clock = TokioClock> {
    logs: Arc<L>,
    clock: Arc<K>,
    policy: DeliveryPolicy,
}

impl<L: LogSource, K: Clock> DeliveryVerifier<L, K> {
    /// 새 검증기를 생성합니다.
    pub fn new(logs: Arc<L>, clock: Arc<K>, policy: DeliveryPolicy) -> Self {
        Self {
            logs,
            clock,
            policy,
        }
    }

    /// 적용 중인 정책
    pub fn policy(&self) -> &DeliveryPolicy {
        &self.policy
    }

    /// 구독자 출력에 `expected`가 나타날 때까지 폴링합니다.
    ///
    /// # Errors
    ///
    /// - `ScenarioError::SubscriberUnreachable`: 예산 안에 출력을 한 번도 읽지 못함
    /// - `ScenarioError::Cancelled`: 폴링 중 취소됨
    pub async fn confirm(
        &self,
        subscriber: &ResourceRef,
        expected: &str,
        cancel: &CancellationToken,
    ) -> Result<VerificationResult, ScenarioError> {
        let start = self.clock.now();
        let max_attempts = self.policy.max_attempts.max(1);
        let mut interval = self.policy.poll_interval;
        let mut attempts = 0u32;
        let mut successful_reads = 0u32;
        let mut last_output: Option<String> = None;
        let mut last_error: Option<String> = None;

        loop {
            attempts += 1;
            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled()),
                read = self.logs.read(subscriber) => read,
            };

            match read {
                Ok(output) => {
                    successful_reads += 1;
                    let occurrences = count_occurrences(&output, expected);
                    if occurrences > 0 {
                        let observed_after = self.clock.now().saturating_duration_since(start);
                        debug!(
                            subscriber = %subscriber,
                            attempt = attempts,
                            occurrences,
                            "payload observed"
                        );
                        metrics::histogram!(m::DELIVERY_ATTEMPTS).record(f64::from(attempts));
                        metrics::histogram!(m::DELIVERY_LATENCY_SECONDS)
                            .record(observed_after.as_secs_f64());
                        return Ok(VerificationResult {
                            matched: true,
                            observed_after,
                            attempts,
                            occurrences,
                            snippet: None,
                        });
                    }
                    debug!(subscriber = %subscriber, attempt = attempts, "payload not yet observed");
                    last_output = Some(output);
                }
                Err(e) => {
                    warn!(
                        subscriber = %subscriber,
                        attempt = attempts,
                        error = %e,
                        "failed to read subscriber output"
                    );
                    last_error = Some(e.to_string());
                }
            }

            let elapsed = self.clock.now().saturating_duration_since(start);
            if attempts >= max_attempts || elapsed >= self.policy.max_wait {
                if successful_reads == 0 {
                    return Err(ScenarioError::SubscriberUnreachable {
                        subscriber: subscriber.name.clone(),
                        attempts,
                        reason: last_error.unwrap_or_else(|| "no output read".to_owned()),
                    });
                }
                return Ok(VerificationResult {
                    matched: false,
                    observed_after: elapsed,
                    attempts,
                    occurrences: 0,
                    snippet: last_output.as_deref().and_then(tail_snippet),
                });
            }

            let nap = interval.min(self.policy.max_wait - elapsed);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled()),
                _ = self.clock.sleep(nap) => {}
            }
            interval = self.policy.backoff.next(interval);
        }
    }
}

fn cancelled() -> ScenarioError {
    ScenarioError::Cancelled {
        step: ScenarioStep::Verify,
    }
}

/// `output`에서 `expected`가 겹치지 않게 나타난 횟수
pub fn count_occurrences(output: &str, expected: &str) -> usize {
    if expected.is_empty() {
        return 0;
    }
    output.matches(expected).count()
}

/// 출력의 마지막 [`SNIPPET_MAX_CHARS`]자. 비어 있으면 `None`.
pub fn tail_snippet(output: &str) -> Option<String> {
    let trimmed = output.trim_end();
    if trimmed.is_empty() {
        return None;
    }
    let start = trimmed
        .char_indices()
        .rev()
        .nth(SNIPPET_MAX_CHARS - 1)
        .map(|(i, _)| i)
        .unwrap_or(0);
    Some(trimmed[start..].to_owned())
}
