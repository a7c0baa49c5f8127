//! 매트릭스 실행 옵션
//!
//! [`RunOptions`]는 core의 [`ChanprobeConfig`]를 기반으로 하네스가 사용하는
//! 타입이 정해진 실행 옵션을 제공합니다.
//!
//! # 사용 예시
//! ```ignore
//! use chanprobe_core::ChanprobeConfig;
//! use chanprobe_harness::RunOptions;
//!
//! let core_config = ChanprobeConfig::default();
//! let options = RunOptions::from_core(&core_config)?;
//! ```

use std::time::Duration;

use serde::Serialize;

use chanprobe_core::config::{BackoffKind, ChanprobeConfig, DEFAULT_TEST_NAME};
use chanprobe_core::error::{ChanprobeError, ConfigError};
use chanprobe_core::event::Encoding;
use chanprobe_core::types::{ApiVersionPolicy, ChannelFeature};

use crate::readiness::ReadinessPolicy;
use crate::verifier::{DeliveryBackoff, DeliveryPolicy};

/// 설정 상한값 상수
const MAX_PARALLEL: usize = 64;
const MAX_WAIT_SECS: u64 = 3600;
const MIN_POLL_INTERVAL_MS: u64 = 10;
const MAX_POLL_INTERVAL_MS: u64 = 60_000;
const MAX_DELIVERY_ATTEMPTS: u32 = 10_000;
const MAX_TEARDOWN_TIMEOUT_SECS: u64 = 300;
const MAX_RUN_DEADLINE_SECS: u64 = 24 * 3600;

/// 매트릭스 실행 옵션
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunOptions {
    /// 리소스 이름 접두어
    pub test_name: String,
    /// 이벤트 인코딩
    pub encoding: Encoding,
    /// 구독 대상 API 버전 정책
    pub api_version: ApiVersionPolicy,
    /// 채널이 지원해야 하는 기능 (미지원 채널은 건너뜀)
    pub required_feature: ChannelFeature,
    /// 동시에 실행할 시나리오 수
    pub max_parallel: usize,
    /// 전체 실행 데드라인
    pub run_deadline: Option<Duration>,
    /// 리소스 하나를 삭제할 때의 타임아웃
    pub teardown_timeout: Duration,
    /// readiness 대기 정책
    pub readiness: ReadinessPolicy,
    /// 전달 확인 정책
    pub delivery: DeliveryPolicy,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            test_name: DEFAULT_TEST_NAME.to_owned(),
            encoding: Encoding::Binary,
            api_version: ApiVersionPolicy::Native,
            required_feature: ChannelFeature::Basic,
            max_parallel: 4,
            run_deadline: None,
            teardown_timeout: Duration::from_secs(30),
            readiness: ReadinessPolicy::default(),
            delivery: DeliveryPolicy::default(),
        }
    }
}

impl RunOptions {
    /// core 설정에서 실행 옵션을 생성합니다.
    pub fn from_core(core: &ChanprobeConfig) -> Result<Self, ChanprobeError> {
        let matrix = &core.matrix;
        let delivery = &core.delivery;

        let backoff = match delivery.backoff_kind()? {
            BackoffKind::Fixed => DeliveryBackoff::Fixed,
            BackoffKind::Exponential => DeliveryBackoff::Exponential {
                max_interval: Duration::from_millis(delivery.max_backoff_ms),
            },
        };

        let options = Self {
            test_name: matrix.test_name.clone(),
            encoding: matrix.encoding()?,
            api_version: matrix.api_version_policy(),
            required_feature: matrix.required_feature()?,
            max_parallel: matrix.max_parallel,
            run_deadline: (matrix.run_deadline_secs > 0)
                .then(|| Duration::from_secs(matrix.run_deadline_secs)),
            teardown_timeout: Duration::from_secs(matrix.teardown_timeout_secs),
            readiness: ReadinessPolicy {
                poll_interval: Duration::from_millis(core.readiness.poll_interval_ms),
                max_wait: Duration::from_secs(core.readiness.max_wait_secs),
            },
            delivery: DeliveryPolicy {
                poll_interval: Duration::from_millis(delivery.poll_interval_ms),
                backoff,
                max_attempts: delivery.max_attempts,
                max_wait: Duration::from_secs(delivery.max_wait_secs),
            },
        };
        options.validate()?;
        Ok(options)
    }

    /// 옵션 값의 범위를 검증합니다.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.test_name.is_empty() {
            return Err(invalid("test_name", "must not be empty"));
        }

        if self.max_parallel == 0 || self.max_parallel > MAX_PARALLEL {
            return Err(invalid("max_parallel", format!("must be 1-{MAX_PARALLEL}")));
        }

        if let Some(deadline) = self.run_deadline {
            if deadline.is_zero() || deadline > Duration::from_secs(MAX_RUN_DEADLINE_SECS) {
                return Err(invalid(
                    "run_deadline",
                    format!("must be 1-{MAX_RUN_DEADLINE_SECS} seconds"),
                ));
            }
        }

        if self.teardown_timeout.is_zero()
            || self.teardown_timeout > Duration::from_secs(MAX_TEARDOWN_TIMEOUT_SECS)
        {
            return Err(invalid(
                "teardown_timeout",
                format!("must be 1-{MAX_TEARDOWN_TIMEOUT_SECS} seconds"),
            ));
        }

        check_poll_interval("readiness.poll_interval", self.readiness.poll_interval)?;
        check_max_wait("readiness.max_wait", self.readiness.max_wait)?;

        check_poll_interval("delivery.poll_interval", self.delivery.poll_interval)?;
        check_max_wait("delivery.max_wait", self.delivery.max_wait)?;
        if let DeliveryBackoff::Exponential { max_interval } = self.delivery.backoff {
            if max_interval < self.delivery.poll_interval {
                return Err(invalid(
                    "delivery.max_backoff",
                    "must not be shorter than delivery.poll_interval",
                ));
            }
            check_poll_interval("delivery.max_backoff", max_interval)?;
        }
        if self.delivery.max_attempts == 0 || self.delivery.max_attempts > MAX_DELIVERY_ATTEMPTS {
            return Err(invalid(
                "delivery.max_attempts",
                format!("must be 1-{MAX_DELIVERY_ATTEMPTS}"),
            ));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.into(),
    }
}

fn check_poll_interval(field: &str, interval: Duration) -> Result<(), ConfigError> {
    let min = Duration::from_millis(MIN_POLL_INTERVAL_MS);
    let max = Duration::from_millis(MAX_POLL_INTERVAL_MS);
    if interval < min || interval > max {
        return Err(invalid(
            field,
            format!("must be {MIN_POLL_INTERVAL_MS}-{MAX_POLL_INTERVAL_MS} ms"),
        ));
    }
    Ok(())
}

fn check_max_wait(field: &str, max_wait: Duration) -> Result<(), ConfigError> {
    if max_wait.is_zero() || max_wait > Duration::from_secs(MAX_WAIT_SECS) {
        return Err(invalid(field, format!("must be 1-{MAX_WAIT_SECS} seconds")));
    }
    Ok(())
}

/// 실행 옵션 빌더
#[derive(Default)]
pub struct RunOptionsBuilder {
    options: RunOptions,
}

impl RunOptionsBuilder {
    /// 기본 옵션으로 시작하는 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 리소스 이름 접두어를 설정합니다.
    pub fn test_name(mut self, name: impl Into<String>) -> Self {
        self.options.test_name = name.into();
        self
    }

    /// 이벤트 인코딩을 설정합니다.
    pub fn encoding(mut self, encoding: Encoding) -> Self {
        self.options.encoding = encoding;
        self
    }

    /// 구독 대상 API 버전 정책을 설정합니다.
    pub fn api_version(mut self, policy: ApiVersionPolicy) -> Self {
        self.options.api_version = policy;
        self
    }

    /// 요구 기능을 설정합니다.
    pub fn required_feature(mut self, feature: ChannelFeature) -> Self {
        self.options.required_feature = feature;
        self
    }

    /// 동시 실행 시나리오 수를 설정합니다.
    pub fn max_parallel(mut self, max: usize) -> Self {
        self.options.max_parallel = max;
        self
    }

    /// 전체 실행 데드라인을 설정합니다.
    pub fn run_deadline(mut self, deadline: Duration) -> Self {
        self.options.run_deadline = Some(deadline);
        self
    }

    /// 리소스 삭제 타임아웃을 설정합니다.
    pub fn teardown_timeout(mut self, timeout: Duration) -> Self {
        self.options.teardown_timeout = timeout;
        self
    }

    /// readiness 대기 정책을 설정합니다.
    pub fn readiness(mut self, policy: ReadinessPolicy) -> Self {
        self.options.readiness = policy;
        self
    }

    /// 전달 확인 정책을 설정합니다.
    pub fn delivery(mut self, policy: DeliveryPolicy) -> Self {
        self.options.delivery = policy;
        self
    }

    /// 옵션을 검증하고 `RunOptions`를 생성합니다.
    pub fn build(self) -> Result<RunOptions, ConfigError> {
        self.options.validate()?;
        Ok(self.options)
    }
}
