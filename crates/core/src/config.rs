//! 설정 관리: chanprobe.toml 파싱 및 런타임 설정
//!
//! [`ChanprobeConfig`]는 매트릭스 실행에 필요한 모든 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`CHANPROBE_MATRIX_ENCODING=structured` 형식)
//! 3. 설정 파일 (`chanprobe.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), chanprobe_core::error::ChanprobeError> {
//! use chanprobe_core::config::ChanprobeConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = ChanprobeConfig::load("chanprobe.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = ChanprobeConfig::parse("[matrix]\nencoding = \"structured\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ChanprobeError, ConfigError};
use crate::event::Encoding;
use crate::types::{ApiVersionPolicy, ChannelDescriptor, ChannelFeature, SubscriptionVersion};

/// 기본 테스트 이름 (리소스 이름 접두어)
pub const DEFAULT_TEST_NAME: &str = "e2e-singleevent";

/// 테스트 이름 최대 길이
///
/// 리소스 이름(63자 이하)에 역할, 인코딩, 버전, kind, 해시가 함께 들어가야 합니다.
pub const MAX_TEST_NAME_LEN: usize = 24;

/// chanprobe 통합 설정
///
/// `chanprobe.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChanprobeConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 매트릭스 설정
    #[serde(default)]
    pub matrix: MatrixConfig,
    /// readiness 대기 설정
    #[serde(default)]
    pub readiness: ReadinessConfig,
    /// 전달 확인 설정
    #[serde(default)]
    pub delivery: DeliveryConfig,
    /// 인메모리 레퍼런스 클러스터 설정
    #[serde(default)]
    pub memory: MemoryConfig,
}

impl ChanprobeConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ChanprobeError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, ChanprobeError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ChanprobeError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                ChanprobeError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, ChanprobeError> {
        toml::from_str(toml_str).map_err(|e| {
            ChanprobeError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `CHANPROBE_{SECTION}_{FIELD}`
    /// 예: `CHANPROBE_DELIVERY_MAX_ATTEMPTS=30`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "CHANPROBE_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "CHANPROBE_GENERAL_LOG_FORMAT");

        // Matrix
        override_string(&mut self.matrix.test_name, "CHANPROBE_MATRIX_TEST_NAME");
        override_string(&mut self.matrix.encoding, "CHANPROBE_MATRIX_ENCODING");
        override_csv(
            &mut self.matrix.subscription_versions,
            "CHANPROBE_MATRIX_SUBSCRIPTION_VERSIONS",
        );
        override_string(
            &mut self.matrix.channel_api_version,
            "CHANPROBE_MATRIX_CHANNEL_API_VERSION",
        );
        override_string(
            &mut self.matrix.required_feature,
            "CHANPROBE_MATRIX_REQUIRED_FEATURE",
        );
        override_usize(&mut self.matrix.max_parallel, "CHANPROBE_MATRIX_MAX_PARALLEL");
        override_u64(
            &mut self.matrix.run_deadline_secs,
            "CHANPROBE_MATRIX_RUN_DEADLINE_SECS",
        );
        override_u64(
            &mut self.matrix.teardown_timeout_secs,
            "CHANPROBE_MATRIX_TEARDOWN_TIMEOUT_SECS",
        );

        // Readiness
        override_u64(
            &mut self.readiness.poll_interval_ms,
            "CHANPROBE_READINESS_POLL_INTERVAL_MS",
        );
        override_u64(
            &mut self.readiness.max_wait_secs,
            "CHANPROBE_READINESS_MAX_WAIT_SECS",
        );

        // Delivery
        override_u64(
            &mut self.delivery.poll_interval_ms,
            "CHANPROBE_DELIVERY_POLL_INTERVAL_MS",
        );
        override_string(&mut self.delivery.backoff, "CHANPROBE_DELIVERY_BACKOFF");
        override_u64(
            &mut self.delivery.max_backoff_ms,
            "CHANPROBE_DELIVERY_MAX_BACKOFF_MS",
        );
        override_u32(
            &mut self.delivery.max_attempts,
            "CHANPROBE_DELIVERY_MAX_ATTEMPTS",
        );
        override_u64(
            &mut self.delivery.max_wait_secs,
            "CHANPROBE_DELIVERY_MAX_WAIT_SECS",
        );

        // Memory
        override_u64(
            &mut self.memory.subscriber_ready_after_ms,
            "CHANPROBE_MEMORY_SUBSCRIBER_READY_AFTER_MS",
        );
        override_u64(
            &mut self.memory.subscription_ready_after_ms,
            "CHANPROBE_MEMORY_SUBSCRIPTION_READY_AFTER_MS",
        );
    }

    /// 설정값의 유효성을 검증합니다.
    ///
    /// 열거형 문자열과 이름 규칙을 검사합니다. 시간/횟수 상한은
    /// 각 크레이트의 설정(`RunOptions`, `MemoryClusterConfig`)이 검증합니다.
    pub fn validate(&self) -> Result<(), ChanprobeError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        validate_test_name(&self.matrix.test_name)?;
        self.matrix.encoding()?;
        self.matrix.required_feature()?;

        let versions = self.matrix.subscription_versions()?;
        if versions.is_empty() {
            return Err(invalid(
                "matrix.subscription_versions",
                "at least one subscription version is required",
            ));
        }

        for (i, channel) in self.matrix.channels.iter().enumerate() {
            if channel.kind.trim().is_empty() {
                return Err(invalid(
                    &format!("matrix.channels[{i}].kind"),
                    "must not be empty",
                ));
            }
            if channel.api_version.trim().is_empty() {
                return Err(invalid(
                    &format!("matrix.channels[{i}].api_version"),
                    "must not be empty",
                ));
            }
        }

        self.delivery.backoff_kind()?;

        for (i, kind) in self.memory.kinds.iter().enumerate() {
            if kind.kind.trim().is_empty() {
                return Err(invalid(
                    &format!("memory.kinds[{i}].kind"),
                    "must not be empty",
                ));
            }
            if !kind.served_versions.contains(&kind.native_api_version) {
                return Err(invalid(
                    &format!("memory.kinds[{i}].served_versions"),
                    format!(
                        "must include the native api version '{}'",
                        kind.native_api_version
                    ),
                ));
            }
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ChanprobeError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.into(),
    }
    .into()
}

fn validate_test_name(name: &str) -> Result<(), ChanprobeError> {
    if name.is_empty() || name.len() > MAX_TEST_NAME_LEN {
        return Err(invalid(
            "matrix.test_name",
            format!("length must be 1-{MAX_TEST_NAME_LEN}"),
        ));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(invalid(
            "matrix.test_name",
            "must contain only lowercase letters, digits and '-'",
        ));
    }
    if name.starts_with('-') || name.ends_with('-') {
        return Err(invalid(
            "matrix.test_name",
            "must not start or end with '-'",
        ));
    }
    Ok(())
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
        }
    }
}

/// 매트릭스 설정
///
/// 채널 구현 목록과 구독 리비전 목록의 곱이 실행할 매트릭스가 됩니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatrixConfig {
    /// 리소스 이름 접두어
    pub test_name: String,
    /// 이벤트 인코딩 (binary, structured)
    pub encoding: String,
    /// 실행할 구독 리비전 (v1alpha1, v1beta1, v1)
    pub subscription_versions: Vec<String>,
    /// 구독 대상 채널 API 버전 오버라이드 (빈 문자열 또는 "native" = 채널 버전 유지)
    pub channel_api_version: String,
    /// 채널이 지원해야 하는 기능 (basic, redelivery, persistence)
    pub required_feature: String,
    /// 동시에 실행할 시나리오 수
    pub max_parallel: usize,
    /// 전체 실행 데드라인 (초, 0 = 없음)
    pub run_deadline_secs: u64,
    /// 리소스 하나를 삭제할 때의 타임아웃 (초)
    pub teardown_timeout_secs: u64,
    /// 테스트할 채널 구현
    pub channels: Vec<ChannelDescriptor>,
}

impl Default for MatrixConfig {
    fn default() -> Self {
        Self {
            test_name: DEFAULT_TEST_NAME.to_owned(),
            encoding: "binary".to_owned(),
            subscription_versions: vec!["v1alpha1".to_owned(), "v1beta1".to_owned()],
            channel_api_version: String::new(),
            required_feature: "basic".to_owned(),
            max_parallel: 4,
            run_deadline_secs: 0,
            teardown_timeout_secs: 30,
            channels: vec![ChannelDescriptor::new(
                "InMemoryChannel",
                "messaging.knative.dev/v1beta1",
            )],
        }
    }
}

impl MatrixConfig {
    /// 인코딩 문자열을 파싱합니다.
    pub fn encoding(&self) -> Result<Encoding, ChanprobeError> {
        self.encoding
            .parse()
            .map_err(|reason: String| invalid("matrix.encoding", reason))
    }

    /// 구독 리비전 목록을 파싱합니다.
    pub fn subscription_versions(&self) -> Result<Vec<SubscriptionVersion>, ChanprobeError> {
        self.subscription_versions
            .iter()
            .map(|v| {
                v.parse()
                    .map_err(|reason: String| invalid("matrix.subscription_versions", reason))
            })
            .collect()
    }

    /// API 버전 오버라이드 정책
    pub fn api_version_policy(&self) -> ApiVersionPolicy {
        ApiVersionPolicy::from_setting(&self.channel_api_version)
    }

    /// 요구 기능을 파싱합니다.
    pub fn required_feature(&self) -> Result<ChannelFeature, ChanprobeError> {
        self.required_feature
            .parse()
            .map_err(|reason: String| invalid("matrix.required_feature", reason))
    }
}

/// readiness 대기 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    /// 상태 폴링 간격 (밀리초)
    pub poll_interval_ms: u64,
    /// 최대 대기 시간 (초)
    pub max_wait_secs: u64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            max_wait_secs: 120,
        }
    }
}

/// 전달 확인 백오프 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffKind {
    /// 고정 간격
    Fixed,
    /// 지수 증가 (상한 있음)
    Exponential,
}

/// 전달 확인 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// 첫 폴링 간격 (밀리초)
    pub poll_interval_ms: u64,
    /// 백오프 방식 (fixed, exponential)
    pub backoff: String,
    /// 지수 백오프의 최대 간격 (밀리초)
    pub max_backoff_ms: u64,
    /// 최대 읽기 시도 횟수
    pub max_attempts: u32,
    /// 최대 대기 시간 (초)
    pub max_wait_secs: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            backoff: "fixed".to_owned(),
            max_backoff_ms: 10_000,
            max_attempts: 120,
            max_wait_secs: 120,
        }
    }
}

impl DeliveryConfig {
    /// 백오프 문자열을 파싱합니다.
    pub fn backoff_kind(&self) -> Result<BackoffKind, ChanprobeError> {
        match self.backoff.to_lowercase().as_str() {
            "fixed" => Ok(BackoffKind::Fixed),
            "exponential" => Ok(BackoffKind::Exponential),
            _ => Err(invalid(
                "delivery.backoff",
                "must be one of: fixed, exponential",
            )),
        }
    }
}

/// 인메모리 레퍼런스 클러스터 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// 구독자가 ready 되기까지 걸리는 시간 (밀리초)
    pub subscriber_ready_after_ms: u64,
    /// 구독이 ready 되기까지 걸리는 시간 (밀리초)
    pub subscription_ready_after_ms: u64,
    /// 등록할 채널 kind 동작
    pub kinds: Vec<MemoryKindConfig>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            subscriber_ready_after_ms: 200,
            subscription_ready_after_ms: 100,
            kinds: vec![MemoryKindConfig::default()],
        }
    }
}

/// 인메모리 채널 kind 하나의 동작
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryKindConfig {
    /// 채널 kind
    pub kind: String,
    /// 채널이 생성되는 API 버전
    pub native_api_version: String,
    /// 구독이 참조할 수 있는 API 버전
    pub served_versions: Vec<String>,
    /// ready 되기까지 걸리는 시간 (밀리초)
    pub ready_after_ms: u64,
    /// true면 절대 ready 되지 않음
    pub never_ready: bool,
    /// 이벤트 하나당 구독자에게 전달하는 사본 수 (0 = 유실)
    pub copies: u32,
    /// 발행 후 구독자에게 도착하기까지의 지연 (밀리초)
    pub delivery_delay_ms: u64,
}

impl Default for MemoryKindConfig {
    fn default() -> Self {
        Self {
            kind: "InMemoryChannel".to_owned(),
            native_api_version: "messaging.knative.dev/v1beta1".to_owned(),
            served_versions: vec![
                "messaging.knative.dev/v1alpha1".to_owned(),
                "messaging.knative.dev/v1beta1".to_owned(),
                "messaging.knative.dev/v1".to_owned(),
            ],
            ready_after_ms: 300,
            never_ready: false,
            copies: 1,
            delivery_delay_ms: 50,
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u32(target: &mut u32, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u32>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u32 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}
