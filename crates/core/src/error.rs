//! 에러 타입: 도메인별 에러 정의
//!
//! - [`ClusterError`]: 협력자(클러스터, 퍼블리셔, 로그 소스) 호출 실패
//! - [`ScenarioError`]: 시나리오 하나를 실패로 만드는 원인 (리포트에 그대로 노출)
//! - [`ConfigError`]: 설정 로딩/검증 실패
//! - [`ChanprobeError`]: 최상위 에러

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::ResourceKind;

/// chanprobe 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum ChanprobeError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 클러스터 협력자 에러
    #[error("cluster error: {0}")]
    Cluster(#[from] ClusterError),

    /// 시나리오 실패
    #[error("scenario error: {0}")]
    Scenario(#[from] ScenarioError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 클러스터 협력자 호출 에러
///
/// `Cluster`, `EventPublisher`, `LogSource` 구현체가 반환합니다.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClusterError {
    /// 리소스가 존재하지 않음
    #[error("{kind} '{name}' not found")]
    NotFound { kind: ResourceKind, name: String },

    /// 같은 이름의 리소스가 이미 존재함
    #[error("{kind} '{name}' already exists")]
    AlreadyExists { kind: ResourceKind, name: String },

    /// 클러스터가 요청을 거부함
    #[error("{kind} '{name}' rejected: {reason}")]
    Rejected {
        kind: ResourceKind,
        name: String,
        reason: String,
    },

    /// 클러스터(또는 로그 수집 경로)에 접근할 수 없음
    #[error("cluster unavailable: {0}")]
    Unavailable(String),
}

impl ClusterError {
    /// `NotFound` 여부: teardown에서 이미 삭제된 리소스를 성공으로 취급할 때 사용합니다.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// 시나리오 진행 단계
///
/// 실패 리포트에 "어느 단계에서" 실패했는지를 남기기 위해 사용합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioStep {
    /// 채널/구독자/구독 생성
    Provision,
    /// 전체 리소스 ready 대기
    Readiness,
    /// 이벤트 발행
    Publish,
    /// 구독자 출력에서 payload 확인
    Verify,
}

impl std::fmt::Display for ScenarioStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Provision => write!(f, "provision"),
            Self::Readiness => write!(f, "readiness"),
            Self::Publish => write!(f, "publish"),
            Self::Verify => write!(f, "verify"),
        }
    }
}

/// 시나리오 하나를 실패시키는 에러
///
/// 모든 variant는 해당 매트릭스 셀에만 치명적이며, 다른 셀의 실행에는 영향을 주지 않습니다.
/// [`DeliveryNotObserved`](Self::DeliveryNotObserved)만이 테스트 대상 채널의 정합성 실패이고,
/// 나머지는 하네스/인프라 측 실패입니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum ScenarioError {
    /// 리소스 생성 실패
    #[error("failed to provision {kind} '{name}': {reason}")]
    Provisioning {
        /// 실패한 리소스 종류
        kind: ResourceKind,
        /// 리소스 이름
        name: String,
        /// 실패 사유
        reason: String,
    },

    /// 대기 한도 내에 ready 되지 않은 리소스가 있음
    #[error("resources not ready after {waited:?}: {}", .not_ready.join(", "))]
    ReadinessTimeout {
        /// 실제 대기 시간
        waited: Duration,
        /// 아직 ready가 아닌 리소스 (`kind/name: reason`)
        not_ready: Vec<String>,
    },

    /// 채널이 이벤트를 받지 않음
    #[error("failed to publish event to channel '{channel}': {reason}")]
    Publish {
        /// 대상 채널 이름
        channel: String,
        /// 실패 사유
        reason: String,
    },

    /// 폴링 한도 내에 payload가 구독자 출력에 나타나지 않음
    #[error(
        "payload {payload:?} not observed after {attempts} attempts ({elapsed:?}); last output: {}",
        .snippet.as_deref().unwrap_or("<empty>")
    )]
    DeliveryNotObserved {
        /// 기대한 payload
        payload: String,
        /// 폴링 시도 횟수
        attempts: u32,
        /// 경과 시간
        elapsed: Duration,
        /// 마지막으로 관찰한 출력의 끝부분
        snippet: Option<String>,
    },

    /// 구독자 출력을 한 번도 읽지 못함
    #[error("subscriber '{subscriber}' unreachable after {attempts} attempts: {reason}")]
    SubscriberUnreachable {
        /// 구독자 이름
        subscriber: String,
        /// 시도 횟수
        attempts: u32,
        /// 마지막 에러
        reason: String,
    },

    /// 외부 취소 (Ctrl-C 등)
    #[error("cancelled during {step}")]
    Cancelled {
        /// 취소 시점의 단계
        step: ScenarioStep,
    },

    /// 매트릭스 실행 데드라인 초과
    #[error("run deadline of {deadline:?} exceeded during {step}")]
    DeadlineExceeded {
        /// 데드라인 도달 시점의 단계
        step: ScenarioStep,
        /// 설정된 실행 데드라인
        deadline: Duration,
    },

    /// 하네스 내부 에러 (태스크 패닉 등)
    #[error("internal error: {reason}")]
    Internal {
        /// 에러 내용
        reason: String,
    },
}

impl ScenarioError {
    /// 하네스/인프라 측 실패인지 여부
    ///
    /// `false`이면 테스트 대상 채널의 전달 정합성 실패입니다.
    pub fn is_infrastructure(&self) -> bool {
        !matches!(self, Self::DeliveryNotObserved { .. })
    }

    /// 메트릭/로그 태그용 고정 이름
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Provisioning { .. } => "provisioning",
            Self::ReadinessTimeout { .. } => "readiness_timeout",
            Self::Publish { .. } => "publish",
            Self::DeliveryNotObserved { .. } => "delivery_not_observed",
            Self::SubscriberUnreachable { .. } => "subscriber_unreachable",
            Self::Cancelled { .. } => "cancelled",
            Self::DeadlineExceeded { .. } => "deadline_exceeded",
            Self::Internal { .. } => "internal",
        }
    }
}
