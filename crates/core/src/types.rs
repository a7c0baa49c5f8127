//! 도메인 타입: 매트릭스 입력과 리소스 참조
//!
//! 채널 구현(ChannelDescriptor), 구독 계약 버전(SubscriptionVersion),
//! 클러스터 리소스 참조(ResourceRef) 등 모든 크레이트가 공유하는 타입을 정의합니다.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// 채널 구현이 지원하는 기능
///
/// 매트릭스 실행 시 요구 기능을 지원하지 않는 채널은 건너뜁니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelFeature {
    /// 단일 이벤트 전달
    Basic,
    /// 실패 시 재전달
    Redelivery,
    /// 재시작 후에도 이벤트 유지
    Persistence,
}

impl fmt::Display for ChannelFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Basic => write!(f, "basic"),
            Self::Redelivery => write!(f, "redelivery"),
            Self::Persistence => write!(f, "persistence"),
        }
    }
}

impl FromStr for ChannelFeature {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "basic" => Ok(Self::Basic),
            "redelivery" => Ok(Self::Redelivery),
            "persistence" => Ok(Self::Persistence),
            other => Err(format!(
                "unknown channel feature '{other}' (expected: basic, redelivery, persistence)"
            )),
        }
    }
}

/// 플러그인 가능한 채널 구현 하나를 식별합니다.
///
/// 매트릭스 입력으로 외부에서 주어지며 하네스는 절대 수정하지 않습니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelDescriptor {
    /// 리소스 kind (예: `InMemoryChannel`)
    pub kind: String,
    /// `group/version` 형식의 API 버전 (예: `messaging.knative.dev/v1beta1`)
    pub api_version: String,
    /// 지원 기능 목록 (비어 있으면 `basic`만 지원하는 것으로 취급)
    #[serde(default)]
    pub features: Vec<ChannelFeature>,
}

impl ChannelDescriptor {
    /// `basic` 기능만 가진 디스크립터를 생성합니다.
    pub fn new(kind: impl Into<String>, api_version: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            api_version: api_version.into(),
            features: vec![ChannelFeature::Basic],
        }
    }

    /// 기능 목록을 지정합니다.
    pub fn with_features(mut self, features: Vec<ChannelFeature>) -> Self {
        self.features = features;
        self
    }

    /// API 그룹 (`/` 앞부분). core 그룹처럼 `/`가 없으면 빈 문자열입니다.
    pub fn api_group(&self) -> &str {
        self.api_version
            .split_once('/')
            .map(|(group, _)| group)
            .unwrap_or("")
    }

    /// 주어진 기능을 지원하는지 확인합니다.
    pub fn supports(&self, feature: ChannelFeature) -> bool {
        if self.features.is_empty() {
            return feature == ChannelFeature::Basic;
        }
        self.features.contains(&feature)
    }
}

impl fmt::Display for ChannelDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.kind, self.api_version)
    }
}

/// 구독 계약의 리비전
///
/// 새 리비전은 variant를 추가하는 것으로 확장합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionVersion {
    /// `v1alpha1`
    V1Alpha1,
    /// `v1beta1`
    V1Beta1,
    /// `v1`
    V1,
}

impl SubscriptionVersion {
    /// 알려진 모든 리비전
    pub const ALL: [SubscriptionVersion; 3] = [Self::V1Alpha1, Self::V1Beta1, Self::V1];

    /// 버전 태그 문자열
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::V1Alpha1 => "v1alpha1",
            Self::V1Beta1 => "v1beta1",
            Self::V1 => "v1",
        }
    }
}

impl fmt::Display for SubscriptionVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "v1alpha1" => Ok(Self::V1Alpha1),
            "v1beta1" => Ok(Self::V1Beta1),
            "v1" => Ok(Self::V1),
            other => Err(format!(
                "unknown subscription version '{other}' (expected: v1alpha1, v1beta1, v1)"
            )),
        }
    }
}

/// 구독이 가리킬 채널 API 버전 정책
///
/// `Override`는 채널의 네이티브 버전과 다른 계약 리비전으로 구독하는
/// 교차 버전 호환성 테스트에 사용합니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "policy", content = "api_version")]
pub enum ApiVersionPolicy {
    /// 채널의 API 버전을 그대로 사용
    #[default]
    Native,
    /// 지정한 API 버전으로 대체
    Override(String),
}

impl ApiVersionPolicy {
    /// 설정 문자열에서 정책을 만듭니다. 빈 문자열이나 `native`는 [`Native`](Self::Native)입니다.
    pub fn from_setting(value: &str) -> Self {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("native") {
            Self::Native
        } else {
            Self::Override(trimmed.to_owned())
        }
    }

    /// 채널에 정책을 적용한 API 버전을 반환합니다.
    pub fn resolve<'a>(&'a self, channel: &'a ChannelDescriptor) -> &'a str {
        match self {
            Self::Native => &channel.api_version,
            Self::Override(version) => version,
        }
    }
}

impl fmt::Display for ApiVersionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native => write!(f, "native"),
            Self::Override(version) => write!(f, "{version}"),
        }
    }
}

/// 클러스터 리소스 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// 채널
    Channel,
    /// 구독자 엔드포인트 (이벤트 로거 + 서비스)
    Subscriber,
    /// 채널과 구독자를 묶는 구독
    Subscription,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Channel => write!(f, "channel"),
            Self::Subscriber => write!(f, "subscriber"),
            Self::Subscription => write!(f, "subscription"),
        }
    }
}

/// 생성된 리소스에 대한 참조
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    /// 리소스 종류
    pub kind: ResourceKind,
    /// 리소스 이름
    pub name: String,
    /// 리소스가 생성된 API 버전
    pub api_version: String,
}

impl ResourceRef {
    /// 새 리소스 참조를 생성합니다.
    pub fn new(kind: ResourceKind, name: impl Into<String>, api_version: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            api_version: api_version.into(),
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// 리소스의 자체 보고 상태
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceStatus {
    /// ready 여부
    pub ready: bool,
    /// ready가 아닌 사유
    pub reason: Option<String>,
}

impl ResourceStatus {
    /// ready 상태
    pub fn ready() -> Self {
        Self {
            ready: true,
            reason: None,
        }
    }

    /// ready가 아닌 상태
    pub fn not_ready(reason: impl Into<String>) -> Self {
        Self {
            ready: false,
            reason: Some(reason.into()),
        }
    }
}

/// 구독이 가리키는 채널
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelReference {
    /// 채널 이름
    pub name: String,
    /// 채널 kind
    pub kind: String,
    /// 구독이 사용할 채널 API 버전 (오버라이드 적용 후)
    pub api_version: String,
}

/// 구독 생성 요청
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionSpec {
    /// 구독 이름
    pub name: String,
    /// 구독 계약 리비전
    pub version: SubscriptionVersion,
    /// 대상 채널
    pub channel: ChannelReference,
    /// 구독자 이름
    pub subscriber: String,
}

/// 매트릭스의 한 칸: (채널 구현 × 구독 리비전) 조합
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatrixCell {
    /// 채널 구현
    pub channel: ChannelDescriptor,
    /// 구독 계약 리비전
    pub subscription_version: SubscriptionVersion,
    /// 구독 대상 API 버전 정책
    pub api_version: ApiVersionPolicy,
}

impl MatrixCell {
    /// 정책을 적용한 구독 대상 API 버전
    pub fn effective_api_version(&self) -> &str {
        self.api_version.resolve(&self.channel)
    }
}

impl fmt::Display for MatrixCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} x subscription {} (target {})",
            self.channel.kind,
            self.subscription_version,
            self.effective_api_version()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn in_memory() -> ChannelDescriptor {
        ChannelDescriptor::new("InMemoryChannel", "messaging.knative.dev/v1beta1")
    }

    #[test]
    fn api_group_splits_on_slash() {
        assert_eq!(in_memory().api_group(), "messaging.knative.dev");
        assert_eq!(ChannelDescriptor::new("Pod", "v1").api_group(), "");
    }

    #[test]
    fn empty_features_means_basic_only() {
        let channel = in_memory().with_features(Vec::new());
        assert!(channel.supports(ChannelFeature::Basic));
        assert!(!channel.supports(ChannelFeature::Persistence));
    }

    #[test]
    fn explicit_features_are_respected() {
        let channel = in_memory().with_features(vec![ChannelFeature::Persistence]);
        assert!(!channel.supports(ChannelFeature::Basic));
        assert!(channel.supports(ChannelFeature::Persistence));
    }

    #[test]
    fn subscription_version_parse_and_display() {
        for version in SubscriptionVersion::ALL {
            let parsed: SubscriptionVersion = version.as_str().parse().unwrap();
            assert_eq!(parsed, version);
        }
        assert_eq!(
            "V1Beta1".parse::<SubscriptionVersion>().unwrap(),
            SubscriptionVersion::V1Beta1
        );
        assert!("v2".parse::<SubscriptionVersion>().is_err());
    }

    #[test]
    fn api_version_policy_from_setting() {
        assert_eq!(ApiVersionPolicy::from_setting(""), ApiVersionPolicy::Native);
        assert_eq!(
            ApiVersionPolicy::from_setting("Native"),
            ApiVersionPolicy::Native
        );
        assert_eq!(
            ApiVersionPolicy::from_setting(" messaging.knative.dev/v1alpha1 "),
            ApiVersionPolicy::Override("messaging.knative.dev/v1alpha1".to_owned())
        );
    }

    #[test]
    fn override_policy_replaces_channel_version() {
        let cell = MatrixCell {
            channel: in_memory(),
            subscription_version: SubscriptionVersion::V1Alpha1,
            api_version: ApiVersionPolicy::Override("messaging.knative.dev/v1alpha1".to_owned()),
        };
        assert_eq!(cell.effective_api_version(), "messaging.knative.dev/v1alpha1");
        // 디스크립터 자체는 변경되지 않음
        assert_eq!(cell.channel.api_version, "messaging.knative.dev/v1beta1");
    }

    #[test]
    fn native_policy_keeps_channel_version() {
        let channel = in_memory();
        assert_eq!(
            ApiVersionPolicy::Native.resolve(&channel),
            "messaging.knative.dev/v1beta1"
        );
    }

    #[test]
    fn resource_ref_display() {
        let r = ResourceRef::new(ResourceKind::Subscription, "e2e-sub", "v1");
        assert_eq!(r.to_string(), "subscription/e2e-sub");
    }

    #[test]
    fn channel_feature_parse() {
        assert_eq!(
            "basic".parse::<ChannelFeature>().unwrap(),
            ChannelFeature::Basic
        );
        assert!("ordering".parse::<ChannelFeature>().is_err());
    }

    #[test]
    fn descriptor_deserializes_without_features() {
        let json = r#"{"kind":"KafkaChannel","api_version":"messaging.knative.dev/v1alpha1"}"#;
        let channel: ChannelDescriptor = serde_json::from_str(json).unwrap();
        assert!(channel.features.is_empty());
        assert!(channel.supports(ChannelFeature::Basic));
    }
}
