//! 인메모리 클러스터 설정
//!
//! core의 `[memory]` 섹션에서 [`MemoryClusterConfig`]를 만들거나,
//! 테스트에서 [`MemoryClusterConfig::new`]로 kind를 직접 등록합니다.

use std::collections::HashMap;
use std::time::Duration;

use chanprobe_core::config::MemoryConfig;
use chanprobe_core::error::ConfigError;

use crate::behavior::ChannelBehavior;

/// 인메모리 클러스터 설정
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryClusterConfig {
    /// 구독자가 ready 되기까지의 시간
    pub subscriber_ready_after: Duration,
    /// 두 대상이 모두 존재한 뒤 구독이 ready 되기까지의 시간
    pub subscription_ready_after: Duration,
    /// 등록된 채널 kind
    pub kinds: HashMap<String, ChannelBehavior>,
}

impl MemoryClusterConfig {
    /// 등록된 kind 없이 즉시 ready 되는 설정을 생성합니다.
    pub fn new() -> Self {
        Self {
            subscriber_ready_after: Duration::ZERO,
            subscription_ready_after: Duration::ZERO,
            kinds: HashMap::new(),
        }
    }

    /// core `[memory]` 섹션에서 설정을 생성합니다.
    ///
    /// # Errors
    ///
    /// 같은 kind가 두 번 등록되었거나 kind 이름이 비어 있으면 `ConfigError::InvalidValue`
    pub fn from_core(core: &MemoryConfig) -> Result<Self, ConfigError> {
        let mut config = Self::new()
            .subscriber_ready_after(Duration::from_millis(core.subscriber_ready_after_ms))
            .subscription_ready_after(Duration::from_millis(core.subscription_ready_after_ms));

        for kind in &core.kinds {
            if kind.kind.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "memory.kinds.kind".to_owned(),
                    reason: "must not be empty".to_owned(),
                });
            }
            if config.kinds.contains_key(&kind.kind) {
                return Err(ConfigError::InvalidValue {
                    field: "memory.kinds".to_owned(),
                    reason: format!("channel kind '{}' registered twice", kind.kind),
                });
            }
            config = config.with_kind(&kind.kind, ChannelBehavior::from(kind));
        }

        Ok(config)
    }

    /// 채널 kind를 등록합니다. 같은 kind는 덮어씁니다.
    pub fn with_kind(mut self, kind: impl Into<String>, behavior: ChannelBehavior) -> Self {
        self.kinds.insert(kind.into(), behavior);
        self
    }

    /// 구독자 ready 지연
    pub fn subscriber_ready_after(mut self, delay: Duration) -> Self {
        self.subscriber_ready_after = delay;
        self
    }

    /// 구독 ready 지연
    pub fn subscription_ready_after(mut self, delay: Duration) -> Self {
        self.subscription_ready_after = delay;
        self
    }
}

impl Default for MemoryClusterConfig {
    fn default() -> Self {
        // core 기본값과 같은 kind 구성
        Self::from_core(&MemoryConfig::default()).unwrap_or_else(|_| Self::new())
    }
}
