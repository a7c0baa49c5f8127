//! 인메모리 클러스터: 세 협력자 trait을 프로세스 안에서 구현합니다.
//!
//! 리소스 상태는 `Arc<Mutex<ClusterState>>` 하나에 모여 있고, 지연 전달은
//! 별도 태스크가 같은 상태를 갱신합니다. 시간은 `tokio::time::Instant`로 재므로
//! `start_paused` 테스트에서는 가상 시간을 따릅니다.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use chanprobe_core::cluster::{Cluster, EventPublisher, LogSource};
use chanprobe_core::error::ClusterError;
use chanprobe_core::event::EventEnvelope;
use chanprobe_core::types::{
    ChannelDescriptor, ResourceKind, ResourceRef, ResourceStatus, SubscriptionSpec,
};

use crate::behavior::ChannelBehavior;
use crate::config::MemoryClusterConfig;

/// 구독 리소스의 API 그룹
const SUBSCRIPTION_GROUP: &str = "messaging.knative.dev";

/// 구독자(이벤트 로거)의 API 버전
const SUBSCRIBER_API_VERSION: &str = "v1";

/// 리소스 주소 도메인
const ADDRESS_DOMAIN: &str = "chanprobe.svc.cluster.local";

/// 리소스 생성/삭제 기록 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalOp {
    /// 생성
    Create,
    /// 삭제
    Delete,
}

/// 리소스 생성/삭제 기록 한 건
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    /// 작업 종류
    pub op: JournalOp,
    /// 대상 리소스
    pub resource: ResourceRef,
}

struct ChannelEntry {
    kind: String,
    api_version: String,
    created_at: Instant,
    behavior: ChannelBehavior,
}

struct SubscriberEntry {
    created_at: Instant,
    output: String,
}

struct SubscriptionEntry {
    spec: SubscriptionSpec,
    created_at: Instant,
}

#[derive(Default)]
struct ClusterState {
    channels: HashMap<String, ChannelEntry>,
    subscribers: HashMap<String, SubscriberEntry>,
    subscriptions: HashMap<String, SubscriptionEntry>,
    subscription_specs: HashMap<String, SubscriptionSpec>,
    journal: Vec<JournalEntry>,
    log_reads: u64,
    publish_count: u64,
}

impl ClusterState {
    fn record(&mut self, op: JournalOp, resource: &ResourceRef) {
        self.journal.push(JournalEntry {
            op,
            resource: resource.clone(),
        });
    }

    fn name_taken(&self, kind: ResourceKind, name: &str) -> bool {
        match kind {
            ResourceKind::Channel => self.channels.contains_key(name),
            ResourceKind::Subscriber => self.subscribers.contains_key(name),
            ResourceKind::Subscription => self.subscriptions.contains_key(name),
        }
    }

    fn append(&mut self, subscriber: &str, line: &str, copies: u32) {
        if let Some(entry) = self.subscribers.get_mut(subscriber) {
            for _ in 0..copies {
                entry.output.push_str(line);
                entry.output.push('\n');
            }
        }
    }
}

/// 인메모리 레퍼런스 클러스터
///
/// `Cluster`, `EventPublisher`, `LogSource`를 모두 구현하므로 하나의 `Arc`로
/// 매트릭스 실행기의 세 협력자를 채울 수 있습니다. 복제본은 같은 상태를 공유합니다.
///
/// # 사용 예시
/// ```ignore
/// use chanprobe_memory_cluster::{ChannelBehavior, MemoryCluster, MemoryClusterConfig};
///
/// let cluster = MemoryCluster::new(
///     MemoryClusterConfig::new()
///         .with_kind("InMemoryChannel", ChannelBehavior::new("messaging.knative.dev/v1beta1")),
/// );
/// ```
#[derive(Clone)]
pub struct MemoryCluster {
    config: Arc<MemoryClusterConfig>,
    state: Arc<Mutex<ClusterState>>,
    unreachable_logs: bool,
}

impl MemoryCluster {
    /// 빈 클러스터를 생성합니다.
    pub fn new(config: MemoryClusterConfig) -> Self {
        Self {
            config: Arc::new(config),
            state: Arc::new(Mutex::new(ClusterState::default())),
            unreachable_logs: false,
        }
    }

    /// 구독자 출력 읽기가 항상 실패하도록 설정합니다.
    pub fn with_unreachable_logs(mut self) -> Self {
        self.unreachable_logs = true;
        self
    }

    /// 생성/삭제 기록 (발생 순서)
    pub async fn journal(&self) -> Vec<JournalEntry> {
        self.state.lock().await.journal.clone()
    }

    /// 구독의 생성 요청 내용 (삭제된 뒤에도 남음)
    pub async fn subscription(&self, name: &str) -> Option<SubscriptionSpec> {
        self.state.lock().await.subscription_specs.get(name).cloned()
    }

    /// 구독자 출력 읽기 횟수
    pub async fn log_reads(&self) -> u64 {
        self.state.lock().await.log_reads
    }

    /// 받아들인 발행 횟수
    pub async fn publish_count(&self) -> u64 {
        self.state.lock().await.publish_count
    }

    /// 현재 존재하는 리소스 수
    pub async fn resource_count(&self) -> usize {
        let state = self.state.lock().await;
        state.channels.len() + state.subscribers.len() + state.subscriptions.len()
    }

    fn address(name: &str) -> String {
        format!("http://{name}.{ADDRESS_DOMAIN}")
    }
}

impl Default for MemoryCluster {
    fn default() -> Self {
        Self::new(MemoryClusterConfig::default())
    }
}

impl Cluster for MemoryCluster {
    async fn create_channel(
        &self,
        name: &str,
        channel: &ChannelDescriptor,
    ) -> Result<ResourceRef, ClusterError> {
        let behavior = self
            .config
            .kinds
            .get(&channel.kind)
            .ok_or_else(|| ClusterError::Rejected {
                kind: ResourceKind::Channel,
                name: name.to_owned(),
                reason: format!("unknown channel kind '{}'", channel.kind),
            })?;
        if !behavior.serves(&channel.api_version) {
            return Err(ClusterError::Rejected {
                kind: ResourceKind::Channel,
                name: name.to_owned(),
                reason: format!(
                    "{} does not serve api version '{}'",
                    channel.kind, channel.api_version
                ),
            });
        }

        let mut state = self.state.lock().await;
        if state.name_taken(ResourceKind::Channel, name) {
            return Err(ClusterError::AlreadyExists {
                kind: ResourceKind::Channel,
                name: name.to_owned(),
            });
        }

        let resource = ResourceRef::new(ResourceKind::Channel, name, &channel.api_version);
        state.channels.insert(
            name.to_owned(),
            ChannelEntry {
                kind: channel.kind.clone(),
                api_version: channel.api_version.clone(),
                created_at: Instant::now(),
                behavior: behavior.clone(),
            },
        );
        state.record(JournalOp::Create, &resource);
        debug!(resource = %resource, kind = %channel.kind, "memory channel created");
        Ok(resource)
    }

    async fn create_subscriber(&self, name: &str) -> Result<ResourceRef, ClusterError> {
        let mut state = self.state.lock().await;
        if state.name_taken(ResourceKind::Subscriber, name) {
            return Err(ClusterError::AlreadyExists {
                kind: ResourceKind::Subscriber,
                name: name.to_owned(),
            });
        }

        let resource = ResourceRef::new(ResourceKind::Subscriber, name, SUBSCRIBER_API_VERSION);
        state.subscribers.insert(
            name.to_owned(),
            SubscriberEntry {
                created_at: Instant::now(),
                output: String::new(),
            },
        );
        state.record(JournalOp::Create, &resource);
        debug!(resource = %resource, "memory subscriber created");
        Ok(resource)
    }

    async fn create_subscription(
        &self,
        spec: &SubscriptionSpec,
    ) -> Result<ResourceRef, ClusterError> {
        let rejected = |reason: String| ClusterError::Rejected {
            kind: ResourceKind::Subscription,
            name: spec.name.clone(),
            reason,
        };

        let mut state = self.state.lock().await;
        if state.name_taken(ResourceKind::Subscription, &spec.name) {
            return Err(ClusterError::AlreadyExists {
                kind: ResourceKind::Subscription,
                name: spec.name.clone(),
            });
        }

        let channel = state
            .channels
            .get(&spec.channel.name)
            .ok_or_else(|| rejected(format!("channel '{}' not found", spec.channel.name)))?;
        if channel.kind != spec.channel.kind {
            return Err(rejected(format!(
                "channel '{}' is a {}, not a {}",
                spec.channel.name, channel.kind, spec.channel.kind
            )));
        }
        if !channel.behavior.serves(&spec.channel.api_version) {
            return Err(rejected(format!(
                "{} does not serve api version '{}'",
                channel.kind, spec.channel.api_version
            )));
        }
        if !state.subscribers.contains_key(&spec.subscriber) {
            return Err(rejected(format!(
                "subscriber '{}' not found",
                spec.subscriber
            )));
        }

        let api_version = format!("{SUBSCRIPTION_GROUP}/{}", spec.version);
        let resource = ResourceRef::new(ResourceKind::Subscription, &spec.name, api_version);
        state
            .subscription_specs
            .insert(spec.name.clone(), spec.clone());
        state.subscriptions.insert(
            spec.name.clone(),
            SubscriptionEntry {
                spec: spec.clone(),
                created_at: Instant::now(),
            },
        );
        state.record(JournalOp::Create, &resource);
        debug!(
            resource = %resource,
            channel = %spec.channel.name,
            target_api_version = %spec.channel.api_version,
            "memory subscription created"
        );
        Ok(resource)
    }

    async fn status(&self, resource: &ResourceRef) -> Result<ResourceStatus, ClusterError> {
        let state = self.state.lock().await;
        let now = Instant::now();
        let not_found = || ClusterError::NotFound {
            kind: resource.kind,
            name: resource.name.clone(),
        };

        let status = match resource.kind {
            ResourceKind::Channel => {
                let channel = state.channels.get(&resource.name).ok_or_else(not_found)?;
                if channel
                    .behavior
                    .is_ready_after(now.saturating_duration_since(channel.created_at))
                {
                    ResourceStatus::ready()
                } else {
                    ResourceStatus::not_ready("channel dispatcher not ready")
                }
            }
            ResourceKind::Subscriber => {
                let subscriber = state.subscribers.get(&resource.name).ok_or_else(not_found)?;
                if now.saturating_duration_since(subscriber.created_at)
                    >= self.config.subscriber_ready_after
                {
                    ResourceStatus::ready()
                } else {
                    ResourceStatus::not_ready("logger pod starting")
                }
            }
            ResourceKind::Subscription => {
                let entry = state.subscriptions.get(&resource.name).ok_or_else(not_found)?;
                if !state.channels.contains_key(&entry.spec.channel.name) {
                    ResourceStatus::not_ready("channel does not exist")
                } else if !state.subscribers.contains_key(&entry.spec.subscriber) {
                    ResourceStatus::not_ready("subscriber does not exist")
                } else if now.saturating_duration_since(entry.created_at)
                    >= self.config.subscription_ready_after
                {
                    ResourceStatus::ready()
                } else {
                    ResourceStatus::not_ready("subscription not yet reconciled")
                }
            }
        };
        Ok(status)
    }

    async fn address_of(&self, resource: &ResourceRef) -> Result<String, ClusterError> {
        let state = self.state.lock().await;
        if state.name_taken(resource.kind, &resource.name) {
            Ok(Self::address(&resource.name))
        } else {
            Err(ClusterError::NotFound {
                kind: resource.kind,
                name: resource.name.clone(),
            })
        }
    }

    async fn delete(&self, resource: &ResourceRef) -> Result<(), ClusterError> {
        let mut state = self.state.lock().await;
        let removed = match resource.kind {
            ResourceKind::Channel => state.channels.remove(&resource.name).is_some(),
            ResourceKind::Subscriber => state.subscribers.remove(&resource.name).is_some(),
            ResourceKind::Subscription => state.subscriptions.remove(&resource.name).is_some(),
        };
        if !removed {
            return Err(ClusterError::NotFound {
                kind: resource.kind,
                name: resource.name.clone(),
            });
        }
        state.record(JournalOp::Delete, resource);
        debug!(resource = %resource, "memory resource deleted");
        Ok(())
    }
}

impl EventPublisher for MemoryCluster {
    async fn publish(
        &self,
        channel: &ResourceRef,
        event: &EventEnvelope,
    ) -> Result<(), ClusterError> {
        let mut state = self.state.lock().await;
        let entry = state
            .channels
            .get(&channel.name)
            .ok_or_else(|| ClusterError::NotFound {
                kind: ResourceKind::Channel,
                name: channel.name.clone(),
            })?;
        if !entry
            .behavior
            .is_ready_after(Instant::now().saturating_duration_since(entry.created_at))
        {
            return Err(ClusterError::Rejected {
                kind: ResourceKind::Channel,
                name: channel.name.clone(),
                reason: "channel is not ready to accept events".to_owned(),
            });
        }

        let copies = entry.behavior.copies;
        let delay = entry.behavior.delivery_delay;
        let channel_api_version = entry.api_version.clone();
        let line = log_line(event);
        let subscribers: Vec<String> = state
            .subscriptions
            .values()
            .filter(|s| s.spec.channel.name == channel.name)
            .map(|s| s.spec.subscriber.clone())
            .collect();
        state.publish_count += 1;

        info!(
            channel = %channel.name,
            api_version = %channel_api_version,
            subscribers = subscribers.len(),
            copies,
            "memory channel accepted event"
        );

        if delay.is_zero() {
            for subscriber in &subscribers {
                state.append(subscriber, &line, copies);
            }
        } else {
            drop(state);
            spawn_delivery(Arc::clone(&self.state), subscribers, line, copies, delay);
        }
        Ok(())
    }
}

impl LogSource for MemoryCluster {
    async fn read(&self, subscriber: &ResourceRef) -> Result<String, ClusterError> {
        let mut state = self.state.lock().await;
        state.log_reads += 1;
        if self.unreachable_logs {
            return Err(ClusterError::Unavailable(format!(
                "log stream for '{}' unavailable",
                subscriber.name
            )));
        }
        state
            .subscribers
            .get(&subscriber.name)
            .map(|entry| entry.output.clone())
            .ok_or_else(|| ClusterError::NotFound {
                kind: ResourceKind::Subscriber,
                name: subscriber.name.clone(),
            })
    }
}

fn spawn_delivery(
    state: Arc<Mutex<ClusterState>>,
    subscribers: Vec<String>,
    line: String,
    copies: u32,
    delay: Duration,
) {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let mut state = state.lock().await;
        for subscriber in &subscribers {
            state.append(subscriber, &line, copies);
        }
    });
}

/// 이벤트 로거가 남기는 한 줄 (JSON)
fn log_line(event: &EventEnvelope) -> String {
    let data = serde_json::from_str::<serde_json::Value>(event.data())
        .unwrap_or_else(|_| serde_json::Value::String(event.data().to_owned()));
    serde_json::json!({
        "id": event.id(),
        "source": event.origin(),
        "type": event.event_type(),
        "encoding": event.encoding().as_str(),
        "data": data,
    })
    .to_string()
}
