//! 시나리오 리소스 생성 및 정리
//!
//! [`ResourceSet`]은 채널 → 구독자 → 구독 순서로 리소스를 생성하고,
//! 생성한 리소스를 즉시 기록하여 중간 단계에서 실패해도 이미 만들어진
//! 리소스를 정리할 수 있게 합니다. 정리는 생성의 역순으로 진행합니다.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use chanprobe_core::cluster::Cluster;
use chanprobe_core::error::{ClusterError, ScenarioError};
use chanprobe_core::metrics as m;
use chanprobe_core::types::{
    ApiVersionPolicy, ChannelReference, MatrixCell, ResourceKind, ResourceRef, SubscriptionSpec,
};

use crate::clock::millis;
use crate::naming::ScenarioNames;

/// 프로비저닝이 끝난 리소스 참조
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Provisioned {
    /// 채널
    pub channel: ResourceRef,
    /// 구독자
    pub subscriber: ResourceRef,
    /// 구독
    pub subscription: ResourceRef,
}

impl Provisioned {
    /// readiness 대기 대상 목록
    pub fn refs(&self) -> [ResourceRef; 3] {
        [
            self.channel.clone(),
            self.subscriber.clone(),
            self.subscription.clone(),
        ]
    }
}

/// teardown 중 삭제에 실패한 리소스
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeardownFailure {
    /// 대상 리소스
    pub resource: ResourceRef,
    /// 실패 사유
    pub reason: String,
}

/// 시나리오 하나의 리소스 묶음
///
/// 시나리오 전용 리소스만 다루며 다른 시나리오의 리소스에는 접근하지 않습니다.
pub struct ResourceSet<C: Cluster> {
    cluster: Arc<C>,
    created: Vec<ResourceRef>,
    teardown_timeout: Duration,
}

impl<C: Cluster> ResourceSet<C> {
    /// 빈 리소스 묶음을 생성합니다.
    pub fn new(cluster: Arc<C>, teardown_timeout: Duration) -> Self {
        Self {
            cluster,
            created: Vec::new(),
            teardown_timeout,
        }
    }

    /// 지금까지 생성된 리소스 (생성 순서)
    pub fn created(&self) -> &[ResourceRef] {
        &self.created
    }

    /// 채널, 구독자, 구독을 순서대로 생성합니다.
    ///
    /// 구독은 두 대상을 이름으로 참조하므로 반드시 마지막에 생성합니다.
    /// 구독 대상 API 버전에는 셀의 API 버전 정책이 적용됩니다.
    pub async fn create(
        &mut self,
        names: &ScenarioNames,
        cell: &MatrixCell,
    ) -> Result<Provisioned, ScenarioError> {
        let channel = self
            .cluster
            .create_channel(&names.channel, &cell.channel)
            .await
            .map_err(|e| provisioning(ResourceKind::Channel, &names.channel, e))?;
        info!(resource = %channel, api_version = %channel.api_version, "channel created");
        self.created.push(channel.clone());

        let subscriber = self
            .cluster
            .create_subscriber(&names.subscriber)
            .await
            .map_err(|e| provisioning(ResourceKind::Subscriber, &names.subscriber, e))?;
        info!(resource = %subscriber, "subscriber created");
        self.created.push(subscriber.clone());

        if let ApiVersionPolicy::Override(target) = &cell.api_version {
            if *target != cell.channel.api_version {
                info!(
                    channel = %names.channel,
                    "changing API version from {} to {}",
                    cell.channel.api_version,
                    target
                );
            }
        }

        let spec = SubscriptionSpec {
            name: names.subscription.clone(),
            version: cell.subscription_version,
            channel: ChannelReference {
                name: channel.name.clone(),
                kind: cell.channel.kind.clone(),
                api_version: cell.effective_api_version().to_owned(),
            },
            subscriber: subscriber.name.clone(),
        };
        let subscription = self
            .cluster
            .create_subscription(&spec)
            .await
            .map_err(|e| provisioning(ResourceKind::Subscription, &names.subscription, e))?;
        info!(
            resource = %subscription,
            subscription_version = %spec.version,
            target_api_version = %spec.channel.api_version,
            "subscription created"
        );
        self.created.push(subscription.clone());

        Ok(Provisioned {
            channel,
            subscriber,
            subscription,
        })
    }

    /// 생성된 리소스를 역순으로 삭제합니다.
    ///
    /// 이미 없는 리소스는 성공으로 취급하며, 그 밖의 실패는 기록만 하고
    /// 시나리오를 실패시키지 않습니다. 두 번째 호출은 아무 것도 하지 않습니다.
    pub async fn teardown(&mut self) -> Vec<TeardownFailure> {
        let mut failures = Vec::new();

        while let Some(resource) = self.created.pop() {
            match tokio::time::timeout(self.teardown_timeout, self.cluster.delete(&resource)).await
            {
                Ok(Ok(())) => debug!(resource = %resource, "resource deleted"),
                Ok(Err(e)) if e.is_not_found() => {
                    debug!(resource = %resource, "resource already gone")
                }
                Ok(Err(e)) => {
                    warn!(resource = %resource, error = %e, "failed to delete resource");
                    failures.push(TeardownFailure {
                        resource,
                        reason: e.to_string(),
                    });
                }
                Err(_elapsed) => {
                    warn!(
                        resource = %resource,
                        timeout_ms = millis(self.teardown_timeout),
                        "resource deletion timed out"
                    );
                    failures.push(TeardownFailure {
                        resource,
                        reason: "delete timed out".to_owned(),
                    });
                }
            }
        }

        if !failures.is_empty() {
            metrics::counter!(m::TEARDOWN_ERRORS_TOTAL).increment(failures.len() as u64);
        }
        failures
    }
}

fn provisioning(kind: ResourceKind, name: &str, err: ClusterError) -> ScenarioError {
    ScenarioError::Provisioning {
        kind,
        name: name.to_owned(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::sync::Mutex;

    use chanprobe_core::types::{ChannelDescriptor, ResourceStatus, SubscriptionVersion};

    /// 호출 순서를 기록하고 지정한 단계에서 실패하는 클러스터
    #[derive(Default)]
    struct RecordingCluster {
        calls: Mutex<Vec<String>>,
        fail_on: Option<ResourceKind>,
        delete_error: Option<ClusterError>,
        hang_delete: Option<ResourceKind>,
        specs: Mutex<Vec<SubscriptionSpec>>,
    }

    impl RecordingCluster {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        fn result(&self, kind: ResourceKind, name: &str) -> Result<ResourceRef, ClusterError> {
            if self.fail_on == Some(kind) {
                return Err(ClusterError::Rejected {
                    kind,
                    name: name.to_owned(),
                    reason: "injected".to_owned(),
                });
            }
            Ok(ResourceRef::new(kind, name, "v1"))
        }
    }

    impl Cluster for RecordingCluster {
        fn create_channel(
            &self,
            name: &str,
            _channel: &ChannelDescriptor,
        ) -> impl Future<Output = Result<ResourceRef, ClusterError>> + Send {
            self.record(format!("create channel/{name}"));
            let result = self.result(ResourceKind::Channel, name);
            async move { result }
        }

        fn create_subscriber(
            &self,
            name: &str,
        ) -> impl Future<Output = Result<ResourceRef, ClusterError>> + Send {
            self.record(format!("create subscriber/{name}"));
            let result = self.result(ResourceKind::Subscriber, name);
            async move { result }
        }

        fn create_subscription(
            &self,
            spec: &SubscriptionSpec,
        ) -> impl Future<Output = Result<ResourceRef, ClusterError>> + Send {
            self.record(format!("create subscription/{}", spec.name));
            self.specs.lock().unwrap().push(spec.clone());
            let result = self.result(ResourceKind::Subscription, &spec.name);
            async move { result }
        }

        async fn status(&self, _resource: &ResourceRef) -> Result<ResourceStatus, ClusterError> {
            Ok(ResourceStatus::ready())
        }

        async fn address_of(&self, resource: &ResourceRef) -> Result<String, ClusterError> {
            Ok(format!("http://{}", resource.name))
        }

        fn delete(
            &self,
            resource: &ResourceRef,
        ) -> impl Future<Output = Result<(), ClusterError>> + Send {
            self.record(format!("delete {resource}"));
            let hang = self.hang_delete == Some(resource.kind);
            let result = match &self.delete_error {
                Some(e) => Err(e.clone()),
                None => Ok(()),
            };
            async move {
                if hang {
                    std::future::pending::<()>().await;
                }
                result
            }
        }
    }

    fn names() -> ScenarioNames {
        ScenarioNames {
            channel: "ch".to_owned(),
            subscriber: "logger".to_owned(),
            subscription: "sub".to_owned(),
            sender: "sender".to_owned(),
        }
    }

    fn cell(policy: ApiVersionPolicy) -> MatrixCell {
        MatrixCell {
            channel: ChannelDescriptor::new("InMemoryChannel", "messaging.knative.dev/v1beta1"),
            subscription_version: SubscriptionVersion::V1Beta1,
            api_version: policy,
        }
    }

    #[tokio::test]
    async fn creates_in_channel_subscriber_subscription_order() {
        let cluster = Arc::new(RecordingCluster::default());
        let mut set = ResourceSet::new(Arc::clone(&cluster), Duration::from_secs(1));

        let provisioned = set.create(&names(), &cell(ApiVersionPolicy::Native)).await.unwrap();

        assert_eq!(
            cluster.calls(),
            vec!["create channel/ch", "create subscriber/logger", "create subscription/sub"]
        );
        assert_eq!(provisioned.subscription.name, "sub");
        assert_eq!(set.created().len(), 3);
    }

    #[tokio::test]
    async fn subscription_targets_overridden_api_version() {
        let cluster = Arc::new(RecordingCluster::default());
        let mut set = ResourceSet::new(Arc::clone(&cluster), Duration::from_secs(1));
        let policy = ApiVersionPolicy::Override("messaging.knative.dev/v1alpha1".to_owned());

        set.create(&names(), &cell(policy)).await.unwrap();

        let specs = cluster.specs.lock().unwrap().clone();
        assert_eq!(specs[0].channel.api_version, "messaging.knative.dev/v1alpha1");
        assert_eq!(specs[0].channel.kind, "InMemoryChannel");
        assert_eq!(specs[0].subscriber, "logger");
    }

    #[tokio::test]
    async fn failure_keeps_earlier_resources_for_teardown() {
        let cluster = Arc::new(RecordingCluster {
            fail_on: Some(ResourceKind::Subscription),
            ..Default::default()
        });
        let mut set = ResourceSet::new(Arc::clone(&cluster), Duration::from_secs(1));

        let err = set
            .create(&names(), &cell(ApiVersionPolicy::Native))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ScenarioError::Provisioning {
                kind: ResourceKind::Subscription,
                ..
            }
        ));
        assert_eq!(set.created().len(), 2);

        let failures = set.teardown().await;
        assert!(failures.is_empty());
        let calls = cluster.calls();
        assert_eq!(
            &calls[3..],
            &["delete subscriber/logger", "delete channel/ch"]
        );
    }

    #[tokio::test]
    async fn teardown_is_reverse_order_and_idempotent() {
        let cluster = Arc::new(RecordingCluster::default());
        let mut set = ResourceSet::new(Arc::clone(&cluster), Duration::from_secs(1));
        set.create(&names(), &cell(ApiVersionPolicy::Native)).await.unwrap();

        assert!(set.teardown().await.is_empty());
        assert!(set.teardown().await.is_empty());

        let deletes: Vec<_> = cluster
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("delete"))
            .collect();
        assert_eq!(
            deletes,
            vec![
                "delete subscription/sub",
                "delete subscriber/logger",
                "delete channel/ch"
            ]
        );
    }

    #[tokio::test]
    async fn teardown_treats_not_found_as_success() {
        let cluster = Arc::new(RecordingCluster {
            delete_error: Some(ClusterError::NotFound {
                kind: ResourceKind::Channel,
                name: "ch".to_owned(),
            }),
            ..Default::default()
        });
        let mut set = ResourceSet::new(Arc::clone(&cluster), Duration::from_secs(1));
        set.create(&names(), &cell(ApiVersionPolicy::Native)).await.unwrap();

        assert!(set.teardown().await.is_empty());
    }

    #[tokio::test]
    async fn teardown_collects_other_failures() {
        let cluster = Arc::new(RecordingCluster {
            delete_error: Some(ClusterError::Unavailable("api down".to_owned())),
            ..Default::default()
        });
        let mut set = ResourceSet::new(Arc::clone(&cluster), Duration::from_secs(1));
        set.create(&names(), &cell(ApiVersionPolicy::Native)).await.unwrap();

        let failures = set.teardown().await;
        assert_eq!(failures.len(), 3);
        assert!(failures[0].reason.contains("api down"));
        assert_eq!(failures[0].resource.kind, ResourceKind::Subscription);
        // 실패해도 목록은 비워져 재호출은 no-op
        assert!(set.teardown().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_times_out_hung_delete_and_continues() {
        let cluster = Arc::new(RecordingCluster {
            hang_delete: Some(ResourceKind::Subscriber),
            ..Default::default()
        });
        let mut set = ResourceSet::new(Arc::clone(&cluster), Duration::from_secs(2));
        set.create(&names(), &cell(ApiVersionPolicy::Native)).await.unwrap();

        let started = tokio::time::Instant::now();
        let failures = set.teardown().await;

        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].resource.kind, ResourceKind::Subscriber);
        assert_eq!(failures[0].reason, "delete timed out");
        assert_eq!(started.elapsed(), Duration::from_secs(2));

        let deletes: Vec<_> = cluster
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("delete"))
            .collect();
        assert_eq!(
            deletes,
            vec![
                "delete subscription/sub",
                "delete subscriber/logger",
                "delete channel/ch"
            ]
        );
        assert!(set.created().is_empty());
    }

    #[test]
    fn provisioned_refs_are_in_creation_order() {
        let provisioned = Provisioned {
            channel: ResourceRef::new(ResourceKind::Channel, "c", "v1"),
            subscriber: ResourceRef::new(ResourceKind::Subscriber, "s", "v1"),
            subscription: ResourceRef::new(ResourceKind::Subscription, "b", "v1"),
        };
        let kinds: Vec<_> = provisioned.refs().iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ResourceKind::Channel,
                ResourceKind::Subscriber,
                ResourceKind::Subscription
            ]
        );
    }
}
