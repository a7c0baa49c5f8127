//! 통합 테스트 -- 인메모리 클러스터를 대상으로 매트릭스 전체 흐름 검증
//!
//! 프로비저닝 → readiness 대기 → 발행 → 전달 확인 → teardown 흐름을
//! tokio 가상 시간(`start_paused`)에서 실행합니다.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chanprobe_core::cluster::Cluster;
use chanprobe_core::error::{ScenarioError, ScenarioStep};
use chanprobe_core::event::Encoding;
use chanprobe_core::types::{
    ApiVersionPolicy, ChannelDescriptor, ResourceKind, SubscriptionVersion,
};
use chanprobe_harness::{
    DeliveryBackoff, DeliveryPolicy, DeliveryVerifier, MatrixReport, ReadinessPolicy, ResourceSet,
    RunOptions, RunOptionsBuilder, ScenarioNames, ScenarioOutcome, TestMatrixRunner,
    TestMatrixRunnerBuilder, TokioClock,
};
use chanprobe_memory_cluster::{ChannelBehavior, JournalOp, MemoryCluster, MemoryClusterConfig};
use tokio_util::sync::CancellationToken;

const V1ALPHA1: &str = "messaging.knative.dev/v1alpha1";
const V1BETA1: &str = "messaging.knative.dev/v1beta1";

type MemoryRunner = TestMatrixRunner<MemoryCluster, MemoryCluster, MemoryCluster>;

fn memory(kind: &str, behavior: ChannelBehavior) -> Arc<MemoryCluster> {
    Arc::new(MemoryCluster::new(
        MemoryClusterConfig::new()
            .with_kind(kind, behavior)
            .subscriber_ready_after(Duration::from_millis(200))
            .subscription_ready_after(Duration::from_millis(100)),
    ))
}

fn runner(cluster: &Arc<MemoryCluster>) -> MemoryRunner {
    TestMatrixRunnerBuilder::new()
        .backend(Arc::clone(cluster))
        .build()
        .unwrap()
}

fn options() -> RunOptionsBuilder {
    RunOptionsBuilder::new()
        .readiness(ReadinessPolicy {
            poll_interval: Duration::from_millis(100),
            max_wait: Duration::from_secs(5),
        })
        .delivery(DeliveryPolicy {
            poll_interval: Duration::from_millis(100),
            backoff: DeliveryBackoff::Fixed,
            max_attempts: 50,
            max_wait: Duration::from_secs(5),
        })
}

fn in_memory_channel() -> ChannelDescriptor {
    ChannelDescriptor::new("InMemoryChannel", V1BETA1)
}

fn single_outcome(report: &MatrixReport) -> &ScenarioOutcome {
    assert_eq!(report.results.len(), 1);
    &report.results[0].outcome
}

// --- 종단 시나리오 ---

#[tokio::test(start_paused = true)]
async fn native_binary_event_is_delivered() {
    let cluster = Arc::new(MemoryCluster::default());
    let report = runner(&cluster)
        .run(
            &[in_memory_channel()],
            &[SubscriptionVersion::V1Beta1],
            &options().encoding(Encoding::Binary).build().unwrap(),
        )
        .await;

    let result = &report.results[0];
    match &result.outcome {
        ScenarioOutcome::Passed { verification } => {
            assert!(verification.matched);
            assert_eq!(verification.occurrences, 1);
            assert!(verification.observed_after <= Duration::from_secs(5));
        }
        other => panic!("expected pass, got {other:?}"),
    }
    let payload = result.payload.as_deref().unwrap();
    assert!(payload.starts_with("TestSingleEvent-"));
    assert!(result.names.channel.starts_with("e2e-singleevent-channel-binary"));
    assert_eq!(cluster.publish_count().await, 1);
    assert_eq!(cluster.resource_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn never_ready_channel_times_out_and_is_torn_down() {
    let cluster = memory("InMemoryChannel", ChannelBehavior::new(V1BETA1).never_ready());
    let options = options()
        .readiness(ReadinessPolicy {
            poll_interval: Duration::from_millis(100),
            max_wait: Duration::from_secs(2),
        })
        .build()
        .unwrap();

    let report = runner(&cluster)
        .run(&[in_memory_channel()], &[SubscriptionVersion::V1Beta1], &options)
        .await;

    match single_outcome(&report) {
        ScenarioOutcome::Failed {
            step: ScenarioStep::Readiness,
            error: ScenarioError::ReadinessTimeout { waited, not_ready },
        } => {
            assert_eq!(*waited, Duration::from_secs(2));
            assert_eq!(not_ready.len(), 1);
            assert!(not_ready[0].starts_with("channel/"));
        }
        other => panic!("expected readiness timeout, got {other:?}"),
    }
    assert_eq!(cluster.resource_count().await, 0);
    assert_eq!(cluster.publish_count().await, 0);
    assert_eq!(cluster.log_reads().await, 0);
}

#[tokio::test(start_paused = true)]
async fn version_override_targets_subscription_binding() {
    let cluster = memory(
        "InMemoryChannel",
        ChannelBehavior::new(V1BETA1).serving(V1ALPHA1),
    );
    let options = options()
        .api_version(ApiVersionPolicy::Override(V1ALPHA1.to_owned()))
        .build()
        .unwrap();

    let report = runner(&cluster)
        .run(&[in_memory_channel()], &[SubscriptionVersion::V1Beta1], &options)
        .await;

    assert_eq!(report.passed, 1);
    let names = &report.results[0].names;
    let spec = cluster.subscription(&names.subscription).await.unwrap();
    assert_eq!(spec.channel.api_version, V1ALPHA1);
    assert_ne!(spec.channel.api_version, in_memory_channel().api_version);
    assert_eq!(spec.version, SubscriptionVersion::V1Beta1);
}

#[tokio::test(start_paused = true)]
async fn unserved_override_fails_provisioning_and_cleans_up() {
    let cluster = memory("InMemoryChannel", ChannelBehavior::new(V1BETA1));
    let options = options()
        .api_version(ApiVersionPolicy::Override(V1ALPHA1.to_owned()))
        .build()
        .unwrap();

    let report = runner(&cluster)
        .run(&[in_memory_channel()], &[SubscriptionVersion::V1Alpha1], &options)
        .await;

    match single_outcome(&report) {
        ScenarioOutcome::Failed {
            step: ScenarioStep::Provision,
            error: ScenarioError::Provisioning { kind, .. },
        } => assert_eq!(*kind, ResourceKind::Subscription),
        other => panic!("expected provisioning failure, got {other:?}"),
    }

    let ops: Vec<_> = cluster
        .journal()
        .await
        .into_iter()
        .map(|e| (e.op, e.resource.kind))
        .collect();
    assert_eq!(
        ops,
        vec![
            (JournalOp::Create, ResourceKind::Channel),
            (JournalOp::Create, ResourceKind::Subscriber),
            (JournalOp::Delete, ResourceKind::Subscriber),
            (JournalOp::Delete, ResourceKind::Channel),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn unpublished_payload_exhausts_attempts() {
    let cluster = memory("InMemoryChannel", ChannelBehavior::new(V1BETA1));
    let subscriber = cluster.create_subscriber("logger").await.unwrap();
    let verifier = DeliveryVerifier::new(
        Arc::clone(&cluster),
        Arc::new(TokioClock),
        DeliveryPolicy {
            poll_interval: Duration::from_millis(100),
            backoff: DeliveryBackoff::Fixed,
            max_attempts: 5,
            max_wait: Duration::from_secs(60),
        },
    );

    let result = verifier
        .confirm(&subscriber, "TestSingleEvent-never-sent", &CancellationToken::new())
        .await
        .unwrap();

    assert!(!result.matched);
    assert_eq!(result.attempts, 5);
    assert_eq!(cluster.log_reads().await, 5);

    let err = result.into_outcome("TestSingleEvent-never-sent").unwrap_err();
    assert!(matches!(err, ScenarioError::DeliveryNotObserved { attempts: 5, .. }));
    assert!(!err.is_infrastructure());
}

// --- 매트릭스 성질 ---

#[tokio::test(start_paused = true)]
async fn failing_cells_do_not_affect_siblings() {
    let cluster = Arc::new(MemoryCluster::new(
        MemoryClusterConfig::new()
            .with_kind("InMemoryChannel", ChannelBehavior::new(V1BETA1))
            .with_kind("LossyChannel", ChannelBehavior::new(V1BETA1).copies(0)),
    ));
    let channels = [
        ChannelDescriptor::new("LossyChannel", V1BETA1),
        in_memory_channel(),
    ];
    let versions = [SubscriptionVersion::V1Alpha1, SubscriptionVersion::V1Beta1];
    let options = options().max_parallel(4).build().unwrap();

    let report = runner(&cluster).run(&channels, &versions, &options).await;

    assert_eq!(report.results.len(), 4);
    assert_eq!(report.failed, 2);
    assert_eq!(report.passed, 2);
    for result in &report.results {
        let lossy = result.cell.channel.kind == "LossyChannel";
        match &result.outcome {
            ScenarioOutcome::Failed {
                step: ScenarioStep::Verify,
                error: ScenarioError::DeliveryNotObserved { payload, .. },
            } => {
                assert!(lossy);
                assert_eq!(Some(payload), result.payload.as_ref());
            }
            ScenarioOutcome::Passed { .. } => assert!(!lossy),
            other => panic!("unexpected outcome {other:?}"),
        }
    }
    assert_eq!(cluster.resource_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn results_follow_matrix_order() {
    let cluster = Arc::new(MemoryCluster::new(
        MemoryClusterConfig::new()
            .with_kind("InMemoryChannel", ChannelBehavior::new(V1BETA1))
            .with_kind(
                "SlowChannel",
                ChannelBehavior::new(V1BETA1).ready_after(Duration::from_secs(2)),
            ),
    ));
    let channels = [
        ChannelDescriptor::new("SlowChannel", V1BETA1),
        in_memory_channel(),
    ];

    let report = runner(&cluster)
        .run(
            &channels,
            &SubscriptionVersion::ALL,
            &options().max_parallel(6).build().unwrap(),
        )
        .await;

    let indices: Vec<_> = report.results.iter().map(|r| r.index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3, 4, 5]);
    assert_eq!(report.results[0].cell.channel.kind, "SlowChannel");
    assert_eq!(report.results[3].cell.channel.kind, "InMemoryChannel");
    assert!(report.is_success());
}

#[tokio::test(start_paused = true)]
async fn concurrent_scenarios_never_share_names() {
    let cluster = Arc::new(MemoryCluster::new(
        MemoryClusterConfig::new()
            .with_kind("InMemoryChannel", ChannelBehavior::new(V1BETA1).serving(V1ALPHA1))
            .with_kind("KafkaChannel", ChannelBehavior::new(V1ALPHA1)),
    ));
    let channels = [
        in_memory_channel(),
        ChannelDescriptor::new("InMemoryChannel", V1ALPHA1),
        ChannelDescriptor::new("KafkaChannel", V1ALPHA1),
    ];

    let report = runner(&cluster)
        .run(
            &channels,
            &SubscriptionVersion::ALL,
            &options().max_parallel(9).build().unwrap(),
        )
        .await;
    assert!(report.is_success());

    let created: Vec<_> = cluster
        .journal()
        .await
        .into_iter()
        .filter(|e| e.op == JournalOp::Create)
        .map(|e| (e.resource.kind, e.resource.name))
        .collect();
    assert_eq!(created.len(), 9 * 3);
    let unique: HashSet<_> = created.iter().collect();
    assert_eq!(unique.len(), created.len());
}

#[tokio::test(start_paused = true)]
async fn lifecycle_follows_creation_and_reverse_teardown_order() {
    let cluster = memory("InMemoryChannel", ChannelBehavior::new(V1BETA1));
    let report = runner(&cluster)
        .run(
            &[in_memory_channel()],
            &[SubscriptionVersion::V1],
            &options().build().unwrap(),
        )
        .await;
    assert!(report.is_success());

    let ops: Vec<_> = cluster
        .journal()
        .await
        .into_iter()
        .map(|e| (e.op, e.resource.kind))
        .collect();
    assert_eq!(
        ops,
        vec![
            (JournalOp::Create, ResourceKind::Channel),
            (JournalOp::Create, ResourceKind::Subscriber),
            (JournalOp::Create, ResourceKind::Subscription),
            (JournalOp::Delete, ResourceKind::Subscription),
            (JournalOp::Delete, ResourceKind::Subscriber),
            (JournalOp::Delete, ResourceKind::Channel),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn teardown_twice_is_harmless_to_other_scenarios() {
    let cluster = memory("InMemoryChannel", ChannelBehavior::new(V1BETA1));
    let options = RunOptions::default();
    let cells: Vec<_> = chanprobe_harness::plan_matrix(
        &[in_memory_channel()],
        &[SubscriptionVersion::V1Alpha1, SubscriptionVersion::V1Beta1],
        &options,
    )
    .into_iter()
    .map(|e| e.scenario)
    .collect();

    let mut first = ResourceSet::new(Arc::clone(&cluster), options.teardown_timeout);
    let mut second = ResourceSet::new(Arc::clone(&cluster), options.teardown_timeout);
    first.create(&cells[0].names, &cells[0].cell).await.unwrap();
    second.create(&cells[1].names, &cells[1].cell).await.unwrap();
    assert_eq!(cluster.resource_count().await, 6);

    assert!(first.teardown().await.is_empty());
    assert!(first.teardown().await.is_empty());

    assert_eq!(cluster.resource_count().await, 3);
    assert_eq!(second.created().len(), 3);
    assert!(second.teardown().await.is_empty());
    assert_eq!(cluster.resource_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn larger_delivery_budget_only_turns_misses_into_matches() {
    let behavior = ChannelBehavior::new(V1BETA1).delivery_delay(Duration::from_secs(2));
    let budget = |max_wait: Duration| {
        options()
            .delivery(DeliveryPolicy {
                poll_interval: Duration::from_millis(100),
                backoff: DeliveryBackoff::Fixed,
                max_attempts: 1000,
                max_wait,
            })
            .build()
            .unwrap()
    };

    let mut previously_matched = false;
    for secs in [1, 3, 10] {
        let cluster = memory("InMemoryChannel", behavior.clone());
        let report = runner(&cluster)
            .run(
                &[in_memory_channel()],
                &[SubscriptionVersion::V1Beta1],
                &budget(Duration::from_secs(secs)),
            )
            .await;
        let matched = report.passed == 1;
        assert!(matched || !previously_matched, "budget {secs}s regressed");
        previously_matched = matched;

        if secs == 1 {
            assert!(matches!(
                single_outcome(&report),
                ScenarioOutcome::Failed {
                    error: ScenarioError::DeliveryNotObserved { .. },
                    ..
                }
            ));
        }
    }
    assert!(previously_matched);
}

#[tokio::test(start_paused = true)]
async fn exponential_backoff_still_observes_delivery() {
    let cluster = memory(
        "InMemoryChannel",
        ChannelBehavior::new(V1BETA1).delivery_delay(Duration::from_secs(1)),
    );
    let options = options()
        .delivery(DeliveryPolicy {
            poll_interval: Duration::from_millis(100),
            backoff: DeliveryBackoff::Exponential {
                max_interval: Duration::from_secs(1),
            },
            max_attempts: 20,
            max_wait: Duration::from_secs(10),
        })
        .build()
        .unwrap();

    let report = runner(&cluster)
        .run(&[in_memory_channel()], &[SubscriptionVersion::V1Beta1], &options)
        .await;

    match single_outcome(&report) {
        ScenarioOutcome::Passed { verification } => assert!(verification.attempts < 10),
        other => panic!("expected pass, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn duplicate_delivery_still_passes() {
    let cluster = memory("InMemoryChannel", ChannelBehavior::new(V1BETA1).copies(2));
    let report = runner(&cluster)
        .run(
            &[in_memory_channel()],
            &[SubscriptionVersion::V1Beta1],
            &options().build().unwrap(),
        )
        .await;

    match single_outcome(&report) {
        ScenarioOutcome::Passed { verification } => assert_eq!(verification.occurrences, 2),
        other => panic!("expected pass, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn unreachable_subscriber_output_is_an_infrastructure_failure() {
    let cluster = Arc::new(
        MemoryCluster::new(
            MemoryClusterConfig::new().with_kind("InMemoryChannel", ChannelBehavior::new(V1BETA1)),
        )
        .with_unreachable_logs(),
    );
    let report = runner(&cluster)
        .run(
            &[in_memory_channel()],
            &[SubscriptionVersion::V1Beta1],
            &options().build().unwrap(),
        )
        .await;

    match single_outcome(&report) {
        ScenarioOutcome::Failed {
            step: ScenarioStep::Verify,
            error,
        } => {
            assert!(matches!(error, ScenarioError::SubscriberUnreachable { .. }));
            assert!(error.is_infrastructure());
        }
        other => panic!("expected unreachable subscriber, got {other:?}"),
    }
    assert_eq!(cluster.resource_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn run_deadline_cancels_waits_but_still_tears_down() {
    let cluster = memory("InMemoryChannel", ChannelBehavior::new(V1BETA1).never_ready());
    let options = options()
        .readiness(ReadinessPolicy {
            poll_interval: Duration::from_millis(500),
            max_wait: Duration::from_secs(600),
        })
        .run_deadline(Duration::from_secs(1))
        .build()
        .unwrap();

    let report = runner(&cluster)
        .run(&[in_memory_channel()], &[SubscriptionVersion::V1Beta1], &options)
        .await;

    match single_outcome(&report) {
        ScenarioOutcome::Failed { step, error } => {
            assert_eq!(*step, ScenarioStep::Readiness);
            assert_eq!(
                *error,
                ScenarioError::DeadlineExceeded {
                    step: ScenarioStep::Readiness,
                    deadline: Duration::from_secs(1),
                }
            );
        }
        other => panic!("expected deadline failure, got {other:?}"),
    }
    assert_eq!(cluster.resource_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn external_cancel_is_reported_apart_from_deadline() {
    let cluster = memory("InMemoryChannel", ChannelBehavior::new(V1BETA1).never_ready());
    let options = options()
        .readiness(ReadinessPolicy {
            poll_interval: Duration::from_millis(500),
            max_wait: Duration::from_secs(600),
        })
        .run_deadline(Duration::from_secs(60))
        .build()
        .unwrap();
    let runner = runner(&cluster);
    let cancel = runner.cancel_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
    });

    let report = runner
        .run(&[in_memory_channel()], &[SubscriptionVersion::V1Beta1], &options)
        .await;

    match single_outcome(&report) {
        ScenarioOutcome::Failed { error, .. } => {
            assert_eq!(
                *error,
                ScenarioError::Cancelled {
                    step: ScenarioStep::Readiness
                }
            );
            assert_eq!(error.kind_name(), "cancelled");
        }
        other => panic!("expected cancellation, got {other:?}"),
    }
    assert_eq!(cluster.resource_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn report_serializes_to_json() {
    let cluster = memory("InMemoryChannel", ChannelBehavior::new(V1BETA1).copies(0));
    let report = runner(&cluster)
        .run(
            &[in_memory_channel()],
            &[SubscriptionVersion::V1Beta1],
            &options()
                .delivery(DeliveryPolicy {
                    poll_interval: Duration::from_millis(100),
                    backoff: DeliveryBackoff::Fixed,
                    max_attempts: 3,
                    max_wait: Duration::from_secs(5),
                })
                .build()
                .unwrap(),
        )
        .await;

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["failed"], 1);
    let outcome = &json["results"][0]["outcome"];
    assert_eq!(outcome["status"], "failed");
    assert_eq!(outcome["step"], "verify");
    assert_eq!(outcome["error"]["error"], "delivery_not_observed");
    assert_eq!(outcome["error"]["attempts"], 3);
}

#[test]
fn names_are_stable_for_the_same_identity() {
    let a = ScenarioNames::derive(
        "e2e-singleevent",
        Encoding::Structured,
        SubscriptionVersion::V1Alpha1,
        &in_memory_channel(),
        &ApiVersionPolicy::Native,
    );
    let b = ScenarioNames::derive(
        "e2e-singleevent",
        Encoding::Structured,
        SubscriptionVersion::V1Alpha1,
        &in_memory_channel(),
        &ApiVersionPolicy::Native,
    );
    assert_eq!(a, b);
    assert!(a.sender.starts_with("e2e-singleevent-sender-structured"));
}
