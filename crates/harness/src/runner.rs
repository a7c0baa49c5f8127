//! 매트릭스 실행기: 셀마다 독립 시나리오를 실행하고 결과를 모읍니다.
//!
//! [`TestMatrixRunner`]는 core의 세 협력자 trait([`Cluster`], [`EventPublisher`],
//! [`LogSource`])만 통해 클러스터에 접근하므로 채널 kind에 따라 분기하지 않습니다.
//!
//! # 시나리오 흐름
//! ```text
//! ScenarioNames::derive
//!        |
//! ResourceSet::create ──> ReadinessGate::wait_all ──> publish ──> DeliveryVerifier::confirm
//!        |                                                                  |
//!        +────────────────────── ResourceSet::teardown (항상) <────────────+
//! ```
//!
//! 셀 하나의 실패는 그 셀의 결과로만 남고 다른 셀에 영향을 주지 않습니다.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use chanprobe_core::cluster::{Cluster, EventPublisher, LogSource};
use chanprobe_core::error::{ConfigError, ScenarioError, ScenarioStep};
use chanprobe_core::event::EventEnvelope;
use chanprobe_core::metrics as m;
use chanprobe_core::types::{ChannelDescriptor, SubscriptionVersion};

use crate::clock::{Clock, TokioClock, millis};
use crate::config::RunOptions;
use crate::readiness::ReadinessGate;
use crate::resources::ResourceSet;
use crate::scenario::{MatrixReport, Scenario, ScenarioOutcome, ScenarioResult, plan_matrix};
use crate::verifier::{DeliveryVerifier, VerificationResult};

/// 채널 적합성 매트릭스 실행기
///
/// # 사용 예시
/// ```ignore
/// use chanprobe_harness::{RunOptions, TestMatrixRunnerBuilder};
///
/// let runner = TestMatrixRunnerBuilder::new()
///     .backend(Arc::new(cluster))
///     .build()?;
///
/// let report = runner.run(&channels, &SubscriptionVersion::ALL, &RunOptions::default()).await;
/// assert!(report.is_success());
/// ```
pub struct TestMatrixRunner<C, P, L, K = TokioClock>
where
    C: Cluster,
    P: EventPublisher,
    L: LogSource,
    K: Clock,
{
    cluster: Arc<C>,
    publisher: Arc<P>,
    logs: Arc<L>,
    clock: Arc<K>,
    cancel: CancellationToken,
}

impl<C, P, L, K> TestMatrixRunner<C, P, L, K>
where
    C: Cluster,
    P: EventPublisher,
    L: LogSource,
    K: Clock,
{
    /// 외부 취소용 토큰
    ///
    /// 취소하면 진행 중인 대기가 중단되고, 각 셀은 teardown을 마친 뒤
    /// `Cancelled`로 보고됩니다. 실행 데드라인에 의한 중단은
    /// `DeadlineExceeded`로 따로 보고됩니다.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 매트릭스 전체를 실행합니다.
    ///
    /// 결과는 셀 순서(채널 우선)로 반환되며, 건너뛴 셀도 모두 포함됩니다.
    pub async fn run(
        &self,
        channels: &[ChannelDescriptor],
        versions: &[SubscriptionVersion],
        options: &RunOptions,
    ) -> MatrixReport {
        let plan = plan_matrix(channels, versions, options);
        info!(
            cells = plan.len(),
            channels = channels.len(),
            subscription_versions = versions.len(),
            max_parallel = options.max_parallel,
            api_version = %options.api_version,
            "starting test matrix"
        );

        let run_cancel = self.cancel.child_token();
        let deadline_hit = Arc::new(AtomicBool::new(false));
        let deadline = options.run_deadline.map(|limit| {
            (
                limit,
                spawn_deadline(limit, run_cancel.clone(), Arc::clone(&deadline_hit)),
            )
        });

        let executor = Arc::new(Executor {
            cluster: Arc::clone(&self.cluster),
            publisher: Arc::clone(&self.publisher),
            logs: Arc::clone(&self.logs),
            clock: Arc::clone(&self.clock),
            options: options.clone(),
        });
        let semaphore = Arc::new(Semaphore::new(options.max_parallel.max(1)));

        let mut results = Vec::with_capacity(plan.len());
        let mut tasks = JoinSet::new();
        let mut in_flight = HashMap::new();

        for entry in plan {
            if let Some(reason) = entry.skip {
                info!(
                    index = entry.scenario.index,
                    cell = %entry.scenario.cell,
                    reason = %reason,
                    "skipping matrix cell"
                );
                let result = ScenarioResult::skipped(entry.scenario, reason);
                record_result(&result);
                results.push(result);
                continue;
            }

            let scenario = entry.scenario;
            let executor = Arc::clone(&executor);
            let semaphore = Arc::clone(&semaphore);
            let cancel = run_cancel.clone();
            let span = info_span!(
                "scenario",
                index = scenario.index,
                channel_kind = %scenario.cell.channel.kind,
                subscription_version = %scenario.cell.subscription_version,
            );
            let placeholder = scenario.clone();

            let handle = tasks.spawn(
                async move {
                    let permit = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            return unstarted(scenario, ScenarioError::Cancelled {
                                step: ScenarioStep::Provision,
                            });
                        }
                        permit = semaphore.acquire_owned() => permit,
                    };
                    let _permit = match permit {
                        Ok(permit) => permit,
                        Err(e) => {
                            return unstarted(scenario, ScenarioError::Internal {
                                reason: e.to_string(),
                            });
                        }
                    };
                    executor.execute(scenario, &cancel).await
                }
                .instrument(span),
            );
            in_flight.insert(handle.id(), placeholder);
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            let result = match joined {
                Ok((id, result)) => {
                    in_flight.remove(&id);
                    result
                }
                Err(e) => {
                    error!(error = %e, "scenario task failed");
                    match in_flight.remove(&e.id()) {
                        Some(scenario) => unstarted(
                            scenario,
                            ScenarioError::Internal {
                                reason: e.to_string(),
                            },
                        ),
                        None => continue,
                    }
                }
            };
            let result = match &deadline {
                Some((limit, _)) if deadline_hit.load(Ordering::Acquire) => {
                    deadline_exceeded(result, *limit)
                }
                _ => result,
            };
            record_result(&result);
            results.push(result);
        }

        if let Some((_, handle)) = deadline {
            handle.abort();
        }

        let report = MatrixReport::from_results(results);
        info!(
            passed = report.passed,
            failed = report.failed,
            skipped = report.skipped,
            "test matrix finished"
        );
        report
    }
}

/// 진행 중인 시나리오의 현재 단계와 발행한 payload
struct Progress {
    step: ScenarioStep,
    payload: Option<String>,
}

/// 시나리오 하나를 실행하는 데 필요한 공유 상태
struct Executor<C, P, L, K> {
    cluster: Arc<C>,
    publisher: Arc<P>,
    logs: Arc<L>,
    clock: Arc<K>,
    options: RunOptions,
}

impl<C, P, L, K> Executor<C, P, L, K>
where
    C: Cluster,
    P: EventPublisher,
    L: LogSource,
    K: Clock,
{
    async fn execute(&self, scenario: Scenario, cancel: &CancellationToken) -> ScenarioResult {
        let started = self.clock.now();
        let mut resources = ResourceSet::new(Arc::clone(&self.cluster), self.options.teardown_timeout);
        let mut progress = Progress {
            step: ScenarioStep::Provision,
            payload: None,
        };

        // 협력자가 패닉해도 이미 만든 리소스는 아래 teardown에서 정리됨
        let driven = AssertUnwindSafe(self.drive(&scenario, &mut resources, &mut progress, cancel))
            .catch_unwind()
            .await;
        let outcome = match driven {
            Ok(Ok(verification)) => {
                info!(
                    attempts = verification.attempts,
                    occurrences = verification.occurrences,
                    observed_after_ms = millis(verification.observed_after),
                    "scenario passed"
                );
                ScenarioOutcome::Passed { verification }
            }
            Ok(Err((step, error))) => {
                warn!(step = %step, error = %error, "scenario failed");
                ScenarioOutcome::Failed { step, error }
            }
            Err(panic) => {
                let error = ScenarioError::Internal {
                    reason: format!("scenario panicked: {}", panic_message(&*panic)),
                };
                error!(step = %progress.step, error = %error, "scenario panicked");
                ScenarioOutcome::Failed {
                    step: progress.step,
                    error,
                }
            }
        };

        let teardown_failures = resources.teardown().await;
        if !teardown_failures.is_empty() {
            warn!(
                failures = teardown_failures.len(),
                "teardown left resources behind"
            );
        }

        ScenarioResult {
            index: scenario.index,
            cell: scenario.cell,
            names: scenario.names,
            payload: progress.payload,
            outcome,
            elapsed: self.clock.now().saturating_duration_since(started),
            teardown_failures,
        }
    }

    async fn drive(
        &self,
        scenario: &Scenario,
        resources: &mut ResourceSet<C>,
        progress: &mut Progress,
        cancel: &CancellationToken,
    ) -> Result<VerificationResult, (ScenarioStep, ScenarioError)> {
        // 생성 도중에는 취소하지 않음: 만들어진 리소스가 기록되지 않은 채 남을 수 있음
        check_cancelled(cancel, ScenarioStep::Provision)?;
        info!(names = %scenario.names, "provisioning resources");
        let provisioned = resources
            .create(&scenario.names, &scenario.cell)
            .await
            .map_err(|e| (ScenarioStep::Provision, e))?;

        progress.step = ScenarioStep::Readiness;
        let gate = ReadinessGate::new(
            Arc::clone(&self.cluster),
            Arc::clone(&self.clock),
            self.options.readiness.poll_interval,
        );
        let readiness = gate
            .wait_all(&provisioned.refs(), self.options.readiness.max_wait, cancel)
            .await
            .map_err(|e| (ScenarioStep::Readiness, e))?;
        metrics::histogram!(m::READINESS_WAIT_SECONDS).record(readiness.waited.as_secs_f64());
        info!(
            waited_ms = millis(readiness.waited),
            polls = readiness.polls,
            "all resources ready"
        );

        progress.step = ScenarioStep::Publish;
        check_cancelled(cancel, ScenarioStep::Publish)?;
        let event = EventEnvelope::single_event(&scenario.names.sender, scenario.encoding);
        progress.payload = Some(event.payload().to_owned());
        let address = self
            .cluster
            .address_of(&provisioned.channel)
            .await
            .map_err(|e| publish_failed(&provisioned.channel.name, e.to_string()))?;
        info!(address = %address, event = %event, "publishing event");
        self.publisher
            .publish(&provisioned.channel, &event)
            .await
            .map_err(|e| publish_failed(&provisioned.channel.name, e.to_string()))?;

        progress.step = ScenarioStep::Verify;
        let verifier = DeliveryVerifier::new(
            Arc::clone(&self.logs),
            Arc::clone(&self.clock),
            self.options.delivery,
        );
        verifier
            .confirm(&provisioned.subscriber, event.payload(), cancel)
            .await
            .and_then(|result| result.into_outcome(event.payload()))
            .map_err(|e| (ScenarioStep::Verify, e))
    }
}

fn check_cancelled(
    cancel: &CancellationToken,
    step: ScenarioStep,
) -> Result<(), (ScenarioStep, ScenarioError)> {
    if cancel.is_cancelled() {
        return Err((step, ScenarioError::Cancelled { step }));
    }
    Ok(())
}

fn publish_failed(channel: &str, reason: String) -> (ScenarioStep, ScenarioError) {
    (
        ScenarioStep::Publish,
        ScenarioError::Publish {
            channel: channel.to_owned(),
            reason,
        },
    )
}

/// 리소스를 만들기 전에 끝난 셀의 결과
fn unstarted(scenario: Scenario, error: ScenarioError) -> ScenarioResult {
    let step = match &error {
        ScenarioError::Cancelled { step } => *step,
        _ => ScenarioStep::Provision,
    };
    ScenarioResult {
        index: scenario.index,
        cell: scenario.cell,
        names: scenario.names,
        payload: None,
        outcome: ScenarioOutcome::Failed { step, error },
        elapsed: Duration::ZERO,
        teardown_failures: Vec::new(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

/// 데드라인 때문에 취소된 셀을 `DeadlineExceeded`로 바꿉니다.
fn deadline_exceeded(mut result: ScenarioResult, deadline: Duration) -> ScenarioResult {
    if let ScenarioOutcome::Failed { error, .. } = &mut result.outcome {
        if let ScenarioError::Cancelled { step } = *error {
            *error = ScenarioError::DeadlineExceeded { step, deadline };
        }
    }
    result
}

fn spawn_deadline(
    limit: Duration,
    cancel: CancellationToken,
    hit: Arc<AtomicBool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(limit) => {
                warn!(deadline_secs = limit.as_secs(), "run deadline reached, cancelling scenarios");
                hit.store(true, Ordering::Release);
                cancel.cancel();
            }
        }
    })
}

fn record_result(result: &ScenarioResult) {
    metrics::counter!(
        m::SCENARIOS_TOTAL,
        m::LABEL_RESULT => result.outcome.label(),
        m::LABEL_CHANNEL_KIND => result.cell.channel.kind.clone(),
        m::LABEL_SUBSCRIPTION_VERSION => result.cell.subscription_version.as_str(),
    )
    .increment(1);

    if let ScenarioOutcome::Failed { error, .. } = &result.outcome {
        metrics::counter!(m::SCENARIO_FAILURES_TOTAL, m::LABEL_ERROR_KIND => error.kind_name())
            .increment(1);
    }
    if !matches!(result.outcome, ScenarioOutcome::Skipped { .. }) {
        metrics::histogram!(m::SCENARIO_DURATION_SECONDS).record(result.elapsed.as_secs_f64());
    }
    debug!(index = result.index, result = result.outcome.label(), "scenario recorded");
}

/// 매트릭스 실행기 빌더
///
/// 세 협력자는 반드시 지정해야 하며, 시계를 지정하지 않으면 `K::default()`를 사용합니다.
pub struct TestMatrixRunnerBuilder<C, P, L, K = TokioClock>
where
    C: Cluster,
    P: EventPublisher,
    L: LogSource,
    K: Clock,
{
    cluster: Option<Arc<C>>,
    publisher: Option<Arc<P>>,
    logs: Option<Arc<L>>,
    clock: Option<Arc<K>>,
    cancel: Option<CancellationToken>,
}

impl<C, P, L, K> TestMatrixRunnerBuilder<C, P, L, K>
where
    C: Cluster,
    P: EventPublisher,
    L: LogSource,
    K: Clock,
{
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            cluster: None,
            publisher: None,
            logs: None,
            clock: None,
            cancel: None,
        }
    }

    /// 리소스 생명주기를 담당하는 클러스터를 설정합니다.
    pub fn cluster(mut self, cluster: Arc<C>) -> Self {
        self.cluster = Some(cluster);
        self
    }

    /// 이벤트 발행자를 설정합니다.
    pub fn publisher(mut self, publisher: Arc<P>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// 구독자 출력 소스를 설정합니다.
    pub fn log_source(mut self, logs: Arc<L>) -> Self {
        self.logs = Some(logs);
        self
    }

    /// 폴링 루프에 사용할 시계를 설정합니다.
    pub fn clock(mut self, clock: Arc<K>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// 상위 취소 토큰을 연결합니다.
    ///
    /// 설정하지 않으면 실행기 전용 토큰을 새로 만듭니다.
    pub fn cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// 실행기를 빌드합니다.
    ///
    /// # Errors
    ///
    /// 클러스터, 발행자, 출력 소스 중 하나라도 없으면 `ConfigError::InvalidValue`
    pub fn build(self) -> Result<TestMatrixRunner<C, P, L, K>, ConfigError>
    where
        K: Default,
    {
        let cluster = self.cluster.ok_or_else(|| missing("cluster"))?;
        let publisher = self.publisher.ok_or_else(|| missing("publisher"))?;
        let logs = self.logs.ok_or_else(|| missing("log_source"))?;

        Ok(TestMatrixRunner {
            cluster,
            publisher,
            logs,
            clock: self.clock.unwrap_or_default(),
            cancel: self.cancel.unwrap_or_default(),
        })
    }
}

impl<B, K> TestMatrixRunnerBuilder<B, B, B, K>
where
    B: Cluster + EventPublisher + LogSource,
    K: Clock,
{
    /// 세 역할을 모두 구현한 백엔드 하나로 협력자를 설정합니다.
    pub fn backend(self, backend: Arc<B>) -> Self {
        self.cluster(Arc::clone(&backend))
            .publisher(Arc::clone(&backend))
            .log_source(backend)
    }
}

impl<C, P, L, K> Default for TestMatrixRunnerBuilder<C, P, L, K>
where
    C: Cluster,
    P: EventPublisher,
    L: LogSource,
    K: Clock,
{
    fn default() -> Self {
        Self::new()
    }
}

fn missing(field: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: "must be provided".to_owned(),
    }
}
