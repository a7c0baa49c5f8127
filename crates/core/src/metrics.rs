//! 메트릭 상수 및 설명 등록
//!
//! 매트릭스 실행 중 기록되는 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 하네스는 이 상수를 사용하여 `metrics::counter!()`, `metrics::histogram!()`
//! 매크로를 호출합니다. 레코더가 설치되지 않았으면 기록은 무시됩니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `chanprobe_`
//! - 접미어: `_total` (counter), `_seconds` (histogram/latency)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(
//!     chanprobe_core::metrics::SCENARIOS_TOTAL,
//!     chanprobe_core::metrics::LABEL_RESULT => "passed",
//! )
//! .increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 결과 레이블 키 (passed, failed, skipped)
pub const LABEL_RESULT: &str = "result";

/// 채널 kind 레이블 키
pub const LABEL_CHANNEL_KIND: &str = "channel_kind";

/// 구독 버전 레이블 키
pub const LABEL_SUBSCRIPTION_VERSION: &str = "subscription_version";

/// 실패 원인 레이블 키 (`ScenarioError::kind_name`)
pub const LABEL_ERROR_KIND: &str = "error_kind";

// ─── 시나리오 메트릭 ────────────────────────────────────────────────

/// 실행된 시나리오 수 (counter, labels: result, channel_kind)
pub const SCENARIOS_TOTAL: &str = "chanprobe_scenarios_total";

/// 실패한 시나리오 수 (counter, label: error_kind)
pub const SCENARIO_FAILURES_TOTAL: &str = "chanprobe_scenario_failures_total";

/// 시나리오 전체 소요 시간 (histogram, 초)
pub const SCENARIO_DURATION_SECONDS: &str = "chanprobe_scenario_duration_seconds";

// ─── 단계별 메트릭 ──────────────────────────────────────────────────

/// 리소스 ready 대기 시간 (histogram, 초)
pub const READINESS_WAIT_SECONDS: &str = "chanprobe_readiness_wait_seconds";

/// 전달 확인까지 폴링 시도 횟수 (histogram)
pub const DELIVERY_ATTEMPTS: &str = "chanprobe_delivery_attempts";

/// 발행부터 payload 관찰까지 걸린 시간 (histogram, 초)
pub const DELIVERY_LATENCY_SECONDS: &str = "chanprobe_delivery_latency_seconds";

/// teardown 중 발생한 삭제 실패 수 (counter)
pub const TEARDOWN_ERRORS_TOTAL: &str = "chanprobe_teardown_errors_total";

// ─── 히스토그램 버킷 정의 ────────────────────────────────────────────

/// 대기/지연 시간 히스토그램 버킷 (초)
///
/// 10ms ~ 300s 범위 (클러스터 리소스 ready 대기 포함)
pub const WAIT_DURATION_BUCKETS: [f64; 10] =
    [0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0];

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출해야 합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_histogram};

    describe_counter!(
        SCENARIOS_TOTAL,
        "Total number of matrix scenarios by result and channel kind"
    );
    describe_counter!(
        SCENARIO_FAILURES_TOTAL,
        "Total number of failed scenarios by error kind"
    );
    describe_histogram!(
        SCENARIO_DURATION_SECONDS,
        "Wall time of a single scenario including teardown in seconds"
    );
    describe_histogram!(
        READINESS_WAIT_SECONDS,
        "Time spent waiting for scenario resources to become ready in seconds"
    );
    describe_histogram!(
        DELIVERY_ATTEMPTS,
        "Number of subscriber output reads until the payload was observed"
    );
    describe_histogram!(
        DELIVERY_LATENCY_SECONDS,
        "Time from publish until the payload was observed in seconds"
    );
    describe_counter!(
        TEARDOWN_ERRORS_TOTAL,
        "Total number of resource deletions that failed during teardown"
    );
}
