//! 시나리오: 매트릭스 한 칸의 작업 단위와 그 결과
//!
//! [`plan_matrix`]는 채널 목록과 구독 리비전 목록을 채널 우선 순서로 펼쳐
//! 셀마다 [`Scenario`]를 만들고, 실행하지 않을 셀에는 [`SkipReason`]을 붙입니다.
//! 어떤 셀도 조용히 버려지지 않습니다.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::Serialize;

use chanprobe_core::error::{ScenarioError, ScenarioStep};
use chanprobe_core::event::Encoding;
use chanprobe_core::types::{
    ChannelDescriptor, ChannelFeature, MatrixCell, SubscriptionVersion,
};

use crate::config::RunOptions;
use crate::naming::ScenarioNames;
use crate::resources::TeardownFailure;
use crate::verifier::VerificationResult;

/// 매트릭스 한 칸의 작업 단위
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Scenario {
    /// 매트릭스 내 위치 (채널 우선 순서)
    pub index: usize,
    /// 매트릭스 좌표
    pub cell: MatrixCell,
    /// 생성할 리소스 이름
    pub names: ScenarioNames,
    /// 리소스 이름 접두어
    pub test_name: String,
    /// 이벤트 인코딩
    pub encoding: Encoding,
}

impl Scenario {
    /// 셀과 옵션에서 시나리오를 만듭니다.
    pub fn new(index: usize, cell: MatrixCell, options: &RunOptions) -> Self {
        let names = ScenarioNames::derive(
            &options.test_name,
            options.encoding,
            cell.subscription_version,
            &cell.channel,
            &cell.api_version,
        );
        Self {
            index,
            cell,
            names,
            test_name: options.test_name.clone(),
            encoding: options.encoding,
        }
    }
}

/// 셀을 실행하지 않는 이유
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    /// 채널이 요구 기능을 지원하지 않음
    MissingFeature {
        /// 요구 기능
        feature: ChannelFeature,
    },
    /// 앞선 셀과 식별자가 같음
    Duplicate {
        /// 먼저 나온 셀의 위치
        first_index: usize,
    },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingFeature { feature } => {
                write!(f, "channel does not support feature '{feature}'")
            }
            Self::Duplicate { first_index } => {
                write!(f, "duplicate of matrix cell #{first_index}")
            }
        }
    }
}

/// 계획된 매트릭스 한 칸
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanEntry {
    /// 시나리오
    pub scenario: Scenario,
    /// 건너뛰는 경우 그 이유
    pub skip: Option<SkipReason>,
}

/// 매트릭스를 채널 우선 순서로 펼칩니다.
pub fn plan_matrix(
    channels: &[ChannelDescriptor],
    versions: &[SubscriptionVersion],
    options: &RunOptions,
) -> Vec<PlanEntry> {
    // 이름 해시와 같은 identity로 중복을 판정합니다 (features는 이름에 들어가지 않음).
    let mut seen: HashMap<ScenarioNames, usize> = HashMap::new();
    let mut entries = Vec::with_capacity(channels.len() * versions.len());

    for channel in channels {
        for version in versions {
            let index = entries.len();
            let cell = MatrixCell {
                channel: channel.clone(),
                subscription_version: *version,
                api_version: options.api_version.clone(),
            };
            let scenario = Scenario::new(index, cell, options);

            let skip = if !channel.supports(options.required_feature) {
                Some(SkipReason::MissingFeature {
                    feature: options.required_feature,
                })
            } else if let Some(first_index) = seen.get(&scenario.names) {
                Some(SkipReason::Duplicate {
                    first_index: *first_index,
                })
            } else {
                seen.insert(scenario.names.clone(), index);
                None
            };

            entries.push(PlanEntry { scenario, skip });
        }
    }

    entries
}

/// 시나리오 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScenarioOutcome {
    /// payload가 구독자 출력에서 확인됨
    Passed {
        /// 전달 확인 결과
        verification: VerificationResult,
    },
    /// 어느 단계에서 실패함
    Failed {
        /// 실패한 단계
        step: ScenarioStep,
        /// 실패 원인
        error: ScenarioError,
    },
    /// 실행하지 않음
    Skipped {
        /// 건너뛴 이유
        reason: SkipReason,
    },
}

impl ScenarioOutcome {
    /// 메트릭/리포트용 결과 이름
    pub fn label(&self) -> &'static str {
        match self {
            Self::Passed { .. } => "passed",
            Self::Failed { .. } => "failed",
            Self::Skipped { .. } => "skipped",
        }
    }
}

/// 매트릭스 한 칸의 최종 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioResult {
    /// 매트릭스 내 위치
    pub index: usize,
    /// 매트릭스 좌표
    pub cell: MatrixCell,
    /// 사용한 리소스 이름
    pub names: ScenarioNames,
    /// 발행한 payload (발행 전에 실패했으면 없음)
    pub payload: Option<String>,
    /// 결과
    pub outcome: ScenarioOutcome,
    /// teardown 포함 소요 시간
    pub elapsed: Duration,
    /// teardown 중 삭제하지 못한 리소스
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub teardown_failures: Vec<TeardownFailure>,
}

impl ScenarioResult {
    /// 건너뛴 셀의 결과를 만듭니다.
    pub fn skipped(scenario: Scenario, reason: SkipReason) -> Self {
        Self {
            index: scenario.index,
            cell: scenario.cell,
            names: scenario.names,
            payload: None,
            outcome: ScenarioOutcome::Skipped { reason },
            elapsed: Duration::ZERO,
            teardown_failures: Vec::new(),
        }
    }

    /// 통과 여부
    pub fn is_passed(&self) -> bool {
        matches!(self.outcome, ScenarioOutcome::Passed { .. })
    }

    /// 실패 여부
    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, ScenarioOutcome::Failed { .. })
    }
}

/// 매트릭스 전체 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatrixReport {
    /// 셀별 결과 (매트릭스 순서)
    pub results: Vec<ScenarioResult>,
    /// 통과한 셀 수
    pub passed: usize,
    /// 실패한 셀 수
    pub failed: usize,
    /// 건너뛴 셀 수
    pub skipped: usize,
}

impl MatrixReport {
    /// 결과 목록에서 요약을 계산합니다. 결과는 `index` 순으로 정렬됩니다.
    pub fn from_results(mut results: Vec<ScenarioResult>) -> Self {
        results.sort_by_key(|r| r.index);
        let passed = results.iter().filter(|r| r.is_passed()).count();
        let failed = results.iter().filter(|r| r.is_failed()).count();
        let skipped = results.len() - passed - failed;
        Self {
            results,
            passed,
            failed,
            skipped,
        }
    }

    /// 실패한 셀이 없는지 여부
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// 실패한 셀만 순회합니다.
    pub fn failures(&self) -> impl Iterator<Item = &ScenarioResult> {
        self.results.iter().filter(|r| r.is_failed())
    }
}
