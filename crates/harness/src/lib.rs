#![doc = include_str!("../README.md")]
//!
//! # Module Structure
//!
//! - [`clock`]: Time source for polling loops (`Clock`, `TokioClock`, `ManualClock`)
//! - [`naming`]: Deterministic per-scenario resource names (`ScenarioNames`)
//! - [`resources`]: Ordered provisioning and reverse teardown (`ResourceSet`)
//! - [`readiness`]: All-or-nothing readiness barrier (`ReadinessGate`)
//! - [`verifier`]: Subscriber output polling (`DeliveryVerifier`, `DeliveryPolicy`)
//! - [`scenario`]: Matrix planning and results (`Scenario`, `ScenarioResult`, `MatrixReport`)
//! - [`config`]: Run options derived from `ChanprobeConfig` (`RunOptions`, builder)
//! - [`runner`]: Matrix orchestrator (`TestMatrixRunner`, `TestMatrixRunnerBuilder`)
//!
//! # Architecture
//!
//! ```text
//! channels x subscription versions
//!              |
//!         plan_matrix()
//!              |
//!   JoinSet + Semaphore(max_parallel)
//!              |
//!   create -> wait_all -> publish -> confirm -> teardown
//!              |
//!         MatrixReport
//! ```

pub mod clock;
pub mod config;
pub mod naming;
pub mod readiness;
pub mod resources;
pub mod runner;
pub mod scenario;
pub mod verifier;

// --- Public API Re-exports ---

// Runner (main orchestrator)
pub use runner::{TestMatrixRunner, TestMatrixRunnerBuilder};

// Configuration
pub use config::{RunOptions, RunOptionsBuilder};

// Scenario
pub use scenario::{
    MatrixReport, PlanEntry, Scenario, ScenarioOutcome, ScenarioResult, SkipReason, plan_matrix,
};

// Components
pub use clock::{Clock, ManualClock, TokioClock};
pub use naming::ScenarioNames;
pub use readiness::{Readiness, ReadinessGate, ReadinessPolicy};
pub use resources::{Provisioned, ResourceSet, TeardownFailure};
pub use verifier::{DeliveryBackoff, DeliveryPolicy, DeliveryVerifier, VerificationResult};
