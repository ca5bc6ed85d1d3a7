//! formbridge: orchestrates LLM-agent-driven conversion of legacy desktop
//! forms into three-tier web admin scaffolding.
//!
//! One invocation runs an ordered pipeline of analysis/generation stages for
//! a single business entity, persisting each stage's output as a durable
//! artifact and feeding prior artifacts forward. Stage failures are recorded
//! and independent stages continue; re-runs are idempotent and resumable via
//! a skip set.

pub mod agent;
pub mod atomic_write;
pub mod cli;
pub mod config;
pub mod dry_run;
pub mod entity;
pub mod error;
pub mod exit_codes;
pub mod lock;
pub mod logging;
pub mod orchestrator;
pub mod paths;
pub mod report;
pub mod runner;
pub mod stage;
pub mod stages;
pub mod status;
pub mod store;
pub mod types;

pub use config::Config;
pub use error::FormbridgeError;
pub use exit_codes::ExitCode;
pub use orchestrator::Orchestrator;
pub use report::{RunReport, StageReport, StageStatus};
pub use runner::{FailureReason, RunOptions, StageOutcome, StageRunner};
pub use stage::{GenerationRequest, StageDescriptor, StageExecutor};
pub use store::ArtifactStore;
pub use types::{SkipSet, StageId};
