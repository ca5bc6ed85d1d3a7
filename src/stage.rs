//! Stage abstraction: descriptors and the executor seam.
//!
//! The deterministic orchestration core never talks to an agent directly; it
//! goes through [`StageExecutor`], an injected capability. Production code
//! installs the external agent CLI invoker, tests and `--dry-run` install
//! scripted executors.

use anyhow::Result;
use async_trait::async_trait;

use crate::types::StageId;

/// Static metadata for one stage: its identity and the artifact keys it
/// reads. Each stage writes exactly one artifact, named by
/// [`StageId::artifact_filename`]. Inputs only ever reference stages with a
/// lower ordinal, so the dependency graph is a total order by construction.
#[derive(Debug, Clone, Copy)]
pub struct StageDescriptor {
    pub id: StageId,
    pub inputs: &'static [StageId],
}

/// Everything an executor needs to produce one stage's artifact.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub entity: String,
    pub stage: StageId,
    /// Fully rendered prompt, including the content of all input artifacts.
    pub prompt: String,
    /// Human-in-the-loop session requested for this invocation.
    pub interactive: bool,
}

/// Generation logic for a single stage.
///
/// The contract is deliberately narrow: given the request, either produce the
/// complete artifact text or fail. No retries, no partial results — the
/// caller persists the output atomically or records the failure.
#[async_trait]
pub trait StageExecutor: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;
}
