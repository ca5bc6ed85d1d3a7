//! Deterministic stand-in executor for `--dry-run` and pipeline rehearsal.
//!
//! Produces well-formed placeholder artifacts without touching an agent, so
//! the orchestration path (locking, dependency resolution, persistence,
//! reporting) can be exercised end to end. Output depends only on the
//! request, so repeated dry runs are byte-identical.

use anyhow::Result;
use async_trait::async_trait;

use crate::stage::{GenerationRequest, StageExecutor};
use crate::store::blake3_first8;
use crate::types::StageId;

pub struct DryRunExecutor;

#[async_trait]
impl StageExecutor for DryRunExecutor {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let prompt_hash = blake3_first8(&request.prompt);
        let content = match request.stage {
            StageId::TemplateGeneration => format!(
                "# Dry-run template output for {entity}\n\n\
                 No agent was invoked. Prompt hash: {prompt_hash}\n",
                entity = request.entity,
            ),
            stage => format!(
                "{{\n  \"dry_run\": true,\n  \"entity\": \"{entity}\",\n  \
                 \"stage\": \"{stage}\",\n  \"prompt_blake3_first8\": \"{prompt_hash}\"\n}}\n",
                entity = request.entity,
            ),
        };
        Ok(content)
    }
}
