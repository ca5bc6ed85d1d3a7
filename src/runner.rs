//! Single-stage execution: dependency resolution, generation, persistence.
//!
//! The runner reads every declared input (reporting a missing one without
//! ever invoking generation logic), calls the executor, and persists exactly
//! one artifact on success. A failed stage writes nothing.

use camino::Utf8PathBuf;
use std::time::Instant;
use tracing::{info, warn};

use crate::stage::{GenerationRequest, StageDescriptor, StageExecutor};
use crate::store::{ArtifactStore, StoreError};
use crate::types::StageId;

/// Outcome of attempting one stage for one entity. Stage-local failures are
/// values, not errors; only broken persistence escapes as `StoreError`.
#[derive(Debug, Clone)]
pub enum StageOutcome {
    Succeeded {
        artifact: Utf8PathBuf,
        blake3_first8: String,
        duration_ms: u64,
    },
    Failed {
        reason: FailureReason,
    },
    Skipped,
}

/// Why a stage failed without aborting the run.
#[derive(Debug, Clone)]
pub enum FailureReason {
    /// A declared input artifact was never produced (its producer failed or
    /// was skipped and nothing from a prior run exists).
    MissingDependency { missing: StageId },
    /// The generation collaborator raised an error or returned unusable
    /// output.
    Generation { detail: String },
}

impl FailureReason {
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::MissingDependency { missing } => {
                format!("missing dependency: no artifact from stage '{missing}'")
            }
            Self::Generation { detail } => detail.clone(),
        }
    }
}

/// Per-invocation options threaded through to prompt assembly.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub form_type: Option<String>,
    pub interactive: bool,
}

/// Executes exactly one stage against its declared inputs.
pub struct StageRunner<'a> {
    store: &'a ArtifactStore,
    executor: &'a dyn StageExecutor,
}

impl<'a> StageRunner<'a> {
    #[must_use]
    pub fn new(store: &'a ArtifactStore, executor: &'a dyn StageExecutor) -> Self {
        Self { store, executor }
    }

    /// Run a single stage. Returns `Ok(StageOutcome::Failed { .. })` for
    /// stage-local failures; `Err` only when the artifact store itself is
    /// broken, which aborts the whole run.
    pub async fn run(
        &self,
        descriptor: &StageDescriptor,
        entity: &str,
        opts: &RunOptions,
    ) -> Result<StageOutcome, StoreError> {
        let stage = descriptor.id;

        let mut inputs = Vec::with_capacity(descriptor.inputs.len());
        for &input in descriptor.inputs {
            if !self.store.exists(entity, input) {
                warn!(entity, stage = %stage, missing = %input, "stage input missing");
                return Ok(StageOutcome::Failed {
                    reason: FailureReason::MissingDependency { missing: input },
                });
            }
            match self.store.read(entity, input) {
                Ok(content) => inputs.push((input, content)),
                // Lost a race with an external deletion between exists() and
                // read(); same contract as never produced.
                Err(StoreError::NotFound { .. }) => {
                    return Ok(StageOutcome::Failed {
                        reason: FailureReason::MissingDependency { missing: input },
                    });
                }
                Err(e) => return Err(e),
            }
        }

        let overlay = self.store.read_task_overlay(entity, stage)?;
        let prompt = crate::stages::build_prompt(
            stage,
            entity,
            opts.form_type.as_deref(),
            &inputs,
            overlay.as_deref(),
        );

        let request = GenerationRequest {
            entity: entity.to_string(),
            stage,
            prompt,
            interactive: opts.interactive,
        };

        info!(entity, stage = %stage, interactive = opts.interactive, "running stage");
        let started = Instant::now();
        let generated = match self.executor.generate(&request).await {
            Ok(content) => content,
            Err(e) => {
                let detail = format!("{e:#}");
                warn!(entity, stage = %stage, error = %detail, "stage generation failed");
                return Ok(StageOutcome::Failed {
                    reason: FailureReason::Generation { detail },
                });
            }
        };

        if generated.trim().is_empty() {
            return Ok(StageOutcome::Failed {
                reason: FailureReason::Generation {
                    detail: "generation produced empty output".to_string(),
                },
            });
        }

        let stored = self.store.write(entity, stage, &generated)?;
        let duration_ms = started.elapsed().as_millis() as u64;
        info!(
            entity,
            stage = %stage,
            artifact = %stored.path,
            duration_ms,
            "stage succeeded"
        );
        Ok(StageOutcome::Succeeded {
            artifact: stored.path,
            blake3_first8: stored.blake3_first8,
            duration_ms,
        })
    }
}
