//! Pipeline orchestration for one entity.
//!
//! The orchestrator walks the stage list in ordinal order under an exclusive
//! entity lock. Stage failures are recorded and the loop continues, so one
//! broken analysis never blocks the independent stages behind it; only broken
//! storage or a failed lock acquisition aborts the invocation.

use tracing::{debug, info};

use crate::error::FormbridgeError;
use crate::lock::EntityLock;
use crate::report::RunReport;
use crate::runner::{RunOptions, StageOutcome, StageRunner};
use crate::stage::StageExecutor;
use crate::stages::{self, PIPELINE};
use crate::store::ArtifactStore;
use crate::types::{SkipSet, StageId};

pub struct Orchestrator<'a> {
    store: &'a ArtifactStore,
    executor: &'a dyn StageExecutor,
}

impl<'a> Orchestrator<'a> {
    #[must_use]
    pub fn new(store: &'a ArtifactStore, executor: &'a dyn StageExecutor) -> Self {
        Self { store, executor }
    }

    /// Run the full pipeline for `entity`, honoring the skip set.
    ///
    /// Returns the ordered run report; check [`RunReport::succeeded`] for the
    /// aggregate outcome. The entity lock is held for the whole invocation
    /// and released on return, including the error paths.
    pub async fn execute(
        &self,
        entity: &str,
        skip: &SkipSet,
        opts: &RunOptions,
        force: bool,
    ) -> Result<RunReport, FormbridgeError> {
        crate::entity::validate_entity_name(entity)?;
        let _lock = EntityLock::acquire(&self.store.entity_dir(entity), entity, force)?;

        info!(entity, skipped = skip.len(), "starting pipeline run");
        let runner = StageRunner::new(self.store, self.executor);
        let mut report = RunReport::new(entity);

        for descriptor in &PIPELINE {
            if skip.contains(descriptor.id) {
                debug!(entity, stage = %descriptor.id, "stage skipped by operator");
                report.record(descriptor.id, &StageOutcome::Skipped);
                continue;
            }
            let outcome = runner.run(descriptor, entity, opts).await?;
            report.record(descriptor.id, &outcome);
        }

        info!(
            entity,
            succeeded = report.succeeded(),
            failed = report.failed_stages().len(),
            "pipeline run finished"
        );
        Ok(report)
    }

    /// Run a single stage standalone, under the same lock discipline as a
    /// full run. Declared inputs must already exist in the store (from prior
    /// runs) or the stage fails with a missing dependency.
    pub async fn execute_stage(
        &self,
        stage: StageId,
        entity: &str,
        opts: &RunOptions,
        force: bool,
    ) -> Result<RunReport, FormbridgeError> {
        crate::entity::validate_entity_name(entity)?;
        let _lock = EntityLock::acquire(&self.store.entity_dir(entity), entity, force)?;

        info!(entity, stage = %stage, "running single stage");
        let runner = StageRunner::new(self.store, self.executor);
        let mut report = RunReport::new(entity);
        let outcome = runner.run(stages::descriptor(stage), entity, opts).await?;
        report.record(stage, &outcome);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::StageStatus;
    use crate::stage::GenerationRequest;
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use camino::Utf8PathBuf;
    use std::collections::HashSet;

    /// Succeeds for every stage except those in `fail`.
    struct ScriptedExecutor {
        fail: HashSet<StageId>,
    }

    impl ScriptedExecutor {
        fn passing() -> Self {
            Self {
                fail: HashSet::new(),
            }
        }

        fn failing_at(stages: &[StageId]) -> Self {
            Self {
                fail: stages.iter().copied().collect(),
            }
        }
    }

    #[async_trait]
    impl StageExecutor for ScriptedExecutor {
        async fn generate(&self, request: &GenerationRequest) -> Result<String> {
            if self.fail.contains(&request.stage) {
                return Err(anyhow!("scripted failure for {}", request.stage));
            }
            Ok(format!("output for {}", request.stage))
        }
    }

    fn test_store() -> (tempfile::TempDir, ArtifactStore) {
        let td = tempfile::TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(td.path().join("output")).unwrap();
        let tasks = Utf8PathBuf::from_path_buf(td.path().join(".claude/tasks")).unwrap();
        (td, ArtifactStore::new(root, tasks))
    }

    #[tokio::test]
    async fn full_run_produces_all_artifacts() {
        let (_td, store) = test_store();
        let executor = ScriptedExecutor::passing();
        let orchestrator = Orchestrator::new(&store, &executor);

        let report = orchestrator
            .execute("Facility", &SkipSet::default(), &RunOptions::default(), false)
            .await
            .unwrap();

        assert!(report.succeeded());
        assert_eq!(report.stages.len(), 5);
        for stage in StageId::ALL {
            assert!(store.exists("Facility", stage), "{stage}");
        }
    }

    #[tokio::test]
    async fn failure_cascades_to_dependents_but_not_independents() {
        let (_td, store) = test_store();
        // business-logic fails; security depends on it, data-access does not.
        let executor = ScriptedExecutor::failing_at(&[StageId::BusinessLogic]);
        let orchestrator = Orchestrator::new(&store, &executor);

        let report = orchestrator
            .execute("Facility", &SkipSet::default(), &RunOptions::default(), false)
            .await
            .unwrap();

        assert!(!report.succeeded());
        assert_eq!(report.stages[0].status, StageStatus::Succeeded);
        assert_eq!(report.stages[1].status, StageStatus::Failed);
        assert_eq!(report.stages[2].status, StageStatus::Succeeded);
        assert_eq!(report.stages[3].status, StageStatus::Failed);
        assert_eq!(report.stages[4].status, StageStatus::Failed);
        assert!(store.exists("Facility", StageId::DataAccess));
        assert!(!store.exists("Facility", StageId::Security));
    }

    #[tokio::test]
    async fn skipped_stage_with_prior_artifact_feeds_dependents() {
        let (_td, store) = test_store();
        store
            .write("Facility", StageId::FormStructure, "from a prior run")
            .unwrap();
        let executor = ScriptedExecutor::passing();
        let orchestrator = Orchestrator::new(&store, &executor);

        let skip = SkipSet::parse("form-structure").unwrap();
        let report = orchestrator
            .execute("Facility", &skip, &RunOptions::default(), false)
            .await
            .unwrap();

        assert!(report.succeeded());
        assert_eq!(report.stages[0].status, StageStatus::Skipped);
        // The skipped stage's old artifact is untouched and was consumed.
        assert_eq!(
            store.read("Facility", StageId::FormStructure).unwrap(),
            "from a prior run"
        );
        assert!(store.exists("Facility", StageId::TemplateGeneration));
    }

    #[tokio::test]
    async fn skipped_stage_without_artifact_starves_dependents() {
        let (_td, store) = test_store();
        let executor = ScriptedExecutor::passing();
        let orchestrator = Orchestrator::new(&store, &executor);

        let skip = SkipSet::parse("0").unwrap();
        let report = orchestrator
            .execute("Facility", &skip, &RunOptions::default(), false)
            .await
            .unwrap();

        assert!(!report.succeeded());
        assert_eq!(report.stages[0].status, StageStatus::Skipped);
        for stage_report in &report.stages[1..] {
            assert_eq!(stage_report.status, StageStatus::Failed);
        }
    }

    #[tokio::test]
    async fn invalid_entity_is_rejected_before_any_stage() {
        let (_td, store) = test_store();
        let executor = ScriptedExecutor::passing();
        let orchestrator = Orchestrator::new(&store, &executor);

        let err = orchestrator
            .execute("../escape", &SkipSet::default(), &RunOptions::default(), false)
            .await
            .unwrap_err();

        assert!(matches!(err, FormbridgeError::Entity(_)));
        assert!(!store.entity_dir("../escape").as_std_path().exists());
    }

    #[tokio::test]
    async fn held_lock_blocks_a_second_run() {
        let (_td, store) = test_store();
        let executor = ScriptedExecutor::passing();
        let orchestrator = Orchestrator::new(&store, &executor);

        let _held = EntityLock::acquire(&store.entity_dir("Facility"), "Facility", false).unwrap();
        let err = orchestrator
            .execute("Facility", &SkipSet::default(), &RunOptions::default(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, FormbridgeError::Lock(_)));
    }

    #[tokio::test]
    async fn single_stage_runs_against_existing_artifacts() {
        let (_td, store) = test_store();
        store
            .write("Facility", StageId::FormStructure, "{\"fields\":[]}")
            .unwrap();
        let executor = ScriptedExecutor::passing();
        let orchestrator = Orchestrator::new(&store, &executor);

        let report = orchestrator
            .execute_stage(StageId::BusinessLogic, "Facility", &RunOptions::default(), false)
            .await
            .unwrap();

        assert!(report.succeeded());
        assert_eq!(report.stages.len(), 1);
        assert!(store.exists("Facility", StageId::BusinessLogic));
    }

    #[tokio::test]
    async fn rerun_is_idempotent() {
        let (_td, store) = test_store();
        let executor = ScriptedExecutor::passing();
        let orchestrator = Orchestrator::new(&store, &executor);
        let opts = RunOptions::default();

        let first = orchestrator
            .execute("Facility", &SkipSet::default(), &opts, false)
            .await
            .unwrap();
        let second = orchestrator
            .execute("Facility", &SkipSet::default(), &opts, false)
            .await
            .unwrap();

        for (a, b) in first.stages.iter().zip(second.stages.iter()) {
            assert_eq!(a.blake3_first8, b.blake3_first8, "{}", a.stage);
        }
    }
}
