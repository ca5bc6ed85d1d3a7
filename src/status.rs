//! Read-only pipeline status for one entity.
//!
//! `status` inspects the artifact store without locking or writing, so it is
//! always safe to run next to an active pipeline. Output follows the
//! versioned `status.v1` contract.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs;

use crate::lock::{EntityLock, LockInfo};
use crate::store::{ArtifactStore, StoreError, blake3_first8};
use crate::types::StageId;

pub const STATUS_SCHEMA_VERSION: &str = "status.v1";

/// Presence and identity of one stage's artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageStatusEntry {
    pub stage: StageId,
    pub artifact: String,
    pub present: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blake3_first8: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusOutput {
    pub schema_version: String,
    pub entity: String,
    pub output_root: String,
    pub stages: Vec<StageStatusEntry>,
    /// Earliest stage with no artifact; `None` when everything is present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume_from: Option<StageId>,
    /// Lock metadata if a run appears to be active for this entity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock: Option<LockInfo>,
}

/// Collect status for an entity. Missing artifacts and a missing entity
/// directory are ordinary states, not errors.
pub fn collect(store: &ArtifactStore, entity: &str) -> Result<StatusOutput, StoreError> {
    let mut stages = Vec::with_capacity(StageId::ALL.len());
    let mut resume_from = None;

    for stage in StageId::ALL {
        let path = store.artifact_path(entity, stage);
        let entry = match store.read(entity, stage) {
            Ok(content) => {
                let modified_at = fs::metadata(path.as_std_path())
                    .and_then(|m| m.modified())
                    .ok()
                    .map(|t| {
                        DateTime::<Utc>::from(t).to_rfc3339_opts(SecondsFormat::Secs, true)
                    });
                StageStatusEntry {
                    stage,
                    artifact: stage.artifact_filename(),
                    present: true,
                    size_bytes: Some(content.len() as u64),
                    blake3_first8: Some(blake3_first8(&content)),
                    modified_at,
                }
            }
            Err(StoreError::NotFound { .. }) => {
                if resume_from.is_none() {
                    resume_from = Some(stage);
                }
                StageStatusEntry {
                    stage,
                    artifact: stage.artifact_filename(),
                    present: false,
                    size_bytes: None,
                    blake3_first8: None,
                    modified_at: None,
                }
            }
            Err(e) => return Err(e),
        };
        stages.push(entry);
    }

    // Lock state is informational only; an unreadable lock file reads as
    // no lock rather than failing a read-only command.
    let lock = EntityLock::read_info(&store.entity_dir(entity))
        .ok()
        .flatten();

    Ok(StatusOutput {
        schema_version: STATUS_SCHEMA_VERSION.to_string(),
        entity: entity.to_string(),
        output_root: store.output_root().to_string(),
        stages,
        resume_from,
        lock,
    })
}

impl StatusOutput {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    #[must_use]
    pub fn render_human(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Status for entity '{}' ({})", self.entity, self.output_root);
        for entry in &self.stages {
            if entry.present {
                let hash = entry.blake3_first8.as_deref().unwrap_or("-");
                let size = entry.size_bytes.unwrap_or(0);
                let _ = writeln!(
                    out,
                    "  [x] {:<22} {hash}  {size} bytes",
                    entry.stage.as_str()
                );
            } else {
                let _ = writeln!(out, "  [ ] {:<22} missing", entry.stage.as_str());
            }
        }
        match self.resume_from {
            Some(stage) => {
                let done: Vec<&str> = self
                    .stages
                    .iter()
                    .filter(|e| e.present)
                    .map(|e| e.stage.as_str())
                    .collect();
                if done.is_empty() {
                    let _ = writeln!(out, "No artifacts yet; run the full pipeline.");
                } else {
                    let _ = writeln!(
                        out,
                        "Resume with: formbridge run --entity {} --skip-steps {}",
                        self.entity,
                        done.join(",")
                    );
                    let _ = writeln!(out, "Next stage: {stage}");
                }
            }
            None => {
                let _ = writeln!(out, "All artifacts present.");
            }
        }
        if let Some(lock) = &self.lock {
            let _ = writeln!(out, "Active run: PID {} holds the entity lock.", lock.pid);
        }
        out
    }
}
