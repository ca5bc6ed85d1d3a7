//! Run report: the ordered per-stage record of one orchestrator invocation.
//!
//! Reports follow the versioned `report.v1` contract so scripts can consume
//! `run --json` output without sniffing shapes. Field order is stable for
//! diffability. A fresh report is built per invocation; nothing is read back
//! from disk.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

use crate::runner::StageOutcome;
use crate::types::StageId;

pub const REPORT_SCHEMA_VERSION: &str = "report.v1";

/// One stage's outcome as recorded in the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: StageId,
    pub status: StageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blake3_first8: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Succeeded,
    Failed,
    Skipped,
}

impl StageReport {
    #[must_use]
    pub fn from_outcome(stage: StageId, outcome: &StageOutcome) -> Self {
        match outcome {
            StageOutcome::Succeeded {
                artifact,
                blake3_first8,
                duration_ms,
            } => Self {
                stage,
                status: StageStatus::Succeeded,
                artifact: Some(artifact.to_string()),
                blake3_first8: Some(blake3_first8.clone()),
                duration_ms: Some(*duration_ms),
                error: None,
            },
            StageOutcome::Failed { reason } => Self {
                stage,
                status: StageStatus::Failed,
                artifact: None,
                blake3_first8: None,
                duration_ms: None,
                error: Some(reason.describe()),
            },
            StageOutcome::Skipped => Self {
                stage,
                status: StageStatus::Skipped,
                artifact: None,
                blake3_first8: None,
                duration_ms: None,
                error: None,
            },
        }
    }
}

/// Complete report for one `run` (or single `stage`) invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub schema_version: String,
    pub entity: String,
    pub emitted_at: String,
    pub stages: Vec<StageReport>,
}

impl RunReport {
    #[must_use]
    pub fn new(entity: &str) -> Self {
        Self::new_at(entity, Utc::now())
    }

    #[must_use]
    pub fn new_at(entity: &str, emitted_at: DateTime<Utc>) -> Self {
        Self {
            schema_version: REPORT_SCHEMA_VERSION.to_string(),
            entity: entity.to_string(),
            emitted_at: emitted_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            stages: Vec::new(),
        }
    }

    pub fn record(&mut self, stage: StageId, outcome: &StageOutcome) {
        self.stages.push(StageReport::from_outcome(stage, outcome));
    }

    /// True when no recorded stage failed. Skipped stages do not count
    /// against success.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.stages
            .iter()
            .all(|s| s.status != StageStatus::Failed)
    }

    #[must_use]
    pub fn failed_stages(&self) -> Vec<StageId> {
        self.stages
            .iter()
            .filter(|s| s.status == StageStatus::Failed)
            .map(|s| s.stage)
            .collect()
    }

    /// Human-readable table for terminal output.
    #[must_use]
    pub fn render_human(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Run report for entity '{}'", self.entity);
        for stage in &self.stages {
            let marker = match stage.status {
                StageStatus::Succeeded => "ok  ",
                StageStatus::Failed => "FAIL",
                StageStatus::Skipped => "skip",
            };
            let _ = write!(out, "  {marker}  {:<22}", stage.stage.as_str());
            match stage.status {
                StageStatus::Succeeded => {
                    let hash = stage.blake3_first8.as_deref().unwrap_or("-");
                    let ms = stage.duration_ms.unwrap_or(0);
                    let _ = writeln!(out, "{hash}  {ms}ms");
                }
                StageStatus::Failed => {
                    let _ = writeln!(out, "{}", stage.error.as_deref().unwrap_or("unknown error"));
                }
                StageStatus::Skipped => {
                    let _ = writeln!(out);
                }
            }
        }
        let failed = self.failed_stages();
        if failed.is_empty() {
            let _ = writeln!(out, "All stages completed.");
        } else {
            let names: Vec<&str> = failed.iter().map(StageId::as_str).collect();
            let _ = writeln!(out, "{} stage(s) failed: {}", failed.len(), names.join(", "));
        }
        out
    }

    /// Convenience used by the CLI's `--json` path.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
