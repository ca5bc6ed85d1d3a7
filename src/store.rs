//! Directory-backed artifact store keyed by `(entity, stage)`.
//!
//! Artifacts are plain JSON or markdown files under
//! `<output_root>/<Entity>/<NN>-<stage>.<ext>` so an operator can inspect or
//! hand-edit intermediate results between stages. Writes are atomic;
//! [`StoreError::NotFound`] on read is a normal control-flow condition used to
//! decide whether a stage must (re)run, not a failure of the run.

use blake3::Hasher;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::io;
use thiserror::Error;

use crate::atomic_write::write_file_atomic;
use crate::types::StageId;

/// Errors from artifact persistence. `NotFound` is expected and stage-local;
/// `Io` means the backing storage itself is broken and aborts the run.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no artifact for entity '{entity}', stage '{stage}'")]
    NotFound {
        entity: String,
        stage: &'static str,
    },

    #[error("artifact store I/O failure at {path}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A successfully persisted artifact.
#[derive(Debug, Clone)]
pub struct StoredArtifact {
    pub path: Utf8PathBuf,
    pub blake3_first8: String,
}

/// Durable, idempotent read/write of named text artifacts scoped by entity.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    output_root: Utf8PathBuf,
    tasks_dir: Utf8PathBuf,
}

impl ArtifactStore {
    #[must_use]
    pub fn new(output_root: impl Into<Utf8PathBuf>, tasks_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
            tasks_dir: tasks_dir.into(),
        }
    }

    #[must_use]
    pub fn output_root(&self) -> &Utf8Path {
        &self.output_root
    }

    /// Directory holding all artifacts for one entity.
    #[must_use]
    pub fn entity_dir(&self, entity: &str) -> Utf8PathBuf {
        crate::paths::entity_dir(&self.output_root, entity)
    }

    /// Full path of the artifact a stage writes for an entity.
    #[must_use]
    pub fn artifact_path(&self, entity: &str, stage: StageId) -> Utf8PathBuf {
        self.entity_dir(entity).join(stage.artifact_filename())
    }

    /// Persist an artifact, overwriting any prior content for the key.
    /// The write is atomic: a concurrent reader sees the old content or the
    /// new content, never a partial file.
    pub fn write(
        &self,
        entity: &str,
        stage: StageId,
        content: &str,
    ) -> Result<StoredArtifact, StoreError> {
        let path = self.artifact_path(entity, stage);
        write_file_atomic(&path, content).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(StoredArtifact {
            blake3_first8: blake3_first8(content),
            path,
        })
    }

    /// Read the most recently written artifact for the key.
    pub fn read(&self, entity: &str, stage: StageId) -> Result<String, StoreError> {
        let path = self.artifact_path(entity, stage);
        match fs::read_to_string(path.as_std_path()) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StoreError::NotFound {
                entity: entity.to_string(),
                stage: stage.as_str(),
            }),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    /// Whether the stage has produced output for this entity. Used by the
    /// orchestrator for dependency checks and resume hints.
    #[must_use]
    pub fn exists(&self, entity: &str, stage: StageId) -> bool {
        self.artifact_path(entity, stage).as_std_path().is_file()
    }

    /// Read the optional `<tasks_dir>/<Entity>_<stage>.json` side file that
    /// an operator (or a prior out-of-band agent session) may have left for a
    /// stage. Absence is not an error.
    pub fn read_task_overlay(
        &self,
        entity: &str,
        stage: StageId,
    ) -> Result<Option<String>, StoreError> {
        let path = self
            .tasks_dir
            .join(format!("{entity}_{}.json", stage.as_str()));
        match fs::read_to_string(path.as_std_path()) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }
}

/// First 8 hex chars of the BLAKE3 hash of `content`.
#[must_use]
pub fn blake3_first8(content: &str) -> String {
    let mut hasher = Hasher::new();
    hasher.update(content.as_bytes());
    let hex = hasher.finalize().to_hex();
    hex.as_str()[..8].to_string()
}
