//! Advisory per-entity locking with stale-lock recovery.
//!
//! Two orchestrator invocations for the same entity would race on artifact
//! writes, so a run takes an exclusive lock on the entity directory for its
//! whole duration. The lock is advisory (it coordinates formbridge processes,
//! it is not a security boundary). Read-only operations such as `status` do
//! not lock.

use camino::{Utf8Path, Utf8PathBuf};
use fd_lock::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::process;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Age beyond which a lock left by a dead process is considered stale.
const DEFAULT_STALE_THRESHOLD_SECS: u64 = 3600;

const LOCK_FILE_NAME: &str = ".lock";

/// Lock metadata stored inside the lock file, for operator diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    /// Process ID that created the lock
    pub pid: u32,
    /// Timestamp when the lock was created (seconds since UNIX epoch)
    pub created_at: u64,
    /// Entity being locked
    pub entity: String,
    /// formbridge version that created the lock
    pub formbridge_version: String,
}

#[derive(Debug, Error)]
pub enum LockError {
    #[error("another formbridge run is active for entity '{entity}' (PID {pid}, started {created_ago} ago)")]
    Held {
        entity: String,
        pid: u32,
        created_ago: String,
    },

    #[error("stale lock for entity '{entity}' (PID {pid}, age {age_secs}s); use --force to override")]
    Stale {
        entity: String,
        pid: u32,
        age_secs: u64,
    },

    #[error("lock file is corrupted or invalid: {reason}")]
    Corrupted { reason: String },

    #[error("failed to acquire lock: {reason}")]
    Acquisition { reason: String },

    #[error("I/O error during lock operation")]
    Io(#[from] io::Error),
}

/// Exclusive lock over one entity's output directory, released on drop.
pub struct EntityLock {
    lock_path: Utf8PathBuf,
    _fd_lock: Option<Box<RwLock<fs::File>>>,
    info: LockInfo,
}

impl EntityLock {
    /// Attempt to acquire the lock for an entity.
    ///
    /// A fresh lock from another live run is refused. A lock older than the
    /// staleness threshold is refused with a hint unless `force` is set, in
    /// which case it is removed and re-acquired.
    pub fn acquire(entity_dir: &Utf8Path, entity: &str, force: bool) -> Result<Self, LockError> {
        crate::paths::ensure_dir_all(entity_dir).map_err(|e| LockError::Acquisition {
            reason: format!("failed to create entity directory {entity_dir}: {e}"),
        })?;

        let lock_path = entity_dir.join(LOCK_FILE_NAME);
        if lock_path.as_std_path().exists() {
            Self::check_existing(&lock_path, entity, force)?;
            fs::remove_file(lock_path.as_std_path()).map_err(|e| LockError::Acquisition {
                reason: format!("failed to remove old lock: {e}"),
            })?;
        }

        let info = LockInfo {
            pid: process::id(),
            created_at: now_epoch_secs(),
            entity: entity.to_string(),
            formbridge_version: env!("CARGO_PKG_VERSION").to_string(),
        };

        let lock_file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(lock_path.as_std_path())
            .map_err(|e| LockError::Acquisition {
                reason: format!("failed to create lock file: {e}"),
            })?;

        let info_json =
            serde_json::to_string_pretty(&info).map_err(|e| LockError::Acquisition {
                reason: format!("failed to serialize lock info: {e}"),
            })?;

        let mut rw_lock = Box::new(RwLock::new(lock_file));
        {
            let fd_lock = rw_lock.try_write().map_err(|_| LockError::Held {
                entity: entity.to_string(),
                pid: 0,
                created_ago: "unknown".to_string(),
            })?;
            let mut file_ref = &*fd_lock;
            file_ref.write_all(info_json.as_bytes())?;
            file_ref.flush()?;
        }

        Ok(Self {
            lock_path,
            _fd_lock: Some(rw_lock),
            info,
        })
    }

    /// Read lock metadata for an entity directory without acquiring anything.
    pub fn read_info(entity_dir: &Utf8Path) -> Result<Option<LockInfo>, LockError> {
        let lock_path = entity_dir.join(LOCK_FILE_NAME);
        if !lock_path.as_std_path().exists() {
            return Ok(None);
        }
        let content =
            fs::read_to_string(lock_path.as_std_path()).map_err(|e| LockError::Corrupted {
                reason: format!("failed to read lock file: {e}"),
            })?;
        let info = serde_json::from_str(&content).map_err(|e| LockError::Corrupted {
            reason: format!("failed to parse lock file: {e}"),
        })?;
        Ok(Some(info))
    }

    #[must_use]
    pub const fn info(&self) -> &LockInfo {
        &self.info
    }

    fn check_existing(lock_path: &Utf8Path, entity: &str, force: bool) -> Result<(), LockError> {
        let content =
            fs::read_to_string(lock_path.as_std_path()).map_err(|e| LockError::Corrupted {
                reason: format!("failed to read existing lock: {e}"),
            })?;
        let existing: LockInfo = match serde_json::from_str(&content) {
            Ok(info) => info,
            // An unparseable lock file from an interrupted write is treated
            // as stale; force still gates the override.
            Err(e) if force => {
                tracing::warn!("overriding corrupted lock file: {e}");
                return Ok(());
            }
            Err(e) => {
                return Err(LockError::Corrupted {
                    reason: format!("failed to parse existing lock: {e}"),
                });
            }
        };

        // Clock skew can put created_at in the future; saturate to zero age.
        let age_secs = now_epoch_secs().saturating_sub(existing.created_at);

        if force {
            return Ok(());
        }
        if age_secs > DEFAULT_STALE_THRESHOLD_SECS {
            return Err(LockError::Stale {
                entity: entity.to_string(),
                pid: existing.pid,
                age_secs,
            });
        }
        Err(LockError::Held {
            entity: entity.to_string(),
            pid: existing.pid,
            created_ago: format_age(age_secs),
        })
    }
}

impl std::fmt::Debug for EntityLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityLock")
            .field("lock_path", &self.lock_path)
            .field("info", &self.info)
            .field("_fd_lock", &"<RwLock>")
            .finish()
    }
}

impl Drop for EntityLock {
    fn drop(&mut self) {
        // Release the descriptor lock before unlinking, best effort.
        self._fd_lock.take();
        let _ = fs::remove_file(self.lock_path.as_std_path());
    }
}

fn now_epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn format_age(age_secs: u64) -> String {
    if age_secs >= 60 {
        format!("{}m{}s", age_secs / 60, age_secs % 60)
    } else {
        format!("{age_secs}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_entity_dir() -> (tempfile::TempDir, Utf8PathBuf) {
        let td = tempfile::TempDir::new().unwrap();
        let dir = Utf8PathBuf::from_path_buf(td.path().join("Facility")).unwrap();
        (td, dir)
    }

    #[test]
    fn acquire_writes_lock_metadata() {
        let (_td, dir) = temp_entity_dir();
        let lock = EntityLock::acquire(&dir, "Facility", false).unwrap();
        assert_eq!(lock.info().entity, "Facility");
        assert_eq!(lock.info().pid, process::id());

        let info = EntityLock::read_info(&dir).unwrap().unwrap();
        assert_eq!(info.entity, "Facility");
    }

    #[test]
    fn second_acquire_fails_while_lock_is_fresh() {
        let (_td, dir) = temp_entity_dir();
        let _lock = EntityLock::acquire(&dir, "Facility", false).unwrap();
        let err = EntityLock::acquire(&dir, "Facility", false).unwrap_err();
        assert!(matches!(err, LockError::Held { .. }));
    }

    #[test]
    fn force_overrides_fresh_lock() {
        let (_td, dir) = temp_entity_dir();
        let _lock = EntityLock::acquire(&dir, "Facility", false).unwrap();
        let reacquired = EntityLock::acquire(&dir, "Facility", true);
        assert!(reacquired.is_ok());
    }

    #[test]
    fn stale_lock_is_reported_as_stale() {
        let (_td, dir) = temp_entity_dir();
        crate::paths::ensure_dir_all(&dir).unwrap();
        let stale = LockInfo {
            pid: 99999,
            created_at: now_epoch_secs() - DEFAULT_STALE_THRESHOLD_SECS - 10,
            entity: "Facility".to_string(),
            formbridge_version: "0.0.0".to_string(),
        };
        fs::write(
            dir.join(LOCK_FILE_NAME).as_std_path(),
            serde_json::to_string(&stale).unwrap(),
        )
        .unwrap();

        let err = EntityLock::acquire(&dir, "Facility", false).unwrap_err();
        assert!(matches!(err, LockError::Stale { pid: 99999, .. }));

        // With force, the stale lock is replaced.
        let lock = EntityLock::acquire(&dir, "Facility", true).unwrap();
        assert_eq!(lock.info().pid, process::id());
    }

    #[test]
    fn debug_output_elides_the_descriptor_lock() {
        let (_td, dir) = temp_entity_dir();
        let lock = EntityLock::acquire(&dir, "Facility", false).unwrap();
        let rendered = format!("{lock:?}");
        assert!(rendered.contains("Facility"));
        assert!(rendered.contains("<RwLock>"));
    }

    #[test]
    fn drop_releases_the_lock() {
        let (_td, dir) = temp_entity_dir();
        {
            let _lock = EntityLock::acquire(&dir, "Facility", false).unwrap();
        }
        assert!(EntityLock::read_info(&dir).unwrap().is_none());
        let reacquired = EntityLock::acquire(&dir, "Facility", false);
        assert!(reacquired.is_ok());
    }

    #[test]
    fn corrupted_lock_requires_force() {
        let (_td, dir) = temp_entity_dir();
        crate::paths::ensure_dir_all(&dir).unwrap();
        fs::write(dir.join(LOCK_FILE_NAME).as_std_path(), "not json").unwrap();

        let err = EntityLock::acquire(&dir, "Facility", false).unwrap_err();
        assert!(matches!(err, LockError::Corrupted { .. }));
        assert!(EntityLock::acquire(&dir, "Facility", true).is_ok());
    }
}
