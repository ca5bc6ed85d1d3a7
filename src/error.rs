//! Top-level error type and its exit-code mapping.

use thiserror::Error;

use crate::config::ConfigError;
use crate::entity::EntityNameError;
use crate::exit_codes::ExitCode;
use crate::lock::LockError;
use crate::store::StoreError;
use crate::types::SkipParseError;

/// Fatal errors that abort a formbridge invocation. Stage-local failures
/// (missing dependencies, failed generations) are not represented here; they
/// are values in the run report.
#[derive(Debug, Error)]
pub enum FormbridgeError {
    #[error(transparent)]
    Entity(#[from] EntityNameError),

    #[error(transparent)]
    Skip(#[from] SkipParseError),

    #[error("unknown stage '{token}' (expected a stage name or ordinal 0-4)")]
    UnknownStage { token: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("preflight check failed: {reason}")]
    Preflight { reason: String },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl FormbridgeError {
    /// Map to the documented exit code table.
    #[must_use]
    pub fn to_exit_code(&self) -> ExitCode {
        match self {
            Self::Entity(_) | Self::Skip(_) | Self::UnknownStage { .. } | Self::Config(_) => {
                ExitCode::CLI_ARGS
            }
            // Setup problems are reported before any stage executes.
            Self::Preflight { .. } => ExitCode::CLI_ARGS,
            Self::Lock(_) => ExitCode::LOCK_HELD,
            Self::Store(StoreError::Io { .. }) => ExitCode::IO,
            // A NotFound escaping this far is a logic error, not bad storage.
            Self::Store(StoreError::NotFound { .. }) => ExitCode::INTERNAL,
            Self::Internal(_) => ExitCode::INTERNAL,
        }
    }
}
