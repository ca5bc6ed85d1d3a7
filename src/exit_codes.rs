//! Exit code constants and error mapping for formbridge.
//!
//! # Exit Code Table
//!
//! | Code | Constant | Description |
//! |------|----------|-------------|
//! | 0 | `SUCCESS` | Operation completed successfully |
//! | 1 | `INTERNAL` | General/internal failure |
//! | 2 | `CLI_ARGS` | Invalid CLI arguments or configuration |
//! | 9 | `LOCK_HELD` | Another process holds the entity lock |
//! | 20 | `STAGE_FAILED` | One or more pipeline stages failed |
//! | 74 | `IO` | Artifact store I/O failure |

/// Type-safe process exit codes. The numeric values are part of the public
/// contract scripts depend on; use the named constants and
/// [`as_i32()`](Self::as_i32) for `std::process::exit()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(i32);

impl ExitCode {
    /// Operation completed successfully, every attempted stage succeeded.
    pub const SUCCESS: ExitCode = ExitCode(0);

    /// General/internal failure.
    pub const INTERNAL: ExitCode = ExitCode(1);

    /// Invalid or missing command-line arguments or configuration.
    pub const CLI_ARGS: ExitCode = ExitCode(2);

    /// Another formbridge process holds the lock for this entity.
    pub const LOCK_HELD: ExitCode = ExitCode(9);

    /// The run completed but at least one stage failed or was starved of
    /// its inputs.
    pub const STAGE_FAILED: ExitCode = ExitCode(20);

    /// The artifact store could not be read or written.
    pub const IO: ExitCode = ExitCode(74);

    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    /// Prefer the named constants when possible.
    #[must_use]
    pub const fn from_i32(code: i32) -> Self {
        ExitCode(code)
    }
}

impl From<i32> for ExitCode {
    fn from(code: i32) -> Self {
        ExitCode(code)
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.0
    }
}
