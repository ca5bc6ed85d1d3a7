//! Atomic file writes for artifact persistence.
//!
//! A reader (including a later pipeline stage, or an operator inspecting
//! intermediate output) must never observe a partially written artifact, so
//! all writes go through temp file + fsync + rename in the target directory.

use camino::Utf8Path;
use std::io::{self, Write};
use tempfile::NamedTempFile;

/// Atomically write content to a file.
///
/// The temp file is created in the same directory as the target so the final
/// rename stays on one filesystem. Content is normalized to LF line endings.
pub fn write_file_atomic(path: &Utf8Path, content: &str) -> io::Result<()> {
    let normalized = normalize_line_endings(content);

    if let Some(parent) = path.parent() {
        crate::paths::ensure_dir_all(parent)?;
    }

    let temp_dir = path.parent().unwrap_or_else(|| Utf8Path::new("."));
    let mut temp_file = NamedTempFile::new_in(temp_dir)?;
    temp_file.write_all(normalized.as_bytes())?;
    temp_file.as_file().sync_all()?;
    temp_file
        .persist(path.as_std_path())
        .map_err(|e| e.error)?;
    Ok(())
}

/// Normalize CRLF and bare CR to LF.
#[must_use]
pub fn normalize_line_endings(content: &str) -> String {
    content.replace("\r\n", "\n").replace('\r', "\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use std::fs;

    fn temp_target(name: &str) -> (tempfile::TempDir, Utf8PathBuf) {
        let td = tempfile::TempDir::new().unwrap();
        let path = Utf8PathBuf::from_path_buf(td.path().join(name)).unwrap();
        (td, path)
    }

    #[test]
    fn writes_and_reads_back() {
        let (_td, path) = temp_target("artifact.json");
        write_file_atomic(&path, "{\"a\":1}\n").unwrap();
        assert_eq!(fs::read_to_string(path.as_std_path()).unwrap(), "{\"a\":1}\n");
    }

    #[test]
    fn overwrites_existing_content() {
        let (_td, path) = temp_target("artifact.json");
        write_file_atomic(&path, "first").unwrap();
        write_file_atomic(&path, "second").unwrap();
        assert_eq!(fs::read_to_string(path.as_std_path()).unwrap(), "second");
    }

    #[test]
    fn creates_missing_parent_directories() {
        let (_td, base) = temp_target("nested");
        let path = base.join("deep/artifact.md");
        write_file_atomic(&path, "content").unwrap();
        assert!(path.as_std_path().is_file());
    }

    #[test]
    fn normalizes_line_endings() {
        assert_eq!(normalize_line_endings("a\r\nb\rc\n"), "a\nb\nc\n");
        let (_td, path) = temp_target("notes.md");
        write_file_atomic(&path, "a\r\nb").unwrap();
        assert_eq!(fs::read_to_string(path.as_std_path()).unwrap(), "a\nb");
    }
}
