use camino::{Utf8Path, Utf8PathBuf};

/// Returns `<output_root>/<entity>`, the directory holding all artifacts for
/// one conversion run.
#[must_use]
pub fn entity_dir(output_root: &Utf8Path, entity: &str) -> Utf8PathBuf {
    output_root.join(entity)
}

/// mkdir -p; treat `AlreadyExists` as success (removes TOCTTOU races)
pub fn ensure_dir_all<P: AsRef<std::path::Path>>(p: P) -> std::io::Result<()> {
    match std::fs::create_dir_all(&p) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(e),
    }
}
