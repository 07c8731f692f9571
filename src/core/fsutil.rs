use super::{MigrateError, Result};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Replaces `path` with `bytes` without ever exposing a partially written file.
///
/// The data goes to a temporary file in the same directory, is synced, and is
/// then renamed over the target.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)
        .map_err(|e| MigrateError::Io(format!("Failed to create directory {}: {}", dir.display(), e)))?;

    let mut temp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| MigrateError::Io(format!("Failed to create temp file: {}", e)))?;
    temp.write_all(bytes)
        .map_err(|e| MigrateError::Io(format!("Failed to write {}: {}", path.display(), e)))?;
    temp.flush()
        .map_err(|e| MigrateError::Io(format!("Failed to flush {}: {}", path.display(), e)))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| MigrateError::Io(format!("Failed to sync {}: {}", path.display(), e)))?;
    temp.persist(path)
        .map_err(|e| MigrateError::Io(format!("Failed to rename into {}: {}", path.display(), e.error)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_atomic_creates_and_replaces() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("file.json");

        write_atomic(&path, b"first").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "first");

        write_atomic(&path, b"second").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "second");

        // Only the target remains; the temp file was renamed away.
        let entries = fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(entries, 1);
    }
}
