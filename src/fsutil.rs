//! Filesystem helpers with explicit durability semantics
//!
//! The single hard requirement here is [`atomic_write`]: a crash at any point
//! must leave either the old file fully intact or the new file fully intact,
//! never a torn write. This is what makes the bookkeeping file and staged
//! manifests safe to rewrite in place.

use crate::error::Result;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use tracing::trace;

/// Atomically and durably replace the file at `path` with `content`
///
/// Algorithm:
///
/// 1. Write `content` to a sibling `<path>.tmp` file and `fsync` it.
/// 2. Remove any pre-existing file at `path`.
/// 3. Rename the temporary file onto `path` (atomic on one filesystem).
/// 4. Open the parent directory and `fsync` it so the rename itself survives
///    a crash.
///
/// On failure a stray `.tmp` file may remain; it is overwritten by the next
/// attempt.
///
/// # Errors
///
/// [`crate::ShipperError::Io`] if any step fails. The target file is never
/// left partially written.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let tmp = tmp_path(path);

    let mut file = File::create(&tmp)?;
    file.write_all(content)?;
    file.sync_all()?;
    drop(file);

    match fs::remove_file(path) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(err.into()),
    }
    fs::rename(&tmp, path)?;

    // Persist the rename: fsync the directory entry's parent.
    if let Some(parent) = path.parent() {
        let dir = open_dir(parent)?;
        dir.sync_all()?;
    }

    trace!(path = %path.display(), bytes = content.len(), "atomic write");
    Ok(())
}

/// Remove a directory tree, treating "already gone" as success
pub fn remove_dir_all_if_exists(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn tmp_path(path: &Path) -> std::path::PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(unix)]
fn open_dir(path: &Path) -> std::io::Result<File> {
    File::open(path)
}

#[cfg(not(unix))]
fn open_dir(path: &Path) -> std::io::Result<File> {
    // Windows refuses plain opens of directories without backup semantics;
    // read access is enough for FlushFileBuffers.
    fs::OpenOptions::new().read(true).open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_atomic_write_creates_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("meta.json");

        atomic_write(&path, b"hello").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"hello");
        assert!(!tmp.path().join("meta.json.tmp").exists());
    }

    #[test]
    fn test_atomic_write_replaces_existing() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("meta.json");

        fs::write(&path, b"old contents").unwrap();
        atomic_write(&path, b"new").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"new");
    }

    #[test]
    fn test_tmp_path_keeps_full_name() {
        // `.tmp` must be appended, not swap the extension, so sibling files
        // like `meta.json` and `meta.tmp` cannot collide.
        let path = Path::new("/data/meta.json");
        assert_eq!(tmp_path(path), Path::new("/data/meta.json.tmp"));
    }

    #[test]
    fn test_remove_dir_all_if_exists() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("staging");
        fs::create_dir_all(dir.join("segments")).unwrap();
        fs::write(dir.join("segments").join("000001"), b"x").unwrap();

        remove_dir_all_if_exists(&dir).unwrap();
        assert!(!dir.exists());

        // Second removal is a no-op, not an error.
        remove_dir_all_if_exists(&dir).unwrap();
    }
}
