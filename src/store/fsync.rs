//! Durability helpers shared by the on-disk logs.

use std::fs::{self, File};
use std::io;
use std::path::Path;

/// Flushes a file's data and metadata to stable storage.
pub fn fsync_file(file: &File) -> io::Result<()> {
    file.sync_all()
}

/// Flushes a directory so entries created or renamed in it survive a crash.
pub fn fsync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

/// Creates `dir` with any missing parents. A freshly created directory's
/// entry is made durable by syncing its parent.
pub fn ensure_dir(dir: &Path) -> io::Result<()> {
    if dir.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(dir)?;
    match dir.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fsync_dir(parent),
        _ => Ok(()),
    }
}
