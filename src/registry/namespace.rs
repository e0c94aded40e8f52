//! Namespace entries that publish a shared buffer's identity to the filesystem

use std::{fmt, fs, io, os::unix::fs::symlink, path::Path};

/// Creates and removes the link-like entries the storage backend resolves
pub trait Namespace: Send + Sync + fmt::Debug {
    /// Create an entry at `entry` pointing at `target`
    fn create_entry(&self, entry: &Path, target: &Path) -> io::Result<()>;

    /// Remove the entry at `entry`. A missing entry is not an error.
    fn remove_entry(&self, entry: &Path) -> io::Result<()>;

    /// Check whether `entry` currently exists
    fn contains(&self, entry: &Path) -> bool;
}

/// Namespace backed by symbolic links inside the mount point
#[derive(Debug, Default, Clone, Copy)]
pub struct SymlinkNamespace;

impl Namespace for SymlinkNamespace {
    fn create_entry(&self, entry: &Path, target: &Path) -> io::Result<()> {
        symlink(target, entry)
    }

    fn remove_entry(&self, entry: &Path) -> io::Result<()> {
        match fs::symlink_metadata(entry) {
            // Only links are ours to remove
            Ok(meta) if meta.file_type().is_symlink() => match fs::remove_file(entry) {
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                other => other,
            },
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn contains(&self, entry: &Path) -> bool {
        fs::symlink_metadata(entry)
            .map(|meta| meta.file_type().is_symlink())
            .unwrap_or(false)
    }
}
