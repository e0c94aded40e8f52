//! Mount point discovery

use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

use crate::error::{IovError, Result};

/// Finds the filesystem mount a path lives under
pub trait MountResolver: Send + Sync + fmt::Debug {
    fn resolve(&self, path: &Path) -> Result<PathBuf>;
}

/// Resolver reading the kernel mount table
#[derive(Debug, Clone)]
pub struct ProcMountResolver {
    /// Mount table to read
    pub mounts_file: PathBuf,
    /// Only accept mounts of this filesystem type
    pub fs_type: Option<String>,
}

impl Default for ProcMountResolver {
    fn default() -> Self {
        Self {
            mounts_file: PathBuf::from("/proc/self/mounts"),
            fs_type: None,
        }
    }
}

impl ProcMountResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only accept mounts whose type equals `fs_type`
    pub fn with_fs_type(mut self, fs_type: impl Into<String>) -> Self {
        self.fs_type = Some(fs_type.into());
        self
    }

    /// Read the table from `path` instead of `/proc/self/mounts`
    pub fn with_mounts_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.mounts_file = path.into();
        self
    }
}

impl MountResolver for ProcMountResolver {
    fn resolve(&self, path: &Path) -> Result<PathBuf> {
        let path = fs::canonicalize(path)
            .map_err(|e| IovError::from_io(e, &format!("Failed to resolve {}", path.display())))?;
        let table = fs::read_to_string(&self.mounts_file)
            .map_err(|e| IovError::from_io(e, "Failed to read mount table"))?;

        find_mount_point(&path, &table, self.fs_type.as_deref())
            .ok_or_else(|| IovError::mount_not_found(&path))
    }
}

/// Longest mount point in `table` (fstab format) containing `path`
pub fn find_mount_point(path: &Path, table: &str, fs_type: Option<&str>) -> Option<PathBuf> {
    table
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let _device = fields.next()?;
            let mount = unescape(fields.next()?);
            let kind = fields.next()?;
            Some((PathBuf::from(mount), kind))
        })
        .filter(|(_, kind)| fs_type.map_or(true, |wanted| *kind == wanted))
        .filter(|(mount, _)| path.starts_with(mount))
        .max_by_key(|(mount, _)| mount.components().count())
        .map(|(mount, _)| mount)
}

/// Undo the octal escaping of whitespace and backslashes in mount tables
fn unescape(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() {
            let digits = &bytes[i + 1..i + 4];
            if digits.iter().all(|d| (b'0'..=b'7').contains(d)) {
                let value = digits.iter().fold(0u32, |acc, d| acc * 8 + (d - b'0') as u32);
                out.push(value as u8);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}
