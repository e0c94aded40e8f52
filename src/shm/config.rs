//! Configuration for shared buffers

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Directory POSIX shared memory objects live in on Linux
pub const DEFAULT_SHM_DIR: &str = "/dev/shm";

/// Configuration for allocating shared buffers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShmConfig {
    /// Directory the backing objects are created in
    pub dir: PathBuf,
    /// Prefix for generated object names
    pub name_prefix: String,
    /// Permissions for the backing object (Unix permissions)
    pub permissions: u32,
}

impl Default for ShmConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_SHM_DIR),
            name_prefix: "iovring_".to_string(),
            permissions: 0o600,
        }
    }
}

impl ShmConfig {
    /// Create a configuration that allocates under `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Default::default()
        }
    }

    /// Set the name prefix
    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }

    /// Set the permissions
    pub fn with_permissions(mut self, permissions: u32) -> Self {
        self.permissions = permissions;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        use crate::error::IovError;

        if self.dir.as_os_str().is_empty() {
            return Err(IovError::invalid_parameter(
                "dir",
                "Shared memory directory cannot be empty",
            ));
        }

        if self.name_prefix.contains('/') || self.name_prefix.contains('\0') {
            return Err(IovError::invalid_parameter(
                "name_prefix",
                "Name prefix cannot contain '/' or NUL",
            ));
        }

        Ok(())
    }

    /// Backing path for an object called `name`
    pub fn path_for(&self, name: &str) -> PathBuf {
        normalize(&self.dir.join(name))
    }
}

/// Lexically normalize a path (drop `.` components, fold `..`)
pub(crate) fn normalize(path: &Path) -> PathBuf {
    use std::path::Component;

    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}
