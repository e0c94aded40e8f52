//! Shared buffer implementation

use std::{
    fmt,
    fs::{self, File, OpenOptions},
    os::unix::fs::OpenOptionsExt,
    path::{Path, PathBuf},
    sync::Arc,
};

use memmap2::{MmapOptions, MmapRaw};
use nix::unistd::ftruncate;
use uuid::Uuid;

use crate::error::{IovError, Result};

use super::config::ShmConfig;

/// The mapping itself, shared between a buffer and every view handed to an engine
struct Mapping {
    raw: MmapRaw,
}

impl fmt::Debug for Mapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mapping")
            .field("ptr", &self.raw.as_ptr())
            .field("len", &self.raw.len())
            .finish()
    }
}

/// A window into a shared buffer's memory.
///
/// Views keep the mapping alive, so an engine holding one never points at
/// unmapped memory even if the owning [`SharedBuffer`] has been released.
#[derive(Debug, Clone)]
pub struct BufferView {
    mapping: Arc<Mapping>,
    offset: usize,
    len: usize,
}

impl BufferView {
    /// Length of the window in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the window is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Offset of the window inside its buffer
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Pointer to the first byte of the window
    pub fn as_ptr(&self) -> *const u8 {
        unsafe { self.mapping.raw.as_ptr().add(self.offset) as *const u8 }
    }

    /// Mutable pointer to the first byte of the window
    pub fn as_mut_ptr(&self) -> *mut u8 {
        unsafe { self.mapping.raw.as_mut_ptr().add(self.offset) }
    }

    /// Narrow the window to `len` bytes starting `offset` bytes into it
    pub fn slice(&self, offset: usize, len: usize) -> Result<BufferView> {
        let end = offset.checked_add(len).ok_or_else(|| {
            IovError::invalid_parameter("len", "Slice end overflows")
        })?;
        if end > self.len {
            return Err(IovError::invalid_parameter(
                "len",
                format!("Slice {}..{} exceeds view of {} bytes", offset, end, self.len),
            ));
        }

        Ok(BufferView {
            mapping: Arc::clone(&self.mapping),
            offset: self.offset + offset,
            len,
        })
    }

    /// Borrow the window as bytes
    ///
    /// # Safety
    /// No engine may be writing into the window for the lifetime of the borrow
    pub unsafe fn as_slice(&self) -> &[u8] {
        std::slice::from_raw_parts(self.as_ptr(), self.len)
    }

    /// Borrow the window as mutable bytes
    ///
    /// # Safety
    /// Caller must ensure exclusive access to the window for the lifetime of the borrow
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn as_mut_slice(&self) -> &mut [u8] {
        std::slice::from_raw_parts_mut(self.as_mut_ptr(), self.len)
    }
}

/// A named, fixed-size, directly addressable shared memory region
#[derive(Debug)]
pub struct SharedBuffer {
    /// Unique object name
    name: String,
    /// Backing-store path the storage backend resolves
    path: PathBuf,
    /// Shared mapping
    mapping: Arc<Mapping>,
    /// Backing file handle
    _file: File,
    /// Whether the backing object has been unlinked already
    unlinked: bool,
}

impl SharedBuffer {
    /// Allocate a buffer of `size` bytes under the default shared memory directory
    pub fn create(size: usize) -> Result<Self> {
        Self::with_config(&ShmConfig::default(), size)
    }

    /// Allocate a buffer of `size` bytes according to `config`
    pub fn with_config(config: &ShmConfig, size: usize) -> Result<Self> {
        config.validate()?;

        if size == 0 {
            return Err(IovError::invalid_parameter(
                "size",
                "Buffer size must be greater than 0",
            ));
        }

        let name = format!("{}{}", config.name_prefix, Uuid::new_v4().simple());
        let path = config.path_for(&name);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .mode(config.permissions)
            .open(&path)
            .map_err(|e| IovError::from_io(e, "Failed to create shared memory object"))?;

        let mapping = Self::map(&file, size).map_err(|e| {
            let _ = fs::remove_file(&path);
            e
        })?;

        log::debug!("allocated shared buffer {} ({} bytes)", name, size);

        Ok(Self {
            name,
            path,
            mapping: Arc::new(mapping),
            _file: file,
            unlinked: false,
        })
    }

    fn map(file: &File, size: usize) -> Result<Mapping> {
        ftruncate(file, size as libc::off_t)?;

        let raw = MmapOptions::new()
            .len(size)
            .map_raw(file)
            .map_err(|e| IovError::from_io(e, "Failed to create memory mapping"))?;

        Ok(Mapping { raw })
    }

    /// Get the object name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the backing-store path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the size in bytes
    pub fn size(&self) -> usize {
        self.mapping.raw.len()
    }

    /// A view over the whole buffer
    pub fn view(&self) -> BufferView {
        BufferView {
            mapping: Arc::clone(&self.mapping),
            offset: 0,
            len: self.size(),
        }
    }

    /// Get the raw memory slice (read-only)
    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.mapping.raw.as_ptr(), self.size()) }
    }

    /// Get the raw memory slice (mutable)
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.mapping.raw.as_mut_ptr(), self.size()) }
    }

    /// Close and unlink the buffer
    pub fn release(mut self) -> Result<()> {
        self.unlinked = true;
        fs::remove_file(&self.path)
            .map_err(|e| IovError::from_io(e, "Failed to unlink shared memory object"))?;
        log::debug!("released shared buffer {}", self.name);
        Ok(())
    }
}

impl Drop for SharedBuffer {
    fn drop(&mut self) {
        if self.unlinked {
            return;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => log::debug!("released shared buffer {}", self.name),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("failed to unlink shared buffer {}: {}", self.name, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn buffer_in(dir: &TempDir, size: usize) -> SharedBuffer {
        SharedBuffer::with_config(&ShmConfig::new(dir.path()), size).unwrap()
    }

    #[test]
    fn test_create_and_release() {
        let dir = TempDir::new().unwrap();
        let buffer = buffer_in(&dir, 4096);
        let path = buffer.path().to_path_buf();

        assert_eq!(buffer.size(), 4096);
        assert!(path.exists());
        assert!(buffer.name().starts_with("iovring_"));

        buffer.release().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_drop_unlinks() {
        let dir = TempDir::new().unwrap();
        let path = {
            let buffer = buffer_in(&dir, 128);
            buffer.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_zero_size_rejected() {
        let dir = TempDir::new().unwrap();
        let result = SharedBuffer::with_config(&ShmConfig::new(dir.path()), 0);
        assert!(matches!(result, Err(IovError::InvalidParameter { .. })));
    }

    #[test]
    fn test_memory_is_shared_with_views() {
        let dir = TempDir::new().unwrap();
        let mut buffer = buffer_in(&dir, 64);
        buffer.as_mut_slice()[10] = 7;

        let view = buffer.view().slice(8, 4).unwrap();
        assert_eq!(unsafe { view.as_slice() }, &[0, 0, 7, 0]);

        unsafe { view.as_mut_slice()[0] = 9 };
        assert_eq!(buffer.as_slice()[8], 9);
    }

    #[test]
    fn test_view_bounds() {
        let dir = TempDir::new().unwrap();
        let buffer = buffer_in(&dir, 64);
        assert!(buffer.view().slice(60, 4).is_ok());
        assert!(buffer.view().slice(60, 5).is_err());
        assert!(buffer.view().slice(usize::MAX, 2).is_err());
    }

    #[test]
    fn test_view_outlives_buffer() {
        let dir = TempDir::new().unwrap();
        let mut buffer = buffer_in(&dir, 16);
        buffer.as_mut_slice()[0] = 42;
        let view = buffer.view();
        buffer.release().unwrap();
        assert_eq!(unsafe { view.as_slice()[0] }, 42);
    }
}
