//! I/O vectors: shared buffers published to the filesystem for zero-copy I/O.
//!
//! Creating an [`IoVec`] places a namespace entry at
//! `{mount_point}/virtual-iovecs-dir/{uuid}[.b{block_size}]` that points at
//! the buffer's backing object. The storage backend resolves that entry to
//! map the buffer. The entry lives exactly as long as the vector is open.

use std::{
    ops::{Bound, Index, IndexMut, RangeBounds},
    path::{Path, PathBuf},
    slice::SliceIndex,
    sync::Arc,
};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    engine::{IoEngine, IovSlice, NativeVector, VectorParams},
    error::{IovError, Result},
    registry::Registry,
    shm::SharedBuffer,
};

/// Directory under the mount point holding vector namespace entries
pub const IOVEC_NAMESPACE_DIR: &str = "virtual-iovecs-dir";

/// Namespace entry path for vector `id` on `mount_point`
pub fn namespace_path(mount_point: &Path, id: &Uuid, block_size: usize) -> PathBuf {
    let mut name = id.hyphenated().to_string();
    if block_size > 0 {
        name.push_str(&format!(".b{}", block_size));
    }
    mount_point.join(IOVEC_NAMESPACE_DIR).join(name)
}

/// Per-vector registration options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorConfig {
    /// Registration block size, 0 registers the buffer as one block
    pub block_size: usize,
    /// NUMA node to bind the memory to, -1 for none
    pub numa: i32,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            block_size: 0,
            numa: -1,
        }
    }
}

impl VectorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the registration block size
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Set the NUMA node
    pub fn with_numa(mut self, numa: i32) -> Self {
        self.numa = numa;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.numa < -1 {
            return Err(IovError::invalid_parameter(
                "numa",
                "NUMA node must be -1 or a node index",
            ));
        }
        Ok(())
    }
}

/// A shared buffer registered with the filesystem.
///
/// Closing is idempotent and also happens on drop. Dropping releases the
/// owned buffer after the namespace entry is gone.
#[derive(Debug)]
pub struct IoVec {
    id: Uuid,
    mount_point: PathBuf,
    config: VectorConfig,
    /// Namespace entry
    link: PathBuf,
    closed: bool,
    registry: Arc<Registry>,
    native: Arc<dyn NativeVector>,
    // Dropped last, after the engine handle
    buffer: Option<SharedBuffer>,
}

impl IoVec {
    /// Register `buffer` on `mount_point`.
    ///
    /// On failure nothing stays published and the buffer is released.
    pub fn create(
        engine: &dyn IoEngine,
        registry: Arc<Registry>,
        buffer: SharedBuffer,
        mount_point: impl Into<PathBuf>,
        config: VectorConfig,
    ) -> Result<Self> {
        Self::try_create(engine, registry, buffer, mount_point.into(), config)
            .map_err(|(e, _buffer)| e)
    }

    /// Like [`IoVec::create`], but a failure hands the buffer back unreleased
    pub(crate) fn try_create(
        engine: &dyn IoEngine,
        registry: Arc<Registry>,
        buffer: SharedBuffer,
        mount_point: PathBuf,
        config: VectorConfig,
    ) -> std::result::Result<Self, (IovError, SharedBuffer)> {
        if let Err(e) = config.validate() {
            return Err((e, buffer));
        }

        let id = Uuid::new_v4();
        let link = namespace_path(&mount_point, &id, config.block_size);

        if let Err(e) = registry.namespace().create_entry(&link, buffer.path()) {
            return Err((
                IovError::from_io(e, "Failed to create iovec namespace entry"),
                buffer,
            ));
        }
        registry.register(link.clone());

        let params = VectorParams {
            view: buffer.view(),
            id,
            mount_point: mount_point.clone(),
            block_size: config.block_size,
            numa: config.numa,
        };

        let native = match engine.create_vector(params) {
            Ok(native) => native,
            Err(e) => {
                registry.unregister(&link);
                if let Err(err) = registry.namespace().remove_entry(&link) {
                    log::warn!("rollback of {} failed: {}", link.display(), err);
                }
                return Err((e, buffer));
            }
        };

        log::debug!(
            "iovec {} created on {} ({} bytes, block size {})",
            id,
            mount_point.display(),
            buffer.size(),
            config.block_size
        );

        Ok(Self {
            id,
            mount_point,
            config,
            link,
            closed: false,
            registry,
            native,
            buffer: Some(buffer),
        })
    }

    /// Unpublish the vector. Safe to call any number of times.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        self.registry.unregister(&self.link);
        if let Err(e) = self.registry.namespace().remove_entry(&self.link) {
            log::debug!("iovec {}: could not remove {}: {}", self.id, self.link.display(), e);
        }
        log::debug!("iovec {} closed", self.id);
    }

    /// Close the vector and take back its buffer
    pub fn into_buffer(mut self) -> SharedBuffer {
        self.close();
        // Only ever None after this call consumed self
        self.buffer
            .take()
            .unwrap_or_else(|| unreachable!("iovec buffer taken twice"))
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn mount_point(&self) -> &Path {
        &self.mount_point
    }

    pub fn block_size(&self) -> usize {
        self.config.block_size
    }

    pub fn numa(&self) -> i32 {
        self.config.numa
    }

    /// Path of the namespace entry
    pub fn namespace_path(&self) -> &Path {
        &self.link
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Engine handle
    pub fn native(&self) -> &Arc<dyn NativeVector> {
        &self.native
    }

    /// The underlying buffer
    pub fn buffer(&self) -> &SharedBuffer {
        self.buffer
            .as_ref()
            .unwrap_or_else(|| unreachable!("iovec buffer missing"))
    }

    fn buffer_mut(&mut self) -> &mut SharedBuffer {
        self.buffer
            .as_mut()
            .unwrap_or_else(|| unreachable!("iovec buffer missing"))
    }

    /// Size in bytes
    pub fn len(&self) -> usize {
        self.buffer().size()
    }

    /// Check if the vector is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The vector's memory
    pub fn as_slice(&self) -> &[u8] {
        self.buffer().as_slice()
    }

    /// The vector's memory (mutable)
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        self.buffer_mut().as_mut_slice()
    }

    /// A byte range usable as a ring operation target
    pub fn slice(&self, range: impl RangeBounds<usize>) -> Result<IovSlice> {
        if self.closed {
            return Err(IovError::closed(format!("iovec {}", self.id)));
        }

        let len = self.len();
        let start = match range.start_bound() {
            Bound::Included(&s) => s,
            Bound::Excluded(&s) => s + 1,
            Bound::Unbounded => 0,
        };
        let end = match range.end_bound() {
            Bound::Included(&e) => e + 1,
            Bound::Excluded(&e) => e,
            Bound::Unbounded => len,
        };

        if start > end || end > len {
            return Err(IovError::invalid_parameter(
                "range",
                format!("{}..{} is outside a vector of {} bytes", start, end, len),
            ));
        }

        Ok(IovSlice::new(Arc::clone(&self.native), start, end - start))
    }
}

impl<I: SliceIndex<[u8]>> Index<I> for IoVec {
    type Output = I::Output;

    fn index(&self, index: I) -> &Self::Output {
        &self.as_slice()[index]
    }
}

impl<I: SliceIndex<[u8]>> IndexMut<I> for IoVec {
    fn index_mut(&mut self, index: I) -> &mut Self::Output {
        &mut self.as_mut_slice()[index]
    }
}

impl Drop for IoVec {
    fn drop(&mut self) {
        self.close();
    }
}
