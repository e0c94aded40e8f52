//! Native engine seam.
//!
//! The engine owns the actual registration of vectors and the execution of
//! ring operations. [`crate::IoVec`] and [`crate::IoRing`] only hold opaque
//! handles produced here, so the same lifecycle code drives any backend.

pub mod sync;
#[cfg(all(target_os = "linux", feature = "uring"))]
pub mod uring;

use std::{
    fmt,
    os::fd::RawFd,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use uuid::Uuid;

use crate::{
    error::Result,
    ring::config::RingConfig,
    shm::BufferView,
};

pub use sync::SyncEngine;
#[cfg(all(target_os = "linux", feature = "uring"))]
pub use uring::UringEngine;

/// Everything an engine needs to register a vector
#[derive(Debug, Clone)]
pub struct VectorParams {
    pub view: BufferView,
    pub id: Uuid,
    pub mount_point: PathBuf,
    pub block_size: usize,
    pub numa: i32,
}

/// Engine-side handle of a registered vector
pub trait NativeVector: Send + Sync + fmt::Debug {
    /// Identity shared with the namespace entry
    fn id(&self) -> Uuid;

    /// The registered memory
    fn view(&self) -> &BufferView;

    /// Block size the vector was registered with, 0 for a single block
    fn block_size(&self) -> usize;
}

/// Vector handle for engines that address memory directly
#[derive(Debug)]
pub struct BasicVector {
    id: Uuid,
    view: BufferView,
    block_size: usize,
    numa: i32,
}

impl BasicVector {
    pub fn new(params: VectorParams) -> Self {
        Self {
            id: params.id,
            view: params.view,
            block_size: params.block_size,
            numa: params.numa,
        }
    }

    /// NUMA node hint the vector was registered with
    pub fn numa(&self) -> i32 {
        self.numa
    }
}

impl NativeVector for BasicVector {
    fn id(&self) -> Uuid {
        self.id
    }

    fn view(&self) -> &BufferView {
        &self.view
    }

    fn block_size(&self) -> usize {
        self.block_size
    }
}

/// A byte range of a registered vector
#[derive(Debug, Clone)]
pub struct IovSlice {
    vector: Arc<dyn NativeVector>,
    offset: usize,
    len: usize,
}

impl IovSlice {
    pub(crate) fn new(vector: Arc<dyn NativeVector>, offset: usize, len: usize) -> Self {
        Self { vector, offset, len }
    }

    /// The vector this slice belongs to
    pub fn vector(&self) -> &Arc<dyn NativeVector> {
        &self.vector
    }

    /// Offset of the slice inside the vector
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the slice is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Memory covered by the slice
    pub fn view(&self) -> Result<BufferView> {
        self.vector.view().slice(self.offset, self.len)
    }
}

/// One prepared operation as handed to the engine
#[derive(Debug, Clone)]
pub struct NativeOp {
    pub target: IovSlice,
    pub is_read: bool,
    pub fd: RawFd,
    pub offset: u64,
    /// Submission sequence number, echoed back in the completion
    pub seq: u64,
}

/// Outcome of one operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    /// Sequence number assigned at prepare time
    pub seq: u64,
    /// Bytes transferred, or a negated errno
    pub result: i64,
}

impl Completion {
    /// Check if the operation failed
    pub fn is_error(&self) -> bool {
        self.result < 0
    }

    /// Check if a read hit end of stream
    pub fn is_eof(&self) -> bool {
        self.result == 0
    }

    /// Bytes transferred, `None` on error
    pub fn bytes(&self) -> Option<usize> {
        usize::try_from(self.result).ok()
    }

    /// The positive errno on error
    pub fn errno(&self) -> Option<i32> {
        (self.result < 0).then(|| self.result.unsigned_abs() as i32)
    }
}

/// Engine-side ring
pub trait NativeRing: Send + fmt::Debug {
    /// Queue one operation for the next submit
    fn prepare(&mut self, op: NativeOp) -> Result<()>;

    /// Hand every prepared operation to the engine; returns how many
    fn submit(&mut self) -> Result<usize>;

    /// Block until at least `min_results` completions are available or
    /// `timeout` elapses, then return the available completions
    fn wait(&mut self, min_results: usize, timeout: Option<Duration>) -> Result<Vec<Completion>>;
}

/// Factory for native vectors and rings
pub trait IoEngine: Send + Sync + fmt::Debug {
    /// Short engine name for logs
    fn name(&self) -> &'static str;

    /// Register a vector over `params.view`
    fn create_vector(&self, params: VectorParams) -> Result<Arc<dyn NativeVector>>;

    /// Construct a ring bound to `mount_point`
    fn create_ring(&self, mount_point: &Path, config: &RingConfig) -> Result<Box<dyn NativeRing>>;

    /// Bytes of ring memory needed for `entries` operations
    fn ring_size_for_entries(&self, entries: usize) -> usize;
}

/// The engine used when none is configured
pub fn default_engine() -> Arc<dyn IoEngine> {
    #[cfg(all(target_os = "linux", feature = "uring"))]
    {
        if UringEngine::is_supported() {
            return Arc::new(UringEngine::new());
        }
        log::debug!("io_uring unavailable, falling back to synchronous engine");
    }
    Arc::new(SyncEngine::new())
}
