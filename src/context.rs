//! The bundle of collaborators vectors, rings and reads are built from

use std::{path::{Path, PathBuf}, sync::Arc};

use crate::{
    engine::{self, IoEngine},
    error::Result,
    iovec::{IoVec, VectorConfig},
    reader::{self, ReadControl, ReadOptions},
    registry::Registry,
    ring::{IoRing, RingConfig},
    services::{FdRegistrar, MountResolver, NoopFdRegistrar, ProcMountResolver},
    shm::{SharedBuffer, ShmConfig},
};

/// Engine, registry and host services used to create vectors and rings.
///
/// The default context uses the process-wide [`Registry`], the best engine
/// available on this host, `/proc/self/mounts` for mount discovery and no
/// descriptor registration.
#[derive(Debug, Clone)]
pub struct IoContext {
    engine: Arc<dyn IoEngine>,
    registry: Arc<Registry>,
    fds: Arc<dyn FdRegistrar>,
    mounts: Arc<dyn MountResolver>,
    shm: ShmConfig,
}

impl Default for IoContext {
    fn default() -> Self {
        Self::new(engine::default_engine())
    }
}

impl IoContext {
    /// Context using `engine` and defaults for everything else
    pub fn new(engine: Arc<dyn IoEngine>) -> Self {
        Self {
            engine,
            registry: Registry::global(),
            fds: Arc::new(NoopFdRegistrar),
            mounts: Arc::new(ProcMountResolver::default()),
            shm: ShmConfig::default(),
        }
    }

    /// Use `registry` instead of the process-wide one
    pub fn with_registry(mut self, registry: Arc<Registry>) -> Self {
        self.registry = registry;
        self
    }

    /// Set the descriptor registrar
    pub fn with_fd_registrar(mut self, fds: Arc<dyn FdRegistrar>) -> Self {
        self.fds = fds;
        self
    }

    /// Set the mount resolver
    pub fn with_mount_resolver(mut self, mounts: Arc<dyn MountResolver>) -> Self {
        self.mounts = mounts;
        self
    }

    /// Set where shared buffers are allocated
    pub fn with_shm_config(mut self, shm: ShmConfig) -> Self {
        self.shm = shm;
        self
    }

    pub fn engine(&self) -> &Arc<dyn IoEngine> {
        &self.engine
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn fd_registrar(&self) -> &Arc<dyn FdRegistrar> {
        &self.fds
    }

    pub fn mount_resolver(&self) -> &Arc<dyn MountResolver> {
        &self.mounts
    }

    pub fn shm_config(&self) -> &ShmConfig {
        &self.shm
    }

    /// Resolve the mount point `path` lives on
    pub fn mount_point_of(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        self.mounts.resolve(path.as_ref())
    }

    /// Allocate a shared buffer of `size` bytes
    pub fn allocate_buffer(&self, size: usize) -> Result<SharedBuffer> {
        SharedBuffer::with_config(&self.shm, size)
    }

    /// Register `buffer` as an I/O vector on `mount_point`
    pub fn create_iovec(
        &self,
        buffer: SharedBuffer,
        mount_point: impl Into<PathBuf>,
        config: VectorConfig,
    ) -> Result<IoVec> {
        IoVec::create(
            self.engine.as_ref(),
            Arc::clone(&self.registry),
            buffer,
            mount_point,
            config,
        )
    }

    /// Create a ring on `mount_point`
    pub fn create_ioring(&self, mount_point: impl Into<PathBuf>, config: RingConfig) -> Result<IoRing> {
        IoRing::create(self.engine.as_ref(), mount_point, config)
    }

    /// Ring memory the configured engine needs for `entries` operations
    pub fn ring_size_for_entries(&self, entries: usize) -> usize {
        IoRing::size_for_entries(self.engine.as_ref(), entries)
    }

    /// See [`reader::read_file`]
    pub fn read_file(&self, path: impl AsRef<Path>, options: &ReadOptions) -> Result<Vec<u8>> {
        reader::read_file(self, path, options)
    }

    /// See [`reader::read_file_with`]
    pub fn read_file_with<F>(&self, path: impl AsRef<Path>, options: &ReadOptions, callback: F) -> Result<()>
    where
        F: FnMut(&[u8], u64) -> ReadControl,
    {
        reader::read_file_with(self, path, options, callback)
    }
}
