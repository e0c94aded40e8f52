//! File descriptor registration with the filesystem driver

use std::{fmt, os::fd::RawFd};

use crate::error::Result;

/// Marks descriptors as eligible for zero-copy I/O
pub trait FdRegistrar: Send + Sync + fmt::Debug {
    /// Register `fd`; failure means the descriptor cannot be used with a ring
    fn register(&self, fd: RawFd) -> Result<()>;

    /// Deregister `fd`. Callers treat failures as best effort.
    fn deregister(&self, fd: RawFd) -> Result<()>;
}

/// Registrar for engines that need no registration, such as plain positional I/O
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopFdRegistrar;

impl FdRegistrar for NoopFdRegistrar {
    fn register(&self, fd: RawFd) -> Result<()> {
        log::trace!("fd {} registered", fd);
        Ok(())
    }

    fn deregister(&self, fd: RawFd) -> Result<()> {
        log::trace!("fd {} deregistered", fd);
        Ok(())
    }
}
