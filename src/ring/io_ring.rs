//! I/O ring wrapper enforcing capacity, direction and completion order

use std::{
    os::fd::RawFd,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    engine::{Completion, IoEngine, IovSlice, NativeOp, NativeRing},
    error::{IovError, Result},
    iovec::IoVec,
};

use super::config::RingConfig;

/// What an operation reads into or writes from
#[derive(Debug, Clone)]
pub enum IoTarget<'a> {
    /// The whole of a registered vector
    Vector(&'a IoVec),
    /// A range of a registered vector
    Slice(IovSlice),
}

impl<'a> From<&'a IoVec> for IoTarget<'a> {
    fn from(iov: &'a IoVec) -> Self {
        IoTarget::Vector(iov)
    }
}

impl From<IovSlice> for IoTarget<'_> {
    fn from(slice: IovSlice) -> Self {
        IoTarget::Slice(slice)
    }
}

impl IoTarget<'_> {
    fn into_slice(self) -> Result<IovSlice> {
        match self {
            IoTarget::Vector(iov) => iov.slice(..),
            IoTarget::Slice(slice) => Ok(slice),
        }
    }
}

/// A bounded queue of operations against registered vectors.
///
/// Every `prepare` takes one of `entries` slots; the slot frees when the
/// operation's completion is returned from `wait`.
#[derive(Debug)]
pub struct IoRing {
    mount_point: PathBuf,
    config: RingConfig,
    native: Box<dyn NativeRing>,
    next_seq: u64,
    /// Prepared, not yet submitted
    prepared: usize,
    /// Submitted, completion not yet returned
    in_flight: usize,
    closed: bool,
}

impl IoRing {
    /// Create a ring bound to `mount_point`
    pub fn create(
        engine: &dyn IoEngine,
        mount_point: impl Into<PathBuf>,
        config: RingConfig,
    ) -> Result<Self> {
        config.validate()?;
        let mount_point = mount_point.into();
        let native = engine.create_ring(&mount_point, &config)?;

        log::debug!(
            "{} ring created on {}: {} entries, {}, depth {}, priority {:?}",
            engine.name(),
            mount_point.display(),
            config.entries,
            if config.for_read { "read" } else { "write" },
            config.io_depth,
            config.priority
        );

        Ok(Self {
            mount_point,
            config,
            native,
            next_seq: 0,
            prepared: 0,
            in_flight: 0,
            closed: false,
        })
    }

    /// Ring memory an engine needs for `entries` operations
    pub fn size_for_entries(engine: &dyn IoEngine, entries: usize) -> usize {
        engine.ring_size_for_entries(entries)
    }

    pub fn mount_point(&self) -> &Path {
        &self.mount_point
    }

    pub fn config(&self) -> &RingConfig {
        &self.config
    }

    /// Maximum operations in flight
    pub fn capacity(&self) -> usize {
        self.config.entries
    }

    /// Slots not taken by prepared or in-flight operations
    pub fn available(&self) -> usize {
        self.capacity() - self.prepared - self.in_flight
    }

    /// Operations prepared since the last submit
    pub fn prepared(&self) -> usize {
        self.prepared
    }

    /// Operations submitted whose completions have not been returned
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(IovError::closed(format!("ring on {}", self.mount_point.display())));
        }
        Ok(())
    }

    /// Queue one operation; returns the sequence number its completion carries
    pub fn prepare<'a>(
        &mut self,
        target: impl Into<IoTarget<'a>>,
        is_read: bool,
        fd: RawFd,
        offset: u64,
    ) -> Result<u64> {
        self.ensure_open()?;

        if is_read != self.config.for_read {
            return Err(IovError::invalid_parameter(
                "is_read",
                if self.config.for_read {
                    "write prepared on a read ring"
                } else {
                    "read prepared on a write ring"
                },
            ));
        }

        if self.available() == 0 {
            return Err(IovError::ring_full(self.capacity()));
        }

        let seq = self.next_seq;
        self.native.prepare(NativeOp {
            target: target.into().into_slice()?,
            is_read,
            fd,
            offset,
            seq,
        })?;

        self.next_seq += 1;
        self.prepared += 1;
        Ok(seq)
    }

    /// Hand all prepared operations to the engine
    pub fn submit(&mut self) -> Result<Submission<'_>> {
        self.ensure_open()?;

        let submitted = self.native.submit()?;
        self.in_flight += self.prepared;
        self.prepared = 0;
        log::trace!("ring submitted {} ops, {} in flight", submitted, self.in_flight);

        Ok(Submission {
            ring: self,
            submitted,
        })
    }

    /// Block until `min_results` completions are ready or the timeout elapses.
    ///
    /// Completions come back in submission order. `timeout` falls back to the
    /// ring's configured timeout.
    pub fn wait(&mut self, min_results: usize, timeout: Option<Duration>) -> Result<Vec<Completion>> {
        self.ensure_open()?;

        if min_results > self.in_flight {
            return Err(IovError::invalid_parameter(
                "min_results",
                format!(
                    "waiting for {} completions with only {} in flight",
                    min_results, self.in_flight
                ),
            ));
        }

        let timeout = timeout.or(self.config.timeout);
        let mut done = self.native.wait(min_results, timeout)?;
        done.sort_by_key(|c| c.seq);

        self.in_flight = self.in_flight.saturating_sub(done.len());
        Ok(done)
    }

    /// Mark the ring closed. Engine resources go away when the ring is dropped.
    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            log::debug!("ring on {} closed", self.mount_point.display());
        }
    }
}

impl Drop for IoRing {
    fn drop(&mut self) {
        self.close();
    }
}

/// Result of [`IoRing::submit`], used to wait for what was just submitted
#[derive(Debug)]
pub struct Submission<'r> {
    ring: &'r mut IoRing,
    submitted: usize,
}

impl Submission<'_> {
    /// Operations handed to the engine by this submit
    pub fn submitted(&self) -> usize {
        self.submitted
    }

    /// Wait on the ring, see [`IoRing::wait`]
    pub fn wait(self, min_results: usize, timeout: Option<Duration>) -> Result<Vec<Completion>> {
        self.ring.wait(min_results, timeout)
    }
}
