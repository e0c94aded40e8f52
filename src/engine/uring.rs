//! io_uring backed engine.
//!
//! Vectors are plain memory windows; every prepared operation becomes one
//! read or write SQE tagged with its sequence number. The ring keeps each
//! in-flight operation (and therefore its memory) alive until its CQE is
//! reaped. Priority, NUMA and depth settings have no io_uring counterpart
//! and are accepted as-is.

use std::{collections::HashMap, io, path::Path, sync::Arc, time::Duration};

use io_uring::{opcode, types, IoUring};

use crate::{
    error::{IovError, Result},
    ring::config::RingConfig,
};

use super::{BasicVector, Completion, IoEngine, NativeOp, NativeRing, NativeVector, VectorParams};

/// Engine submitting through a private io_uring instance per ring
#[derive(Debug, Default, Clone, Copy)]
pub struct UringEngine;

impl UringEngine {
    pub fn new() -> Self {
        Self
    }

    /// Check whether the kernel lets this process set up a ring
    pub fn is_supported() -> bool {
        IoUring::new(1).is_ok()
    }
}

impl IoEngine for UringEngine {
    fn name(&self) -> &'static str {
        "io_uring"
    }

    fn create_vector(&self, params: VectorParams) -> Result<Arc<dyn NativeVector>> {
        if params.view.len() > u32::MAX as usize && params.block_size == 0 {
            return Err(IovError::invalid_parameter(
                "size",
                "io_uring transfers are limited to u32::MAX bytes per operation",
            ));
        }
        let vector = BasicVector::new(params);
        if vector.numa() >= 0 {
            log::debug!("io_uring vector {}: numa node {} is not bound", vector.id(), vector.numa());
        }
        Ok(Arc::new(vector))
    }

    fn create_ring(&self, mount_point: &Path, config: &RingConfig) -> Result<Box<dyn NativeRing>> {
        config.validate()?;

        let entries = u32::try_from(config.entries)
            .map_err(|_| IovError::invalid_parameter("entries", "Too many ring entries"))?;
        let ring = IoUring::new(entries)
            .map_err(|e| IovError::engine(format!("io_uring setup failed: {}", e)))?;

        if config.reports_holes() {
            log::debug!("io_uring engine cannot report holes; reads are zero-filled");
        }
        log::trace!(
            "io_uring ring on {}: {} entries, priority {} and numa {} not applied",
            mount_point.display(),
            entries,
            config.priority.unwrap_or_default().as_raw(),
            config.numa
        );

        Ok(Box::new(UringRing {
            ring,
            in_flight: HashMap::with_capacity(config.entries),
            prepared: 0,
        }))
    }

    fn ring_size_for_entries(&self, entries: usize) -> usize {
        // Completion queue is twice the submission queue by default
        entries
            * (std::mem::size_of::<io_uring::squeue::Entry>()
                + 2 * std::mem::size_of::<io_uring::cqueue::Entry>())
    }
}

struct UringRing {
    ring: IoUring,
    /// Operations pushed to the SQ and not yet reaped, by sequence number
    in_flight: HashMap<u64, NativeOp>,
    /// SQEs pushed since the last submit
    prepared: usize,
}

impl std::fmt::Debug for UringRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UringRing")
            .field("in_flight", &self.in_flight.len())
            .field("prepared", &self.prepared)
            .finish()
    }
}

impl UringRing {
    fn reap(&mut self, out: &mut Vec<Completion>) {
        for cqe in self.ring.completion() {
            let seq = cqe.user_data();
            self.in_flight.remove(&seq);
            out.push(Completion {
                seq,
                result: cqe.result() as i64,
            });
        }
    }
}

impl NativeRing for UringRing {
    fn prepare(&mut self, op: NativeOp) -> Result<()> {
        let view = op.target.view()?;
        let len = u32::try_from(view.len())
            .map_err(|_| IovError::invalid_parameter("len", "Transfer exceeds u32::MAX bytes"))?;
        let fd = types::Fd(op.fd);

        let entry = if op.is_read {
            opcode::Read::new(fd, view.as_mut_ptr(), len)
                .offset(op.offset)
                .build()
        } else {
            opcode::Write::new(fd, view.as_ptr(), len)
                .offset(op.offset)
                .build()
        }
        .user_data(op.seq);

        // The memory stays mapped while `op` sits in `in_flight`
        unsafe {
            self.ring
                .submission()
                .push(&entry)
                .map_err(|_| IovError::ring_full(self.in_flight.len()))?;
        }

        self.in_flight.insert(op.seq, op);
        self.prepared += 1;
        Ok(())
    }

    fn submit(&mut self) -> Result<usize> {
        self.ring
            .submit()
            .map_err(|e| IovError::engine(format!("io_uring submit failed: {}", e)))?;
        Ok(std::mem::take(&mut self.prepared))
    }

    fn wait(&mut self, min_results: usize, timeout: Option<Duration>) -> Result<Vec<Completion>> {
        let mut done = Vec::with_capacity(min_results.max(1));
        self.reap(&mut done);

        while done.len() < min_results {
            let want = min_results - done.len();
            let res = match timeout {
                Some(timeout) => {
                    let ts = types::Timespec::from(timeout);
                    let args = types::SubmitArgs::new().timespec(&ts);
                    self.ring.submitter().submit_with_args(want, &args)
                }
                None => self.ring.submit_and_wait(want),
            };

            match res {
                Ok(_) => {}
                Err(e) if e.raw_os_error() == Some(libc::EINTR) => continue,
                Err(e) if e.raw_os_error() == Some(libc::ETIME) => {
                    self.reap(&mut done);
                    break;
                }
                Err(e) => return Err(IovError::from_io(e, "io_uring wait failed")),
            }
            self.reap(&mut done);
        }

        Ok(done)
    }
}

impl Drop for UringRing {
    fn drop(&mut self) {
        // Memory referenced by in-flight SQEs must outlive the kernel's use of it
        while !self.in_flight.is_empty() {
            match self.ring.submit_and_wait(1) {
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::warn!("abandoning {} in-flight io_uring ops: {}", self.in_flight.len(), e);
                    std::mem::forget(std::mem::take(&mut self.in_flight));
                    return;
                }
            }
            let mut sink = Vec::new();
            self.reap(&mut sink);
        }
    }
}
