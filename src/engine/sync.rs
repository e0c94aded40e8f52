//! Synchronous engine executing operations with positional read/write.
//!
//! Each submit or wait performs one scan: the depth policy decides how many
//! queued operations run, and they run to completion on the calling thread.
//! Reads are retried until the full range is filled or end of file is hit,
//! so a short result always means end of file.

use std::{collections::VecDeque, os::fd::RawFd, path::Path, sync::Arc, time::Duration};

use crate::{
    error::{IovError, Result},
    ring::config::{DepthPolicy, RingConfig},
};

use super::{BasicVector, Completion, IoEngine, NativeOp, NativeRing, NativeVector, VectorParams};

/// Engine running every operation on the caller's thread
#[derive(Debug, Default, Clone, Copy)]
pub struct SyncEngine;

impl SyncEngine {
    pub fn new() -> Self {
        Self
    }
}

impl IoEngine for SyncEngine {
    fn name(&self) -> &'static str {
        "sync"
    }

    fn create_vector(&self, params: VectorParams) -> Result<Arc<dyn NativeVector>> {
        let vector = BasicVector::new(params);
        log::trace!("sync vector {} (numa hint {})", vector.id(), vector.numa());
        Ok(Arc::new(vector))
    }

    fn create_ring(&self, mount_point: &Path, config: &RingConfig) -> Result<Box<dyn NativeRing>> {
        config.validate()?;
        log::trace!(
            "sync ring on {}: {} entries, depth {:?}, priority {}",
            mount_point.display(),
            config.entries,
            config.depth_policy(),
            config.priority.unwrap_or_default().as_raw()
        );
        Ok(Box::new(SyncRing::new(config)))
    }

    fn ring_size_for_entries(&self, entries: usize) -> usize {
        entries * (std::mem::size_of::<NativeOp>() + std::mem::size_of::<Completion>())
    }
}

#[derive(Debug)]
struct SyncRing {
    depth: DepthPolicy,
    report_holes: bool,
    /// Prepared, not yet submitted
    prepared: Vec<NativeOp>,
    /// Submitted, waiting for a scan
    queued: VecDeque<NativeOp>,
    /// Finished, not yet returned
    done: Vec<Completion>,
}

impl SyncRing {
    fn new(config: &RingConfig) -> Self {
        Self {
            depth: config.depth_policy(),
            report_holes: config.reports_holes(),
            prepared: Vec::with_capacity(config.entries),
            queued: VecDeque::with_capacity(config.entries),
            done: Vec::with_capacity(config.entries),
        }
    }

    /// Run one scan; returns how many operations completed
    fn scan(&mut self) -> usize {
        let batch = self.depth.batch(self.queued.len());
        for op in self.queued.drain(..batch) {
            let result = execute(&op, self.report_holes);
            log::trace!("sync op {} at {} -> {}", op.seq, op.offset, result);
            self.done.push(Completion { seq: op.seq, result });
        }
        batch
    }
}

impl NativeRing for SyncRing {
    fn prepare(&mut self, op: NativeOp) -> Result<()> {
        self.prepared.push(op);
        Ok(())
    }

    fn submit(&mut self) -> Result<usize> {
        let count = self.prepared.len();
        self.queued.extend(self.prepared.drain(..));
        self.scan();
        Ok(count)
    }

    fn wait(&mut self, min_results: usize, timeout: Option<Duration>) -> Result<Vec<Completion>> {
        while self.done.len() < min_results {
            if self.scan() == 0 {
                // Nothing else will ever run on this thread
                if timeout.is_some() {
                    break;
                }
                return Err(IovError::stalled(self.queued.len(), min_results));
            }
        }
        Ok(std::mem::take(&mut self.done))
    }
}

fn errno() -> i64 {
    -(std::io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO) as i64)
}

fn execute(op: &NativeOp, report_holes: bool) -> i64 {
    let view = match op.target.view() {
        Ok(view) => view,
        Err(_) => return -(libc::EFAULT as i64),
    };

    if op.is_read && report_holes {
        if let Some(code) = hole_in_range(op.fd, op.offset, view.len()) {
            return -(code as i64);
        }
    }

    let mut done = 0usize;
    while done < view.len() {
        let ptr = unsafe { view.as_mut_ptr().add(done) };
        let remaining = view.len() - done;
        let offset = (op.offset + done as u64) as libc::off_t;

        let n = unsafe {
            if op.is_read {
                libc::pread(op.fd, ptr as *mut libc::c_void, remaining, offset)
            } else {
                libc::pwrite(op.fd, ptr as *const libc::c_void, remaining, offset)
            }
        };

        if n < 0 {
            let code = errno();
            if code == -(libc::EINTR as i64) {
                continue;
            }
            // Report the error only if nothing was transferred
            return if done == 0 { code } else { done as i64 };
        }
        if n == 0 {
            break;
        }
        done += n as usize;
    }
    done as i64
}

/// Returns `ENODATA` when `[offset, offset + len)` overlaps a hole before EOF
fn hole_in_range(fd: RawFd, offset: u64, len: usize) -> Option<i32> {
    let mut stat: libc::stat = unsafe { std::mem::zeroed() };
    if unsafe { libc::fstat(fd, &mut stat) } != 0 {
        return None;
    }

    let size = stat.st_size as u64;
    let end = (offset + len as u64).min(size);
    if offset >= end {
        return None;
    }

    // SEEK_HOLE moves the file position, which the caller may rely on
    let saved = unsafe { libc::lseek(fd, 0, libc::SEEK_CUR) };
    let hole = unsafe { libc::lseek(fd, offset as libc::off_t, libc::SEEK_HOLE) };
    if saved >= 0 {
        unsafe { libc::lseek(fd, saved, libc::SEEK_SET) };
    }
    if hole < 0 {
        // Filesystem cannot tell; treat as fully allocated
        return None;
    }

    ((hole as u64) < end).then_some(libc::ENODATA)
}
