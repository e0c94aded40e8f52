//! Streaming reads through a single-slot ring.
//!
//! One buffer, one vector and a ring with one entry are allocated per call.
//! Each round reads a full block at the running offset. A zero result ends
//! the stream, and so does a short result: the engines deliver full blocks
//! everywhere except at end of file.

use std::{
    fs::File,
    os::fd::{AsRawFd, RawFd},
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{
    context::IoContext,
    error::{IovError, Result},
    iovec::{IoVec, VectorConfig},
    ring::{IoRing, Priority, RingConfig},
    services::FdRegistrar,
    shm::SharedBuffer,
};

/// Default transfer size per round (1 GiB)
pub const DEFAULT_READ_BLOCK_SIZE: usize = 1 << 30;

/// What the consumer wants after receiving a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadControl {
    /// Keep reading from the next block
    Continue,
    /// Read the next round at this offset
    SeekTo(u64),
    /// Stop reading; the call succeeds
    Stop,
}

impl Default for ReadControl {
    fn default() -> Self {
        Self::Continue
    }
}

/// Options for [`read_file`] and [`read_file_with`]
#[derive(Debug, Clone, PartialEq)]
pub struct ReadOptions {
    /// Mount the file lives on, discovered from the path when unset
    pub mount_point: Option<PathBuf>,
    /// Bytes requested per round
    pub block_size: usize,
    /// Offset of the first round
    pub start_offset: u64,
    /// Ring priority
    pub priority: Option<Priority>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            mount_point: None,
            block_size: DEFAULT_READ_BLOCK_SIZE,
            start_offset: 0,
            priority: None,
        }
    }
}

impl ReadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the mount point
    pub fn with_mount_point(mut self, mount_point: impl Into<PathBuf>) -> Self {
        self.mount_point = Some(mount_point.into());
        self
    }

    /// Set the block size
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Set the starting offset
    pub fn with_start_offset(mut self, offset: u64) -> Self {
        self.start_offset = offset;
        self
    }

    /// Set the priority
    pub fn with_priority(mut self, priority: Option<Priority>) -> Self {
        self.priority = priority;
        self
    }

    /// Validate the options
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(IovError::invalid_parameter(
                "block_size",
                "Block size must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// Read `path` from the start offset to end of file
pub fn read_file(ctx: &IoContext, path: impl AsRef<Path>, options: &ReadOptions) -> Result<Vec<u8>> {
    let mut chunks: Vec<Vec<u8>> = Vec::new();

    drive(ctx, path.as_ref(), options, &mut |data, _offset| {
        chunks.push(data.to_vec());
        ReadControl::Continue
    })?;

    if chunks.len() == 1 {
        return Ok(chunks.pop().unwrap_or_default());
    }
    Ok(chunks.concat())
}

/// Stream `path` to `callback`, which receives each chunk and its file offset
pub fn read_file_with<F>(
    ctx: &IoContext,
    path: impl AsRef<Path>,
    options: &ReadOptions,
    mut callback: F,
) -> Result<()>
where
    F: FnMut(&[u8], u64) -> ReadControl,
{
    drive(ctx, path.as_ref(), options, &mut callback)
}

/// Descriptor registered with the filesystem driver; deregistered then closed on drop
struct RegisteredFd<'a> {
    file: File,
    registrar: &'a dyn FdRegistrar,
}

impl<'a> RegisteredFd<'a> {
    fn open(path: &Path, registrar: &'a dyn FdRegistrar) -> Result<Self> {
        let file = File::open(path)
            .map_err(|e| IovError::from_io(e, &format!("Failed to open {}", path.display())))?;
        registrar.register(file.as_raw_fd())?;
        Ok(Self { file, registrar })
    }

    fn raw(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

impl Drop for RegisteredFd<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.registrar.deregister(self.file.as_raw_fd()) {
            log::warn!("failed to deregister fd {}: {}", self.file.as_raw_fd(), e);
        }
    }
}

/// Resources of one call, released in field order: fd, ring, vector, buffer.
///
/// Slots fill as setup progresses, so a failed setup releases only what
/// exists and still deregisters the descriptor first.
struct ReadSession<'a> {
    fd: RegisteredFd<'a>,
    ring: Option<IoRing>,
    iov: Option<IoVec>,
    /// Holds the buffer until a vector takes it over
    buffer: Option<SharedBuffer>,
}

fn drive(
    ctx: &IoContext,
    path: &Path,
    options: &ReadOptions,
    sink: &mut dyn FnMut(&[u8], u64) -> ReadControl,
) -> Result<()> {
    options.validate()?;

    let mount_point = match &options.mount_point {
        Some(mount_point) => mount_point.clone(),
        None => ctx.mount_resolver().resolve(path)?,
    };

    let mut session = ReadSession {
        fd: RegisteredFd::open(path, ctx.fd_registrar().as_ref())?,
        ring: None,
        iov: None,
        buffer: None,
    };

    let buffer = ctx.allocate_buffer(options.block_size)?;
    let iov = match IoVec::try_create(
        ctx.engine().as_ref(),
        Arc::clone(ctx.registry()),
        buffer,
        mount_point.clone(),
        VectorConfig::default(),
    ) {
        Ok(iov) => session.iov.insert(iov),
        Err((e, buffer)) => {
            session.buffer = Some(buffer);
            return Err(e);
        }
    };
    let ring = session.ring.insert(ctx.create_ioring(
        &mount_point,
        RingConfig::new(1).with_priority(options.priority),
    )?);
    let fd = session.fd.raw();

    let block_size = options.block_size;
    let mut offset = options.start_offset;
    let mut rounds = 0usize;

    log::debug!(
        "reading {} from offset {} in {} byte blocks",
        path.display(),
        offset,
        block_size
    );

    loop {
        ring.prepare(&*iov, true, fd, offset)?;
        let completion = ring
            .submit()?
            .wait(1, None)?
            .into_iter()
            .next()
            .ok_or_else(|| IovError::engine("wait returned without a completion"))?;
        rounds += 1;

        if completion.is_error() {
            return Err(IovError::from_completion(completion.result));
        }

        let n = completion.result as usize;
        log::trace!("round {} at offset {}: {} bytes", rounds, offset, n);
        if n == 0 {
            break;
        }
        if n > block_size {
            return Err(IovError::engine(format!(
                "completion reports {} bytes for a {} byte read",
                n, block_size
            )));
        }

        match sink(&iov[..n], offset) {
            ReadControl::SeekTo(next) => {
                offset = next;
                continue;
            }
            ReadControl::Stop => {
                log::debug!("{}: stopped by consumer after {} rounds", path.display(), rounds);
                return Ok(());
            }
            ReadControl::Continue => {}
        }

        if n < block_size {
            break;
        }
        offset += block_size as u64;
    }

    log::debug!("{}: finished after {} rounds", path.display(), rounds);
    Ok(())
}
