//! # iovring - Zero-copy batched I/O for a distributed filesystem client
//!
//! iovring lets a process register shared memory with the filesystem as an
//! I/O vector, queue reads and writes against it through a bounded ring, and
//! stream large files through that ring block by block.
//!
//! ## Features
//!
//! - **Shared buffers**: named, page-aligned memory the storage backend maps directly
//! - **I/O vectors**: buffers published through a namespace entry on the mount
//! - **I/O rings**: bounded submission/completion queues with depth and priority
//! - **Leak-proof registration**: a process-wide registry sweeps entries at exit
//! - **Streaming reads**: block-sized rounds with EOF detection, seek and stop
//! - **Pluggable engines**: io_uring on Linux, synchronous positional I/O everywhere
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │              read_file / IoContext              │
//! ├─────────────────────────────────────────────────┤
//! │  IoVec (namespace entry)  │  IoRing (slots)     │
//! │  SharedBuffer             │  Submission/wait    │
//! │  Registry (exit sweep)    │                     │
//! └─────────────────────────────────────────────────┘
//!           │                         │
//!           ▼                         ▼
//! ┌─────────────────────────────────────────────────┐
//! │   IoEngine: NativeVector / NativeRing handles   │
//! │   (UringEngine, SyncEngine, or a host engine)   │
//! └─────────────────────────────────────────────────┘
//! ```

pub mod context;
pub mod engine;
pub mod error;
pub mod iovec;
pub mod reader;
pub mod registry;
pub mod ring;
pub mod services;
pub mod shm;

// Main API re-exports
pub use context::IoContext;
pub use engine::{Completion, IoEngine, IovSlice, NativeRing, NativeVector, SyncEngine};
#[cfg(all(target_os = "linux", feature = "uring"))]
pub use engine::UringEngine;
pub use error::{IovError, Result};
pub use iovec::{namespace_path, IoVec, VectorConfig, IOVEC_NAMESPACE_DIR};
pub use reader::{read_file, read_file_with, ReadControl, ReadOptions, DEFAULT_READ_BLOCK_SIZE};
pub use registry::{Namespace, Registry, SymlinkNamespace};
pub use ring::{DepthPolicy, IoRing, IoTarget, Priority, RingConfig, Submission, RING_FLAG_READ_HOLE_ERROR};
pub use services::{FdRegistrar, MountResolver, NoopFdRegistrar, ProcMountResolver};
pub use shm::{BufferView, SharedBuffer, ShmConfig};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
