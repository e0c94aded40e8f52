//! Bounded submission/completion rings of I/O operations

pub mod config;
pub mod io_ring;

pub use crate::engine::Completion;
pub use config::{DepthPolicy, Priority, RingConfig, RING_FLAG_READ_HOLE_ERROR};
pub use io_ring::{IoRing, IoTarget, Submission};
