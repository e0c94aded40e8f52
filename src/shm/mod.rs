//! Named shared-memory buffers that the storage backend can address directly

pub mod buffer;
pub mod config;

pub use buffer::{BufferView, SharedBuffer};
pub use config::ShmConfig;
