//! Collaborators the driver needs from the host filesystem client

pub mod fd;
pub mod mount;

pub use fd::{FdRegistrar, NoopFdRegistrar};
pub use mount::{find_mount_point, MountResolver, ProcMountResolver};
