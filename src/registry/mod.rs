//! Process-wide tracking of live namespace entries.
//!
//! Every I/O vector publishes a namespace entry for as long as it is open.
//! The [`Registry`] remembers those entries so that anything still published
//! when the process exits is swept away, even if its owner was leaked.

pub mod namespace;

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError},
};

pub use namespace::{Namespace, SymlinkNamespace};

/// Set of live namespace entries guarded by a single lock
#[derive(Debug)]
pub struct Registry {
    /// Service used to remove entries during the sweep
    namespace: Arc<dyn Namespace>,
    /// Entries currently published
    entries: Mutex<HashSet<PathBuf>>,
}

impl Registry {
    /// Create an empty registry removing entries through `namespace`
    pub fn new(namespace: Arc<dyn Namespace>) -> Self {
        Self {
            namespace,
            entries: Mutex::new(HashSet::new()),
        }
    }

    /// The process-wide registry, created on first use.
    ///
    /// Creating it installs an exit hook that runs [`Registry::shutdown_sweep`].
    pub fn global() -> Arc<Registry> {
        Arc::clone(GLOBAL_REGISTRY.get_or_init(|| {
            install_exit_hook();
            Arc::new(Registry::new(Arc::new(SymlinkNamespace)))
        }))
    }

    /// The namespace service entries are removed through
    pub fn namespace(&self) -> &Arc<dyn Namespace> {
        &self.namespace
    }

    // A panic while holding the lock must not disable cleanup
    fn lock(&self) -> MutexGuard<'_, HashSet<PathBuf>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Track `entry`. Registering a tracked entry again is a no-op.
    pub fn register(&self, entry: impl Into<PathBuf>) {
        let entry = entry.into();
        log::trace!("registry: tracking {}", entry.display());
        self.lock().insert(entry);
    }

    /// Stop tracking `entry`; returns whether it was tracked
    pub fn unregister(&self, entry: &Path) -> bool {
        let removed = self.lock().remove(entry);
        if removed {
            log::trace!("registry: released {}", entry.display());
        }
        removed
    }

    /// Check whether `entry` is tracked
    pub fn contains(&self, entry: &Path) -> bool {
        self.lock().contains(entry)
    }

    /// Number of tracked entries
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Check if nothing is tracked
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Snapshot of the tracked entries
    pub fn entries(&self) -> Vec<PathBuf> {
        self.lock().iter().cloned().collect()
    }

    /// Remove every tracked entry from the namespace and clear the registry.
    ///
    /// Removal is best effort: the mount may already be gone when this runs.
    /// Returns the number of entries that were still tracked.
    pub fn shutdown_sweep(&self) -> usize {
        let mut entries = self.lock();
        let count = entries.len();

        for entry in entries.drain() {
            if let Err(e) = self.namespace.remove_entry(&entry) {
                log::debug!("registry sweep: could not remove {}: {}", entry.display(), e);
            }
        }

        if count > 0 {
            log::debug!("registry sweep removed {} orphaned entries", count);
        }
        count
    }
}

/// Global registry instance
static GLOBAL_REGISTRY: OnceLock<Arc<Registry>> = OnceLock::new();

extern "C" fn sweep_global_registry() {
    // Unwinding out of an exit handler aborts the process
    let _ = std::panic::catch_unwind(|| {
        if let Some(registry) = GLOBAL_REGISTRY.get() {
            registry.shutdown_sweep();
        }
    });
}

fn install_exit_hook() {
    if unsafe { libc::atexit(sweep_global_registry) } != 0 {
        log::warn!("failed to install registry exit hook; leaked entries will persist");
    }
}
