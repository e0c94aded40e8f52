//! Shared fixtures: a temp mount with a vector namespace, a private registry,
//! and an engine that replays scripted completions

#![allow(dead_code)]

use std::{
    collections::HashMap,
    fs,
    os::fd::RawFd,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use tempfile::TempDir;
use iovring::{
    engine::{BasicVector, NativeOp, VectorParams},
    Completion, FdRegistrar, IoContext, IoEngine, IovError, MountResolver, NativeRing,
    NativeVector, Registry, Result, RingConfig, ShmConfig, SymlinkNamespace, IOVEC_NAMESPACE_DIR,
};

/// Temp directory holding a fake mount and a shared memory directory
pub struct Fixture {
    pub dir: TempDir,
    pub mount: PathBuf,
    pub shm: PathBuf,
    pub registry: Arc<Registry>,
    pub fds: Arc<RecordingFds>,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let mount = dir.path().join("mount");
        let shm = dir.path().join("shm");
        fs::create_dir_all(mount.join(IOVEC_NAMESPACE_DIR)).unwrap();
        fs::create_dir_all(&shm).unwrap();

        Self {
            dir,
            mount,
            shm,
            registry: Arc::new(Registry::new(Arc::new(SymlinkNamespace))),
            fds: Arc::new(RecordingFds::default()),
        }
    }

    pub fn ctx(&self, engine: Arc<dyn IoEngine>) -> IoContext {
        IoContext::new(engine)
            .with_registry(Arc::clone(&self.registry))
            .with_shm_config(ShmConfig::new(&self.shm))
            .with_fd_registrar(self.fds.clone())
            .with_mount_resolver(Arc::new(FixedMount(self.mount.clone())))
    }

    /// Write `data` to a file under the mount
    pub fn file(&self, name: &str, data: &[u8]) -> PathBuf {
        let path = self.mount.join(name);
        fs::write(&path, data).unwrap();
        path
    }

    pub fn namespace_entries(&self) -> usize {
        fs::read_dir(self.mount.join(IOVEC_NAMESPACE_DIR)).unwrap().count()
    }

    pub fn shm_entries(&self) -> usize {
        fs::read_dir(&self.shm).unwrap().count()
    }

    /// Nothing published, tracked or allocated
    pub fn assert_clean(&self) {
        assert_eq!(self.namespace_entries(), 0, "namespace entries left behind");
        assert!(self.registry.is_empty(), "registry entries left behind");
        assert_eq!(self.shm_entries(), 0, "shared buffers left behind");
    }
}

/// Resolver that maps every path to one mount
#[derive(Debug)]
pub struct FixedMount(pub PathBuf);

impl MountResolver for FixedMount {
    fn resolve(&self, _path: &Path) -> Result<PathBuf> {
        Ok(self.0.clone())
    }
}

/// Registrar that records calls and can refuse registration
#[derive(Debug, Default)]
pub struct RecordingFds {
    pub calls: Mutex<Vec<String>>,
    pub refuse: bool,
    /// Namespace and shm directories counted on every deregister
    pub watch: Option<(PathBuf, PathBuf)>,
    /// (namespace entries, shared buffers) alive at each deregister
    pub alive_at_deregister: Mutex<Vec<(usize, usize)>>,
}

impl RecordingFds {
    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Default::default()
        }
    }

    /// Registrar that snapshots the fixture's resources when deregistering
    pub fn watching(fx: &Fixture) -> Self {
        Self {
            watch: Some((fx.mount.join(IOVEC_NAMESPACE_DIR), fx.shm.clone())),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn alive_at_deregister(&self) -> Vec<(usize, usize)> {
        self.alive_at_deregister.lock().unwrap().clone()
    }
}

impl FdRegistrar for RecordingFds {
    fn register(&self, fd: RawFd) -> Result<()> {
        if self.refuse {
            return Err(IovError::from_io(
                std::io::Error::from_raw_os_error(libc::EPERM),
                "register_fd",
            ));
        }
        self.calls.lock().unwrap().push(format!("register {}", fd));
        Ok(())
    }

    fn deregister(&self, fd: RawFd) -> Result<()> {
        if let Some((namespace, shm)) = &self.watch {
            let count = |dir: &PathBuf| fs::read_dir(dir).unwrap().count();
            self.alive_at_deregister
                .lock()
                .unwrap()
                .push((count(namespace), count(shm)));
        }
        self.calls.lock().unwrap().push(format!("deregister {}", fd));
        Ok(())
    }
}

/// What the scripted engine serves and what it observed
#[derive(Debug, Default)]
pub struct Script {
    /// Contents served to reads
    pub data: Vec<u8>,
    /// Forced results by round index
    pub inject: HashMap<usize, i64>,
    /// Fail vector creation
    pub fail_vector: bool,
    /// Fail ring creation
    pub fail_ring: bool,
    /// Hand completions back in reverse order
    pub reverse: bool,
    /// Rounds executed
    pub rounds: usize,
    /// Offset of every executed operation
    pub offsets: Vec<u64>,
    /// Timeout passed to every wait
    pub timeouts: Vec<Option<Duration>>,
}

/// Engine serving reads from an in-memory file with injectable results
#[derive(Debug, Clone, Default)]
pub struct ScriptedEngine {
    pub script: Arc<Mutex<Script>>,
}

impl ScriptedEngine {
    pub fn serving(data: &[u8]) -> Self {
        let engine = Self::default();
        engine.script.lock().unwrap().data = data.to_vec();
        engine
    }

    pub fn inject(self, round: usize, result: i64) -> Self {
        self.script.lock().unwrap().inject.insert(round, result);
        self
    }

    pub fn rounds(&self) -> usize {
        self.script.lock().unwrap().rounds
    }

    pub fn offsets(&self) -> Vec<u64> {
        self.script.lock().unwrap().offsets.clone()
    }
}

impl IoEngine for ScriptedEngine {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn create_vector(&self, params: VectorParams) -> Result<Arc<dyn NativeVector>> {
        if self.script.lock().unwrap().fail_vector {
            return Err(IovError::engine("vector registration refused"));
        }
        Ok(Arc::new(BasicVector::new(params)))
    }

    fn create_ring(&self, _mount_point: &Path, _config: &RingConfig) -> Result<Box<dyn NativeRing>> {
        if self.script.lock().unwrap().fail_ring {
            return Err(IovError::engine("ring setup refused"));
        }
        Ok(Box::new(ScriptedRing {
            script: Arc::clone(&self.script),
            prepared: Vec::new(),
            submitted: Vec::new(),
        }))
    }

    fn ring_size_for_entries(&self, entries: usize) -> usize {
        entries * 64
    }
}

#[derive(Debug)]
struct ScriptedRing {
    script: Arc<Mutex<Script>>,
    prepared: Vec<NativeOp>,
    submitted: Vec<NativeOp>,
}

impl NativeRing for ScriptedRing {
    fn prepare(&mut self, op: NativeOp) -> Result<()> {
        self.prepared.push(op);
        Ok(())
    }

    fn submit(&mut self) -> Result<usize> {
        let count = self.prepared.len();
        self.submitted.append(&mut self.prepared);
        Ok(count)
    }

    fn wait(&mut self, _min_results: usize, timeout: Option<Duration>) -> Result<Vec<Completion>> {
        let mut script = self.script.lock().unwrap();
        script.timeouts.push(timeout);

        let mut done = Vec::new();
        for op in self.submitted.drain(..) {
            let round = script.rounds;
            script.rounds += 1;
            script.offsets.push(op.offset);

            let result = match script.inject.get(&round) {
                Some(&forced) => forced,
                None => {
                    let view = op.target.view()?;
                    let start = (op.offset as usize).min(script.data.len());
                    let end = (start + view.len()).min(script.data.len());
                    let src = &script.data[start..end];
                    unsafe { view.as_mut_slice()[..src.len()].copy_from_slice(src) };
                    src.len() as i64
                }
            };
            done.push(Completion { seq: op.seq, result });
        }

        if script.reverse {
            done.reverse();
        }
        Ok(done)
    }
}

/// Deterministic test payload
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}
