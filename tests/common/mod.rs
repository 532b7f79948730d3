/*!
 * Integration Test Fixtures
 *
 * Stands in for the external registry: allocates handles and slots over a
 * real shared-memory segment named after a throwaway installation
 * directory, so the engine under test exercises its production bootstrap,
 * mapping and cache paths unchanged.
 */

// Each integration test binary compiles its own copy of this module and
// uses a different subset of it.
#![allow(dead_code)]

use nix::fcntl::OFlag;
use nix::sys::stat::Mode;
use parking_lot::Mutex;
use shmsync::registry::{ObjectReply, RegistryClient, ResolvedHandle};
use shmsync::shm::segment_name;
use shmsync::{
    BackendChoice, EngineConfig, Handle, ObjectKind, RawHandle, SlotIndex, SyncEngine, SyncError,
    SyncResult,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const SEGMENT_PAGES: i64 = 16;

#[derive(Default)]
struct RegistryState {
    next_handle: RawHandle,
    next_slot: SlotIndex,
    objects: HashMap<RawHandle, (SlotIndex, ObjectKind)>,
    names: HashMap<String, RawHandle>,
}

/// In-process registry backing one test segment.
pub struct TestRegistry {
    segment: String,
    state: Mutex<RegistryState>,
    msgwait: Mutex<Vec<bool>>,
}

impl TestRegistry {
    /// Create the segment for `install_dir` and hand out slots from it.
    pub fn create(install_dir: &Path) -> Arc<Self> {
        let segment = segment_name(install_dir).expect("segment name");
        let fd = nix::sys::mman::shm_open(
            segment.as_str(),
            OFlag::O_RDWR | OFlag::O_CREAT | OFlag::O_EXCL,
            Mode::from_bits_truncate(0o600),
        )
        .expect("create test segment");
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as i64;
        nix::unistd::ftruncate(&fd, SEGMENT_PAGES * page_size).expect("size test segment");

        Arc::new(Self {
            segment,
            state: Mutex::new(RegistryState {
                next_handle: 4,
                ..Default::default()
            }),
            msgwait: Mutex::new(Vec::new()),
        })
    }

    fn allocate(state: &mut RegistryState, kind: ObjectKind) -> (RawHandle, SlotIndex) {
        let handle = state.next_handle;
        let slot = state.next_slot;
        state.next_handle += 4;
        state.next_slot += 1;
        state.objects.insert(handle, (slot, kind));
        (handle, slot)
    }

    /// Register a message-queue object the way the real registry would;
    /// queues are never created through the engine surface.
    pub fn install_queue(&self) -> Handle {
        let mut state = self.state.lock();
        let (handle, _slot) = Self::allocate(&mut state, ObjectKind::Queue);
        Handle(handle)
    }

    /// Every message-wait notification received, in order.
    pub fn msgwait_log(&self) -> Vec<bool> {
        self.msgwait.lock().clone()
    }
}

impl RegistryClient for TestRegistry {
    fn create_object(
        &self,
        kind: ObjectKind,
        _access: u32,
        name: Option<&str>,
        _init_a: i32,
        _init_b: i32,
    ) -> SyncResult<ObjectReply> {
        let mut state = self.state.lock();

        if let Some(name) = name {
            if let Some(&existing) = state.names.get(name) {
                let (slot, kind) = state.objects[&existing];
                return Ok(ObjectReply {
                    handle: Handle(existing),
                    slot,
                    kind,
                    already_existed: true,
                });
            }
        }

        let (handle, slot) = Self::allocate(&mut state, kind);
        if let Some(name) = name {
            state.names.insert(name.to_owned(), handle);
        }
        Ok(ObjectReply {
            handle: Handle(handle),
            slot,
            kind,
            already_existed: false,
        })
    }

    fn open_object(&self, _kind: ObjectKind, _access: u32, name: &str) -> SyncResult<ObjectReply> {
        let state = self.state.lock();
        let &handle = state.names.get(name).ok_or(SyncError::InvalidHandle)?;
        let (slot, kind) = state.objects[&handle];
        Ok(ObjectReply {
            handle: Handle(handle),
            slot,
            kind,
            already_existed: true,
        })
    }

    fn resolve_handle(&self, handle: Handle) -> SyncResult<ResolvedHandle> {
        let state = self.state.lock();
        let &(slot, kind) = state
            .objects
            .get(&handle.raw())
            .ok_or(SyncError::InvalidHandle)?;
        Ok(ResolvedHandle { slot, kind })
    }

    fn set_message_wait(&self, in_wait: bool) {
        self.msgwait.lock().push(in_wait);
    }
}

impl Drop for TestRegistry {
    fn drop(&mut self) {
        let _ = nix::sys::mman::shm_unlink(self.segment.as_str());
    }
}

/// One engine wired to its own registry and segment.
pub struct Fixture {
    pub registry: Arc<TestRegistry>,
    pub engine: Arc<SyncEngine>,
    dir: TempDir,
}

impl Fixture {
    /// Installation directory the segment name was derived from, for
    /// bootstrapping a second engine over the same segment.
    pub fn install_dir(&self) -> std::path::PathBuf {
        self.dir.path().to_path_buf()
    }
}

pub fn fixture() -> Fixture {
    fixture_with(BackendChoice::Auto)
}

pub fn fixture_with(backend: BackendChoice) -> Fixture {
    let _ = env_logger::builder().is_test(true).try_init();

    let dir = tempfile::tempdir().expect("tempdir");
    let registry = TestRegistry::create(dir.path());
    let engine = SyncEngine::bootstrap(
        EngineConfig {
            install_dir: dir.path().into(),
            enabled: Some(true),
            backend,
        },
        registry.clone(),
    )
    .expect("bootstrap");

    Fixture {
        registry,
        engine: Arc::new(engine),
        dir,
    }
}
