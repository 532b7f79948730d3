/*!
 * Synchronization Engine
 *
 * Per-process context tying the pieces together: the shared segment, the
 * object cache, the registry client and the wait backend. One engine is
 * constructed at process start and threaded through every call; nothing
 * here lives in free-floating static state, which keeps the engine
 * testable against throwaway segments and in-process registries.
 *
 * # Operation surface
 *
 * create/open/close for semaphores, events and mutexes; the signal
 * operations in `signal`; the multi-object wait in `wait`. Every
 * operation returns a `SyncResult` drawn from the closed taxonomy in
 * `core::errors`. A disabled engine answers `NotImplemented` everywhere
 * so callers fall back to the registry-mediated path.
 */

mod acquire;
mod signal;
mod wait;

pub use wait::MAX_WAIT_OBJECTS;

use crate::cache::{CachedObject, ObjectCache};
use crate::core::errors::{SyncError, SyncResult};
use crate::core::types::{current_tid, Handle};
use crate::object::{EventKind, ObjectKind, SyncObject};
use crate::registry::RegistryClient;
use crate::shm::SharedSegment;
use crate::wait::{BackendChoice, WaitBackend};
use log::{info, trace, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::OnceLock;

/// Environment toggle for the native synchronization path. Set to a
/// non-zero integer to enable the engine for the process.
pub const ENV_TOGGLE: &str = "SHMSYNC";

/// Read the toggle once per process and cache the answer.
fn env_enabled() -> bool {
    static ENABLED: OnceLock<bool> = OnceLock::new();
    *ENABLED.get_or_init(|| {
        std::env::var(ENV_TOGGLE)
            .ok()
            .and_then(|v| v.trim().parse::<i32>().ok())
            .map(|v| v != 0)
            .unwrap_or(false)
    })
}

/// Bootstrap configuration for one engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Installation directory whose filesystem identity names the segment
    pub install_dir: PathBuf,
    /// Explicit enable/disable; `None` defers to the environment toggle
    pub enabled: Option<bool>,
    /// Wait backend selection
    pub backend: BackendChoice,
}

impl EngineConfig {
    pub fn new<P: Into<PathBuf>>(install_dir: P) -> Self {
        Self {
            install_dir: install_dir.into(),
            enabled: None,
            backend: BackendChoice::Auto,
        }
    }
}

/// The synchronization engine.
pub struct SyncEngine {
    registry: Arc<dyn RegistryClient>,
    /// `None` when the engine is disabled for this process
    segment: Option<SharedSegment>,
    cache: ObjectCache,
    waiter: WaitBackend,
}

impl SyncEngine {
    /// Construct the per-process engine. Opening the segment fails with
    /// `Unavailable` when the registry has not created it; a disabled
    /// engine constructs fine and declines every operation.
    pub fn bootstrap(config: EngineConfig, registry: Arc<dyn RegistryClient>) -> SyncResult<Self> {
        let enabled = config.enabled.unwrap_or_else(env_enabled);
        if !enabled {
            info!("native synchronization disabled for this process");
            return Ok(Self {
                registry,
                segment: None,
                cache: ObjectCache::new(),
                waiter: WaitBackend::select(BackendChoice::Condvar),
            });
        }

        let segment = SharedSegment::open_for(&config.install_dir)?;
        let waiter = WaitBackend::select(config.backend);
        info!(
            "native synchronization ready (segment {}, {} backend)",
            segment.name(),
            waiter.name()
        );

        Ok(Self {
            registry,
            segment: Some(segment),
            cache: ObjectCache::new(),
            waiter,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.segment.is_some()
    }

    fn segment(&self) -> SyncResult<&SharedSegment> {
        self.segment.as_ref().ok_or(SyncError::NotImplemented)
    }

    pub(crate) fn waiter(&self) -> &WaitBackend {
        &self.waiter
    }

    pub(crate) fn registry(&self) -> &dyn RegistryClient {
        self.registry.as_ref()
    }

    /// Resolve a handle to its cached descriptor, asking the registry on
    /// a miss. Pseudo-handles are declined with `NotImplemented`: they are
    /// not backed by a slot and belong to the non-native wait path.
    pub(crate) fn resolve(&self, handle: Handle) -> SyncResult<CachedObject> {
        let segment = self.segment()?;

        if let Some(cached) = self.cache.lookup(handle) {
            return Ok(cached);
        }
        if handle.is_null() {
            return Err(SyncError::InvalidHandle);
        }
        if handle.is_pseudo() {
            return Err(SyncError::NotImplemented);
        }

        let resolved = self.registry.resolve_handle(handle).map_err(|e| {
            warn!("failed to resolve handle {:#x}: {}", handle.raw(), e);
            e
        })?;
        let slot = segment.map_slot(resolved.slot)?;
        trace!(
            "resolved handle {:#x} to slot {} ({:?})",
            handle.raw(),
            resolved.slot,
            resolved.kind
        );
        Ok(self.cache.publish(handle, resolved.kind, slot))
    }

    fn create_object(
        &self,
        kind: ObjectKind,
        access: u32,
        name: Option<&str>,
        init: SyncObject,
    ) -> SyncResult<Handle> {
        let segment = self.segment()?;
        let [init_a, init_b] = init.encode();
        let reply = self
            .registry
            .create_object(kind, access, name, init_a, init_b)?;
        let slot = segment.map_slot(reply.slot)?;
        if !reply.already_existed {
            // Fresh slot, not yet visible under any published handle.
            init.store_to(slot);
        }
        self.cache.publish(reply.handle, reply.kind, slot);
        trace!(
            "created {:?} -> handle {:#x}, slot {}",
            reply.kind,
            reply.handle.raw(),
            reply.slot
        );
        Ok(reply.handle)
    }

    fn open_object(&self, kind: ObjectKind, access: u32, name: &str) -> SyncResult<Handle> {
        let segment = self.segment()?;
        let reply = self.registry.open_object(kind, access, name)?;
        let slot = segment.map_slot(reply.slot)?;
        self.cache.publish(reply.handle, reply.kind, slot);
        trace!(
            "opened {:?} {:?} -> handle {:#x}, slot {}",
            reply.kind,
            name,
            reply.handle.raw(),
            reply.slot
        );
        Ok(reply.handle)
    }

    /// Create a counting semaphore.
    pub fn create_semaphore(
        &self,
        name: Option<&str>,
        access: u32,
        initial: i32,
        maximum: i32,
    ) -> SyncResult<Handle> {
        if maximum <= 0 || initial < 0 || initial > maximum {
            return Err(SyncError::InvalidParameter(format!(
                "semaphore initial {} / maximum {}",
                initial, maximum
            )));
        }
        self.create_object(
            ObjectKind::Semaphore,
            access,
            name,
            SyncObject::Semaphore {
                count: initial,
                max: maximum,
            },
        )
    }

    pub fn open_semaphore(&self, name: &str, access: u32) -> SyncResult<Handle> {
        self.open_object(ObjectKind::Semaphore, access, name)
    }

    /// Create an auto- or manual-reset event.
    pub fn create_event(
        &self,
        name: Option<&str>,
        access: u32,
        kind: EventKind,
        signaled: bool,
    ) -> SyncResult<Handle> {
        self.create_object(kind.into(), access, name, SyncObject::Event { signaled })
    }

    pub fn open_event(&self, name: &str, access: u32) -> SyncResult<Handle> {
        self.open_object(ObjectKind::AutoEvent, access, name)
    }

    /// Create a recursive-ownership mutex, optionally owned by the
    /// calling thread from the start.
    pub fn create_mutex(
        &self,
        name: Option<&str>,
        access: u32,
        initially_owned: bool,
    ) -> SyncResult<Handle> {
        let owner = if initially_owned { current_tid() } else { 0 };
        self.create_object(
            ObjectKind::Mutex,
            access,
            name,
            SyncObject::Mutex {
                owner,
                recursion: initially_owned as i32,
            },
        )
    }

    pub fn open_mutex(&self, name: &str, access: u32) -> SyncResult<Handle> {
        self.open_object(ObjectKind::Mutex, access, name)
    }

    /// Drop this process's cached view of a handle. Purely process-local:
    /// the slot itself is abandoned, not reclaimed.
    pub fn close(&self, handle: Handle) -> SyncResult<()> {
        self.segment()?;
        trace!("close {:#x}", handle.raw());
        if self.cache.invalidate(handle) {
            Ok(())
        } else {
            Err(SyncError::InvalidHandle)
        }
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("enabled", &self.is_enabled())
            .field("backend", &self.waiter.name())
            .finish()
    }
}
