use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use once_cell::sync::{Lazy, OnceCell};

use crate::{ContainerError, Identifier, Instance, Kind};

/// Cache slot that is filled at most once.
///
/// Works like a once-cell, but the slot records which thread is filling it.
/// An initializer that would end up waiting for itself, directly or through
/// a chain of other threads, fails with
/// [`ContainerError::CircularDependency`] instead of blocking forever.
pub(crate) struct Slot {
    id: u64,
    kind: Kind,
    value: OnceCell<Instance>,
}

static NEXT_SLOT_ID: AtomicU64 = AtomicU64::new(0);

/// Which thread fills which slot, and which slot each blocked thread waits on.
#[derive(Default)]
struct WaitGraph {
    owners: HashMap<u64, (ThreadId, Kind)>,
    waiting: HashMap<ThreadId, u64>,
}

static GRAPH: Lazy<Mutex<WaitGraph>> = Lazy::new(|| Mutex::new(WaitGraph::default()));
static RELEASED: Condvar = Condvar::new();

fn lock_graph() -> MutexGuard<'static, WaitGraph> {
    GRAPH.lock().unwrap_or_else(PoisonError::into_inner)
}

impl WaitGraph {
    /// Follows owners and their waits from `slot`. Returns the kinds along
    /// the way if the walk comes back to `current`.
    fn cycle(&self, slot: u64, current: ThreadId) -> Option<Vec<Identifier>> {
        let mut chain = Vec::new();
        let mut slot = slot;
        for _ in 0..=self.waiting.len() {
            let (owner, kind) = *self.owners.get(&slot)?;
            chain.push(Identifier::from(kind));
            if owner == current {
                chain.push(chain[0].clone());
                return Some(chain);
            }
            slot = *self.waiting.get(&owner)?;
        }
        None
    }
}

/// Clears slot ownership on every exit path, including panics.
struct Release(u64);

impl Drop for Release {
    fn drop(&mut self) {
        lock_graph().owners.remove(&self.0);
        RELEASED.notify_all();
    }
}

impl Slot {
    pub(crate) fn new(kind: Kind) -> Self {
        Self {
            id: NEXT_SLOT_ID.fetch_add(1, Ordering::Relaxed),
            kind,
            value: OnceCell::new(),
        }
    }

    pub(crate) fn get(&self) -> Option<&Instance> {
        self.value.get()
    }

    /// Returns the cached instance, or runs `init` to fill the slot.
    ///
    /// Only one thread runs `init` at a time. The others wait and take its
    /// result, or take over if it failed. Failures are not cached.
    pub(crate) fn get_or_try_init<F>(&self, init: F) -> Result<Instance, ContainerError>
    where
        F: FnOnce() -> Result<Instance, ContainerError>,
    {
        if let Some(instance) = self.value.get() {
            return Ok(instance.clone());
        }
        let current = thread::current().id();
        let mut graph = lock_graph();
        loop {
            if let Some(instance) = self.value.get() {
                return Ok(instance.clone());
            }
            if !graph.owners.contains_key(&self.id) {
                break;
            }
            if let Some(chain) = graph.cycle(self.id, current) {
                tracing::debug!(kind = %self.kind, "Initialization would wait on itself");
                return Err(ContainerError::CircularDependency(chain));
            }
            graph.waiting.insert(current, self.id);
            graph = RELEASED
                .wait(graph)
                .unwrap_or_else(PoisonError::into_inner);
            graph.waiting.remove(&current);
        }
        graph.owners.insert(self.id, (current, self.kind));
        drop(graph);

        let _release = Release(self.id);
        let instance = init()?;
        // Only the owning thread gets here, so the slot is still empty.
        let _ = self.value.set(instance.clone());
        Ok(instance)
    }
}
