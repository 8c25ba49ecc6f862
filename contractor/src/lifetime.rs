use std::cell::RefCell;
use std::sync::{Arc, PoisonError, RwLock, Weak};
use std::thread::{self, ThreadId};

use dashmap::DashMap;
use once_cell::sync::Lazy;

use crate::slot::Slot;
use crate::{ContainerError, Factory, Instance, Kind};

/// Policy that decides when a factory builds a new instance and when a
/// cached one is reused.
///
/// [`Transient`], [`ContainerLifetime`], [`ThreadLifetime`] and
/// [`StaticLifetime`] differ only in the scope of their cache:
///
/// - `Transient` never caches.
/// - `ContainerLifetime` caches one instance per lifetime object.
/// - `ThreadLifetime` caches one instance per lifetime object and thread.
/// - `StaticLifetime` caches one instance per kind in a shared [`StaticCell`].
///
/// Construction errors are returned as-is and never cached, so a later call
/// may still succeed.
pub trait Lifetime: Send + Sync {
    /// The kind of instance this lifetime manages. Fixed at creation.
    fn kind(&self) -> Kind;

    /// Short name of the caching policy, for diagnostics.
    fn name(&self) -> &'static str;

    /// Returns the factory used to build new instances.
    fn factory(&self) -> Arc<dyn Factory>;

    /// Replaces the factory used to build new instances.
    ///
    /// Fails with [`ContainerError::InvalidArgument`] if the factory builds
    /// a different kind. Instances that are already cached stay cached.
    fn set_factory(&self, factory: Arc<dyn Factory>) -> Result<(), ContainerError>;

    /// Returns a cached instance or builds a new one.
    fn get_instance(&self) -> Result<Instance, ContainerError>;
}

/// State shared by all lifetimes: the fixed kind and the replaceable factory.
struct Binding {
    kind: Kind,
    factory: RwLock<Arc<dyn Factory>>,
}

impl Binding {
    fn new(factory: Arc<dyn Factory>) -> Self {
        Self {
            kind: factory.kind(),
            factory: RwLock::new(factory),
        }
    }

    fn factory(&self) -> Arc<dyn Factory> {
        self.factory
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_factory(&self, factory: Arc<dyn Factory>) -> Result<(), ContainerError> {
        if factory.kind() != self.kind {
            return Err(ContainerError::InvalidArgument(format!(
                "factory builds '{}' but the lifetime manages '{}'",
                factory.kind(),
                self.kind
            )));
        }
        let previous = std::mem::replace(
            &mut *self
                .factory
                .write()
                .unwrap_or_else(PoisonError::into_inner),
            factory,
        );
        // The old factory is dropped after the lock is released.
        drop(previous);
        Ok(())
    }

    fn construct(&self) -> Result<Instance, ContainerError> {
        // The lock is released before the factory runs.
        let factory = self.factory();
        factory.construct()
    }
}

macro_rules! impl_binding_accessors {
    () => {
        fn kind(&self) -> Kind {
            self.binding.kind
        }

        fn factory(&self) -> Arc<dyn Factory> {
            self.binding.factory()
        }

        fn set_factory(&self, factory: Arc<dyn Factory>) -> Result<(), ContainerError> {
            self.binding.set_factory(factory)
        }
    };
}

/// Lifetime that builds a new instance on every call.
pub struct Transient {
    binding: Binding,
}

impl Transient {
    /// Creates a transient lifetime around `factory`.
    pub fn new<F>(factory: F) -> Self
    where
        F: Factory + 'static,
    {
        Self::from_shared(Arc::new(factory))
    }

    pub fn from_shared(factory: Arc<dyn Factory>) -> Self {
        Self {
            binding: Binding::new(factory),
        }
    }
}

impl Lifetime for Transient {
    impl_binding_accessors!();

    fn name(&self) -> &'static str {
        "transient"
    }

    fn get_instance(&self) -> Result<Instance, ContainerError> {
        self.binding.construct()
    }
}

/// Lifetime that builds one instance and reuses it for every later call.
///
/// Concurrent first calls are serialized: the factory runs exactly once
/// as long as it succeeds.
pub struct ContainerLifetime {
    binding: Binding,
    instance: Slot,
}

impl ContainerLifetime {
    /// Creates a lifetime that caches the first instance `factory` builds.
    pub fn new<F>(factory: F) -> Self
    where
        F: Factory + 'static,
    {
        Self::from_shared(Arc::new(factory))
    }

    pub fn from_shared(factory: Arc<dyn Factory>) -> Self {
        let binding = Binding::new(factory);
        Self {
            instance: Slot::new(binding.kind),
            binding,
        }
    }
}

impl Lifetime for ContainerLifetime {
    impl_binding_accessors!();

    fn name(&self) -> &'static str {
        "container"
    }

    fn get_instance(&self) -> Result<Instance, ContainerError> {
        self.instance.get_or_try_init(|| {
            let instance = self.binding.construct()?;
            tracing::debug!(kind = %self.binding.kind, "Cached container instance");
            Ok(instance)
        })
    }
}

/// Lifetime that builds one instance per calling thread.
///
/// Instances are never shared between threads. Repeated calls on the same
/// thread reuse that thread's instance. When a thread exits, its instances
/// are dropped from every thread lifetime it used.
pub struct ThreadLifetime {
    binding: Binding,
    instances: Arc<ThreadCache>,
}

type ThreadCache = DashMap<ThreadId, Instance>;

/// Caches the current thread has entries in, cleaned up when it exits.
struct ThreadEviction {
    thread: ThreadId,
    caches: RefCell<Vec<Weak<ThreadCache>>>,
}

impl Drop for ThreadEviction {
    fn drop(&mut self) {
        for cache in self.caches.get_mut().drain(..) {
            if let Some(cache) = cache.upgrade() {
                cache.remove(&self.thread);
            }
        }
    }
}

thread_local! {
    static EVICTION: ThreadEviction = ThreadEviction {
        thread: thread::current().id(),
        caches: RefCell::new(Vec::new()),
    };
}

impl ThreadLifetime {
    /// Creates a per-thread lifetime around `factory`.
    pub fn new<F>(factory: F) -> Self
    where
        F: Factory + 'static,
    {
        Self::from_shared(Arc::new(factory))
    }

    pub fn from_shared(factory: Arc<dyn Factory>) -> Self {
        Self {
            binding: Binding::new(factory),
            instances: Arc::new(DashMap::new()),
        }
    }

    /// Number of threads that currently hold an instance.
    pub fn cached_threads(&self) -> usize {
        self.instances.len()
    }
}

impl Lifetime for ThreadLifetime {
    impl_binding_accessors!();

    fn name(&self) -> &'static str {
        "thread"
    }

    fn get_instance(&self) -> Result<Instance, ContainerError> {
        let thread_id = thread::current().id();
        if let Some(instance) = self.instances.get(&thread_id) {
            return Ok(instance.value().clone());
        }
        let instance = self.binding.construct()?;
        // Fails only while the thread is shutting down. Nothing is cached then.
        let tracked = EVICTION
            .try_with(|eviction| {
                let mut caches = eviction.caches.borrow_mut();
                caches.retain(|cache| cache.strong_count() > 0);
                caches.push(Arc::downgrade(&self.instances));
            })
            .is_ok();
        if tracked {
            self.instances.insert(thread_id, instance.clone());
            tracing::debug!(kind = %self.binding.kind, thread = ?thread_id, "Cached thread instance");
        }
        Ok(instance)
    }
}

/// Shared cache backing [`StaticLifetime`].
///
/// Holds at most one instance per kind. Every static lifetime that points
/// at the same cell shares those instances. [`StaticCell::global`] is the
/// process-wide cell.
#[derive(Default)]
pub struct StaticCell {
    slots: DashMap<Kind, Arc<Slot>>,
}

static GLOBAL_CELL: Lazy<Arc<StaticCell>> = Lazy::new(|| Arc::new(StaticCell::new()));

impl StaticCell {
    /// Creates an empty cell.
    ///
    /// Lifetimes only share instances with lifetimes holding the same cell,
    /// so a fresh cell gives tests and embedded hosts their own statics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the process-wide cell.
    pub fn global() -> Arc<StaticCell> {
        GLOBAL_CELL.clone()
    }

    /// Returns `true` if an instance of `kind` has been cached.
    pub fn contains(&self, kind: Kind) -> bool {
        self.slots
            .get(&kind)
            .is_some_and(|slot| slot.value().get().is_some())
    }

    fn slot(&self, kind: Kind) -> Arc<Slot> {
        // The map guard must not be held while the slot initializes.
        self.slots
            .entry(kind)
            .or_insert_with(|| Arc::new(Slot::new(kind)))
            .value()
            .clone()
    }
}

/// Lifetime that shares one instance per kind through a [`StaticCell`].
///
/// Two static lifetimes for the same kind and cell return the same
/// instance, whichever factory got to build it first.
pub struct StaticLifetime {
    binding: Binding,
    cell: Arc<StaticCell>,
}

impl StaticLifetime {
    /// Creates a lifetime backed by the process-wide cell.
    pub fn new<F>(factory: F) -> Self
    where
        F: Factory + 'static,
    {
        Self::with_cell(factory, StaticCell::global())
    }

    /// Creates a lifetime backed by the given cell.
    ///
    /// # Arguments
    ///
    /// * `factory` - Builds the instance if the cell has none for its kind yet.
    /// * `cell` - The cache shared with other static lifetimes.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use contractor::{FnFactory, Lifetime, StaticCell, StaticLifetime, StdError};
    /// use std::sync::Arc;
    ///
    /// let cell = Arc::new(StaticCell::new());
    /// let first = StaticLifetime::with_cell(FnFactory::new(|| Ok::<_, StdError>(1u8)), cell.clone());
    /// let second = StaticLifetime::with_cell(FnFactory::new(|| Ok::<_, StdError>(2u8)), cell);
    ///
    /// let a = first.get_instance().unwrap();
    /// let b = second.get_instance().unwrap();
    /// assert!(Arc::ptr_eq(&a, &b));
    /// assert_eq!(b.downcast_ref::<u8>(), Some(&1));
    /// ```
    pub fn with_cell<F>(factory: F, cell: Arc<StaticCell>) -> Self
    where
        F: Factory + 'static,
    {
        Self::from_shared(Arc::new(factory), cell)
    }

    /// Same as [`StaticLifetime::with_cell`], for a factory that is already shared.
    pub fn from_shared(factory: Arc<dyn Factory>, cell: Arc<StaticCell>) -> Self {
        Self {
            binding: Binding::new(factory),
            cell,
        }
    }

    pub fn cell(&self) -> &Arc<StaticCell> {
        &self.cell
    }
}

impl Lifetime for StaticLifetime {
    impl_binding_accessors!();

    fn name(&self) -> &'static str {
        "static"
    }

    fn get_instance(&self) -> Result<Instance, ContainerError> {
        let slot = self.cell.slot(self.binding.kind);
        slot.get_or_try_init(|| {
            let instance = self.binding.construct()?;
            tracing::debug!(kind = %self.binding.kind, "Cached static instance");
            Ok(instance)
        })
    }
}
