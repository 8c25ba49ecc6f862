use std::cell::RefCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::{DashMap, mapref::entry::Entry};
use serde::{Deserialize, Serialize};

use crate::{ContainerError, Identifier, Instance, Lifetime, Resolve, ResolverRef};

/// Configuration for a [`Container`].
///
/// Hosts typically embed this in their own configuration document and
/// pass the deserialized value to [`Container::with_config`].
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// Maximum number of registry entries. Unbounded when unset.
    #[serde(default)]
    pub max_entries: Option<usize>,
}

/// Registry mapping identifiers to lifetimes, and the entry point for
/// resolution.
///
/// Registrations are usually made during start-up and read concurrently
/// afterwards, but both operations are thread-safe at any time. A
/// construction strategy that needs dependencies holds a [`ResolverRef`]
/// obtained from [`Container::resolver`].
///
/// # Examples
///
/// ```rust
/// use contractor::{Container, ContainerLifetime, FnFactory, Identifier, ResolveExt as _, StdError};
///
/// let container = Container::new();
/// container
///     .register(
///         Identifier::labeled::<String>("greeting"),
///         ContainerLifetime::new(FnFactory::new(|| Ok::<_, StdError>("hello".to_string()))),
///     )
///     .unwrap();
///
/// let greeting = container
///     .resolve_as::<String>(&Identifier::labeled::<String>(" greeting "))
///     .unwrap();
/// assert_eq!(greeting.as_str(), "hello");
/// assert!(!container.can_resolve(&Identifier::of::<String>()));
/// ```
pub struct Container {
    entries: DashMap<Identifier, Arc<dyn Lifetime>>,
    max_entries: Option<usize>,
    reserved: AtomicUsize,
}

impl Container {
    /// Creates an empty, unbounded container.
    pub fn new() -> Self {
        Self::with_config(ContainerConfig::default())
    }

    /// Creates an empty container with the given configuration.
    pub fn with_config(config: ContainerConfig) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries: config.max_entries,
            reserved: AtomicUsize::new(0),
        }
    }

    /// Registers a lifetime under the given identifier.
    ///
    /// # Arguments
    ///
    /// * `identifier` - The identifier callers will resolve.
    /// * `lifetime` - The lifetime that manages instances for it.
    ///
    /// # Returns
    ///
    /// Returns `Err(ContainerError::AlreadyRegistered)` if the identifier
    /// already has an entry, or `Err(ContainerError::ResourceExhausted)` if
    /// the configured entry limit has been reached.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use contractor::{Container, ContainerError, FnFactory, Identifier, StdError, Transient};
    ///
    /// let container = Container::new();
    /// let lifetime = || Transient::new(FnFactory::new(|| Ok::<_, StdError>(1u32)));
    ///
    /// container.register(Identifier::of::<u32>(), lifetime()).unwrap();
    /// assert!(matches!(
    ///     container.register(Identifier::of::<u32>(), lifetime()),
    ///     Err(ContainerError::AlreadyRegistered(_)),
    /// ));
    /// ```
    pub fn register<L>(&self, identifier: Identifier, lifetime: L) -> Result<(), ContainerError>
    where
        L: Lifetime + 'static,
    {
        self.register_shared(identifier, Arc::new(lifetime))
    }

    /// Registers an already shared lifetime under the given identifier.
    ///
    /// The check for an existing entry and the insertion happen atomically:
    /// when several threads register the same identifier, exactly one
    /// succeeds.
    pub fn register_shared(
        &self,
        identifier: Identifier,
        lifetime: Arc<dyn Lifetime>,
    ) -> Result<(), ContainerError> {
        match self.entries.entry(identifier) {
            Entry::Occupied(entry) => Err(ContainerError::AlreadyRegistered(entry.key().clone())),
            Entry::Vacant(entry) => {
                self.reserve_entry()?;
                tracing::debug!(
                    identifier = %entry.key(),
                    lifetime = lifetime.name(),
                    kind = %lifetime.kind(),
                    "Registered"
                );
                entry.insert(lifetime);
                Ok(())
            }
        }
    }

    fn reserve_entry(&self) -> Result<(), ContainerError> {
        let Some(limit) = self.max_entries else {
            return Ok(());
        };
        self.reserved
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                (count < limit).then_some(count + 1)
            })
            .map(|_| ())
            .map_err(|_| ContainerError::ResourceExhausted { limit })
    }

    /// Checks if the identifier has a registry entry.
    ///
    /// Never constructs anything.
    pub fn can_resolve(&self, identifier: &Identifier) -> bool {
        self.entries.contains_key(identifier)
    }

    /// Returns an instance for the identifier.
    ///
    /// The registered lifetime decides whether the instance is new or
    /// cached. Its result is returned unchanged.
    ///
    /// # Returns
    ///
    /// Returns `Err(ContainerError::NotRegistered)` if the identifier has no
    /// entry, `Err(ContainerError::CircularDependency)` if it is already
    /// being resolved further up the current call chain, or whatever error
    /// the lifetime reports.
    pub fn resolve(&self, identifier: &Identifier) -> Result<Instance, ContainerError> {
        // Clone the lifetime out so no map guard is held during construction.
        let lifetime = match self.entries.get(identifier) {
            Some(entry) => entry.value().clone(),
            None => {
                tracing::trace!(identifier = %identifier, "Identifier not registered");
                return Err(ContainerError::NotRegistered(identifier.clone()));
            }
        };
        let _guard = ResolutionGuard::enter(&lifetime, identifier)?;
        tracing::trace!(identifier = %identifier, lifetime = lifetime.name(), "Resolving");
        lifetime.get_instance()
    }

    /// Returns a read-only view of the registry.
    pub fn registry(&self) -> Registry<'_> {
        Registry {
            entries: &self.entries,
        }
    }

    /// Returns a non-owning resolver handle for construction strategies.
    pub fn resolver(self: &Arc<Self>) -> ResolverRef {
        ResolverRef::new(self)
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl Resolve for Container {
    fn can_resolve(&self, identifier: &Identifier) -> bool {
        Container::can_resolve(self, identifier)
    }

    fn resolve(&self, identifier: &Identifier) -> Result<Instance, ContainerError> {
        Container::resolve(self, identifier)
    }
}

/// Read-only view of a container's entries.
pub struct Registry<'a> {
    entries: &'a DashMap<Identifier, Arc<dyn Lifetime>>,
}

impl Registry<'_> {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, identifier: &Identifier) -> bool {
        self.entries.contains_key(identifier)
    }

    /// Returns the lifetime registered for the identifier.
    pub fn get(&self, identifier: &Identifier) -> Option<Arc<dyn Lifetime>> {
        self.entries
            .get(identifier)
            .map(|entry| entry.value().clone())
    }

    /// Returns a snapshot of all registered identifiers, in no particular order.
    pub fn identifiers(&self) -> Vec<Identifier> {
        self.entries
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Returns a snapshot of all entries, in no particular order.
    pub fn entries(&self) -> Vec<(Identifier, Arc<dyn Lifetime>)> {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}

thread_local! {
    static RESOLVING: RefCell<Vec<(usize, Identifier)>> = const { RefCell::new(Vec::new()) };
}

/// Marks a lifetime as being resolved on the current thread until dropped.
///
/// Entries are keyed by lifetime, so a cycle is caught even when it passes
/// through several identifiers sharing one lifetime, or through several
/// containers.
struct ResolutionGuard;

impl ResolutionGuard {
    fn enter(lifetime: &Arc<dyn Lifetime>, identifier: &Identifier) -> Result<Self, ContainerError> {
        let key = Arc::as_ptr(lifetime) as *const () as usize;
        RESOLVING.with_borrow_mut(|stack| {
            if let Some(start) = stack.iter().position(|(pending, _)| *pending == key) {
                let mut chain: Vec<Identifier> = stack[start..]
                    .iter()
                    .map(|(_, pending)| pending.clone())
                    .collect();
                chain.push(identifier.clone());
                tracing::debug!(identifier = %identifier, "Circular dependency detected");
                return Err(ContainerError::CircularDependency(chain));
            }
            stack.push((key, identifier.clone()));
            Ok(ResolutionGuard)
        })
    }
}

impl Drop for ResolutionGuard {
    fn drop(&mut self) {
        RESOLVING.with_borrow_mut(|stack| {
            stack.pop();
        });
    }
}
