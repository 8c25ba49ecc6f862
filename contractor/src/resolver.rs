use std::any::{Any, type_name};
use std::sync::{Arc, Weak};

use crate::{ContainerError, Identifier};

/// A resolved instance, shared and type-erased.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Read-only resolution capability.
///
/// This is the only view of a container that construction strategies get:
/// they can ask whether an identifier is registered and resolve it, but
/// they cannot enumerate or mutate the registry.
pub trait Resolve: Send + Sync {
    /// Returns `true` if `identifier` has a registry entry.
    ///
    /// Never triggers construction.
    fn can_resolve(&self, identifier: &Identifier) -> bool;

    /// Returns an instance for `identifier`.
    fn resolve(&self, identifier: &Identifier) -> Result<Instance, ContainerError>;
}

/// Non-owning handle to a [`Resolve`] implementation.
///
/// Construction strategies keep one of these to reach the container that
/// owns them without creating a reference cycle.
#[derive(Clone)]
pub struct ResolverRef(Weak<dyn Resolve>);

impl ResolverRef {
    /// Creates a handle that does not keep `resolver` alive.
    pub fn new<R>(resolver: &Arc<R>) -> Self
    where
        R: Resolve + 'static,
    {
        let weak: Weak<R> = Arc::downgrade(resolver);
        Self(weak)
    }
}

impl Resolve for ResolverRef {
    fn can_resolve(&self, identifier: &Identifier) -> bool {
        self.0
            .upgrade()
            .is_some_and(|resolver| resolver.can_resolve(identifier))
    }

    fn resolve(&self, identifier: &Identifier) -> Result<Instance, ContainerError> {
        let resolver = self.0.upgrade().ok_or(ContainerError::ContainerDropped)?;
        resolver.resolve(identifier)
    }
}

/// Extension trait with typed resolution helpers.
pub trait ResolveExt: Resolve {
    /// Resolves `identifier` and downcasts the instance to `T`.
    ///
    /// Fails with [`ContainerError::InvalidArgument`] if the registered
    /// instance is not a `T`.
    fn resolve_as<T>(&self, identifier: &Identifier) -> Result<Arc<T>, ContainerError>
    where
        T: Send + Sync + 'static,
    {
        self.resolve(identifier)?.downcast::<T>().map_err(|_| {
            ContainerError::InvalidArgument(format!(
                "instance resolved for {identifier} is not a {}",
                type_name::<T>()
            ))
        })
    }

    /// Resolves the unlabeled registration of `T`.
    fn get<T>(&self) -> Result<Arc<T>, ContainerError>
    where
        T: Send + Sync + 'static,
    {
        self.resolve_as(&Identifier::of::<T>())
    }
}

impl<R> ResolveExt for R where R: Resolve + ?Sized {}
