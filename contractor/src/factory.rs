use std::marker::PhantomData;
use std::sync::Arc;

use crate::{ContainerError, Instance, Kind, StdError};

/// Construction strategy: knows how to build new instances of one kind.
///
/// Factories never cache. Caching is the job of the [`Lifetime`] that
/// wraps them.
///
/// [`Lifetime`]: crate::Lifetime
pub trait Factory: Send + Sync {
    /// The kind of instance this factory builds.
    fn kind(&self) -> Kind;

    /// Builds a new instance, resolving any dependencies it needs.
    fn construct(&self) -> Result<Instance, ContainerError>;
}

/// Factory backed by a closure.
///
/// Useful for registering plain values or for building instances whose
/// construction does not fit constructor injection.
///
/// # Examples
///
/// ```rust
/// use contractor::{Factory, FnFactory, Kind, StdError};
///
/// let factory = FnFactory::new(|| Ok::<_, StdError>(10i32));
/// assert_eq!(factory.kind(), Kind::of::<i32>());
///
/// let instance = factory.construct().unwrap();
/// assert_eq!(instance.downcast_ref::<i32>(), Some(&10));
/// ```
pub struct FnFactory<T, F> {
    func: F,
    _marker: PhantomData<fn() -> T>,
}

impl<T, F> FnFactory<T, F>
where
    T: Send + Sync + 'static,
    F: Fn() -> Result<T, StdError> + Send + Sync,
{
    /// Wraps `func`, which builds a new `T` on every call.
    pub fn new(func: F) -> Self {
        Self {
            func,
            _marker: PhantomData,
        }
    }
}

impl<T, F> Factory for FnFactory<T, F>
where
    T: Send + Sync + 'static,
    F: Fn() -> Result<T, StdError> + Send + Sync,
{
    fn kind(&self) -> Kind {
        Kind::of::<T>()
    }

    fn construct(&self) -> Result<Instance, ContainerError> {
        tracing::trace!(kind = %self.kind(), "Constructing instance from closure");
        let value = (self.func)()?;
        Ok(Arc::new(value))
    }
}
