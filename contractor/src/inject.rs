//! Constructor injection.
//!
//! Rust has no runtime reflection, so the constructors of a type are listed
//! explicitly in a constructor table: one [`Constructor`] per way of building
//! the type, each declaring the kinds of its parameters. The table is either
//! written by hand or generated with the `#[derive(Injectable)]` and
//! `#[injectable]` macros.
//!
//! [`ConstructorInjection`] picks the richest constructor whose parameters
//! are all registered, resolves those parameters through the container and
//! invokes it.
//!
//! # Examples
//!
//! ```rust
//! use contractor::{
//!     Constructor, ConstructorInjection, Container, ContainerLifetime, FnFactory,
//!     Identifier, ResolveExt as _, StdError, Transient,
//! };
//! use std::sync::Arc;
//!
//! let container = Arc::new(Container::new());
//! container
//!     .register(
//!         Identifier::of::<i32>(),
//!         ContainerLifetime::new(FnFactory::new(|| Ok::<_, StdError>(3i32))),
//!     )
//!     .unwrap();
//!
//! let names = ConstructorInjection::new(
//!     container.resolver(),
//!     vec![Constructor::new(vec![contractor::Kind::of::<i32>()], |args| {
//!         let len = args.next::<i32>()?;
//!         Ok(vec![String::new(); len as usize])
//!     })],
//! );
//! container
//!     .register(Identifier::of::<Vec<String>>(), Transient::new(names))
//!     .unwrap();
//!
//! let names = container.get::<Vec<String>>().unwrap();
//! assert_eq!(names.len(), 3);
//! ```

use std::any::type_name;
use std::cmp::Reverse;
use std::collections::VecDeque;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::{ContainerError, Factory, Identifier, Instance, Kind, Resolve, ResolverRef, StdError};

type Invoke<T> = Box<dyn Fn(&mut Arguments) -> Result<T, StdError> + Send + Sync>;

/// One way of building a `T`, with the kinds of its parameters.
pub struct Constructor<T> {
    name: &'static str,
    parameters: Vec<Kind>,
    invoke: Invoke<T>,
}

impl<T> Constructor<T>
where
    T: Send + Sync + 'static,
{
    /// Creates a constructor taking arguments of the given kinds, in order.
    ///
    /// `func` receives the resolved arguments through an [`Arguments`]
    /// cursor and must consume them in the declared order.
    pub fn new<F>(parameters: Vec<Kind>, func: F) -> Self
    where
        F: Fn(&mut Arguments) -> Result<T, StdError> + Send + Sync + 'static,
    {
        Self {
            name: type_name::<T>(),
            parameters,
            invoke: Box::new(func),
        }
    }

    /// Sets the name reported in diagnostics.
    pub fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Returns the diagnostic name, the type name unless [`Constructor::named`] set one.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the parameter kinds, in the order the arguments are passed.
    pub fn parameters(&self) -> &[Kind] {
        &self.parameters
    }
}

/// Resolved constructor arguments, consumed front to back.
pub struct Arguments {
    values: VecDeque<(Identifier, Instance)>,
}

impl Arguments {
    /// Creates a cursor over already resolved arguments.
    ///
    /// # Arguments
    ///
    /// * `values` - The identifier each argument was resolved from, with its instance.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use contractor::{Arguments, Identifier, Instance};
    /// use std::sync::Arc;
    ///
    /// let mut args = Arguments::new([(Identifier::of::<u8>(), Arc::new(7u8) as Instance)]);
    /// assert_eq!(args.len(), 1);
    /// assert_eq!(args.next::<u8>().unwrap(), 7);
    /// assert!(args.is_empty());
    /// ```
    pub fn new(values: impl IntoIterator<Item = (Identifier, Instance)>) -> Self {
        Self {
            values: values.into_iter().collect(),
        }
    }

    /// Takes the next argument as a shared `Arc<U>`.
    ///
    /// Fails with [`ContainerError::InvalidArgument`] when no arguments are
    /// left or the next one is not a `U`.
    pub fn next_arc<U>(&mut self) -> Result<Arc<U>, ContainerError>
    where
        U: Send + Sync + 'static,
    {
        let (identifier, instance) = self.values.pop_front().ok_or_else(|| {
            ContainerError::InvalidArgument(format!(
                "constructor requested an undeclared argument of type {}",
                type_name::<U>()
            ))
        })?;
        instance.downcast::<U>().map_err(|_| {
            ContainerError::InvalidArgument(format!(
                "argument {identifier} is not a {}",
                type_name::<U>()
            ))
        })
    }

    /// Takes the next argument by value, cloning it if it is shared.
    pub fn next<U>(&mut self) -> Result<U, ContainerError>
    where
        U: Clone + Send + Sync + 'static,
    {
        Ok(Arc::unwrap_or_clone(self.next_arc::<U>()?))
    }

    /// Number of arguments not consumed yet.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Types that publish a constructor table.
///
/// Usually implemented with `#[derive(Injectable)]` or `#[injectable]`.
pub trait Constructible: Send + Sync + Sized + 'static {
    fn constructors() -> Vec<Constructor<Self>>;
}

struct Selection {
    index: usize,
    parameters: Vec<Identifier>,
}

/// Factory that builds a `T` by constructor injection.
///
/// On first use it orders the constructors by parameter count, descending,
/// and selects the first one whose parameters are all registered. Among
/// constructors of equal arity the one declared first wins. The selection
/// is memoized for the life of the factory; a failed selection is not.
pub struct ConstructorInjection<T> {
    resolver: ResolverRef,
    constructors: Vec<Constructor<T>>,
    selection: OnceCell<Selection>,
}

impl<T> ConstructorInjection<T>
where
    T: Send + Sync + 'static,
{
    /// Creates a factory over an explicit constructor table.
    ///
    /// # Arguments
    ///
    /// * `resolver` - Where parameters are checked and resolved, usually
    ///   [`Container::resolver`](crate::Container::resolver).
    /// * `constructors` - The ways of building a `T`, in declaration order.
    ///
    /// # Returns
    ///
    /// The factory. No constructor is selected until the first
    /// [`Factory::construct`] call.
    pub fn new(resolver: ResolverRef, constructors: Vec<Constructor<T>>) -> Self {
        Self {
            resolver,
            constructors,
            selection: OnceCell::new(),
        }
    }

    /// Creates a factory from the constructor table of `T`.
    pub fn of(resolver: ResolverRef) -> Self
    where
        T: Constructible,
    {
        Self::new(resolver, T::constructors())
    }

    /// Returns the resolver parameters are resolved through.
    pub fn resolver(&self) -> &ResolverRef {
        &self.resolver
    }

    pub fn constructors(&self) -> &[Constructor<T>] {
        &self.constructors
    }

    /// Returns the selected constructor, if one has been selected yet.
    pub fn selected(&self) -> Option<&Constructor<T>> {
        self.selection
            .get()
            .map(|selection| &self.constructors[selection.index])
    }

    fn select(&self) -> Result<&Selection, ContainerError> {
        self.selection.get_or_try_init(|| {
            let mut candidates: Vec<usize> = (0..self.constructors.len()).collect();
            // Stable sort keeps declaration order among equal arities.
            candidates.sort_by_key(|&index| Reverse(self.constructors[index].parameters.len()));
            for index in candidates {
                let constructor = &self.constructors[index];
                let parameters: Vec<Identifier> = constructor
                    .parameters
                    .iter()
                    .copied()
                    .map(Identifier::from)
                    .collect();
                if parameters.iter().all(|p| self.resolver.can_resolve(p)) {
                    tracing::debug!(
                        kind = %Kind::of::<T>(),
                        constructor = constructor.name,
                        arity = parameters.len(),
                        "Selected constructor"
                    );
                    return Ok(Selection { index, parameters });
                }
            }
            tracing::debug!(kind = %Kind::of::<T>(), "No constructor has all dependencies registered");
            Err(ContainerError::MissingDependencies(Kind::of::<T>()))
        })
    }
}

impl<T> Factory for ConstructorInjection<T>
where
    T: Send + Sync + 'static,
{
    fn kind(&self) -> Kind {
        Kind::of::<T>()
    }

    fn construct(&self) -> Result<Instance, ContainerError> {
        let selection = self.select()?;
        let constructor = &self.constructors[selection.index];
        tracing::trace!(kind = %self.kind(), constructor = constructor.name, "Constructing instance");
        let mut values = Vec::with_capacity(selection.parameters.len());
        for parameter in &selection.parameters {
            values.push((parameter.clone(), self.resolver.resolve(parameter)?));
        }
        let mut arguments = Arguments::new(values);
        let value = (constructor.invoke)(&mut arguments)?;
        Ok(Arc::new(value))
    }
}
