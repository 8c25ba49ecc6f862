//! # contractor
//!
//! A dependency resolution engine. A [`Container`] maps identifiers to
//! lifetime strategies; resolving an identifier produces a ready-to-use
//! instance whose constructor arguments are themselves resolved from the
//! same container.
//!
//! ## Core Concepts
//!
//! - **Identifier**: A type ([`Kind`]) plus an optional label, used as the registry key
//! - **Factory**: A construction strategy that builds new instances of one kind
//! - **Lifetime**: A caching policy wrapped around a factory
//! - **Container**: The registry and the `register` / `can_resolve` / `resolve` entry points
//!
//! ## Lifetimes
//!
//! - [`Transient`]: builds a new instance on every resolution
//! - [`ContainerLifetime`]: builds once per lifetime object
//! - [`ThreadLifetime`]: builds once per lifetime object and thread
//! - [`StaticLifetime`]: builds once per kind for everyone sharing a [`StaticCell`]
//!
//! ## Constructor Injection
//!
//! Types describe their constructors in a constructor table. With the
//! `macros` feature the table is generated:
//!
//! ```rust
//! use contractor::{
//!     ConstructorInjection, Container, ContainerLifetime, Identifier, ResolveExt as _,
//!     Transient, injectable,
//! };
//! use std::sync::Arc;
//!
//! struct Database {
//!     url: String,
//! }
//!
//! #[injectable]
//! impl Database {
//!     #[constructor]
//!     fn new() -> Self {
//!         Self { url: "sqlite::memory:".to_string() }
//!     }
//! }
//!
//! struct Api {
//!     database: Arc<Database>,
//! }
//!
//! #[injectable]
//! impl Api {
//!     #[constructor]
//!     fn new(database: Arc<Database>) -> Self {
//!         Self { database }
//!     }
//! }
//!
//! let container = Arc::new(Container::new());
//! container
//!     .register(
//!         Identifier::of::<Database>(),
//!         ContainerLifetime::new(ConstructorInjection::<Database>::of(container.resolver())),
//!     )
//!     .unwrap();
//! container
//!     .register(
//!         Identifier::of::<Api>(),
//!         Transient::new(ConstructorInjection::<Api>::of(container.resolver())),
//!     )
//!     .unwrap();
//!
//! let first = container.get::<Api>().unwrap();
//! let second = container.get::<Api>().unwrap();
//! assert!(!Arc::ptr_eq(&first, &second));
//! assert!(Arc::ptr_eq(&first.database, &second.database));
//! assert_eq!(first.database.url, "sqlite::memory:");
//! ```
//!
//! ## Features
//!
//! - `macros` (default): Enables `#[derive(Injectable)]` and `#[injectable]`

mod container;
mod error;
mod factory;
mod identifier;
mod inject;
mod lifetime;
mod resolver;
mod slot;

pub use container::*;
pub use error::*;
pub use factory::*;
pub use identifier::*;
pub use inject::*;
pub use lifetime::*;
pub use resolver::*;

#[cfg(feature = "macros")]
pub use contractor_macros::*;
