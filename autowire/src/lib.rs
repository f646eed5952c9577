//! # Fibre Autowire
//!
//! A thread-safe dependency-injection container with autowiring for Rust.
//!
//! Types are registered against the trait objects they implement. Resolving
//! a trait object picks the matching registration, builds or reuses an
//! instance according to its scope and then populates the instance's
//! declared dependency fields from the same container.
//!
//! ## Core Concepts
//!
//! - **Container**: the registry mapping registered types to concrete types
//!   and their scope (singleton, transient or a fixed existing instance).
//! - **Descriptor**: the injection metadata of a type, declared once through
//!   [`Injectable`]: constructors in declaration order, dependency fields and
//!   embedded ancestors.
//! - **Qualifier**: the concrete type selecting one of several
//!   implementations registered under the same trait object.
//! - **Autowiring**: populating [`Autowired`] and [`AutowiredAll`] fields
//!   after construction. Fields that already hold a value are skipped, which
//!   is what lets singletons reference each other in a cycle.
//! - **Application context**: a type whose methods produce components, see
//!   [`ApplicationContext`].
//!
//! ## Quick Start
//!
//! ```
//! use fibre_autowire::{implements, Autowired, Container, Constructor, Descriptor, Injectable};
//! use std::sync::Arc;
//!
//! trait Repository: Send + Sync {
//!   fn find(&self, id: u32) -> String;
//! }
//!
//! struct MemoryRepository;
//!
//! impl Repository for MemoryRepository {
//!   fn find(&self, id: u32) -> String {
//!     format!("user-{id}")
//!   }
//! }
//!
//! implements!(MemoryRepository => dyn Repository);
//! fibre_autowire::injectable!(default: MemoryRepository);
//!
//! impl Default for MemoryRepository {
//!   fn default() -> Self {
//!     MemoryRepository
//!   }
//! }
//!
//! struct UserService {
//!   repository: Autowired<dyn Repository>,
//! }
//!
//! impl Injectable for UserService {
//!   fn descriptor() -> Descriptor<Self> {
//!     Descriptor::new()
//!       .constructor(Constructor::new(|_| {
//!         Ok(UserService { repository: Autowired::new() })
//!       }))
//!       .field("repository", |service| &service.repository)
//!   }
//! }
//!
//! let container = Container::new();
//! container.register::<dyn Repository, MemoryRepository>();
//! container.register::<UserService, UserService>();
//!
//! let service: Arc<UserService> = container.resolve::<UserService>().unwrap();
//! assert_eq!(service.repository.get().unwrap().find(7), "user-7");
//! ```

mod autowire;
mod constructor;
mod container;
mod context;
mod core;
mod descriptor;
mod error;
mod factory;
mod macros;
mod options;
mod registration;

pub use crate::core::{TypeKey, Upcast};
pub use container::Container;
pub use context::{ApplicationContext, Components, Scope};
pub use descriptor::{
  Args, Autowired, AutowiredAll, Constructor, Descriptor, Inject, Injectable, Slot, TypedSlot,
};
pub use error::{Error, InstanceCreationError, RegistrationError, ResolveError, Result};
pub use options::Options;
pub use registration::Registration;
