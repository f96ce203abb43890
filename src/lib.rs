//! # indirectx
//!
//! Component container that builds, shares, scopes and asynchronously tears
//! down instances according to a declarative node tree.
//!
//! ## Features
//!
//! - **Declarative tree**: component nodes with lexically scoped dependency lookup
//! - **Multiplicity policies**: Singleton, PerResolve and PerScope instances
//! - **Lock handles**: every resolve returns a [`Lock`]; instances are disposed
//!   exactly once, when their last lock is released
//! - **Async teardown**: disposal hooks and [`AsyncDispose`] run before an
//!   instance's own dependency locks are released
//! - **Build-time validation**: missing dependencies, cycles and captive
//!   dependencies are rejected before any resolve
//!
//! ## Quick Start
//!
//! ```rust
//! use indirectx::{ContainerConfig, DelegateBuilder, Identifier, ProviderNodeConfig, Resolver};
//! use std::sync::Arc;
//!
//! struct Database {
//!     connection_string: String,
//! }
//!
//! struct UserService {
//!     db: Arc<Database>,
//! }
//!
//! # #[tokio::main]
//! # async fn main() {
//! let container = ContainerConfig::new()
//!     .add(ProviderNodeConfig::singleton(DelegateBuilder::new(|_| {
//!         Ok(Database { connection_string: "postgres://localhost".to_string() })
//!     })))
//!     .add(ProviderNodeConfig::per_resolve(
//!         DelegateBuilder::new(|ctx| Ok(UserService { db: ctx.get::<Database>()? }))
//!             .depends_on(Identifier::of::<Database>()),
//!     ))
//!     .build()
//!     .unwrap();
//!
//! let user_service = container.resolve::<UserService>().await.unwrap();
//! assert_eq!(user_service.db.connection_string, "postgres://localhost");
//!
//! // Releasing the lock disposes the per-resolve instance
//! user_service.release().await.unwrap();
//! container.dispose_all().await;
//! # }
//! ```
//!
//! ## Multiplicity
//!
//! - **Singleton**: built once on first resolve, alive until container teardown
//! - **PerResolve**: built on every resolve, disposed when its lock is released
//! - **PerScope**: one instance per entered scope, disposed when its last lock
//!   is released
//!
//! ## Scopes
//!
//! ```rust
//! use indirectx::{ContainerConfig, DelegateBuilder, ProviderNodeConfig, Resolver};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! struct RequestId(usize);
//!
//! # #[tokio::main]
//! # async fn main() {
//! let counter = Arc::new(AtomicUsize::new(0));
//! let next = counter.clone();
//!
//! let container = ContainerConfig::new()
//!     .add(ProviderNodeConfig::scope("request").child(ProviderNodeConfig::per_scope(
//!         DelegateBuilder::new(move |_| Ok(RequestId(next.fetch_add(1, Ordering::SeqCst)))),
//!     )))
//!     .build()
//!     .unwrap();
//!
//! let first = container.create_scope("request", "a").unwrap();
//! let second = container.create_scope("request", "b").unwrap();
//!
//! let a = first.resolve::<RequestId>().await.unwrap();
//! let b = second.resolve::<RequestId>().await.unwrap();
//! // Different scopes get different instances
//! assert_ne!(a.0, b.0);
//! # }
//! ```

pub mod builder;
pub mod config;
pub mod container;
pub mod error;
pub mod identifier;
pub mod lock;
pub mod multiplicity;
pub mod observer;
pub mod options;
pub mod scope;
pub mod traits;
pub mod tree;

mod internal;
mod provider;

pub use builder::{
    BuildContext, BuilderConfig, ClassBuilder, Component, Constructor, DelegateBuilder, ResolveArgs,
};
pub use config::{ContainerConfig, ProviderNodeConfig};
pub use container::Container;
pub use error::{
    BoxError, ConfigResult, ConfigurationError, DisposeError, NotFoundReason, ResolveError, ResolveResult,
    ResolveTargetNotFound,
};
pub use identifier::{Contract, Identifier};
pub use lock::{ErasedLock, Lock, SelfHandle};
pub use multiplicity::MultiplicityConfig;
pub use observer::{ContainerObserver, TracingObserver};
pub use options::ContainerOptions;
pub use scope::Scope;
pub use traits::{AsyncDispose, Resolver, ResolverCore};
pub use tree::{NodeId, NodeTree};
