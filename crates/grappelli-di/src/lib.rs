//! # Grappelli Dependency Injection
//!
//! Hierarchical dependency resolver for Grappelli.
//!
//! ## Features
//!
//! - **Closed-world addressing**: every token gets a process-wide key-id, and
//!   each injector keeps its bindings and instances in arrays indexed by it
//! - **Sync and async resolution**: two strategies sharing one cache, with the
//!   same caching and cycle rules
//! - **Scoped**: child injectors shadow their parent's bindings and fall back
//!   to the parent for everything else
//! - **Diagnostics**: failures carry the chain of constructions that led to
//!   them (`A -> B -> C`)
//!
//! ## Example
//!
//! ```rust
//! use grappelli_di::{bind, bindings, dep, Injector};
//! use std::sync::Arc;
//!
//! #[derive(Default)]
//! struct Logger;
//!
//! struct Service {
//!     logger: Arc<Logger>,
//! }
//!
//! let root = Injector::root(bindings![
//!     bind::<Logger>().to_default::<Logger>(),
//!     bind::<Service>().to_factory([dep::<Logger>()], |deps| {
//!         Ok(Service { logger: deps.get::<Logger>(0)? })
//!     }),
//! ])
//! .unwrap();
//!
//! // A request scope that sees everything the root provides
//! let request = root.create_child(bindings![]).unwrap();
//!
//! let service = request.get::<Service>().unwrap();
//! assert!(Arc::ptr_eq(&service, &root.get::<Service>().unwrap()));
//! assert!(Arc::ptr_eq(&service.logger, &root.get::<Logger>().unwrap()));
//! ```
//!
//! ## Async Providers
//!
//! ```rust
//! use grappelli_di::{bind, dep, Injector};
//!
//! # futures::executor::block_on(async {
//! let injector = Injector::root(bind::<String>().to_async_factory(
//!     Vec::new(),
//!     |_| async { Ok(String::from("connected")) },
//! ))
//! .unwrap();
//!
//! // Async-only bindings are rejected by synchronous lookups
//! assert!(injector.get::<String>().is_err());
//! assert_eq!(injector.get_async::<String>().await.unwrap().as_str(), "connected");
//! # });
//! ```

pub mod binding;
pub mod computation;
pub mod dependency;
pub mod error;
pub mod injector;
pub mod registry;
pub mod settings;
pub mod strategy;
pub mod table;
pub mod token;

mod depth;
mod slots;

pub use binding::{
	Binding, BindingBuilder, DependencySpec, Factory, Injectable, RawBinding, TypeBinding, bind, bind_token, dep,
};
pub use computation::{AnyInstance, Computation};
pub use dependency::{Dependencies, Dependency, LazyInstance};
pub use depth::DEFAULT_MAX_RESOLUTION_DEPTH;
pub use error::{BoxError, DiError, DiResult, FactoryPanic, ResolutionChain};
pub use injector::{Injector, Lookup, Mode};
pub use registry::KeyId;
pub use settings::InjectorSettings;
pub use strategy::{AsyncStrategy, ResolutionStrategy, SyncStrategy};
pub use table::{BindingDescriptor, BindingTable, DependencyKey};
pub use token::Token;
