//! # Grappelli
//!
//! Hierarchical dependency injection for Rust.
//!
//! Bindings map tokens (types or names) to factories; injectors build, cache
//! and share the values, resolving each value's own dependencies on the way.
//! Injectors form a tree: a child shadows its parent's bindings and falls back
//! to the parent for everything else.
//!
//! ## Feature Flags
//!
//! - `di` (default) - Injectors, bindings and resolution strategies
//!
//! ## Quick Example
//!
//! ```rust
//! # #[cfg(feature = "di")]
//! # {
//! use grappelli::prelude::*;
//! use std::sync::Arc;
//!
//! #[derive(Default)]
//! struct Logger;
//!
//! struct Service {
//!     logger: Arc<Logger>,
//! }
//!
//! impl Injectable for Service {
//!     fn dependencies() -> Vec<DependencySpec> {
//!         vec![dep::<Logger>()]
//!     }
//!
//!     fn inject(deps: &Dependencies) -> Result<Self, BoxError> {
//!         Ok(Service { logger: deps.get(0)? })
//!     }
//! }
//!
//! let injector = Injector::root(bindings![
//!     RawBinding::default_of::<Logger>(),
//!     RawBinding::of::<Service>(),
//! ])
//! .unwrap();
//!
//! let service = injector.get::<Service>().unwrap();
//! assert!(Arc::ptr_eq(&service.logger, &injector.get::<Logger>().unwrap()));
//! # }
//! ```

#[cfg(feature = "di")]
pub mod di;

#[cfg(feature = "di")]
pub use grappelli_di::bindings;

#[cfg(feature = "di")]
pub use di::{
	Binding, BindingTable, BoxError, Computation, DiError, DiResult, Injectable, Injector, InjectorSettings,
	RawBinding, Token, bind, bind_token, dep,
};

/// Commonly used types
pub mod prelude {
	#[cfg(feature = "di")]
	pub use crate::bindings;

	#[cfg(feature = "di")]
	pub use crate::di::{
		Binding, BoxError, Computation, Dependencies, DependencySpec, DiError, DiResult, Injectable, Injector,
		InjectorSettings, Lookup, Mode, RawBinding, Token, bind, bind_token, dep,
	};
}
