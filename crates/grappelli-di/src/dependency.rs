//! Resolved dependencies handed to factories

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::computation::{AnyInstance, Computation};
use crate::error::{DiError, DiResult};
use crate::injector::{Injector, Lookup, Mode};
use crate::registry::KeyId;

/// Downcasts a type-erased instance, naming `key` on mismatch.
pub(crate) fn downcast<T: Any + Send + Sync>(instance: AnyInstance, key: KeyId) -> DiResult<Arc<T>> {
	instance.downcast::<T>().map_err(|_| DiError::TypeMismatch {
		token: key.to_string(),
		expected: std::any::type_name::<T>(),
	})
}

/// Deferred lookup injected for dependencies marked lazy.
///
/// Each call re-runs the whole lookup on the injector that resolved the
/// owning binding; after the first successful call the lookup is a cache hit.
#[derive(Clone)]
pub struct LazyInstance {
	injector: Injector,
	key: KeyId,
	mode: Mode,
}

impl LazyInstance {
	pub(crate) fn new(injector: Injector, key: KeyId, mode: Mode) -> Self {
		Self { injector, key, mode }
	}

	/// Key this thunk looks up.
	pub fn key(&self) -> KeyId {
		self.key
	}

	/// Mode the lookup runs in.
	pub fn mode(&self) -> Mode {
		self.mode
	}

	/// Performs the lookup in this thunk's mode.
	pub fn lookup(&self) -> DiResult<Lookup> {
		self.injector.lookup_key(self.key, self.mode, false)
	}

	/// Performs the lookup and returns the instance.
	///
	/// Async-mode thunks only succeed here when the computation has already
	/// settled; use [`get_async`](Self::get_async) to wait for it.
	pub fn instance(&self) -> DiResult<AnyInstance> {
		match self.lookup()? {
			Lookup::Instance(instance) => Ok(instance),
			Lookup::Computation(computation) => computation
				.peek()
				.unwrap_or_else(|| Err(DiError::async_binding(self.key))),
			Lookup::Deferred(lazy) => lazy.instance(),
		}
	}

	/// Performs the lookup and downcasts the instance.
	pub fn get<T: Any + Send + Sync>(&self) -> DiResult<Arc<T>> {
		downcast(self.instance()?, self.key)
	}

	/// Performs the lookup through the async strategy.
	pub fn computation(&self) -> Computation {
		self.injector.resolve_key_async(self.key)
	}

	/// Performs the lookup through the async strategy and downcasts.
	pub fn get_async<T: Any + Send + Sync>(&self) -> BoxFuture<'static, DiResult<Arc<T>>> {
		let key = self.key;
		self.computation()
			.map(move |result| result.and_then(|instance| downcast(instance, key)))
			.boxed()
	}
}

impl fmt::Debug for LazyInstance {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("LazyInstance")
			.field("key", &self.key)
			.field("mode", &self.mode)
			.finish()
	}
}

/// One resolved dependency.
#[derive(Clone, Debug)]
pub enum Dependency {
	/// The resolved value
	Instance(AnyInstance),
	/// Optional dependency with no provider
	Absent,
	/// Lazy dependency thunk
	Lazy(LazyInstance),
	/// Force-async dependency seen from a synchronous construction
	Deferred(Computation),
}

/// Ordered dependency values passed to a factory.
#[derive(Clone, Debug, Default)]
pub struct Dependencies {
	entries: Vec<(KeyId, Dependency)>,
}

impl Dependencies {
	pub(crate) fn new(entries: Vec<(KeyId, Dependency)>) -> Self {
		Self { entries }
	}

	/// Number of declared dependencies.
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	/// Returns `true` if the binding declared no dependencies.
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Raw dependency at `index`.
	pub fn dependency(&self, index: usize) -> DiResult<&Dependency> {
		self.entry(index).map(|(_, dependency)| dependency)
	}

	/// Type-erased instance at `index`.
	///
	/// Lazy thunks are invoked. Deferred computations must already have
	/// settled, otherwise this fails with [`DiError::AsyncBinding`].
	pub fn instance(&self, index: usize) -> DiResult<AnyInstance> {
		let (key, dependency) = self.entry(index)?;
		match dependency {
			Dependency::Instance(instance) => Ok(instance.clone()),
			Dependency::Absent => Err(DiError::no_provider(*key)),
			Dependency::Lazy(lazy) => lazy.instance(),
			Dependency::Deferred(computation) => computation
				.peek()
				.unwrap_or_else(|| Err(DiError::async_binding(*key))),
		}
	}

	/// Instance at `index`, downcast to `T`.
	pub fn get<T: Any + Send + Sync>(&self, index: usize) -> DiResult<Arc<T>> {
		let (key, _) = self.entry(index)?;
		downcast(self.instance(index)?, *key)
	}

	/// Like [`get`](Self::get), but `None` for absent optional dependencies.
	pub fn optional<T: Any + Send + Sync>(&self, index: usize) -> DiResult<Option<Arc<T>>> {
		match self.dependency(index)? {
			Dependency::Absent => Ok(None),
			_ => self.get(index).map(Some),
		}
	}

	/// Lazy thunk at `index`.
	pub fn lazy(&self, index: usize) -> DiResult<LazyInstance> {
		let (key, dependency) = self.entry(index)?;
		match dependency {
			Dependency::Lazy(lazy) => Ok(lazy.clone()),
			_ => Err(DiError::TypeMismatch {
				token: key.to_string(),
				expected: "LazyInstance",
			}),
		}
	}

	/// Computation at `index`; settled values are wrapped as ready.
	pub fn deferred(&self, index: usize) -> DiResult<Computation> {
		let (key, dependency) = self.entry(index)?;
		match dependency {
			Dependency::Deferred(computation) => Ok(computation.clone()),
			Dependency::Instance(instance) => Ok(Computation::ready(instance.clone())),
			Dependency::Lazy(lazy) => Ok(lazy.computation()),
			Dependency::Absent => Err(DiError::no_provider(*key)),
		}
	}

	fn entry(&self, index: usize) -> DiResult<&(KeyId, Dependency)> {
		self.entries.get(index).ok_or(DiError::MissingDependency {
			index,
			len: self.entries.len(),
		})
	}
}
