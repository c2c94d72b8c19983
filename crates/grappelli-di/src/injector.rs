//! Hierarchical injectors
//!
//! An [`Injector`] pairs an immutable [`BindingTable`] with its own slot array
//! and an optional parent. Lookups try the local cache, then the local
//! bindings, then delegate the whole lookup to the parent; a value is
//! therefore cached in the injector whose table binds it, and a child binding
//! for the same token shadows the parent's.
//!
//! # Examples
//!
//! ```
//! use grappelli_di::{bind, Injector};
//! use std::sync::Arc;
//!
//! struct Config(&'static str);
//!
//! let root = Injector::root(bind::<Config>().to_value(Config("root"))).unwrap();
//! let child = root.create_child(Vec::<grappelli_di::Binding>::new()).unwrap();
//!
//! // Resolved and cached by the root, shared with the child
//! let from_child = child.get::<Config>().unwrap();
//! assert!(Arc::ptr_eq(&from_child, &root.get::<Config>().unwrap()));
//! assert_eq!(from_child.0, "root");
//! ```

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

use futures::FutureExt;
use futures::future::BoxFuture;
use once_cell::sync::Lazy;

use crate::binding::RawBinding;
use crate::computation::{AnyInstance, Computation};
use crate::dependency::{LazyInstance, downcast};
use crate::error::{DiError, DiResult};
use crate::registry::{self, KeyId};
use crate::settings::InjectorSettings;
use crate::slots::InstanceSlots;
use crate::strategy::{AsyncStrategy, ResolutionStrategy, SyncStrategy};
use crate::table::BindingTable;
use crate::token::Token;

/// Key under which every injector provides itself.
static INJECTOR_KEY: Lazy<KeyId> = Lazy::new(KeyId::of::<Injector>);

/// Which resolution protocol a lookup runs under.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Mode {
	/// Values are built on the caller's stack
	Sync,
	/// Values are produced by shared computations
	Async,
}

/// Result of [`Injector::lookup`].
#[derive(Clone, Debug)]
pub enum Lookup {
	/// Sync-mode result
	Instance(AnyInstance),
	/// Async-mode result
	Computation(Computation),
	/// Lazy-mode result; invoking it performs the lookup
	Deferred(LazyInstance),
}

struct InjectorInner {
	table: Arc<BindingTable>,
	slots: InstanceSlots,
	settings: InjectorSettings,
	parent: Option<Injector>,
}

/// A scoped container of bindings and the instances built from them.
///
/// Cloning is cheap; clones share the same slots.
#[derive(Clone)]
pub struct Injector {
	inner: Arc<InjectorInner>,
}

/// Non-owning handle held by in-flight computations.
pub(crate) struct WeakInjector(Weak<InjectorInner>);

impl WeakInjector {
	pub(crate) fn upgrade(&self) -> Option<Injector> {
		self.0.upgrade().map(|inner| Injector { inner })
	}
}

impl Injector {
	/// Creates a root injector from raw bindings.
	pub fn root(raw: impl Into<RawBinding>) -> DiResult<Self> {
		Self::root_with_settings(raw, InjectorSettings::default())
	}

	/// Creates a root injector with explicit settings.
	pub fn root_with_settings(raw: impl Into<RawBinding>, settings: InjectorSettings) -> DiResult<Self> {
		let table = BindingTable::build(raw)?;
		Self::assemble(Arc::new(table), settings, None)
	}

	/// Creates a root injector over an already-built table.
	///
	/// Tables are immutable, so one table can back any number of injectors,
	/// each with its own instances.
	pub fn from_resolved(table: Arc<BindingTable>, settings: InjectorSettings) -> DiResult<Self> {
		Self::assemble(table, settings, None)
	}

	/// Creates a child injector that falls back to `self`.
	pub fn create_child(&self, raw: impl Into<RawBinding>) -> DiResult<Self> {
		self.create_child_with_settings(raw, self.inner.settings.clone())
	}

	/// Creates a child injector with its own settings.
	pub fn create_child_with_settings(
		&self,
		raw: impl Into<RawBinding>,
		settings: InjectorSettings,
	) -> DiResult<Self> {
		let table = BindingTable::build(raw)?;
		Self::assemble(Arc::new(table), settings, Some(self.clone()))
	}

	/// Creates a child injector over an already-built table.
	pub fn create_child_from_resolved(&self, table: Arc<BindingTable>) -> DiResult<Self> {
		Self::assemble(table, self.inner.settings.clone(), Some(self.clone()))
	}

	fn assemble(table: Arc<BindingTable>, settings: InjectorSettings, parent: Option<Injector>) -> DiResult<Self> {
		settings.validate()?;

		let slots = InstanceSlots::new(registry::count().max(table.len()));
		tracing::debug!(
			injector = settings.label(),
			parent = parent.as_ref().map(|p| p.label()),
			bindings = table.binding_count(),
			slots = slots.len(),
			"Created injector"
		);

		Ok(Self {
			inner: Arc::new(InjectorInner {
				table,
				slots,
				settings,
				parent,
			}),
		})
	}

	/// Parent injector, `None` for a root.
	pub fn parent(&self) -> Option<&Injector> {
		self.inner.parent.as_ref()
	}

	/// This injector's own bindings.
	pub fn bindings(&self) -> &Arc<BindingTable> {
		&self.inner.table
	}

	/// This injector's settings.
	pub fn settings(&self) -> &InjectorSettings {
		&self.inner.settings
	}

	/// Looks `token` up in the given mode.
	///
	/// With `lazy` set, nothing is resolved yet: the returned thunk performs
	/// the lookup each time it is invoked.
	pub fn lookup(&self, token: &Token, mode: Mode, lazy: bool) -> DiResult<Lookup> {
		self.lookup_key(registry::identity_of(token), mode, lazy)
	}

	pub(crate) fn lookup_key(&self, key: KeyId, mode: Mode, lazy: bool) -> DiResult<Lookup> {
		if lazy {
			return Ok(Lookup::Deferred(LazyInstance::new(self.clone(), key, mode)));
		}
		match mode {
			Mode::Sync => self.resolve_required(&SyncStrategy, key).map(Lookup::Instance),
			Mode::Async => self.resolve_required(&AsyncStrategy, key).map(Lookup::Computation),
		}
	}

	/// Runs a lookup through an explicit strategy.
	pub fn resolve_with<S: ResolutionStrategy>(&self, strategy: &S, token: &Token) -> DiResult<S::Output> {
		self.resolve_required(strategy, registry::identity_of(token))
	}

	fn resolve_required<S: ResolutionStrategy>(&self, strategy: &S, key: KeyId) -> DiResult<S::Output> {
		self.resolve_key(strategy, key)?
			.ok_or_else(|| DiError::no_provider(key))
	}

	/// Local cache, local bindings, then the ancestors. `None` when no
	/// injector in the chain binds `key`.
	pub(crate) fn resolve_key<S: ResolutionStrategy>(&self, strategy: &S, key: KeyId) -> DiResult<Option<S::Output>> {
		if key == *INJECTOR_KEY {
			return Ok(Some(S::wrap_injector(self)));
		}

		let mut current = self;
		loop {
			if let Some(hit) = strategy.read_cache(current, key)? {
				return Ok(Some(hit));
			}
			if let Some(built) = strategy.instantiate(current, key)? {
				return Ok(Some(built));
			}
			match current.parent() {
				Some(parent) => {
					tracing::trace!(injector = current.label(), key = %key, mode = ?S::MODE, "Delegating to parent");
					current = parent;
				}
				None => return Ok(None),
			}
		}
	}

	/// Async lookup that reports failure through the computation itself.
	pub(crate) fn resolve_key_async(&self, key: KeyId) -> Computation {
		self.resolve_required(&AsyncStrategy, key)
			.unwrap_or_else(Computation::failed)
	}

	/// Resolves `T` synchronously.
	///
	/// # Examples
	///
	/// ```
	/// use grappelli_di::{bind, DiError, Injector};
	///
	/// let injector = Injector::root(bind::<u16>().to_value(8080u16)).unwrap();
	/// assert_eq!(*injector.get::<u16>().unwrap(), 8080);
	/// assert!(matches!(injector.get::<u32>(), Err(DiError::NoProvider { .. })));
	/// ```
	pub fn get<T: Any + Send + Sync>(&self) -> DiResult<Arc<T>> {
		self.get_token::<T>(&Token::of::<T>())
	}

	/// Resolves `token` synchronously and downcasts the value to `T`.
	pub fn get_token<T: Any + Send + Sync>(&self, token: &Token) -> DiResult<Arc<T>> {
		let key = registry::identity_of(token);
		downcast(self.resolve_required(&SyncStrategy, key)?, key)
	}

	/// Resolves `token` synchronously without downcasting.
	pub fn get_any(&self, token: &Token) -> DiResult<AnyInstance> {
		self.resolve_with(&SyncStrategy, token)
	}

	/// Resolves `T` asynchronously.
	///
	/// The lookup (and the start of every construction it needs) happens
	/// before this returns; the future only waits.
	pub fn get_async<T: Any + Send + Sync>(&self) -> BoxFuture<'static, DiResult<Arc<T>>> {
		self.get_async_token::<T>(&Token::of::<T>())
	}

	/// Resolves `token` asynchronously and downcasts the value to `T`.
	pub fn get_async_token<T: Any + Send + Sync>(&self, token: &Token) -> BoxFuture<'static, DiResult<Arc<T>>> {
		let key = registry::identity_of(token);
		self.resolve_key_async(key)
			.map(move |result| result.and_then(|instance| downcast(instance, key)))
			.boxed()
	}

	/// Returns `true` if both handles refer to the same injector.
	pub fn ptr_eq(&self, other: &Injector) -> bool {
		Arc::ptr_eq(&self.inner, &other.inner)
	}

	pub(crate) fn slots(&self) -> &InstanceSlots {
		&self.inner.slots
	}

	pub(crate) fn label(&self) -> &str {
		self.inner.settings.label()
	}

	pub(crate) fn as_instance(&self) -> AnyInstance {
		Arc::new(self.clone())
	}

	pub(crate) fn downgrade(&self) -> WeakInjector {
		WeakInjector(Arc::downgrade(&self.inner))
	}
}

impl fmt::Debug for Injector {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Injector")
			.field("name", &self.inner.settings.name)
			.field("bindings", &self.inner.table.binding_count())
			.field("parent", &self.inner.parent)
			.finish()
	}
}
