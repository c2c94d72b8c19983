//! Raw binding declarations
//!
//! Bindings are declared with [`bind`] (or [`bind_token`]) and finished with
//! one of the `to_*` methods. The heterogeneous input accepted by injectors is
//! a [`RawBinding`]: finished bindings, bare types, nested collections, and
//! (always rejected) unfinished builders.
//!
//! ```
//! use grappelli_di::{bind, bindings, dep, Injector};
//!
//! #[derive(Default)]
//! struct Logger;
//!
//! struct Service {
//!     logger: std::sync::Arc<Logger>,
//! }
//!
//! let injector = Injector::root(bindings![
//!     bind::<Logger>().to_default::<Logger>(),
//!     bind::<Service>().to_factory([dep::<Logger>()], |deps| {
//!         Ok(Service { logger: deps.get::<Logger>(0)? })
//!     }),
//! ])
//! .unwrap();
//!
//! let service = injector.get::<Service>().unwrap();
//! assert!(std::sync::Arc::ptr_eq(&service.logger, &injector.get::<Logger>().unwrap()));
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::computation::AnyInstance;
use crate::dependency::Dependencies;
use crate::error::BoxError;
use crate::token::Token;

pub(crate) type SyncFactoryFn =
	Arc<dyn Fn(&Dependencies) -> Result<AnyInstance, BoxError> + Send + Sync>;
pub(crate) type AsyncFactoryFn =
	Arc<dyn Fn(Dependencies) -> BoxFuture<'static, Result<AnyInstance, BoxError>> + Send + Sync>;

/// How a binding produces its value.
#[derive(Clone)]
pub enum Factory {
	/// Produces the value directly
	Sync(SyncFactoryFn),
	/// Produces the value through an asynchronous computation
	Async(AsyncFactoryFn),
}

impl Factory {
	/// Returns `true` for async-only factories.
	pub fn is_async(&self) -> bool {
		matches!(self, Factory::Async(_))
	}
}

impl fmt::Debug for Factory {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Factory::Sync(_) => f.write_str("Factory::Sync"),
			Factory::Async(_) => f.write_str("Factory::Async"),
		}
	}
}

/// One declared dependency of a binding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DependencySpec {
	pub(crate) token: Token,
	pub(crate) optional: bool,
	pub(crate) lazy: bool,
	pub(crate) force_async: bool,
}

impl DependencySpec {
	/// Dependency on an arbitrary token.
	pub fn token(token: impl Into<Token>) -> Self {
		Self {
			token: token.into(),
			optional: false,
			lazy: false,
			force_async: false,
		}
	}

	/// Resolves to [`Dependency::Absent`](crate::Dependency::Absent) instead
	/// of failing when nothing provides the token.
	pub fn optional(mut self) -> Self {
		self.optional = true;
		self
	}

	/// Injects a thunk that performs the lookup when invoked.
	pub fn lazy(mut self) -> Self {
		self.lazy = true;
		self
	}

	/// Always resolves through the async strategy, even for sync callers.
	pub fn force_async(mut self) -> Self {
		self.force_async = true;
		self
	}

	/// Token this dependency targets.
	pub fn target(&self) -> &Token {
		&self.token
	}
}

/// Dependency on the type `T`.
pub fn dep<T: ?Sized + 'static>() -> DependencySpec {
	DependencySpec::token(Token::of::<T>())
}

/// Types that know how to construct themselves from their dependencies.
///
/// Registering a bare type with [`RawBinding::of`] binds the type to itself
/// using these two functions.
///
/// # Example
///
/// ```
/// use grappelli_di::{dep, BoxError, Dependencies, DependencySpec, Injectable, Injector, RawBinding};
/// use std::sync::Arc;
///
/// #[derive(Default)]
/// struct Pool;
///
/// struct Repository {
///     pool: Arc<Pool>,
/// }
///
/// impl Injectable for Repository {
///     fn dependencies() -> Vec<DependencySpec> {
///         vec![dep::<Pool>()]
///     }
///
///     fn inject(deps: &Dependencies) -> Result<Self, BoxError> {
///         Ok(Repository { pool: deps.get(0)? })
///     }
/// }
///
/// let injector = Injector::root(vec![
///     RawBinding::default_of::<Pool>(),
///     RawBinding::of::<Repository>(),
/// ])
/// .unwrap();
/// assert!(injector.get::<Repository>().is_ok());
/// ```
pub trait Injectable: Sized + Send + Sync + 'static {
	/// Constructor dependencies, in the order `inject` reads them.
	fn dependencies() -> Vec<DependencySpec> {
		Vec::new()
	}

	/// Builds the value.
	fn inject(deps: &Dependencies) -> Result<Self, BoxError>;
}

/// A finished binding: target token, factory and dependencies.
#[derive(Clone)]
pub struct Binding {
	pub(crate) token: Token,
	pub(crate) factory: Factory,
	pub(crate) dependencies: Vec<DependencySpec>,
}

impl Binding {
	/// Token this binding provides.
	pub fn token(&self) -> &Token {
		&self.token
	}

	/// Declared dependencies.
	pub fn dependencies(&self) -> &[DependencySpec] {
		&self.dependencies
	}

	/// Returns `true` when the value is produced asynchronously.
	pub fn is_async(&self) -> bool {
		self.factory.is_async()
	}
}

impl fmt::Debug for Binding {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Binding")
			.field("token", &self.token)
			.field("factory", &self.factory)
			.field("dependencies", &self.dependencies)
			.finish()
	}
}

/// Intermediate builder returned by [`bind`]; must be finished with a `to_*`
/// method before it can be used.
#[derive(Clone, Debug)]
#[must_use = "an unfinished binding is rejected by injectors"]
pub struct BindingBuilder {
	token: Token,
}

/// Starts a binding for the type `T`.
pub fn bind<T: ?Sized + 'static>() -> BindingBuilder {
	bind_token(Token::of::<T>())
}

/// Starts a binding for an arbitrary token.
pub fn bind_token(token: impl Into<Token>) -> BindingBuilder {
	BindingBuilder {
		token: token.into(),
	}
}

impl BindingBuilder {
	/// Token the binding will provide.
	pub fn token(&self) -> &Token {
		&self.token
	}

	/// Binds to a synchronous factory.
	pub fn to_factory<T, F>(self, dependencies: impl IntoIterator<Item = DependencySpec>, factory: F) -> Binding
	where
		T: Send + Sync + 'static,
		F: Fn(&Dependencies) -> Result<T, BoxError> + Send + Sync + 'static,
	{
		self.finish(
			Factory::Sync(Arc::new(
				move |deps: &Dependencies| -> Result<AnyInstance, BoxError> {
					factory(deps).map(|value| Arc::new(value) as AnyInstance)
				},
			)),
			dependencies.into_iter().collect(),
		)
	}

	/// Binds to a factory that produces its value asynchronously.
	///
	/// Such bindings can only be looked up through the async strategy.
	pub fn to_async_factory<T, F, Fut>(
		self,
		dependencies: impl IntoIterator<Item = DependencySpec>,
		factory: F,
	) -> Binding
	where
		T: Send + Sync + 'static,
		F: Fn(Dependencies) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
	{
		self.finish(
			Factory::Async(Arc::new(
				move |deps: Dependencies| -> BoxFuture<'static, Result<AnyInstance, BoxError>> {
					factory(deps)
						.map(|result| result.map(|value| Arc::new(value) as AnyInstance))
						.boxed()
				},
			)),
			dependencies.into_iter().collect(),
		)
	}

	/// Binds to an existing value.
	pub fn to_value<T: Send + Sync + 'static>(self, value: T) -> Binding {
		let instance: AnyInstance = Arc::new(value);
		self.finish(
			Factory::Sync(Arc::new(
				move |_: &Dependencies| -> Result<AnyInstance, BoxError> { Ok(instance.clone()) },
			)),
			Vec::new(),
		)
	}

	/// Re-exposes whatever `existing` resolves to under this binding's token.
	pub fn to_alias(self, existing: impl Into<Token>) -> Binding {
		self.finish(
			Factory::Sync(Arc::new(
				|deps: &Dependencies| -> Result<AnyInstance, BoxError> { Ok(deps.instance(0)?) },
			)),
			vec![DependencySpec::token(existing)],
		)
	}

	/// Binds to an [`Injectable`] type's own constructor.
	pub fn to_type<U: Injectable>(self) -> Binding {
		self.to_factory(U::dependencies(), U::inject)
	}

	/// Binds to `U::default()`.
	pub fn to_default<U: Default + Send + Sync + 'static>(self) -> Binding {
		self.to_factory([], |_| Ok(U::default()))
	}

	fn finish(self, factory: Factory, dependencies: Vec<DependencySpec>) -> Binding {
		Binding {
			token: self.token,
			factory,
			dependencies,
		}
	}
}

/// A bare type registered as "construct me with my own constructor".
#[derive(Clone)]
pub struct TypeBinding {
	token: Token,
	expand: fn() -> Binding,
}

impl TypeBinding {
	/// Token of the bare type.
	pub fn token(&self) -> &Token {
		&self.token
	}

	pub(crate) fn expand(&self) -> Binding {
		(self.expand)()
	}
}

impl fmt::Debug for TypeBinding {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("TypeBinding").field(&self.token).finish()
	}
}

/// Heterogeneous, possibly nested binding input.
#[derive(Clone, Debug)]
pub enum RawBinding {
	/// A finished binding
	Binding(Binding),
	/// A bare type, expanded into a self-binding
	Type(TypeBinding),
	/// A nested collection, flattened in order
	Nested(Vec<RawBinding>),
	/// An unfinished builder; always rejected
	Builder(BindingBuilder),
}

impl RawBinding {
	/// Bare [`Injectable`] type bound to itself.
	pub fn of<T: Injectable>() -> Self {
		RawBinding::Type(TypeBinding {
			token: Token::of::<T>(),
			expand: || bind::<T>().to_type::<T>(),
		})
	}

	/// Bare type bound to itself through `T::default()`.
	pub fn default_of<T: Default + Send + Sync + 'static>() -> Self {
		RawBinding::Type(TypeBinding {
			token: Token::of::<T>(),
			expand: || bind::<T>().to_default::<T>(),
		})
	}

	/// Empty collection.
	pub fn empty() -> Self {
		RawBinding::Nested(Vec::new())
	}
}

impl From<Binding> for RawBinding {
	fn from(binding: Binding) -> Self {
		RawBinding::Binding(binding)
	}
}

impl From<BindingBuilder> for RawBinding {
	fn from(builder: BindingBuilder) -> Self {
		RawBinding::Builder(builder)
	}
}

impl From<TypeBinding> for RawBinding {
	fn from(binding: TypeBinding) -> Self {
		RawBinding::Type(binding)
	}
}

impl<T: Into<RawBinding>> From<Vec<T>> for RawBinding {
	fn from(items: Vec<T>) -> Self {
		RawBinding::Nested(items.into_iter().map(Into::into).collect())
	}
}

impl<T: Into<RawBinding>, const N: usize> From<[T; N]> for RawBinding {
	fn from(items: [T; N]) -> Self {
		RawBinding::Nested(items.into_iter().map(Into::into).collect())
	}
}

impl<T: Into<RawBinding>> FromIterator<T> for RawBinding {
	fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
		RawBinding::Nested(iter.into_iter().map(Into::into).collect())
	}
}

/// Builds a nested [`RawBinding`] from heterogeneous entries.
///
/// ```
/// use grappelli_di::{bind, bindings, RawBinding};
///
/// #[derive(Default)]
/// struct Clock;
///
/// let raw = bindings![
///     RawBinding::default_of::<Clock>(),
///     bind::<u32>().to_value(3u32),
///     bindings![bind::<u64>().to_value(4u64)],
/// ];
/// assert!(matches!(raw, RawBinding::Nested(ref items) if items.len() == 3));
/// ```
#[macro_export]
macro_rules! bindings {
	($($entry:expr),* $(,)?) => {
		$crate::RawBinding::Nested(vec![$($crate::RawBinding::from($entry)),*])
	};
}
