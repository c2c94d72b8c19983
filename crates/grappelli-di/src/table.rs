//! Flattened, key-indexed binding tables

use std::fmt;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::binding::{Binding, Factory, RawBinding};
use crate::computation::AnyInstance;
use crate::dependency::Dependencies;
use crate::error::{DiError, DiResult};
use crate::registry::{self, KeyId};
use crate::token::Token;

/// A dependency spec with its token resolved to a key-id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DependencyKey {
	/// Target key
	pub key: KeyId,
	/// Absent instead of failing when unprovided
	pub optional: bool,
	/// Injected as a thunk
	pub lazy: bool,
	/// Resolved through the async strategy regardless of the caller
	pub force_async: bool,
}

/// Resolved binding: everything needed to build one key.
pub struct BindingDescriptor {
	key: KeyId,
	factory: Factory,
	dependencies: Vec<DependencyKey>,
}

impl BindingDescriptor {
	fn resolve(binding: Binding) -> Self {
		let dependencies = binding
			.dependencies
			.iter()
			.map(|spec| DependencyKey {
				key: registry::identity_of(&spec.token),
				optional: spec.optional,
				lazy: spec.lazy,
				force_async: spec.force_async,
			})
			.collect();
		Self {
			key: registry::identity_of(&binding.token),
			factory: binding.factory,
			dependencies,
		}
	}

	/// Key this descriptor satisfies.
	pub fn key(&self) -> KeyId {
		self.key
	}

	/// Dependencies, in factory argument order.
	pub fn dependencies(&self) -> &[DependencyKey] {
		&self.dependencies
	}

	/// Returns `true` when the value can only be produced asynchronously.
	pub fn is_async(&self) -> bool {
		self.factory.is_async()
	}

	/// Runs a synchronous factory.
	pub(crate) fn invoke_sync(&self, deps: &Dependencies) -> DiResult<AnyInstance> {
		match &self.factory {
			Factory::Sync(factory) => factory(deps).map_err(|err| DiError::from_factory(self.key, err)),
			Factory::Async(_) => Err(DiError::async_binding(self.key)),
		}
	}

	/// Runs either kind of factory.
	pub(crate) fn invoke(&self, deps: Dependencies) -> BoxFuture<'static, DiResult<AnyInstance>> {
		let key = self.key;
		match &self.factory {
			Factory::Sync(_) => futures::future::ready(self.invoke_sync(&deps)).boxed(),
			Factory::Async(factory) => factory(deps)
				.map(move |result| result.map_err(|err| DiError::from_factory(key, err)))
				.boxed(),
		}
	}
}

impl fmt::Debug for BindingDescriptor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("BindingDescriptor")
			.field("key", &self.key)
			.field("factory", &self.factory)
			.field("dependencies", &self.dependencies)
			.finish()
	}
}

/// Immutable mapping from key-id to binding descriptor.
///
/// # Examples
///
/// ```
/// use grappelli_di::{bind, BindingTable, KeyId};
///
/// let table = BindingTable::build(vec![
///     bind::<u32>().to_value(1u32),
///     bind::<u32>().to_value(2u32),
/// ])
/// .unwrap();
///
/// // Later entries for the same key win
/// assert_eq!(table.binding_count(), 1);
/// assert!(table.get(KeyId::of::<u32>()).is_some());
/// ```
#[derive(Default)]
pub struct BindingTable {
	descriptors: Vec<Option<Arc<BindingDescriptor>>>,
}

impl BindingTable {
	/// Flattens `raw` into a table. Nothing is built if any entry is invalid.
	pub fn build(raw: impl Into<RawBinding>) -> DiResult<Self> {
		let mut flat = Vec::new();
		flatten(raw.into(), &mut flat)?;

		let resolved: Vec<BindingDescriptor> = flat.into_iter().map(BindingDescriptor::resolve).collect();

		// Sized after resolution so every key registered above fits.
		let mut descriptors: Vec<Option<Arc<BindingDescriptor>>> = vec![None; registry::count()];
		for descriptor in resolved {
			let index = descriptor.key.index();
			descriptors[index] = Some(Arc::new(descriptor));
		}

		tracing::trace!(
			capacity = descriptors.len(),
			bindings = descriptors.iter().flatten().count(),
			"Built binding table"
		);
		Ok(Self { descriptors })
	}

	/// Descriptor for `key`; keys allocated after the table was built are absent.
	pub fn get(&self, key: KeyId) -> Option<&Arc<BindingDescriptor>> {
		self.descriptors.get(key.index()).and_then(Option::as_ref)
	}

	/// Returns `true` if the table binds `token`.
	pub fn contains(&self, token: &Token) -> bool {
		self.get(registry::identity_of(token)).is_some()
	}

	/// Number of key positions (the registry size at build time).
	pub fn len(&self) -> usize {
		self.descriptors.len()
	}

	/// Returns `true` if the table has no key positions.
	pub fn is_empty(&self) -> bool {
		self.descriptors.is_empty()
	}

	/// Number of bound keys.
	pub fn binding_count(&self) -> usize {
		self.descriptors.iter().flatten().count()
	}

	/// Bound keys in key-id order.
	pub fn keys(&self) -> impl Iterator<Item = KeyId> + '_ {
		self.descriptors.iter().flatten().map(|descriptor| descriptor.key)
	}
}

impl fmt::Debug for BindingTable {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_list().entries(self.descriptors.iter().flatten()).finish()
	}
}

fn flatten(raw: RawBinding, out: &mut Vec<Binding>) -> DiResult<()> {
	match raw {
		RawBinding::Binding(binding) => out.push(binding),
		RawBinding::Type(ty) => out.push(ty.expand()),
		RawBinding::Nested(items) => {
			for item in items {
				flatten(item, out)?;
			}
		}
		RawBinding::Builder(builder) => {
			return Err(DiError::InvalidBinding(format!(
				"binding for {} was never finished; call to_factory, to_async_factory, to_value, to_alias, to_type or to_default",
				builder.token()
			)));
		}
	}
	Ok(())
}
