//! Synchronous resolution

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::computation::{AnyInstance, Computation};
use crate::depth::DepthGuard;
use crate::dependency::{Dependencies, Dependency, LazyInstance};
use crate::error::{DiError, DiResult};
use crate::injector::{Injector, Mode};
use crate::registry::KeyId;
use crate::slots::Observed;
use crate::table::BindingDescriptor;

use super::{AsyncStrategy, ResolutionStrategy};

/// Builds values on the caller's stack and returns them directly.
#[derive(Clone, Copy, Debug, Default)]
pub struct SyncStrategy;

/// A pending slot can only satisfy a sync caller if its work is already done.
///
/// The computation is never polled here; it belongs to whichever executor
/// awaits it.
fn settled_now(computation: Computation, key: KeyId) -> DiResult<AnyInstance> {
	computation.peek().unwrap_or_else(|| {
		tracing::warn!(key = %key, "Synchronous lookup reached an unsettled async construction");
		Err(DiError::async_binding(key))
	})
}

impl SyncStrategy {
	fn construct(&self, injector: &Injector, descriptor: &BindingDescriptor) -> DiResult<AnyInstance> {
		let _depth = DepthGuard::enter(injector.settings().max_resolution_depth)?;

		let mut entries = Vec::with_capacity(descriptor.dependencies().len());
		for spec in descriptor.dependencies() {
			let dependency = if spec.lazy {
				let mode = if spec.force_async { Mode::Async } else { Mode::Sync };
				Dependency::Lazy(LazyInstance::new(injector.clone(), spec.key, mode))
			} else if spec.force_async {
				match injector.resolve_key(&AsyncStrategy, spec.key)? {
					Some(computation) => Dependency::Deferred(computation),
					None if spec.optional => Dependency::Absent,
					None => return Err(DiError::no_provider(spec.key)),
				}
			} else {
				match injector.resolve_key(self, spec.key)? {
					Some(instance) => Dependency::Instance(instance),
					None if spec.optional => Dependency::Absent,
					None => return Err(DiError::no_provider(spec.key)),
				}
			};
			entries.push((spec.key, dependency));
		}

		descriptor.invoke_sync(&Dependencies::new(entries))
	}
}

impl ResolutionStrategy for SyncStrategy {
	type Output = AnyInstance;

	const MODE: Mode = Mode::Sync;

	fn read_cache(&self, injector: &Injector, key: KeyId) -> DiResult<Option<AnyInstance>> {
		match injector.slots().observe(key) {
			Observed::Empty => Ok(None),
			Observed::Constructing => Err(DiError::cyclic(key)),
			Observed::Pending(computation) => settled_now(computation, key).map(Some),
			Observed::Resolved(instance) => Ok(Some(instance)),
		}
	}

	fn instantiate(&self, injector: &Injector, key: KeyId) -> DiResult<Option<AnyInstance>> {
		let Some(descriptor) = injector.bindings().get(key).cloned() else {
			return Ok(None);
		};
		if descriptor.is_async() {
			return Err(DiError::async_binding(key));
		}

		let claim = loop {
			match injector.slots().claim(key) {
				Ok(claim) => break claim,
				// Cleared by a failed construction on another thread
				Err(Observed::Empty) => continue,
				Err(Observed::Constructing) => return Err(DiError::cyclic(key)),
				Err(Observed::Pending(computation)) => return settled_now(computation, key).map(Some),
				Err(Observed::Resolved(instance)) => return Ok(Some(instance)),
			}
		};

		tracing::trace!(injector = injector.label(), key = %key, "Instantiating");
		match self.construct(injector, &descriptor) {
			Ok(instance) => {
				claim.resolve(instance.clone());
				tracing::trace!(injector = injector.label(), key = %key, "Instantiated");
				Ok(Some(instance))
			}
			Err(err) => {
				drop(claim);
				tracing::debug!(injector = injector.label(), key = %key, error = %err, "Instantiation failed, slot cleared");
				Err(err.with_key(key))
			}
		}
	}

	fn wrap_injector(injector: &Injector) -> AnyInstance {
		injector.as_instance()
	}

	fn settle(output: AnyInstance) -> BoxFuture<'static, DiResult<AnyInstance>> {
		futures::future::ready(Ok(output)).boxed()
	}
}
