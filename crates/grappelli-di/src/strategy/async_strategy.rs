//! Asynchronous resolution
//!
//! Dependencies are looked up (and their constructions started) on the
//! caller's stack, so cycles are still caught by the construction markers.
//! Only the waiting and the factory call itself happen inside the returned
//! computation, which is parked in the slot as a pending marker until it
//! settles.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

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

use super::ResolutionStrategy;

/// Returns shared computations; concurrent callers of one key await a single
/// construction.
#[derive(Clone, Copy, Debug, Default)]
pub struct AsyncStrategy;

/// Settled pending computations are handed out as fresh ready ones.
fn pending_or_ready(computation: Computation) -> Computation {
	match computation.peek() {
		Some(Ok(instance)) => Computation::ready(instance),
		_ => computation,
	}
}

/// A dependency whose lookup has been issued but may not have settled.
enum Issued {
	Ready(Dependency),
	Awaiting(Computation),
}

impl AsyncStrategy {
	fn issue(&self, injector: &Injector, descriptor: &BindingDescriptor) -> DiResult<Vec<(KeyId, Issued)>> {
		let _depth = DepthGuard::enter(injector.settings().max_resolution_depth)?;

		descriptor
			.dependencies()
			.iter()
			.map(|spec| {
				let issued = if spec.lazy {
					Issued::Ready(Dependency::Lazy(LazyInstance::new(
						injector.clone(),
						spec.key,
						Mode::Async,
					)))
				} else {
					match injector.resolve_key(self, spec.key)? {
						Some(computation) => Issued::Awaiting(computation),
						None if spec.optional => Issued::Ready(Dependency::Absent),
						None => return Err(DiError::no_provider(spec.key)),
					}
				};
				Ok((spec.key, issued))
			})
			.collect()
	}
}

async fn run(
	descriptor: Arc<BindingDescriptor>,
	issued: Vec<(KeyId, Issued)>,
) -> DiResult<AnyInstance> {
	let entries = futures::future::try_join_all(issued.into_iter().map(|(key, issued)| async move {
		let dependency = match issued {
			Issued::Ready(dependency) => dependency,
			Issued::Awaiting(computation) => Dependency::Instance(computation.await?),
		};
		Ok::<_, DiError>((key, dependency))
	}))
	.await?;

	descriptor.invoke(Dependencies::new(entries)).await
}

impl ResolutionStrategy for AsyncStrategy {
	type Output = Computation;

	const MODE: Mode = Mode::Async;

	fn read_cache(&self, injector: &Injector, key: KeyId) -> DiResult<Option<Computation>> {
		match injector.slots().observe(key) {
			Observed::Empty => Ok(None),
			Observed::Constructing => Err(DiError::cyclic(key)),
			Observed::Pending(computation) => Ok(Some(pending_or_ready(computation))),
			Observed::Resolved(instance) => Ok(Some(Computation::ready(instance))),
		}
	}

	fn instantiate(&self, injector: &Injector, key: KeyId) -> DiResult<Option<Computation>> {
		let Some(descriptor) = injector.bindings().get(key).cloned() else {
			return Ok(None);
		};

		let claim = loop {
			match injector.slots().claim(key) {
				Ok(claim) => break claim,
				Err(Observed::Empty) => continue,
				Err(Observed::Constructing) => return Err(DiError::cyclic(key)),
				Err(Observed::Pending(computation)) => return Ok(Some(computation)),
				Err(Observed::Resolved(instance)) => return Ok(Some(Computation::ready(instance))),
			}
		};

		let issued = match self.issue(injector, &descriptor) {
			Ok(issued) => issued,
			Err(err) => {
				drop(claim);
				tracing::debug!(injector = injector.label(), key = %key, error = %err, "Dependency lookup failed, slot cleared");
				return Err(err.with_key(key));
			}
		};

		tracing::trace!(injector = injector.label(), key = %key, "Scheduling instantiation");
		let owner = injector.downgrade();
		let computation = Computation::new(async move {
			// Panics settle as errors; the shared handle is never poisoned
			let result = AssertUnwindSafe(run(descriptor, issued))
				.catch_unwind()
				.await
				.unwrap_or_else(|payload| Err(DiError::panicked(key, payload)))
				.map_err(|err| err.with_key(key));
			if let Some(owner) = owner.upgrade() {
				match &result {
					Ok(instance) => {
						owner.slots().resolve(key, instance.clone());
						tracing::trace!(injector = owner.label(), key = %key, "Instantiated");
					}
					Err(err) => {
						owner.slots().clear(key);
						tracing::debug!(injector = owner.label(), key = %key, error = %err, "Instantiation failed, slot cleared");
					}
				}
			}
			result
		});
		claim.pend(computation.clone());
		Ok(Some(computation))
	}

	fn wrap_injector(injector: &Injector) -> Computation {
		Computation::ready(injector.as_instance())
	}

	fn settle(output: Computation) -> BoxFuture<'static, DiResult<AnyInstance>> {
		output.boxed()
	}
}
