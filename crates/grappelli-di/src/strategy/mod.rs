//! Resolution strategies
//!
//! A strategy decides how one injector reads its slot array and builds
//! missing values. [`SyncStrategy`] returns instances directly;
//! [`AsyncStrategy`] returns shared [`Computation`](crate::Computation)s. Both honor the same
//! cycle-detection and caching rules, so generic code (and tests) can run
//! against either.

mod async_strategy;
mod sync_strategy;

pub use async_strategy::AsyncStrategy;
pub use sync_strategy::SyncStrategy;

use futures::future::BoxFuture;

use crate::computation::AnyInstance;
use crate::error::DiResult;
use crate::injector::{Injector, Mode};
use crate::registry::KeyId;

/// One of the two interchangeable lookup algorithms.
pub trait ResolutionStrategy: Send + Sync {
	/// What a successful lookup yields
	type Output: Clone + Send + 'static;

	/// Mode this strategy implements
	const MODE: Mode;

	/// Cached value for `key`, `None` on a miss.
	fn read_cache(&self, injector: &Injector, key: KeyId) -> DiResult<Option<Self::Output>>;

	/// Builds `key` from the injector's own bindings; `None` when the injector
	/// has no binding for it.
	fn instantiate(&self, injector: &Injector, key: KeyId) -> DiResult<Option<Self::Output>>;

	/// The injector itself, as this strategy's output.
	fn wrap_injector(injector: &Injector) -> Self::Output;

	/// Waits for an output to become an instance.
	fn settle(output: Self::Output) -> BoxFuture<'static, DiResult<AnyInstance>>;
}
