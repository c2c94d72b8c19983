//! Shared asynchronous computations
//!
//! A [`Computation`] is the handle stored in a pending slot. Cloning it yields
//! another handle to the *same* in-flight work, so every concurrent caller of
//! an async lookup awaits one construction.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::{BoxFuture, FutureExt, Shared};

use crate::error::{DiError, DiResult};

/// Type-erased resolved value.
pub type AnyInstance = Arc<dyn std::any::Any + Send + Sync>;

enum ComputationInner {
	/// Known result; never needs polling
	Settled(DiResult<AnyInstance>),
	Running(Shared<BoxFuture<'static, DiResult<AnyInstance>>>),
}

impl Clone for ComputationInner {
	fn clone(&self) -> Self {
		match self {
			ComputationInner::Settled(result) => ComputationInner::Settled(result.clone()),
			ComputationInner::Running(shared) => ComputationInner::Running(shared.clone()),
		}
	}
}

/// Awaitable, cloneable unit of resolution work.
///
/// # Examples
///
/// ```
/// use grappelli_di::Computation;
/// use std::sync::Arc;
///
/// # futures::executor::block_on(async {
/// let done = Computation::ready(Arc::new(7u32));
/// let value = done.clone().await.unwrap();
/// assert_eq!(*value.downcast::<u32>().unwrap(), 7);
/// # });
/// ```
#[derive(Clone)]
pub struct Computation(ComputationInner);

impl Computation {
	/// Wraps a future; the work starts when the first handle is polled.
	pub fn new<F>(future: F) -> Self
	where
		F: Future<Output = DiResult<AnyInstance>> + Send + 'static,
	{
		Self(ComputationInner::Running(future.boxed().shared()))
	}

	/// Already-complete computation holding `value`.
	pub fn ready(value: AnyInstance) -> Self {
		Self(ComputationInner::Settled(Ok(value)))
	}

	/// Already-failed computation.
	pub fn failed(error: DiError) -> Self {
		Self(ComputationInner::Settled(Err(error)))
	}

	/// Result, if the computation has already settled.
	///
	/// Never polls: unfinished work is only driven by whoever awaits it.
	pub fn peek(&self) -> Option<DiResult<AnyInstance>> {
		match &self.0 {
			ComputationInner::Settled(result) => Some(result.clone()),
			ComputationInner::Running(shared) => shared.peek().cloned(),
		}
	}

	/// Returns `true` if both handles refer to the same work.
	pub fn ptr_eq(&self, other: &Computation) -> bool {
		match (&self.0, &other.0) {
			(ComputationInner::Running(a), ComputationInner::Running(b)) => a.ptr_eq(b),
			(ComputationInner::Settled(Ok(a)), ComputationInner::Settled(Ok(b))) => Arc::ptr_eq(a, b),
			_ => false,
		}
	}
}

impl Future for Computation {
	type Output = DiResult<AnyInstance>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		match &mut self.0 {
			ComputationInner::Settled(result) => Poll::Ready(result.clone()),
			ComputationInner::Running(shared) => Pin::new(shared).poll(cx),
		}
	}
}

impl fmt::Debug for Computation {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let state = match self.peek() {
			Some(Ok(_)) => "resolved",
			Some(Err(_)) => "failed",
			None => "pending",
		};
		f.debug_tuple("Computation").field(&state).finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::registry::KeyId;
	use rstest::rstest;

	#[rstest]
	#[tokio::test]
	async fn test_clones_share_one_execution() {
		// Arrange
		let runs = Arc::new(std::sync::atomic::AtomicUsize::new(0));
		let counter = runs.clone();
		let computation = Computation::new(async move {
			counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
			Ok(Arc::new("shared") as AnyInstance)
		});
		let other = computation.clone();

		// Act
		let (a, b) = futures::join!(computation.clone(), other.clone());

		// Assert
		assert!(computation.ptr_eq(&other));
		assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
		assert_eq!(runs.load(std::sync::atomic::Ordering::SeqCst), 1);
	}

	#[rstest]
	fn test_ready_computations_are_settled_without_polling() {
		// Arrange
		let value: AnyInstance = Arc::new(1u8);

		// Act
		let ready = Computation::ready(value.clone());

		// Assert
		assert!(matches!(ready.peek(), Some(Ok(v)) if Arc::ptr_eq(&v, &value)));
		assert!(ready.ptr_eq(&Computation::ready(value)));
		assert_eq!(format!("{:?}", ready), "Computation(\"resolved\")");
	}

	#[rstest]
	fn test_peek_does_not_drive_unfinished_work() {
		// Arrange
		let polled = Arc::new(std::sync::atomic::AtomicBool::new(false));
		let flag = polled.clone();
		let computation = Computation::new(async move {
			flag.store(true, std::sync::atomic::Ordering::SeqCst);
			Ok(Arc::new(1u8) as AnyInstance)
		});

		// Act
		let peeked = computation.peek();

		// Assert
		assert!(peeked.is_none());
		assert!(!polled.load(std::sync::atomic::Ordering::SeqCst));
		assert_eq!(format!("{:?}", computation), "Computation(\"pending\")");
	}

	#[rstest]
	#[tokio::test]
	async fn test_peek_sees_awaited_result() {
		// Arrange
		let computation = Computation::new(async { Ok(Arc::new(2u8) as AnyInstance) });

		// Act
		computation.clone().await.unwrap();

		// Assert
		assert!(matches!(computation.peek(), Some(Ok(_))));
	}

	#[rstest]
	#[tokio::test]
	async fn test_failed_computation_replays_error() {
		// Arrange
		let key = KeyId::for_token(&crate::Token::named("computation.tests.failed"));
		let computation = Computation::failed(DiError::no_provider(key));

		// Act
		let first = computation.clone().await;
		let second = computation.await;

		// Assert
		assert!(matches!(first, Err(DiError::NoProvider { .. })));
		assert!(matches!(second, Err(DiError::NoProvider { .. })));
	}
}
