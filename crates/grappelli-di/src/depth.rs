//! Thread-local resolution depth tracking
//!
//! Cycles are caught by the construction markers in the slot arrays; this
//! guard bounds how deep a legitimate dependency chain may recurse before the
//! resolver gives up instead of exhausting the stack.
//!
//! Every nested resolution step runs synchronously on the thread that started
//! it (async lookups only suspend after their dependencies have been issued),
//! so a thread-local counter sees the whole chain.

use std::cell::Cell;

use crate::error::{DiError, DiResult};

/// Default maximum resolution depth
pub const DEFAULT_MAX_RESOLUTION_DEPTH: usize = 100;

thread_local! {
	static RESOLUTION_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// RAII guard: decrements the depth counter on drop.
#[derive(Debug)]
pub(crate) struct DepthGuard(());

impl DepthGuard {
	/// Records one more nested construction, failing past `limit`.
	pub(crate) fn enter(limit: usize) -> DiResult<Self> {
		let depth = RESOLUTION_DEPTH.with(|d| d.get()) + 1;
		if depth > limit {
			return Err(DiError::MaxDepthExceeded(depth));
		}
		RESOLUTION_DEPTH.with(|d| d.set(depth));
		Ok(DepthGuard(()))
	}
}

impl Drop for DepthGuard {
	fn drop(&mut self) {
		RESOLUTION_DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
	}
}

/// Depth of the resolution currently running on this thread.
#[cfg(test)]
pub(crate) fn current() -> usize {
	RESOLUTION_DEPTH.with(|d| d.get())
}
