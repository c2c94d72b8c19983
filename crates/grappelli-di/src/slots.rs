//! Per-injector instance slots
//!
//! A thread that finds a key under construction by another thread waits on
//! the slot array's condvar. Before it waits, it records the edge in a
//! process-wide wait-for graph; an edge that would close a loop back to the
//! waiting thread is a cycle split across threads, reported as a re-entry
//! instead of blocking.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, ThreadId};

use once_cell::sync::Lazy;
use parking_lot::{Condvar, Mutex};

use crate::computation::{AnyInstance, Computation};
use crate::registry::KeyId;

/// State of one key in one injector.
#[derive(Clone)]
pub(crate) enum Slot {
	Empty,
	/// Being built on the call stack of the owning thread
	Constructing(ThreadId),
	/// Being built by an in-flight asynchronous computation
	Pending(Computation),
	Resolved(AnyInstance),
}

/// What a caller saw when it looked at a slot.
///
/// Constructions owned by other threads are never observed; the caller waits
/// until they settle instead.
pub(crate) enum Observed {
	Empty,
	/// Re-entered by the thread that is constructing the key, directly or
	/// through threads waiting on each other
	Constructing,
	Pending(Computation),
	Resolved(AnyInstance),
}

/// A blocked thread and the construction it waits for.
struct WaitEdge {
	slots: usize,
	key: KeyId,
	owner: ThreadId,
}

/// Waiting thread -> construction it is blocked on.
static WAITS: Lazy<Mutex<HashMap<ThreadId, WaitEdge>>> = Lazy::new(|| Mutex::new(HashMap::new()));

static NEXT_SLOTS_ID: AtomicUsize = AtomicUsize::new(0);

/// Fixed-size slot array indexed by key-id.
pub(crate) struct InstanceSlots {
	id: usize,
	slots: Mutex<Vec<Slot>>,
	settled: Condvar,
}

impl InstanceSlots {
	/// Creates `len` empty slots.
	pub(crate) fn new(len: usize) -> Self {
		Self {
			id: NEXT_SLOTS_ID.fetch_add(1, Ordering::Relaxed),
			slots: Mutex::new(vec![Slot::Empty; len]),
			settled: Condvar::new(),
		}
	}

	/// Current state of `key`. Keys beyond the array are always empty.
	pub(crate) fn observe(&self, key: KeyId) -> Observed {
		let me = thread::current().id();
		let mut waited = false;
		let mut slots = self.slots.lock();
		let observed = loop {
			match slots.get(key.index()) {
				None | Some(Slot::Empty) => break Observed::Empty,
				Some(Slot::Pending(computation)) => break Observed::Pending(computation.clone()),
				Some(Slot::Resolved(instance)) => break Observed::Resolved(instance.clone()),
				Some(Slot::Constructing(owner)) => {
					if *owner == me || !self.wait_for(me, key, *owner) {
						break Observed::Constructing;
					}
				}
			}
			waited = true;
			self.settled.wait(&mut slots);
		};
		drop(slots);
		if waited {
			WAITS.lock().remove(&me);
		}
		observed
	}

	/// Records that `me` is about to wait for `owner` to finish `key`.
	///
	/// Returns `false` instead when `owner` is, transitively, waiting for `me`.
	fn wait_for(&self, me: ThreadId, key: KeyId, owner: ThreadId) -> bool {
		let mut waits = WAITS.lock();
		let mut current = owner;
		for _ in 0..=waits.len() {
			if current == me {
				tracing::debug!(key = %key, "Construction is waiting on this thread, treating as a cycle");
				return false;
			}
			match waits.get(&current) {
				Some(edge) => current = edge.owner,
				None => break,
			}
		}
		waits.insert(
			me,
			WaitEdge {
				slots: self.id,
				key,
				owner,
			},
		);
		true
	}

	/// Moves `key` from empty to constructing, owned by the current thread.
	///
	/// The returned claim rolls the slot back to empty when dropped, unless it
	/// was settled first. Fails with whatever the slot holds when another
	/// caller got there first.
	pub(crate) fn claim(&self, key: KeyId) -> Result<Claim<'_>, Observed> {
		{
			let mut slots = self.slots.lock();
			if let Some(slot) = slots.get_mut(key.index()) {
				if matches!(slot, Slot::Empty) {
					*slot = Slot::Constructing(thread::current().id());
					return Ok(Claim {
						slots: self,
						key,
						armed: true,
					});
				}
			}
		}
		Err(self.observe(key))
	}

	/// Replaces the construction marker with a pending computation.
	fn install_pending(&self, key: KeyId, computation: Computation) {
		self.update(key, |slot| {
			if matches!(slot, Slot::Constructing(_)) {
				*slot = Slot::Pending(computation);
			}
		});
	}

	/// Stores the finished instance. A resolved slot is never overwritten.
	pub(crate) fn resolve(&self, key: KeyId, instance: AnyInstance) {
		self.update(key, |slot| {
			if !matches!(slot, Slot::Resolved(_)) {
				*slot = Slot::Resolved(instance);
			}
		});
	}

	/// Rolls an unfinished construction back to empty.
	pub(crate) fn clear(&self, key: KeyId) {
		self.update(key, |slot| {
			if matches!(slot, Slot::Constructing(_) | Slot::Pending(_)) {
				*slot = Slot::Empty;
			}
		});
	}

	/// Applies `change` to `key`'s slot, then wakes every waiter.
	fn update(&self, key: KeyId, change: impl FnOnce(&mut Slot)) {
		let mut slots = self.slots.lock();
		if let Some(slot) = slots.get_mut(key.index()) {
			change(slot);
		}
		let mut waits = WAITS.lock();
		if !waits.is_empty() {
			waits.retain(|_, edge| edge.slots != self.id || edge.key != key);
		}
		drop(waits);
		drop(slots);
		self.settled.notify_all();
	}

	/// Number of slots.
	pub(crate) fn len(&self) -> usize {
		self.slots.lock().len()
	}
}

/// Exclusive right to build one key, held by the constructing thread.
///
/// Dropping an unsettled claim (on error or while unwinding from a panicking
/// factory) clears the slot and wakes any waiters.
#[must_use = "dropping a claim rolls the slot back to empty"]
pub(crate) struct Claim<'a> {
	slots: &'a InstanceSlots,
	key: KeyId,
	armed: bool,
}

impl Claim<'_> {
	/// Stores the finished instance.
	pub(crate) fn resolve(mut self, instance: AnyInstance) {
		self.armed = false;
		self.slots.resolve(self.key, instance);
	}

	/// Hands the slot over to an in-flight computation, which settles it.
	pub(crate) fn pend(mut self, computation: Computation) {
		self.armed = false;
		self.slots.install_pending(self.key, computation);
	}
}

impl Drop for Claim<'_> {
	fn drop(&mut self) {
		if self.armed {
			self.slots.clear(self.key);
		}
	}
}
