//! Invariants shared by both resolution strategies
//!
//! Every test runs once through `SyncStrategy` and once through
//! `AsyncStrategy`, driven through the `ResolutionStrategy` trait:
//! 1. Cache coherence - a key is built at most once per injector
//! 2. Cycle detection - re-entrant construction fails and leaves no marker
//! 3. Parent delegation - values are cached where they are bound
//! 4. Shadowing - a child binding hides the parent's
//! 5. Failure rollback - a failed construction can be retried
//!
//! The sync-only tests at the end cover rollback after a panicking factory
//! and cycles whose constructions are split across threads.

use grappelli_di::{
	AnyInstance, AsyncStrategy, BoxError, Dependencies, DependencySpec, DiError, DiResult, Injector, KeyId, Mode,
	RawBinding, ResolutionStrategy, SyncStrategy, Token, bind, bind_token, bindings, dep,
};
use rstest::*;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};

async fn settle<S: ResolutionStrategy + Default>(injector: &Injector, token: &Token) -> DiResult<AnyInstance> {
	let output = injector.resolve_with(&S::default(), token)?;
	S::settle(output).await
}

async fn resolve(injector: &Injector, token: &Token, mode: Mode) -> DiResult<AnyInstance> {
	match mode {
		Mode::Sync => settle::<SyncStrategy>(injector, token).await,
		Mode::Async => settle::<AsyncStrategy>(injector, token).await,
	}
}

async fn resolve_as<T: Send + Sync + 'static>(injector: &Injector, mode: Mode) -> DiResult<Arc<T>> {
	let instance = resolve(injector, &Token::of::<T>(), mode).await?;
	Ok(instance.downcast::<T>().expect("instance has the bound type"))
}

struct Logger {
	id: usize,
}

struct Service {
	logger: Arc<Logger>,
}

fn counted_logger(created: Arc<AtomicUsize>) -> grappelli_di::Binding {
	bind::<Logger>().to_factory([], move |_| {
		Ok(Logger {
			id: created.fetch_add(1, Ordering::SeqCst),
		})
	})
}

fn service() -> grappelli_di::Binding {
	bind::<Service>().to_factory([dep::<Logger>()], |deps| {
		Ok(Service {
			logger: deps.get::<Logger>(0)?,
		})
	})
}

#[rstest]
#[case::sync(Mode::Sync)]
#[case::async_(Mode::Async)]
#[tokio::test]
async fn test_repeated_lookups_return_the_same_instance(#[case] mode: Mode) {
	// Arrange
	let created = Arc::new(AtomicUsize::new(0));
	let injector = Injector::root(counted_logger(created.clone())).unwrap();

	// Act
	let first = resolve_as::<Logger>(&injector, mode).await.unwrap();
	let second = resolve_as::<Logger>(&injector, mode).await.unwrap();

	// Assert
	assert!(Arc::ptr_eq(&first, &second));
	assert_eq!(created.load(Ordering::SeqCst), 1);
}

#[rstest]
#[case::sync(Mode::Sync)]
#[case::async_(Mode::Async)]
#[tokio::test]
async fn test_dependencies_share_the_cached_instance(#[case] mode: Mode) {
	// Arrange
	let created = Arc::new(AtomicUsize::new(0));
	let injector = Injector::root(bindings![counted_logger(created.clone()), service()]).unwrap();

	// Act
	let service = resolve_as::<Service>(&injector, mode).await.unwrap();
	let logger = resolve_as::<Logger>(&injector, mode).await.unwrap();

	// Assert
	assert!(Arc::ptr_eq(&service.logger, &logger));
	assert_eq!(created.load(Ordering::SeqCst), 1);
}

#[rstest]
#[case::sync(Mode::Sync)]
#[case::async_(Mode::Async)]
#[tokio::test]
async fn test_cycle_is_detected_with_full_path(#[case] mode: Mode) {
	// Arrange
	let a = Token::named("invariants.cycle.A");
	let b = Token::named("invariants.cycle.B");
	let injector = Injector::root(bindings![
		bind_token(a.clone()).to_factory([DependencySpec::token(b.clone())], |_| Ok(())),
		bind_token(b.clone()).to_factory([DependencySpec::token(a.clone())], |_| Ok(())),
	])
	.unwrap();
	let expected = vec![KeyId::for_token(&a), KeyId::for_token(&b), KeyId::for_token(&a)];

	for _ in 0..2 {
		// Act
		let result = resolve(&injector, &a, mode).await;

		// Assert: the retry walks the whole cycle again, so no marker was left behind
		match result {
			Err(err @ DiError::CyclicDependency { .. }) => {
				assert_eq!(err.resolution_path(), expected);
				assert_eq!(
					err.to_string(),
					"Cannot instantiate cyclic dependency invariants.cycle.A \
					 (resolving invariants.cycle.A -> invariants.cycle.B -> invariants.cycle.A)"
				);
			}
			other => panic!("Expected CyclicDependency, got {:?}", other.map(|_| ())),
		}
	}
}

#[rstest]
#[case::sync(Mode::Sync)]
#[case::async_(Mode::Async)]
#[tokio::test]
async fn test_self_dependency_is_a_cycle(#[case] mode: Mode) {
	// Arrange
	let token = Token::named("invariants.cycle.Self");
	let injector = Injector::root(
		bind_token(token.clone()).to_factory([DependencySpec::token(token.clone())], |_| Ok(())),
	)
	.unwrap();

	// Act
	let result = resolve(&injector, &token, mode).await;

	// Assert
	let key = KeyId::for_token(&token);
	match result {
		Err(err @ DiError::CyclicDependency { .. }) => assert_eq!(err.resolution_path(), vec![key, key]),
		other => panic!("Expected CyclicDependency, got {:?}", other.map(|_| ())),
	}
}

#[rstest]
#[case::sync(Mode::Sync)]
#[case::async_(Mode::Async)]
#[tokio::test]
async fn test_values_are_cached_in_the_defining_injector(#[case] mode: Mode) {
	// Arrange
	let created = Arc::new(AtomicUsize::new(0));
	let root = Injector::root(counted_logger(created.clone())).unwrap();
	let left = root.create_child(service()).unwrap();
	let right = root.create_child(service()).unwrap();

	// Act
	let from_left = resolve_as::<Service>(&left, mode).await.unwrap();
	let from_right = resolve_as::<Service>(&right, mode).await.unwrap();
	let from_root = resolve_as::<Logger>(&root, mode).await.unwrap();

	// Assert: one logger at the root, one service per child
	assert!(Arc::ptr_eq(&from_left.logger, &from_root));
	assert!(Arc::ptr_eq(&from_right.logger, &from_root));
	assert!(!Arc::ptr_eq(&from_left, &from_right));
	assert_eq!(created.load(Ordering::SeqCst), 1);
	assert!(matches!(
		resolve_as::<Service>(&root, mode).await,
		Err(DiError::NoProvider { .. })
	));
}

#[rstest]
#[case::sync(Mode::Sync)]
#[case::async_(Mode::Async)]
#[tokio::test]
async fn test_child_binding_shadows_parent(#[case] mode: Mode) {
	// Arrange
	let root = Injector::root(bind::<Logger>().to_value(Logger { id: 1 })).unwrap();
	let child = root.create_child(bind::<Logger>().to_value(Logger { id: 2 })).unwrap();
	let grandchild = child.create_child(RawBinding::empty()).unwrap();

	// Act
	let from_root = resolve_as::<Logger>(&root, mode).await.unwrap();
	let from_child = resolve_as::<Logger>(&child, mode).await.unwrap();
	let from_grandchild = resolve_as::<Logger>(&grandchild, mode).await.unwrap();

	// Assert
	assert_eq!(from_root.id, 1);
	assert_eq!(from_child.id, 2);
	assert!(Arc::ptr_eq(&from_child, &from_grandchild));
}

#[rstest]
#[case::sync(Mode::Sync)]
#[case::async_(Mode::Async)]
#[tokio::test]
async fn test_missing_dependency_names_the_chain(#[case] mode: Mode) {
	// Arrange
	let injector = Injector::root(service()).unwrap();

	// Act
	let result = resolve_as::<Service>(&injector, mode).await;

	// Assert
	match result {
		Err(err @ DiError::NoProvider { .. }) => {
			assert_eq!(err.key(), Some(KeyId::of::<Logger>()));
			assert_eq!(err.resolution_path(), vec![KeyId::of::<Service>(), KeyId::of::<Logger>()]);
		}
		other => panic!("Expected NoProvider, got {:?}", other.map(|_| ())),
	}
}

#[rstest]
#[case::sync(Mode::Sync)]
#[case::async_(Mode::Async)]
#[tokio::test]
async fn test_failed_factory_can_be_retried(#[case] mode: Mode) {
	// Arrange
	let attempts = Arc::new(AtomicUsize::new(0));
	let counter = attempts.clone();
	let token = Token::named("invariants.flaky");
	let injector = Injector::root(bind_token(token.clone()).to_factory([], move |_| {
		if counter.fetch_add(1, Ordering::SeqCst) == 0 {
			return Err("first attempt fails".into());
		}
		Ok(7u8)
	}))
	.unwrap();

	// Act
	let first = resolve(&injector, &token, mode).await;
	let second = resolve(&injector, &token, mode).await;

	// Assert
	match first {
		Err(DiError::Instantiation { key, source, .. }) => {
			assert_eq!(key, KeyId::for_token(&token));
			assert_eq!(source.to_string(), "first attempt fails");
		}
		other => panic!("Expected Instantiation, got {:?}", other.map(|_| ())),
	}
	assert_eq!(*second.unwrap().downcast::<u8>().unwrap(), 7);
	assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[rstest]
#[case::sync(Mode::Sync)]
#[case::async_(Mode::Async)]
#[tokio::test]
async fn test_injector_token_resolves_to_the_asking_injector(#[case] mode: Mode) {
	// Arrange
	let root = Injector::root(RawBinding::empty()).unwrap();
	let child = root.create_child(RawBinding::empty()).unwrap();

	// Act
	let resolved = resolve_as::<Injector>(&child, mode).await.unwrap();

	// Assert
	assert!(resolved.ptr_eq(&child));
	assert!(!resolved.ptr_eq(&root));
}

#[rstest]
fn test_sync_cycle_rolls_back_so_fixed_graph_resolves() {
	// Arrange: B reaches back to A only while the switch is on
	let cyclic = Arc::new(std::sync::atomic::AtomicBool::new(true));
	let switch = cyclic.clone();
	let a = Token::named("invariants.rollback.A");
	let b = Token::named("invariants.rollback.B");
	let injector = Injector::root(bindings![
		bind_token(a.clone()).to_factory([DependencySpec::token(b.clone())], |_| Ok("a")),
		bind_token(b.clone()).to_factory(
			[DependencySpec::token(a.clone()).lazy()],
			move |deps| {
				if switch.load(Ordering::SeqCst) {
					deps.lazy(0)?.instance()?;
				}
				Ok("b")
			},
		),
	])
	.unwrap();

	// Act
	let broken = injector.get_token::<&str>(&a);
	cyclic.store(false, Ordering::SeqCst);
	let fixed = injector.get_token::<&str>(&a);

	// Assert
	match broken {
		Err(err @ DiError::CyclicDependency { .. }) => assert_eq!(
			err.resolution_path(),
			vec![KeyId::for_token(&a), KeyId::for_token(&b), KeyId::for_token(&a)]
		),
		other => panic!("Expected CyclicDependency, got {:?}", other.map(|_| ())),
	}
	assert_eq!(*fixed.unwrap(), "a");
}

#[rstest]
fn test_panicking_factory_releases_its_slot() {
	// Arrange
	let attempts = Arc::new(AtomicUsize::new(0));
	let counter = attempts.clone();
	let token = Token::named("invariants.panicky");
	let injector = Injector::root(bind_token(token.clone()).to_factory([], move |_| {
		if counter.fetch_add(1, Ordering::SeqCst) == 0 {
			panic!("first attempt panics");
		}
		Ok(3u8)
	}))
	.unwrap();

	// Act
	let first = std::panic::catch_unwind(AssertUnwindSafe(|| injector.get_token::<u8>(&token)));
	let from_other_thread = {
		let injector = injector.clone();
		let token = token.clone();
		std::thread::spawn(move || injector.get_token::<u8>(&token).map(|value| *value))
			.join()
			.unwrap()
	};
	let again = injector.get_token::<u8>(&token);

	// Assert
	assert!(first.is_err());
	assert_eq!(from_other_thread.unwrap(), 3);
	assert_eq!(*again.unwrap(), 3);
	assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[rstest]
fn test_cycle_split_across_threads_is_detected() {
	// Arrange: each factory waits until both keys are claimed, on separate
	// threads, before reaching for the other one
	let a = Token::named("invariants.crossed.A");
	let b = Token::named("invariants.crossed.B");
	let barrier = Arc::new(Barrier::new(2));
	let crossing = || {
		let barrier = barrier.clone();
		let first = AtomicBool::new(true);
		move |deps: &Dependencies| -> Result<&'static str, BoxError> {
			if first.swap(false, Ordering::SeqCst) {
				barrier.wait();
			}
			deps.lazy(0)?.instance()?;
			Ok("built")
		}
	};
	let injector = Injector::root(bindings![
		bind_token(a.clone()).to_factory([DependencySpec::token(b.clone()).lazy()], crossing()),
		bind_token(b.clone()).to_factory([DependencySpec::token(a.clone()).lazy()], crossing()),
	])
	.unwrap();
	let spawn = |token: Token| {
		let injector = injector.clone();
		std::thread::spawn(move || injector.get_any(&token).map(|_| ()))
	};

	// Act
	let left = spawn(a.clone());
	let right = spawn(b.clone());
	let results = [left.join().unwrap(), right.join().unwrap()];

	// Assert: neither thread blocks forever, both see the cycle
	for result in results {
		match result {
			Err(DiError::CyclicDependency { .. }) => {}
			other => panic!("Expected CyclicDependency, got {:?}", other),
		}
	}
}
