//! Error types for dependency resolution

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::registry::KeyId;

/// Boxed error returned by user factories.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias for resolver operations.
pub type DiResult<T> = Result<T, DiError>;

/// Keys of the constructions that were in progress when an error surfaced.
///
/// Keys are appended frame by frame while the error travels up the
/// construction stack, innermost first. Names are only looked up when the
/// chain is displayed.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ResolutionChain(Vec<KeyId>);

impl ResolutionChain {
	/// Empty chain
	pub fn new() -> Self {
		Self(Vec::new())
	}

	/// Records one more enclosing construction.
	pub fn push(&mut self, key: KeyId) {
		self.0.push(key);
	}

	/// Returns `true` if no construction was in progress.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Keys ordered from the outermost lookup down to the failing key.
	///
	/// `subject` is appended when the innermost frame is not already it.
	pub fn path_to(&self, subject: KeyId) -> Vec<KeyId> {
		let mut path: Vec<KeyId> = self.0.iter().rev().copied().collect();
		if path.last() != Some(&subject) {
			path.push(subject);
		}
		path
	}

	/// Like [`path_to`](Self::path_to), but always closes the loop with
	/// `subject`, so a self-dependency renders as `A -> A`.
	pub fn cycle_to(&self, subject: KeyId) -> Vec<KeyId> {
		let mut path: Vec<KeyId> = self.0.iter().rev().copied().collect();
		path.push(subject);
		path
	}
}

impl fmt::Debug for ResolutionChain {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_list().entries(self.0.iter()).finish()
	}
}

/// Renders `A -> B -> C` for a failing key and its chain.
struct PathDisplay<'a> {
	subject: KeyId,
	chain: &'a ResolutionChain,
	cycle: bool,
}

impl fmt::Display for PathDisplay<'_> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.chain.is_empty() {
			return Ok(());
		}
		let path = if self.cycle {
			self.chain.cycle_to(self.subject)
		} else {
			self.chain.path_to(self.subject)
		};
		f.write_str(" (resolving ")?;
		for (i, key) in path.iter().enumerate() {
			if i > 0 {
				f.write_str(" -> ")?;
			}
			write!(f, "{key}")?;
		}
		f.write_str(")")
	}
}

fn path(subject: &KeyId, chain: &ResolutionChain) -> String {
	PathDisplay {
		subject: *subject,
		chain,
		cycle: false,
	}
	.to_string()
}

fn cycle(subject: &KeyId, chain: &ResolutionChain) -> String {
	PathDisplay {
		subject: *subject,
		chain,
		cycle: true,
	}
	.to_string()
}

/// Source of an `Instantiation` error whose factory panicked.
#[derive(Debug, Clone, thiserror::Error)]
#[error("factory panicked: {0}")]
pub struct FactoryPanic(pub String);

/// Dependency resolution error
///
/// The type is `Clone` so that a failed shared computation can hand the same
/// error to every waiter.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DiError {
	/// Malformed input to binding table construction
	#[error("Invalid binding: {0}")]
	InvalidBinding(String),

	/// No injector in the ancestor chain binds the key
	#[error("No provider for {key}{}", path(key, chain))]
	NoProvider {
		/// Key that could not be provided
		key: KeyId,
		/// Constructions in progress when the lookup failed
		chain: ResolutionChain,
	},

	/// Re-entrant construction of a key
	#[error("Cannot instantiate cyclic dependency {key}{}", cycle(key, chain))]
	CyclicDependency {
		/// Key whose construction was re-entered
		key: KeyId,
		/// Constructions in progress, forming the cycle
		chain: ResolutionChain,
	},

	/// A synchronous lookup reached a binding that only resolves asynchronously
	#[error("Cannot instantiate {key} synchronously: it is provided asynchronously{}", path(key, chain))]
	AsyncBinding {
		/// Key bound to an async provider
		key: KeyId,
		/// Constructions in progress
		chain: ResolutionChain,
	},

	/// The factory itself failed
	#[error("Error during instantiation of {key}: {source}{}", path(key, chain))]
	Instantiation {
		/// Key whose factory failed
		key: KeyId,
		/// Constructions in progress
		chain: ResolutionChain,
		/// The factory's error
		#[source]
		source: Arc<dyn std::error::Error + Send + Sync + 'static>,
	},

	/// Synchronous resolution nested deeper than the configured limit
	#[error(
		"Maximum resolution depth exceeded: {0}\nThis likely indicates an extremely deep dependency chain."
	)]
	MaxDepthExceeded(usize),

	/// A cached instance does not have the requested type
	#[error("Instance for {token} is not a {expected}")]
	TypeMismatch {
		/// Token that was looked up
		token: String,
		/// Requested Rust type
		expected: &'static str,
	},

	/// A factory asked for a dependency position its binding never declared
	#[error("Dependency #{index} requested but only {len} were declared")]
	MissingDependency {
		/// Requested position
		index: usize,
		/// Number of declared dependencies
		len: usize,
	},

	/// Settings document could not be loaded
	#[error("Invalid injector settings: {0}")]
	Settings(String),
}

impl DiError {
	pub(crate) fn no_provider(key: KeyId) -> Self {
		DiError::NoProvider {
			key,
			chain: ResolutionChain::new(),
		}
	}

	pub(crate) fn cyclic(key: KeyId) -> Self {
		DiError::CyclicDependency {
			key,
			chain: ResolutionChain::new(),
		}
	}

	pub(crate) fn async_binding(key: KeyId) -> Self {
		DiError::AsyncBinding {
			key,
			chain: ResolutionChain::new(),
		}
	}

	/// Converts a factory failure into a resolver error.
	///
	/// Factories that bubble up a keyed `DiError` (for example an unsettled
	/// deferred dependency) keep it. Errors without a key, such as a
	/// `TypeMismatch` from reading a dependency, and anything else become
	/// `Instantiation` of `key`.
	pub(crate) fn from_factory(key: KeyId, err: BoxError) -> Self {
		match err.downcast::<DiError>() {
			Ok(di) if di.key().is_some() => *di,
			Ok(di) => Self::instantiation(key, Arc::new(*di)),
			Err(source) => Self::instantiation(key, Arc::from(source)),
		}
	}

	/// A factory panicked while its construction was being awaited.
	pub(crate) fn panicked(key: KeyId, payload: Box<dyn Any + Send>) -> Self {
		let message = payload
			.downcast_ref::<&str>()
			.map(|m| m.to_string())
			.or_else(|| payload.downcast_ref::<String>().cloned())
			.unwrap_or_else(|| "non-string panic payload".to_string());
		tracing::error!(key = %key, panic = %message, "Factory panicked");
		Self::instantiation(key, Arc::new(FactoryPanic(message)))
	}

	fn instantiation(key: KeyId, source: Arc<dyn std::error::Error + Send + Sync + 'static>) -> Self {
		DiError::Instantiation {
			key,
			chain: ResolutionChain::new(),
			source,
		}
	}

	/// Appends the key of the enclosing construction.
	pub fn with_key(mut self, key: KeyId) -> Self {
		if let Some(chain) = self.chain_mut() {
			chain.push(key);
		}
		self
	}

	/// Key the error is about, when it has one.
	pub fn key(&self) -> Option<KeyId> {
		match self {
			DiError::NoProvider { key, .. }
			| DiError::CyclicDependency { key, .. }
			| DiError::AsyncBinding { key, .. }
			| DiError::Instantiation { key, .. } => Some(*key),
			_ => None,
		}
	}

	/// Keys from the outermost lookup down to the failing key.
	///
	/// Empty for errors that are not tied to a key.
	pub fn resolution_path(&self) -> Vec<KeyId> {
		match self {
			DiError::CyclicDependency { key, chain } => chain.cycle_to(*key),
			DiError::NoProvider { key, chain }
			| DiError::AsyncBinding { key, chain }
			| DiError::Instantiation { key, chain, .. } => chain.path_to(*key),
			_ => Vec::new(),
		}
	}

	fn chain_mut(&mut self) -> Option<&mut ResolutionChain> {
		match self {
			DiError::NoProvider { chain, .. }
			| DiError::CyclicDependency { chain, .. }
			| DiError::AsyncBinding { chain, .. }
			| DiError::Instantiation { chain, .. } => Some(chain),
			_ => None,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::token::Token;
	use rstest::rstest;

	fn key(name: &'static str) -> KeyId {
		KeyId::for_token(&Token::named(name))
	}

	#[rstest]
	fn test_cycle_path_is_rendered_outermost_first() {
		// Arrange
		let a = key("error.tests.A");
		let b = key("error.tests.B");

		// Act: B's lookup of A failed, then B's frame and A's frame annotate it
		let err = DiError::cyclic(a).with_key(b).with_key(a);

		// Assert
		assert_eq!(err.resolution_path(), vec![a, b, a]);
		assert_eq!(
			err.to_string(),
			"Cannot instantiate cyclic dependency error.tests.A (resolving error.tests.A -> error.tests.B -> error.tests.A)"
		);
	}

	#[rstest]
	fn test_self_cycle_closes_the_loop() {
		let a = key("error.tests.Self");
		let err = DiError::cyclic(a).with_key(a);
		assert_eq!(err.resolution_path(), vec![a, a]);
	}

	#[rstest]
	fn test_missing_key_is_appended_to_path() {
		// Arrange
		let service = key("error.tests.Service");
		let missing = key("error.tests.Missing");

		// Act
		let err = DiError::no_provider(missing).with_key(service);

		// Assert
		assert_eq!(err.resolution_path(), vec![service, missing]);
	}

	#[rstest]
	fn test_top_level_error_has_no_path_suffix() {
		let err = DiError::no_provider(key("error.tests.Alone"));
		assert_eq!(err.to_string(), "No provider for error.tests.Alone");
	}

	#[rstest]
	fn test_factory_di_errors_are_not_wrapped() {
		// Arrange
		let owner = key("error.tests.Owner");
		let inner = DiError::async_binding(key("error.tests.Deferred"));

		// Act
		let err = DiError::from_factory(owner, Box::new(inner));

		// Assert
		assert!(matches!(err, DiError::AsyncBinding { .. }));
	}

	#[rstest]
	fn test_unkeyed_factory_di_errors_are_wrapped() {
		// Arrange
		let owner = key("error.tests.Reader");
		let inner = DiError::MissingDependency { index: 1, len: 0 };

		// Act
		let err = DiError::from_factory(owner, Box::new(inner));

		// Assert
		assert_eq!(err.key(), Some(owner));
		match &err {
			DiError::Instantiation { source, .. } => assert!(matches!(
				source.downcast_ref::<DiError>(),
				Some(DiError::MissingDependency { index: 1, len: 0 })
			)),
			other => panic!("Expected Instantiation, got {:?}", other),
		}
	}

	#[rstest]
	fn test_panics_become_instantiation() {
		// Arrange
		let owner = key("error.tests.Panicking");

		// Act
		let from_str = DiError::panicked(owner, Box::new("boom"));
		let from_string = DiError::panicked(owner, Box::new(String::from("bang")));

		// Assert
		assert_eq!(from_str.key(), Some(owner));
		assert!(from_str.to_string().contains("factory panicked: boom"));
		assert!(from_string.to_string().contains("factory panicked: bang"));
	}

	#[rstest]
	fn test_foreign_factory_errors_become_instantiation() {
		// Arrange
		let owner = key("error.tests.Failing");
		let source: BoxError = "connection refused".into();

		// Act
		let err = DiError::from_factory(owner, source).with_key(owner);

		// Assert
		match &err {
			DiError::Instantiation { key, source, .. } => {
				assert_eq!(*key, owner);
				assert_eq!(source.to_string(), "connection refused");
			}
			other => panic!("Expected Instantiation, got {:?}", other),
		}
		assert_eq!(err.resolution_path(), vec![owner]);
	}

	#[rstest]
	fn test_settings_errors_ignore_keys() {
		let err = DiError::Settings("bad".into()).with_key(key("error.tests.Ignored"));
		assert!(err.resolution_path().is_empty());
		assert_eq!(err.key(), None);
	}
}
