//! Process-wide token registry.
//!
//! Every distinct [`Token`] is assigned a dense, monotonically increasing
//! [`KeyId`] the first time it is seen. Ids are never reused, so a key-id
//! obtained from one injector indexes the binding table and slot array of any
//! other injector in the process.

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::token::Token;

/// Dense integer identity of a token.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyId(usize);

impl KeyId {
	/// Key-id for the type `T`, allocating one on first use.
	pub fn of<T: ?Sized + 'static>() -> Self {
		identity_of(&Token::of::<T>())
	}

	/// Key-id for an arbitrary token, allocating one on first use.
	pub fn for_token(token: &Token) -> Self {
		identity_of(token)
	}

	/// Position of this key in binding tables and slot arrays.
	pub fn index(self) -> usize {
		self.0
	}

	/// The token this key-id was allocated for.
	pub fn token(self) -> Option<Token> {
		token_of(self)
	}
}

impl fmt::Debug for KeyId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match token_of(*self) {
			Some(token) => write!(f, "KeyId({}: {})", self.0, token),
			None => write!(f, "KeyId({})", self.0),
		}
	}
}

impl fmt::Display for KeyId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match token_of(*self) {
			Some(token) => write!(f, "{token}"),
			None => write!(f, "<key #{}>", self.0),
		}
	}
}

#[derive(Default)]
struct TokenRegistry {
	ids: HashMap<Token, KeyId>,
	tokens: Vec<Token>,
}

/// Global registry. Append-only for the lifetime of the process.
static TOKEN_REGISTRY: Lazy<RwLock<TokenRegistry>> =
	Lazy::new(|| RwLock::new(TokenRegistry::default()));

/// Returns the key-id of `token`, allocating the next id on first sight.
///
/// # Examples
///
/// ```
/// use grappelli_di::{registry, Token};
///
/// let first = registry::identity_of(&Token::named("registry.doc.example"));
/// let again = registry::identity_of(&Token::named("registry.doc.example"));
/// assert_eq!(first, again);
/// assert!(registry::count() > first.index());
/// ```
pub fn identity_of(token: &Token) -> KeyId {
	if let Some(id) = TOKEN_REGISTRY.read().ids.get(token) {
		return *id;
	}

	let mut registry = TOKEN_REGISTRY.write();
	// Another thread may have won the race between the two locks.
	if let Some(id) = registry.ids.get(token) {
		return *id;
	}
	let id = KeyId(registry.tokens.len());
	registry.tokens.push(token.clone());
	registry.ids.insert(token.clone(), id);
	tracing::trace!(key = id.0, token = %token, "Allocated key-id");
	id
}

/// Number of key-ids allocated so far.
pub fn count() -> usize {
	TOKEN_REGISTRY.read().tokens.len()
}

/// Reverse lookup, used by diagnostics.
pub fn token_of(key: KeyId) -> Option<Token> {
	TOKEN_REGISTRY.read().tokens.get(key.0).cloned()
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	struct RegistryProbe;

	#[rstest]
	fn test_identity_is_stable() {
		// Arrange
		let token = Token::of::<RegistryProbe>();

		// Act
		let first = identity_of(&token);
		let second = identity_of(&token);

		// Assert
		assert_eq!(first, second);
		assert_eq!(KeyId::of::<RegistryProbe>(), first);
	}

	#[rstest]
	fn test_new_tokens_grow_count() {
		// Arrange
		let before = count();

		// Act
		let id = identity_of(&Token::named("registry.tests.fresh-token"));

		// Assert
		assert!(id.index() >= before);
		assert!(count() > id.index());
	}

	#[rstest]
	fn test_reverse_lookup() {
		// Arrange
		let token = Token::named("registry.tests.reverse");
		let id = identity_of(&token);

		// Act & Assert
		assert_eq!(token_of(id), Some(token));
		assert_eq!(id.to_string(), "registry.tests.reverse");
	}

	#[rstest]
	fn test_concurrent_registration_yields_one_id() {
		// Arrange
		let token = Token::named("registry.tests.concurrent");

		// Act
		let ids: Vec<KeyId> = std::thread::scope(|scope| {
			let handles: Vec<_> = (0..8)
				.map(|_| scope.spawn(|| identity_of(&token)))
				.collect();
			handles.into_iter().map(|h| h.join().unwrap()).collect()
		});

		// Assert
		assert!(ids.windows(2).all(|w| w[0] == w[1]));
	}
}
