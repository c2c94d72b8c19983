//! Lookup tokens
//!
//! A [`Token`] is the opaque key an injector resolves. Most bindings are keyed
//! by a Rust type, but explicit named markers are supported for values that
//! have no dedicated type (configuration strings, feature flags, ...).

use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Opaque identity used as a lookup key.
///
/// Type tokens compare by [`TypeId`] only; the stored name exists purely for
/// diagnostics. Named tokens compare by their string.
///
/// # Examples
///
/// ```
/// use grappelli_di::Token;
///
/// struct Database;
///
/// assert_eq!(Token::of::<Database>(), Token::of::<Database>());
/// assert_ne!(Token::of::<Database>(), Token::named("Database"));
/// assert_eq!(Token::named("api.url"), Token::named("api.url"));
/// ```
#[derive(Clone)]
pub enum Token {
	/// A Rust type
	Type {
		/// Identity of the type
		id: TypeId,
		/// `std::any::type_name` of the type
		name: &'static str,
	},
	/// An explicit marker value
	Named(Arc<str>),
}

impl Token {
	/// Token for the type `T`.
	pub fn of<T: ?Sized + 'static>() -> Self {
		Token::Type {
			id: TypeId::of::<T>(),
			name: std::any::type_name::<T>(),
		}
	}

	/// Token for an explicit named marker.
	pub fn named(name: impl Into<Arc<str>>) -> Self {
		Token::Named(name.into())
	}

	/// Human-readable name of the token.
	pub fn name(&self) -> &str {
		match self {
			Token::Type { name, .. } => name,
			Token::Named(name) => name,
		}
	}

	/// Returns `true` if this token names the type `T`.
	pub fn is<T: ?Sized + 'static>(&self) -> bool {
		matches!(self, Token::Type { id, .. } if *id == TypeId::of::<T>())
	}
}

impl PartialEq for Token {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(Token::Type { id: a, .. }, Token::Type { id: b, .. }) => a == b,
			(Token::Named(a), Token::Named(b)) => a == b,
			_ => false,
		}
	}
}

impl Eq for Token {}

impl Hash for Token {
	fn hash<H: Hasher>(&self, state: &mut H) {
		match self {
			Token::Type { id, .. } => {
				state.write_u8(0);
				id.hash(state);
			}
			Token::Named(name) => {
				state.write_u8(1);
				name.hash(state);
			}
		}
	}
}

impl fmt::Display for Token {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

impl fmt::Debug for Token {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Token::Type { name, .. } => write!(f, "Token::Type({name})"),
			Token::Named(name) => write!(f, "Token::Named({name:?})"),
		}
	}
}

impl From<&'static str> for Token {
	fn from(name: &'static str) -> Self {
		Token::named(name)
	}
}
