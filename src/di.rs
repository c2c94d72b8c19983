//! Dependency injection module.
//!
//! # Examples
//!
//! ```rust
//! # #[cfg(feature = "di")]
//! # {
//! use grappelli::di::{bind, Injector};
//!
//! let injector = Injector::root(bind::<u8>().to_value(3u8)).unwrap();
//! assert_eq!(*injector.get::<u8>().unwrap(), 3);
//! # }
//! ```

#[cfg(feature = "di")]
pub use grappelli_di::*;
