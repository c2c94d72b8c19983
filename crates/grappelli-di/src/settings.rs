//! Injector settings

use serde::{Deserialize, Serialize};

use crate::depth::DEFAULT_MAX_RESOLUTION_DEPTH;
use crate::error::{DiError, DiResult};

/// Per-injector configuration.
///
/// Child injectors inherit their parent's settings unless created with their
/// own.
///
/// # Examples
///
/// ```
/// use grappelli_di::InjectorSettings;
///
/// let settings = InjectorSettings::from_toml_str(
///     r#"
///     name = "request"
///     max_resolution_depth = 32
///     "#,
/// )
/// .unwrap();
///
/// assert_eq!(settings.name.as_deref(), Some("request"));
/// assert_eq!(settings.max_resolution_depth, 32);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InjectorSettings {
	/// Label used in log output
	pub name: Option<String>,

	/// How many constructions may be nested before resolution is aborted
	pub max_resolution_depth: usize,
}

impl Default for InjectorSettings {
	fn default() -> Self {
		Self {
			name: None,
			max_resolution_depth: DEFAULT_MAX_RESOLUTION_DEPTH,
		}
	}
}

impl InjectorSettings {
	/// Default settings.
	pub fn new() -> Self {
		Self::default()
	}

	/// Sets the log label.
	pub fn with_name(mut self, name: impl Into<String>) -> Self {
		self.name = Some(name.into());
		self
	}

	/// Sets the nesting limit.
	pub fn with_max_resolution_depth(mut self, depth: usize) -> Self {
		self.max_resolution_depth = depth;
		self
	}

	/// Parses settings from a TOML document. Missing keys keep their defaults.
	pub fn from_toml_str(source: &str) -> DiResult<Self> {
		let settings: Self = toml::from_str(source).map_err(|e| DiError::Settings(e.to_string()))?;
		settings.validate()?;
		Ok(settings)
	}

	/// Rejects settings no injector could work with.
	pub fn validate(&self) -> DiResult<()> {
		if self.max_resolution_depth == 0 {
			return Err(DiError::Settings(
				"max_resolution_depth must be at least 1".to_string(),
			));
		}
		Ok(())
	}

	pub(crate) fn label(&self) -> &str {
		self.name.as_deref().unwrap_or("<unnamed>")
	}
}
