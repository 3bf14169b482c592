use crate::error::{MapperError, MapperResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::{
	env, fs,
	path::{Path, PathBuf},
};

/// How long the session cache keeps results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocalCacheScope {
	/// Until commit, rollback, an update or session close
	#[default]
	Session,
	/// Cleared after every top-level statement
	Statement,
}

impl LocalCacheScope {
	pub fn parse(name: &str) -> Option<Self> {
		match name.trim().to_ascii_lowercase().as_str() {
			"session" => Some(LocalCacheScope::Session),
			"statement" => Some(LocalCacheScope::Statement),
			_ => None,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
	/// Use shared caches for statements that declare one
	pub cache_enabled: bool,
	pub local_cache_scope: LocalCacheScope,
	/// Appended to every cache fingerprint when set
	pub environment_id: Option<String>,
	/// Exposed to templates as `_databaseId`
	pub database_id: Option<String>,
	pub map_underscore_to_camel_case: bool,
	/// Build-time `${name}` substitutions
	pub variables: BTreeMap<String, String>,
	/// Allow `${name:default}` in build-time substitution
	pub enable_default_value: bool,
	pub default_value_separator: String,
	/// Values substituted for `${}` at evaluation time must match this
	pub text_injection_filter: Option<String>,
}

impl Default for Settings {
	fn default() -> Self {
		Self {
			cache_enabled: true,
			local_cache_scope: LocalCacheScope::Session,
			environment_id: None,
			database_id: None,
			map_underscore_to_camel_case: false,
			variables: BTreeMap::new(),
			enable_default_value: false,
			default_value_separator: ":".to_string(),
			text_injection_filter: None,
		}
	}
}

impl Settings {
	/// Load settings from a TOML file, with environment variable overrides.
	/// Falls back to defaults if the file is not found. `SQLMAP_CONFIG`
	/// overrides the path.
	pub fn load_from_path<P: AsRef<Path>>(path: P) -> MapperResult<Self> {
		SettingsLoader::from_env().load(path)
	}

	pub fn from_toml(text: &str) -> MapperResult<Self> {
		let settings: Settings = toml::from_str(text)?;
		settings.validate()?;
		Ok(settings)
	}

	/// Compiled `text_injection_filter`
	pub fn injection_filter(&self) -> MapperResult<Option<Regex>> {
		self.text_injection_filter
			.as_deref()
			.map(|pattern| {
				Regex::new(pattern)
					.map_err(|e| MapperError::Config(format!("invalid text_injection_filter: {e}")))
			})
			.transpose()
	}

	fn validate(&self) -> MapperResult<()> {
		if self.enable_default_value && self.default_value_separator.is_empty() {
			return Err(MapperError::Config("default_value_separator must not be empty".into()));
		}
		self.injection_filter().map(|_| ())
	}
}

/// Resolves settings from a file and environment variables.
struct SettingsLoader<F> {
	lookup: F,
}

impl SettingsLoader<fn(&str) -> Option<String>> {
	fn from_env() -> Self {
		Self {
			lookup: |key| env::var(key).ok(),
		}
	}
}

impl<F: Fn(&str) -> Option<String>> SettingsLoader<F> {
	fn load<P: AsRef<Path>>(&self, default_path: P) -> MapperResult<Settings> {
		let path = (self.lookup)("SQLMAP_CONFIG")
			.map(PathBuf::from)
			.unwrap_or_else(|| default_path.as_ref().to_path_buf());

		let mut settings = match fs::read_to_string(&path) {
			Ok(s) => toml::from_str(&s)?,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Settings::default(),
			Err(e) => return Err(e.into()),
		};
		self.apply_env_overrides(&mut settings)?;
		settings.validate()?;
		Ok(settings)
	}

	/// Apply SQLMAP_* environment variable overrides.
	fn apply_env_overrides(&self, settings: &mut Settings) -> MapperResult<()> {
		if let Some(v) = (self.lookup)("SQLMAP_ENVIRONMENT") {
			settings.environment_id = Some(v);
		}

		if let Some(v) = (self.lookup)("SQLMAP_CACHE_ENABLED") {
			settings.cache_enabled = v
				.trim()
				.parse()
				.map_err(|_| MapperError::Config(format!("SQLMAP_CACHE_ENABLED: invalid bool '{v}'")))?;
		}

		if let Some(v) = (self.lookup)("SQLMAP_LOCAL_CACHE_SCOPE") {
			settings.local_cache_scope = LocalCacheScope::parse(&v).ok_or_else(|| {
				MapperError::Config(format!("SQLMAP_LOCAL_CACHE_SCOPE: unknown scope '{v}'"))
			})?;
		}
		Ok(())
	}
}
