use super::token::DOLLAR;
use std::collections::BTreeMap;

/// Build-time `${name}` substitution from configured variables.
///
/// Unknown names are left in place as `${name}` so the text can still be
/// treated as a dynamic fragment at evaluation time.
pub struct PropertyParser<'a> {
	variables: &'a BTreeMap<String, String>,
	default_separator: Option<&'a str>,
}

impl<'a> PropertyParser<'a> {
	pub fn new(variables: &'a BTreeMap<String, String>) -> Self {
		Self {
			variables,
			default_separator: None,
		}
	}

	/// Accept `${key<sep>default}` forms.
	pub fn with_default_values(mut self, separator: &'a str) -> Self {
		self.default_separator = Some(separator);
		self
	}

	pub fn parse(&self, text: &str) -> String {
		// the handler is infallible
		DOLLAR
			.parse(text, |content| Ok(self.resolve(content)))
			.unwrap_or_else(|_| text.to_string())
	}

	fn resolve(&self, content: &str) -> String {
		if let Some(sep) = self.default_separator.filter(|s| !s.is_empty()) {
			if let Some((key, default)) = content.split_once(sep) {
				return self
					.variables
					.get(key)
					.cloned()
					.unwrap_or_else(|| default.to_string());
			}
		}

		match self.variables.get(content) {
			Some(value) => value.clone(),
			None => format!("${{{content}}}"),
		}
	}
}
