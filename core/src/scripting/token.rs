use crate::error::MapperResult;

/// Finds `open ... close` delimited tokens in text and replaces each with
/// the handler's output. A backslash directly before either delimiter
/// escapes it: the backslash is dropped and the delimiter kept literally.
#[derive(Debug, Clone, Copy)]
pub struct TokenParser {
	open: &'static str,
	close: &'static str,
}

/// `${...}` text substitution
pub const DOLLAR: TokenParser = TokenParser::new("${", "}");

/// `#{...}` bound parameter placeholders
pub const HASH: TokenParser = TokenParser::new("#{", "}");

impl TokenParser {
	pub const fn new(open: &'static str, close: &'static str) -> Self {
		Self { open, close }
	}

	pub fn parse<F>(&self, text: &str, handler: F) -> MapperResult<String>
	where
		F: FnMut(&str) -> MapperResult<String>,
	{
		self.scan(text, false, handler)
	}

	/// Like [`TokenParser::parse`], but escaped delimiters keep their
	/// backslash, both outside tokens and inside the content handed to the
	/// handler, so the output can be parsed again.
	pub fn rewrite<F>(&self, text: &str, handler: F) -> MapperResult<String>
	where
		F: FnMut(&str) -> MapperResult<String>,
	{
		self.scan(text, true, handler)
	}

	fn scan<F>(&self, text: &str, keep_escapes: bool, mut handler: F) -> MapperResult<String>
	where
		F: FnMut(&str) -> MapperResult<String>,
	{
		let Some(mut start) = text.find(self.open) else {
			return Ok(text.to_string());
		};

		let mut out = String::with_capacity(text.len());
		let mut offset = 0;

		loop {
			if start > 0 && text[..start].ends_with('\\') {
				let kept = if keep_escapes { start } else { start - 1 };
				out.push_str(&text[offset..kept]);
				out.push_str(self.open);
				offset = start + self.open.len();
			} else {
				out.push_str(&text[offset..start]);
				offset = start + self.open.len();

				let mut expression = String::new();
				let mut closed = false;
				while let Some(rel) = text[offset..].find(self.close) {
					let end = offset + rel;
					if end > offset && text[..end].ends_with('\\') {
						let kept = if keep_escapes { end } else { end - 1 };
						expression.push_str(&text[offset..kept]);
						expression.push_str(self.close);
						offset = end + self.close.len();
					} else {
						expression.push_str(&text[offset..end]);
						offset = end + self.close.len();
						closed = true;
						break;
					}
				}

				if closed {
					out.push_str(&handler(&expression)?);
				} else {
					// unterminated: keep the remainder as-is
					out.push_str(&text[start..]);
					offset = text.len();
				}
			}

			match text[offset..].find(self.open) {
				Some(rel) => start = offset + rel,
				None => break,
			}
		}

		out.push_str(&text[offset..]);
		Ok(out)
	}

	/// True when `text` holds at least one unescaped, terminated token.
	pub fn has_token(&self, text: &str) -> bool {
		let mut found = false;
		// the handler never fails
		let _ = self.parse(text, |content| {
			found = true;
			Ok(content.to_string())
		});
		found
	}
}
