use super::{Record, Value};
use crate::error::{MapperError, MapperResult};
use smallvec::SmallVec;
use std::fmt;

/// One step of a property path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
	Name(String),
	Index(usize),
}

/// Parsed property path such as `author.posts[0].title` or `tags['en']`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyPath {
	segments: SmallVec<[PathSegment; 4]>,
}

impl PropertyPath {
	pub fn parse(path: &str) -> MapperResult<Self> {
		let invalid = |msg: &str| MapperError::Binding(format!("invalid property path '{path}': {msg}"));
		let mut segments = SmallVec::new();
		let mut chars = path.trim().chars().peekable();
		let mut name = String::new();

		while let Some(ch) = chars.next() {
			match ch {
				'.' => {
					if name.is_empty() && !matches!(segments.last(), Some(PathSegment::Index(_))) {
						return Err(invalid("empty segment"));
					}
					if !name.is_empty() {
						segments.push(PathSegment::Name(std::mem::take(&mut name)));
					}
				}
				'[' => {
					if !name.is_empty() {
						segments.push(PathSegment::Name(std::mem::take(&mut name)));
					}
					let mut inner = String::new();
					loop {
						match chars.next() {
							Some(']') => break,
							Some(c) => inner.push(c),
							None => return Err(invalid("unclosed '['")),
						}
					}
					let inner = inner.trim();
					if let Some(key) = inner
						.strip_prefix('\'')
						.and_then(|s| s.strip_suffix('\''))
						.or_else(|| inner.strip_prefix('"').and_then(|s| s.strip_suffix('"')))
					{
						segments.push(PathSegment::Name(key.to_string()));
					} else {
						let index = inner.parse().map_err(|_| invalid("bad index"))?;
						segments.push(PathSegment::Index(index));
					}
				}
				c if c.is_whitespace() => return Err(invalid("whitespace")),
				c => name.push(c),
			}
		}

		if !name.is_empty() {
			segments.push(PathSegment::Name(name));
		}
		if segments.is_empty() {
			return Err(invalid("empty path"));
		}

		Ok(Self { segments })
	}

	pub fn from_segments(segments: impl IntoIterator<Item = PathSegment>) -> Self {
		Self {
			segments: segments.into_iter().collect(),
		}
	}

	/// Name before the first `.` or `[`
	pub fn root(&self) -> Option<&str> {
		match self.segments.first() {
			Some(PathSegment::Name(name)) => Some(name),
			_ => None,
		}
	}

	pub fn segments(&self) -> &[PathSegment] {
		&self.segments
	}

	/// Path without its first segment
	pub fn tail(&self) -> Option<PropertyPath> {
		(self.segments.len() > 1).then(|| Self::from_segments(self.segments[1..].iter().cloned()))
	}

	/// Read the value at this path.
	///
	/// `Ok(None)` means a record along the way has no such key. Navigating
	/// into a scalar or past the end of a list is an error.
	pub fn get(&self, root: &Value) -> MapperResult<Option<Value>> {
		get_segments(root, &self.segments, self)
	}

	/// Assign `value` at this path, creating intermediate records as needed.
	pub fn set(&self, root: &Record, value: Value) -> MapperResult<()> {
		let (last, parents) = self
			.segments
			.split_last()
			.ok_or_else(|| MapperError::Binding("empty property path".into()))?;

		let mut current = root.clone();
		for segment in parents {
			let next = match segment {
				PathSegment::Name(name) => match current.get(name) {
					Some(Value::Record(r)) => r,
					Some(Value::Null) | None => {
						let created = Record::new();
						current.set(name.clone(), Value::Record(created.clone()));
						created
					}
					Some(other) => return Err(self.not_navigable(&other)),
				},
				PathSegment::Index(_) => {
					return Err(MapperError::Unsupported(format!(
						"cannot assign through list index in '{self}'"
					)));
				}
			};
			current = next;
		}

		match last {
			PathSegment::Name(name) => {
				current.set(name.clone(), value);
				Ok(())
			}
			PathSegment::Index(_) => Err(MapperError::Unsupported(format!(
				"cannot assign to list index in '{self}'"
			))),
		}
	}

	fn not_navigable(&self, value: &Value) -> MapperError {
		MapperError::Binding(format!(
			"cannot navigate '{self}' through a {} value",
			value.value_type()
		))
	}
}

fn get_segments(
	current: &Value,
	segments: &[PathSegment],
	path: &PropertyPath,
) -> MapperResult<Option<Value>> {
	let Some((first, rest)) = segments.split_first() else {
		return Ok(Some(current.clone()));
	};

	let next = match (current, first) {
		(Value::Record(r), PathSegment::Name(name)) => match r.get(name) {
			Some(v) => v,
			None => return Ok(None),
		},
		(Value::List(items), PathSegment::Index(i)) => items.get(*i).cloned().ok_or_else(|| {
			MapperError::Binding(format!("index {i} out of bounds in '{path}' (len {})", items.len()))
		})?,
		(Value::Null, _) => return Ok(Some(Value::Null)),
		(other, _) => return Err(path.not_navigable(other)),
	};

	get_segments(&next, rest, path)
}

impl fmt::Display for PropertyPath {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for (i, segment) in self.segments.iter().enumerate() {
			match segment {
				PathSegment::Name(name) if i == 0 => f.write_str(name)?,
				PathSegment::Name(name) => write!(f, ".{name}")?,
				PathSegment::Index(idx) => write!(f, "[{idx}]")?,
			}
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_parse_paths() {
		let path = PropertyPath::parse("author.posts[1].title").unwrap();
		assert_eq!(path.root(), Some("author"));
		assert_eq!(path.segments().len(), 4);
		assert_eq!(path.to_string(), "author.posts[1].title");

		let keyed = PropertyPath::parse("tags['en']").unwrap();
		assert_eq!(
			keyed.segments(),
			&[PathSegment::Name("tags".into()), PathSegment::Name("en".into())]
		);

		assert!(PropertyPath::parse("").is_err());
		assert!(PropertyPath::parse("a..b").is_err());
		assert!(PropertyPath::parse("a[x").is_err());
	}

	#[test]
	fn test_get_nested_values() {
		let root = Value::record([(
			"author",
			Value::record([("posts", Value::List(vec![Value::record([("title", "hello".into())])]))]),
		)]);

		let title = PropertyPath::parse("author.posts[0].title").unwrap();
		assert_eq!(title.get(&root).unwrap(), Some(Value::from("hello")));

		let missing = PropertyPath::parse("author.name").unwrap();
		assert_eq!(missing.get(&root).unwrap(), None);

		let out_of_bounds = PropertyPath::parse("author.posts[3]").unwrap();
		assert!(out_of_bounds.get(&root).is_err());

		let through_scalar = PropertyPath::parse("author.posts[0].title.len").unwrap();
		assert!(through_scalar.get(&root).is_err());
	}

	#[test]
	fn test_set_creates_intermediate_records() {
		let root = Record::new();
		PropertyPath::parse("address.city")
			.unwrap()
			.set(&root, "Oslo".into())
			.unwrap();

		let city = PropertyPath::parse("address.city")
			.unwrap()
			.get(&Value::Record(root))
			.unwrap();
		assert_eq!(city, Some(Value::from("Oslo")));
	}
}
