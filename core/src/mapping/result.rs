use crate::error::{MapperError, MapperResult};
use crate::types::JdbcType;
use crate::value::ValueType;
use serde::{Deserialize, Serialize};

/// Collection flavours a nested result can be extracted into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
	/// Duplicates removed, first occurrence kept
	Set,
	Deque,
}

/// Declared type of a property receiving a nested query result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
	/// The raw result list
	List,
	Collection(CollectionKind),
	/// Array with an optional primitive element type
	Array(Option<ValueType>),
	/// A single object: zero rows is null, more than one is an error
	#[default]
	Scalar,
}

/// Shape of one result row
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ResultKind {
	/// Property map built from mappings and auto-mapping
	#[default]
	Record,
	/// First column only, optionally coerced
	Scalar(Option<ValueType>),
}

/// Column to pass into a nested select
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NestedColumn {
	Single(String),
	/// `{prop=col,...}` builds a record parameter
	Composite(Vec<(String, String)>),
}

impl NestedColumn {
	pub fn parse(spec: &str) -> MapperResult<Self> {
		let spec = spec.trim();
		let Some(inner) = spec.strip_prefix('{').and_then(|s| s.strip_suffix('}')) else {
			if spec.is_empty() {
				return Err(MapperError::Config("nested select column is empty".into()));
			}
			return Ok(NestedColumn::Single(spec.to_string()));
		};

		let pairs = inner
			.split(',')
			.map(|pair| {
				let (prop, col) = pair.split_once('=').ok_or_else(|| {
					MapperError::Config(format!("malformed composite column '{spec}'"))
				})?;
				let (prop, col) = (prop.trim(), col.trim());
				if prop.is_empty() || col.is_empty() {
					return Err(MapperError::Config(format!("malformed composite column '{spec}'")));
				}
				Ok((prop.to_string(), col.to_string()))
			})
			.collect::<MapperResult<Vec<_>>>()?;

		Ok(NestedColumn::Composite(pairs))
	}

	pub fn columns(&self) -> Vec<&str> {
		match self {
			NestedColumn::Single(c) => vec![c.as_str()],
			NestedColumn::Composite(pairs) => pairs.iter().map(|(_, c)| c.as_str()).collect(),
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct NestedSelect {
	pub statement: String,
	pub column: NestedColumn,
	pub target: TargetType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResultMapping {
	pub property: String,
	pub column: Option<String>,
	pub java_type: Option<ValueType>,
	pub jdbc_type: Option<JdbcType>,
	pub type_handler: Option<String>,
	pub nested_select: Option<NestedSelect>,
}

impl ResultMapping {
	pub fn column(property: &str, column: &str) -> Self {
		Self {
			property: property.to_string(),
			column: Some(column.to_string()),
			java_type: None,
			jdbc_type: None,
			type_handler: None,
			nested_select: None,
		}
	}

	pub fn nested(property: &str, statement: &str, column: &str, target: TargetType) -> MapperResult<Self> {
		Ok(Self {
			property: property.to_string(),
			column: None,
			java_type: None,
			jdbc_type: None,
			type_handler: None,
			nested_select: Some(NestedSelect {
				statement: statement.to_string(),
				column: NestedColumn::parse(column)?,
				target,
			}),
		})
	}

	pub fn with_type(mut self, java_type: ValueType) -> Self {
		self.java_type = Some(java_type);
		self
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResultMap {
	pub id: String,
	pub kind: ResultKind,
	pub mappings: Vec<ResultMapping>,
	/// Map columns no mapping claims onto same-named properties
	pub auto_mapping: bool,
}

impl ResultMap {
	/// Auto-mapped record rows with no explicit mappings
	pub fn auto(id: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			kind: ResultKind::Record,
			mappings: Vec::new(),
			auto_mapping: true,
		}
	}

	pub fn scalar(id: impl Into<String>, ty: Option<ValueType>) -> Self {
		Self {
			id: id.into(),
			kind: ResultKind::Scalar(ty),
			mappings: Vec::new(),
			auto_mapping: false,
		}
	}

	pub fn with_mapping(mut self, mapping: ResultMapping) -> Self {
		self.mappings.push(mapping);
		self
	}

	pub fn nested_selects(&self) -> impl Iterator<Item = (&ResultMapping, &NestedSelect)> {
		self.mappings
			.iter()
			.filter_map(|m| m.nested_select.as_ref().map(|n| (m, n)))
	}

	/// Columns claimed by explicit mappings, upper-cased
	pub fn mapped_columns(&self) -> Vec<String> {
		self.mappings
			.iter()
			.flat_map(|m| {
				let nested = m
					.nested_select
					.as_ref()
					.map(|n| n.column.columns())
					.unwrap_or_default();
				m.column.as_deref().into_iter().chain(nested)
			})
			.map(|c| c.to_ascii_uppercase())
			.collect()
	}
}

/// `user_name` -> `userName`
pub fn underscore_to_camel_case(column: &str) -> String {
	let mut out = String::with_capacity(column.len());
	let mut upper_next = false;
	for (i, ch) in column.chars().enumerate() {
		if ch == '_' {
			upper_next = i > 0;
		} else if upper_next {
			out.extend(ch.to_uppercase());
			upper_next = false;
		} else {
			out.extend(ch.to_lowercase());
		}
	}
	out
}
