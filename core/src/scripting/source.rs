use super::context::DynamicContext;
use super::node::SqlNode;
use super::token::HASH;
use crate::error::{MapperError, MapperResult};
use crate::mapping::{BoundSql, ParameterMapping, ParameterMode};
use crate::types::JdbcType;
use crate::value::{Value, ValueType};

const VALID_ATTRIBUTES: &str =
	"javaType, jdbcType, mode, numericScale, resultMap, typeHandler, jdbcTypeName, property";

/// Where a statement's SQL comes from
#[derive(Debug, Clone)]
pub enum SqlSource {
	/// No dynamic nodes: `#{}` markers compiled once up front
	Raw {
		sql: String,
		parameter_mappings: Vec<ParameterMapping>,
	},
	/// Re-evaluated for every parameter object
	Dynamic(SqlNode),
}

impl SqlSource {
	/// Compile static SQL text once.
	pub fn raw(sql: &str) -> MapperResult<Self> {
		let (sql, parameter_mappings) = compile(sql)?;
		Ok(SqlSource::Raw {
			sql,
			parameter_mappings,
		})
	}

	/// Raw when the tree has no dynamic nodes, dynamic otherwise.
	pub fn from_node(root: SqlNode) -> MapperResult<Self> {
		if root.is_dynamic() {
			return Ok(SqlSource::Dynamic(root));
		}
		let mut ctx = DynamicContext::new(Value::Null, None);
		root.apply(&mut ctx)?;
		Self::raw(ctx.sql())
	}

	pub fn is_dynamic(&self) -> bool {
		matches!(self, SqlSource::Dynamic(_))
	}

	/// Evaluate against `parameter` and compile to positional markers.
	///
	/// Every input binding is resolved here so a placeholder naming a
	/// missing property fails before anything reaches the backend.
	pub fn bound_sql(&self, parameter: &Value, database_id: Option<&str>) -> MapperResult<BoundSql> {
		let bound = match self {
			SqlSource::Raw {
				sql,
				parameter_mappings,
			} => BoundSql::new(sql.clone(), parameter_mappings.clone(), parameter.clone()),
			SqlSource::Dynamic(root) => {
				let mut ctx = DynamicContext::new(parameter.clone(), database_id);
				root.apply(&mut ctx)?;

				let (text, bindings) = ctx.into_parts();
				let (sql, parameter_mappings) = compile(&text)?;
				let mut bound = BoundSql::new(sql, parameter_mappings, parameter.clone());
				for (name, value) in bindings {
					bound.set_additional_parameter(name, value);
				}
				bound
			}
		};

		bound.parameter_values()?;
		Ok(bound)
	}
}

/// Replace each `#{...}` with `?`, left to right, collecting one mapping
/// per marker.
pub fn compile(text: &str) -> MapperResult<(String, Vec<ParameterMapping>)> {
	let mut mappings = Vec::new();
	let sql = HASH.parse(text, |content| {
		mappings.push(parse_parameter(content)?);
		Ok("?".to_string())
	})?;
	Ok((sql.trim().to_string(), mappings))
}

/// Parse `property[:jdbcType][, attr=value ...]`.
fn parse_parameter(content: &str) -> MapperResult<ParameterMapping> {
	let mut parts = content.split(',');
	let head = parts.next().unwrap_or_default().trim();

	let (property, inline_jdbc) = match head.split_once(':') {
		Some((p, t)) => (p.trim(), Some(t.trim())),
		None => (head, None),
	};

	let mut property = property.to_string();
	let mut attributes = Vec::new();
	if let Some(t) = inline_jdbc {
		attributes.push(("jdbcType".to_string(), t.to_string()));
	}
	for part in parts {
		let (name, value) = part.split_once('=').ok_or_else(|| {
			MapperError::Compile(format!("parsing error in '#{{{content}}}': expected name=value in '{part}'"))
		})?;
		attributes.push((name.trim().to_string(), value.trim().to_string()));
	}
	if let Some((_, value)) = attributes.iter().find(|(name, _)| name == "property") {
		property = value.clone();
	}
	if property.is_empty() {
		return Err(MapperError::Compile(format!("empty property in '#{{{content}}}'")));
	}

	let mut mapping = ParameterMapping::new(&property).map_err(|e| {
		MapperError::Compile(format!("invalid property in '#{{{content}}}': {e}"))
	})?;

	for (name, value) in attributes {
		let invalid = || MapperError::Compile(format!("invalid {name} '{value}' in '#{{{content}}}'"));
		match name.as_str() {
			"javaType" => mapping.java_type = Some(ValueType::parse(&value).ok_or_else(invalid)?),
			"jdbcType" => mapping.jdbc_type = Some(JdbcType::parse(&value).ok_or_else(invalid)?),
			"mode" => mapping.mode = ParameterMode::parse(&value).ok_or_else(invalid)?,
			"numericScale" => mapping.numeric_scale = Some(value.parse().map_err(|_| invalid())?),
			"resultMap" => mapping.result_map = Some(value),
			"typeHandler" => mapping.type_handler = Some(value),
			"jdbcTypeName" => mapping.jdbc_type_name = Some(value),
			"property" => {}
			_ => {
				return Err(MapperError::Compile(format!(
					"an invalid property '{name}' was found in mapping '#{{{content}}}'; valid properties are {VALID_ATTRIBUTES}"
				)));
			}
		}
	}

	Ok(mapping)
}
