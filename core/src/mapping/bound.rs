use crate::error::{MapperError, MapperResult};
use crate::types::JdbcType;
use crate::value::{PropertyPath, Value, ValueType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ParameterMode {
	#[default]
	In,
	Out,
	InOut,
}

impl ParameterMode {
	pub fn parse(name: &str) -> Option<Self> {
		match name.trim().to_ascii_uppercase().as_str() {
			"IN" => Some(ParameterMode::In),
			"OUT" => Some(ParameterMode::Out),
			"INOUT" => Some(ParameterMode::InOut),
			_ => None,
		}
	}

	pub fn is_input(&self) -> bool {
		!matches!(self, ParameterMode::Out)
	}

	pub fn is_output(&self) -> bool {
		!matches!(self, ParameterMode::In)
	}
}

impl fmt::Display for ParameterMode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			ParameterMode::In => "IN",
			ParameterMode::Out => "OUT",
			ParameterMode::InOut => "INOUT",
		})
	}
}

/// One `?` marker in compiled SQL and where its value comes from
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterMapping {
	pub property: String,
	pub path: PropertyPath,
	pub mode: ParameterMode,
	pub java_type: Option<ValueType>,
	pub jdbc_type: Option<JdbcType>,
	pub jdbc_type_name: Option<String>,
	pub numeric_scale: Option<u32>,
	pub result_map: Option<String>,
	pub type_handler: Option<String>,
}

impl ParameterMapping {
	pub fn new(property: &str) -> MapperResult<Self> {
		Ok(Self {
			property: property.to_string(),
			path: PropertyPath::parse(property)?,
			mode: ParameterMode::In,
			java_type: None,
			jdbc_type: None,
			jdbc_type_name: None,
			numeric_scale: None,
			result_map: None,
			type_handler: None,
		})
	}
}

/// Compiled statement: SQL with positional markers and ordered bindings.
#[derive(Debug, Clone)]
pub struct BoundSql {
	sql: String,
	parameter_mappings: Vec<ParameterMapping>,
	parameter_object: Value,
	additional_parameters: BTreeMap<String, Value>,
}

impl BoundSql {
	pub fn new(sql: String, parameter_mappings: Vec<ParameterMapping>, parameter_object: Value) -> Self {
		Self {
			sql,
			parameter_mappings,
			parameter_object,
			additional_parameters: BTreeMap::new(),
		}
	}

	pub fn sql(&self) -> &str {
		&self.sql
	}

	pub fn parameter_mappings(&self) -> &[ParameterMapping] {
		&self.parameter_mappings
	}

	pub fn parameter_object(&self) -> &Value {
		&self.parameter_object
	}

	pub fn additional_parameters(&self) -> &BTreeMap<String, Value> {
		&self.additional_parameters
	}

	pub fn set_additional_parameter(&mut self, name: impl Into<String>, value: Value) {
		self.additional_parameters.insert(name.into(), value);
	}

	pub fn has_additional_parameter(&self, path: &PropertyPath) -> bool {
		path.root().is_some_and(|root| self.additional_parameters.contains_key(root))
	}

	/// Resolve the value bound to `mapping`: context bindings by path root
	/// first, then properties of the parameter object, then the parameter
	/// object itself when it has no properties.
	pub fn parameter_value(&self, mapping: &ParameterMapping) -> MapperResult<Value> {
		if let Some(value) = mapping
			.path
			.root()
			.and_then(|root| self.additional_parameters.get(root))
		{
			return match mapping.path.tail() {
				None => Ok(value.clone()),
				Some(tail) => Ok(tail.get(value)?.unwrap_or(Value::Null)),
			};
		}

		match &self.parameter_object {
			Value::Null => Ok(Value::Null),
			Value::Record(_) => mapping.path.get(&self.parameter_object)?.ok_or_else(|| {
				MapperError::Binding(format!(
					"there is no property named '{}' in the parameter object",
					mapping.property
				))
			}),
			scalar => Ok(scalar.clone()),
		}
	}

	/// Values of every input binding, in marker order. Output-only
	/// bindings yield `Null`.
	pub fn parameter_values(&self) -> MapperResult<Vec<Value>> {
		self.parameter_mappings
			.iter()
			.map(|m| {
				if m.mode.is_input() {
					self.parameter_value(m)
				} else {
					Ok(Value::Null)
				}
			})
			.collect()
	}
}
