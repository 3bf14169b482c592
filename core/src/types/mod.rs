//! Conversion between mapper [`Value`]s and backend-native [`SqlValue`]s

use crate::error::{MapperError, MapperResult};
use crate::value::{Value, ValueType};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A value as the backend sees it
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
	Null,
	Boolean(bool),
	BigInt(i64),
	Double(f64),
	Varchar(String),
	Blob(Vec<u8>),
	Timestamp(NaiveDateTime),
	Array(Vec<SqlValue>),
}

impl SqlValue {
	pub fn type_name(&self) -> &'static str {
		match self {
			SqlValue::Null => "NULL",
			SqlValue::Boolean(_) => "BOOLEAN",
			SqlValue::BigInt(_) => "BIGINT",
			SqlValue::Double(_) => "DOUBLE",
			SqlValue::Varchar(_) => "VARCHAR",
			SqlValue::Blob(_) => "BLOB",
			SqlValue::Timestamp(_) => "TIMESTAMP",
			SqlValue::Array(_) => "ARRAY",
		}
	}
}

impl fmt::Display for SqlValue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SqlValue::Null => f.write_str("null"),
			SqlValue::Boolean(b) => write!(f, "{b}"),
			SqlValue::BigInt(i) => write!(f, "{i}"),
			SqlValue::Double(d) => write!(f, "{d}"),
			SqlValue::Varchar(s) => f.write_str(s),
			SqlValue::Blob(b) => write!(f, "<{} bytes>", b.len()),
			SqlValue::Timestamp(ts) => write!(f, "{}", ts.format(crate::value::TIMESTAMP_FORMAT)),
			SqlValue::Array(items) => {
				f.write_str("[")?;
				for (i, item) in items.iter().enumerate() {
					if i > 0 {
						f.write_str(", ")?;
					}
					write!(f, "{item}")?;
				}
				f.write_str("]")
			}
		}
	}
}

/// Declared backend column/parameter type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JdbcType {
	Boolean,
	TinyInt,
	SmallInt,
	Integer,
	BigInt,
	Float,
	Double,
	Numeric,
	Decimal,
	Char,
	Varchar,
	LongVarchar,
	Clob,
	Binary,
	Blob,
	Date,
	Timestamp,
	Array,
	Other,
	Null,
}

impl JdbcType {
	pub fn parse(name: &str) -> Option<Self> {
		let ty = match name.trim().to_ascii_uppercase().as_str() {
			"BOOLEAN" | "BIT" => JdbcType::Boolean,
			"TINYINT" => JdbcType::TinyInt,
			"SMALLINT" => JdbcType::SmallInt,
			"INTEGER" | "INT" => JdbcType::Integer,
			"BIGINT" => JdbcType::BigInt,
			"FLOAT" | "REAL" => JdbcType::Float,
			"DOUBLE" => JdbcType::Double,
			"NUMERIC" => JdbcType::Numeric,
			"DECIMAL" => JdbcType::Decimal,
			"CHAR" => JdbcType::Char,
			"VARCHAR" => JdbcType::Varchar,
			"LONGVARCHAR" => JdbcType::LongVarchar,
			"CLOB" => JdbcType::Clob,
			"BINARY" | "VARBINARY" => JdbcType::Binary,
			"BLOB" => JdbcType::Blob,
			"DATE" => JdbcType::Date,
			"TIMESTAMP" => JdbcType::Timestamp,
			"ARRAY" => JdbcType::Array,
			"OTHER" => JdbcType::Other,
			"NULL" => JdbcType::Null,
			_ => return None,
		};
		Some(ty)
	}

	/// Mapper type a value is coerced to before binding as this type
	pub fn value_type(&self) -> Option<ValueType> {
		match self {
			JdbcType::Boolean => Some(ValueType::Bool),
			JdbcType::TinyInt | JdbcType::SmallInt | JdbcType::Integer | JdbcType::BigInt => {
				Some(ValueType::Int)
			}
			JdbcType::Float | JdbcType::Double | JdbcType::Numeric | JdbcType::Decimal => {
				Some(ValueType::Float)
			}
			JdbcType::Char | JdbcType::Varchar | JdbcType::LongVarchar | JdbcType::Clob => {
				Some(ValueType::Text)
			}
			JdbcType::Binary | JdbcType::Blob => Some(ValueType::Bytes),
			JdbcType::Date | JdbcType::Timestamp => Some(ValueType::Timestamp),
			JdbcType::Array => Some(ValueType::List),
			JdbcType::Other | JdbcType::Null => None,
		}
	}
}

/// Converts one kind of value to and from the backend representation
pub trait TypeHandler: Send + Sync + fmt::Debug {
	fn to_sql(&self, value: &Value, jdbc_type: Option<JdbcType>) -> MapperResult<SqlValue>;

	fn from_sql(&self, value: &SqlValue) -> MapperResult<Value>;
}

/// Handler for one [`ValueType`]; coerces inputs to that type first
#[derive(Debug)]
pub struct ScalarHandler {
	target: ValueType,
}

impl ScalarHandler {
	pub fn new(target: ValueType) -> Self {
		Self { target }
	}
}

impl TypeHandler for ScalarHandler {
	fn to_sql(&self, value: &Value, jdbc_type: Option<JdbcType>) -> MapperResult<SqlValue> {
		let target = jdbc_type.and_then(|t| t.value_type()).unwrap_or(self.target);
		to_native(&value.coerce(target)?)
	}

	fn from_sql(&self, value: &SqlValue) -> MapperResult<Value> {
		from_native(value).coerce(self.target)
	}
}

/// Fallback handler dispatching on the runtime type
#[derive(Debug, Default)]
pub struct ObjectHandler;

impl TypeHandler for ObjectHandler {
	fn to_sql(&self, value: &Value, jdbc_type: Option<JdbcType>) -> MapperResult<SqlValue> {
		match jdbc_type.and_then(|t| t.value_type()) {
			Some(target) => to_native(&value.coerce(target)?),
			None => to_native(value),
		}
	}

	fn from_sql(&self, value: &SqlValue) -> MapperResult<Value> {
		Ok(from_native(value))
	}
}

fn to_native(value: &Value) -> MapperResult<SqlValue> {
	let native = match value {
		Value::Null => SqlValue::Null,
		Value::Bool(b) => SqlValue::Boolean(*b),
		Value::Int(i) => SqlValue::BigInt(*i),
		Value::Float(f) => SqlValue::Double(*f),
		Value::Text(s) => SqlValue::Varchar(s.clone()),
		Value::Bytes(b) => SqlValue::Blob(b.clone()),
		Value::Timestamp(ts) => SqlValue::Timestamp(*ts),
		Value::List(items) => SqlValue::Array(items.iter().map(to_native).collect::<MapperResult<_>>()?),
		Value::Record(_) => {
			return Err(MapperError::TypeMismatch {
				expected: "bindable value".into(),
				actual: "Record".into(),
			});
		}
	};
	Ok(native)
}

fn from_native(value: &SqlValue) -> Value {
	match value {
		SqlValue::Null => Value::Null,
		SqlValue::Boolean(b) => Value::Bool(*b),
		SqlValue::BigInt(i) => Value::Int(*i),
		SqlValue::Double(d) => Value::Float(*d),
		SqlValue::Varchar(s) => Value::Text(s.clone()),
		SqlValue::Blob(b) => Value::Bytes(b.clone()),
		SqlValue::Timestamp(ts) => Value::Timestamp(*ts),
		SqlValue::Array(items) => Value::List(items.iter().map(from_native).collect()),
	}
}

/// Round `value` to `scale` decimal places when it is a float.
pub fn apply_numeric_scale(value: Value, scale: Option<u32>) -> Value {
	match (value, scale) {
		(Value::Float(f), Some(scale)) => {
			let factor = 10f64.powi(scale.min(15) as i32);
			Value::Float((f * factor).round() / factor)
		}
		(value, _) => value,
	}
}

/// Handlers keyed by mapper type, plus named handlers for explicit
/// `typeHandler=` references. Built once and shared through the
/// configuration.
#[derive(Debug, Clone)]
pub struct TypeHandlerRegistry {
	by_type: HashMap<ValueType, Arc<dyn TypeHandler>>,
	by_name: HashMap<String, Arc<dyn TypeHandler>>,
	fallback: Arc<dyn TypeHandler>,
}

impl Default for TypeHandlerRegistry {
	fn default() -> Self {
		let mut registry = Self {
			by_type: HashMap::new(),
			by_name: HashMap::new(),
			fallback: Arc::new(ObjectHandler),
		};
		for ty in [
			ValueType::Bool,
			ValueType::Int,
			ValueType::Float,
			ValueType::Text,
			ValueType::Bytes,
			ValueType::Timestamp,
		] {
			registry.register(ty, Arc::new(ScalarHandler::new(ty)));
		}
		registry
	}
}

impl TypeHandlerRegistry {
	pub fn register(&mut self, ty: ValueType, handler: Arc<dyn TypeHandler>) {
		self.by_type.insert(ty, handler);
	}

	pub fn register_named(&mut self, name: impl Into<String>, handler: Arc<dyn TypeHandler>) {
		self.by_name.insert(name.into(), handler);
	}

	/// Handler for a declared type, or the runtime-type fallback.
	pub fn handler(&self, ty: Option<ValueType>) -> Arc<dyn TypeHandler> {
		ty.and_then(|t| self.by_type.get(&t))
			.cloned()
			.unwrap_or_else(|| self.fallback.clone())
	}

	pub fn named(&self, name: &str) -> MapperResult<Arc<dyn TypeHandler>> {
		self.by_name
			.get(name)
			.cloned()
			.ok_or_else(|| MapperError::Config(format!("type handler '{name}' is not registered")))
	}

	pub fn has_named(&self, name: &str) -> bool {
		self.by_name.contains_key(name)
	}
}
