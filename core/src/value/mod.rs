//! Dynamic values flowing through templates, bindings and result objects

mod path;

pub use path::{PathSegment, PropertyPath};

use crate::error::{MapperError, MapperResult};
use chrono::NaiveDateTime;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Runtime type tag of a [`Value`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
	Null,
	Bool,
	Int,
	Float,
	Text,
	Bytes,
	Timestamp,
	List,
	Record,
}

impl ValueType {
	/// Primitive types can be bound directly and have no properties
	pub fn is_primitive(&self) -> bool {
		!matches!(self, ValueType::List | ValueType::Record)
	}

	pub fn parse(name: &str) -> Option<Self> {
		match name.to_ascii_lowercase().as_str() {
			"null" => Some(ValueType::Null),
			"bool" | "boolean" => Some(ValueType::Bool),
			"int" | "integer" | "long" | "short" | "byte" | "i64" | "i32" => Some(ValueType::Int),
			"float" | "double" | "decimal" | "bigdecimal" | "f64" => Some(ValueType::Float),
			"text" | "string" | "str" => Some(ValueType::Text),
			"bytes" | "blob" | "byte[]" => Some(ValueType::Bytes),
			"timestamp" | "datetime" | "date" => Some(ValueType::Timestamp),
			"list" | "array" | "collection" => Some(ValueType::List),
			"record" | "map" | "object" => Some(ValueType::Record),
			_ => None,
		}
	}
}

impl fmt::Display for ValueType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			ValueType::Null => "Null",
			ValueType::Bool => "Bool",
			ValueType::Int => "Int",
			ValueType::Float => "Float",
			ValueType::Text => "Text",
			ValueType::Bytes => "Bytes",
			ValueType::Timestamp => "Timestamp",
			ValueType::List => "List",
			ValueType::Record => "Record",
		};
		f.write_str(name)
	}
}

/// A parameter or result value
#[derive(Clone)]
pub enum Value {
	Null,
	Bool(bool),
	Int(i64),
	Float(f64),
	Text(String),
	Bytes(Vec<u8>),
	Timestamp(NaiveDateTime),
	List(Vec<Value>),
	Record(Record),
}

impl Value {
	pub fn value_type(&self) -> ValueType {
		match self {
			Value::Null => ValueType::Null,
			Value::Bool(_) => ValueType::Bool,
			Value::Int(_) => ValueType::Int,
			Value::Float(_) => ValueType::Float,
			Value::Text(_) => ValueType::Text,
			Value::Bytes(_) => ValueType::Bytes,
			Value::Timestamp(_) => ValueType::Timestamp,
			Value::List(_) => ValueType::List,
			Value::Record(_) => ValueType::Record,
		}
	}

	pub fn is_null(&self) -> bool {
		matches!(self, Value::Null)
	}

	/// Booleans as-is, numbers when non-zero, null never, anything else always.
	pub fn is_truthy(&self) -> bool {
		match self {
			Value::Null => false,
			Value::Bool(b) => *b,
			Value::Int(i) => *i != 0,
			Value::Float(f) => *f != 0.0,
			_ => true,
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			Value::Text(s) => Some(s),
			_ => None,
		}
	}

	pub fn as_i64(&self) -> Option<i64> {
		match self {
			Value::Int(i) => Some(*i),
			_ => None,
		}
	}

	pub fn as_f64(&self) -> Option<f64> {
		match self {
			Value::Int(i) => Some(*i as f64),
			Value::Float(f) => Some(*f),
			_ => None,
		}
	}

	pub fn as_record(&self) -> Option<&Record> {
		match self {
			Value::Record(r) => Some(r),
			_ => None,
		}
	}

	pub fn as_list(&self) -> Option<&[Value]> {
		match self {
			Value::List(items) => Some(items),
			_ => None,
		}
	}

	/// Build a record value from `(name, value)` pairs.
	pub fn record<K, I>(pairs: I) -> Self
	where
		K: Into<String>,
		I: IntoIterator<Item = (K, Value)>,
	{
		Value::Record(Record::from_pairs(pairs))
	}

	/// Copy that shares no record handles with `self`.
	pub fn snapshot(&self) -> Value {
		match self {
			Value::List(items) => Value::List(items.iter().map(Value::snapshot).collect()),
			Value::Record(r) => Value::Record(r.snapshot()),
			other => other.clone(),
		}
	}

	/// Convert to `target`, failing when the conversion would lose meaning.
	pub fn coerce(&self, target: ValueType) -> MapperResult<Value> {
		if self.value_type() == target || self.is_null() {
			return Ok(self.clone());
		}

		let converted = match (self, target) {
			(Value::Int(i), ValueType::Float) => Some(Value::Float(*i as f64)),
			(Value::Float(f), ValueType::Int) if f.fract() == 0.0 => Some(Value::Int(*f as i64)),
			(Value::Bool(b), ValueType::Int) => Some(Value::Int(i64::from(*b))),
			(Value::Int(i), ValueType::Bool) => Some(Value::Bool(*i != 0)),
			(Value::Text(s), ValueType::Int) => s.trim().parse().ok().map(Value::Int),
			(Value::Text(s), ValueType::Float) => s.trim().parse().ok().map(Value::Float),
			(Value::Text(s), ValueType::Bool) => match s.trim().to_ascii_lowercase().as_str() {
				"true" | "1" => Some(Value::Bool(true)),
				"false" | "0" => Some(Value::Bool(false)),
				_ => None,
			},
			(Value::Text(s), ValueType::Timestamp) => parse_timestamp(s).map(Value::Timestamp),
			(Value::Text(s), ValueType::Bytes) => Some(Value::Bytes(s.as_bytes().to_vec())),
			(Value::Bytes(b), ValueType::Text) => String::from_utf8(b.clone()).ok().map(Value::Text),
			(Value::List(items), ValueType::Bytes) => items
				.iter()
				.map(|v| v.as_i64().and_then(|i| u8::try_from(i).ok()))
				.collect::<Option<Vec<u8>>>()
				.map(Value::Bytes),
			(other, ValueType::Text) if other.value_type().is_primitive() => {
				Some(Value::Text(other.to_string()))
			}
			_ => None,
		};

		converted.ok_or_else(|| MapperError::TypeMismatch {
			expected: target.to_string(),
			actual: format!("{} ({})", self.value_type(), self),
		})
	}

	pub fn from_json(json: serde_json::Value) -> Self {
		match json {
			serde_json::Value::Null => Value::Null,
			serde_json::Value::Bool(b) => Value::Bool(b),
			serde_json::Value::Number(n) => match n.as_i64() {
				Some(i) => Value::Int(i),
				None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
			},
			serde_json::Value::String(s) => Value::Text(s),
			serde_json::Value::Array(items) => {
				Value::List(items.into_iter().map(Value::from_json).collect())
			}
			serde_json::Value::Object(map) => {
				Value::record(map.into_iter().map(|(k, v)| (k, Value::from_json(v))))
			}
		}
	}

	pub fn to_json(&self) -> serde_json::Value {
		match self {
			Value::Null => serde_json::Value::Null,
			Value::Bool(b) => serde_json::Value::Bool(*b),
			Value::Int(i) => serde_json::Value::from(*i),
			Value::Float(f) => serde_json::Value::from(*f),
			Value::Text(s) => serde_json::Value::String(s.clone()),
			Value::Bytes(b) => serde_json::Value::from(b.clone()),
			Value::Timestamp(ts) => serde_json::Value::String(ts.format(TIMESTAMP_FORMAT).to_string()),
			Value::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
			Value::Record(r) => serde_json::Value::Object(
				r.entries()
					.into_iter()
					.map(|(k, v)| (k, v.to_json()))
					.collect(),
			),
		}
	}
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
	let s = s.trim();
	NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
		.or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
		.ok()
		.or_else(|| {
			chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
				.ok()
				.and_then(|d| d.and_hms_opt(0, 0, 0))
		})
}

impl PartialEq for Value {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(Value::Null, Value::Null) => true,
			(Value::Bool(l), Value::Bool(r)) => l == r,
			(Value::Int(l), Value::Int(r)) => l == r,
			(Value::Float(l), Value::Float(r)) => l.to_bits() == r.to_bits(),
			(Value::Text(l), Value::Text(r)) => l == r,
			(Value::Bytes(l), Value::Bytes(r)) => l == r,
			(Value::Timestamp(l), Value::Timestamp(r)) => l == r,
			(Value::List(l), Value::List(r)) => l == r,
			(Value::Record(l), Value::Record(r)) => l == r,
			_ => false,
		}
	}
}

impl Eq for Value {}

impl Hash for Value {
	fn hash<H: Hasher>(&self, state: &mut H) {
		std::mem::discriminant(self).hash(state);
		match self {
			Value::Null => {}
			Value::Bool(b) => b.hash(state),
			Value::Int(i) => i.hash(state),
			Value::Float(f) => f.to_bits().hash(state),
			Value::Text(s) => s.hash(state),
			Value::Bytes(b) => b.hash(state),
			Value::Timestamp(ts) => ts.hash(state),
			Value::List(items) => items.hash(state),
			Value::Record(r) => r.hash(state),
		}
	}
}

impl fmt::Debug for Value {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Value::Null => f.write_str("Null"),
			Value::Bool(b) => write!(f, "Bool({b})"),
			Value::Int(i) => write!(f, "Int({i})"),
			Value::Float(x) => write!(f, "Float({x})"),
			Value::Text(s) => write!(f, "Text({s:?})"),
			Value::Bytes(b) => write!(f, "Bytes({b:?})"),
			Value::Timestamp(ts) => write!(f, "Timestamp({ts})"),
			Value::List(items) => f.debug_list().entries(items).finish(),
			Value::Record(r) => r.fmt(f),
		}
	}
}

impl fmt::Display for Value {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Value::Null => f.write_str("null"),
			Value::Bool(b) => write!(f, "{b}"),
			Value::Int(i) => write!(f, "{i}"),
			Value::Float(x) => write!(f, "{x}"),
			Value::Text(s) => f.write_str(s),
			Value::Bytes(b) => {
				for byte in b {
					write!(f, "{byte:02x}")?;
				}
				Ok(())
			}
			Value::Timestamp(ts) => write!(f, "{}", ts.format(TIMESTAMP_FORMAT)),
			Value::List(items) => {
				f.write_str("[")?;
				for (i, item) in items.iter().enumerate() {
					if i > 0 {
						f.write_str(", ")?;
					}
					write!(f, "{item}")?;
				}
				f.write_str("]")
			}
			Value::Record(r) => {
				f.write_str("{")?;
				for (i, (k, v)) in r.entries().iter().enumerate() {
					if i > 0 {
						f.write_str(", ")?;
					}
					write!(f, "{k}={v}")?;
				}
				f.write_str("}")
			}
		}
	}
}

impl Default for Value {
	fn default() -> Self {
		Value::Null
	}
}

impl From<bool> for Value {
	fn from(b: bool) -> Self {
		Value::Bool(b)
	}
}

impl From<i64> for Value {
	fn from(i: i64) -> Self {
		Value::Int(i)
	}
}

impl From<i32> for Value {
	fn from(i: i32) -> Self {
		Value::Int(i64::from(i))
	}
}

impl From<usize> for Value {
	fn from(i: usize) -> Self {
		Value::Int(i64::try_from(i).unwrap_or(i64::MAX))
	}
}

impl From<f64> for Value {
	fn from(f: f64) -> Self {
		Value::Float(f)
	}
}

impl From<&str> for Value {
	fn from(s: &str) -> Self {
		Value::Text(s.to_string())
	}
}

impl From<String> for Value {
	fn from(s: String) -> Self {
		Value::Text(s)
	}
}

impl From<NaiveDateTime> for Value {
	fn from(ts: NaiveDateTime) -> Self {
		Value::Timestamp(ts)
	}
}

impl From<Vec<Value>> for Value {
	fn from(items: Vec<Value>) -> Self {
		Value::List(items)
	}
}

impl From<Record> for Value {
	fn from(r: Record) -> Self {
		Value::Record(r)
	}
}

impl<T: Into<Value>> From<Option<T>> for Value {
	fn from(v: Option<T>) -> Self {
		v.map(Into::into).unwrap_or(Value::Null)
	}
}

/// Shared, interior-mutable property map.
///
/// Result objects are records so that a deferred load can set a property on
/// an object already referenced from a cached list or a parent object.
/// Cloning shares the handle; [`Record::snapshot`] copies.
#[derive(Clone, Default)]
pub struct Record(Arc<RwLock<BTreeMap<String, Value>>>);

impl Record {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn from_pairs<K, I>(pairs: I) -> Self
	where
		K: Into<String>,
		I: IntoIterator<Item = (K, Value)>,
	{
		let map = pairs.into_iter().map(|(k, v)| (k.into(), v)).collect();
		Self(Arc::new(RwLock::new(map)))
	}

	pub fn get(&self, key: &str) -> Option<Value> {
		self.0.read().get(key).cloned()
	}

	pub fn contains_key(&self, key: &str) -> bool {
		self.0.read().contains_key(key)
	}

	pub fn set(&self, key: impl Into<String>, value: Value) {
		self.0.write().insert(key.into(), value);
	}

	pub fn remove(&self, key: &str) -> Option<Value> {
		self.0.write().remove(key)
	}

	pub fn keys(&self) -> Vec<String> {
		self.0.read().keys().cloned().collect()
	}

	pub fn entries(&self) -> Vec<(String, Value)> {
		self.0
			.read()
			.iter()
			.map(|(k, v)| (k.clone(), v.clone()))
			.collect()
	}

	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}

	/// Deep copy with fresh handles all the way down
	pub fn snapshot(&self) -> Record {
		Record::from_pairs(
			self.0
				.read()
				.iter()
				.map(|(k, v)| (k.clone(), v.snapshot())),
		)
	}

	pub fn ptr_eq(&self, other: &Record) -> bool {
		Arc::ptr_eq(&self.0, &other.0)
	}
}

impl PartialEq for Record {
	fn eq(&self, other: &Self) -> bool {
		self.ptr_eq(other) || *self.0.read() == *other.0.read()
	}
}

impl Eq for Record {}

impl Hash for Record {
	fn hash<H: Hasher>(&self, state: &mut H) {
		let map = self.0.read();
		map.len().hash(state);
		for (k, v) in map.iter() {
			k.hash(state);
			v.hash(state);
		}
	}
}

impl fmt::Debug for Record {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_map().entries(self.0.read().iter()).finish()
	}
}
