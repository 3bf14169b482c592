use crate::error::MapperResult;
use crate::expr::Scope;
use crate::value::Value;
use std::collections::BTreeMap;

pub const PARAMETER_OBJECT_KEY: &str = "_parameter";
pub const DATABASE_ID_KEY: &str = "_databaseId";

/// Per-evaluation state threaded through a template tree.
///
/// Nodes receive it by `&mut` and append SQL or write bindings that later
/// siblings read, so evaluation order is significant. One context serves
/// exactly one top-level evaluation.
#[derive(Debug)]
pub struct DynamicContext {
	sql: String,
	pad_next: bool,
	bindings: BTreeMap<String, Value>,
	parameter: Value,
	unique_number: usize,
}

impl DynamicContext {
	pub fn new(parameter: Value, database_id: Option<&str>) -> Self {
		let mut bindings = BTreeMap::new();
		bindings.insert(PARAMETER_OBJECT_KEY.to_string(), parameter.clone());
		bindings.insert(
			DATABASE_ID_KEY.to_string(),
			database_id.map(Value::from).unwrap_or(Value::Null),
		);

		Self {
			sql: String::new(),
			pad_next: false,
			bindings,
			parameter,
			unique_number: 0,
		}
	}

	pub fn parameter(&self) -> &Value {
		&self.parameter
	}

	pub fn sql(&self) -> &str {
		&self.sql
	}

	/// Append a fragment verbatim.
	pub fn append_sql(&mut self, fragment: &str) {
		if fragment.is_empty() {
			return;
		}
		if self.pad_next {
			self.pad_next = false;
			if !self.sql.ends_with(char::is_whitespace) && !fragment.starts_with(char::is_whitespace) {
				self.sql.push(' ');
			}
		}
		self.sql.push_str(fragment);
	}

	/// Append a fragment that must not fuse with the text on either side,
	/// such as a generated `WHERE ...` clause.
	pub fn append_clause(&mut self, fragment: &str) {
		if fragment.is_empty() {
			return;
		}
		if !self.sql.is_empty() && !self.sql.ends_with(char::is_whitespace) {
			self.sql.push(' ');
		}
		self.pad_next = false;
		self.sql.push_str(fragment);
		self.pad_next = true;
	}

	/// Run `f` against an empty buffer and return what it appended.
	/// Bindings written by `f` stay in the context.
	pub fn capture<F>(&mut self, f: F) -> MapperResult<String>
	where
		F: FnOnce(&mut Self) -> MapperResult<()>,
	{
		let outer = std::mem::take(&mut self.sql);
		let outer_pad = std::mem::replace(&mut self.pad_next, false);

		let result = f(self);

		let captured = std::mem::replace(&mut self.sql, outer);
		self.pad_next = outer_pad;
		result.map(|_| captured)
	}

	pub fn bind(&mut self, name: impl Into<String>, value: Value) {
		self.bindings.insert(name.into(), value);
	}

	pub fn binding(&self, name: &str) -> Option<&Value> {
		self.bindings.get(name)
	}

	pub fn unbind(&mut self, name: &str) -> Option<Value> {
		self.bindings.remove(name)
	}

	pub fn bindings(&self) -> &BTreeMap<String, Value> {
		&self.bindings
	}

	pub fn next_unique_number(&mut self) -> usize {
		let n = self.unique_number;
		self.unique_number += 1;
		n
	}

	pub fn into_parts(self) -> (String, BTreeMap<String, Value>) {
		(self.sql, self.bindings)
	}
}

impl Scope for DynamicContext {
	fn lookup(&self, name: &str) -> Option<Value> {
		if let Some(v) = self.bindings.get(name) {
			return Some(v.clone());
		}
		match &self.parameter {
			Value::Record(r) => r.get(name),
			Value::Null => None,
			// a scalar or list parameter answers to any name
			other => Some(other.clone()),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_lookup_order() {
		let mut ctx = DynamicContext::new(Value::record([("id", Value::Int(7))]), Some("pg"));
		assert_eq!(ctx.lookup("id"), Some(Value::Int(7)));
		assert_eq!(ctx.lookup("_databaseId"), Some(Value::from("pg")));
		assert_eq!(ctx.lookup("other"), None);

		ctx.bind("id", Value::Int(9));
		assert_eq!(ctx.lookup("id"), Some(Value::Int(9)));
	}

	#[test]
	fn test_scalar_parameter_answers_any_name() {
		let ctx = DynamicContext::new(Value::Int(5), None);
		assert_eq!(ctx.lookup("id"), Some(Value::Int(5)));
		assert_eq!(ctx.lookup("_parameter"), Some(Value::Int(5)));
		assert_eq!(ctx.lookup("_databaseId"), Some(Value::Null));
	}

	#[test]
	fn test_clause_padding() {
		let mut ctx = DynamicContext::new(Value::Null, None);
		ctx.append_sql("select * from t");
		ctx.append_clause("WHERE a = 1");
		ctx.append_sql("order by a");
		assert_eq!(ctx.sql(), "select * from t WHERE a = 1 order by a");

		let captured = ctx.capture(|c| {
			c.append_sql("inner");
			Ok(())
		});
		assert_eq!(captured.unwrap(), "inner");
		assert_eq!(ctx.sql(), "select * from t WHERE a = 1 order by a");
	}

	#[test]
	fn test_unique_numbers_increase() {
		let mut ctx = DynamicContext::new(Value::Null, None);
		assert_eq!(ctx.next_unique_number(), 0);
		assert_eq!(ctx.next_unique_number(), 1);
	}
}
