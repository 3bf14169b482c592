use super::ast::{BinaryOp, Expr, UnaryOp};
use crate::error::{MapperError, MapperResult};
use crate::value::{Record, Value};
use std::cmp::Ordering;

/// Name resolution for bare identifiers in an expression
pub trait Scope {
	fn lookup(&self, name: &str) -> Option<Value>;
}

impl Scope for Record {
	fn lookup(&self, name: &str) -> Option<Value> {
		self.get(name)
	}
}

impl Scope for Value {
	fn lookup(&self, name: &str) -> Option<Value> {
		match self {
			Value::Record(r) => r.get(name),
			_ => None,
		}
	}
}

pub fn evaluate(expr: &Expr, scope: &dyn Scope) -> MapperResult<Value> {
	match expr {
		Expr::Literal(v) => Ok(v.clone()),
		Expr::Ident(name) => Ok(scope.lookup(name).unwrap_or(Value::Null)),
		Expr::Member { target, name } => {
			let target = evaluate(target, scope)?;
			member(&target, name)
		}
		Expr::Index { target, index } => {
			let target = evaluate(target, scope)?;
			let index = evaluate(index, scope)?;
			index_into(&target, &index)
		}
		Expr::Call { target, method } => {
			let target = evaluate(target, scope)?;
			call(&target, method)
		}
		Expr::Unary { op, expr } => {
			let value = evaluate(expr, scope)?;
			unary(*op, value)
		}
		Expr::Binary { op: BinaryOp::And, left, right } => {
			if !evaluate(left, scope)?.is_truthy() {
				return Ok(Value::Bool(false));
			}
			Ok(Value::Bool(evaluate(right, scope)?.is_truthy()))
		}
		Expr::Binary { op: BinaryOp::Or, left, right } => {
			if evaluate(left, scope)?.is_truthy() {
				return Ok(Value::Bool(true));
			}
			Ok(Value::Bool(evaluate(right, scope)?.is_truthy()))
		}
		Expr::Binary { op, left, right } => {
			let left = evaluate(left, scope)?;
			let right = evaluate(right, scope)?;
			binary(*op, &left, &right)
		}
	}
}

fn member(target: &Value, name: &str) -> MapperResult<Value> {
	match target {
		Value::Record(r) => Ok(r.get(name).unwrap_or(Value::Null)),
		Value::Null => Ok(Value::Null),
		other => Err(MapperError::Expression(format!(
			"no property '{name}' on a {} value",
			other.value_type()
		))),
	}
}

fn index_into(target: &Value, index: &Value) -> MapperResult<Value> {
	match (target, index) {
		(Value::Null, _) => Ok(Value::Null),
		(Value::List(items), Value::Int(i)) => usize::try_from(*i)
			.ok()
			.and_then(|i| items.get(i).cloned())
			.ok_or_else(|| {
				MapperError::Expression(format!("index {i} out of bounds (len {})", items.len()))
			}),
		(Value::Record(r), Value::Text(key)) => Ok(r.get(key).unwrap_or(Value::Null)),
		(target, index) => Err(MapperError::Expression(format!(
			"cannot index a {} value with a {} value",
			target.value_type(),
			index.value_type()
		))),
	}
}

fn call(target: &Value, method: &str) -> MapperResult<Value> {
	let result = match (method, target) {
		(_, Value::Null) => Some(Value::Null),
		("size" | "length", Value::List(items)) => Some(Value::from(items.len())),
		("size" | "length", Value::Text(s)) => Some(Value::from(s.chars().count())),
		("size" | "length", Value::Bytes(b)) => Some(Value::from(b.len())),
		("size", Value::Record(r)) => Some(Value::from(r.len())),
		("isEmpty", Value::List(items)) => Some(Value::Bool(items.is_empty())),
		("isEmpty", Value::Text(s)) => Some(Value::Bool(s.is_empty())),
		("isEmpty", Value::Bytes(b)) => Some(Value::Bool(b.is_empty())),
		("isEmpty", Value::Record(r)) => Some(Value::Bool(r.is_empty())),
		("trim", Value::Text(s)) => Some(Value::Text(s.trim().to_string())),
		("toUpperCase", Value::Text(s)) => Some(Value::Text(s.to_uppercase())),
		("toLowerCase", Value::Text(s)) => Some(Value::Text(s.to_lowercase())),
		_ => None,
	};

	result.ok_or_else(|| {
		MapperError::Expression(format!(
			"unknown method '{method}()' on a {} value",
			target.value_type()
		))
	})
}

fn unary(op: UnaryOp, value: Value) -> MapperResult<Value> {
	match (op, value) {
		(UnaryOp::Not, v) => Ok(Value::Bool(!v.is_truthy())),
		(UnaryOp::Neg, Value::Int(i)) => i
			.checked_neg()
			.map(Value::Int)
			.ok_or_else(|| MapperError::Expression("integer overflow".into())),
		(UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
		(UnaryOp::Neg, v) => Err(MapperError::Expression(format!(
			"cannot negate a {} value",
			v.value_type()
		))),
	}
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> MapperResult<Value> {
	match op {
		BinaryOp::Eq => Ok(Value::Bool(values_equal(left, right))),
		BinaryOp::NotEq => Ok(Value::Bool(!values_equal(left, right))),
		BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
			// Ordering against null is never satisfied
			if left.is_null() || right.is_null() {
				return Ok(Value::Bool(false));
			}
			let ordering = compare(left, right).ok_or_else(|| type_error(op, left, right))?;
			let result = match op {
				BinaryOp::Lt => ordering == Ordering::Less,
				BinaryOp::LtEq => ordering != Ordering::Greater,
				BinaryOp::Gt => ordering == Ordering::Greater,
				_ => ordering != Ordering::Less,
			};
			Ok(Value::Bool(result))
		}
		BinaryOp::Add if matches!(left, Value::Text(_)) || matches!(right, Value::Text(_)) => {
			Ok(Value::Text(format!("{left}{right}")))
		}
		BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
			arithmetic(op, left, right)
		}
		BinaryOp::And | BinaryOp::Or => Ok(Value::Bool(match op {
			BinaryOp::And => left.is_truthy() && right.is_truthy(),
			_ => left.is_truthy() || right.is_truthy(),
		})),
	}
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> MapperResult<Value> {
	if let (Value::Int(a), Value::Int(b)) = (left, right) {
		let result = match op {
			BinaryOp::Add => a.checked_add(*b),
			BinaryOp::Sub => a.checked_sub(*b),
			BinaryOp::Mul => a.checked_mul(*b),
			BinaryOp::Div | BinaryOp::Mod if *b == 0 => {
				return Err(MapperError::Expression("division by zero".into()));
			}
			BinaryOp::Div => a.checked_div(*b),
			_ => a.checked_rem(*b),
		};
		return result
			.map(Value::Int)
			.ok_or_else(|| MapperError::Expression("integer overflow".into()));
	}

	let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) else {
		return Err(type_error(op, left, right));
	};
	let result = match op {
		BinaryOp::Add => a + b,
		BinaryOp::Sub => a - b,
		BinaryOp::Mul => a * b,
		BinaryOp::Div => a / b,
		_ => a % b,
	};
	Ok(Value::Float(result))
}

/// Numbers compare by value across Int and Float; other types must match.
pub fn values_equal(left: &Value, right: &Value) -> bool {
	match (left, right) {
		(Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => (*a as f64) == *b,
		(Value::Float(a), Value::Float(b)) => a == b,
		(a, b) => a == b,
	}
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
	match (left, right) {
		(Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
		(Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
		(Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
		(Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
		(a, b) => a.as_f64()?.partial_cmp(&b.as_f64()?),
	}
}

fn type_error(op: BinaryOp, left: &Value, right: &Value) -> MapperError {
	MapperError::Expression(format!(
		"operator '{}' not supported between {} and {}",
		op.symbol(),
		left.value_type(),
		right.value_type()
	))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::expr::Expression;

	fn eval(source: &str, scope: &Value) -> MapperResult<Value> {
		Expression::parse(source)?.evaluate(scope)
	}

	fn params() -> Value {
		Value::record([
			("name", Value::from("bob")),
			("age", Value::Int(42)),
			("score", Value::Float(2.5)),
			("tags", Value::List(vec!["a".into(), "b".into()])),
			("missing", Value::Null),
			("address", Value::record([("city", Value::from("Oslo"))])),
		])
	}

	#[test]
	fn test_null_checks_and_logic() {
		let p = params();
		assert_eq!(eval("name != null", &p).unwrap(), Value::Bool(true));
		assert_eq!(eval("missing == null", &p).unwrap(), Value::Bool(true));
		assert_eq!(eval("nothing == null", &p).unwrap(), Value::Bool(true));
		assert_eq!(eval("name != null and age gt 18", &p).unwrap(), Value::Bool(true));
		assert_eq!(eval("missing != null && missing.size() > 0", &p).unwrap(), Value::Bool(false));
		assert_eq!(eval("missing or age", &p).unwrap(), Value::Bool(true));
	}

	#[test]
	fn test_navigation_and_methods() {
		let p = params();
		assert_eq!(eval("address.city", &p).unwrap(), Value::from("Oslo"));
		assert_eq!(eval("address['city'].toUpperCase()", &p).unwrap(), Value::from("OSLO"));
		assert_eq!(eval("tags[1]", &p).unwrap(), Value::from("b"));
		assert_eq!(eval("tags.size()", &p).unwrap(), Value::Int(2));
		assert_eq!(eval("!tags.isEmpty()", &p).unwrap(), Value::Bool(true));
		assert_eq!(eval("missing.city", &p).unwrap(), Value::Null);
		assert_eq!(eval("address.zip", &p).unwrap(), Value::Null);
	}

	#[test]
	fn test_arithmetic_and_concat() {
		let p = params();
		assert_eq!(eval("age + 1", &p).unwrap(), Value::Int(43));
		assert_eq!(eval("age * score", &p).unwrap(), Value::Float(105.0));
		assert_eq!(eval("'%' + name + '%'", &p).unwrap(), Value::from("%bob%"));
		assert_eq!(eval("age % 5 == 2", &p).unwrap(), Value::Bool(true));
		assert_eq!(eval("-age", &p).unwrap(), Value::Int(-42));
		assert_eq!(eval("age == 42.0", &p).unwrap(), Value::Bool(true));
		assert_eq!(eval("age == '42'", &p).unwrap(), Value::Bool(false));
	}

	#[test]
	fn test_evaluation_errors() {
		let p = params();
		assert!(matches!(eval("name.first", &p), Err(MapperError::Expression(_))));
		assert!(matches!(eval("tags.reverse()", &p), Err(MapperError::Expression(_))));
		assert!(matches!(eval("age / 0", &p), Err(MapperError::Expression(_))));
		assert!(matches!(eval("tags[5]", &p), Err(MapperError::Expression(_))));
		assert!(matches!(eval("tags - 1", &p), Err(MapperError::Expression(_))));
		assert!(matches!(eval("age <", &p), Err(MapperError::Parse { .. })));
	}

	#[test]
	fn test_ordering_against_null_is_false() {
		let p = params();
		assert_eq!(eval("missing > 1", &p).unwrap(), Value::Bool(false));
		assert_eq!(eval("missing <= 1", &p).unwrap(), Value::Bool(false));
	}
}
