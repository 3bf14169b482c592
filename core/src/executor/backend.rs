//! Seams to the database: transactions, streamed rows and bound statements

use super::result::{QueryOutput, Row};
use crate::error::MapperResult;
use crate::mapping::{BoundSql, MappedStatement, ParameterMode, StatementType};
use crate::types::{JdbcType, SqlValue, TypeHandlerRegistry, apply_numeric_scale};
use std::fmt;

/// One positional parameter, already converted for the backend
#[derive(Debug, Clone, PartialEq)]
pub struct BoundParameter {
	pub property: String,
	pub value: SqlValue,
	pub mode: ParameterMode,
	pub jdbc_type: Option<JdbcType>,
}

/// A statement ready to hand to a [`Transaction`]
#[derive(Debug, Clone, PartialEq)]
pub struct BoundStatement {
	pub statement_id: String,
	pub sql: String,
	pub params: Vec<BoundParameter>,
	pub statement_type: StatementType,
	pub fetch_size: Option<u32>,
	pub timeout: Option<u32>,
}

impl BoundStatement {
	/// Convert every binding of `bound_sql` through its type handler.
	///
	/// OUT parameters are sent as nulls typed by their declared jdbc type.
	pub fn prepare(
		ms: &MappedStatement,
		bound_sql: &BoundSql,
		handlers: &TypeHandlerRegistry,
	) -> MapperResult<Self> {
		let values = bound_sql.parameter_values()?;
		let mut params = Vec::with_capacity(values.len());

		for (mapping, value) in bound_sql.parameter_mappings().iter().zip(values) {
			let handler = match &mapping.type_handler {
				Some(name) => handlers.named(name)?,
				None => handlers.handler(mapping.java_type.or_else(|| {
					(!value.is_null()).then(|| value.value_type())
				})),
			};
			let value = apply_numeric_scale(value, mapping.numeric_scale);
			params.push(BoundParameter {
				property: mapping.property.clone(),
				value: handler.to_sql(&value, mapping.jdbc_type)?,
				mode: mapping.mode,
				jdbc_type: mapping.jdbc_type,
			});
		}

		Ok(Self {
			statement_id: ms.id.clone(),
			sql: bound_sql.sql().to_string(),
			params,
			statement_type: ms.statement_type,
			fetch_size: ms.fetch_size,
			timeout: ms.timeout,
		})
	}

	/// `v(Type), ...` as printed in the statement log
	pub fn parameter_summary(&self) -> String {
		self.params
			.iter()
			.map(|p| format!("{}({})", p.value, p.value.type_name()))
			.collect::<Vec<_>>()
			.join(", ")
	}
}

/// Forward-only stream of rows owned by an open statement
pub trait RowSource: Send {
	/// `Ok(None)` once the rows are exhausted
	fn next_row(&mut self) -> MapperResult<Option<Row>>;

	/// Release the statement and result set behind this source
	fn close(&mut self) -> MapperResult<()>;
}

/// A connection-scoped unit of work against the database
pub trait Transaction: Send {
	fn query(&mut self, stmt: &BoundStatement) -> MapperResult<QueryOutput>;

	/// Run a write, returning the affected row count
	fn execute(&mut self, stmt: &BoundStatement) -> MapperResult<usize>;

	fn query_stream(&mut self, stmt: &BoundStatement) -> MapperResult<Box<dyn RowSource>>;

	fn commit(&mut self) -> MapperResult<()>;

	fn rollback(&mut self) -> MapperResult<()>;

	fn close(&mut self) -> MapperResult<()>;
}

pub trait TransactionFactory: Send + Sync + fmt::Debug {
	fn new_transaction(&self, autocommit: bool) -> MapperResult<Box<dyn Transaction>>;
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::mapping::StatementKind;
	use crate::scripting::SqlSource;
	use crate::value::Value;
	use pretty_assertions::assert_eq;

	#[test]
	fn test_prepare_converts_and_types_parameters() {
		let source = SqlSource::raw(
			"select * from t where id = #{id} and score = #{score,numericScale=1} and code = #{code,jdbcType=VARCHAR}",
		)
		.unwrap();
		let ms = MappedStatement::new("t.find", StatementKind::Select, source);
		let param = Value::record([
			("id", Value::Int(7)),
			("score", Value::Float(2.46)),
			("code", Value::Int(12)),
		]);
		let bound = ms.bound_sql(&param, None).unwrap();

		let stmt = BoundStatement::prepare(&ms, &bound, &TypeHandlerRegistry::default()).unwrap();
		let values: Vec<SqlValue> = stmt.params.iter().map(|p| p.value.clone()).collect();
		assert_eq!(
			values,
			vec![
				SqlValue::BigInt(7),
				SqlValue::Double(2.5),
				SqlValue::Varchar("12".into()),
			]
		);
		assert_eq!(stmt.parameter_summary(), "7(BIGINT), 2.5(DOUBLE), 12(VARCHAR)");
		assert_eq!(stmt.statement_id, "t.find");
	}

	#[test]
	fn test_unknown_named_handler_fails() {
		let source = SqlSource::raw("select #{id,typeHandler=money}").unwrap();
		let ms = MappedStatement::new("t.find", StatementKind::Select, source);
		let bound = ms.bound_sql(&Value::Int(1), None).unwrap();
		assert!(BoundStatement::prepare(&ms, &bound, &TypeHandlerRegistry::default()).is_err());
	}
}
