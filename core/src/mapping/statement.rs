use super::bound::BoundSql;
use super::result::ResultMap;
use crate::error::MapperResult;
use crate::scripting::SqlSource;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementKind {
	Select,
	Insert,
	Update,
	Delete,
}

impl StatementKind {
	pub fn is_select(&self) -> bool {
		matches!(self, StatementKind::Select)
	}
}

/// How the backend should run the statement
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementType {
	Statement,
	#[default]
	Prepared,
	/// Stored procedure call; may have OUT parameters
	Callable,
}

/// Client-side paging: `offset` rows are fetched and skipped, then at
/// most `limit` rows are returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowBounds {
	pub offset: usize,
	pub limit: usize,
}

impl RowBounds {
	pub const NO_ROW_OFFSET: usize = 0;
	pub const NO_ROW_LIMIT: usize = usize::MAX;

	pub const DEFAULT: RowBounds = RowBounds {
		offset: Self::NO_ROW_OFFSET,
		limit: Self::NO_ROW_LIMIT,
	};

	pub fn new(offset: usize, limit: usize) -> Self {
		Self { offset, limit }
	}

	pub fn is_default(&self) -> bool {
		*self == Self::DEFAULT
	}

	/// Row count after which nothing more is delivered
	pub fn end(&self) -> usize {
		self.offset.saturating_add(self.limit)
	}
}

impl Default for RowBounds {
	fn default() -> Self {
		Self::DEFAULT
	}
}

/// A mapped operation: `namespace.localId` plus its template and options.
#[derive(Debug, Clone)]
pub struct MappedStatement {
	pub id: String,
	pub kind: StatementKind,
	pub statement_type: StatementType,
	pub sql_source: SqlSource,
	pub result_map: Arc<ResultMap>,
	/// Clear caches before running
	pub flush_cache: bool,
	/// Consult the shared cache
	pub use_cache: bool,
	/// Shared cache id, usually the namespace
	pub cache: Option<String>,
	pub fetch_size: Option<u32>,
	pub timeout: Option<u32>,
}

impl MappedStatement {
	/// Selects use caches and leave them alone; writes flush them.
	pub fn new(id: impl Into<String>, kind: StatementKind, sql_source: SqlSource) -> Self {
		let id = id.into();
		Self {
			result_map: Arc::new(ResultMap::auto(format!("{id}-Inline"))),
			id,
			kind,
			statement_type: StatementType::default(),
			sql_source,
			flush_cache: !kind.is_select(),
			use_cache: kind.is_select(),
			cache: None,
			fetch_size: None,
			timeout: None,
		}
	}

	pub fn with_result_map(mut self, result_map: ResultMap) -> Self {
		self.result_map = Arc::new(result_map);
		self
	}

	pub fn with_cache(mut self, cache: impl Into<String>) -> Self {
		self.cache = Some(cache.into());
		self
	}

	pub fn with_statement_type(mut self, statement_type: StatementType) -> Self {
		self.statement_type = statement_type;
		self
	}

	pub fn namespace(&self) -> &str {
		self.id.rsplit_once('.').map(|(ns, _)| ns).unwrap_or("")
	}

	pub fn is_callable(&self) -> bool {
		self.statement_type == StatementType::Callable
	}

	pub fn bound_sql(&self, parameter: &Value, database_id: Option<&str>) -> MapperResult<BoundSql> {
		self.sql_source.bound_sql(parameter, database_id)
	}
}
