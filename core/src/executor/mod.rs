//! Statement execution: the session cache, the shared-cache layer and the
//! seams to the database.

mod backend;
mod base;
mod caching;
mod deferred;
mod local;
mod mapper;
mod result;

pub use backend::{BoundParameter, BoundStatement, RowSource, Transaction, TransactionFactory};
pub use base::{BaseExecutor, fingerprint};
pub use caching::{CachingExecutor, SharedCacheHandle};
pub use deferred::{DeferredLoad, ResultExtractor};
pub use local::{LocalCache, LocalEntry};
pub use mapper::RowMapper;
pub use result::{QueryOutput, Row};

use crate::cache::CacheKey;
use crate::cursor::Cursor;
use crate::error::MapperResult;
use crate::mapping::{BoundSql, MappedStatement, RowBounds};
use crate::value::Value;

/// Runs mapped statements inside one session.
///
/// Every operation on a closed executor fails with
/// [`MapperError::ExecutorClosed`](crate::error::MapperError::ExecutorClosed).
pub trait Executor: Send {
	fn query(&mut self, ms: &MappedStatement, parameter: &Value, bounds: RowBounds) -> MapperResult<Vec<Value>>;

	/// Query with an already computed fingerprint and compiled statement
	fn query_with_key(
		&mut self,
		ms: &MappedStatement,
		parameter: &Value,
		bounds: RowBounds,
		key: CacheKey,
		bound_sql: &BoundSql,
	) -> MapperResult<Vec<Value>>;

	fn query_cursor(&mut self, ms: &MappedStatement, parameter: &Value, bounds: RowBounds) -> MapperResult<Cursor>;

	/// Insert, update or delete; returns the affected row count
	fn update(&mut self, ms: &MappedStatement, parameter: &Value) -> MapperResult<usize>;

	fn commit(&mut self, required: bool) -> MapperResult<()>;

	fn rollback(&mut self, required: bool) -> MapperResult<()>;

	fn create_cache_key(&self, ms: &MappedStatement, bounds: RowBounds, bound_sql: &BoundSql) -> MapperResult<CacheKey>;

	fn is_cached(&self, key: &CacheKey) -> bool;

	fn clear_local_cache(&mut self);

	/// Roll back when `force_rollback`, then close the transaction.
	/// Failures are logged; closing twice is a no-op.
	fn close(&mut self, force_rollback: bool);

	fn is_closed(&self) -> bool;

	/// Route nested selects through a session's shared caches. Executors
	/// that never run nested selects ignore it.
	fn attach_shared_cache(&mut self, _shared: SharedCacheHandle) {}
}
