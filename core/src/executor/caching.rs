use super::Executor;
use crate::cache::{Cache, CacheKey, TransactionalCacheManager};
use crate::config::Configuration;
use crate::cursor::Cursor;
use crate::error::{MapperError, MapperResult};
use crate::mapping::{BoundSql, MappedStatement, RowBounds};
use crate::value::Value;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

/// One session's view of the shared caches.
///
/// The caching layer and the nested selects of the executor below it hold
/// clones of the same handle, so rows loaded by a nested select are
/// buffered and published on commit like top-level results.
#[derive(Clone)]
pub struct SharedCacheHandle {
	config: Arc<Configuration>,
	tcm: Arc<Mutex<TransactionalCacheManager>>,
}

impl SharedCacheHandle {
	fn new(config: Arc<Configuration>) -> Self {
		Self {
			config,
			tcm: Arc::new(Mutex::new(TransactionalCacheManager::new())),
		}
	}

	/// Serve `ms` from the shared cache, or run `load` and buffer its rows.
	/// The lock is not held while `load` runs, since it may re-enter.
	pub fn query<F>(&self, ms: &MappedStatement, key: CacheKey, bound_sql: &BoundSql, load: F) -> MapperResult<Vec<Value>>
	where
		F: FnOnce(CacheKey) -> MapperResult<Vec<Value>>,
	{
		let Some(cache) = self.config.cache_for(ms) else {
			return load(key);
		};
		if ms.flush_cache {
			self.tcm.lock().clear(&cache);
		}
		if !ms.use_cache {
			return load(key);
		}

		ensure_no_out_params(ms, bound_sql)?;
		let hit = self.tcm.lock().get(&cache, &key)?;
		if let Some(rows) = hit {
			debug!(statement = %ms.id, cache = cache.id(), "Shared cache hit");
			return Ok(rows.iter().map(Value::snapshot).collect());
		}

		let rows = load(key.clone())?;
		self.tcm
			.lock()
			.put(&cache, key, Arc::new(rows.iter().map(Value::snapshot).collect()));
		Ok(rows)
	}

	fn flush_cache_if_required(&self, ms: &MappedStatement) {
		if ms.flush_cache
			&& let Some(cache) = self.config.cache_for(ms)
		{
			self.tcm.lock().clear(&cache);
		}
	}

	fn commit(&self) -> MapperResult<()> {
		self.tcm.lock().commit()
	}

	fn rollback(&self) {
		self.tcm.lock().rollback();
	}
}

fn ensure_no_out_params(ms: &MappedStatement, bound_sql: &BoundSql) -> MapperResult<()> {
	if ms.is_callable() && bound_sql.parameter_mappings().iter().any(|m| m.mode.is_output()) {
		return Err(MapperError::Unsupported(format!(
			"Caching stored procedures with OUT params is not supported. Please configure useCache=false in {} statement.",
			ms.id
		)));
	}
	Ok(())
}

/// Shared-cache layer over another executor.
///
/// Reads and writes go through a per-session [`TransactionalCacheManager`],
/// so nothing this session caches is visible to others before commit.
pub struct CachingExecutor {
	delegate: Box<dyn Executor>,
	config: Arc<Configuration>,
	shared: SharedCacheHandle,
}

impl CachingExecutor {
	pub fn new(mut delegate: Box<dyn Executor>, config: Arc<Configuration>) -> Self {
		let shared = SharedCacheHandle::new(config.clone());
		delegate.attach_shared_cache(shared.clone());
		Self {
			delegate,
			config,
			shared,
		}
	}

	fn ensure_open(&self) -> MapperResult<()> {
		if self.delegate.is_closed() {
			return Err(MapperError::ExecutorClosed);
		}
		Ok(())
	}
}

impl Executor for CachingExecutor {
	fn query(&mut self, ms: &MappedStatement, parameter: &Value, bounds: RowBounds) -> MapperResult<Vec<Value>> {
		self.ensure_open()?;
		let bound_sql = ms.bound_sql(parameter, self.config.settings().database_id.as_deref())?;
		let key = self.create_cache_key(ms, bounds, &bound_sql)?;
		self.query_with_key(ms, parameter, bounds, key, &bound_sql)
	}

	fn query_with_key(
		&mut self,
		ms: &MappedStatement,
		parameter: &Value,
		bounds: RowBounds,
		key: CacheKey,
		bound_sql: &BoundSql,
	) -> MapperResult<Vec<Value>> {
		self.ensure_open()?;
		let delegate = &mut self.delegate;
		self.shared.query(ms, key, bound_sql, |key| {
			delegate.query_with_key(ms, parameter, bounds, key, bound_sql)
		})
	}

	fn query_cursor(&mut self, ms: &MappedStatement, parameter: &Value, bounds: RowBounds) -> MapperResult<Cursor> {
		self.ensure_open()?;
		self.shared.flush_cache_if_required(ms);
		self.delegate.query_cursor(ms, parameter, bounds)
	}

	fn update(&mut self, ms: &MappedStatement, parameter: &Value) -> MapperResult<usize> {
		self.ensure_open()?;
		self.shared.flush_cache_if_required(ms);
		self.delegate.update(ms, parameter)
	}

	fn commit(&mut self, required: bool) -> MapperResult<()> {
		self.ensure_open()?;
		self.delegate.commit(required)?;
		self.shared.commit()
	}

	fn rollback(&mut self, required: bool) -> MapperResult<()> {
		self.ensure_open()?;
		let result = self.delegate.rollback(required);
		if required {
			self.shared.rollback();
		}
		result
	}

	fn create_cache_key(&self, ms: &MappedStatement, bounds: RowBounds, bound_sql: &BoundSql) -> MapperResult<CacheKey> {
		self.delegate.create_cache_key(ms, bounds, bound_sql)
	}

	fn is_cached(&self, key: &CacheKey) -> bool {
		self.delegate.is_cached(key)
	}

	fn clear_local_cache(&mut self) {
		self.delegate.clear_local_cache();
	}

	fn close(&mut self, force_rollback: bool) {
		if self.delegate.is_closed() {
			return;
		}
		if force_rollback {
			self.shared.rollback();
		} else if let Err(e) = self.shared.commit() {
			warn!(error = %e, "Failed to commit cached results on close");
		}
		self.delegate.close(force_rollback);
	}

	fn is_closed(&self) -> bool {
		self.delegate.is_closed()
	}
}
