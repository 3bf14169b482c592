use super::Executor;
use super::backend::{BoundStatement, Transaction};
use super::caching::SharedCacheHandle;
use super::deferred::{DeferredLoad, ResultExtractor};
use super::local::{LocalCache, LocalEntry};
use super::mapper::RowMapper;
use super::result::Row;
use crate::cache::CacheKey;
use crate::config::{Configuration, LocalCacheScope};
use crate::cursor::Cursor;
use crate::error::{MapperError, MapperResult};
use crate::mapping::{BoundSql, MappedStatement, RowBounds, TargetType};
use crate::types::SqlValue;
use crate::value::{PropertyPath, Record, Value};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};

/// Executor owning the transaction and the session cache.
///
/// Nested selects re-enter [`BaseExecutor::query_with_key`], through the
/// attached shared caches when there are any; `query_stack` counts the
/// depth so deferred loads and statement-scoped cache clearing only happen
/// once the outermost query returns.
pub struct BaseExecutor {
	config: Arc<Configuration>,
	transaction: Box<dyn Transaction>,
	local_cache: LocalCache,
	shared_cache: Option<SharedCacheHandle>,
	deferred_loads: VecDeque<DeferredLoad>,
	query_stack: usize,
	closed: bool,
}

impl BaseExecutor {
	pub fn new(config: Arc<Configuration>, transaction: Box<dyn Transaction>) -> Self {
		Self {
			config,
			transaction,
			local_cache: LocalCache::new(),
			shared_cache: None,
			deferred_loads: VecDeque::new(),
			query_stack: 0,
			closed: false,
		}
	}

	pub fn local_cache(&self) -> &LocalCache {
		&self.local_cache
	}

	pub fn pending_deferred_loads(&self) -> usize {
		self.deferred_loads.len()
	}

	fn ensure_open(&self) -> MapperResult<()> {
		if self.closed {
			return Err(MapperError::ExecutorClosed);
		}
		Ok(())
	}

	fn database_id(&self) -> Option<&str> {
		self.config.settings().database_id.as_deref()
	}

	fn row_mapper(&self, ms: &MappedStatement) -> RowMapper {
		RowMapper::new(
			ms.result_map.clone(),
			self.config.type_handlers().clone(),
			self.config.settings().map_underscore_to_camel_case,
		)
	}

	fn prepare(&self, ms: &MappedStatement, bound_sql: &BoundSql) -> MapperResult<BoundStatement> {
		let stmt = BoundStatement::prepare(ms, bound_sql, self.config.type_handlers())?;
		debug!(statement = %ms.id, "==>  Preparing: {}", stmt.sql);
		debug!(statement = %ms.id, "==> Parameters: {}", stmt.parameter_summary());
		Ok(stmt)
	}

	fn query_from_cache_or_database(
		&mut self,
		ms: &MappedStatement,
		parameter: &Value,
		bounds: RowBounds,
		key: CacheKey,
		bound_sql: &BoundSql,
	) -> MapperResult<Vec<Value>> {
		match self.local_cache.get(&key) {
			Some(LocalEntry::Loaded(rows)) => {
				let rows = rows.clone();
				debug!(statement = %ms.id, "Session cache hit");
				if ms.is_callable() {
					self.restore_out_params(&key, parameter)?;
				}
				Ok(rows)
			}
			Some(LocalEntry::Executing) => Err(MapperError::RecursiveQuery(ms.id.clone())),
			None => self.query_from_database(ms, parameter, bounds, key, bound_sql),
		}
	}

	fn query_from_database(
		&mut self,
		ms: &MappedStatement,
		parameter: &Value,
		bounds: RowBounds,
		key: CacheKey,
		bound_sql: &BoundSql,
	) -> MapperResult<Vec<Value>> {
		self.local_cache.mark_executing(key.clone());
		let result = self.do_query(ms, parameter, bounds, bound_sql);
		self.local_cache.remove(&key);

		let (rows, out_params) = result?;
		if ms.is_callable() {
			self.local_cache.store_out_params(key.clone(), out_params);
		}
		self.local_cache.store(key, rows.clone());
		Ok(rows)
	}

	fn do_query(
		&mut self,
		ms: &MappedStatement,
		parameter: &Value,
		bounds: RowBounds,
		bound_sql: &BoundSql,
	) -> MapperResult<(Vec<Value>, Vec<(String, Value)>)> {
		let stmt = self.prepare(ms, bound_sql)?;
		let output = self.transaction.query(&stmt)?;

		let mapper = self.row_mapper(ms);
		let mut results = Vec::new();
		for row in output.rows.iter().skip(bounds.offset).take(bounds.limit) {
			let value = mapper.map_row(row)?;
			self.resolve_nested_selects(&mapper, row, &value)?;
			results.push(value);
		}
		debug!(statement = %ms.id, "<==      Total: {}", results.len());

		let out_params = if ms.is_callable() {
			self.apply_out_params(bound_sql, parameter, &output.out_params)?
		} else {
			Vec::new()
		};
		Ok((results, out_params))
	}

	/// Run or defer every nested select of the row's result map.
	fn resolve_nested_selects(&mut self, mapper: &RowMapper, row: &Row, value: &Value) -> MapperResult<()> {
		let Value::Record(target) = value else {
			return Ok(());
		};

		for (mapping, nested) in mapper.result_map().nested_selects() {
			let parameter = mapper.nested_parameter(row, &nested.column)?;
			if parameter.is_null() {
				continue;
			}

			let nested_ms = self.config.statement(&nested.statement)?;
			let nested_sql = nested_ms.bound_sql(&parameter, self.database_id())?;
			let key = self.create_cache_key(&nested_ms, RowBounds::DEFAULT, &nested_sql)?;
			let property = PropertyPath::parse(&mapping.property)?;

			if self.local_cache.contains(&key) {
				self.defer_load(target.clone(), property, key, nested.target)?;
			} else {
				let rows = self.nested_query(&nested_ms, &parameter, key, &nested_sql)?;
				property.set(target, ResultExtractor::extract(&rows, nested.target)?)?;
			}
		}
		Ok(())
	}

	fn nested_query(
		&mut self,
		ms: &MappedStatement,
		parameter: &Value,
		key: CacheKey,
		bound_sql: &BoundSql,
	) -> MapperResult<Vec<Value>> {
		match self.shared_cache.clone() {
			Some(shared) => shared.query(ms, key, bound_sql, |key| {
				self.query_with_key(ms, parameter, RowBounds::DEFAULT, key, bound_sql)
			}),
			None => self.query_with_key(ms, parameter, RowBounds::DEFAULT, key, bound_sql),
		}
	}

	fn defer_load(
		&mut self,
		target: Record,
		property: PropertyPath,
		key: CacheKey,
		target_type: TargetType,
	) -> MapperResult<()> {
		let load = DeferredLoad::new(target, property, key, target_type);
		if load.can_load(&self.local_cache) {
			load.load(&self.local_cache)
		} else {
			self.deferred_loads.push_back(load);
			Ok(())
		}
	}

	fn run_deferred_loads(&mut self) -> MapperResult<()> {
		let loads = std::mem::take(&mut self.deferred_loads);
		for load in loads {
			load.load(&self.local_cache)?;
		}
		Ok(())
	}

	/// Copy OUT parameter values onto the parameter record.
	fn apply_out_params(
		&self,
		bound_sql: &BoundSql,
		parameter: &Value,
		out_params: &BTreeMap<String, SqlValue>,
	) -> MapperResult<Vec<(String, Value)>> {
		let mut applied = Vec::new();
		for mapping in bound_sql.parameter_mappings().iter().filter(|m| m.mode.is_output()) {
			let Value::Record(record) = parameter else {
				return Err(MapperError::Binding(format!(
					"OUT parameter '{}' needs a record parameter object",
					mapping.property
				)));
			};
			let handler = match &mapping.type_handler {
				Some(name) => self.config.type_handlers().named(name)?,
				None => self.config.type_handlers().handler(mapping.java_type),
			};
			let raw = out_params.get(&mapping.property).unwrap_or(&SqlValue::Null);
			let value = handler.from_sql(raw)?;
			mapping.path.set(record, value.clone())?;
			applied.push((mapping.property.clone(), value));
		}
		Ok(applied)
	}

	fn restore_out_params(&self, key: &CacheKey, parameter: &Value) -> MapperResult<()> {
		let (Some(values), Value::Record(record)) = (self.local_cache.out_params(key), parameter) else {
			return Ok(());
		};
		for (property, value) in values {
			PropertyPath::parse(property)?.set(record, value.clone())?;
		}
		Ok(())
	}
}

/// Cache key of one query: statement id, bounds, SQL text, input parameter
/// values and the environment id, in that order.
pub fn fingerprint(
	config: &Configuration,
	ms: &MappedStatement,
	bounds: RowBounds,
	bound_sql: &BoundSql,
) -> MapperResult<CacheKey> {
	let mut key = CacheKey::new();
	key.update(ms.id.as_str());
	key.update(bounds.offset);
	key.update(bounds.limit);
	key.update(bound_sql.sql());

	let values = bound_sql.parameter_values()?;
	for (mapping, value) in bound_sql.parameter_mappings().iter().zip(values) {
		if mapping.mode.is_input() {
			key.update(value);
		}
	}

	if let Some(environment) = &config.settings().environment_id {
		key.update(environment.as_str());
	}
	Ok(key)
}

impl Executor for BaseExecutor {
	fn query(&mut self, ms: &MappedStatement, parameter: &Value, bounds: RowBounds) -> MapperResult<Vec<Value>> {
		self.ensure_open()?;
		let bound_sql = ms.bound_sql(parameter, self.database_id())?;
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
		if self.query_stack == 0 && ms.flush_cache {
			self.clear_local_cache();
		}

		self.query_stack += 1;
		let result = self.query_from_cache_or_database(ms, parameter, bounds, key, bound_sql);
		self.query_stack -= 1;

		if self.query_stack == 0 {
			let loaded = match &result {
				Ok(_) => self.run_deferred_loads(),
				Err(_) => {
					self.deferred_loads.clear();
					Ok(())
				}
			};
			if self.config.settings().local_cache_scope == LocalCacheScope::Statement {
				self.clear_local_cache();
			}
			loaded?;
		}
		result
	}

	fn query_cursor(&mut self, ms: &MappedStatement, parameter: &Value, bounds: RowBounds) -> MapperResult<Cursor> {
		self.ensure_open()?;
		let bound_sql = ms.bound_sql(parameter, self.database_id())?;
		let stmt = self.prepare(ms, &bound_sql)?;
		let source = self.transaction.query_stream(&stmt)?;
		Ok(Cursor::new(source, bounds, self.row_mapper(ms)))
	}

	fn update(&mut self, ms: &MappedStatement, parameter: &Value) -> MapperResult<usize> {
		self.ensure_open()?;
		self.clear_local_cache();
		let bound_sql = ms.bound_sql(parameter, self.database_id())?;
		let stmt = self.prepare(ms, &bound_sql)?;
		let updated = self.transaction.execute(&stmt)?;
		debug!(statement = %ms.id, "<==    Updates: {updated}");
		Ok(updated)
	}

	fn commit(&mut self, required: bool) -> MapperResult<()> {
		self.ensure_open()?;
		self.clear_local_cache();
		if required {
			self.transaction.commit()?;
		}
		Ok(())
	}

	fn rollback(&mut self, required: bool) -> MapperResult<()> {
		self.ensure_open()?;
		self.clear_local_cache();
		if required {
			self.transaction.rollback()?;
		}
		Ok(())
	}

	fn create_cache_key(&self, ms: &MappedStatement, bounds: RowBounds, bound_sql: &BoundSql) -> MapperResult<CacheKey> {
		self.ensure_open()?;
		fingerprint(&self.config, ms, bounds, bound_sql)
	}

	fn is_cached(&self, key: &CacheKey) -> bool {
		self.local_cache.is_loaded(key)
	}

	fn clear_local_cache(&mut self) {
		if !self.closed {
			self.local_cache.clear();
		}
	}

	fn close(&mut self, force_rollback: bool) {
		if self.closed {
			return;
		}
		if let Err(e) = self.rollback(force_rollback) {
			warn!(error = %e, "Unexpected exception on closing transaction");
		}
		if let Err(e) = self.transaction.close() {
			warn!(error = %e, "Unexpected exception on closing transaction");
		}
		self.local_cache.clear();
		self.deferred_loads.clear();
		self.closed = true;
	}

	fn is_closed(&self) -> bool {
		self.closed
	}

	fn attach_shared_cache(&mut self, shared: SharedCacheHandle) {
		self.shared_cache = Some(shared);
	}
}
