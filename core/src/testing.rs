//! In-memory collaborators shared by the unit tests

use crate::cache::{Cache, CacheKey, CachedRows, PerpetualCache};
use crate::error::{MapperError, MapperResult};
use crate::executor::{BoundStatement, QueryOutput, Row, RowSource, Transaction, TransactionFactory};
use crate::types::SqlValue;
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[derive(Debug, Clone, PartialEq)]
pub enum CacheOp {
	Get(CacheKey),
	Put(CacheKey, Option<CachedRows>),
	Remove(CacheKey),
	Clear,
}

/// Shared cache that records every call made on it
#[derive(Debug)]
pub struct RecordingCache {
	inner: PerpetualCache,
	ops: Mutex<Vec<CacheOp>>,
	fail_removes: AtomicBool,
}

impl RecordingCache {
	pub fn new(id: &str) -> Self {
		Self {
			inner: PerpetualCache::new(id),
			ops: Mutex::new(Vec::new()),
			fail_removes: AtomicBool::new(false),
		}
	}

	pub fn ops(&self) -> Vec<CacheOp> {
		self.ops.lock().clone()
	}

	pub fn take_ops(&self) -> Vec<CacheOp> {
		std::mem::take(&mut *self.ops.lock())
	}

	pub fn fail_removes(&self, fail: bool) {
		self.fail_removes.store(fail, Ordering::SeqCst);
	}
}

impl Cache for RecordingCache {
	fn id(&self) -> &str {
		self.inner.id()
	}

	fn size(&self) -> usize {
		self.inner.size()
	}

	fn get(&self, key: &CacheKey) -> MapperResult<Option<CachedRows>> {
		self.ops.lock().push(CacheOp::Get(key.clone()));
		self.inner.get(key)
	}

	fn put(&self, key: CacheKey, value: Option<CachedRows>) -> MapperResult<()> {
		self.ops.lock().push(CacheOp::Put(key.clone(), value.clone()));
		self.inner.put(key, value)
	}

	fn remove(&self, key: &CacheKey) -> MapperResult<()> {
		self.ops.lock().push(CacheOp::Remove(key.clone()));
		if self.fail_removes.load(Ordering::SeqCst) {
			return Err(MapperError::Cache("remove rejected".into()));
		}
		self.inner.remove(key)
	}

	fn clear(&self) -> MapperResult<()> {
		self.ops.lock().push(CacheOp::Clear);
		self.inner.clear()
	}
}

pub fn row(columns: &[&str], values: Vec<SqlValue>) -> Row {
	Row::new(columns.iter().map(|c| c.to_string()).collect(), values)
}

#[derive(Debug)]
struct Script {
	sql: String,
	params: Option<Vec<SqlValue>>,
	rows: Vec<Row>,
	out_params: BTreeMap<String, SqlValue>,
}

#[derive(Debug, Default)]
struct BackendState {
	scripts: Vec<Script>,
	executed: Vec<BoundStatement>,
	fail_on: Option<String>,
	affected: usize,
}

/// Scripted database: answers queries by SQL text (and optionally by
/// parameter values) and records everything it is asked to run.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
	state: Mutex<BackendState>,
	commits: AtomicUsize,
	rollbacks: AtomicUsize,
	closes: AtomicUsize,
	stream_closes: Arc<AtomicUsize>,
}

impl ScriptedBackend {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// Rows returned for `sql` whatever the parameters
	pub fn rows(&self, sql: &str, rows: Vec<Row>) {
		self.script(sql, None, rows, BTreeMap::new());
	}

	/// Rows returned for `sql` bound with exactly `params`
	pub fn rows_for(&self, sql: &str, params: Vec<SqlValue>, rows: Vec<Row>) {
		self.script(sql, Some(params), rows, BTreeMap::new());
	}

	pub fn out_params(&self, sql: &str, rows: Vec<Row>, out: &[(&str, SqlValue)]) {
		let out = out.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
		self.script(sql, None, rows, out);
	}

	fn script(&self, sql: &str, params: Option<Vec<SqlValue>>, rows: Vec<Row>, out_params: BTreeMap<String, SqlValue>) {
		self.state.lock().scripts.push(Script {
			sql: sql.to_string(),
			params,
			rows,
			out_params,
		});
	}

	/// Any statement whose SQL contains `fragment` fails
	pub fn fail_on(&self, fragment: Option<&str>) {
		self.state.lock().fail_on = fragment.map(str::to_string);
	}

	pub fn affected(&self, count: usize) {
		self.state.lock().affected = count;
	}

	pub fn executed(&self) -> Vec<BoundStatement> {
		self.state.lock().executed.clone()
	}

	pub fn executed_sql(&self) -> Vec<String> {
		self.state.lock().executed.iter().map(|s| s.sql.clone()).collect()
	}

	pub fn commits(&self) -> usize {
		self.commits.load(Ordering::SeqCst)
	}

	pub fn rollbacks(&self) -> usize {
		self.rollbacks.load(Ordering::SeqCst)
	}

	pub fn closes(&self) -> usize {
		self.closes.load(Ordering::SeqCst)
	}

	pub fn stream_closes(&self) -> usize {
		self.stream_closes.load(Ordering::SeqCst)
	}

	pub fn transaction(self: &Arc<Self>) -> Box<dyn Transaction> {
		Box::new(ScriptedTransaction {
			backend: self.clone(),
		})
	}

	fn run(&self, stmt: &BoundStatement) -> MapperResult<QueryOutput> {
		let mut state = self.state.lock();
		state.executed.push(stmt.clone());
		if let Some(fragment) = &state.fail_on
			&& stmt.sql.contains(fragment.as_str())
		{
			return Err(MapperError::execution(&stmt.statement_id, "scripted failure"));
		}

		let values: Vec<SqlValue> = stmt.params.iter().map(|p| p.value.clone()).collect();
		let script = state
			.scripts
			.iter()
			.rev()
			.find(|s| s.sql == stmt.sql && s.params.as_ref().is_some_and(|p| *p == values))
			.or_else(|| {
				state
					.scripts
					.iter()
					.rev()
					.find(|s| s.sql == stmt.sql && s.params.is_none())
			});

		Ok(match script {
			Some(script) => QueryOutput {
				rows: script.rows.clone(),
				out_params: script.out_params.clone(),
			},
			None => QueryOutput::default(),
		})
	}
}

/// Factory handing out transactions over one shared [`ScriptedBackend`]
#[derive(Debug)]
pub struct ScriptedFactory(pub Arc<ScriptedBackend>);

impl TransactionFactory for ScriptedFactory {
	fn new_transaction(&self, _autocommit: bool) -> MapperResult<Box<dyn Transaction>> {
		Ok(self.0.transaction())
	}
}

#[derive(Debug)]
struct ScriptedTransaction {
	backend: Arc<ScriptedBackend>,
}

impl Transaction for ScriptedTransaction {
	fn query(&mut self, stmt: &BoundStatement) -> MapperResult<QueryOutput> {
		self.backend.run(stmt)
	}

	fn execute(&mut self, stmt: &BoundStatement) -> MapperResult<usize> {
		self.backend.run(stmt)?;
		Ok(self.backend.state.lock().affected)
	}

	fn query_stream(&mut self, stmt: &BoundStatement) -> MapperResult<Box<dyn RowSource>> {
		let output = self.backend.run(stmt)?;
		Ok(Box::new(VecRowSource::new(output.rows).with_close_counter(self.backend.stream_closes.clone())))
	}

	fn commit(&mut self) -> MapperResult<()> {
		self.backend.commits.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}

	fn rollback(&mut self) -> MapperResult<()> {
		self.backend.rollbacks.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}

	fn close(&mut self) -> MapperResult<()> {
		self.backend.closes.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}
}

/// Row source over a fixed list of rows
#[derive(Debug)]
pub struct VecRowSource {
	rows: VecDeque<Row>,
	fetched: Arc<AtomicUsize>,
	closes: Arc<AtomicUsize>,
	fail_at: Option<usize>,
	fail_close: bool,
}

impl VecRowSource {
	pub fn new(rows: Vec<Row>) -> Self {
		Self {
			rows: rows.into(),
			fetched: Arc::new(AtomicUsize::new(0)),
			closes: Arc::new(AtomicUsize::new(0)),
			fail_at: None,
			fail_close: false,
		}
	}

	pub fn with_close_counter(mut self, closes: Arc<AtomicUsize>) -> Self {
		self.closes = closes;
		self
	}

	/// Error instead of returning the row at position `index`
	pub fn fail_at(mut self, index: usize) -> Self {
		self.fail_at = Some(index);
		self
	}

	pub fn fail_close(mut self) -> Self {
		self.fail_close = true;
		self
	}

	pub fn fetched_counter(&self) -> Arc<AtomicUsize> {
		self.fetched.clone()
	}

	pub fn close_counter(&self) -> Arc<AtomicUsize> {
		self.closes.clone()
	}
}

impl RowSource for VecRowSource {
	fn next_row(&mut self) -> MapperResult<Option<Row>> {
		let position = self.fetched.load(Ordering::SeqCst);
		if self.fail_at == Some(position) {
			return Err(MapperError::Execution("row source failed".into()));
		}
		let row = self.rows.pop_front();
		if row.is_some() {
			self.fetched.fetch_add(1, Ordering::SeqCst);
		}
		Ok(row)
	}

	fn close(&mut self) -> MapperResult<()> {
		self.closes.fetch_add(1, Ordering::SeqCst);
		if self.fail_close {
			return Err(MapperError::Execution("close failed".into()));
		}
		Ok(())
	}
}
