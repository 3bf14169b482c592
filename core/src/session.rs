//! Sessions: the user-facing unit of work over one executor

use crate::config::Configuration;
use crate::cursor::Cursor;
use crate::error::{MapperError, MapperResult};
use crate::executor::{BaseExecutor, CachingExecutor, Executor, Transaction};
use crate::mapping::{MappedStatement, RowBounds};
use crate::plugin::{Invocation, Operation, Outcome};
use crate::value::Value;
use std::sync::Arc;
use tracing::{Span, debug, debug_span};
use uuid::Uuid;

/// Opens sessions against one configuration
#[derive(Debug, Clone)]
pub struct SqlSessionFactory {
	config: Arc<Configuration>,
}

impl SqlSessionFactory {
	pub fn new(config: Arc<Configuration>) -> Self {
		Self { config }
	}

	pub fn configuration(&self) -> &Arc<Configuration> {
		&self.config
	}

	/// Open a session on a transaction from the configured factory.
	pub fn open_session(&self, autocommit: bool) -> MapperResult<SqlSession> {
		let factory = self
			.config
			.transaction_factory()
			.ok_or_else(|| MapperError::Config("no transaction factory configured".into()))?;
		let transaction = factory.new_transaction(autocommit)?;
		Ok(self.open_session_with(transaction, autocommit))
	}

	pub fn open_session_with(&self, transaction: Box<dyn Transaction>, autocommit: bool) -> SqlSession {
		let base = BaseExecutor::new(self.config.clone(), transaction);
		let executor: Box<dyn Executor> = if self.config.settings().cache_enabled {
			Box::new(CachingExecutor::new(Box::new(base), self.config.clone()))
		} else {
			Box::new(base)
		};
		SqlSession::new(self.config.clone(), executor, autocommit)
	}
}

/// One conversation with the database.
///
/// Not shared between threads; every operation takes `&mut self`.
/// Writes mark the session dirty so that a later commit or rollback
/// reaches the transaction even without `force`.
pub struct SqlSession {
	id: Uuid,
	config: Arc<Configuration>,
	executor: Box<dyn Executor>,
	autocommit: bool,
	dirty: bool,
	span: Span,
}

impl SqlSession {
	pub fn new(config: Arc<Configuration>, executor: Box<dyn Executor>, autocommit: bool) -> Self {
		let id = Uuid::new_v4();
		let span = debug_span!("sql_session", id = %id);
		debug!(parent: &span, autocommit, "Opened session");
		Self {
			id,
			config,
			executor,
			autocommit,
			dirty: false,
			span,
		}
	}

	pub fn id(&self) -> Uuid {
		self.id
	}

	pub fn is_dirty(&self) -> bool {
		self.dirty
	}

	pub fn configuration(&self) -> &Arc<Configuration> {
		&self.config
	}

	pub fn select_list(&mut self, statement: &str, parameter: &Value) -> MapperResult<Vec<Value>> {
		self.select_list_bounded(statement, parameter, RowBounds::DEFAULT)
	}

	pub fn select_list_bounded(
		&mut self,
		statement: &str,
		parameter: &Value,
		bounds: RowBounds,
	) -> MapperResult<Vec<Value>> {
		let span = self.span.clone();
		let _enter = span.enter();

		let ms = self.config.statement(statement)?;
		let parameter = wrap_collection(parameter);
		let invocation = Invocation::statement(Operation::Query, &ms, &parameter, bounds);
		let executor = &mut self.executor;
		self.config
			.interceptors()
			.run(&invocation, || executor.query(&ms, &parameter, bounds).map(Outcome::Rows))?
			.into_rows()
	}

	/// Zero rows give `Null`; more than one is an error.
	pub fn select_one(&mut self, statement: &str, parameter: &Value) -> MapperResult<Value> {
		let mut rows = self.select_list(statement, parameter)?;
		match rows.len() {
			0 => Ok(Value::Null),
			1 => Ok(rows.swap_remove(0)),
			found => Err(MapperError::TooManyResults {
				statement: statement.to_string(),
				found,
			}),
		}
	}

	pub fn select_cursor(&mut self, statement: &str, parameter: &Value) -> MapperResult<Cursor> {
		self.select_cursor_bounded(statement, parameter, RowBounds::DEFAULT)
	}

	pub fn select_cursor_bounded(
		&mut self,
		statement: &str,
		parameter: &Value,
		bounds: RowBounds,
	) -> MapperResult<Cursor> {
		let span = self.span.clone();
		let _enter = span.enter();

		let ms = self.config.statement(statement)?;
		let parameter = wrap_collection(parameter);
		let invocation = Invocation::statement(Operation::QueryCursor, &ms, &parameter, bounds);
		let executor = &mut self.executor;
		self.config
			.interceptors()
			.run(&invocation, || {
				executor.query_cursor(&ms, &parameter, bounds).map(Outcome::Cursor)
			})?
			.into_cursor()
	}

	pub fn insert(&mut self, statement: &str, parameter: &Value) -> MapperResult<usize> {
		self.update(statement, parameter)
	}

	pub fn delete(&mut self, statement: &str, parameter: &Value) -> MapperResult<usize> {
		self.update(statement, parameter)
	}

	pub fn update(&mut self, statement: &str, parameter: &Value) -> MapperResult<usize> {
		let span = self.span.clone();
		let _enter = span.enter();

		let ms = self.config.statement(statement)?;
		self.dirty = true;
		self.run_update(&ms, &wrap_collection(parameter))
	}

	fn run_update(&mut self, ms: &MappedStatement, parameter: &Value) -> MapperResult<usize> {
		let invocation = Invocation::statement(Operation::Update, ms, parameter, RowBounds::DEFAULT);
		let executor = &mut self.executor;
		self.config
			.interceptors()
			.run(&invocation, || executor.update(ms, parameter).map(Outcome::Affected))?
			.into_affected()
	}

	pub fn commit(&mut self, force: bool) -> MapperResult<()> {
		let span = self.span.clone();
		let _enter = span.enter();

		let required = self.is_commit_or_rollback_required(force);
		let invocation = Invocation::transaction(Operation::Commit, required);
		let executor = &mut self.executor;
		self.config
			.interceptors()
			.run(&invocation, || executor.commit(required).map(|_| Outcome::Done))?
			.into_done()?;
		self.dirty = false;
		Ok(())
	}

	pub fn rollback(&mut self, force: bool) -> MapperResult<()> {
		let span = self.span.clone();
		let _enter = span.enter();

		let required = self.is_commit_or_rollback_required(force);
		let invocation = Invocation::transaction(Operation::Rollback, required);
		let executor = &mut self.executor;
		self.config
			.interceptors()
			.run(&invocation, || executor.rollback(required).map(|_| Outcome::Done))?
			.into_done()?;
		self.dirty = false;
		Ok(())
	}

	pub fn clear_cache(&mut self) {
		self.executor.clear_local_cache();
	}

	/// Close the executor, rolling back uncommitted writes. Closing twice
	/// is a no-op.
	pub fn close(&mut self) {
		if self.executor.is_closed() {
			return;
		}
		let span = self.span.clone();
		let _enter = span.enter();

		let force_rollback = self.is_commit_or_rollback_required(false);
		self.executor.close(force_rollback);
		self.dirty = false;
		debug!(rolled_back = force_rollback, "Closed session");
	}

	pub fn is_closed(&self) -> bool {
		self.executor.is_closed()
	}

	fn is_commit_or_rollback_required(&self, force: bool) -> bool {
		(!self.autocommit && self.dirty) || force
	}
}

impl Drop for SqlSession {
	fn drop(&mut self) {
		self.close();
	}
}

/// Lists are exposed to templates as `collection` and `list`.
pub fn wrap_collection(parameter: &Value) -> Value {
	match parameter {
		Value::List(_) => Value::record([("collection", parameter.clone()), ("list", parameter.clone())]),
		other => other.clone(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::cache::CacheConfig;
	use crate::config::Settings;
	use crate::mapping::StatementKind;
	use crate::plugin::Interceptor;
	use crate::scripting::{SqlNode, SqlSource};
	use crate::testing::{ScriptedBackend, ScriptedFactory, row};
	use crate::types::SqlValue;
	use parking_lot::Mutex;
	use pretty_assertions::assert_eq;

	const FIND: &str = "select id, title from blog where id = ?";
	const ALL: &str = "select id, title from blog";

	fn statement(id: &str, kind: StatementKind, sql: &str) -> MappedStatement {
		MappedStatement::new(id, kind, SqlSource::raw(sql).unwrap())
	}

	fn factory(backend: &Arc<ScriptedBackend>, settings: Settings) -> SqlSessionFactory {
		let ids = SqlNode::Mixed(vec![
			SqlNode::text("select id from blog where id in ", None),
			SqlNode::ForEach(
				crate::scripting::ForEachNode::new("list", SqlNode::text("#{id}", None))
					.unwrap()
					.item("id")
					.open_close("(", ")")
					.separator(","),
			),
		]);
		let config = Configuration::builder(settings)
			.cache_config("blog", CacheConfig::default())
			.add_statement(
				statement("blog.find", StatementKind::Select, "select id, title from blog where id = #{id}")
					.with_cache("blog"),
			)
			.add_statement(statement("blog.all", StatementKind::Select, ALL))
			.add_statement(MappedStatement::new(
				"blog.byIds",
				StatementKind::Select,
				SqlSource::from_node(ids).unwrap(),
			))
			.add_statement(statement(
				"blog.rename",
				StatementKind::Update,
				"update blog set title = #{title} where id = #{id}",
			))
			.transaction_factory(Arc::new(ScriptedFactory(backend.clone())))
			.build()
			.unwrap();
		SqlSessionFactory::new(config)
	}

	fn blog_rows(backend: &ScriptedBackend) {
		backend.rows_for(
			FIND,
			vec![SqlValue::BigInt(1)],
			vec![row(&["id", "title"], vec![SqlValue::BigInt(1), SqlValue::Varchar("one".into())])],
		);
		backend.rows(
			ALL,
			vec![
				row(&["id", "title"], vec![SqlValue::BigInt(1), SqlValue::Varchar("one".into())]),
				row(&["id", "title"], vec![SqlValue::BigInt(2), SqlValue::Varchar("two".into())]),
			],
		);
	}

	#[test]
	fn test_select_one() {
		let backend = ScriptedBackend::new();
		blog_rows(&backend);
		let mut session = factory(&backend, Settings::default()).open_session(false).unwrap();

		let blog = session.select_one("blog.find", &Value::Int(1)).unwrap();
		assert_eq!(blog, Value::record([("id", Value::Int(1)), ("title", Value::from("one"))]));

		assert_eq!(session.select_one("blog.find", &Value::Int(9)).unwrap(), Value::Null);

		let err = session.select_one("blog.all", &Value::Null).unwrap_err();
		assert!(matches!(err, MapperError::TooManyResults { found: 2, .. }));

		assert!(matches!(
			session.select_list("blog.missing", &Value::Null),
			Err(MapperError::StatementNotFound(_))
		));
	}

	#[test]
	fn test_list_parameter_is_wrapped() {
		let backend = ScriptedBackend::new();
		let mut session = factory(&backend, Settings::default()).open_session(false).unwrap();

		session
			.select_list("blog.byIds", &Value::List(vec![Value::Int(1), Value::Int(2)]))
			.unwrap();
		let executed = backend.executed();
		assert_eq!(executed[0].sql, "select id from blog where id in (?,?)");
		let values: Vec<SqlValue> = executed[0].params.iter().map(|p| p.value.clone()).collect();
		assert_eq!(values, vec![SqlValue::BigInt(1), SqlValue::BigInt(2)]);
	}

	#[test]
	fn test_commit_and_rollback_required() {
		let backend = ScriptedBackend::new();
		let factory = factory(&backend, Settings::default());
		let mut session = factory.open_session(false).unwrap();

		// nothing written yet, so nothing reaches the transaction
		session.commit(false).unwrap();
		session.rollback(false).unwrap();
		assert_eq!((backend.commits(), backend.rollbacks()), (0, 0));

		session
			.update("blog.rename", &Value::record([("id", Value::Int(1)), ("title", Value::from("x"))]))
			.unwrap();
		assert!(session.is_dirty());
		session.commit(false).unwrap();
		assert_eq!(backend.commits(), 1);
		assert!(!session.is_dirty());

		session.rollback(true).unwrap();
		assert_eq!(backend.rollbacks(), 1);

		let mut auto = factory.open_session(true).unwrap();
		auto.insert("blog.rename", &Value::record([("id", Value::Int(2)), ("title", Value::from("y"))]))
			.unwrap();
		auto.commit(false).unwrap();
		assert_eq!(backend.commits(), 1);
	}

	#[test]
	fn test_close_rolls_back_dirty_session() {
		let backend = ScriptedBackend::new();
		let mut session = factory(&backend, Settings::default()).open_session(false).unwrap();

		session
			.delete("blog.rename", &Value::record([("id", Value::Int(1)), ("title", Value::Null)]))
			.unwrap();
		session.close();
		session.close();
		assert!(session.is_closed());
		assert_eq!(backend.rollbacks(), 1);
		assert_eq!(backend.closes(), 1);

		assert!(matches!(
			session.select_list("blog.all", &Value::Null),
			Err(MapperError::ExecutorClosed)
		));
		drop(session);
		assert_eq!(backend.closes(), 1);
	}

	#[test]
	fn test_session_cache_and_shared_cache() {
		let backend = ScriptedBackend::new();
		blog_rows(&backend);
		let factory = factory(&backend, Settings::default());

		let mut first = factory.open_session(false).unwrap();
		first.select_list("blog.find", &Value::Int(1)).unwrap();
		first.select_list("blog.find", &Value::Int(1)).unwrap();
		assert_eq!(backend.executed().len(), 1);

		first.clear_cache();
		first.select_list("blog.find", &Value::Int(1)).unwrap();
		assert_eq!(backend.executed().len(), 2);
		first.commit(false).unwrap();

		let mut second = factory.open_session(false).unwrap();
		second.select_list("blog.find", &Value::Int(1)).unwrap();
		assert_eq!(backend.executed().len(), 2);
	}

	#[test]
	fn test_closed_session_reports_closed_first() {
		let backend = ScriptedBackend::new();
		blog_rows(&backend);
		let mut session = factory(&backend, Settings::default()).open_session(false).unwrap();
		session.close();

		// the parameter lacks `id`, but the closed executor is reported first
		let unbindable = Value::record([("other", Value::Int(1))]);
		assert!(matches!(
			session.select_list("blog.find", &unbindable),
			Err(MapperError::ExecutorClosed)
		));
		assert!(matches!(session.update("blog.rename", &unbindable), Err(MapperError::ExecutorClosed)));
		assert!(matches!(session.commit(true), Err(MapperError::ExecutorClosed)));
		assert!(backend.executed().is_empty());
	}

	#[test]
	fn test_without_transaction_factory() {
		let config = Configuration::builder(Settings::default()).build().unwrap();
		let factory = SqlSessionFactory::new(config);
		assert!(matches!(factory.open_session(true), Err(MapperError::Config(_))));

		let backend = ScriptedBackend::new();
		let session = factory.open_session_with(backend.transaction(), true);
		assert!(!session.is_closed());
	}

	#[derive(Debug)]
	struct Tracer {
		name: &'static str,
		log: Arc<Mutex<Vec<String>>>,
	}

	impl Interceptor for Tracer {
		fn name(&self) -> &str {
			self.name
		}

		fn signatures(&self) -> &[Operation] {
			&[Operation::Query, Operation::Commit]
		}

		fn intercept(
			&self,
			invocation: &Invocation<'_>,
			proceed: &mut dyn FnMut() -> MapperResult<Outcome>,
		) -> MapperResult<Outcome> {
			let target = invocation.statement.map(|ms| ms.id.clone()).unwrap_or_default();
			self.log.lock().push(format!("{} before {:?} {target}", self.name, invocation.operation));
			let outcome = proceed();
			self.log.lock().push(format!("{} after", self.name));
			outcome
		}
	}

	#[derive(Debug)]
	struct Blocker;

	impl Interceptor for Blocker {
		fn name(&self) -> &str {
			"blocker"
		}

		fn signatures(&self) -> &[Operation] {
			&[Operation::Update]
		}

		fn intercept(
			&self,
			_invocation: &Invocation<'_>,
			_proceed: &mut dyn FnMut() -> MapperResult<Outcome>,
		) -> MapperResult<Outcome> {
			Ok(Outcome::Affected(0))
		}
	}

	#[test]
	fn test_interceptors_wrap_operations() {
		let backend = ScriptedBackend::new();
		blog_rows(&backend);
		let log = Arc::new(Mutex::new(Vec::new()));
		let config = Configuration::builder(Settings::default())
			.add_statement(statement("blog.all", StatementKind::Select, ALL))
			.add_statement(statement("blog.wipe", StatementKind::Delete, "delete from blog"))
			.interceptor(Arc::new(Tracer {
				name: "outer",
				log: log.clone(),
			}))
			.interceptor(Arc::new(Tracer {
				name: "inner",
				log: log.clone(),
			}))
			.interceptor(Arc::new(Blocker))
			.build()
			.unwrap();
		let mut session = SqlSessionFactory::new(config).open_session_with(backend.transaction(), false);

		assert_eq!(session.select_list("blog.all", &Value::Null).unwrap().len(), 2);
		assert_eq!(
			*log.lock(),
			vec![
				"outer before Query blog.all",
				"inner before Query blog.all",
				"inner after",
				"outer after",
			]
		);

		backend.affected(5);
		assert_eq!(session.delete("blog.wipe", &Value::Null).unwrap(), 0);
		assert_eq!(backend.executed_sql(), vec![ALL.to_string()]);

		log.lock().clear();
		session.commit(true).unwrap();
		assert_eq!(log.lock().len(), 4);
		assert_eq!(backend.commits(), 1);
	}
}
