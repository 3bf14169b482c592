//! Interceptors wrapping session operations

use crate::cursor::Cursor;
use crate::error::{MapperError, MapperResult};
use crate::mapping::{MappedStatement, RowBounds};
use crate::value::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Session operations an interceptor can wrap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
	Query,
	QueryCursor,
	Update,
	Commit,
	Rollback,
}

/// What the intercepted call was asked to do
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
	pub operation: Operation,
	pub statement: Option<&'a MappedStatement>,
	pub parameter: Option<&'a Value>,
	pub bounds: RowBounds,
	/// Whether a commit or rollback reaches the transaction
	pub required: bool,
}

impl<'a> Invocation<'a> {
	pub fn statement(operation: Operation, ms: &'a MappedStatement, parameter: &'a Value, bounds: RowBounds) -> Self {
		Self {
			operation,
			statement: Some(ms),
			parameter: Some(parameter),
			bounds,
			required: false,
		}
	}

	pub fn transaction(operation: Operation, required: bool) -> Self {
		Self {
			operation,
			statement: None,
			parameter: None,
			bounds: RowBounds::DEFAULT,
			required,
		}
	}
}

/// Result of an intercepted call
#[derive(Debug)]
pub enum Outcome {
	Rows(Vec<Value>),
	Affected(usize),
	Cursor(Cursor),
	Done,
}

impl Outcome {
	pub fn into_rows(self) -> MapperResult<Vec<Value>> {
		match self {
			Outcome::Rows(rows) => Ok(rows),
			other => Err(other.mismatch("rows")),
		}
	}

	pub fn into_affected(self) -> MapperResult<usize> {
		match self {
			Outcome::Affected(count) => Ok(count),
			other => Err(other.mismatch("an update count")),
		}
	}

	pub fn into_cursor(self) -> MapperResult<Cursor> {
		match self {
			Outcome::Cursor(cursor) => Ok(cursor),
			other => Err(other.mismatch("a cursor")),
		}
	}

	pub fn into_done(self) -> MapperResult<()> {
		match self {
			Outcome::Done => Ok(()),
			other => Err(other.mismatch("completion")),
		}
	}

	fn mismatch(&self, expected: &str) -> MapperError {
		let found = match self {
			Outcome::Rows(_) => "rows",
			Outcome::Affected(_) => "an update count",
			Outcome::Cursor(_) => "a cursor",
			Outcome::Done => "completion",
		};
		MapperError::Interceptor(format!("expected {expected} from the call chain, got {found}"))
	}
}

/// Wraps the operations named by [`Interceptor::signatures`].
///
/// `proceed` runs the rest of the chain and finally the operation itself.
/// An interceptor may skip it, call it once, or replace its outcome.
pub trait Interceptor: Send + Sync + fmt::Debug {
	fn name(&self) -> &str;

	fn signatures(&self) -> &[Operation];

	fn intercept(
		&self,
		invocation: &Invocation<'_>,
		proceed: &mut dyn FnMut() -> MapperResult<Outcome>,
	) -> MapperResult<Outcome>;
}

/// Interceptors in registration order; the first one registered is the
/// outermost wrapper.
#[derive(Debug, Clone, Default)]
pub struct InterceptorChain {
	interceptors: Vec<Arc<dyn Interceptor>>,
}

impl InterceptorChain {
	pub fn new(interceptors: Vec<Arc<dyn Interceptor>>) -> MapperResult<Self> {
		let mut names = HashSet::new();
		for interceptor in &interceptors {
			if interceptor.signatures().is_empty() {
				return Err(MapperError::Interceptor(format!(
					"interceptor '{}' declares no operations",
					interceptor.name()
				)));
			}
			if !names.insert(interceptor.name().to_string()) {
				return Err(MapperError::Interceptor(format!(
					"interceptor '{}' is registered twice",
					interceptor.name()
				)));
			}
		}
		Ok(Self { interceptors })
	}

	pub fn len(&self) -> usize {
		self.interceptors.len()
	}

	pub fn is_empty(&self) -> bool {
		self.interceptors.is_empty()
	}

	pub fn names(&self) -> Vec<&str> {
		self.interceptors.iter().map(|i| i.name()).collect()
	}

	/// Run `target` wrapped by every interceptor declaring the invocation's
	/// operation.
	pub fn run<F>(&self, invocation: &Invocation<'_>, mut target: F) -> MapperResult<Outcome>
	where
		F: FnMut() -> MapperResult<Outcome>,
	{
		let wrapping: Vec<&Arc<dyn Interceptor>> = self
			.interceptors
			.iter()
			.filter(|i| i.signatures().contains(&invocation.operation))
			.collect();
		proceed(&wrapping, invocation, &mut target)
	}
}

fn proceed(
	chain: &[&Arc<dyn Interceptor>],
	invocation: &Invocation<'_>,
	target: &mut dyn FnMut() -> MapperResult<Outcome>,
) -> MapperResult<Outcome> {
	match chain.split_first() {
		None => target(),
		Some((first, rest)) => first.intercept(invocation, &mut || proceed(rest, invocation, &mut *target)),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use parking_lot::Mutex;
	use pretty_assertions::assert_eq;

	#[derive(Debug)]
	struct Tracer {
		name: String,
		ops: Vec<Operation>,
		log: Arc<Mutex<Vec<String>>>,
	}

	impl Interceptor for Tracer {
		fn name(&self) -> &str {
			&self.name
		}

		fn signatures(&self) -> &[Operation] {
			&self.ops
		}

		fn intercept(
			&self,
			_invocation: &Invocation<'_>,
			proceed: &mut dyn FnMut() -> MapperResult<Outcome>,
		) -> MapperResult<Outcome> {
			self.log.lock().push(format!("{}:before", self.name));
			let outcome = proceed();
			self.log.lock().push(format!("{}:after", self.name));
			outcome
		}
	}

	fn tracer(name: &str, ops: &[Operation], log: &Arc<Mutex<Vec<String>>>) -> Arc<dyn Interceptor> {
		Arc::new(Tracer {
			name: name.to_string(),
			ops: ops.to_vec(),
			log: log.clone(),
		})
	}

	#[test]
	fn test_first_registered_is_outermost() {
		let log = Arc::new(Mutex::new(Vec::new()));
		let chain = InterceptorChain::new(vec![
			tracer("outer", &[Operation::Update], &log),
			tracer("commit-only", &[Operation::Commit], &log),
			tracer("inner", &[Operation::Update, Operation::Query], &log),
		])
		.unwrap();

		let inner_log = log.clone();
		let outcome = chain
			.run(&Invocation::transaction(Operation::Update, false), || {
				inner_log.lock().push("target".into());
				Ok(Outcome::Affected(3))
			})
			.unwrap();

		assert_eq!(outcome.into_affected().unwrap(), 3);
		assert_eq!(
			*log.lock(),
			vec!["outer:before", "inner:before", "target", "inner:after", "outer:after"]
		);
	}

	#[test]
	fn test_validation() {
		let log = Arc::new(Mutex::new(Vec::new()));
		assert!(matches!(
			InterceptorChain::new(vec![tracer("empty", &[], &log)]),
			Err(MapperError::Interceptor(_))
		));
		assert!(matches!(
			InterceptorChain::new(vec![
				tracer("dup", &[Operation::Query], &log),
				tracer("dup", &[Operation::Update], &log),
			]),
			Err(MapperError::Interceptor(_))
		));
	}

	#[test]
	fn test_outcome_mismatch() {
		assert!(matches!(Outcome::Done.into_rows(), Err(MapperError::Interceptor(_))));
		assert!(Outcome::Done.into_done().is_ok());
	}
}
