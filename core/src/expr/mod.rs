//! Test and collection expressions used inside statement templates.
//!
//! A small language over [`Value`]s: literals, property navigation,
//! zero-argument methods, arithmetic, comparison and boolean logic.

pub mod ast;
pub mod error;
pub mod eval;
pub mod lexer;
pub mod parser;

pub use ast::Expr;
pub use error::ParseError;
pub use eval::{Scope, values_equal};

use crate::error::{MapperError, MapperResult};
use crate::value::Value;
use std::fmt;

/// A parsed expression together with its source text
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
	source: String,
	ast: Expr,
}

impl Expression {
	pub fn parse(source: &str) -> MapperResult<Self> {
		let ast = parser::Parser::new(source)
			.and_then(|p| p.parse())
			.map_err(|e| MapperError::Parse {
				pos: e.position(),
				msg: format!("{e} in expression '{source}'"),
			})?;

		Ok(Self {
			source: source.to_string(),
			ast,
		})
	}

	pub fn source(&self) -> &str {
		&self.source
	}

	pub fn ast(&self) -> &Expr {
		&self.ast
	}

	pub fn evaluate(&self, scope: &dyn Scope) -> MapperResult<Value> {
		eval::evaluate(&self.ast, scope).map_err(|e| match e {
			MapperError::Expression(msg) => {
				MapperError::Expression(format!("evaluating '{}': {msg}", self.source))
			}
			other => other,
		})
	}

	pub fn evaluate_bool(&self, scope: &dyn Scope) -> MapperResult<bool> {
		Ok(self.evaluate(scope)?.is_truthy())
	}
}

impl fmt::Display for Expression {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.source)
	}
}
