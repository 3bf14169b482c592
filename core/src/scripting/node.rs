use super::context::DynamicContext;
use super::token::{DOLLAR, HASH};
use crate::error::{MapperError, MapperResult};
use crate::expr::Expression;
use crate::value::Value;
use regex::Regex;

const ITEM_PREFIX: &str = "__frch_";

/// Template tree node
#[derive(Debug, Clone)]
pub enum SqlNode {
	/// Text with no `${}` markers, appended as-is
	Static(String),
	/// Text whose `${}` markers are evaluated on every apply
	Text(TextNode),
	If {
		test: Expression,
		body: Box<SqlNode>,
	},
	Choose {
		whens: Vec<(Expression, SqlNode)>,
		otherwise: Option<Box<SqlNode>>,
	},
	ForEach(ForEachNode),
	Trim(TrimNode),
	Bind {
		name: String,
		expression: Expression,
	},
	Mixed(Vec<SqlNode>),
}

impl SqlNode {
	/// Static or dynamic text depending on whether `${}` markers remain.
	pub fn text(text: impl Into<String>, injection_filter: Option<Regex>) -> Self {
		let text = text.into();
		if DOLLAR.has_token(&text) {
			SqlNode::Text(TextNode {
				text,
				injection_filter,
			})
		} else {
			SqlNode::Static(text)
		}
	}

	pub fn if_test(test: &str, body: SqlNode) -> MapperResult<Self> {
		Ok(SqlNode::If {
			test: Expression::parse(test)?,
			body: Box::new(body),
		})
	}

	pub fn bind(name: impl Into<String>, expression: &str) -> MapperResult<Self> {
		Ok(SqlNode::Bind {
			name: name.into(),
			expression: Expression::parse(expression)?,
		})
	}

	/// Whether applying this node can produce different output for
	/// different parameters.
	pub fn is_dynamic(&self) -> bool {
		match self {
			SqlNode::Static(_) => false,
			SqlNode::Mixed(children) => children.iter().any(SqlNode::is_dynamic),
			_ => true,
		}
	}

	/// Evaluate depth-first, left to right, writing into `ctx`.
	pub fn apply(&self, ctx: &mut DynamicContext) -> MapperResult<()> {
		match self {
			SqlNode::Static(text) => ctx.append_sql(text),
			SqlNode::Text(node) => {
				let text = node.substitute(ctx)?;
				ctx.append_sql(&text);
			}
			SqlNode::If { test, body } => {
				if test.evaluate_bool(ctx)? {
					body.apply(ctx)?;
				}
			}
			SqlNode::Choose { whens, otherwise } => {
				for (test, body) in whens {
					if test.evaluate_bool(ctx)? {
						return body.apply(ctx);
					}
				}
				if let Some(body) = otherwise {
					body.apply(ctx)?;
				}
			}
			SqlNode::ForEach(node) => node.apply(ctx)?,
			SqlNode::Trim(node) => {
				let body = ctx.capture(|c| node.body.apply(c))?;
				ctx.append_clause(&node.process(&body));
			}
			SqlNode::Bind { name, expression } => {
				let value = expression.evaluate(ctx)?;
				ctx.bind(name.clone(), value);
			}
			SqlNode::Mixed(children) => {
				for child in children {
					child.apply(ctx)?;
				}
			}
		}
		Ok(())
	}
}

#[derive(Debug, Clone)]
pub struct TextNode {
	text: String,
	injection_filter: Option<Regex>,
}

impl TextNode {
	fn substitute(&self, ctx: &DynamicContext) -> MapperResult<String> {
		DOLLAR.parse(&self.text, |content| {
			let value = Expression::parse(content)?.evaluate(ctx)?;
			let text = match value {
				Value::Null => String::new(),
				other => other.to_string(),
			};
			if let Some(filter) = &self.injection_filter {
				if !filter.is_match(&text) {
					return Err(MapperError::Binding(format!(
						"invalid input for '${{{content}}}', value must match {}",
						filter.as_str()
					)));
				}
			}
			Ok(text)
		})
	}
}

#[derive(Debug, Clone)]
pub struct TrimNode {
	pub prefix: Option<String>,
	pub prefix_overrides: Vec<String>,
	pub suffix: Option<String>,
	pub suffix_overrides: Vec<String>,
	pub body: Box<SqlNode>,
}

impl TrimNode {
	/// `prefix_overrides` and `suffix_overrides` are `|`-separated lists.
	pub fn new(
		body: SqlNode,
		prefix: Option<&str>,
		prefix_overrides: Option<&str>,
		suffix: Option<&str>,
		suffix_overrides: Option<&str>,
	) -> Self {
		Self {
			prefix: prefix.map(str::to_string),
			prefix_overrides: parse_overrides(prefix_overrides),
			suffix: suffix.map(str::to_string),
			suffix_overrides: parse_overrides(suffix_overrides),
			body: Box::new(body),
		}
	}

	pub fn where_clause(body: SqlNode) -> Self {
		Self::new(
			body,
			Some("WHERE"),
			Some("AND |OR |AND\n|OR\n|AND\r|OR\r|AND\t|OR\t"),
			None,
			None,
		)
	}

	pub fn set_clause(body: SqlNode) -> Self {
		Self::new(body, Some("SET"), Some(","), None, Some(","))
	}

	fn process(&self, body: &str) -> String {
		let mut sql = body.trim().to_string();
		let upper = sql.to_ascii_uppercase();

		if let Some(found) = self.prefix_overrides.iter().find(|o| upper.starts_with(o.as_str())) {
			sql.drain(..found.len());
		}
		let upper = sql.to_ascii_uppercase();
		if let Some(found) = self.suffix_overrides.iter().find(|o| upper.ends_with(o.as_str())) {
			sql.truncate(sql.len() - found.len());
		}

		let sql = sql.trim();
		if sql.is_empty() {
			return String::new();
		}

		let mut out = String::new();
		if let Some(prefix) = &self.prefix {
			out.push_str(prefix);
			out.push(' ');
		}
		out.push_str(sql);
		if let Some(suffix) = &self.suffix {
			out.push(' ');
			out.push_str(suffix);
		}
		out
	}
}

fn parse_overrides(overrides: Option<&str>) -> Vec<String> {
	overrides
		.map(|s| {
			s.split('|')
				.filter(|o| !o.is_empty())
				.map(|o| o.to_ascii_uppercase())
				.collect()
		})
		.unwrap_or_default()
}

#[derive(Debug, Clone)]
pub struct ForEachNode {
	pub collection: Expression,
	pub item: Option<String>,
	pub index: Option<String>,
	pub open: Option<String>,
	pub close: Option<String>,
	pub separator: Option<String>,
	pub nullable: bool,
	pub body: Box<SqlNode>,
}

impl ForEachNode {
	pub fn new(collection: &str, body: SqlNode) -> MapperResult<Self> {
		Ok(Self {
			collection: Expression::parse(collection)?,
			item: None,
			index: None,
			open: None,
			close: None,
			separator: None,
			nullable: false,
			body: Box::new(body),
		})
	}

	pub fn item(mut self, name: &str) -> Self {
		self.item = Some(name.to_string());
		self
	}

	pub fn index(mut self, name: &str) -> Self {
		self.index = Some(name.to_string());
		self
	}

	pub fn open_close(mut self, open: &str, close: &str) -> Self {
		self.open = Some(open.to_string());
		self.close = Some(close.to_string());
		self
	}

	pub fn separator(mut self, separator: &str) -> Self {
		self.separator = Some(separator.to_string());
		self
	}

	fn entries(&self, ctx: &DynamicContext) -> MapperResult<Vec<(Value, Value)>> {
		match self.collection.evaluate(ctx)? {
			Value::List(items) => Ok(items
				.into_iter()
				.enumerate()
				.map(|(i, item)| (Value::from(i), item))
				.collect()),
			Value::Record(r) => Ok(r
				.entries()
				.into_iter()
				.map(|(k, v)| (Value::Text(k), v))
				.collect()),
			Value::Null if self.nullable => Ok(Vec::new()),
			Value::Null => Err(MapperError::Binding(format!(
				"the expression '{}' evaluated to a null value",
				self.collection
			))),
			other => Err(MapperError::Binding(format!(
				"the expression '{}' must evaluate to a list or record, got {}",
				self.collection,
				other.value_type()
			))),
		}
	}

	fn apply(&self, ctx: &mut DynamicContext) -> MapperResult<()> {
		let entries = self.entries(ctx)?;
		if entries.is_empty() {
			return Ok(());
		}

		let saved: Vec<(String, Option<Value>)> = [&self.item, &self.index]
			.into_iter()
			.flatten()
			.map(|name| (name.clone(), ctx.binding(name).cloned()))
			.collect();

		let result = self.apply_entries(ctx, entries);

		for (name, previous) in saved {
			match previous {
				Some(value) => ctx.bind(name, value),
				None => {
					ctx.unbind(&name);
				}
			}
		}

		let out = result?;
		ctx.append_sql(&out);
		Ok(())
	}

	fn apply_entries(&self, ctx: &mut DynamicContext, entries: Vec<(Value, Value)>) -> MapperResult<String> {
		let mut out = String::new();
		if let Some(open) = &self.open {
			out.push_str(open);
		}

		let mut emitted = false;
		for (index, item) in entries {
			let n = ctx.next_unique_number();
			if let Some(name) = &self.index {
				ctx.bind(itemize(name, n), index.clone());
				ctx.bind(name.clone(), index);
			}
			if let Some(name) = &self.item {
				ctx.bind(itemize(name, n), item.clone());
				ctx.bind(name.clone(), item);
			}

			let fragment = ctx.capture(|c| self.body.apply(c))?;
			let fragment = HASH.rewrite(&fragment, |content| {
				let renamed = self
					.item
					.as_deref()
					.and_then(|name| rename_placeholder(content, name, n))
					.or_else(|| {
						self.index
							.as_deref()
							.and_then(|name| rename_placeholder(content, name, n))
					})
					.unwrap_or_else(|| content.to_string());
				Ok(format!("#{{{renamed}}}"))
			})?;

			if !fragment.trim().is_empty() {
				if emitted {
					if let Some(sep) = &self.separator {
						out.push_str(sep);
					}
				}
				emitted = true;
			}
			out.push_str(&fragment);
		}

		if let Some(close) = &self.close {
			out.push_str(close);
		}
		Ok(out)
	}
}

fn itemize(name: &str, n: usize) -> String {
	format!("{ITEM_PREFIX}{name}_{n}")
}

/// `#{item.x}` becomes `#{__frch_item_3.x}`; `#{items}` is left alone.
fn rename_placeholder(content: &str, name: &str, n: usize) -> Option<String> {
	let rest = content.trim_start().strip_prefix(name)?;
	let boundary = rest.is_empty()
		|| rest.starts_with(['.', ',', ':', '['])
		|| rest.starts_with(char::is_whitespace);
	boundary.then(|| format!("{}{rest}", itemize(name, n)))
}
