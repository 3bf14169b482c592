//! Serializable mapper definitions and their compilation into statements

use super::node::{ForEachNode, SqlNode, TrimNode};
use super::property::PropertyParser;
use super::source::SqlSource;
use crate::cache::CacheConfig;
use crate::config::Settings;
use crate::error::{MapperError, MapperResult};
use crate::expr::Expression;
use crate::mapping::{
	CollectionKind, MappedStatement, ResultMap, ResultMapping, StatementKind, StatementType, TargetType,
};
use crate::types::JdbcType;
use crate::value::ValueType;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A template: plain text, a node, or a sequence of either
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TemplateSpec {
	Text(String),
	Nodes(Vec<TemplateSpec>),
	Node(NodeSpec),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NodeSpec {
	If {
		test: String,
		body: Box<TemplateSpec>,
	},
	/// Branches without a test are the `otherwise` branch
	Choose {
		branches: Vec<BranchSpec>,
	},
	Foreach {
		collection: String,
		item: Option<String>,
		index: Option<String>,
		open: Option<String>,
		close: Option<String>,
		separator: Option<String>,
		#[serde(default)]
		nullable: bool,
		body: Box<TemplateSpec>,
	},
	#[serde(rename_all = "camelCase")]
	Trim {
		prefix: Option<String>,
		prefix_overrides: Option<String>,
		suffix: Option<String>,
		suffix_overrides: Option<String>,
		body: Box<TemplateSpec>,
	},
	Where {
		body: Box<TemplateSpec>,
	},
	Set {
		body: Box<TemplateSpec>,
	},
	Bind {
		name: String,
		value: String,
	},
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchSpec {
	pub test: Option<String>,
	pub body: TemplateSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapperSpec {
	pub namespace: String,
	/// Give this namespace its own shared cache
	pub cache: Option<CacheConfig>,
	/// Share another namespace's cache instead
	pub cache_ref: Option<String>,
	#[serde(default)]
	pub result_maps: Vec<ResultMapSpec>,
	#[serde(default)]
	pub statements: Vec<StatementSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementSpec {
	pub id: String,
	pub kind: StatementKind,
	#[serde(default)]
	pub statement_type: StatementType,
	pub sql: TemplateSpec,
	pub result_map: Option<String>,
	/// Primitive type name for scalar rows; anything else maps records
	pub result_type: Option<String>,
	pub flush_cache: Option<bool>,
	pub use_cache: Option<bool>,
	pub fetch_size: Option<u32>,
	pub timeout: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMapSpec {
	pub id: String,
	#[serde(default = "default_auto_mapping")]
	pub auto_mapping: bool,
	pub result_type: Option<String>,
	#[serde(default)]
	pub mappings: Vec<ResultMappingSpec>,
}

fn default_auto_mapping() -> bool {
	true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMappingSpec {
	pub property: String,
	pub column: Option<String>,
	pub java_type: Option<String>,
	pub jdbc_type: Option<String>,
	pub type_handler: Option<String>,
	/// Nested select statement id
	pub select: Option<String>,
	/// `list`, `set`, `deque`, `array`, `array:<type>` or `scalar`
	pub target: Option<String>,
}

/// Statements and cache compiled from one [`MapperSpec`]
#[derive(Debug)]
pub struct CompiledMapper {
	pub statements: Vec<MappedStatement>,
	pub cache: Option<CacheConfig>,
}

/// Turns template specs into node trees using the configured variables
/// and text injection filter.
pub struct TemplateBuilder<'a> {
	settings: &'a Settings,
	injection_filter: Option<Regex>,
}

impl<'a> TemplateBuilder<'a> {
	pub fn new(settings: &'a Settings) -> MapperResult<Self> {
		Ok(Self {
			settings,
			injection_filter: settings.injection_filter()?,
		})
	}

	pub fn build_source(&self, spec: &TemplateSpec) -> MapperResult<SqlSource> {
		SqlSource::from_node(self.build_node(spec)?)
	}

	pub fn build_node(&self, spec: &TemplateSpec) -> MapperResult<SqlNode> {
		match spec {
			TemplateSpec::Text(text) => Ok(SqlNode::text(self.substitute(text), self.injection_filter.clone())),
			TemplateSpec::Nodes(children) => children
				.iter()
				.map(|c| self.build_node(c))
				.collect::<MapperResult<Vec<_>>>()
				.map(SqlNode::Mixed),
			TemplateSpec::Node(node) => self.build_tag(node),
		}
	}

	fn build_tag(&self, node: &NodeSpec) -> MapperResult<SqlNode> {
		let built = match node {
			NodeSpec::If { test, body } => SqlNode::if_test(test, self.build_node(body)?)?,
			NodeSpec::Choose { branches } => {
				let mut whens = Vec::new();
				let mut otherwise = None;
				for branch in branches {
					let body = self.build_node(&branch.body)?;
					match &branch.test {
						Some(test) => whens.push((Expression::parse(test)?, body)),
						None if otherwise.is_some() => {
							return Err(MapperError::Compile(
								"Too many default (otherwise) elements in choose statement.".into(),
							));
						}
						None => otherwise = Some(Box::new(body)),
					}
				}
				SqlNode::Choose { whens, otherwise }
			}
			NodeSpec::Foreach {
				collection,
				item,
				index,
				open,
				close,
				separator,
				nullable,
				body,
			} => {
				let mut foreach = ForEachNode::new(collection, self.build_node(body)?)?;
				foreach.item = item.clone();
				foreach.index = index.clone();
				foreach.open = open.clone();
				foreach.close = close.clone();
				foreach.separator = separator.clone();
				foreach.nullable = *nullable;
				SqlNode::ForEach(foreach)
			}
			NodeSpec::Trim {
				prefix,
				prefix_overrides,
				suffix,
				suffix_overrides,
				body,
			} => SqlNode::Trim(TrimNode::new(
				self.build_node(body)?,
				prefix.as_deref(),
				prefix_overrides.as_deref(),
				suffix.as_deref(),
				suffix_overrides.as_deref(),
			)),
			NodeSpec::Where { body } => SqlNode::Trim(TrimNode::where_clause(self.build_node(body)?)),
			NodeSpec::Set { body } => SqlNode::Trim(TrimNode::set_clause(self.build_node(body)?)),
			NodeSpec::Bind { name, value } => SqlNode::bind(name.clone(), value)?,
		};
		Ok(built)
	}

	fn substitute(&self, text: &str) -> String {
		let parser = PropertyParser::new(&self.settings.variables);
		if self.settings.enable_default_value {
			parser.with_default_values(&self.settings.default_value_separator).parse(text)
		} else {
			parser.parse(text)
		}
	}

	pub fn build_mapper(&self, spec: &MapperSpec) -> MapperResult<CompiledMapper> {
		let namespace = spec.namespace.trim();
		if namespace.is_empty() {
			return Err(MapperError::Config("mapper namespace must not be empty".into()));
		}

		let mut result_maps = HashMap::new();
		for map in &spec.result_maps {
			let built = build_result_map(namespace, map)?;
			if result_maps.insert(built.id.clone(), built).is_some() {
				return Err(MapperError::Config(format!(
					"result map '{}' is defined twice in '{namespace}'",
					map.id
				)));
			}
		}

		let cache = match (&spec.cache, &spec.cache_ref) {
			(Some(_), _) => Some(namespace.to_string()),
			(None, Some(other)) => Some(other.clone()),
			(None, None) => None,
		};

		let statements = spec
			.statements
			.iter()
			.map(|s| self.build_statement(namespace, s, &result_maps, cache.as_deref()))
			.collect::<MapperResult<Vec<_>>>()?;

		Ok(CompiledMapper {
			statements,
			cache: spec.cache.clone(),
		})
	}

	fn build_statement(
		&self,
		namespace: &str,
		spec: &StatementSpec,
		result_maps: &HashMap<String, ResultMap>,
		cache: Option<&str>,
	) -> MapperResult<MappedStatement> {
		let id = qualify(namespace, &spec.id);
		let source = self
			.build_source(&spec.sql)
			.map_err(|e| MapperError::Compile(format!("statement '{id}': {e}")))?;

		let mut ms = MappedStatement::new(id.clone(), spec.kind, source).with_statement_type(spec.statement_type);
		if let Some(map_id) = &spec.result_map {
			let map = result_maps.get(&qualify(namespace, map_id)).ok_or_else(|| {
				MapperError::Config(format!("statement '{id}' refers to unknown result map '{map_id}'"))
			})?;
			ms = ms.with_result_map(map.clone());
		} else if let Some(ty) = spec.result_type.as_deref().map(parse_value_type).transpose()?
			&& ty.is_primitive()
		{
			ms = ms.with_result_map(ResultMap::scalar(format!("{id}-Inline"), Some(ty)));
		}

		if let Some(flush) = spec.flush_cache {
			ms.flush_cache = flush;
		}
		if let Some(use_cache) = spec.use_cache {
			ms.use_cache = use_cache;
		}
		if let Some(cache) = cache {
			ms = ms.with_cache(cache);
		}
		ms.fetch_size = spec.fetch_size;
		ms.timeout = spec.timeout;
		Ok(ms)
	}
}

fn build_result_map(namespace: &str, spec: &ResultMapSpec) -> MapperResult<ResultMap> {
	let id = qualify(namespace, &spec.id);
	if let Some(ty) = spec.result_type.as_deref().map(parse_value_type).transpose()?
		&& ty.is_primitive()
	{
		return Ok(ResultMap::scalar(id, Some(ty)));
	}

	let mut map = ResultMap::auto(id);
	map.auto_mapping = spec.auto_mapping;
	for m in &spec.mappings {
		let mut mapping = match (&m.select, &m.column) {
			(Some(select), Some(column)) => ResultMapping::nested(
				&m.property,
				&qualify(namespace, select),
				column,
				parse_target(m.target.as_deref())?,
			)?,
			(Some(_), None) => {
				return Err(MapperError::Config(format!(
					"nested select for '{}' in '{}' needs a column",
					m.property, map.id
				)));
			}
			(None, Some(column)) => ResultMapping::column(&m.property, column),
			(None, None) => ResultMapping::column(&m.property, &m.property),
		};
		mapping.java_type = m.java_type.as_deref().map(parse_value_type).transpose()?;
		mapping.jdbc_type = m
			.jdbc_type
			.as_deref()
			.map(|name| {
				JdbcType::parse(name).ok_or_else(|| MapperError::Config(format!("unknown jdbc type '{name}'")))
			})
			.transpose()?;
		mapping.type_handler = m.type_handler.clone();
		map = map.with_mapping(mapping);
	}
	Ok(map)
}

/// `find` in namespace `blog` is `blog.find`; ids with a dot are kept.
fn qualify(namespace: &str, id: &str) -> String {
	if id.contains('.') {
		id.to_string()
	} else {
		format!("{namespace}.{id}")
	}
}

fn parse_value_type(name: &str) -> MapperResult<ValueType> {
	ValueType::parse(name).ok_or_else(|| MapperError::Config(format!("unknown value type '{name}'")))
}

fn parse_target(target: Option<&str>) -> MapperResult<TargetType> {
	let Some(target) = target else {
		return Ok(TargetType::Scalar);
	};
	let parsed = match target.trim().to_ascii_lowercase().as_str() {
		"list" => TargetType::List,
		"set" => TargetType::Collection(CollectionKind::Set),
		"deque" => TargetType::Collection(CollectionKind::Deque),
		"array" => TargetType::Array(None),
		"scalar" => TargetType::Scalar,
		other => match other.strip_prefix("array:") {
			Some(element) => TargetType::Array(Some(parse_value_type(element)?)),
			None => return Err(MapperError::Config(format!("unknown nested target '{target}'"))),
		},
	};
	Ok(parsed)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::value::Value;
	use pretty_assertions::assert_eq;

	const BLOG_MAPPER: &str = r##"{
		"namespace": "blog",
		"cache": { "size": 64 },
		"resultMaps": [
			{
				"id": "withAuthor",
				"mappings": [
					{ "property": "title", "column": "blog_title" },
					{ "property": "author", "column": "author_id", "select": "authors.byId" },
					{ "property": "tags", "column": "id", "select": "tagsFor", "target": "set" }
				]
			}
		],
		"statements": [
			{
				"id": "search",
				"kind": "select",
				"resultMap": "withAuthor",
				"sql": [
					"select * from ${schema}.blog",
					{ "type": "where", "body": [
						{ "type": "if", "test": "title != null", "body": "and title like #{title}" },
						{ "type": "foreach", "collection": "ids", "item": "id",
						  "open": " and id in (", "close": ")", "separator": ",", "nullable": true,
						  "body": "#{id}" }
					]}
				]
			},
			{ "id": "count", "kind": "select", "resultType": "int", "sql": "select count(*) from blog" },
			{ "id": "tagsFor", "kind": "select", "resultType": "text", "sql": "select tag from tags where blog_id = #{id}" },
			{ "id": "touch", "kind": "update", "sql": [
				"update blog",
				{ "type": "set", "body": [
					{ "type": "if", "test": "title != null", "body": "title = #{title}," }
				]},
				"where id = #{id}"
			]}
		]
	}"##;

	fn settings() -> Settings {
		let mut settings = Settings::default();
		settings.variables.insert("schema".into(), "app".into());
		settings
	}

	#[test]
	fn test_build_mapper() {
		let spec: MapperSpec = serde_json::from_str(BLOG_MAPPER).unwrap();
		let settings = settings();
		let compiled = TemplateBuilder::new(&settings).unwrap().build_mapper(&spec).unwrap();

		assert_eq!(compiled.cache.as_ref().map(|c| c.size), Some(64));
		let ids: Vec<&str> = compiled.statements.iter().map(|s| s.id.as_str()).collect();
		assert_eq!(ids, vec!["blog.search", "blog.count", "blog.tagsFor", "blog.touch"]);
		assert!(compiled.statements.iter().all(|s| s.cache.as_deref() == Some("blog")));

		let search = &compiled.statements[0];
		let nested: Vec<&str> = search
			.result_map
			.nested_selects()
			.map(|(_, n)| n.statement.as_str())
			.collect();
		assert_eq!(nested, vec!["authors.byId", "blog.tagsFor"]);

		let param = Value::record([
			("title", Value::from("%rust%")),
			("ids", Value::List(vec![Value::Int(1), Value::Int(2)])),
		]);
		let bound = search.bound_sql(&param, None).unwrap();
		assert_eq!(
			bound.sql(),
			"select * from app.blog WHERE title like ? and id in (?,?)"
		);
		assert_eq!(
			bound.parameter_values().unwrap(),
			vec![Value::from("%rust%"), Value::Int(1), Value::Int(2)]
		);

		let empty = search.bound_sql(&Value::record([("title", Value::Null)]), None).unwrap();
		assert_eq!(empty.sql(), "select * from app.blog");

		let count = &compiled.statements[1];
		assert!(!count.sql_source.is_dynamic());
		assert_eq!(count.result_map.kind, crate::mapping::ResultKind::Scalar(Some(ValueType::Int)));

		let touch = &compiled.statements[3];
		assert!(touch.flush_cache);
		let bound = touch
			.bound_sql(&Value::record([("title", Value::from("t")), ("id", Value::Int(3))]), None)
			.unwrap();
		assert_eq!(bound.sql(), "update blog SET title = ? where id = ?");
	}

	#[test]
	fn test_choose_with_two_otherwise_fails() {
		let spec: TemplateSpec = serde_json::from_str(
			r#"{ "type": "choose", "branches": [
				{ "test": "a != null", "body": "a = #{a}" },
				{ "body": "1 = 1" },
				{ "body": "2 = 2" }
			]}"#,
		)
		.unwrap();
		let settings = Settings::default();
		let builder = TemplateBuilder::new(&settings).unwrap();
		assert!(matches!(builder.build_node(&spec), Err(MapperError::Compile(_))));
	}

	#[test]
	fn test_default_values_and_unknown_variables() {
		let settings = Settings {
			enable_default_value: true,
			..settings()
		};
		let builder = TemplateBuilder::new(&settings).unwrap();

		let source = builder
			.build_source(&TemplateSpec::Text("select * from ${schema}.${table:users}".into()))
			.unwrap();
		assert!(!source.is_dynamic());
		assert_eq!(source.bound_sql(&Value::Null, None).unwrap().sql(), "select * from app.users");

		// unresolved names are evaluated against the parameter later
		let source = builder
			.build_source(&TemplateSpec::Text("order by ${column}".into()))
			.unwrap();
		assert!(source.is_dynamic());
		let bound = source
			.bound_sql(&Value::record([("column", Value::from("name"))]), None)
			.unwrap();
		assert_eq!(bound.sql(), "order by name");
	}

	#[test]
	fn test_cache_ref_and_bad_refs() {
		let spec: MapperSpec = serde_json::from_str(
			r#"{ "namespace": "comments", "cacheRef": "blog",
			     "statements": [{ "id": "all", "kind": "select", "sql": "select 1" }] }"#,
		)
		.unwrap();
		let settings = Settings::default();
		let builder = TemplateBuilder::new(&settings).unwrap();
		let compiled = builder.build_mapper(&spec).unwrap();
		assert!(compiled.cache.is_none());
		assert_eq!(compiled.statements[0].cache.as_deref(), Some("blog"));

		let bad: MapperSpec = serde_json::from_str(
			r#"{ "namespace": "x", "statements": [{ "id": "a", "kind": "select", "resultMap": "nope", "sql": "select 1" }] }"#,
		)
		.unwrap();
		assert!(matches!(builder.build_mapper(&bad), Err(MapperError::Config(_))));

		assert!(parse_target(Some("array:int")).is_ok());
		assert!(parse_target(Some("bag")).is_err());
	}
}
