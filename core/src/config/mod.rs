//! Runtime configuration: settings plus everything registered at build time

mod settings;

pub use settings::{LocalCacheScope, Settings};

use crate::cache::{Cache, CacheConfig};
use crate::error::{MapperError, MapperResult};
use crate::executor::TransactionFactory;
use crate::mapping::MappedStatement;
use crate::plugin::{Interceptor, InterceptorChain};
use crate::scripting::{MapperSpec, SqlSource, TemplateBuilder};
use crate::types::{TypeHandler, TypeHandlerRegistry};
use crate::value::ValueType;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Immutable, validated configuration shared by every session
pub struct Configuration {
	settings: Settings,
	statements: HashMap<String, Arc<MappedStatement>>,
	caches: HashMap<String, Arc<dyn Cache>>,
	type_handlers: Arc<TypeHandlerRegistry>,
	interceptors: InterceptorChain,
	transaction_factory: Option<Arc<dyn TransactionFactory>>,
}

impl Configuration {
	pub fn builder(settings: Settings) -> ConfigurationBuilder {
		ConfigurationBuilder::new(settings)
	}

	pub fn settings(&self) -> &Settings {
		&self.settings
	}

	pub fn statement(&self, id: &str) -> MapperResult<Arc<MappedStatement>> {
		self.statements
			.get(id)
			.cloned()
			.ok_or_else(|| MapperError::StatementNotFound(id.to_string()))
	}

	pub fn has_statement(&self, id: &str) -> bool {
		self.statements.contains_key(id)
	}

	/// Statement ids in sorted order
	pub fn statement_ids(&self) -> Vec<&str> {
		let mut ids: Vec<&str> = self.statements.keys().map(String::as_str).collect();
		ids.sort_unstable();
		ids
	}

	pub fn cache(&self, id: &str) -> Option<Arc<dyn Cache>> {
		self.caches.get(id).cloned()
	}

	/// The shared cache a statement uses, if shared caching is on
	pub fn cache_for(&self, ms: &MappedStatement) -> Option<Arc<dyn Cache>> {
		if !self.settings.cache_enabled {
			return None;
		}
		ms.cache.as_deref().and_then(|id| self.cache(id))
	}

	pub fn type_handlers(&self) -> &Arc<TypeHandlerRegistry> {
		&self.type_handlers
	}

	pub fn interceptors(&self) -> &InterceptorChain {
		&self.interceptors
	}

	pub fn transaction_factory(&self) -> Option<&Arc<dyn TransactionFactory>> {
		self.transaction_factory.as_ref()
	}
}

impl fmt::Debug for Configuration {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Configuration")
			.field("settings", &self.settings)
			.field("statements", &self.statement_ids())
			.field("caches", &self.caches.keys().collect::<Vec<_>>())
			.field("interceptors", &self.interceptors.names())
			.finish()
	}
}

/// Collects statements, caches and collaborators, then validates them
/// together in [`build`](ConfigurationBuilder::build).
pub struct ConfigurationBuilder {
	settings: Settings,
	statements: Vec<MappedStatement>,
	cache_configs: Vec<(String, CacheConfig)>,
	caches: Vec<Arc<dyn Cache>>,
	type_handlers: TypeHandlerRegistry,
	interceptors: Vec<Arc<dyn Interceptor>>,
	transaction_factory: Option<Arc<dyn TransactionFactory>>,
}

impl ConfigurationBuilder {
	pub fn new(settings: Settings) -> Self {
		Self {
			settings,
			statements: Vec::new(),
			cache_configs: Vec::new(),
			caches: Vec::new(),
			type_handlers: TypeHandlerRegistry::default(),
			interceptors: Vec::new(),
			transaction_factory: None,
		}
	}

	pub fn settings(&self) -> &Settings {
		&self.settings
	}

	pub fn add_statement(mut self, ms: MappedStatement) -> Self {
		self.statements.push(ms);
		self
	}

	/// Shared cache built from `config` under `id`
	pub fn cache_config(mut self, id: impl Into<String>, config: CacheConfig) -> Self {
		self.cache_configs.push((id.into(), config));
		self
	}

	/// A ready-made shared cache, registered under its own id
	pub fn add_cache(mut self, cache: Arc<dyn Cache>) -> Self {
		self.caches.push(cache);
		self
	}

	/// Compile a mapper's statements and register its cache.
	pub fn add_mapper(mut self, spec: &MapperSpec) -> MapperResult<Self> {
		let compiled = TemplateBuilder::new(&self.settings)?.build_mapper(spec)?;
		debug!(
			namespace = %spec.namespace,
			statements = compiled.statements.len(),
			"Loaded mapper"
		);
		if let Some(cache) = compiled.cache {
			self.cache_configs.push((spec.namespace.clone(), cache));
		}
		self.statements.extend(compiled.statements);
		Ok(self)
	}

	pub fn type_handler(mut self, ty: ValueType, handler: Arc<dyn TypeHandler>) -> Self {
		self.type_handlers.register(ty, handler);
		self
	}

	pub fn named_type_handler(mut self, name: impl Into<String>, handler: Arc<dyn TypeHandler>) -> Self {
		self.type_handlers.register_named(name, handler);
		self
	}

	pub fn interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
		self.interceptors.push(interceptor);
		self
	}

	pub fn transaction_factory(mut self, factory: Arc<dyn TransactionFactory>) -> Self {
		self.transaction_factory = Some(factory);
		self
	}

	pub fn build(self) -> MapperResult<Arc<Configuration>> {
		let interceptors = InterceptorChain::new(self.interceptors)?;

		let mut caches: HashMap<String, Arc<dyn Cache>> = HashMap::new();
		let built = self.cache_configs.iter().map(|(id, config)| config.build(id.clone()));
		for cache in self.caches.into_iter().chain(built) {
			let id = cache.id().to_string();
			if caches.insert(id.clone(), cache).is_some() {
				return Err(MapperError::Config(format!("cache '{id}' is defined twice")));
			}
		}

		let mut statements = HashMap::new();
		for ms in self.statements {
			if statements.contains_key(&ms.id) {
				return Err(MapperError::Config(format!("statement '{}' is defined twice", ms.id)));
			}
			statements.insert(ms.id.clone(), Arc::new(ms));
		}

		for ms in statements.values() {
			if let Some(cache) = &ms.cache
				&& !caches.contains_key(cache)
			{
				return Err(MapperError::Config(format!(
					"statement '{}' refers to unknown cache '{cache}'",
					ms.id
				)));
			}

			for (mapping, nested) in ms.result_map.nested_selects() {
				if !statements.contains_key(&nested.statement) {
					return Err(MapperError::Config(format!(
						"property '{}' of '{}' selects unknown statement '{}'",
						mapping.property, ms.id, nested.statement
					)));
				}
			}

			let result_handlers = ms.result_map.mappings.iter().filter_map(|m| m.type_handler.as_deref());
			let parameter_handlers = match &ms.sql_source {
				SqlSource::Raw { parameter_mappings, .. } => parameter_mappings
					.iter()
					.filter_map(|m| m.type_handler.as_deref())
					.collect(),
				SqlSource::Dynamic(_) => Vec::new(),
			};
			for name in result_handlers.chain(parameter_handlers) {
				if !self.type_handlers.has_named(name) {
					return Err(MapperError::Config(format!(
						"statement '{}' uses unregistered type handler '{name}'",
						ms.id
					)));
				}
			}
		}

		debug!(
			statements = statements.len(),
			caches = caches.len(),
			interceptors = interceptors.len(),
			"Configuration built"
		);

		Ok(Arc::new(Configuration {
			settings: self.settings,
			statements,
			caches,
			type_handlers: Arc::new(self.type_handlers),
			interceptors,
			transaction_factory: self.transaction_factory,
		}))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::mapping::{ResultMap, ResultMapping, StatementKind, TargetType};
	use crate::plugin::{Invocation, Operation, Outcome};

	fn select(id: &str) -> MappedStatement {
		MappedStatement::new(id, StatementKind::Select, SqlSource::raw("select 1").unwrap())
	}

	#[derive(Debug)]
	struct Noop(&'static str, Vec<Operation>);

	impl Interceptor for Noop {
		fn name(&self) -> &str {
			self.0
		}

		fn signatures(&self) -> &[Operation] {
			&self.1
		}

		fn intercept(
			&self,
			_invocation: &Invocation<'_>,
			proceed: &mut dyn FnMut() -> MapperResult<Outcome>,
		) -> MapperResult<Outcome> {
			proceed()
		}
	}

	#[test]
	fn test_lookup_and_cache_assignment() {
		let config = Configuration::builder(Settings::default())
			.cache_config("blog", CacheConfig::default())
			.add_statement(select("blog.find").with_cache("blog"))
			.add_statement(select("blog.count"))
			.build()
			.unwrap();

		assert_eq!(config.statement_ids(), vec!["blog.count", "blog.find"]);
		assert!(config.cache_for(&config.statement("blog.find").unwrap()).is_some());
		assert!(config.cache_for(&config.statement("blog.count").unwrap()).is_none());
		assert!(matches!(config.statement("blog.nope"), Err(MapperError::StatementNotFound(_))));

		let disabled = Settings {
			cache_enabled: false,
			..Settings::default()
		};
		let config = Configuration::builder(disabled)
			.cache_config("blog", CacheConfig::default())
			.add_statement(select("blog.find").with_cache("blog"))
			.build()
			.unwrap();
		assert!(config.cache_for(&config.statement("blog.find").unwrap()).is_none());
	}

	#[test]
	fn test_build_validation() {
		let duplicate = Configuration::builder(Settings::default())
			.add_statement(select("a.find"))
			.add_statement(select("a.find"))
			.build();
		assert!(matches!(duplicate, Err(MapperError::Config(_))));

		let unknown_cache = Configuration::builder(Settings::default())
			.add_statement(select("a.find").with_cache("missing"))
			.build();
		assert!(matches!(unknown_cache, Err(MapperError::Config(_))));

		let map = ResultMap::auto("a.map")
			.with_mapping(ResultMapping::nested("author", "a.author", "author_id", TargetType::Scalar).unwrap());
		let dangling = Configuration::builder(Settings::default())
			.add_statement(select("a.find").with_result_map(map))
			.build();
		assert!(matches!(dangling, Err(MapperError::Config(_))));

		let handler = MappedStatement::new(
			"a.find",
			StatementKind::Select,
			SqlSource::raw("select #{id,typeHandler=money}").unwrap(),
		);
		let missing_handler = Configuration::builder(Settings::default()).add_statement(handler).build();
		assert!(matches!(missing_handler, Err(MapperError::Config(_))));

		let bad_interceptor = Configuration::builder(Settings::default())
			.interceptor(Arc::new(Noop("noop", vec![])))
			.build();
		assert!(matches!(bad_interceptor, Err(MapperError::Interceptor(_))));

		let ok = Configuration::builder(Settings::default())
			.interceptor(Arc::new(Noop("noop", vec![Operation::Query])))
			.build()
			.unwrap();
		assert_eq!(ok.interceptors().names(), vec!["noop"]);
	}
}
