use super::local::{LocalCache, LocalEntry};
use crate::cache::CacheKey;
use crate::error::{MapperError, MapperResult};
use crate::mapping::{CollectionKind, TargetType};
use crate::value::{PropertyPath, Record, Value};
use std::collections::HashSet;

/// A nested result waiting for its query to finish loading.
#[derive(Debug, Clone)]
pub struct DeferredLoad {
	target: Record,
	property: PropertyPath,
	key: CacheKey,
	target_type: TargetType,
}

impl DeferredLoad {
	pub fn new(target: Record, property: PropertyPath, key: CacheKey, target_type: TargetType) -> Self {
		Self {
			target,
			property,
			key,
			target_type,
		}
	}

	pub fn key(&self) -> &CacheKey {
		&self.key
	}

	pub fn can_load(&self, cache: &LocalCache) -> bool {
		cache.is_loaded(&self.key)
	}

	/// Assign the extracted result to the target property.
	///
	/// The value is attached as a snapshot so that result graphs never
	/// refer back to themselves. Does nothing while the entry is not loaded.
	pub fn load(&self, cache: &LocalCache) -> MapperResult<()> {
		let Some(LocalEntry::Loaded(rows)) = cache.get(&self.key) else {
			return Ok(());
		};
		let value = ResultExtractor::extract(rows, self.target_type)?;
		self.property.set(&self.target, value.snapshot())
	}
}

/// Shapes a nested query's result list into its declared target type
pub struct ResultExtractor;

impl ResultExtractor {
	pub fn extract(rows: &[Value], target: TargetType) -> MapperResult<Value> {
		match target {
			TargetType::List
			| TargetType::Collection(CollectionKind::Deque)
			| TargetType::Array(None) => Ok(Value::List(rows.to_vec())),
			TargetType::Collection(CollectionKind::Set) => {
				let mut seen = HashSet::with_capacity(rows.len());
				Ok(Value::List(
					rows.iter().filter(|v| seen.insert(*v)).cloned().collect(),
				))
			}
			TargetType::Array(Some(element)) => rows
				.iter()
				.map(|v| v.coerce(element))
				.collect::<MapperResult<Vec<_>>>()
				.map(Value::List),
			TargetType::Scalar => match rows {
				[] => Ok(Value::Null),
				[single] => Ok(single.clone()),
				_ => Err(MapperError::Extraction(
					"Statement returned more than one row, where no more than one was expected."
						.into(),
				)),
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::value::ValueType;
	use pretty_assertions::assert_eq;

	fn key() -> CacheKey {
		let mut k = CacheKey::new();
		k.update("authors.byId");
		k
	}

	#[test]
	fn test_scalar_extraction() {
		assert_eq!(ResultExtractor::extract(&[], TargetType::Scalar).unwrap(), Value::Null);
		assert_eq!(
			ResultExtractor::extract(&[Value::Int(1)], TargetType::Scalar).unwrap(),
			Value::Int(1)
		);
		assert!(matches!(
			ResultExtractor::extract(&[Value::Int(1), Value::Int(2)], TargetType::Scalar),
			Err(MapperError::Extraction(_))
		));
	}

	#[test]
	fn test_collection_extraction() {
		let rows = vec![Value::Int(1), Value::Int(2), Value::Int(1)];
		assert_eq!(
			ResultExtractor::extract(&rows, TargetType::Collection(CollectionKind::Set)).unwrap(),
			Value::List(vec![Value::Int(1), Value::Int(2)])
		);
		assert_eq!(
			ResultExtractor::extract(&rows, TargetType::Collection(CollectionKind::Deque)).unwrap(),
			Value::List(rows.clone())
		);
		assert_eq!(
			ResultExtractor::extract(&rows, TargetType::Array(Some(ValueType::Float))).unwrap(),
			Value::List(vec![Value::Float(1.0), Value::Float(2.0), Value::Float(1.0)])
		);
		assert!(ResultExtractor::extract(&[Value::from("x")], TargetType::Array(Some(ValueType::Int))).is_err());
	}

	#[test]
	fn test_load_waits_for_loaded_entry() {
		let mut cache = LocalCache::new();
		let target = Record::new();
		let load = DeferredLoad::new(
			target.clone(),
			PropertyPath::parse("author").unwrap(),
			key(),
			TargetType::Scalar,
		);

		assert!(!load.can_load(&cache));
		cache.mark_executing(key());
		assert!(!load.can_load(&cache));
		load.load(&cache).unwrap();
		assert!(!target.contains_key("author"));

		let author = Value::record([("name", Value::from("ann"))]);
		cache.store(key(), vec![author.clone()]);
		assert!(load.can_load(&cache));
		load.load(&cache).unwrap();
		assert_eq!(target.get("author"), Some(author.clone()));

		// attached values are copies, not the cached handle
		let Some(Value::Record(attached)) = target.get("author") else {
			panic!("expected record");
		};
		let Value::Record(cached) = author else {
			panic!("expected record");
		};
		assert!(!attached.ptr_eq(&cached));
	}
}
