use super::{Cache, CacheKey, CachedRows};
use crate::error::MapperResult;
use dashmap::DashMap;

/// Unbounded concurrent map; the base of every decorator chain
#[derive(Debug)]
pub struct PerpetualCache {
	id: String,
	entries: DashMap<CacheKey, Option<CachedRows>>,
}

impl PerpetualCache {
	pub fn new(id: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			entries: DashMap::new(),
		}
	}

	/// Whether the key is stored, including as a null marker
	pub fn contains(&self, key: &CacheKey) -> bool {
		self.entries.contains_key(key)
	}
}

impl Cache for PerpetualCache {
	fn id(&self) -> &str {
		&self.id
	}

	fn size(&self) -> usize {
		self.entries.len()
	}

	fn get(&self, key: &CacheKey) -> MapperResult<Option<CachedRows>> {
		Ok(self.entries.get(key).and_then(|e| e.value().clone()))
	}

	fn put(&self, key: CacheKey, value: Option<CachedRows>) -> MapperResult<()> {
		self.entries.insert(key, value);
		Ok(())
	}

	fn remove(&self, key: &CacheKey) -> MapperResult<()> {
		self.entries.remove(key);
		Ok(())
	}

	fn clear(&self) -> MapperResult<()> {
		self.entries.clear();
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::value::Value;
	use std::sync::Arc;

	fn key(i: i64) -> CacheKey {
		let mut k = CacheKey::new();
		k.update(i);
		k
	}

	#[test]
	fn test_put_get_remove() {
		let cache = PerpetualCache::new("t");
		cache.put(key(1), Some(Arc::new(vec![Value::Int(1)]))).unwrap();
		cache.put(key(2), None).unwrap();

		assert_eq!(cache.size(), 2);
		assert_eq!(cache.get(&key(1)).unwrap().as_deref(), Some(&vec![Value::Int(1)]));
		assert!(cache.get(&key(2)).unwrap().is_none());
		assert!(cache.contains(&key(2)));

		cache.remove(&key(1)).unwrap();
		assert!(cache.get(&key(1)).unwrap().is_none());
		cache.clear().unwrap();
		assert_eq!(cache.size(), 0);
	}
}
