use super::{Cache, CacheKey, CachedRows, KeyLocks};
use crate::error::MapperResult;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Logs the running hit ratio on every lookup
#[derive(Debug)]
pub struct LoggingCache {
	delegate: Box<dyn Cache>,
	requests: AtomicU64,
	hits: AtomicU64,
}

impl LoggingCache {
	pub fn new(delegate: Box<dyn Cache>) -> Self {
		Self {
			delegate,
			requests: AtomicU64::new(0),
			hits: AtomicU64::new(0),
		}
	}

	pub fn hit_ratio(&self) -> f64 {
		let requests = self.requests.load(Ordering::Relaxed);
		if requests == 0 {
			return 0.0;
		}
		self.hits.load(Ordering::Relaxed) as f64 / requests as f64
	}
}

impl Cache for LoggingCache {
	fn id(&self) -> &str {
		self.delegate.id()
	}

	fn size(&self) -> usize {
		self.delegate.size()
	}

	fn get(&self, key: &CacheKey) -> MapperResult<Option<CachedRows>> {
		self.requests.fetch_add(1, Ordering::Relaxed);
		let value = self.delegate.get(key)?;
		if value.is_some() {
			self.hits.fetch_add(1, Ordering::Relaxed);
		}
		debug!(cache = self.id(), "Cache Hit Ratio [{}]: {}", self.id(), self.hit_ratio());
		Ok(value)
	}

	fn put(&self, key: CacheKey, value: Option<CachedRows>) -> MapperResult<()> {
		self.delegate.put(key, value)
	}

	fn remove(&self, key: &CacheKey) -> MapperResult<()> {
		self.delegate.remove(key)
	}

	fn clear(&self) -> MapperResult<()> {
		self.delegate.clear()
	}

	fn lock_handle(&self) -> Option<&KeyLocks> {
		self.delegate.lock_handle()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::cache::PerpetualCache;
	use std::sync::Arc;

	#[test]
	fn test_hit_ratio() {
		let cache = LoggingCache::new(Box::new(PerpetualCache::new("t")));
		let mut key = CacheKey::new();
		key.update(1i64);

		assert!(cache.get(&key).unwrap().is_none());
		cache.put(key.clone(), Some(Arc::new(vec![]))).unwrap();
		assert!(cache.get(&key).unwrap().is_some());

		assert_eq!(cache.hit_ratio(), 0.5);
	}
}
