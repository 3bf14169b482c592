use super::{Cache, CacheKey, CachedRows, KeyLocks};
use crate::error::MapperResult;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Bounds a cache to `capacity` keys, evicting the least recently used
#[derive(Debug)]
pub struct LruCache {
	delegate: Box<dyn Cache>,
	capacity: usize,
	/// Most recent at the back
	recency: Mutex<VecDeque<CacheKey>>,
}

impl LruCache {
	pub fn new(delegate: Box<dyn Cache>, capacity: usize) -> Self {
		Self {
			delegate,
			capacity: capacity.max(1),
			recency: Mutex::new(VecDeque::new()),
		}
	}

	fn touch(&self, key: &CacheKey) -> Option<CacheKey> {
		let mut recency = self.recency.lock();
		if let Some(pos) = recency.iter().position(|k| k == key) {
			recency.remove(pos);
		}
		recency.push_back(key.clone());

		if recency.len() > self.capacity {
			recency.pop_front()
		} else {
			None
		}
	}
}

impl Cache for LruCache {
	fn id(&self) -> &str {
		self.delegate.id()
	}

	fn size(&self) -> usize {
		self.delegate.size()
	}

	fn get(&self, key: &CacheKey) -> MapperResult<Option<CachedRows>> {
		let value = self.delegate.get(key)?;
		if value.is_some() {
			let mut recency = self.recency.lock();
			if let Some(pos) = recency.iter().position(|k| k == key) {
				if let Some(k) = recency.remove(pos) {
					recency.push_back(k);
				}
			}
		}
		Ok(value)
	}

	fn put(&self, key: CacheKey, value: Option<CachedRows>) -> MapperResult<()> {
		let eldest = self.touch(&key);
		self.delegate.put(key, value)?;
		if let Some(eldest) = eldest {
			self.delegate.remove(&eldest)?;
		}
		Ok(())
	}

	fn remove(&self, key: &CacheKey) -> MapperResult<()> {
		self.recency.lock().retain(|k| k != key);
		self.delegate.remove(key)
	}

	fn clear(&self) -> MapperResult<()> {
		self.recency.lock().clear();
		self.delegate.clear()
	}

	fn lock_handle(&self) -> Option<&KeyLocks> {
		self.delegate.lock_handle()
	}
}
