use super::{Cache, CacheKey, CachedRows};
use crate::error::MapperResult;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::warn;

/// Buffers one session's writes to a shared cache until commit.
///
/// Reads go through to the shared cache, writes wait in the buffer. Keys
/// that missed are remembered so that a blocking delegate's locks get
/// released on commit (by storing a null marker) or rollback (by removal).
#[derive(Debug)]
pub struct TransactionalCache {
	delegate: Arc<dyn Cache>,
	clear_on_commit: bool,
	entries_to_add: HashMap<CacheKey, CachedRows>,
	entries_missed: HashSet<CacheKey>,
}

impl TransactionalCache {
	pub fn new(delegate: Arc<dyn Cache>) -> Self {
		Self {
			delegate,
			clear_on_commit: false,
			entries_to_add: HashMap::new(),
			entries_missed: HashSet::new(),
		}
	}

	pub fn id(&self) -> &str {
		self.delegate.id()
	}

	pub fn get(&mut self, key: &CacheKey) -> MapperResult<Option<CachedRows>> {
		// This buffer already holds the delegate's lock for the key.
		if self.entries_missed.contains(key) && self.delegate.lock_handle().is_some() {
			return Ok(None);
		}

		let value = self.delegate.get(key)?;
		if value.is_none() {
			self.entries_missed.insert(key.clone());
		}

		if self.clear_on_commit {
			Ok(None)
		} else {
			Ok(value)
		}
	}

	pub fn put(&mut self, key: CacheKey, rows: CachedRows) {
		self.entries_to_add.insert(key, rows);
	}

	pub fn clear(&mut self) {
		self.clear_on_commit = true;
		self.entries_to_add.clear();
	}

	pub fn commit(&mut self) -> MapperResult<()> {
		let result = self.flush_pending_entries();
		if result.is_err() {
			self.unlock_missed_entries();
		}
		self.reset();
		result
	}

	pub fn rollback(&mut self) {
		self.unlock_missed_entries();
		self.reset();
	}

	fn flush_pending_entries(&mut self) -> MapperResult<()> {
		if self.clear_on_commit {
			self.delegate.clear()?;
		}
		for (key, rows) in self.entries_to_add.drain() {
			self.entries_missed.remove(&key);
			self.delegate.put(key, Some(rows))?;
		}
		for key in self.entries_missed.drain() {
			self.delegate.put(key, None)?;
		}
		Ok(())
	}

	fn unlock_missed_entries(&mut self) {
		for key in self.entries_missed.drain() {
			if let Err(e) = self.delegate.remove(&key) {
				warn!(
					cache = self.delegate.id(),
					error = %e,
					"Unexpected failure while notifying a rollback to the cache adapter"
				);
			}
		}
	}

	fn reset(&mut self) {
		self.clear_on_commit = false;
		self.entries_to_add.clear();
		self.entries_missed.clear();
	}
}

/// One [`TransactionalCache`] per shared cache touched by a session
#[derive(Debug, Default)]
pub struct TransactionalCacheManager {
	caches: HashMap<String, TransactionalCache>,
}

impl TransactionalCacheManager {
	pub fn new() -> Self {
		Self::default()
	}

	fn buffer(&mut self, cache: &Arc<dyn Cache>) -> &mut TransactionalCache {
		self.caches
			.entry(cache.id().to_string())
			.or_insert_with(|| TransactionalCache::new(cache.clone()))
	}

	pub fn get(&mut self, cache: &Arc<dyn Cache>, key: &CacheKey) -> MapperResult<Option<CachedRows>> {
		self.buffer(cache).get(key)
	}

	pub fn put(&mut self, cache: &Arc<dyn Cache>, key: CacheKey, rows: CachedRows) {
		self.buffer(cache).put(key, rows);
	}

	pub fn clear(&mut self, cache: &Arc<dyn Cache>) {
		self.buffer(cache).clear();
	}

	/// Commit every buffer, returning the first failure after trying all.
	pub fn commit(&mut self) -> MapperResult<()> {
		let mut first_error = None;
		for buffer in self.caches.values_mut() {
			if let Err(e) = buffer.commit() {
				first_error.get_or_insert(e);
			}
		}
		first_error.map_or(Ok(()), Err)
	}

	pub fn rollback(&mut self) {
		for buffer in self.caches.values_mut() {
			buffer.rollback();
		}
	}
}
