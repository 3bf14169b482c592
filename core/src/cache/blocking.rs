use super::{Cache, CacheKey, CachedRows};
use crate::error::{MapperError, MapperResult};
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default)]
struct Latch {
	released: Mutex<bool>,
	cond: Condvar,
}

impl Latch {
	fn release(&self) {
		*self.released.lock() = true;
		self.cond.notify_all();
	}

	/// Returns false on timeout.
	fn wait(&self, timeout: Option<Duration>) -> bool {
		let mut released = self.released.lock();
		while !*released {
			match timeout {
				Some(t) => {
					if self.cond.wait_for(&mut released, t).timed_out() {
						return *released;
					}
				}
				None => self.cond.wait(&mut released),
			}
		}
		true
	}
}

/// Table of keys currently locked by a miss
#[derive(Debug, Default)]
pub struct KeyLocks {
	latches: Mutex<HashMap<CacheKey, Arc<Latch>>>,
}

impl KeyLocks {
	pub fn is_locked(&self, key: &CacheKey) -> bool {
		self.latches.lock().contains_key(key)
	}

	pub fn held(&self) -> usize {
		self.latches.lock().len()
	}

	fn acquire(&self, key: &CacheKey, timeout: Option<Duration>) -> MapperResult<()> {
		loop {
			let existing = {
				let mut latches = self.latches.lock();
				match latches.get(key) {
					Some(latch) => latch.clone(),
					None => {
						latches.insert(key.clone(), Arc::new(Latch::default()));
						return Ok(());
					}
				}
			};

			if !existing.wait(timeout) {
				return Err(MapperError::Cache(format!(
					"couldn't get a lock in {timeout:?} for the key {key}"
				)));
			}
		}
	}

	fn release(&self, key: &CacheKey) {
		if let Some(latch) = self.latches.lock().remove(key) {
			latch.release();
		}
	}
}

/// Lets only one caller at a time compute a missing entry.
///
/// A `get` that misses keeps the key locked; the caller is expected to
/// follow with `put` (which stores and unlocks) or `remove` (which only
/// unlocks). Other callers asking for that key wait meanwhile.
#[derive(Debug)]
pub struct BlockingCache {
	delegate: Box<dyn Cache>,
	timeout: Option<Duration>,
	locks: KeyLocks,
}

impl BlockingCache {
	pub fn new(delegate: Box<dyn Cache>, timeout: Option<Duration>) -> Self {
		Self {
			delegate,
			timeout,
			locks: KeyLocks::default(),
		}
	}
}

impl Cache for BlockingCache {
	fn id(&self) -> &str {
		self.delegate.id()
	}

	fn size(&self) -> usize {
		self.delegate.size()
	}

	fn get(&self, key: &CacheKey) -> MapperResult<Option<CachedRows>> {
		self.locks.acquire(key, self.timeout)?;
		let value = self.delegate.get(key);
		if !matches!(value, Ok(None)) {
			self.locks.release(key);
		}
		value
	}

	fn put(&self, key: CacheKey, value: Option<CachedRows>) -> MapperResult<()> {
		let result = self.delegate.put(key.clone(), value);
		self.locks.release(&key);
		result
	}

	/// Releases the lock only; a missed key has nothing stored to remove.
	fn remove(&self, key: &CacheKey) -> MapperResult<()> {
		self.locks.release(key);
		Ok(())
	}

	fn clear(&self) -> MapperResult<()> {
		self.delegate.clear()
	}

	fn lock_handle(&self) -> Option<&KeyLocks> {
		Some(&self.locks)
	}
}
