//! Shared (second-level) caches and the per-transaction buffer over them

pub mod blocking;
pub mod key;
pub mod logging;
pub mod lru;
pub mod perpetual;
pub mod transactional;

pub use blocking::{BlockingCache, KeyLocks};
pub use key::CacheKey;
pub use logging::LoggingCache;
pub use lru::LruCache;
pub use perpetual::PerpetualCache;
pub use transactional::{TransactionalCache, TransactionalCacheManager};

use crate::error::MapperResult;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Result rows as stored in a shared cache
pub type CachedRows = Arc<Vec<Value>>;

/// Storage for query results shared between sessions.
///
/// Implementations do their own locking. A stored `None` is an explicit
/// null marker; `get` reports it the same as an absent key.
pub trait Cache: Send + Sync + fmt::Debug {
	fn id(&self) -> &str;

	fn size(&self) -> usize;

	fn get(&self, key: &CacheKey) -> MapperResult<Option<CachedRows>>;

	fn put(&self, key: CacheKey, value: Option<CachedRows>) -> MapperResult<()>;

	fn remove(&self, key: &CacheKey) -> MapperResult<()>;

	fn clear(&self) -> MapperResult<()>;

	/// Per-key locks, for caches that block concurrent misses
	fn lock_handle(&self) -> Option<&KeyLocks> {
		None
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Eviction {
	#[default]
	Lru,
	None,
}

/// Decorator chain for one namespace's shared cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheConfig {
	pub eviction: Eviction,
	pub size: usize,
	pub blocking: bool,
	pub blocking_timeout_ms: Option<u64>,
	pub logging: bool,
}

impl Default for CacheConfig {
	fn default() -> Self {
		Self {
			eviction: Eviction::Lru,
			size: 1024,
			blocking: false,
			blocking_timeout_ms: None,
			logging: true,
		}
	}
}

impl CacheConfig {
	pub fn build(&self, id: impl Into<String>) -> Arc<dyn Cache> {
		let mut cache: Box<dyn Cache> = Box::new(PerpetualCache::new(id));
		if self.eviction == Eviction::Lru {
			cache = Box::new(LruCache::new(cache, self.size));
		}
		if self.logging {
			cache = Box::new(LoggingCache::new(cache));
		}
		if self.blocking {
			let timeout = self.blocking_timeout_ms.map(Duration::from_millis);
			cache = Box::new(BlockingCache::new(cache, timeout));
		}
		Arc::from(cache)
	}
}
