use crate::cache::CacheKey;
use crate::value::Value;
use std::collections::HashMap;

/// Session cache slot for one fingerprint
#[derive(Debug, Clone, PartialEq)]
pub enum LocalEntry {
	/// The query is running further up the stack
	Executing,
	Loaded(Vec<Value>),
}

/// Per-session result cache plus the OUT parameters of callable statements.
#[derive(Debug, Default)]
pub struct LocalCache {
	entries: HashMap<CacheKey, LocalEntry>,
	out_params: HashMap<CacheKey, Vec<(String, Value)>>,
}

impl LocalCache {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn get(&self, key: &CacheKey) -> Option<&LocalEntry> {
		self.entries.get(key)
	}

	pub fn contains(&self, key: &CacheKey) -> bool {
		self.entries.contains_key(key)
	}

	pub fn is_loaded(&self, key: &CacheKey) -> bool {
		matches!(self.entries.get(key), Some(LocalEntry::Loaded(_)))
	}

	pub fn mark_executing(&mut self, key: CacheKey) {
		self.entries.insert(key, LocalEntry::Executing);
	}

	pub fn store(&mut self, key: CacheKey, rows: Vec<Value>) {
		self.entries.insert(key, LocalEntry::Loaded(rows));
	}

	pub fn remove(&mut self, key: &CacheKey) -> Option<LocalEntry> {
		self.entries.remove(key)
	}

	pub fn store_out_params(&mut self, key: CacheKey, values: Vec<(String, Value)>) {
		self.out_params.insert(key, values);
	}

	pub fn out_params(&self, key: &CacheKey) -> Option<&[(String, Value)]> {
		self.out_params.get(key).map(Vec::as_slice)
	}

	pub fn clear(&mut self) {
		self.entries.clear();
		self.out_params.clear();
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}
