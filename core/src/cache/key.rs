use crate::value::Value;
use smallvec::SmallVec;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

const DEFAULT_MULTIPLIER: u64 = 37;
const DEFAULT_HASHCODE: u64 = 17;

/// Order-sensitive fingerprint of a query.
///
/// The hash code is folded in incrementally as components are pushed, but
/// equality always compares the full component list, so colliding hashes
/// never produce a false match.
#[derive(Clone)]
pub struct CacheKey {
	hashcode: u64,
	checksum: u64,
	count: usize,
	components: SmallVec<[Value; 8]>,
}

impl CacheKey {
	pub fn new() -> Self {
		Self {
			hashcode: DEFAULT_HASHCODE,
			checksum: 0,
			count: 0,
			components: SmallVec::new(),
		}
	}

	/// Records and lists are copied, so later changes to the caller's
	/// value never alter a stored key.
	pub fn update(&mut self, component: impl Into<Value>) {
		let component = component.into().snapshot();

		let mut hasher = DefaultHasher::new();
		component.hash(&mut hasher);
		let base = hasher.finish();

		self.count += 1;
		self.checksum = self.checksum.wrapping_add(base);
		let base = base.wrapping_mul(self.count as u64);
		self.hashcode = DEFAULT_MULTIPLIER.wrapping_mul(self.hashcode).wrapping_add(base);

		self.components.push(component);
	}

	pub fn update_all<I, V>(&mut self, components: I)
	where
		I: IntoIterator<Item = V>,
		V: Into<Value>,
	{
		for component in components {
			self.update(component);
		}
	}

	pub fn hashcode(&self) -> u64 {
		self.hashcode
	}

	pub fn len(&self) -> usize {
		self.count
	}

	pub fn is_empty(&self) -> bool {
		self.count == 0
	}

	pub fn components(&self) -> &[Value] {
		&self.components
	}
}

impl Default for CacheKey {
	fn default() -> Self {
		Self::new()
	}
}

impl PartialEq for CacheKey {
	fn eq(&self, other: &Self) -> bool {
		self.hashcode == other.hashcode
			&& self.checksum == other.checksum
			&& self.count == other.count
			&& self.components == other.components
	}
}

impl Eq for CacheKey {}

impl Hash for CacheKey {
	fn hash<H: Hasher>(&self, state: &mut H) {
		state.write_u64(self.hashcode);
	}
}

impl fmt::Debug for CacheKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "CacheKey({self})")
	}
}

impl fmt::Display for CacheKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}", self.hashcode, self.checksum)?;
		for component in &self.components {
			write!(f, ":{component}")?;
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashSet;

	fn key(parts: &[Value]) -> CacheKey {
		let mut key = CacheKey::new();
		key.update_all(parts.iter().cloned());
		key
	}

	#[test]
	fn test_identical_inputs_are_equal() {
		let parts = [
			Value::from("blog.find"),
			Value::Int(0),
			Value::from(usize::MAX),
			Value::from("select * from blog where id = ?"),
			Value::Int(1),
			Value::from("prod"),
		];
		let a = key(&parts);
		let b = key(&parts);
		assert_eq!(a, b);
		assert_eq!(b, a);
		assert_eq!(a.hashcode(), b.hashcode());
		assert_eq!(a, a.clone());

		let set: HashSet<CacheKey> = [a, b].into_iter().collect();
		assert_eq!(set.len(), 1);
	}

	#[test]
	fn test_every_component_matters() {
		let base = key(&[Value::from("s"), Value::Int(0), Value::Int(10), Value::Int(1)]);
		assert_ne!(base, key(&[Value::from("s"), Value::Int(1), Value::Int(10), Value::Int(1)]));
		assert_ne!(base, key(&[Value::from("s"), Value::Int(0), Value::Int(10), Value::Int(2)]));
		assert_ne!(base, key(&[Value::from("s"), Value::Int(0), Value::Int(10)]));
	}

	#[test]
	fn test_order_matters() {
		let ab = key(&[Value::Int(1), Value::Int(2)]);
		let ba = key(&[Value::Int(2), Value::Int(1)]);
		assert_ne!(ab, ba);
	}

	#[test]
	fn test_structurally_equal_records() {
		let a = key(&[Value::record([("id", Value::Int(1))])]);
		let b = key(&[Value::record([("id", Value::Int(1))])]);
		assert_eq!(a, b);
	}

	#[test]
	fn test_stored_key_ignores_later_record_changes() {
		let param = Value::record([("id", Value::Int(1))]);
		let stored = key(&[param.clone()]);
		let lookups: HashSet<CacheKey> = [stored.clone()].into_iter().collect();

		param.as_record().unwrap().set("id", Value::Int(2));
		assert_eq!(stored.components(), &[Value::record([("id", Value::Int(1))])]);
		assert!(lookups.contains(&key(&[Value::record([("id", Value::Int(1))])])));
		assert!(!lookups.contains(&key(&[param])));
	}

	#[test]
	fn test_null_and_empty_components() {
		let with_null = key(&[Value::Null]);
		let empty = CacheKey::new();
		assert_ne!(with_null, empty);
		assert!(empty.is_empty());
		assert_eq!(with_null.len(), 1);
	}
}
