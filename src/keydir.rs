//! The in-memory index mapping every live key to the segment location of
//! its current value.

use antidote::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;

/// Where a value currently lives on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Locator {
	pub(crate) segment: String,
	pub(crate) value_offset: u64,
	pub(crate) value_len: u32,
}

/// Ordered key→[`Locator`] map. Readers take a shared lock per call;
/// writers hold the single write mutex (see `writer.rs`) for the
/// duration of the mutation, so the `RwLock` here is never contended by
/// more than one writer at a time — it exists so range scans and point
/// reads never block on each other or on a writer mid-append.
#[derive(Default)]
pub(crate) struct KeyDir {
	entries: RwLock<BTreeMap<Vec<u8>, Locator>>,
}

impl KeyDir {
	pub(crate) fn new() -> KeyDir {
		KeyDir { entries: RwLock::new(BTreeMap::new()) }
	}

	pub(crate) fn get(&self, key: &[u8]) -> Option<Locator> {
		self.entries.read().get(key).cloned()
	}

	pub(crate) fn insert(&self, key: Vec<u8>, locator: Locator) {
		self.entries.write().insert(key, locator);
	}

	pub(crate) fn remove(&self, key: &[u8]) -> Option<Locator> {
		self.entries.write().remove(key)
	}

	pub(crate) fn contains(&self, key: &[u8]) -> bool {
		self.entries.read().contains_key(key)
	}

	/// A snapshot of every entry whose segment is `old_segment`, taken
	/// under the write mutex by the caller (rotation). Used to find the
	/// locators that need retargeting after a rename.
	pub(crate) fn keys_in_segment(&self, old_segment: &str) -> Vec<Vec<u8>> {
		self.entries
			.read()
			.iter()
			.filter(|(_, loc)| loc.segment == old_segment)
			.map(|(k, _)| k.clone())
			.collect()
	}

	/// A point-in-time snapshot of `[lo, hi)` in sorted key order.
	pub(crate) fn range(&self, lo: Bound<Vec<u8>>, hi: Bound<Vec<u8>>) -> Vec<(Vec<u8>, Locator)> {
		self.entries
			.read()
			.range((lo, hi))
			.map(|(k, v)| (k.clone(), v.clone()))
			.collect()
	}

	/// A point-in-time snapshot of every key, sorted.
	pub(crate) fn keys(&self) -> Vec<Vec<u8>> {
		self.entries.read().keys().cloned().collect()
	}

	/// A point-in-time snapshot of every (key, locator) pair.
	pub(crate) fn snapshot(&self) -> Vec<(Vec<u8>, Locator)> {
		self.entries.read().iter().map(|(k, v)| (k.clone(), v.clone())).collect()
	}

	pub(crate) fn len(&self) -> usize {
		self.entries.read().len()
	}
}
