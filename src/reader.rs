//! Read path: point reads, range scans, and key listing. None of these
//! take the write mutex — they only ever take the keydir's shared read
//! lock for the instant needed to resolve a locator or take a snapshot.

use crate::error::{Error, Result};
use crate::keydir::{KeyDir, Locator};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::ops::Bound;
use std::path::PathBuf;
use std::sync::Arc;

pub(crate) struct Reader {
	data_dir: PathBuf,
	keydir: Arc<KeyDir>,
}

impl Reader {
	pub(crate) fn new(data_dir: PathBuf, keydir: Arc<KeyDir>) -> Reader {
		Reader { data_dir, keydir }
	}

	pub(crate) fn read(&self, key: &[u8]) -> Result<Vec<u8>> {
		let locator = self.keydir.get(key).ok_or(Error::NotFound)?;
		read_value(&self.data_dir, &locator)
	}

	/// A lazy sequence of `(key, value)` pairs for every keydir key in
	/// `[lo, hi)`, reflecting the keydir snapshot taken here — not
	/// transactional against concurrent writes that land afterward.
	pub(crate) fn range_read(&self, lo: Bound<Vec<u8>>, hi: Bound<Vec<u8>>) -> RangeRead {
		let snapshot = self.keydir.range(lo, hi);
		RangeRead { data_dir: self.data_dir.clone(), snapshot: snapshot.into_iter() }
	}

	pub(crate) fn list_keys(&self) -> Vec<Vec<u8>> {
		self.keydir.keys()
	}
}

/// A lazy, snapshot-based iterator over `(key, value)` pairs produced by
/// [`Store::range`](crate::Store::range).
pub struct RangeRead {
	data_dir: PathBuf,
	snapshot: std::vec::IntoIter<(Vec<u8>, Locator)>,
}

impl Iterator for RangeRead {
	type Item = Result<(Vec<u8>, Vec<u8>)>;

	fn next(&mut self) -> Option<Self::Item> {
		let (key, locator) = self.snapshot.next()?;
		Some(read_value(&self.data_dir, &locator).map(|value| (key, value)))
	}
}

/// Open/seek/read happens per call; no file handle is cached across
/// calls. A small LRU of open handles would be a valid optimization but
/// isn't required for correctness.
fn read_value(data_dir: &std::path::Path, locator: &Locator) -> Result<Vec<u8>> {
	let mut file = File::open(data_dir.join(&locator.segment))?;
	file.seek(SeekFrom::Start(locator.value_offset))?;
	let mut buf = vec![0u8; locator.value_len as usize];
	file.read_exact(&mut buf)?;
	Ok(buf)
}
