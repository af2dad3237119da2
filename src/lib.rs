//! `bitkeg` is an embeddable, log-structured key-value store in the
//! Bitcask lineage: every write is an append to an active segment file,
//! reads are served through an in-memory index of segment locations, and
//! old segments are reclaimed by periodic compaction.
//!
//! ```no_run
//! use bitkeg::{Config, Store};
//!
//! let store = Store::open(Config::new("/tmp/my-store")).unwrap();
//! store.put(b"hello", b"world").unwrap();
//! assert_eq!(store.get(b"hello").unwrap(), b"world");
//! ```

mod config;
mod error;
mod hint;
mod hook;
mod keydir;
mod merge;
mod reader;
mod record;
mod recovery;
mod segment;
mod writer;

pub use config::Config;
pub use error::{Error, Result};
pub use hook::{HookError, WriteObserver};
pub use merge::MergeStats;
pub use reader::RangeRead;
pub use record::Record;

use keydir::KeyDir;
use reader::Reader;
use writer::Writer;

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::ops::{Bound, RangeBounds};
use std::path::PathBuf;
use std::sync::Arc;

const LOCK_FILE_NAME: &str = ".lock";

/// A single open handle onto a data directory.
///
/// Cloning is not provided; share a `Store` across threads behind an
/// `Arc` (every method takes `&self`). Only one `Store` may have a given
/// data directory open at a time — `open` takes an advisory exclusive
/// lock on `<dataDir>/.lock` and fails immediately if another process
/// (or another `Store` in this process) already holds it.
pub struct Store {
	data_dir: PathBuf,
	writer: Writer,
	reader: Reader,
	keydir: Arc<KeyDir>,
	_lock_file: File,
}

impl Store {
	/// Validate `config`, replay whatever is on disk to rebuild the
	/// keydir, and return a `Store` ready to read and write.
	pub fn open(config: Config) -> Result<Store> {
		config.validate()?;

		let lock_file = acquire_lock(&config.data_dir)?;

		let recovered = recovery::recover(&config.data_dir)?;
		let keydir = Arc::new(recovered.keydir);

		let writer = Writer::new(
			config.data_dir.clone(),
			recovered.active_file,
			recovered.active_offset,
			config.max_file_size,
			config.sync_on_write,
			keydir.clone(),
			None,
		);
		let reader = Reader::new(config.data_dir.clone(), keydir.clone());

		Ok(Store { data_dir: config.data_dir, writer, reader, keydir, _lock_file: lock_file })
	}

	/// Same as [`Store::open`], but every observed write is reported to
	/// `observer` synchronously, under the write mutex, after it has
	/// landed in the keydir.
	pub fn open_with_observer(config: Config, observer: Arc<dyn WriteObserver>) -> Result<Store> {
		config.validate()?;

		let lock_file = acquire_lock(&config.data_dir)?;

		let recovered = recovery::recover(&config.data_dir)?;
		let keydir = Arc::new(recovered.keydir);

		let writer = Writer::new(
			config.data_dir.clone(),
			recovered.active_file,
			recovered.active_offset,
			config.max_file_size,
			config.sync_on_write,
			keydir.clone(),
			Some(observer),
		);
		let reader = Reader::new(config.data_dir.clone(), keydir.clone());

		Ok(Store { data_dir: config.data_dir, writer, reader, keydir, _lock_file: lock_file })
	}

	/// Write `value` under `key`, replacing any current value.
	pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
		self.writer.put(key, value)
	}

	/// Remove `key`. Deleting a key with no live value is a silent no-op:
	/// no tombstone is appended, since there is nothing it could mask.
	pub fn delete(&self, key: &[u8]) -> Result<()> {
		self.writer.delete(key)
	}

	/// Write every `(key, value)` pair under one lock acquisition. Not a
	/// transaction: a crash partway through leaves a prefix of the batch
	/// durable, not none of it.
	pub fn batch_put(&self, entries: &[(Vec<u8>, Vec<u8>)]) -> Result<()> {
		self.writer.batch_put(entries)
	}

	/// Read the current value of `key`, or `Error::NotFound`.
	pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
		self.reader.read(key)
	}

	/// True if `key` currently has a live value.
	pub fn contains_key(&self, key: &[u8]) -> bool {
		self.keydir.contains(key)
	}

	/// Lazily read every live `(key, value)` pair whose key falls in
	/// `range`, in ascending key order. The key set is snapshotted at
	/// call time; each value is read from disk as the iterator is
	/// advanced.
	pub fn range(&self, range: impl RangeBounds<Vec<u8>>) -> RangeRead {
		let lo = clone_bound(range.start_bound());
		let hi = clone_bound(range.end_bound());
		self.reader.range_read(lo, hi)
	}

	/// A sorted snapshot of every live key.
	pub fn keys(&self) -> Vec<Vec<u8>> {
		self.reader.list_keys()
	}

	/// How many live keys the store currently holds.
	pub fn len(&self) -> usize {
		self.keydir.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Compact every immutable segment into one, dropping any record the
	/// keydir no longer considers live. Blocks all other writes for its
	/// duration; never blocks readers. Returns `None` if there were no
	/// immutable segments to merge.
	pub fn merge(&self) -> Result<Option<MergeStats>> {
		merge::merge(&self.data_dir, &self.keydir, &self.writer)
	}
}

fn clone_bound(b: Bound<&Vec<u8>>) -> Bound<Vec<u8>> {
	match b {
		Bound::Included(v) => Bound::Included(v.clone()),
		Bound::Excluded(v) => Bound::Excluded(v.clone()),
		Bound::Unbounded => Bound::Unbounded,
	}
}

/// Take an advisory, non-blocking exclusive lock on `<dataDir>/.lock`.
/// The lock is released automatically when the returned `File` (held by
/// the `Store`) is dropped.
fn acquire_lock(data_dir: &std::path::Path) -> Result<File> {
	let path = data_dir.join(LOCK_FILE_NAME);
	let file = OpenOptions::new().create(true).write(true).open(&path)?;
	file.try_lock_exclusive()?;
	Ok(file)
}
