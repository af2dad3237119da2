//! Store configuration.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Options controlling how a [`Store`](crate::Store) opens and writes data.
#[derive(Debug, Clone)]
pub struct Config {
	/// Directory holding segment files, hint sidecars, and the lock file.
	pub data_dir: PathBuf,
	/// If true, every append is fsync'd before the call returns.
	/// If false, durability is best-effort: data survives a clean
	/// `close()` but not necessarily a hard crash.
	pub sync_on_write: bool,
	/// Byte threshold for the active segment. Rotation happens on the
	/// next append once `currentOffset + 4 + recordLength` would exceed
	/// this value.
	pub max_file_size: u64,
}

impl Config {
	/// Build a config pointed at `data_dir` with sensible defaults
	/// (`syncOnWrite = false`, 128 MiB segments).
	pub fn new(data_dir: impl Into<PathBuf>) -> Config {
		Config {
			data_dir: data_dir.into(),
			sync_on_write: false,
			max_file_size: 128 * 1024 * 1024,
		}
	}

	/// Builder-style setter for `sync_on_write`.
	pub fn sync_on_write(mut self, v: bool) -> Config {
		self.sync_on_write = v;
		self
	}

	/// Builder-style setter for `max_file_size`.
	pub fn max_file_size(mut self, v: u64) -> Config {
		self.max_file_size = v;
		self
	}

	pub(crate) fn validate(&self) -> Result<()> {
		if self.max_file_size == 0 {
			return Err(Error::Configuration("maxFileSize must be positive".into()));
		}
		ensure_dir(&self.data_dir)?;
		Ok(())
	}
}

fn ensure_dir(path: &Path) -> Result<()> {
	match std::fs::create_dir_all(path) {
		Ok(()) => {}
		Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
		Err(e) => {
			return Err(Error::Configuration(format!(
				"data directory {path:?} is not usable: {e}"
			)))
		}
	}
	let meta = std::fs::metadata(path)
		.map_err(|e| Error::Configuration(format!("data directory {path:?} is not usable: {e}")))?;
	if !meta.is_dir() {
		return Err(Error::Configuration(format!("{path:?} is not a directory")));
	}
	Ok(())
}
