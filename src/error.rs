//! Error types returned by the store.

use std::fmt;
use std::path::PathBuf;

/// Everything that can go wrong while operating the store.
#[derive(Debug)]
pub enum Error {
	/// The requested key has no live value.
	NotFound,
	/// An I/O error bubbled up from the filesystem.
	Io(std::io::Error),
	/// Rotating the active segment failed; `reopened` tells the caller
	/// whether the writer managed to reopen the previous active file so
	/// the store can keep accepting writes.
	RotationFailed { path: PathBuf, reopened: bool, source: std::io::Error },
	/// Replay of an immutable segment hit a record that cannot be
	/// interpreted (bad type tag or a body shorter than its header
	/// claims). Immutable segments are never truncated quietly.
	CorruptSegment { path: PathBuf, offset: u64 },
	/// The supplied configuration cannot be used to open a store.
	Configuration(String),
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Error::NotFound => write!(f, "key not found"),
			Error::Io(e) => write!(f, "I/O error: {e}"),
			Error::RotationFailed { path, reopened, source } => write!(
				f,
				"failed to rotate segment {path:?}: {source} (previous active file {})",
				if *reopened { "was reopened" } else { "could NOT be reopened" }
			),
			Error::CorruptSegment { path, offset } => {
				write!(f, "corrupt segment {path:?} at offset {offset}")
			}
			Error::Configuration(msg) => write!(f, "invalid configuration: {msg}"),
		}
	}
}

impl std::error::Error for Error {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			Error::Io(e) => Some(e),
			Error::RotationFailed { source, .. } => Some(source),
			_ => None,
		}
	}
}

impl From<std::io::Error> for Error {
	fn from(e: std::io::Error) -> Self {
		Error::Io(e)
	}
}

/// Shorthand used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
