//! Segment file naming and enumeration.
//!
//! A data directory holds exactly one writable segment, `active.log`, and
//! any number of immutable segments: `data_<millis>.log` (produced by
//! rotation) and `merged_<millis>.log` (produced by compaction). Every
//! immutable segment may have a same-named `.hint` sidecar next to it.
//!
//! Replay and merge both need segment order to equal creation order.
//! Raw byte-wise filename comparison gets this right *within* one prefix
//! (`data_` vs `data_`, `merged_` vs `merged_`) but not *across* them: a
//! `data_` file created after a `merged_` file still compares less than
//! it, because `'d' < 'm'`. `SegmentId`'s `Ord` therefore parses the
//! embedded `(millis, counter)` pair out of the name and orders on that
//! instead of the raw string, with `active.log` always sorting last.
//! Two rotations or merges inside the same millisecond are disambiguated
//! with a trailing `_<n>` counter, assigned by the writer while it holds
//! the write mutex.

use std::cmp::Ordering;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

pub(crate) const ACTIVE_NAME: &str = "active.log";
const DATA_PREFIX: &str = "data_";
const MERGED_PREFIX: &str = "merged_";
const LOG_SUFFIX: &str = ".log";
const HINT_SUFFIX: &str = ".hint";

/// What role a segment file plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SegmentKind {
	Active,
	Rotated,
	Merged,
}

/// An immutable or active segment on disk.
#[derive(Debug, Clone, Eq)]
pub(crate) struct SegmentId {
	pub(crate) file_name: String,
	/// `None` for `active.log`; otherwise the parsed `(millis, counter)`
	/// used to order this segment against every other segment.
	creation_key: Option<(u128, u32)>,
}

impl PartialEq for SegmentId {
	fn eq(&self, other: &Self) -> bool {
		self.file_name == other.file_name
	}
}

impl PartialOrd for SegmentId {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for SegmentId {
	fn cmp(&self, other: &Self) -> Ordering {
		// `active.log` (key = None) is always the newest segment.
		match (self.creation_key, other.creation_key) {
			(None, None) => Ordering::Equal,
			(None, Some(_)) => Ordering::Greater,
			(Some(_), None) => Ordering::Less,
			(Some(a), Some(b)) => a.cmp(&b),
		}
	}
}

impl SegmentId {
	pub(crate) fn path(&self, data_dir: &Path) -> PathBuf {
		data_dir.join(&self.file_name)
	}

	pub(crate) fn hint_path(&self, data_dir: &Path) -> PathBuf {
		data_dir.join(format!("{}{}", self.file_name, HINT_SUFFIX))
	}

	pub(crate) fn kind(&self) -> SegmentKind {
		if self.file_name == ACTIVE_NAME {
			SegmentKind::Active
		} else if self.file_name.starts_with(MERGED_PREFIX) {
			SegmentKind::Merged
		} else {
			SegmentKind::Rotated
		}
	}

	pub(crate) fn active() -> SegmentId {
		SegmentId { file_name: ACTIVE_NAME.to_string(), creation_key: None }
	}

	pub(crate) fn rotated(millis: u128, collision_counter: u32) -> SegmentId {
		SegmentId {
			file_name: format_timestamped(DATA_PREFIX, millis, collision_counter),
			creation_key: Some((millis, collision_counter)),
		}
	}

	pub(crate) fn merged(millis: u128, collision_counter: u32) -> SegmentId {
		SegmentId {
			file_name: format_timestamped(MERGED_PREFIX, millis, collision_counter),
			creation_key: Some((millis, collision_counter)),
		}
	}

	/// Parse a filename already known to satisfy [`is_log_file`].
	fn from_file_name(name: &str) -> SegmentId {
		if name == ACTIVE_NAME {
			return SegmentId::active();
		}
		let (prefix_len, _is_merged) = if name.starts_with(MERGED_PREFIX) {
			(MERGED_PREFIX.len(), true)
		} else {
			(DATA_PREFIX.len(), false)
		};
		let stem = &name[prefix_len..name.len() - LOG_SUFFIX.len()];
		let (millis, counter) = match stem.split_once('_') {
			Some((m, c)) => (m.parse().unwrap_or(0), c.parse().unwrap_or(0)),
			None => (stem.parse().unwrap_or(0), 0),
		};
		SegmentId { file_name: name.to_string(), creation_key: Some((millis, counter)) }
	}
}

fn format_timestamped(prefix: &str, millis: u128, collision_counter: u32) -> String {
	if collision_counter == 0 {
		format!("{prefix}{millis}{LOG_SUFFIX}")
	} else {
		format!("{prefix}{millis}_{collision_counter}{LOG_SUFFIX}")
	}
}

/// List every `.log` file in `data_dir`, sorted into creation order (see
/// the module docs for why this is not a raw string sort).
pub(crate) fn list_segments(data_dir: &Path) -> std::io::Result<Vec<SegmentId>> {
	let mut out = vec![];
	for entry in std::fs::read_dir(data_dir)? {
		let entry = entry?;
		let file_name = entry.file_name();
		let Some(name) = file_name.to_str() else { continue };
		if is_log_file(name) {
			out.push(SegmentId::from_file_name(name));
		}
	}
	out.sort();
	Ok(out)
}

fn is_log_file(name: &str) -> bool {
	name == ACTIVE_NAME
		|| (name.starts_with(DATA_PREFIX) && name.ends_with(LOG_SUFFIX))
		|| (name.starts_with(MERGED_PREFIX) && name.ends_with(LOG_SUFFIX))
}

/// True if `name` names a `.hint` sidecar rather than a log segment.
pub(crate) fn is_hint_file(name: &OsStr) -> bool {
	name.to_str().map(|s| s.ends_with(HINT_SUFFIX)).unwrap_or(false)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn active_sorts_after_numeric_segments() {
		let mut ids = vec![
			SegmentId::active(),
			SegmentId::rotated(1_700_000_000_000, 0),
			SegmentId::merged(1_700_000_000_500, 0),
		];
		ids.sort();
		assert_eq!(ids.last().unwrap().file_name, ACTIVE_NAME);
	}

	#[test]
	fn collision_counter_breaks_ties() {
		let a = SegmentId::rotated(1_700_000_000_000, 0);
		let b = SegmentId::rotated(1_700_000_000_000, 1);
		assert!(a < b);
		assert_eq!(a.file_name, "data_1700000000000.log");
		assert_eq!(b.file_name, "data_1700000000000_1.log");
	}

	#[test]
	fn rotation_after_merge_still_sorts_later() {
		// A merge can finish and a later rotation can still carry a
		// smaller-looking filename under raw string order ("data_" <
		// "merged_"); creation-key order must still put it last.
		let merged = SegmentId::merged(1_000, 0);
		let later_rotation = SegmentId::rotated(2_000, 0);
		assert!(merged < later_rotation);

		let mut from_disk = vec![later_rotation.clone(), merged.clone()];
		from_disk.sort();
		assert_eq!(from_disk, vec![merged, later_rotation]);
	}

	#[test]
	fn kind_classification() {
		assert_eq!(SegmentId::active().kind(), SegmentKind::Active);
		assert_eq!(SegmentId::rotated(1, 0).kind(), SegmentKind::Rotated);
		assert_eq!(SegmentId::merged(1, 0).kind(), SegmentKind::Merged);
	}

	#[test]
	fn hint_path_matches_segment_name() {
		let id = SegmentId::rotated(42, 0);
		let dir = Path::new("/data");
		assert_eq!(id.hint_path(dir), dir.join("data_42.log.hint"));
	}

	#[test]
	fn lists_only_log_files_in_creation_order() {
		let tmp = tempfile::TempDir::new().unwrap();
		std::fs::write(tmp.path().join(ACTIVE_NAME), b"").unwrap();
		std::fs::write(tmp.path().join("data_2.log"), b"").unwrap();
		std::fs::write(tmp.path().join("data_2.log.hint"), b"").unwrap();
		std::fs::write(tmp.path().join("merged_1.log"), b"").unwrap();
		std::fs::write(tmp.path().join(".lock"), b"").unwrap();

		let segs = list_segments(tmp.path()).unwrap();
		let names: Vec<_> = segs.iter().map(|s| s.file_name.as_str()).collect();
		assert_eq!(names, vec!["merged_1.log", "data_2.log", ACTIVE_NAME]);
	}

	#[test]
	fn parses_collision_suffix_from_disk() {
		let tmp = tempfile::TempDir::new().unwrap();
		std::fs::write(tmp.path().join("data_5.log"), b"").unwrap();
		std::fs::write(tmp.path().join("data_5_1.log"), b"").unwrap();
		let segs = list_segments(tmp.path()).unwrap();
		let names: Vec<_> = segs.iter().map(|s| s.file_name.as_str()).collect();
		assert_eq!(names, vec!["data_5.log", "data_5_1.log"]);
	}
}
