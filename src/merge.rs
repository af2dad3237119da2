//! Compaction: collapse every immutable segment into one, keeping only
//! records the keydir still considers live. Grounded on the teacher's
//! atomic tmp-file-then-rename commit in `create_tx.rs`, adapted from a
//! single persisted transaction file to a merged segment plus its hint.

use crate::error::Result;
use crate::hint::{write_hint, HintEntry};
use crate::keydir::{KeyDir, Locator};
use crate::record::{decode_one, Decoded, Record};
use crate::segment::{list_segments, SegmentId, SegmentKind};
use crate::writer::Writer;
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Summary of a completed merge, mostly useful for logging/tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeStats {
	pub inputs_removed: usize,
	pub records_retained: usize,
}

/// Run one compaction pass. Acquires the write mutex for the entire
/// duration (see `Writer::exclusive`), so no put/delete/batchPut/rotate
/// can interleave with it. Returns `None` if there was nothing to merge.
pub(crate) fn merge(data_dir: &Path, keydir: &KeyDir, writer: &Writer) -> Result<Option<MergeStats>> {
	writer.exclusive(|| run_merge(data_dir, keydir))
}

fn run_merge(data_dir: &Path, keydir: &KeyDir) -> Result<Option<MergeStats>> {
	let inputs: Vec<SegmentId> = list_segments(data_dir)?
		.into_iter()
		.filter(|id| id.kind() != SegmentKind::Active)
		.collect();
	if inputs.is_empty() {
		return Ok(None);
	}

	let mut merged_buf: Vec<u8> = Vec::new();
	let mut hint_entries: Vec<HintEntry> = Vec::new();

	for input in &inputs {
		retain_live_records(data_dir, input, keydir, &mut merged_buf, &mut hint_entries)?;
	}

	if hint_entries.is_empty() {
		// Every input record was stale; nothing survives the merge.
		// Still worth removing the now-redundant inputs.
		delete_inputs(data_dir, &inputs);
		log::debug!("merge discarded all {} input segment(s), nothing retained", inputs.len());
		return Ok(Some(MergeStats { inputs_removed: inputs.len(), records_retained: 0 }));
	}

	let millis = now_millis();
	let merged_id = SegmentId::merged(millis, 0);
	let merged_path = merged_id.path(data_dir);
	let hint_path = merged_id.hint_path(data_dir);

	commit_atomically(data_dir, &merged_path, &merged_buf)?;

	let mut hint_buf = Vec::new();
	write_hint(&mut hint_buf, &hint_entries)?;
	commit_atomically(data_dir, &hint_path, &hint_buf)?;

	for (key, locator) in build_new_locators(&merged_id, &hint_entries) {
		keydir.insert(key, locator);
	}

	let records_retained = hint_entries.len();
	delete_inputs(data_dir, &inputs);

	log::debug!(
		"merged {} input segment(s) into {}, retaining {} record(s)",
		inputs.len(),
		merged_id.file_name,
		records_retained
	);
	Ok(Some(MergeStats { inputs_removed: inputs.len(), records_retained }))
}

/// Walk one input segment's raw records (never its hint — we need the
/// exact on-disk offsets to compare against the keydir) and append every
/// record that is still the live value for its key.
fn retain_live_records(
	data_dir: &Path,
	input: &SegmentId,
	keydir: &KeyDir,
	merged_buf: &mut Vec<u8>,
	hint_entries: &mut Vec<HintEntry>,
) -> Result<()> {
	let path = input.path(data_dir);
	let mut reader = BufReader::new(File::open(&path)?);
	let mut offset = 0u64;

	loop {
		let decoded = decode_one(&mut reader, offset)?;
		let (record, value_offset, wire_len) = match decoded {
			Decoded::Eof => break,
			Decoded::Record { record, value_offset, .. } => {
				let wire_len = wire_len_of(&record, value_offset, offset);
				(record, value_offset, wire_len)
			}
			// Merge inputs are themselves already-recovered segments; a
			// truncated or unknown frame here means something wrote to
			// an immutable file after the fact, which recovery would
			// already have refused to tolerate. Treat it the same way.
			Decoded::TruncatedTail { good_offset } | Decoded::UnknownRecordType { offset: good_offset } => {
				return Err(crate::error::Error::CorruptSegment { path, offset: good_offset });
			}
		};
		offset += wire_len;

		let Record::Put { key, value } = record else {
			// Tombstones are always dropped: once the Puts they mask are
			// gone from the merge, keeping the tombstone around serves
			// no purpose.
			continue;
		};

		let current = keydir.get(&key);
		let still_live = matches!(
			&current,
			Some(Locator { segment, value_offset: vo, value_len })
				if *segment == input.file_name && *vo == value_offset && *value_len == value.len() as u32
		);
		if !still_live {
			continue;
		}

		let new_offset_in_merged =
			Record::Put { key: key.clone(), value: value.clone() }.encode(merged_buf);
		hint_entries.push(HintEntry {
			key,
			value_offset: new_offset_in_merged,
			value_len: value.len() as u32,
		});
	}
	Ok(())
}

fn wire_len_of(record: &Record, value_offset: u64, start: u64) -> u64 {
	match record {
		Record::Put { value, .. } => (value_offset - start) + value.len() as u64,
		Record::Tombstone { key } => 4 + 1 + 4 + key.len() as u64,
	}
}

fn build_new_locators(merged_id: &SegmentId, hint_entries: &[HintEntry]) -> Vec<(Vec<u8>, Locator)> {
	hint_entries
		.iter()
		.map(|e| {
			(
				e.key.clone(),
				Locator {
					segment: merged_id.file_name.clone(),
					value_offset: e.value_offset,
					value_len: e.value_len,
				},
			)
		})
		.collect()
}

fn delete_inputs(data_dir: &Path, inputs: &[SegmentId]) {
	for input in inputs {
		if let Err(e) = std::fs::remove_file(input.path(data_dir)) {
			log::warn!("failed to remove merged-away segment {}: {e}", input.file_name);
		}
		let hint_path = input.hint_path(data_dir);
		if hint_path.is_file() {
			if let Err(e) = std::fs::remove_file(&hint_path) {
				log::warn!("failed to remove hint for merged-away segment {}: {e}", input.file_name);
			}
		}
	}
}

/// Write `bytes` to a temp file in `data_dir`, fsync it, then rename it
/// into place. The rename is atomic on the same filesystem, so a crash
/// either leaves the old state (no file at `final_path`) or the fully
/// written new one — never a half-written `final_path`.
fn commit_atomically(data_dir: &Path, final_path: &Path, bytes: &[u8]) -> Result<()> {
	let mut tmp = tempfile_fast::PersistableTempFile::new_in(data_dir)?;
	tmp.write_all(bytes)?;
	tmp.flush()?;
	tmp.as_file().sync_all()?;
	tmp.persist_by_rename(final_path).map_err(|e| e.error)?;
	Ok(())
}

fn now_millis() -> u128 {
	SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before epoch").as_millis()
}
