//! Append path: `put`, `delete`, `batchPut`, and the rotation they can
//! trigger. Every mutation runs under one held mutex, mirroring the
//! teacher's `Arc<Mutex<WriterState<W>>>` pattern, simplified here to a
//! single writer instead of a worker-thread pool since there is no
//! compression stage to pipeline.

use crate::error::{Error, Result};
use crate::hook::{HookError, WriteObserver};
use crate::keydir::{KeyDir, Locator};
use crate::record::Record;
use crate::segment::SegmentId;
use antidote::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

struct WriterState {
	active_file: File,
	/// Append offset within `active.log`; always equal to the file's
	/// current length.
	offset: u64,
	last_rotation_millis: Option<u128>,
	rotation_collisions: u32,
}

pub(crate) struct Writer {
	data_dir: PathBuf,
	max_file_size: u64,
	sync_on_write: bool,
	state: Mutex<WriterState>,
	keydir: Arc<KeyDir>,
	observer: Option<Arc<dyn WriteObserver>>,
}

impl Writer {
	/// `active_file` must already be positioned for appending (i.e. its
	/// length equals `offset`), as produced by recovery.
	pub(crate) fn new(
		data_dir: PathBuf,
		active_file: File,
		offset: u64,
		max_file_size: u64,
		sync_on_write: bool,
		keydir: Arc<KeyDir>,
		observer: Option<Arc<dyn WriteObserver>>,
	) -> Writer {
		Writer {
			data_dir,
			max_file_size,
			sync_on_write,
			state: Mutex::new(WriterState {
				active_file,
				offset,
				last_rotation_millis: None,
				rotation_collisions: 0,
			}),
			keydir,
			observer,
		}
	}

	pub(crate) fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
		let mut state = self.state.lock();
		let locator = self.append_one(
			&mut state,
			Record::Put { key: key.to_vec(), value: value.to_vec() },
		)?;
		if self.sync_on_write {
			state.active_file.sync_data()?;
		}
		drop(state);

		self.keydir.insert(key.to_vec(), locator.expect("Put always yields a locator"));
		if let Some(observer) = &self.observer {
			log_hook_failure(observer.on_put(key, value), "onPut");
		}
		Ok(())
	}

	pub(crate) fn delete(&self, key: &[u8]) -> Result<()> {
		// Deleting an absent key is a no-op: no tombstone is appended,
		// since it can never mask anything and would only be garbage.
		if self.keydir.get(key).is_none() {
			return Ok(());
		}

		let mut state = self.state.lock();
		self.append_one(&mut state, Record::Tombstone { key: key.to_vec() })?;
		if self.sync_on_write {
			state.active_file.sync_data()?;
		}
		drop(state);

		self.keydir.remove(key);
		if let Some(observer) = &self.observer {
			log_hook_failure(observer.on_delete(key), "onDelete");
		}
		Ok(())
	}

	/// Appends every entry under one held mutex; rotation may happen
	/// mid-batch (each entry checks the threshold on its own), and the
	/// keydir is updated incrementally as each entry lands. A single
	/// fsync happens at the end when `syncOnWrite` is set, rather than
	/// once per entry: the batch is not a transaction, just one lock
	/// acquisition amortized over many appends. The write observer, if
	/// any, sees the whole batch in one `onBatchPut` call after every
	/// entry has landed, not one call per entry.
	pub(crate) fn batch_put(&self, entries: &[(Vec<u8>, Vec<u8>)]) -> Result<()> {
		let mut state = self.state.lock();
		for (key, value) in entries {
			let locator =
				self.append_one(&mut state, Record::Put { key: key.clone(), value: value.clone() })?;
			self.keydir.insert(key.clone(), locator.expect("Put always yields a locator"));
		}
		if self.sync_on_write {
			state.active_file.sync_data()?;
		}
		drop(state);

		if let Some(observer) = &self.observer {
			log_hook_failure(observer.on_batch_put(entries), "onBatchPut");
		}
		Ok(())
	}

	/// Encode `record`, rotating first if it would overflow
	/// `max_file_size`, then append it to the active file and advance
	/// `state.offset`. Returns the new locator for `Put` records (`None`
	/// for tombstones, which have nothing to point at).
	fn append_one(&self, state: &mut WriterState, record: Record) -> Result<Option<Locator>> {
		let mut buf = Vec::new();
		let value_offset_in_buf = record.encode(&mut buf);

		let would_be_len = state.offset + buf.len() as u64;
		if would_be_len > self.max_file_size && state.offset > 0 {
			self.rotate(state)?;
		}

		let record_start = state.offset;
		state.active_file.write_all(&buf)?;
		state.offset += buf.len() as u64;

		Ok(match &record {
			Record::Put { value, .. } => Some(Locator {
				segment: crate::segment::ACTIVE_NAME.to_string(),
				value_offset: record_start + value_offset_in_buf,
				value_len: value.len() as u32,
			}),
			Record::Tombstone { .. } => None,
		})
	}

	/// Hold the write mutex for the duration of `f`, giving callers (the
	/// compactor) the same exclusion guarantee `put`/`delete`/`batchPut`
	/// get against each other and against rotation. The merge algorithm
	/// itself never touches `WriterState`, so this only needs to block
	/// other writers, not hand out any of its fields.
	pub(crate) fn exclusive<R>(&self, f: impl FnOnce() -> Result<R>) -> Result<R> {
		let _guard = self.state.lock();
		f()
	}

	/// Rename `active.log` to a timestamped rotated segment, retarget
	/// every keydir locator still pointing at the old name, and open a
	/// fresh `active.log`. Requires the write mutex (the caller already
	/// holds `state`).
	fn rotate(&self, state: &mut WriterState) -> Result<()> {
		state.active_file.flush().ok();

		let millis = now_millis();
		let collision_counter = if state.last_rotation_millis == Some(millis) {
			state.rotation_collisions += 1;
			state.rotation_collisions
		} else {
			state.last_rotation_millis = Some(millis);
			state.rotation_collisions = 0;
			0
		};
		let rotated_id = SegmentId::rotated(millis, collision_counter);

		let active_path = self.data_dir.join(crate::segment::ACTIVE_NAME);
		let rotated_path = rotated_id.path(&self.data_dir);

		if let Err(source) = std::fs::rename(&active_path, &rotated_path) {
			// The file we still have open is untouched; keep using it.
			return Err(Error::RotationFailed { path: rotated_path, reopened: true, source });
		}

		// The rename succeeded, so the bytes that used to be "active.log"
		// now live under `rotated_id`'s name on disk. Retarget every
		// keydir locator that still says "active.log" *before* trying
		// anything else: if opening a fresh active.log below fails, the
		// keydir must never be left pointing at a name nothing on disk
		// answers to.
		let retargeted = self.keydir.keys_in_segment(crate::segment::ACTIVE_NAME);
		for key in &retargeted {
			if let Some(mut locator) = self.keydir.get(key) {
				locator.segment = rotated_id.file_name.clone();
				self.keydir.insert(key.clone(), locator);
			}
		}

		match OpenOptions::new().create(true).write(true).truncate(true).open(&active_path) {
			Ok(new_active) => {
				state.active_file = new_active;
				state.offset = 0;
				log::debug!("rotated active.log to {}", rotated_id.file_name);
				Ok(())
			}
			Err(source) => {
				// Try to undo the rename so the store keeps a writable
				// active.log. The file descriptor we already hold in
				// `state.active_file` stays valid either way — renaming
				// a file never invalidates an open handle to it — so a
				// failure here only affects the name on disk, not
				// whether the store can keep accepting writes.
				match std::fs::rename(&rotated_path, &active_path) {
					Ok(()) => {
						for key in &retargeted {
							if let Some(mut locator) = self.keydir.get(key) {
								locator.segment = crate::segment::ACTIVE_NAME.to_string();
								self.keydir.insert(key.clone(), locator);
							}
						}
						log::warn!(
							"failed to open a fresh active.log after rotation, reverted the rename: {source}"
						);
						Err(Error::RotationFailed { path: active_path, reopened: true, source })
					}
					Err(revert_err) => {
						log::warn!(
							"failed to open a fresh active.log after rotation, and could not revert the rename ({revert_err}): {source}"
						);
						Err(Error::RotationFailed { path: active_path, reopened: false, source })
					}
				}
			}
		}
	}
}

fn now_millis() -> u128 {
	SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before epoch").as_millis()
}

fn log_hook_failure(result: std::result::Result<(), HookError>, which: &str) {
	if let Err(e) = result {
		log::warn!("write observer {which} failed: {e}");
	}
}
