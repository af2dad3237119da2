//! The on-disk record frame and its decoder.
//!
//! ```text
//! Put:        [u32 recordLength][u8 type=1][u32 keyLen][key][u32 valueLen][value]
//! Tombstone:  [u32 recordLength][u8 type=2][u32 keyLen][key]
//! ```
//!
//! `recordLength` counts every byte after itself, so a frame on disk is
//! always `4 + recordLength` bytes long.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

pub(crate) const TYPE_PUT: u8 = 1;
pub(crate) const TYPE_TOMBSTONE: u8 = 2;

/// A decoded record, with the key/value bytes owned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
	Put { key: Vec<u8>, value: Vec<u8> },
	Tombstone { key: Vec<u8> },
}

impl Record {
	pub fn key(&self) -> &[u8] {
		match self {
			Record::Put { key, .. } => key,
			Record::Tombstone { key } => key,
		}
	}

	/// Encode this record as a full frame (including the length prefix)
	/// and append it to `out`. Returns the absolute offset of the value
	/// payload within `out`, for `Put` records (0 for tombstones).
	pub(crate) fn encode(&self, out: &mut Vec<u8>) -> u64 {
		let frame_start = out.len();
		match self {
			Record::Put { key, value } => {
				let record_len = 1 + 4 + key.len() + 4 + value.len();
				out.write_u32::<BigEndian>(record_len as u32).unwrap();
				out.write_u8(TYPE_PUT).unwrap();
				out.write_u32::<BigEndian>(key.len() as u32).unwrap();
				out.write_all(key).unwrap();
				out.write_u32::<BigEndian>(value.len() as u32).unwrap();
				let value_offset = out.len() as u64;
				out.write_all(value).unwrap();
				debug_assert_eq!(out.len(), frame_start + 4 + record_len);
				value_offset
			}
			Record::Tombstone { key } => {
				let record_len = 1 + 4 + key.len();
				out.write_u32::<BigEndian>(record_len as u32).unwrap();
				out.write_u8(TYPE_TOMBSTONE).unwrap();
				out.write_u32::<BigEndian>(key.len() as u32).unwrap();
				out.write_all(key).unwrap();
				debug_assert_eq!(out.len(), frame_start + 4 + record_len);
				0
			}
		}
	}
}

/// The outcome of trying to decode one frame from a byte stream.
pub(crate) enum Decoded {
	/// A full record, its start offset, and (for Put) the absolute offset
	/// of its value payload.
	Record { start: u64, record: Record, value_offset: u64 },
	/// Clean end of file: no more frames.
	Eof,
	/// A length header was read but the body was short. `good_offset` is
	/// where the stream should be truncated/resumed from.
	TruncatedTail { good_offset: u64 },
	/// The type tag was not 1 or 2.
	UnknownRecordType { offset: u64 },
}

impl std::fmt::Debug for Decoded {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Decoded::Record { start, record, value_offset } => f
				.debug_struct("Record")
				.field("start", start)
				.field("record", record)
				.field("value_offset", value_offset)
				.finish(),
			Decoded::Eof => write!(f, "Eof"),
			Decoded::TruncatedTail { good_offset } => {
				write!(f, "TruncatedTail{{good_offset: {good_offset}}}")
			}
			Decoded::UnknownRecordType { offset } => write!(f, "UnknownRecordType{{offset: {offset}}}"),
		}
	}
}

/// Decode one frame starting at the reader's current position.
///
/// `base_offset` is the absolute offset `reader` is currently positioned
/// at, and is added to every offset reported in the result.
pub(crate) fn decode_one<R: Read>(reader: &mut R, base_offset: u64) -> io::Result<Decoded> {
	let mut len_buf = [0u8; 4];
	match read_exact_or_eof(reader, &mut len_buf)? {
		ReadOutcome::Eof => return Ok(Decoded::Eof),
		ReadOutcome::Partial => return Ok(Decoded::TruncatedTail { good_offset: base_offset }),
		ReadOutcome::Full => {}
	}
	let record_len = BigEndian::read_u32(&len_buf) as usize;

	let mut body = vec![0u8; record_len];
	match read_exact_or_eof(reader, &mut body)? {
		ReadOutcome::Full => {}
		_ => return Ok(Decoded::TruncatedTail { good_offset: base_offset }),
	}

	if body.is_empty() {
		return Ok(Decoded::TruncatedTail { good_offset: base_offset });
	}
	let record_type = body[0];
	let rest = &body[1..];

	match record_type {
		TYPE_PUT => {
			if rest.len() < 4 {
				return Ok(Decoded::TruncatedTail { good_offset: base_offset });
			}
			let key_len = BigEndian::read_u32(&rest[0..4]) as usize;
			if rest.len() < 4 + key_len + 4 {
				return Ok(Decoded::TruncatedTail { good_offset: base_offset });
			}
			let key = rest[4..4 + key_len].to_vec();
			let value_len_at = 4 + key_len;
			let value_len = BigEndian::read_u32(&rest[value_len_at..value_len_at + 4]) as usize;
			let value_at = value_len_at + 4;
			if rest.len() != value_at + value_len {
				return Ok(Decoded::TruncatedTail { good_offset: base_offset });
			}
			let value = rest[value_at..value_at + value_len].to_vec();

			// header(4) + type(1) + keylen(4) + key + valuelen(4)
			let value_offset = base_offset + 4 + 1 + 4 + key_len as u64 + 4;
			Ok(Decoded::Record {
				start: base_offset,
				record: Record::Put { key, value },
				value_offset,
			})
		}
		TYPE_TOMBSTONE => {
			if rest.len() < 4 {
				return Ok(Decoded::TruncatedTail { good_offset: base_offset });
			}
			let key_len = BigEndian::read_u32(&rest[0..4]) as usize;
			if rest.len() != 4 + key_len {
				return Ok(Decoded::TruncatedTail { good_offset: base_offset });
			}
			let key = rest[4..4 + key_len].to_vec();
			Ok(Decoded::Record {
				start: base_offset,
				record: Record::Tombstone { key },
				value_offset: 0,
			})
		}
		_ => Ok(Decoded::UnknownRecordType { offset: base_offset }),
	}
}

enum ReadOutcome {
	Full,
	Partial,
	Eof,
}

/// Like `read_exact`, but distinguishes "nothing was read" (clean EOF)
/// from "some but not all bytes were read" (a truncated tail).
fn read_exact_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<ReadOutcome> {
	let mut filled = 0;
	while filled < buf.len() {
		match reader.read(&mut buf[filled..]) {
			Ok(0) => break,
			Ok(n) => filled += n,
			Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
			Err(e) => return Err(e),
		}
	}
	if filled == 0 {
		Ok(ReadOutcome::Eof)
	} else if filled == buf.len() {
		Ok(ReadOutcome::Full)
	} else {
		Ok(ReadOutcome::Partial)
	}
}
