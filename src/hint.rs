//! The `.hint` sidecar format: a fast-recovery index for one immutable
//! segment, so replay doesn't have to re-walk every record to rebuild
//! the keydir.
//!
//! ```text
//! entry := [u32 keyLen][key bytes][u64 valueOffset][u32 valueLength]
//! ```
//!
//! No framing prefix; the file is simply a sequence of entries until
//! EOF. Hints are produced exclusively by this crate's own merge step,
//! so recovery trusts their contents rather than re-validating each
//! record against the segment.

use crate::keydir::Locator;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

pub(crate) struct HintEntry {
	pub(crate) key: Vec<u8>,
	pub(crate) value_offset: u64,
	pub(crate) value_len: u32,
}

pub(crate) fn write_hint<W: Write>(out: &mut W, entries: &[HintEntry]) -> io::Result<()> {
	for entry in entries {
		out.write_u32::<BigEndian>(entry.key.len() as u32)?;
		out.write_all(&entry.key)?;
		out.write_u64::<BigEndian>(entry.value_offset)?;
		out.write_u32::<BigEndian>(entry.value_len)?;
	}
	Ok(())
}

/// Parse every entry in a hint file, bulk-producing `(key, Locator)`
/// pairs against `segment_name` (the segment the hint describes).
pub(crate) fn read_hint<R: Read>(
	reader: &mut R,
	segment_name: &str,
) -> io::Result<Vec<(Vec<u8>, Locator)>> {
	let mut out = vec![];
	loop {
		let mut key_len_buf = [0u8; 4];
		if !read_fully_or_eof(reader, &mut key_len_buf)? {
			break;
		}
		let key_len = BigEndian::read_u32(&key_len_buf) as usize;

		let mut key = vec![0u8; key_len];
		reader.read_exact(&mut key)?;
		let value_offset = reader.read_u64::<BigEndian>()?;
		let value_len = reader.read_u32::<BigEndian>()?;

		out.push((
			key,
			Locator { segment: segment_name.to_string(), value_offset, value_len },
		));
	}
	Ok(out)
}

/// Reads into `buf`, returning `Ok(true)` if it was filled and
/// `Ok(false)` on a clean EOF before any byte was read.
fn read_fully_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<bool> {
	let mut filled = 0;
	while filled < buf.len() {
		match reader.read(&mut buf[filled..]) {
			Ok(0) if filled == 0 => return Ok(false),
			Ok(0) => {
				return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated hint entry"))
			}
			Ok(n) => filled += n,
			Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
			Err(e) => return Err(e),
		}
	}
	Ok(true)
}
