//! The write-observation hook: the store's sole integration point for
//! out-of-scope collaborators (replication, change-data-capture, audit
//! logging) that want to know what was just written, without the store
//! knowing anything about them.

use std::error::Error as StdError;

/// Boxed so observers can return whatever error type is convenient;
/// the store only ever logs it.
pub type HookError = Box<dyn StdError + Send + Sync>;

/// Invoked synchronously, under the write mutex, once the corresponding
/// append has already been made durable (and visible to readers) in the
/// keydir. A failing callback only logs a warning; it never fails the
/// write that triggered it.
///
/// Implementations must not call back into the store: doing so would
/// deadlock on the write mutex they're already running under.
pub trait WriteObserver: Send + Sync {
	fn on_put(&self, _key: &[u8], _value: &[u8]) -> Result<(), HookError> {
		Ok(())
	}

	fn on_delete(&self, _key: &[u8]) -> Result<(), HookError> {
		Ok(())
	}

	/// Invoked once per `batchPut`, after every entry in it has landed in
	/// the keydir, with the whole batch — not once per entry. An observer
	/// that only cares about individual writes can iterate `entries`
	/// itself; the default does exactly that, forwarding each pair to
	/// `on_put`.
	fn on_batch_put(&self, entries: &[(Vec<u8>, Vec<u8>)]) -> Result<(), HookError> {
		for (key, value) in entries {
			self.on_put(key, value)?;
		}
		Ok(())
	}
}
