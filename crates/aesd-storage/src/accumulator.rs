//! Turns an arbitrary byte stream into discrete commands
//!
//! Bytes are collected in a pending buffer until a delimiter arrives. An
//! `append` call either completes in full or leaves the accumulator exactly
//! as it was: every allocation happens before the pending buffer is touched.

use tracing::trace;

use crate::entry::Entry;
use crate::error::StorageError;

/// Byte that terminates a command by default
pub const DEFAULT_DELIMITER: u8 = b'\n';

/// Pending (not yet delimited) bytes of the command being written
#[derive(Debug, Clone)]
pub struct WriteAccumulator {
    pending: Vec<u8>,
    delimiter: u8,
    max_command_size: Option<usize>,
}

impl Default for WriteAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl WriteAccumulator {
    /// Create an accumulator splitting on newlines
    pub fn new() -> Self {
        Self::with_delimiter(DEFAULT_DELIMITER)
    }

    /// Create an accumulator splitting on `delimiter`
    pub fn with_delimiter(delimiter: u8) -> Self {
        Self {
            pending: Vec::new(),
            delimiter,
            max_command_size: None,
        }
    }

    /// Refuse commands longer than `limit` bytes, delimiter included
    pub fn with_max_command_size(mut self, limit: Option<usize>) -> Self {
        self.max_command_size = limit;
        self
    }

    /// The delimiter byte
    pub fn delimiter(&self) -> u8 {
        self.delimiter
    }

    /// Bytes of the currently open command
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    /// Length of the currently open command
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Consume `bytes`, returning every command they complete, in order.
    ///
    /// Each returned entry ends with the delimiter. Bytes after the last
    /// delimiter stay pending. All `bytes` are consumed on success.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::AllocationFailure`] if a buffer cannot be
    /// allocated or a command would exceed the size limit; the pending
    /// buffer is left unchanged in that case.
    pub fn append(&mut self, bytes: &[u8]) -> Result<Vec<Entry>, StorageError> {
        let mut completed: Vec<Entry> = Vec::new();
        let mut start = 0;

        while let Some(pos) = bytes[start..].iter().position(|&b| b == self.delimiter) {
            let chunk = &bytes[start..=start + pos];
            let entry = if completed.is_empty() && !self.pending.is_empty() {
                self.check_size(self.pending.len() + chunk.len())?;
                let mut data = Vec::new();
                data.try_reserve_exact(self.pending.len() + chunk.len())?;
                data.extend_from_slice(&self.pending);
                data.extend_from_slice(chunk);
                Entry::new(data)
            } else {
                self.check_size(chunk.len())?;
                Entry::try_copy_from(chunk)?
            };
            completed.try_reserve(1)?;
            completed.push(entry);
            start += pos + 1;
        }

        let tail = &bytes[start..];
        if completed.is_empty() {
            self.check_size(self.pending.len() + tail.len())?;
            self.pending.try_reserve(tail.len())?;
            self.pending.extend_from_slice(tail);
        } else {
            self.check_size(tail.len())?;
            let mut next = Vec::new();
            next.try_reserve(tail.len())?;
            next.extend_from_slice(tail);
            self.pending = next;
        }

        trace!(
            consumed = bytes.len(),
            completed = completed.len(),
            pending = self.pending.len(),
            "Accumulated write"
        );

        Ok(completed)
    }

    fn check_size(&self, size: usize) -> Result<(), StorageError> {
        match self.max_command_size {
            Some(limit) if size > limit => Err(StorageError::AllocationFailure(format!(
                "command of {size} bytes exceeds the {limit} byte limit"
            ))),
            _ => Ok(()),
        }
    }

    /// Drop any pending bytes, returning how many were discarded
    pub fn clear(&mut self) -> usize {
        let discarded = self.pending.len();
        self.pending = Vec::new();
        discarded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(entries: &[Entry]) -> Vec<&[u8]> {
        entries.iter().map(Entry::as_bytes).collect()
    }

    #[test]
    fn test_single_command() {
        let mut acc = WriteAccumulator::new();
        let done = acc.append(b"abc\n").unwrap();
        assert_eq!(texts(&done), vec![&b"abc\n"[..]]);
        assert_eq!(acc.pending_len(), 0);
    }

    #[test]
    fn test_partial_then_complete() {
        let mut acc = WriteAccumulator::new();
        assert!(acc.append(b"hel").unwrap().is_empty());
        assert!(acc.append(b"lo wo").unwrap().is_empty());
        assert_eq!(acc.pending(), b"hello wo");

        let done = acc.append(b"rld\nnext").unwrap();
        assert_eq!(texts(&done), vec![&b"hello world\n"[..]]);
        assert_eq!(acc.pending(), b"next");
    }

    #[test]
    fn test_multiple_delimiters_in_one_write() {
        let mut acc = WriteAccumulator::new();
        let done = acc.append(b"a\nbb\nccc\ntail").unwrap();
        assert_eq!(texts(&done), vec![&b"a\n"[..], &b"bb\n"[..], &b"ccc\n"[..]]);
        assert_eq!(acc.pending(), b"tail");
    }

    #[test]
    fn test_pending_joins_only_first_command() {
        let mut acc = WriteAccumulator::new();
        acc.append(b"x").unwrap();
        let done = acc.append(b"1\n2\n").unwrap();
        assert_eq!(texts(&done), vec![&b"x1\n"[..], &b"2\n"[..]]);
        assert_eq!(acc.pending_len(), 0);
    }

    #[test]
    fn test_bare_delimiter_is_a_command() {
        let mut acc = WriteAccumulator::new();
        let done = acc.append(b"\n\n").unwrap();
        assert_eq!(texts(&done), vec![&b"\n"[..], &b"\n"[..]]);
    }

    #[test]
    fn test_empty_write() {
        let mut acc = WriteAccumulator::new();
        assert!(acc.append(b"").unwrap().is_empty());
        assert_eq!(acc.pending_len(), 0);
    }

    #[test]
    fn test_custom_delimiter() {
        let mut acc = WriteAccumulator::with_delimiter(b';');
        let done = acc.append(b"a;b\nc;").unwrap();
        assert_eq!(texts(&done), vec![&b"a;"[..], &b"b\nc;"[..]]);
        assert_eq!(acc.delimiter(), b';');
    }

    #[test]
    fn test_clear_discards_pending() {
        let mut acc = WriteAccumulator::new();
        acc.append(b"unterminated").unwrap();
        assert_eq!(acc.clear(), 12);
        assert_eq!(acc.pending_len(), 0);
    }

    #[test]
    fn test_oversized_command_leaves_pending_untouched() {
        let mut acc = WriteAccumulator::new().with_max_command_size(Some(8));
        acc.append(b"abcd").unwrap();

        // Completing the open command would make it 10 bytes
        let err = acc.append(b"efghi
ok
").unwrap_err();
        assert!(matches!(err, StorageError::AllocationFailure(_)));
        assert_eq!(acc.pending(), b"abcd");

        // A later command in the same write is too long: nothing applies
        assert!(acc.append(b"e
0123456789
").is_err());
        assert_eq!(acc.pending(), b"abcd");

        // Growing the open command past the limit is refused as well
        assert!(acc.append(b"efghi").is_err());
        assert_eq!(acc.pending(), b"abcd");

        let done = acc.append(b"e
rest").unwrap();
        assert_eq!(texts(&done), vec![&b"abcde\n"[..]]);
        assert_eq!(acc.pending(), b"rest");
    }
}
