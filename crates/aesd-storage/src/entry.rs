//! A single completed command

use bytes::Bytes;

use crate::error::StorageError;

/// One delimiter-terminated command, owned by exactly one ring slot.
///
/// The size is the length of the owned buffer, so an occupied slot can never
/// carry a stale size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    data: Box<[u8]>,
}

impl Entry {
    /// Wrap an already-owned buffer
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data: data.into_boxed_slice(),
        }
    }

    /// Copy `bytes` into a freshly allocated entry, reporting allocation failure
    pub fn try_copy_from(bytes: &[u8]) -> Result<Self, StorageError> {
        let mut data = Vec::new();
        data.try_reserve_exact(bytes.len())?;
        data.extend_from_slice(bytes);
        Ok(Self::new(data))
    }

    /// Size of the command in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Whether the command is zero-length
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Borrow the command bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Copy out up to `max` bytes starting at `offset`.
    ///
    /// Returns an empty buffer when `offset` is at or past the end.
    pub fn copy_range(&self, offset: usize, max: usize) -> Bytes {
        if offset >= self.data.len() {
            return Bytes::new();
        }
        let end = offset + max.min(self.data.len() - offset);
        Bytes::copy_from_slice(&self.data[offset..end])
    }
}

impl From<Vec<u8>> for Entry {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}
