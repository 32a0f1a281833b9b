//! Offset arithmetic over the retained command history
//!
//! Both functions work on the sizes of the retained commands, oldest first,
//! and are re-run against the current contents on every call. Nothing here
//! caches positions, so coordinates computed before an eviction are simply
//! recomputed against whatever is retained now.

use crate::error::StorageError;

/// A linear offset resolved to a command and an offset inside it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    /// Logical index of the command (0 = oldest retained)
    pub index: usize,
    /// Offset inside that command
    pub intra_offset: usize,
}

/// Map a linear offset onto the command that contains it.
///
/// Returns `None` when `linear_offset` is at or beyond the total retained
/// byte count, which callers treat as end-of-stream. Zero-length commands
/// never contain an offset and are skipped.
pub fn locate<I>(sizes: I, linear_offset: u64) -> Option<Position>
where
    I: IntoIterator<Item = usize>,
{
    let mut before: u64 = 0;
    for (index, size) in sizes.into_iter().enumerate() {
        let after = before + size as u64;
        if linear_offset < after {
            return Some(Position {
                index,
                intra_offset: (linear_offset - before) as usize,
            });
        }
        before = after;
    }
    None
}

/// Compute the linear offset of `intra_offset` bytes into the
/// `command_index`-th oldest retained command.
///
/// An offset equal to the command's size is accepted and points at its end.
///
/// # Errors
///
/// Returns [`StorageError::OutOfRange`] when the command is not retained or
/// the offset lies past its end.
pub fn resolve_seek<I>(sizes: I, command_index: u32, intra_offset: u32) -> Result<u64, StorageError>
where
    I: IntoIterator<Item = usize>,
{
    let mut before: u64 = 0;
    for (index, size) in sizes.into_iter().enumerate() {
        if index == command_index as usize {
            if intra_offset as usize > size {
                return Err(StorageError::out_of_range(command_index, intra_offset));
            }
            return Ok(before + u64::from(intra_offset));
        }
        before += size as u64;
    }
    Err(StorageError::out_of_range(command_index, intra_offset))
}
