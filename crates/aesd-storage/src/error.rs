//! Error types for aesd-storage
//!
//! This module defines the error types used throughout the storage crate.
//! Reaching the end of the retained history is not an error; reads signal it
//! through [`ReadChunk::end_of_stream`](crate::ReadChunk).

use std::collections::TryReserveError;

use thiserror::Error;

/// Errors that can occur in storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// Not enough memory to grow the pending buffer or build a new entry
    #[error("Allocation failure: {0}")]
    AllocationFailure(String),

    /// Seek coordinates do not address a retained command
    #[error("Seek out of range: command {command_index}, offset {intra_offset}")]
    OutOfRange {
        /// Requested command index (0 = oldest retained)
        command_index: u32,
        /// Requested offset inside that command
        intra_offset: u32,
    },

    /// The wait for exclusive access was abandoned; retry the operation
    #[error("Lock wait interrupted")]
    LockInterrupted,

    /// I/O error from a file-backed store
    #[error("I/O error: {0}")]
    Io(String),

    /// Store configuration is invalid
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

impl From<TryReserveError> for StorageError {
    fn from(err: TryReserveError) -> Self {
        StorageError::AllocationFailure(err.to_string())
    }
}

impl StorageError {
    /// Create a new OutOfRange error
    pub fn out_of_range(command_index: u32, intra_offset: u32) -> Self {
        Self::OutOfRange {
            command_index,
            intra_offset,
        }
    }

    /// Create a new InvalidConfig error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}
