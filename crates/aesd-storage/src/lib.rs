//! # AESD Storage
//!
//! Bounded command-history storage behind a byte-stream interface.
//!
//! Writers append bytes; every delimiter-terminated run of bytes becomes one
//! command. Only the most recent commands are retained (ten by default).
//! Readers address the concatenation of the retained commands by a linear
//! offset, and a seek turns a (command index, offset inside the command)
//! pair into such a linear offset.
//!
//! ## Features
//!
//! - **RingStore**: fixed-capacity ring of owned command buffers with eviction
//! - **WriteAccumulator**: splits an arbitrary write stream into commands
//! - **seek**: offset arithmetic shared by every backend
//! - **CommandStore trait**: swappable backend with in-memory and file-backed
//!   implementations
//! - **AccessGateway**: the shared handle that serializes all access under a
//!   single cancellable lock
//!
//! ## Example
//!
//! ```rust,ignore
//! use aesd_storage::{AccessGateway, InMemoryCommandStore};
//!
//! #[tokio::main]
//! async fn main() {
//!     let gateway = AccessGateway::new(InMemoryCommandStore::new());
//!
//!     gateway.write(b"abc\nde\n").await.unwrap();
//!
//!     let history = gateway.read_to_end(0).await.unwrap();
//!     assert_eq!(&history[..], b"abc\nde\n");
//!
//!     let offset = gateway.seek(1, 1).await.unwrap();
//!     let chunk = gateway.read(offset, 64).await.unwrap();
//!     assert_eq!(&chunk.data[..], b"e\n");
//! }
//! ```

pub mod accumulator;
pub mod config;
pub mod entry;
pub mod error;
pub mod gateway;
pub mod memory;
pub mod persistent;
pub mod ring;
pub mod seek;

// Re-exports
pub use accumulator::{DEFAULT_DELIMITER, WriteAccumulator};
pub use config::{BackendKind, DEFAULT_DATA_FILE, StoreConfig};
pub use entry::Entry;
pub use error::StorageError;
pub use gateway::AccessGateway;
pub use memory::InMemoryCommandStore;
pub use persistent::FileCommandStore;
pub use ring::{DEFAULT_CAPACITY, RingStore};
pub use seek::{Position, locate, resolve_seek};

use async_trait::async_trait;
use bytes::Bytes;

/// Result of a single read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadChunk {
    /// Bytes copied out of one command
    pub data: Bytes,
    /// The offset was at or past the end of the retained history
    pub end_of_stream: bool,
}

impl ReadChunk {
    /// The end-of-stream signal
    pub fn end_of_stream() -> Self {
        Self {
            data: Bytes::new(),
            end_of_stream: true,
        }
    }

    /// A chunk carrying data
    pub fn data(data: Bytes) -> Self {
        Self {
            data,
            end_of_stream: false,
        }
    }

    /// Number of bytes returned; advance the read offset by this much
    pub fn bytes_returned(&self) -> usize {
        self.data.len()
    }
}

/// Point-in-time summary of a store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreStats {
    /// Retained commands
    pub commands: usize,
    /// Bytes across retained commands
    pub bytes: u64,
    /// Bytes of the open, undelimited command
    pub pending: usize,
}

/// Backend holding the command history
///
/// Implementations are not synchronized themselves; [`AccessGateway`] wraps
/// one in a single lock. Every method must either fully apply or leave the
/// store unchanged.
#[async_trait]
pub trait CommandStore: Send + Sync {
    /// Append written bytes, completing a command at every delimiter
    ///
    /// Returns the number of bytes consumed, which is always `bytes.len()`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::AllocationFailure`] if buffers cannot be
    /// allocated, or [`StorageError::Io`] for file-backed stores.
    async fn append(&mut self, bytes: &[u8]) -> Result<usize, StorageError>;

    /// Copy out up to `max_bytes` starting at `linear_offset`
    ///
    /// A read never spans two commands. An offset at or past the end of the
    /// retained history yields [`ReadChunk::end_of_stream`].
    async fn read_at(&mut self, linear_offset: u64, max_bytes: usize)
    -> Result<ReadChunk, StorageError>;

    /// Linear offset of `intra_offset` bytes into the `command_index`-th
    /// oldest retained command
    fn seek(&self, command_index: u32, intra_offset: u32) -> Result<u64, StorageError>;

    /// Current counts
    fn stats(&self) -> StoreStats;

    /// Release every retained command and the pending bytes
    ///
    /// Returns how many commands were released.
    async fn clear(&mut self) -> Result<usize, StorageError>;

    /// Release everything at shutdown
    async fn teardown(&mut self) -> Result<(), StorageError> {
        self.clear().await.map(|_| ())
    }
}

/// Build the backend described by `config`
pub async fn open_store(config: &StoreConfig) -> Result<Box<dyn CommandStore>, StorageError> {
    config.validate()?;
    match &config.backend {
        BackendKind::Memory => Ok(Box::new(InMemoryCommandStore::with_config(config))),
        BackendKind::File { .. } => Ok(Box::new(FileCommandStore::open(config).await?)),
    }
}
