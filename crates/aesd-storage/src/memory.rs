//! In-memory command store
//!
//! The default backend: a [`RingStore`] of owned buffers fed by a single
//! [`WriteAccumulator`].

use async_trait::async_trait;
use tracing::{debug, trace};

use crate::accumulator::WriteAccumulator;
use crate::config::StoreConfig;
use crate::error::StorageError;
use crate::ring::RingStore;
use crate::{CommandStore, ReadChunk, StoreStats, seek};

/// In-memory implementation of CommandStore
#[derive(Debug, Default)]
pub struct InMemoryCommandStore {
    /// Retained commands
    ring: RingStore,
    /// Open command shared by every writer
    accumulator: WriteAccumulator,
    /// Commands released by eviction since creation
    evicted: u64,
}

impl InMemoryCommandStore {
    /// Create a store retaining ten newline-terminated commands
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store from configuration (backend kind is ignored)
    pub fn with_config(config: &StoreConfig) -> Self {
        Self {
            ring: RingStore::with_capacity(config.capacity),
            accumulator: WriteAccumulator::with_delimiter(config.delimiter)
                .with_max_command_size(config.max_command_size),
            evicted: 0,
        }
    }

    /// Commands released by eviction since creation
    pub fn evicted(&self) -> u64 {
        self.evicted
    }
}

#[async_trait]
impl CommandStore for InMemoryCommandStore {
    async fn append(&mut self, bytes: &[u8]) -> Result<usize, StorageError> {
        let completed = self.accumulator.append(bytes)?;
        for entry in completed {
            if let Some(oldest) = self.ring.insert(entry) {
                self.evicted += 1;
                debug!(size = oldest.size(), total = self.evicted, "Evicted oldest command");
            }
        }
        Ok(bytes.len())
    }

    async fn read_at(
        &mut self,
        linear_offset: u64,
        max_bytes: usize,
    ) -> Result<ReadChunk, StorageError> {
        match self.ring.resolve(linear_offset) {
            Some((entry, intra_offset)) => {
                trace!(linear_offset, intra_offset, max_bytes, "Reading command");
                Ok(ReadChunk::data(entry.copy_range(intra_offset, max_bytes)))
            }
            None => Ok(ReadChunk::end_of_stream()),
        }
    }

    fn seek(&self, command_index: u32, intra_offset: u32) -> Result<u64, StorageError> {
        seek::resolve_seek(self.ring.sizes(), command_index, intra_offset)
    }

    fn stats(&self) -> StoreStats {
        StoreStats {
            commands: self.ring.len(),
            bytes: self.ring.total_bytes(),
            pending: self.accumulator.pending_len(),
        }
    }

    async fn clear(&mut self) -> Result<usize, StorageError> {
        self.accumulator.clear();
        Ok(self.ring.clear())
    }
}
