//! Synchronized access to a command store
//!
//! [`AccessGateway`] is the shared handle every session holds. One
//! exclusive lock covers every operation, so an eviction can never release
//! a command while another caller is copying out of it, and concurrent
//! writes cannot interleave inside the open command.
//!
//! Waiting for the lock is cancellable: once [`AccessGateway::interrupt`]
//! (or teardown) is called, blocked and future callers get
//! [`StorageError::LockInterrupted`] instead of hanging. A caller that
//! already holds the lock always finishes its operation.

use bytes::{Bytes, BytesMut};
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace};

use crate::config::StoreConfig;
use crate::error::StorageError;
use crate::{CommandStore, ReadChunk, StoreStats, open_store};

/// Bytes requested per read when streaming the whole history
pub const READ_CHUNK_SIZE: usize = 1024;

/// Shared, lock-protected handle on a command store
pub struct AccessGateway {
    /// The store; every public operation runs under this lock
    store: Mutex<Box<dyn CommandStore>>,
    /// Cancels lock waits at shutdown
    shutdown: CancellationToken,
}

impl std::fmt::Debug for AccessGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessGateway")
            .field("interrupted", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl AccessGateway {
    /// Wrap a store
    pub fn new(store: impl CommandStore + 'static) -> Self {
        Self::from_boxed(Box::new(store))
    }

    /// Wrap an already boxed store
    pub fn from_boxed(store: Box<dyn CommandStore>) -> Self {
        Self {
            store: Mutex::new(store),
            shutdown: CancellationToken::new(),
        }
    }

    /// Open the backend described by `config` and wrap it
    pub async fn from_config(config: &StoreConfig) -> Result<Self, StorageError> {
        let store = open_store(config).await?;
        Ok(Self::from_boxed(store))
    }

    async fn lock(&self) -> Result<MutexGuard<'_, Box<dyn CommandStore>>, StorageError> {
        if self.shutdown.is_cancelled() {
            return Err(StorageError::LockInterrupted);
        }
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => {
                debug!("Abandoned wait for store lock");
                Err(StorageError::LockInterrupted)
            }
            guard = self.store.lock() => Ok(guard),
        }
    }

    /// Append written bytes; returns the number consumed
    #[instrument(skip(self, bytes), fields(len = bytes.len()))]
    pub async fn write(&self, bytes: &[u8]) -> Result<usize, StorageError> {
        let mut store = self.lock().await?;
        store.append(bytes).await
    }

    /// Copy out up to `max_bytes` from a single command at `linear_offset`
    pub async fn read(&self, linear_offset: u64, max_bytes: usize) -> Result<ReadChunk, StorageError> {
        let mut store = self.lock().await?;
        let chunk = store.read_at(linear_offset, max_bytes).await?;
        trace!(
            linear_offset,
            returned = chunk.bytes_returned(),
            end_of_stream = chunk.end_of_stream,
            "Read"
        );
        Ok(chunk)
    }

    /// Linear offset for `intra_offset` bytes into the `command_index`-th
    /// oldest retained command
    pub async fn seek(&self, command_index: u32, intra_offset: u32) -> Result<u64, StorageError> {
        let store = self.lock().await?;
        store.seek(command_index, intra_offset)
    }

    /// Seek and read the first chunk in one critical section
    ///
    /// Returns the resolved linear offset along with the chunk, so the
    /// caller can continue reading from `offset + chunk.bytes_returned()`.
    pub async fn seek_and_read(
        &self,
        command_index: u32,
        intra_offset: u32,
        max_bytes: usize,
    ) -> Result<(u64, ReadChunk), StorageError> {
        let mut store = self.lock().await?;
        let offset = store.seek(command_index, intra_offset)?;
        let chunk = store.read_at(offset, max_bytes).await?;
        Ok((offset, chunk))
    }

    /// Read from `linear_offset` until end-of-stream
    ///
    /// Each chunk is read under its own lock acquisition, so writes from
    /// other sessions may land between chunks.
    pub async fn read_to_end(&self, linear_offset: u64) -> Result<Bytes, StorageError> {
        let mut out = BytesMut::new();
        let mut offset = linear_offset;
        loop {
            let chunk = self.read(offset, READ_CHUNK_SIZE).await?;
            if chunk.end_of_stream {
                break;
            }
            offset += chunk.bytes_returned() as u64;
            out.extend_from_slice(&chunk.data);
        }
        Ok(out.freeze())
    }

    /// Current store counts
    pub async fn stats(&self) -> Result<StoreStats, StorageError> {
        let store = self.lock().await?;
        Ok(store.stats())
    }

    /// Make blocked and future lock waits fail with `LockInterrupted`
    pub fn interrupt(&self) {
        self.shutdown.cancel();
    }

    /// Whether the gateway has been interrupted
    pub fn is_interrupted(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Interrupt waiters, then release everything the store holds
    ///
    /// Waits for an operation already holding the lock to finish.
    #[instrument(skip(self))]
    pub async fn teardown(&self) -> Result<(), StorageError> {
        self.interrupt();
        let mut store = self.store.lock().await;
        let stats = store.stats();
        store.teardown().await?;
        info!(
            commands = stats.commands,
            bytes = stats.bytes,
            pending = stats.pending,
            "Command store torn down"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::InMemoryCommandStore;

    #[tokio::test]
    async fn test_write_read_seek() {
        let gateway = AccessGateway::new(InMemoryCommandStore::new());
        assert_eq!(gateway.write(b"abc\n").await.unwrap(), 4);
        assert_eq!(gateway.write(b"de\n").await.unwrap(), 3);
        assert_eq!(gateway.write(b"f\n").await.unwrap(), 2);

        let first = gateway.read(0, 2).await.unwrap();
        assert_eq!(&first.data[..], b"ab");
        let second = gateway.read(2, 100).await.unwrap();
        assert_eq!(&second.data[..], b"c\n");

        assert_eq!(&gateway.read_to_end(0).await.unwrap()[..], b"abc\nde\nf\n");
        assert!(gateway.read(9, 10).await.unwrap().end_of_stream);

        let offset = gateway.seek(1, 1).await.unwrap();
        assert_eq!(offset, 5);
        assert_eq!(&gateway.read_to_end(offset).await.unwrap()[..], b"e\nf\n");
    }

    #[tokio::test]
    async fn test_repeated_reads_are_identical() {
        let gateway = AccessGateway::new(InMemoryCommandStore::new());
        gateway.write(b"same\nbytes\n").await.unwrap();

        let a = gateway.read(3, 16).await.unwrap();
        let b = gateway.read(3, 16).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_seek_and_read() {
        let gateway = AccessGateway::new(InMemoryCommandStore::new());
        for i in 0..=10 {
            gateway.write(format!("cmd{i}\n").as_bytes()).await.unwrap();
        }

        let (offset, chunk) = gateway.seek_and_read(1, 2, 64).await.unwrap();
        assert_eq!(offset, 7);
        assert_eq!(&chunk.data[..], b"d2\n");

        assert!(matches!(
            gateway.seek_and_read(10, 0, 64).await,
            Err(StorageError::OutOfRange { .. })
        ));
    }

    #[tokio::test]
    async fn test_interrupt_fails_waiters() {
        let gateway = Arc::new(AccessGateway::new(InMemoryCommandStore::new()));

        // Hold the lock so the next caller has to wait
        let guard = gateway.store.lock().await;

        let waiter = {
            let gateway = Arc::clone(&gateway);
            tokio::spawn(async move { gateway.write(b"late\n").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        gateway.interrupt();
        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(StorageError::LockInterrupted)));
        drop(guard);

        assert!(gateway.is_interrupted());
        assert!(matches!(
            gateway.read(0, 1).await,
            Err(StorageError::LockInterrupted)
        ));
    }

    #[tokio::test]
    async fn test_teardown_clears_store() {
        let gateway = AccessGateway::new(InMemoryCommandStore::new());
        gateway.write(b"a\nb\npartial").await.unwrap();
        gateway.teardown().await.unwrap();

        let store = gateway.store.lock().await;
        assert_eq!(store.stats(), StoreStats::default());
    }

    #[tokio::test]
    async fn test_stats() {
        let gateway = AccessGateway::from_config(&StoreConfig::new(2)).await.unwrap();
        gateway.write(b"1\n2\n3\nopen").await.unwrap();
        let stats = gateway.stats().await.unwrap();
        assert_eq!(stats.commands, 2);
        assert_eq!(stats.bytes, 4);
        assert_eq!(stats.pending, 4);
    }
}
