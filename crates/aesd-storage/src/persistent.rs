//! File-backed command store
//!
//! Every written byte is appended to a data file, so the file always holds
//! the completed commands followed by the open (undelimited) command. An
//! in-memory index of `(file offset, size)` records keeps the same bounded
//! window as the ring store, so reads and seeks behave identically to the
//! in-memory backend. Commands that fall out of the window stay in the file
//! but are no longer addressable.

use std::collections::VecDeque;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, info, trace, warn};

use crate::accumulator::WriteAccumulator;
use crate::config::{BackendKind, StoreConfig};
use crate::error::StorageError;
use crate::{CommandStore, ReadChunk, StoreStats, seek};

/// Location of one retained command inside the data file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Record {
    offset: u64,
    size: usize,
}

/// Persistent implementation of CommandStore
#[derive(Debug)]
pub struct FileCommandStore {
    /// Path to the data file
    path: PathBuf,
    /// Open handle on the data file
    file: File,
    /// Retained commands, oldest first
    records: VecDeque<Record>,
    /// Maximum retained commands
    capacity: usize,
    /// Open command; its bytes also sit in the file right after `end`
    accumulator: WriteAccumulator,
    /// File offset just past the last completed command
    end: u64,
    /// Remove the data file at teardown
    remove_on_teardown: bool,
}

impl FileCommandStore {
    /// Open (or create) the data file named by `config`.
    ///
    /// An existing file is scanned: its last `capacity` commands become the
    /// retained window and any trailing bytes without a delimiter are
    /// loaded as the open command.
    pub async fn open(config: &StoreConfig) -> Result<Self, StorageError> {
        config.validate()?;
        let BackendKind::File { path } = &config.backend else {
            return Err(StorageError::invalid_config(
                "file store requires a file backend",
            ));
        };
        Self::open_at(path, config).await
    }

    async fn open_at(path: &Path, config: &StoreConfig) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .await?;

        let mut contents = Vec::new();
        file.read_to_end(&mut contents).await?;

        let mut accumulator = WriteAccumulator::with_delimiter(config.delimiter)
            .with_max_command_size(config.max_command_size);
        let mut records = VecDeque::with_capacity(config.capacity);
        let mut offset = 0u64;
        for segment in contents.split_inclusive(|&b| b == config.delimiter) {
            if segment.last() != Some(&config.delimiter) {
                accumulator.append(segment)?;
                break;
            }
            if records.len() == config.capacity {
                records.pop_front();
            }
            records.push_back(Record {
                offset,
                size: segment.len(),
            });
            offset += segment.len() as u64;
        }

        if accumulator.pending_len() > 0 {
            debug!(
                path = %path.display(),
                trailing = accumulator.pending_len(),
                "Data file ends without a delimiter, resuming open command"
            );
        }

        info!(
            path = %path.display(),
            retained = records.len(),
            bytes = offset,
            "Opened command data file"
        );

        Ok(Self {
            path: path.to_path_buf(),
            file,
            records,
            capacity: config.capacity,
            accumulator,
            end: offset,
            remove_on_teardown: config.remove_file_on_teardown,
        })
    }

    /// Path of the data file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sizes(&self) -> impl Iterator<Item = usize> + '_ {
        self.records.iter().map(|record| record.size)
    }

    async fn write_at(&mut self, position: u64, bytes: &[u8]) -> Result<(), StorageError> {
        self.file.seek(SeekFrom::Start(position)).await?;
        self.file.write_all(bytes).await?;
        self.file.flush().await?;
        Ok(())
    }

    /// Cut the file back to `len` after a failed append
    async fn roll_back(&mut self, len: u64) {
        if let Err(e) = self.file.set_len(len).await {
            warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to truncate data file after failed append"
            );
        }
    }
}

#[async_trait]
impl CommandStore for FileCommandStore {
    async fn append(&mut self, bytes: &[u8]) -> Result<usize, StorageError> {
        // The open command already sits in the file after `end`
        let write_at = self.end + self.accumulator.pending_len() as u64;
        if let Err(e) = self.write_at(write_at, bytes).await {
            warn!(path = %self.path.display(), error = %e, "Append failed, rolling back");
            self.roll_back(write_at).await;
            return Err(e);
        }

        let completed = match self.accumulator.append(bytes) {
            Ok(completed) => completed,
            Err(e) => {
                self.roll_back(write_at).await;
                return Err(e);
            }
        };

        let mut offset = self.end;
        for entry in &completed {
            if self.records.len() == self.capacity {
                self.records.pop_front();
                debug!("Oldest command left the retained window");
            }
            self.records.push_back(Record {
                offset,
                size: entry.size(),
            });
            offset += entry.size() as u64;
        }
        self.end = offset;

        Ok(bytes.len())
    }

    async fn read_at(
        &mut self,
        linear_offset: u64,
        max_bytes: usize,
    ) -> Result<ReadChunk, StorageError> {
        let Some(position) = seek::locate(self.sizes(), linear_offset) else {
            return Ok(ReadChunk::end_of_stream());
        };
        let record = self.records[position.index];
        let len = max_bytes.min(record.size - position.intra_offset);

        trace!(linear_offset, file_offset = record.offset, len, "Reading command from file");

        let mut buf = Vec::new();
        buf.try_reserve_exact(len)?;
        buf.resize(len, 0);
        self.file
            .seek(SeekFrom::Start(record.offset + position.intra_offset as u64))
            .await?;
        self.file.read_exact(&mut buf).await?;

        Ok(ReadChunk::data(Bytes::from(buf)))
    }

    fn seek(&self, command_index: u32, intra_offset: u32) -> Result<u64, StorageError> {
        seek::resolve_seek(self.sizes(), command_index, intra_offset)
    }

    fn stats(&self) -> StoreStats {
        StoreStats {
            commands: self.records.len(),
            bytes: self.sizes().map(|size| size as u64).sum(),
            pending: self.accumulator.pending_len(),
        }
    }

    async fn clear(&mut self) -> Result<usize, StorageError> {
        self.file.set_len(0).await?;
        self.end = 0;
        self.accumulator.clear();
        let released = self.records.len();
        self.records.clear();
        Ok(released)
    }

    /// Remove the data file, or keep it intact for the next open
    async fn teardown(&mut self) -> Result<(), StorageError> {
        if !self.remove_on_teardown {
            self.file.sync_all().await?;
            info!(
                path = %self.path.display(),
                retained = self.records.len(),
                pending = self.accumulator.pending_len(),
                "Kept command data file"
            );
            self.records.clear();
            self.accumulator.clear();
            return Ok(());
        }

        self.clear().await?;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => info!(path = %self.path.display(), "Removed command data file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> StoreConfig {
        StoreConfig::file(dir.path().join("aesdsocketdata"))
    }

    async fn read_all(store: &mut FileCommandStore) -> Vec<u8> {
        let mut out = Vec::new();
        let mut offset = 0u64;
        loop {
            let chunk = store.read_at(offset, 3).await.unwrap();
            if chunk.end_of_stream {
                break;
            }
            offset += chunk.bytes_returned() as u64;
            out.extend_from_slice(&chunk.data);
        }
        out
    }

    #[tokio::test]
    async fn test_append_and_read() {
        let dir = TempDir::new().unwrap();
        let mut store = FileCommandStore::open(&config_in(&dir)).await.unwrap();

        store.append(b"abc\nde").await.unwrap();
        store.append(b"\nf\n").await.unwrap();

        assert_eq!(read_all(&mut store).await, b"abc\nde\nf\n");
        assert_eq!(store.stats().commands, 3);

        let on_disk = tokio::fs::read(store.path()).await.unwrap();
        assert_eq!(on_disk, b"abc\nde\nf\n");
    }

    #[tokio::test]
    async fn test_window_matches_capacity() {
        let dir = TempDir::new().unwrap();
        let mut store = FileCommandStore::open(&config_in(&dir)).await.unwrap();

        for i in 0..=10 {
            store.append(format!("cmd{i}\n").as_bytes()).await.unwrap();
        }

        let history = read_all(&mut store).await;
        assert!(history.starts_with(b"cmd1\n"));
        assert!(history.ends_with(b"cmd10\n"));

        let offset = store.seek(1, 2).unwrap();
        let chunk = store.read_at(offset, 100).await.unwrap();
        assert_eq!(&chunk.data[..], b"d2\n");
    }

    #[tokio::test]
    async fn test_reopen_restores_window_and_tail() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let path = dir.path().join("aesdsocketdata");
        tokio::fs::write(&path, b"one\ntwo\nthr").await.unwrap();

        let mut store = FileCommandStore::open(&config).await.unwrap();
        assert_eq!(store.stats().commands, 2);
        assert_eq!(store.stats().pending, 3);

        store.append(b"ee\n").await.unwrap();
        assert_eq!(read_all(&mut store).await, b"one\ntwo\nthree\n");
    }

    #[tokio::test]
    async fn test_teardown_removes_file() {
        let dir = TempDir::new().unwrap();
        let mut store = FileCommandStore::open(&config_in(&dir)).await.unwrap();
        store.append(b"x\n").await.unwrap();

        let path = store.path().to_path_buf();
        store.teardown().await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_teardown_keeps_file_when_configured() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir).with_remove_file_on_teardown(false);
        let mut store = FileCommandStore::open(&config).await.unwrap();
        store.append(b"a\nb\npart").await.unwrap();

        store.teardown().await.unwrap();
        assert_eq!(store.stats(), StoreStats::default());
        let on_disk = tokio::fs::read(store.path()).await.unwrap();
        assert_eq!(on_disk, b"a\nb\npart");

        let mut reopened = FileCommandStore::open(&config).await.unwrap();
        let stats = reopened.stats();
        assert_eq!(stats.commands, 2);
        assert_eq!(stats.pending, 4);

        reopened.append(b"s\n").await.unwrap();
        assert_eq!(read_all(&mut reopened).await, b"a\nb\nparts\n");
    }

    #[tokio::test]
    async fn test_open_command_is_written_through() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        {
            let mut store = FileCommandStore::open(&config).await.unwrap();
            store.append(b"a\nb\npart").await.unwrap();
        }

        let path = dir.path().join("aesdsocketdata");
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"a\nb\npart");

        let store = FileCommandStore::open(&config).await.unwrap();
        assert_eq!(store.stats().commands, 2);
        assert_eq!(store.stats().pending, 4);
    }

    #[tokio::test]
    async fn test_failed_write_rolls_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("aesdsocketdata");
        let mut store = FileCommandStore::open(&config_in(&dir)).await.unwrap();
        store.append(b"a\nb\npart").await.unwrap();
        let before = store.stats();

        // A read-only handle makes every write fail
        store.file = File::open(&path).await.unwrap();
        let result = store.append(b"s\nc\nd\n").await;
        assert!(matches!(result, Err(StorageError::Io(_))));
        assert_eq!(store.stats(), before);
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"a\nb\npart");

        store.file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .await
            .unwrap();
        store.append(b"s\n").await.unwrap();
        assert_eq!(read_all(&mut store).await, b"a\nb\nparts\n");
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"a\nb\nparts\n");
    }

    #[tokio::test]
    async fn test_oversized_command_rolls_back_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("aesdsocketdata");
        let config = config_in(&dir).with_max_command_size(4);
        let mut store = FileCommandStore::open(&config).await.unwrap();
        store.append(b"ab\nc").await.unwrap();

        let result = store.append(b"\ntoolong\n").await;
        assert!(matches!(result, Err(StorageError::AllocationFailure(_))));
        assert_eq!(store.stats().commands, 1);
        assert_eq!(store.stats().pending, 1);
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"ab\nc");

        store.append(b"d\n").await.unwrap();
        assert_eq!(read_all(&mut store).await, b"ab\ncd\n");
    }

    #[tokio::test]
    async fn test_requires_file_backend() {
        let result = FileCommandStore::open(&StoreConfig::default()).await;
        assert!(matches!(result, Err(StorageError::InvalidConfig(_))));
    }
}
