//! Store configuration
//!
//! Controls how many commands are retained, which byte terminates a command,
//! and which backend holds the history.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::accumulator::DEFAULT_DELIMITER;
use crate::error::StorageError;
use crate::ring::DEFAULT_CAPACITY;

/// Default location of the file-backed history
pub const DEFAULT_DATA_FILE: &str = "/var/tmp/aesdsocketdata";

/// Where retained commands live
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendKind {
    /// Ring of owned buffers in memory (default)
    #[default]
    Memory,
    /// Commands appended to a data file, indexed in memory
    File {
        /// Path of the data file
        path: PathBuf,
    },
}

/// Configuration for a command store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Maximum number of retained commands
    pub capacity: usize,
    /// Byte that terminates a command
    pub delimiter: u8,
    /// Backing store
    pub backend: BackendKind,
    /// Remove the data file when the store is torn down
    pub remove_file_on_teardown: bool,
    /// Longest accepted command in bytes; `None` for no limit
    pub max_command_size: Option<usize>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            delimiter: DEFAULT_DELIMITER,
            backend: BackendKind::default(),
            remove_file_on_teardown: true,
            max_command_size: None,
        }
    }
}

impl StoreConfig {
    /// In-memory store retaining `capacity` commands
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ..Default::default()
        }
    }

    /// File-backed store at `path`
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            backend: BackendKind::File { path: path.into() },
            ..Default::default()
        }
    }

    /// Set the delimiter byte
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Keep or remove the data file at teardown
    pub fn with_remove_file_on_teardown(mut self, remove: bool) -> Self {
        self.remove_file_on_teardown = remove;
        self
    }

    /// Limit the size of a single command
    pub fn with_max_command_size(mut self, limit: usize) -> Self {
        self.max_command_size = Some(limit);
        self
    }

    /// Check the configuration before building a store
    pub fn validate(&self) -> Result<(), StorageError> {
        if self.capacity == 0 {
            return Err(StorageError::invalid_config("capacity must be at least 1"));
        }
        if self.max_command_size == Some(0) {
            return Err(StorageError::invalid_config(
                "max command size must be at least 1",
            ));
        }
        if let BackendKind::File { path } = &self.backend
            && path.as_os_str().is_empty()
        {
            return Err(StorageError::invalid_config("data file path is empty"));
        }
        Ok(())
    }
}
