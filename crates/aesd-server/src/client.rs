//! Minimal client for the command server
//!
//! Each request opens a connection, sends one line, half-closes and reads
//! the reply until the server closes. Used by the `aesd-seekto` harness and
//! by tests.

use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::directive::{SEEK_DIRECTIVE_PREFIX, format_seek};
use crate::error::{ServerError, ServerResult};

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server address, `host:port`
    pub addr: String,
    /// Limit for connecting and for the whole reply
    pub timeout: Duration,
    /// Seek directive prefix the server expects
    pub seek_prefix: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:9000".to_string(),
            timeout: Duration::from_secs(5),
            seek_prefix: SEEK_DIRECTIVE_PREFIX.to_string(),
        }
    }
}

/// Client for a running `aesdsocket`
#[derive(Debug, Clone)]
pub struct CommandClient {
    config: ClientConfig,
}

impl CommandClient {
    /// Create a new client
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    /// Client for `addr` with default settings
    pub fn connect_to(addr: impl Into<String>) -> Self {
        Self::new(ClientConfig {
            addr: addr.into(),
            ..Default::default()
        })
    }

    /// Append `command` (a newline is added if missing) and return the history
    pub async fn append(&self, command: &[u8]) -> ServerResult<Bytes> {
        let mut line = command.to_vec();
        if line.last() != Some(&b'\n') {
            line.push(b'\n');
        }
        self.exchange(&line).await
    }

    /// Send a seek directive and return the bytes from that position on
    pub async fn seek(&self, command_index: u32, intra_offset: u32) -> ServerResult<Bytes> {
        let line = format_seek(&self.config.seek_prefix, command_index, intra_offset);
        self.exchange(line.as_bytes()).await
    }

    /// Send raw bytes, half-close, and collect the reply
    pub async fn exchange(&self, bytes: &[u8]) -> ServerResult<Bytes> {
        let addr = &self.config.addr;
        let mut stream = timeout(self.config.timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ServerError::Timeout(format!("connection to {addr}")))??;
        info!("Connected to {}", addr);

        stream.write_all(bytes).await?;
        stream.shutdown().await?;

        let mut reply = Vec::new();
        timeout(self.config.timeout, stream.read_to_end(&mut reply))
            .await
            .map_err(|_| ServerError::Timeout(format!("reply from {addr}")))??;

        debug!(sent = bytes.len(), received = reply.len(), "Exchange complete");
        Ok(Bytes::from(reply))
    }
}
