//! One peer connection
//!
//! The session reads delimiter-terminated lines. A seek directive streams
//! the history from the resolved position; any other line is appended and
//! the whole retained history is streamed back.

use std::net::SocketAddr;
use std::sync::Arc;

use aesd_storage::gateway::READ_CHUNK_SIZE;
use aesd_storage::{AccessGateway, StorageError};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::directive::{Request, parse_line};
use crate::error::ServerResult;

/// Per-connection handler
pub struct Session {
    gateway: Arc<AccessGateway>,
    peer: SocketAddr,
    seek_prefix: Arc<str>,
    delimiter: u8,
}

impl Session {
    /// Create a session for `peer`
    pub fn new(
        gateway: Arc<AccessGateway>,
        peer: SocketAddr,
        seek_prefix: Arc<str>,
        delimiter: u8,
    ) -> Self {
        Self {
            gateway,
            peer,
            seek_prefix,
            delimiter,
        }
    }

    /// Serve lines until the peer closes or shutdown is requested
    ///
    /// An undelimited tail left when the peer closes is still written; it
    /// stays pending until a later write completes it.
    #[instrument(skip_all, fields(peer = %self.peer))]
    pub async fn run<S>(self, stream: S, shutdown: CancellationToken) -> ServerResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (reader, mut writer) = tokio::io::split(stream);
        let mut reader = BufReader::new(reader);
        let mut line = Vec::new();

        loop {
            line.clear();
            let read = tokio::select! {
                _ = shutdown.cancelled() => break,
                read = reader.read_until(self.delimiter, &mut line) => read?,
            };

            if read == 0 {
                break;
            }

            if line.last() != Some(&self.delimiter) {
                debug!(len = line.len(), "Peer closed mid-command");
                self.write_or_interrupted(&line).await?;
                break;
            }

            match self.respond(&line).await {
                Ok(Some(reply)) => {
                    writer.write_all(&reply).await?;
                    writer.flush().await?;
                }
                Ok(None) => {}
                Err(StorageError::LockInterrupted) => break,
                Err(e) => return Err(e.into()),
            }
        }

        writer.shutdown().await.ok();
        Ok(())
    }

    /// Handle one complete line, returning the bytes to send back
    async fn respond(&self, line: &[u8]) -> Result<Option<bytes::Bytes>, StorageError> {
        match parse_line(line, &self.seek_prefix) {
            Request::Seek {
                command_index,
                intra_offset,
            } => {
                debug!(command_index, intra_offset, "Seek directive");
                let (offset, first) = match self
                    .gateway
                    .seek_and_read(command_index, intra_offset, READ_CHUNK_SIZE)
                    .await
                {
                    Ok(found) => found,
                    Err(e @ StorageError::OutOfRange { .. }) => {
                        warn!(error = %e, "Rejected seek directive");
                        return Ok(None);
                    }
                    Err(e) => return Err(e),
                };

                if first.end_of_stream {
                    return Ok(Some(bytes::Bytes::new()));
                }
                let rest = self
                    .gateway
                    .read_to_end(offset + first.bytes_returned() as u64)
                    .await?;
                let mut reply = bytes::BytesMut::with_capacity(first.data.len() + rest.len());
                reply.extend_from_slice(&first.data);
                reply.extend_from_slice(&rest);
                Ok(Some(reply.freeze()))
            }
            Request::Append(payload) => {
                self.gateway.write(payload).await?;
                self.gateway.read_to_end(0).await.map(Some)
            }
        }
    }

    async fn write_or_interrupted(&self, bytes: &[u8]) -> ServerResult<()> {
        match self.gateway.write(bytes).await {
            Ok(_) | Err(StorageError::LockInterrupted) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aesd_storage::InMemoryCommandStore;
    use tokio::io::{AsyncReadExt, duplex};

    use crate::directive::SEEK_DIRECTIVE_PREFIX;

    fn session(gateway: &Arc<AccessGateway>) -> Session {
        Session::new(
            Arc::clone(gateway),
            "127.0.0.1:4000".parse().unwrap(),
            Arc::from(SEEK_DIRECTIVE_PREFIX),
            b'\n',
        )
    }

    async fn exchange(gateway: &Arc<AccessGateway>, input: &[u8]) -> Vec<u8> {
        let (mut client, server) = duplex(4096);
        let task = tokio::spawn(session(gateway).run(server, CancellationToken::new()));

        client.write_all(input).await.unwrap();
        client.shutdown().await.unwrap();

        let mut out = Vec::new();
        client.read_to_end(&mut out).await.unwrap();
        task.await.unwrap().unwrap();
        out
    }

    #[tokio::test]
    async fn test_append_echoes_history() {
        let gateway = Arc::new(AccessGateway::new(InMemoryCommandStore::new()));
        assert_eq!(exchange(&gateway, b"abc\n").await, b"abc\n");
        assert_eq!(exchange(&gateway, b"de\n").await, b"abc\nde\n");
    }

    #[tokio::test]
    async fn test_multiple_lines_in_one_session() {
        let gateway = Arc::new(AccessGateway::new(InMemoryCommandStore::new()));
        assert_eq!(exchange(&gateway, b"a\nb\n").await, b"a\na\nb\n");
    }

    #[tokio::test]
    async fn test_seek_directive() {
        let gateway = Arc::new(AccessGateway::new(InMemoryCommandStore::new()));
        for i in 0..=10 {
            gateway.write(format!("cmd{i}\n").as_bytes()).await.unwrap();
        }

        let out = exchange(&gateway, b"AESDCHAR_IOCSEEKTO:1,2\n").await;
        assert!(out.starts_with(b"d2\ncmd3\n"));
        assert!(out.ends_with(b"cmd10\n"));
        assert_eq!(gateway.stats().await.unwrap().commands, 10);
    }

    #[tokio::test]
    async fn test_out_of_range_seek_sends_nothing() {
        let gateway = Arc::new(AccessGateway::new(InMemoryCommandStore::new()));
        gateway.write(b"only\n").await.unwrap();

        let out = exchange(&gateway, b"AESDCHAR_IOCSEEKTO:5,0\n").await;
        assert!(out.is_empty());
        assert_eq!(gateway.stats().await.unwrap().commands, 1);
    }

    #[tokio::test]
    async fn test_unterminated_tail_stays_pending() {
        let gateway = Arc::new(AccessGateway::new(InMemoryCommandStore::new()));
        let out = exchange(&gateway, b"no newline").await;
        assert!(out.is_empty());

        let stats = gateway.stats().await.unwrap();
        assert_eq!(stats.commands, 0);
        assert_eq!(stats.pending, 10);

        assert_eq!(exchange(&gateway, b" yet\n").await, b"no newline yet\n");
    }

    #[tokio::test]
    async fn test_shutdown_ends_session() {
        let gateway = Arc::new(AccessGateway::new(InMemoryCommandStore::new()));
        let (_client, server) = duplex(64);
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(session(&gateway).run(server, shutdown.clone()));

        shutdown.cancel();
        assert!(task.await.unwrap().is_ok());
    }
}
