//! # AESD Server
//!
//! TCP front end for the bounded command history.
//!
//! Each connection is a session that sends newline-terminated lines. A
//! regular line is appended as a command and the retained history is sent
//! back; a seek directive (`AESDCHAR_IOCSEEKTO:<command>,<offset>`) sends the
//! history starting at that position instead. A background task appends a
//! timestamp command periodically.
//!
//! ## Example
//!
//! ```rust,ignore
//! use aesd_server::{CommandServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let server = CommandServer::new(ServerConfig::default()).await?;
//!     let addr = server.start().await?;
//!     println!("listening on {addr}");
//!
//!     tokio::signal::ctrl_c().await?;
//!     server.stop().await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod directive;
pub mod error;
pub mod session;
pub mod timestamp;

pub use client::{ClientConfig, CommandClient};
pub use config::{Cli, ServerConfig};
pub use directive::{Request, SEEK_DIRECTIVE_PREFIX, format_seek, parse_line};
pub use error::{ServerError, ServerResult};
pub use session::Session;
pub use timestamp::TimestampTask;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use aesd_storage::AccessGateway;
use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, instrument, warn};

/// Pause after a failed accept before trying again
const ACCEPT_BACKOFF: Duration = Duration::from_millis(25);

/// Everything the accept loop hands to new sessions
struct AcceptContext {
    gateway: Arc<AccessGateway>,
    sessions: TaskTracker,
    shutdown: CancellationToken,
    seek_prefix: Arc<str>,
    delimiter: u8,
}

/// The command server
///
/// Owns the shared [`AccessGateway`] for its whole lifetime: the store is
/// opened by [`CommandServer::new`] and torn down by [`CommandServer::stop`].
pub struct CommandServer {
    config: ServerConfig,
    gateway: Arc<AccessGateway>,
    shutdown: CancellationToken,
    started: AtomicBool,
    stopped: AtomicBool,
    local_addr: OnceLock<SocketAddr>,
    sessions: TaskTracker,
    background_tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl CommandServer {
    /// Open the configured store and prepare the server
    pub async fn new(config: ServerConfig) -> ServerResult<Self> {
        config.validate()?;
        let gateway = AccessGateway::from_config(&config.store).await?;
        Ok(Self {
            config,
            gateway: Arc::new(gateway),
            shutdown: CancellationToken::new(),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            local_addr: OnceLock::new(),
            sessions: TaskTracker::new(),
            background_tasks: Mutex::new(Vec::new()),
        })
    }

    /// The shared gateway
    pub fn gateway(&self) -> Arc<AccessGateway> {
        Arc::clone(&self.gateway)
    }

    /// Bound address, once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    /// Whether the server is accepting connections
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst) && !self.stopped.load(Ordering::SeqCst)
    }

    /// Bind the listener and spawn the accept loop and timestamp task
    ///
    /// A server can be started once.
    #[instrument(skip(self))]
    pub async fn start(&self) -> ServerResult<SocketAddr> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ServerError::AlreadyStarted);
        }

        let listener = match self.bind() {
            Ok(listener) => listener,
            Err(e) => {
                self.started.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };
        let addr = listener.local_addr()?;
        let _ = self.local_addr.set(addr);

        let context = AcceptContext {
            gateway: self.gateway(),
            sessions: self.sessions.clone(),
            shutdown: self.shutdown.clone(),
            seek_prefix: Arc::from(self.config.seek_prefix.as_str()),
            delimiter: self.config.store.delimiter,
        };
        let accept_task = tokio::spawn(accept_loop(listener, context));

        let mut tasks = self.background_tasks.lock().await;
        tasks.push(accept_task);
        if let Some(period) = self.config.timestamp_interval() {
            tasks.push(TimestampTask::spawn(
                self.gateway(),
                period,
                self.shutdown.clone(),
            ));
        }

        info!(%addr, "Server started");
        Ok(addr)
    }

    fn bind(&self) -> ServerResult<TcpListener> {
        let addr = self.config.socket_addr()?;
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        Ok(socket.listen(self.config.backlog)?)
    }

    /// Stop accepting, finish sessions and tear down the store
    #[instrument(skip(self))]
    pub async fn stop(&self) -> ServerResult<()> {
        if !self.started.load(Ordering::SeqCst) {
            return Err(ServerError::NotStarted);
        }
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.shutdown.cancel();
        self.gateway.interrupt();

        let tasks: Vec<_> = self.background_tasks.lock().await.drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }

        self.sessions.close();
        info!(sessions = self.sessions.len(), "Waiting for sessions to finish");
        self.sessions.wait().await;

        self.gateway.teardown().await?;
        info!("Server stopped");
        Ok(())
    }
}

async fn accept_loop(listener: TcpListener, context: AcceptContext) {
    loop {
        tokio::select! {
            _ = context.shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    info!("Accepted connection from {}", peer.ip());
                    let session = Session::new(
                        Arc::clone(&context.gateway),
                        peer,
                        Arc::clone(&context.seek_prefix),
                        context.delimiter,
                    );
                    let shutdown = context.shutdown.clone();
                    context.sessions.spawn(async move {
                        if let Err(e) = session.run(stream, shutdown).await {
                            warn!(%peer, error = %e, "Session failed");
                        }
                        info!("Closed connection from {}", peer.ip());
                    });
                }
                Err(e) => {
                    error!(error = %e, "Accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }
    info!("Accept loop stopped");
}
