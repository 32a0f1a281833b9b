//! Periodic timestamp commands
//!
//! Every interval a `timestamp:<RFC 2822 time>` command is written through the
//! gateway, interleaving with commands written by sessions.

use std::sync::Arc;
use std::time::Duration;

use aesd_storage::{AccessGateway, StorageError};
use chrono::{DateTime, Local, TimeZone};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Render the timestamp command for `now`, newline included
pub fn format_timestamp<Tz>(now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    format!("timestamp:{}\n", now.format("%a, %d %b %Y %T %z"))
}

/// Background task appending timestamp commands
pub struct TimestampTask {
    gateway: Arc<AccessGateway>,
    interval: Duration,
    shutdown: CancellationToken,
    written: u64,
}

impl TimestampTask {
    /// Spawn the timestamp task as a background task
    pub fn spawn(
        gateway: Arc<AccessGateway>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let task = Self {
            gateway,
            interval,
            shutdown,
            written: 0,
        };

        tokio::spawn(async move {
            task.run().await;
        })
    }

    /// Run the timestamp loop; the first command is written one interval in
    async fn run(mut self) {
        info!(interval_secs = self.interval.as_secs(), "Timestamp task started");

        let mut interval = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!(written = self.written, "Timestamp task shutting down");
                    break;
                }
                _ = interval.tick() => {
                    let line = format_timestamp(&Local::now());
                    match self.gateway.write(line.as_bytes()).await {
                        Ok(_) => {
                            self.written += 1;
                            debug!(line = line.trim_end(), "Wrote timestamp");
                        }
                        Err(StorageError::LockInterrupted) => break,
                        Err(e) => warn!(error = %e, "Failed to write timestamp"),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aesd_storage::InMemoryCommandStore;
    use chrono::{FixedOffset, Utc};

    #[test]
    fn test_format_timestamp() {
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let now = offset.with_ymd_and_hms(2003, 7, 1, 10, 52, 37).unwrap();
        assert_eq!(
            format_timestamp(&now),
            "timestamp:Tue, 01 Jul 2003 10:52:37 +0200\n"
        );

        let utc = Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap();
        assert_eq!(
            format_timestamp(&utc),
            "timestamp:Fri, 05 Jan 2024 00:00:00 +0000\n"
        );
    }

    #[tokio::test]
    async fn test_task_writes_and_stops() {
        let gateway = Arc::new(AccessGateway::new(InMemoryCommandStore::new()));
        let shutdown = CancellationToken::new();
        let handle = TimestampTask::spawn(
            Arc::clone(&gateway),
            Duration::from_millis(20),
            shutdown.clone(),
        );

        tokio::time::sleep(Duration::from_millis(110)).await;
        shutdown.cancel();
        handle.await.unwrap();

        let history = gateway.read_to_end(0).await.unwrap();
        let text = std::str::from_utf8(&history).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(!lines.is_empty());
        assert!(lines.iter().all(|line| line.starts_with("timestamp:")));
    }
}
