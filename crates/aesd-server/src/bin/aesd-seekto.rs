//! aesd-seekto
//!
//! Sends a seek directive to a running aesdsocket and prints what comes back.

use std::io::Write;
use std::time::Duration;

use aesd_server::{ClientConfig, CommandClient, SEEK_DIRECTIVE_PREFIX};
use anyhow::Context;
use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "aesd-seekto", about = "Read the command history from a seek position")]
struct Args {
    /// Zero-based index of the oldest retained command to start from
    write_cmd: u32,
    /// Byte offset within that command
    write_cmd_offset: u32,
    /// Server address
    #[arg(long, default_value = "127.0.0.1:9000")]
    addr: String,
    /// Seconds to wait for the server
    #[arg(long, default_value_t = 5)]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    println!(
        "Testing seek with write_cmd={}, write_cmd_offset={}",
        args.write_cmd, args.write_cmd_offset
    );

    let client = CommandClient::new(ClientConfig {
        addr: args.addr.clone(),
        timeout: Duration::from_secs(args.timeout_secs),
        seek_prefix: SEEK_DIRECTIVE_PREFIX.to_string(),
    });
    let reply = client
        .seek(args.write_cmd, args.write_cmd_offset)
        .await
        .with_context(|| format!("seek request to {} failed", args.addr))?;

    if reply.is_empty() {
        println!("No data at that position");
        return Ok(());
    }

    println!("Read {} bytes:", reply.len());
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&reply)?;
    stdout.flush()?;
    Ok(())
}
