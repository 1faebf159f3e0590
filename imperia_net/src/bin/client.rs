use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use imperia_net::{SocketEvent, SocketOptions, TransportSocket, Value};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Imperia thin client inspector", long_about = None)]
struct Cli {
    /// Host running the Imperia server (`local` for loopback).
    #[arg(long, default_value = "local")]
    host: String,
    /// Server port.
    #[arg(long, default_value_t = 42932)]
    port: u16,
    /// JSON request to send once connected, e.g. '{"request":"summary"}'.
    #[arg(long)]
    request: Option<String>,
    /// Seconds to keep listening before disconnecting.
    #[arg(long, default_value_t = 5)]
    listen_secs: u64,
    /// Connect timeout in milliseconds.
    #[arg(long, default_value_t = 2000)]
    connect_timeout_ms: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let request = cli
        .request
        .as_deref()
        .map(|text| serde_json::from_str::<serde_json::Value>(text).map(Value::from))
        .transpose()
        .context("--request must be valid JSON")?;

    let mut socket = TransportSocket::new(SocketOptions {
        connect_timeout: Duration::from_millis(cli.connect_timeout_ms),
        ..SocketOptions::default()
    });
    socket
        .connect(&cli.host, cli.port)
        .with_context(|| format!("connecting to {}:{}", cli.host, cli.port))?;

    if let Some(request) = &request {
        socket.send(request)?;
        info!(?request, "request.sent");
    }

    let deadline = Instant::now() + Duration::from_secs(cli.listen_secs);
    'reactor: while Instant::now() < deadline {
        for event in socket.poll() {
            match event {
                SocketEvent::Connected => info!(peer = ?socket.peer_address(), "connected"),
                SocketEvent::Received(value) => {
                    let json = serde_json::Value::from(value);
                    info!(message = %json, "message.received");
                }
                SocketEvent::Error(kind) => warn!(?kind, "socket.error"),
                SocketEvent::Disconnected => {
                    info!("server closed the connection");
                    break 'reactor;
                }
            }
        }
        thread::sleep(Duration::from_millis(16));
    }

    info!(bytes_written = socket.bytes_written(), "client.exit");
    socket.disconnect();
    Ok(())
}
