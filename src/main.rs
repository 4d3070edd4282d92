//! gridwire - Grid circuit packet tool
//!
//! Listens for, pings and inspects circuit datagrams.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use gridwire::config::{self, Config};
use gridwire::network::{resolve_host, Endpoint, EndpointConfig, EndpointError};
use gridwire::protocol::{AnyMessage, Decoder, Packet, SendOptions, StartPingCheck};

/// gridwire - Grid circuit packet tool
#[derive(Parser)]
#[command(name = "gridwire")]
#[command(version = "0.1.0")]
#[command(about = "Encode, decode and exchange grid circuit datagrams", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bind a port and log every decoded message
    Listen {
        /// Port to listen on (defaults to the configured port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Send pings to a peer and report round-trip times
    Ping {
        /// Peer address, host or host:port
        addr: String,

        /// Number of pings to send
        #[arg(short = 'n', long, default_value_t = 4)]
        count: u8,

        /// How long to wait for each reply
        #[arg(short, long, default_value_t = 1000)]
        timeout_ms: u64,
    },

    /// Decode a hex-encoded datagram
    Inspect {
        /// Datagram bytes as hex
        hex: String,

        /// Print the decoded frame as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show current configuration
    Config {
        /// Generate sample configuration
        #[arg(long)]
        generate: bool,

        /// Output path for generated config
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default().unwrap_or_default()
    };

    let filter = if cli.verbose || config.general.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Listen { port } => {
            run_listen(config, port).await?;
        }
        Commands::Ping {
            addr,
            count,
            timeout_ms,
        } => {
            run_ping(config, &addr, count, Duration::from_millis(timeout_ms)).await?;
        }
        Commands::Inspect { hex, json } => {
            inspect(&hex, json)?;
        }
        Commands::Config { generate, output } => {
            if generate {
                let sample = config::generate_sample_config()?;
                if let Some(path) = output {
                    std::fs::write(&path, &sample)?;
                    println!("Configuration written to: {}", path.display());
                } else {
                    println!("{}", sample);
                }
            } else {
                println!("{}", toml::to_string_pretty(&config)?);
            }
        }
    }

    Ok(())
}

/// Log every message arriving on the configured port
async fn run_listen(config: Config, port: Option<u16>) -> anyhow::Result<()> {
    let mut endpoint_config = EndpointConfig::from(&config);
    if let Some(port) = port {
        endpoint_config.port = port;
    }

    let mut endpoint = Endpoint::bind(endpoint_config).await?;
    tracing::info!(
        "'{}' listening on {}",
        config.general.name,
        endpoint.local_addr()
    );
    println!("Listening on {}. Press Ctrl+C to stop.", endpoint.local_addr());

    loop {
        tokio::select! {
            result = endpoint.recv() => {
                match result {
                    Ok(received) => {
                        let frame = &received.frame;
                        println!(
                            "{} seq={} {}{}{} acks={:?} {:?}",
                            received.addr,
                            frame.sequence,
                            frame.message.name(),
                            if frame.reliable { " [reliable]" } else { "" },
                            if frame.resent { " [resent]" } else { "" },
                            frame.acks,
                            frame.message,
                        );
                    }
                    Err(e) => tracing::error!("Receive error: {}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\nShutting down...");
                break;
            }
        }
    }

    let stats = endpoint.stats();
    tracing::info!(
        received = stats.datagrams_received,
        dropped = stats.dropped,
        sent = stats.datagrams_sent,
        "Listener stopped"
    );
    Ok(())
}

/// Ping a peer `count` times
async fn run_ping(
    config: Config,
    addr: &str,
    count: u8,
    timeout: Duration,
) -> anyhow::Result<()> {
    let peer: SocketAddr = match addr.parse() {
        Ok(addr) => addr,
        Err(_) => resolve_host(addr, config.network.port)
            .await
            .with_context(|| format!("resolving {}", addr))?,
    };

    let mut endpoint_config = EndpointConfig::from(&config);
    endpoint_config.port = 0;
    let mut endpoint = Endpoint::bind(endpoint_config).await?;

    println!("PING {} from {}", peer, endpoint.local_addr());
    let mut answered = 0u32;
    for ping_id in 0..count {
        let ping = StartPingCheck {
            ping_id,
            oldest_unacked: 0,
        };
        let started = Instant::now();
        let sequence = endpoint
            .send(peer, &ping.into(), SendOptions::reliable())
            .await?;

        match wait_for_pong(&mut endpoint, peer, ping_id, timeout).await {
            Ok(()) => {
                answered += 1;
                println!(
                    "reply from {}: ping_id={} seq={} time={:.2} ms",
                    peer,
                    ping_id,
                    sequence,
                    started.elapsed().as_secs_f64() * 1000.0
                );
            }
            Err(EndpointError::Timeout) => println!("ping_id={} timed out", ping_id),
            Err(e) => return Err(e.into()),
        }
    }

    endpoint.close(peer).await?;
    println!("{} sent, {} answered", count, answered);
    Ok(())
}

async fn wait_for_pong(
    endpoint: &mut Endpoint,
    peer: SocketAddr,
    ping_id: u8,
    timeout: Duration,
) -> Result<(), EndpointError> {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(EndpointError::Timeout);
        }
        let received = endpoint.recv_timeout(remaining).await?;
        match &received.frame.message {
            AnyMessage::CompletePingCheck(pong)
                if received.addr == peer && pong.ping_id == ping_id =>
            {
                return Ok(())
            }
            other => tracing::debug!("ignoring {} from {}", other.name(), received.addr),
        }
    }
}

/// Print what a datagram contains
fn inspect(hex_input: &str, json: bool) -> anyhow::Result<()> {
    let cleaned: String = hex_input.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = hex::decode(&cleaned).context("invalid hex")?;

    let packet = Packet::parse(&bytes)?;
    let frame = Decoder::new().decode(&bytes)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&frame)?);
        return Ok(());
    }

    println!("Length:       {} bytes", bytes.len());
    println!("Flags:        {:#04x}", packet.flags());
    println!("Sequence:     {}", frame.sequence);
    println!("Reliable:     {}", frame.reliable);
    println!("Resent:       {}", frame.resent);
    println!("Zero coded:   {}", frame.zero_coded);
    println!("Extra header: {}", hex::encode(&frame.extra_header));
    println!("Acks:         {:?}", frame.acks);
    println!(
        "Message:      {} ({})",
        frame.message.name(),
        frame.message.message_type()
    );
    println!("{:#?}", frame.message);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["gridwire", "ping", "127.0.0.1:13000", "-n", "2"]).unwrap();
        match cli.command {
            Commands::Ping { addr, count, timeout_ms } => {
                assert_eq!(addr, "127.0.0.1:13000");
                assert_eq!(count, 2);
                assert_eq!(timeout_ms, 1000);
            }
            _ => panic!("expected ping"),
        }

        let cli = Cli::try_parse_from(["gridwire", "-v", "inspect", "0000", "--json"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Inspect { json: true, .. }));

        assert!(Cli::try_parse_from(["gridwire", "listen", "--port", "9000"]).is_ok());
        assert!(Cli::try_parse_from(["gridwire", "config", "--generate"]).is_ok());
    }

    #[test]
    fn test_inspect_rejects_bad_input() {
        assert!(inspect("zz", false).is_err());
        assert!(inspect("0000", false).is_err());
    }

    #[test]
    fn test_inspect_decodes_ping() {
        let mut encoder = gridwire::protocol::Encoder::new();
        let bytes = encoder
            .encode_to_bytes(
                &StartPingCheck { ping_id: 3, oldest_unacked: 1 }.into(),
                SendOptions::default(),
                &[9],
            )
            .unwrap();
        assert!(inspect(&hex::encode(&bytes), true).is_ok());
        assert!(inspect(&hex::encode(&bytes), false).is_ok());
    }
}
