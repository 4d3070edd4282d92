//! Network module - Carries packets over UDP
//!
//! Provides:
//! - An endpoint that encodes, sends, receives and decodes datagrams
//! - Per-peer outbound sequence numbers and piggy-backed acks
//! - A spawned receive loop with an event channel
//!
//! Resend timers and congestion control live above this layer.

mod endpoint;

pub use endpoint::*;

use std::net::SocketAddr;
use std::time::Duration;

use crate::config::Config;
use crate::protocol::{ZeroCoding, MAX_ACKS, MAX_PACKET_SIZE};

/// Configuration for an endpoint
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Address to bind to
    pub bind_address: String,
    /// Port to bind to (0 picks a free port)
    pub port: u16,
    /// Largest datagram accepted
    pub recv_buffer_size: usize,
    /// Physical capacity of outbound packets
    pub packet_capacity: usize,
    /// Most acks piggy-backed on one outbound packet
    pub max_acks_per_packet: usize,
    pub zero_coding: ZeroCoding,
    /// Answer StartPingCheck automatically
    pub reply_to_pings: bool,
    /// Most unsent acks kept per peer
    pub max_pending_acks: usize,
    /// Peers silent for longer than this are forgotten
    pub peer_idle_timeout: Duration,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: crate::protocol::DEFAULT_PORT,
            recv_buffer_size: MAX_PACKET_SIZE,
            packet_capacity: MAX_PACKET_SIZE,
            max_acks_per_packet: MAX_ACKS,
            zero_coding: ZeroCoding::Auto,
            reply_to_pings: true,
            max_pending_acks: 1024,
            peer_idle_timeout: Duration::from_secs(60),
        }
    }
}

impl EndpointConfig {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    /// Loopback endpoint on a free port
    pub fn loopback() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 0,
            ..Default::default()
        }
    }

    pub fn bind_string(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

impl From<&Config> for EndpointConfig {
    fn from(config: &Config) -> Self {
        Self {
            bind_address: config.network.bind_address.clone(),
            port: config.network.port,
            recv_buffer_size: config.network.recv_buffer_size,
            packet_capacity: config.codec.buffer_size,
            max_acks_per_packet: config.codec.max_acks_per_packet.clamp(1, MAX_ACKS),
            zero_coding: config.codec.zero_coding,
            reply_to_pings: config.network.reply_to_pings,
            max_pending_acks: config.network.max_pending_acks.max(1),
            peer_idle_timeout: Duration::from_secs(config.network.peer_idle_timeout_secs),
        }
    }
}

/// Resolve a hostname to a socket address
pub async fn resolve_host(host: &str, port: u16) -> std::io::Result<SocketAddr> {
    use tokio::net::lookup_host;

    let addr_string = if host.contains(':') {
        host.to_string()
    } else {
        format!("{}:{}", host, port)
    };
    let mut addrs = lookup_host(&addr_string).await?;

    addrs.next().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Could not resolve host: {}", host),
        )
    })
}
