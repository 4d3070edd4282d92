//! UDP endpoint
//!
//! Owns one socket and talks to any number of peers:
//! - Outbound packets get a per-peer sequence number and carry any acks
//!   owed to that peer
//! - Inbound datagrams are size checked and their header and ack trailer
//!   processed before the message is decoded; bad ones are logged and
//!   dropped without disturbing the receive loop
//! - Reliable inbound packets are queued for acknowledgment, even when the
//!   message type is unknown
//! - Peers that stay silent past the idle timeout are forgotten

use bytes::BytesMut;
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use super::EndpointConfig;
use crate::protocol::{
    AnyMessage, CloseCircuit, CodecError, CompletePingCheck, Decoder, Encoder, Envelope, Frame,
    Packet, PacketAck, SendOptions, MAX_ACKS,
};

/// Endpoint errors
#[derive(Error, Debug)]
pub enum EndpointError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Bind failed: {0}")]
    BindFailed(String),

    #[error("Receive timeout")]
    Timeout,

    #[error("Endpoint stopped")]
    Stopped,
}

pub type EndpointResult<T> = Result<T, EndpointError>;

/// Endpoint statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EndpointStats {
    pub datagrams_sent: u64,
    pub datagrams_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    /// Datagrams whose message failed to decode
    pub dropped: u64,
    /// Ack numbers piggy-backed or sent standalone
    pub acks_sent: u64,
    /// Ack numbers received in trailers
    pub acks_received: u64,
    /// Owed acks discarded because a peer's queue was full
    pub acks_discarded: u64,
    /// Automatic replies that could not be sent
    pub replies_failed: u64,
    pub peers_evicted: u64,
}

/// A decoded datagram and its sender
#[derive(Debug, Clone, PartialEq)]
pub struct Received {
    pub addr: SocketAddr,
    pub frame: Frame,
}

/// What the endpoint tracks per peer
struct Peer {
    encoder: Encoder,
    pending_acks: VecDeque<u32>,
    last_activity: Instant,
}

impl Peer {
    fn new(config: &EndpointConfig) -> Self {
        Self {
            encoder: Encoder::new()
                .with_capacity(config.packet_capacity)
                .with_zero_coding(config.zero_coding),
            pending_acks: VecDeque::new(),
            last_activity: Instant::now(),
        }
    }

    /// Queue an ack, dropping the oldest past `limit`. Returns how many
    /// were dropped.
    fn queue_ack(&mut self, sequence: u32, limit: usize) -> u64 {
        self.pending_acks.push_back(sequence);
        let mut dropped = 0;
        while self.pending_acks.len() > limit {
            self.pending_acks.pop_front();
            dropped += 1;
        }
        dropped
    }
}

/// An encoded packet waiting for the socket
struct Outgoing {
    packet: Packet,
    sequence: u32,
    acks: Vec<u32>,
}

/// A UDP endpoint speaking the circuit protocol
pub struct Endpoint {
    socket: UdpSocket,
    local_addr: SocketAddr,
    config: EndpointConfig,
    decoder: Decoder<'static>,
    peers: HashMap<SocketAddr, Peer>,
    recv_buf: BytesMut,
    stats: EndpointStats,
    last_sweep: Instant,
}

impl Endpoint {
    /// Bind a socket as described by `config`
    pub async fn bind(mut config: EndpointConfig) -> EndpointResult<Self> {
        config.max_acks_per_packet = config.max_acks_per_packet.clamp(1, MAX_ACKS);
        config.max_pending_acks = config.max_pending_acks.max(1);

        let bind_addr = config.bind_string();
        let socket = UdpSocket::bind(&bind_addr).await.map_err(|e| {
            EndpointError::BindFailed(format!("Failed to bind to {}: {}", bind_addr, e))
        })?;
        let local_addr = socket.local_addr()?;
        tracing::info!("Endpoint listening on {}", local_addr);

        let mut recv_buf = BytesMut::with_capacity(config.recv_buffer_size);
        recv_buf.resize(config.recv_buffer_size, 0);

        Ok(Self {
            socket,
            local_addr,
            config,
            decoder: Decoder::new(),
            peers: HashMap::new(),
            recv_buf,
            stats: EndpointStats::default(),
            last_sweep: Instant::now(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stats(&self) -> &EndpointStats {
        &self.stats
    }

    /// Number of peers currently tracked
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Acks owed to `addr` that have not been sent yet
    pub fn pending_acks(&self, addr: &SocketAddr) -> usize {
        self.peers.get(addr).map_or(0, |p| p.pending_acks.len())
    }

    /// Time since `addr` last sent or received anything
    pub fn idle_time(&self, addr: &SocketAddr) -> Option<Duration> {
        self.peers.get(addr).map(|p| p.last_activity.elapsed())
    }

    /// Encode `message` for `addr`, taking up to a packet's worth of owed acks.
    fn prepare(
        &mut self,
        addr: SocketAddr,
        message: &AnyMessage,
        options: SendOptions,
    ) -> EndpointResult<Outgoing> {
        let config = &self.config;
        let peer = self.peers.entry(addr).or_insert_with(|| Peer::new(config));

        let acks: Vec<u32> = peer
            .pending_acks
            .iter()
            .take(config.max_acks_per_packet)
            .copied()
            .collect();
        let sequence = peer.encoder.next_sequence();
        let packet = peer.encoder.encode(message, options, &acks)?;
        peer.pending_acks.drain(..acks.len());
        peer.last_activity = Instant::now();

        Ok(Outgoing {
            packet,
            sequence,
            acks,
        })
    }

    /// Put acks back at the front of the queue after a failed transmit.
    fn requeue_acks(&mut self, addr: SocketAddr, acks: &[u32]) {
        if let Some(peer) = self.peers.get_mut(&addr) {
            for &ack in acks.iter().rev() {
                peer.pending_acks.push_front(ack);
            }
        }
    }

    fn record_sent(&mut self, addr: SocketAddr, message: &AnyMessage, out: &Outgoing) {
        self.stats.datagrams_sent += 1;
        self.stats.bytes_sent += out.packet.len() as u64;
        self.stats.acks_sent += out.acks.len() as u64;
        tracing::debug!(
            %addr,
            sequence = out.sequence,
            message = message.name(),
            acks = out.acks.len(),
            "sent"
        );
    }

    /// Send a message, piggy-backing acks owed to the peer.
    ///
    /// Returns the sequence number the packet was sent with.
    pub async fn send(
        &mut self,
        addr: SocketAddr,
        message: &AnyMessage,
        options: SendOptions,
    ) -> EndpointResult<u32> {
        let out = self.prepare(addr, message, options)?;
        if let Err(e) = self.socket.send_to(out.packet.as_bytes(), addr).await {
            self.requeue_acks(addr, &out.acks);
            return Err(e.into());
        }
        self.record_sent(addr, message, &out);
        Ok(out.sequence)
    }

    /// Like [`Endpoint::send`], but never waits for the socket.
    fn try_send(
        &mut self,
        addr: SocketAddr,
        message: &AnyMessage,
        options: SendOptions,
    ) -> EndpointResult<u32> {
        let out = self.prepare(addr, message, options)?;
        if let Err(e) = self.socket.try_send_to(out.packet.as_bytes(), addr) {
            self.requeue_acks(addr, &out.acks);
            return Err(e.into());
        }
        self.record_sent(addr, message, &out);
        Ok(out.sequence)
    }

    /// Send every owed ack to `addr` in standalone PacketAck messages.
    pub async fn flush_acks(&mut self, addr: SocketAddr) -> EndpointResult<()> {
        let limit = self.config.max_acks_per_packet;
        loop {
            let packets: Vec<u32> = match self.peers.get_mut(&addr) {
                Some(peer) => {
                    let n = peer.pending_acks.len().min(limit);
                    if n == 0 {
                        return Ok(());
                    }
                    peer.pending_acks.drain(..n).collect()
                }
                None => return Ok(()),
            };
            let message: AnyMessage = PacketAck {
                packets: packets.clone(),
            }
            .into();
            if let Err(e) = self.send(addr, &message, SendOptions::default()).await {
                self.requeue_acks(addr, &packets);
                return Err(e);
            }
            self.stats.acks_sent += packets.len() as u64;
        }
    }

    /// Tell `addr` the circuit is closing and forget it.
    pub async fn close(&mut self, addr: SocketAddr) -> EndpointResult<()> {
        self.flush_acks(addr).await?;
        self.send(addr, &CloseCircuit.into(), SendOptions::default())
            .await?;
        self.peers.remove(&addr);
        Ok(())
    }

    /// Forget peers idle for longer than the configured timeout.
    ///
    /// Returns how many were removed. Also runs on its own from `recv`.
    pub fn evict_idle(&mut self) -> usize {
        let timeout = self.config.peer_idle_timeout;
        let before = self.peers.len();
        self.peers.retain(|addr, peer| {
            let keep = peer.last_activity.elapsed() <= timeout;
            if !keep {
                tracing::debug!(%addr, pending = peer.pending_acks.len(), "evicting idle peer");
            }
            keep
        });
        self.last_sweep = Instant::now();

        let evicted = before - self.peers.len();
        self.stats.peers_evicted += evicted as u64;
        evicted
    }

    fn maybe_evict_idle(&mut self) {
        if self.last_sweep.elapsed() >= self.config.peer_idle_timeout / 2 {
            self.evict_idle();
        }
    }

    /// Receive the next datagram that decodes.
    ///
    /// Datagrams that fail to decode are logged, counted in
    /// [`EndpointStats::dropped`] and skipped. Once a datagram is off the
    /// socket nothing awaits, so cancelling this future never loses a
    /// decoded frame.
    pub async fn recv(&mut self) -> EndpointResult<Received> {
        loop {
            let (n, addr) = self.socket.recv_from(&mut self.recv_buf[..]).await?;
            self.stats.datagrams_received += 1;
            self.stats.bytes_received += n as u64;

            let (envelope, mut packet) = match self.decoder.open(&self.recv_buf[..n]) {
                Ok(opened) => opened,
                Err(e) => {
                    self.stats.dropped += 1;
                    tracing::debug!(%addr, error = %e, "dropping datagram");
                    continue;
                }
            };
            self.accept_envelope(addr, &envelope);
            self.maybe_evict_idle();

            let message = match self.decoder.decode_message(&mut packet) {
                Ok(message) => message,
                Err(e) => {
                    self.stats.dropped += 1;
                    match e {
                        CodecError::UnknownMessageType(message_type) => {
                            tracing::warn!(%addr, %message_type, "dropping unknown message")
                        }
                        other => tracing::debug!(%addr, error = %other, "dropping message"),
                    }
                    continue;
                }
            };

            let frame = envelope.into_frame(message);
            tracing::debug!(
                %addr,
                sequence = frame.sequence,
                message = frame.message.name(),
                acks = frame.acks.len(),
                "received"
            );
            self.answer(addr, &frame);
            return Ok(Received { addr, frame });
        }
    }

    /// Receive with a timeout
    pub async fn recv_timeout(&mut self, timeout: Duration) -> EndpointResult<Received> {
        match tokio::time::timeout(timeout, self.recv()).await {
            Ok(result) => result,
            Err(_) => Err(EndpointError::Timeout),
        }
    }

    /// Header bookkeeping that applies whether or not the message decodes.
    fn accept_envelope(&mut self, addr: SocketAddr, envelope: &Envelope) {
        let config = &self.config;
        let peer = self.peers.entry(addr).or_insert_with(|| Peer::new(config));
        peer.last_activity = Instant::now();
        if envelope.reliable {
            let dropped = peer.queue_ack(envelope.sequence, config.max_pending_acks);
            if dropped > 0 {
                tracing::debug!(%addr, dropped, "ack queue full");
                self.stats.acks_discarded += dropped;
            }
        }
        self.stats.acks_received += envelope.acks.len() as u64;
    }

    /// Automatic replies. Failures are counted, never returned.
    fn answer(&mut self, addr: SocketAddr, frame: &Frame) {
        let AnyMessage::StartPingCheck(ping) = &frame.message else {
            return;
        };
        if !self.config.reply_to_pings {
            return;
        }

        let pong: AnyMessage = CompletePingCheck {
            ping_id: ping.ping_id,
        }
        .into();
        if let Err(e) = self.try_send(addr, &pong, SendOptions::default()) {
            self.stats.replies_failed += 1;
            tracing::warn!(%addr, error = %e, "ping reply failed");
        }
    }

    /// Run the receive loop on a task.
    pub fn spawn(self) -> EndpointHandle {
        let local_addr = self.local_addr;
        let (event_tx, event_rx) = mpsc::channel(256);
        let (outbound_tx, outbound_rx) = mpsc::channel(256);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        tokio::spawn(run_loop(self, event_tx, outbound_rx, shutdown_rx));

        EndpointHandle {
            local_addr,
            outbound: outbound_tx,
            shutdown_tx: Some(shutdown_tx),
            event_rx: Some(event_rx),
        }
    }
}

/// Events emitted by a spawned endpoint
#[derive(Debug, Clone)]
pub enum EndpointEvent {
    Started { local_addr: SocketAddr },
    MessageReceived { addr: SocketAddr, frame: Frame },
    Error { message: String },
    Stopped { stats: EndpointStats },
}

struct Outbound {
    addr: SocketAddr,
    message: AnyMessage,
    options: SendOptions,
}

/// A handle to a spawned endpoint
pub struct EndpointHandle {
    local_addr: SocketAddr,
    outbound: mpsc::Sender<Outbound>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    event_rx: Option<mpsc::Receiver<EndpointEvent>>,
}

impl EndpointHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Take the event receiver (can only be called once)
    pub fn take_event_receiver(&mut self) -> Option<mpsc::Receiver<EndpointEvent>> {
        self.event_rx.take()
    }

    /// Queue a message for sending
    pub async fn send(
        &self,
        addr: SocketAddr,
        message: AnyMessage,
        options: SendOptions,
    ) -> EndpointResult<()> {
        self.outbound
            .send(Outbound {
                addr,
                message,
                options,
            })
            .await
            .map_err(|_| EndpointError::Stopped)
    }

    /// Stop the receive loop
    pub async fn stop(&mut self) -> EndpointResult<()> {
        match self.shutdown_tx.take() {
            Some(tx) => tx.send(()).await.map_err(|_| EndpointError::Stopped),
            None => Err(EndpointError::Stopped),
        }
    }
}

async fn run_loop(
    mut endpoint: Endpoint,
    event_tx: mpsc::Sender<EndpointEvent>,
    mut outbound_rx: mpsc::Receiver<Outbound>,
    mut shutdown_rx: mpsc::Receiver<()>,
) {
    let _ = event_tx
        .send(EndpointEvent::Started {
            local_addr: endpoint.local_addr,
        })
        .await;

    loop {
        tokio::select! {
            result = endpoint.recv() => {
                match result {
                    Ok(Received { addr, frame }) => {
                        let _ = event_tx.send(EndpointEvent::MessageReceived { addr, frame }).await;
                    }
                    Err(e) => {
                        tracing::error!("Receive error: {}", e);
                        let _ = event_tx.send(EndpointEvent::Error { message: e.to_string() }).await;
                    }
                }
            }
            Some(out) = outbound_rx.recv() => {
                if let Err(e) = endpoint.send(out.addr, &out.message, out.options).await {
                    tracing::error!("Send error to {}: {}", out.addr, e);
                    let _ = event_tx.send(EndpointEvent::Error { message: e.to_string() }).await;
                }
            }
            _ = shutdown_rx.recv() => {
                tracing::info!("Endpoint shutdown requested");
                break;
            }
        }
    }

    let _ = event_tx
        .send(EndpointEvent::Stopped {
            stats: endpoint.stats.clone(),
        })
        .await;
}
