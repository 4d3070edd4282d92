//! gridwire - Packet codec for grid circuit UDP traffic
//!
//! Encodes and decodes the datagrams exchanged between a viewer and a
//! region simulator: zero run-length coding, scalar fields, the packet
//! header, piggy-backed ack trailers and tiered message identifiers.

pub mod config;
pub mod network;
pub mod protocol;
