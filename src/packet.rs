//! Packets and link-layer frames.
//!
//! A [`Packet`] is the datagram an application hands to its node's network
//! layer. On the wire it travels inside a [`Frame`], which additionally names
//! the next hop so that receivers on a shared medium can tell whether the
//! copy they received is addressed to them.

use std::net::{Ipv4Addr, SocketAddrV4};

use serde::{Deserialize, Serialize};

use crate::types::SimTime;

/// Initial time-to-live for every new packet.
pub const DEFAULT_TTL: u8 = 64;

/// What an echo packet is carrying.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PacketKind {
    /// Sent by a client towards a server
    EchoRequest,
    /// Sent back by a server
    EchoReply,
}

/// A datagram travelling through the simulated network.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    /// Unique id assigned when the packet enters the network layer
    pub uid: u64,
    /// Source address and port. An unspecified IP is filled in with the
    /// outgoing interface's address on send.
    pub src: SocketAddrV4,
    /// Destination address and port
    pub dst: SocketAddrV4,
    /// Payload size in bytes; also the on-wire size used for serialization delay
    pub size: u32,
    /// Application sequence number
    pub seq: u32,
    /// Time the original request was sent (carried through echo replies)
    pub sent_at: SimTime,
    /// Remaining hops before the packet is discarded
    pub ttl: u8,
    /// Request or reply
    pub kind: PacketKind,
}

impl Packet {
    /// Creates an echo request with an unspecified source address.
    pub fn echo_request(src_port: u16, dst: SocketAddrV4, size: u32, seq: u32, now: SimTime) -> Self {
        Self {
            uid: 0,
            src: SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, src_port),
            dst,
            size,
            seq,
            sent_at: now,
            ttl: DEFAULT_TTL,
            kind: PacketKind::EchoRequest,
        }
    }

    /// Builds the reply to this packet: addresses swapped, payload preserved.
    pub fn echo_reply(&self) -> Self {
        Self {
            uid: 0,
            src: self.dst,
            dst: self.src,
            size: self.size,
            seq: self.seq,
            sent_at: self.sent_at,
            ttl: DEFAULT_TTL,
            kind: PacketKind::EchoReply,
        }
    }
}

/// A packet on a link, tagged with the address of the hop that should accept it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    /// Address of the receiving interface
    pub next_hop: Ipv4Addr,
    /// The encapsulated packet
    pub packet: Packet,
}

impl Frame {
    pub fn new(next_hop: Ipv4Addr, packet: Packet) -> Self {
        Self { next_hop, packet }
    }

    /// Number of bytes this frame occupies on the wire.
    pub fn wire_size(&self) -> u32 {
        self.packet.size
    }
}
