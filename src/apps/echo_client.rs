//! Echo client: sends fixed-size requests on a timer and measures round trips.

use std::net::SocketAddrV4;

use tracing::{debug, info};

use super::{AppCounters, StartTime};
use crate::packet::{Packet, PacketKind};
use crate::types::{format_time, seconds, NodeId, Port, SimTime};

/// Parameters of an echo client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EchoClientConfig {
    /// Server address and port
    pub remote: SocketAddrV4,
    /// Time between consecutive requests
    pub interval: SimTime,
    /// Request payload size in bytes
    pub packet_size: u32,
    /// Number of requests to send; 0 means no limit
    pub max_packets: u32,
    pub start: StartTime,
    pub stop: SimTime,
}

impl EchoClientConfig {
    /// One 1024-byte request per second, a single packet, running 0-20 s.
    pub fn new(remote: SocketAddrV4) -> Self {
        Self {
            remote,
            interval: seconds(1),
            packet_size: 1024,
            max_packets: 1,
            start: StartTime::Fixed(0),
            stop: seconds(20),
        }
    }

    pub fn with_interval(mut self, interval: SimTime) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_packet_size(mut self, size: u32) -> Self {
        self.packet_size = size;
        self
    }

    pub fn with_max_packets(mut self, max: u32) -> Self {
        self.max_packets = max;
        self
    }

    pub fn with_start(mut self, start: StartTime) -> Self {
        self.start = start;
        self
    }

    pub fn with_stop(mut self, stop: SimTime) -> Self {
        self.stop = stop;
        self
    }
}

/// Client lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientState {
    Inactive,
    Sending,
    Done,
}

impl ClientState {
    pub fn name(&self) -> &'static str {
        match self {
            ClientState::Inactive => "inactive",
            ClientState::Sending => "sending",
            ClientState::Done => "done",
        }
    }
}

/// An echo client bound to an ephemeral port on its node.
#[derive(Clone, Debug)]
pub struct EchoClient {
    node: NodeId,
    local_port: Port,
    config: EchoClientConfig,
    start_time: SimTime,
    state: ClientState,
    stopped: bool,
    next_seq: u32,
    counters: AppCounters,
}

impl EchoClient {
    /// Creates an inactive client; `start_time` is the already sampled start.
    pub fn new(node: NodeId, local_port: Port, config: EchoClientConfig, start_time: SimTime) -> Self {
        Self {
            node,
            local_port,
            config,
            start_time,
            state: ClientState::Inactive,
            stopped: false,
            next_seq: 0,
            counters: AppCounters::default(),
        }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn local_port(&self) -> Port {
        self.local_port
    }

    pub fn config(&self) -> &EchoClientConfig {
        &self.config
    }

    pub fn start_time(&self) -> SimTime {
        self.start_time
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn counters(&self) -> &AppCounters {
        &self.counters
    }

    /// Replies are accepted from start until the stop event.
    pub fn is_receiving(&self) -> bool {
        self.state != ClientState::Inactive && !self.stopped
    }

    /// Start event. Returns the first request, if the client may still send.
    pub fn on_start(&mut self, now: SimTime) -> Option<Packet> {
        if self.state != ClientState::Inactive || self.stopped {
            return None;
        }
        if now >= self.config.stop {
            debug!(node = self.node, time = %format_time(now), "client start at or after stop, nothing sent");
            self.state = ClientState::Done;
            return None;
        }
        info!(node = self.node, port = self.local_port, time = %format_time(now), "echo client started");
        self.state = ClientState::Sending;
        self.next_request(now)
    }

    /// Timer event. Stale timers after stop are no-ops.
    pub fn on_timer(&mut self, now: SimTime) -> Option<Packet> {
        if self.state != ClientState::Sending {
            return None;
        }
        if now >= self.config.stop {
            self.state = ClientState::Done;
            return None;
        }
        self.next_request(now)
    }

    /// Stop event.
    pub fn on_stop(&mut self, now: SimTime) {
        if !self.stopped {
            info!(
                node = self.node,
                sent = self.counters.sent,
                received = self.counters.received,
                time = %format_time(now),
                "echo client stopped"
            );
        }
        self.stopped = true;
        self.state = ClientState::Done;
    }

    /// A reply arrived. Counted only; the send schedule is unaffected.
    pub fn on_reply(&mut self, now: SimTime, packet: &Packet) {
        if packet.kind != PacketKind::EchoReply {
            debug!(node = self.node, uid = packet.uid, "client ignored non-reply packet");
            return;
        }
        let rtt = now.saturating_sub(packet.sent_at);
        self.counters.record_received(packet.size);
        self.counters.record_rtt(rtt);
        info!(
            node = self.node,
            bytes = packet.size,
            from = %packet.src,
            seq = packet.seq,
            rtt,
            time = %format_time(now),
            "client received reply"
        );
    }

    /// Whether another timer should be armed after a send.
    pub fn wants_timer(&self) -> bool {
        self.state == ClientState::Sending
    }

    fn next_request(&mut self, now: SimTime) -> Option<Packet> {
        let packet = Packet::echo_request(
            self.local_port,
            self.config.remote,
            self.config.packet_size,
            self.next_seq,
            now,
        );
        self.next_seq += 1;
        self.counters.record_sent(packet.size);
        info!(
            node = self.node,
            bytes = packet.size,
            dst = %self.config.remote,
            seq = packet.seq,
            time = %format_time(now),
            "client sent request"
        );

        let limit = u64::from(self.config.max_packets);
        if limit > 0 && self.counters.sent >= limit {
            self.state = ClientState::Done;
        }
        Some(packet)
    }
}
