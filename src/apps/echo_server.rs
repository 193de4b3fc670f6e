//! Echo server: answers every request on its port with a same-size reply.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use tracing::{debug, info};

use super::AppCounters;
use crate::packet::{Packet, PacketKind};
use crate::types::{format_time, seconds, NodeId, Port, SimTime};

/// Parameters of an echo server.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EchoServerConfig {
    pub port: Port,
    pub start: SimTime,
    pub stop: SimTime,
}

impl EchoServerConfig {
    /// Listening on `port` from 1 s to 20 s.
    pub fn new(port: Port) -> Self {
        Self {
            port,
            start: seconds(1),
            stop: seconds(20),
        }
    }

    pub fn with_start(mut self, start: SimTime) -> Self {
        self.start = start;
        self
    }

    pub fn with_stop(mut self, stop: SimTime) -> Self {
        self.stop = stop;
        self
    }
}

/// Server lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServerState {
    Inactive,
    Listening,
    Stopped,
}

impl ServerState {
    pub fn name(&self) -> &'static str {
        match self {
            ServerState::Inactive => "inactive",
            ServerState::Listening => "listening",
            ServerState::Stopped => "stopped",
        }
    }
}

#[derive(Clone, Debug)]
pub struct EchoServer {
    node: NodeId,
    config: EchoServerConfig,
    state: ServerState,
    counters: AppCounters,
    received_from: BTreeMap<Ipv4Addr, u64>,
}

impl EchoServer {
    pub fn new(node: NodeId, config: EchoServerConfig) -> Self {
        Self {
            node,
            config,
            state: ServerState::Inactive,
            counters: AppCounters::default(),
            received_from: BTreeMap::new(),
        }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn port(&self) -> Port {
        self.config.port
    }

    pub fn config(&self) -> &EchoServerConfig {
        &self.config
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn counters(&self) -> &AppCounters {
        &self.counters
    }

    pub fn is_listening(&self) -> bool {
        self.state == ServerState::Listening
    }

    /// Requests received, per source address.
    pub fn received_from(&self) -> &BTreeMap<Ipv4Addr, u64> {
        &self.received_from
    }

    pub fn on_start(&mut self, now: SimTime) {
        if self.state == ServerState::Inactive {
            info!(node = self.node, port = self.config.port, time = %format_time(now), "echo server listening");
            self.state = ServerState::Listening;
        }
    }

    pub fn on_stop(&mut self, now: SimTime) {
        if self.state != ServerState::Stopped {
            info!(
                node = self.node,
                received = self.counters.received,
                time = %format_time(now),
                "echo server stopped"
            );
        }
        self.state = ServerState::Stopped;
    }

    /// Handles a request; returns the reply to send in the same instant.
    pub fn on_request(&mut self, now: SimTime, packet: &Packet) -> Option<Packet> {
        if !self.is_listening() {
            return None;
        }
        if packet.kind != PacketKind::EchoRequest {
            debug!(node = self.node, uid = packet.uid, "server ignored non-request packet");
            return None;
        }

        self.counters.record_received(packet.size);
        *self.received_from.entry(*packet.src.ip()).or_default() += 1;
        info!(
            node = self.node,
            bytes = packet.size,
            from = %packet.src,
            seq = packet.seq,
            time = %format_time(now),
            "server received request"
        );

        let reply = packet.echo_reply();
        self.counters.record_sent(reply.size);
        Some(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddrV4;

    fn request(from: Ipv4Addr) -> Packet {
        let mut p = Packet::echo_request(49153, SocketAddrV4::new(Ipv4Addr::new(10, 1, 1, 1), 9), 1024, 0, 0);
        p.src.set_ip(from);
        p
    }

    #[test]
    fn test_server_lifecycle() {
        let mut server = EchoServer::new(0, EchoServerConfig::new(9));
        assert_eq!(server.state(), ServerState::Inactive);
        assert!(server.on_request(0, &request(Ipv4Addr::new(10, 1, 1, 2))).is_none());

        server.on_start(seconds(1));
        assert!(server.is_listening());

        let reply = server.on_request(seconds(2), &request(Ipv4Addr::new(10, 1, 1, 2))).unwrap();
        assert_eq!(reply.dst, SocketAddrV4::new(Ipv4Addr::new(10, 1, 1, 2), 49153));
        assert_eq!(reply.src.port(), 9);
        assert_eq!(reply.size, 1024);

        server.on_stop(seconds(20));
        assert!(server.on_request(seconds(21), &request(Ipv4Addr::new(10, 1, 1, 2))).is_none());
        assert_eq!(server.counters().received, 1);

        // Stopped is terminal
        server.on_start(seconds(22));
        assert_eq!(server.state(), ServerState::Stopped);
    }

    #[test]
    fn test_server_tracks_sources() {
        let mut server = EchoServer::new(0, EchoServerConfig::new(9));
        server.on_start(0);
        for from in [Ipv4Addr::new(10, 1, 1, 2), Ipv4Addr::new(10, 1, 2, 2), Ipv4Addr::new(10, 1, 1, 2)] {
            server.on_request(seconds(1), &request(from));
        }
        assert_eq!(server.received_from()[&Ipv4Addr::new(10, 1, 1, 2)], 2);
        assert_eq!(server.received_from()[&Ipv4Addr::new(10, 1, 2, 2)], 1);
    }
}
