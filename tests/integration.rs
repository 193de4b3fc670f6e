//! End-to-end simulations.
//!
//! These tests run complete scenarios and check the application counters:
//! - One client and one server on a point-to-point link
//! - A star of clients sending to one hub address
//! - Multi-hop paths through a shared LAN and two shared segments
//! - Lifecycle edge cases around start and stop times

use std::net::{Ipv4Addr, SocketAddrV4};

use pktsim::scenarios::{self, StarParams};
use pktsim::types::{micros, millis, seconds, SimTime};
use pktsim::{
    AppKind, DataRate, EchoClientConfig, EchoServerConfig, LinkConfig, RunReport, SimulationBuilder, StartTime,
    Topology,
};

// ============================================================================
// Helpers
// ============================================================================

/// One-way transit of a 1024-byte packet over 5 Mbps / 2 ms.
const P2P_ONE_WAY: SimTime = 3_638_400;

fn p2p() -> LinkConfig {
    LinkConfig::new(DataRate::mbps(5), millis(2))
}

/// Server on n0, client on n1, joined by one point-to-point link.
fn client_server(client: EchoClientConfig, server: EchoServerConfig, stop: SimTime) -> RunReport {
    let mut topology = Topology::new();
    let nodes = topology.add_nodes(2);
    topology
        .connect_point_to_point(nodes[0], nodes[1], p2p(), "10.1.1.0/24".parse().unwrap())
        .unwrap();

    let mut builder = SimulationBuilder::new(topology);
    builder.install_echo_server(nodes[0], server).unwrap();
    builder.install_echo_client(nodes[1], client).unwrap();
    builder.build().unwrap().run(Some(stop))
}

fn server_addr() -> SocketAddrV4 {
    SocketAddrV4::new(Ipv4Addr::new(10, 1, 1, 1), 9)
}

// ============================================================================
// Point-to-point
// ============================================================================

#[test]
fn test_single_packet_exchange() {
    let client = EchoClientConfig::new(server_addr()).with_start(StartTime::Uniform {
        min: seconds(2),
        max: seconds(7),
    });
    let report = client_server(client, EchoServerConfig::new(9), seconds(20));

    assert_eq!(report.total_received(AppKind::EchoServer), 1);
    assert_eq!(report.total_sent(AppKind::EchoClient), 1);
    assert_eq!(report.total_received(AppKind::EchoClient), 1);

    let client = report.apps_of(AppKind::EchoClient).next().unwrap();
    assert!(client.start >= seconds(2) && client.start <= seconds(7));
    assert_eq!(client.first_rtt, Some(2 * P2P_ONE_WAY));
    assert_eq!(report.drops.total(), 0);
}

#[test]
fn test_reply_timing() {
    let client = EchoClientConfig::new(server_addr()).with_start(StartTime::Fixed(seconds(2)));
    let report = client_server(client, EchoServerConfig::new(9), seconds(20));

    let client = report.apps_of(AppKind::EchoClient).next().unwrap();
    assert_eq!(client.first_rtt, Some(7_276_800));
    // Last events are the two application stops
    assert_eq!(report.final_time, seconds(20));
    assert_eq!(report.events_discarded, 0);
    // 2 starts, 2 stops, request arrival, reply arrival
    assert_eq!(report.events_processed, 6);
    assert_eq!(report.frames_transmitted, 2);
    assert_eq!(report.frames_delivered, 2);
}

#[test]
fn test_repeated_requests_until_limit() {
    let client = EchoClientConfig::new(server_addr())
        .with_start(StartTime::Fixed(seconds(2)))
        .with_interval(millis(500))
        .with_max_packets(5);
    let report = client_server(client, EchoServerConfig::new(9), seconds(20));

    let client = report.apps_of(AppKind::EchoClient).next().unwrap();
    assert_eq!(client.sent, 5);
    assert_eq!(client.received, 5);
    assert_eq!(client.bytes_sent, 5 * 1024);
    assert_eq!(client.last_rtt, client.first_rtt);
}

#[test]
fn test_unlimited_client_stops_at_stop_time() {
    let client = EchoClientConfig::new(server_addr())
        .with_start(StartTime::Fixed(seconds(2)))
        .with_max_packets(0)
        .with_stop(seconds(10));
    let report = client_server(client, EchoServerConfig::new(9), seconds(20));

    // Requests at 2..=9 s; the timer at 10 s meets the stop first
    assert_eq!(report.total_sent(AppKind::EchoClient), 8);
    assert_eq!(report.total_received(AppKind::EchoClient), 8);
}

#[test]
fn test_start_after_stop_sends_nothing() {
    let client = EchoClientConfig::new(server_addr())
        .with_start(StartTime::Fixed(seconds(15)))
        .with_stop(seconds(10));
    let report = client_server(client, EchoServerConfig::new(9), seconds(20));

    assert_eq!(report.total_sent(AppKind::EchoClient), 0);
    assert_eq!(report.total_received(AppKind::EchoServer), 0);
    assert_eq!(report.frames_transmitted, 0);
}

#[test]
fn test_server_not_started_drops_request() {
    let client = EchoClientConfig::new(server_addr()).with_start(StartTime::Fixed(seconds(2)));
    let server = EchoServerConfig::new(9).with_start(seconds(5));
    let report = client_server(client, server, seconds(20));

    assert_eq!(report.total_received(AppKind::EchoServer), 0);
    assert_eq!(report.total_received(AppKind::EchoClient), 0);
    assert_eq!(report.drops.not_listening, 1);
}

#[test]
fn test_wrong_port_is_unreachable() {
    let remote = SocketAddrV4::new(Ipv4Addr::new(10, 1, 1, 1), 7);
    let client = EchoClientConfig::new(remote).with_start(StartTime::Fixed(seconds(2)));
    let report = client_server(client, EchoServerConfig::new(9), seconds(20));

    assert_eq!(report.drops.port_unreachable, 1);
    assert_eq!(report.total_received(AppKind::EchoServer), 0);
}

#[test]
fn test_stop_time_discards_in_flight_reply() {
    let client = EchoClientConfig::new(server_addr()).with_start(StartTime::Fixed(seconds(2)));
    // Request arrives at 2 s + one way, the reply would need another one way
    let stop = seconds(2) + P2P_ONE_WAY + 1;
    let report = client_server(client, EchoServerConfig::new(9), stop);

    assert_eq!(report.total_received(AppKind::EchoServer), 1);
    assert_eq!(report.total_received(AppKind::EchoClient), 0);
    assert!(report.events_discarded > 0);
    assert_eq!(report.final_time, stop);
}

#[test]
fn test_broadcast_destination_is_not_reforwarded() {
    // n0, n1, n2 on one 100 Mbps LAN; the request goes to the directed broadcast
    let mut topology = Topology::new();
    let n = topology.add_nodes(3);
    let lan = LinkConfig::new(DataRate::mbps(100), micros(6));
    topology
        .connect_shared(&n, lan, "10.1.2.0/24".parse().unwrap())
        .unwrap();

    let mut builder = SimulationBuilder::new(topology);
    builder.install_echo_server(n[1], EchoServerConfig::new(9)).unwrap();
    let broadcast = SocketAddrV4::new(Ipv4Addr::new(10, 1, 2, 255), 9);
    builder
        .install_echo_client(
            n[0],
            EchoClientConfig::new(broadcast)
                .with_packet_size(100)
                .with_start(StartTime::Fixed(seconds(2))),
        )
        .unwrap();
    let report = builder.build().unwrap().run(Some(seconds(2) + micros(250)));

    // One transmission, both copies filtered, nothing forwarded again
    assert_eq!(report.frames_transmitted, 1);
    assert_eq!(report.frames_filtered, 2);
    assert_eq!(report.frames_delivered, 0);
    assert_eq!(report.drops.ttl_expired, 0);
    assert_eq!(report.total_received(AppKind::EchoServer), 0);
    // Server start, client start, two frame arrivals
    assert_eq!(report.events_processed, 4);
}

#[test]
fn test_zero_interval_client_cannot_be_installed() {
    let mut topology = Topology::new();
    let nodes = topology.add_nodes(2);
    topology
        .connect_point_to_point(nodes[0], nodes[1], p2p(), "10.1.1.0/24".parse().unwrap())
        .unwrap();

    let mut builder = SimulationBuilder::new(topology);
    let client = EchoClientConfig::new(server_addr()).with_interval(0).with_max_packets(0);
    assert!(builder.install_echo_client(nodes[1], client).is_err());

    // The run still terminates with nothing installed
    let report = builder.build().unwrap().run(Some(seconds(3)));
    assert_eq!(report.events_processed, 0);
}

// ============================================================================
// Preset scenarios
// ============================================================================

#[test]
fn test_star_three_clients() {
    let config = scenarios::star_with(StarParams {
        n_clients: 3,
        n_packets: 20,
        stop: std::time::Duration::from_secs(30),
        ..StarParams::default()
    })
    .unwrap();
    let report = config.run().unwrap();

    assert_eq!(report.total_received(AppKind::EchoServer), 60);
    assert_eq!(report.total_received(AppKind::EchoClient), 60);

    let server = report.apps_of(AppKind::EchoServer).next().unwrap();
    for k in 1..=3u8 {
        assert_eq!(server.received_from.get(&Ipv4Addr::new(10, 1, k, 2)), Some(&20));
    }
}

#[test]
fn test_star_leaf_routes_point_at_hub() {
    let sim = scenarios::star(3, 1).unwrap().build().unwrap();
    let topology = sim.topology();
    let hub_addr = topology.address_of(0, 0).unwrap();

    for leaf in 1..=3 {
        let node = topology.node(leaf).unwrap();
        assert_eq!(node.interface_count(), 1);
        let route = node.routes().lookup(hub_addr).unwrap();
        assert_eq!(route.iface, 0);
    }
}

#[test]
fn test_star_start_times_follow_seed() {
    let a = scenarios::star(4, 1).unwrap().run().unwrap();
    let b = scenarios::star(4, 1).unwrap().run().unwrap();
    let c = scenarios::star(4, 1).unwrap().with_seed(99).run().unwrap();

    let starts = |r: &RunReport| r.apps_of(AppKind::EchoClient).map(|a| a.start).collect::<Vec<_>>();
    assert_eq!(starts(&a), starts(&b));
    assert_ne!(starts(&a), starts(&c));
    assert!(starts(&c).iter().all(|&s| (seconds(2)..=seconds(7)).contains(&s)));
}

#[test]
fn test_lan_chain_twenty_packets() {
    let report = scenarios::lan_chain(3, 20).unwrap().run().unwrap();

    // First request at 2 s, one per second, stop at 20 s
    assert_eq!(report.total_sent(AppKind::EchoClient), 18);
    assert_eq!(report.total_received(AppKind::EchoServer), 18);
    assert_eq!(report.total_received(AppKind::EchoClient), 18);
    assert_eq!(report.drops.total(), 0);
    // Broadcast copies on the LAN reach nodes the frame is not for
    assert!(report.frames_filtered > 0);
}

#[test]
fn test_dual_lan_crosses_backbone() {
    let report = scenarios::dual_lan(3, 3).unwrap().run().unwrap();
    assert_eq!(report.total_received(AppKind::EchoServer), 3);
    assert_eq!(report.total_received(AppKind::EchoClient), 3);

    let client = report.apps_of(AppKind::EchoClient).next().unwrap();
    let server = report.apps_of(AppKind::EchoServer).next().unwrap();
    assert!(client.first_rtt.unwrap() > 2 * P2P_ONE_WAY);
    assert_eq!(server.received_from.keys().next(), Some(&Ipv4Addr::new(10, 1, 3, 4)));
}
