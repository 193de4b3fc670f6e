//! Route computation over whole topologies.

use std::net::Ipv4Addr;

use pktsim::types::millis;
use pktsim::{populate_routes, DataRate, LinkConfig, Prefix, Topology};

fn config() -> LinkConfig {
    LinkConfig::new(DataRate::mbps(5), millis(2))
}

fn prefix(s: &str) -> Prefix {
    s.parse().unwrap()
}

/// n0 --10.1.1.0-- n1 --10.1.2.0-- n2
fn chain() -> Topology {
    let mut topology = Topology::new();
    let n = topology.add_nodes(3);
    topology.connect_point_to_point(n[0], n[1], config(), prefix("10.1.1.0/24")).unwrap();
    topology.connect_point_to_point(n[1], n[2], config(), prefix("10.1.2.0/24")).unwrap();
    topology
}

#[test]
fn test_chain_routes() {
    let mut topology = chain();
    populate_routes(&mut topology);

    let n0 = topology.node(0).unwrap();
    let far = n0.routes().get(&prefix("10.1.2.0/24")).unwrap();
    assert_eq!(far.iface, 0);
    assert_eq!(far.gateway, Some(Ipv4Addr::new(10, 1, 1, 2)));
    assert_eq!(far.metric, 1);

    let n1 = topology.node(1).unwrap();
    assert_eq!(n1.routes().lookup(Ipv4Addr::new(10, 1, 2, 2)).unwrap().gateway, None);
    assert_eq!(n1.routes().lookup(Ipv4Addr::new(10, 1, 1, 1)).unwrap().iface, 0);
}

#[test]
fn test_single_interface_node_forwards_unknown_destinations() {
    let mut topology = chain();
    populate_routes(&mut topology);

    // No segment carries 192.168.0.0, so only the default route can match
    let outside = Ipv4Addr::new(192, 168, 0, 1);
    for (node, gateway) in [(0, Ipv4Addr::new(10, 1, 1, 2)), (2, Ipv4Addr::new(10, 1, 2, 1))] {
        let route = topology.node(node).unwrap().routes().lookup(outside).unwrap();
        assert!(route.prefix.is_default());
        assert_eq!(route.iface, 0);
        assert_eq!(route.gateway, Some(gateway));
    }

    // The middle node has two interfaces and no default route
    assert!(topology.node(1).unwrap().routes().lookup(outside).is_none());
}

#[test]
fn test_disconnected_prefix_is_not_routed() {
    let mut topology = chain();
    let extra = topology.add_nodes(2);
    topology
        .connect_point_to_point(extra[0], extra[1], config(), prefix("10.9.0.0/24"))
        .unwrap();
    populate_routes(&mut topology);

    let n1 = topology.node(1).unwrap();
    assert!(n1.routes().get(&prefix("10.9.0.0/24")).is_none());
    assert!(n1.routes().lookup(Ipv4Addr::new(10, 9, 0, 1)).is_none());
}

#[test]
fn test_shared_segment_routes_through_attached_router() {
    // n0 --p2p 10.1.1.0-- n1, LAN 10.1.2.0 of n1 n2 n3
    let mut topology = Topology::new();
    let n = topology.add_nodes(4);
    topology.connect_point_to_point(n[0], n[1], config(), prefix("10.1.1.0/24")).unwrap();
    topology.connect_shared(&[n[1], n[2], n[3]], config(), prefix("10.1.2.0/24")).unwrap();
    populate_routes(&mut topology);

    let n3 = topology.node(3).unwrap();
    let to_p2p = n3.routes().get(&prefix("10.1.1.0/24")).unwrap();
    assert_eq!(to_p2p.gateway, Some(Ipv4Addr::new(10, 1, 2, 1)));
    // The station's default route points at the LAN's router, not a peer station
    assert_eq!(n3.routes().default_route().unwrap().gateway, Some(Ipv4Addr::new(10, 1, 2, 1)));
}

#[test]
fn test_recomputation_is_stable() {
    let mut topology = chain();
    let first = populate_routes(&mut topology);
    let before: Vec<_> = topology.nodes().iter().map(|n| n.routes().clone()).collect();
    let second = populate_routes(&mut topology);
    let after: Vec<_> = topology.nodes().iter().map(|n| n.routes().clone()).collect();

    assert_eq!(first, second);
    assert_eq!(before, after);
}
