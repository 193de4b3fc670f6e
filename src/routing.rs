//! Routing tables and global route computation.
//!
//! [`populate_routes`] treats the frozen topology as an undirected graph of
//! nodes and runs a breadth-first search from every node. Each node's table
//! gets:
//!
//! - a connected route (no gateway) for every prefix it has an interface on,
//! - a route via the BFS first hop for every other reachable prefix,
//! - a default route out of its only interface when it has exactly one.
//!
//! Neighbours are explored in interface-index order, so among equal-length
//! paths the one leaving through the lowest interface index wins. Prefixes
//! that cannot be reached are left out of the table; packets for them are
//! dropped by the sending node.

use std::collections::{BTreeMap, VecDeque};
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::address::Prefix;
use crate::link::{Attachment, LinkKind};
use crate::topology::Topology;
use crate::types::{IfIndex, NodeId};

/// One routing table entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Destination prefix
    pub prefix: Prefix,
    /// Outgoing interface
    pub iface: IfIndex,
    /// Next-hop address; `None` means the destination is on-link
    pub gateway: Option<Ipv4Addr>,
    /// Hop count to the destination segment
    pub metric: u32,
}

impl Route {
    /// Address the frame should be tagged with when sending to `dst`.
    pub fn next_hop(&self, dst: Ipv4Addr) -> Ipv4Addr {
        self.gateway.unwrap_or(dst)
    }
}

/// A node's forwarding table, keyed by prefix.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RoutingTable {
    routes: BTreeMap<Prefix, Route>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the route for `route.prefix`.
    pub fn insert(&mut self, route: Route) -> Option<Route> {
        self.routes.insert(route.prefix, route)
    }

    /// Exact-prefix lookup.
    pub fn get(&self, prefix: &Prefix) -> Option<&Route> {
        self.routes.get(prefix)
    }

    /// Longest-prefix match for `dst`.
    pub fn lookup(&self, dst: Ipv4Addr) -> Option<&Route> {
        self.routes
            .values()
            .filter(|r| r.prefix.contains(dst))
            .max_by_key(|r| r.prefix.prefix_len())
    }

    /// The `0.0.0.0/0` entry, if installed.
    pub fn default_route(&self) -> Option<&Route> {
        self.routes.get(&Prefix::DEFAULT)
    }

    /// Routes in ascending prefix order.
    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.routes.values()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn clear(&mut self) {
        self.routes.clear();
    }
}

/// An edge of the node graph as seen from one side.
#[derive(Clone, Copy, Debug)]
struct Neighbor {
    node: NodeId,
    via: IfIndex,
    address: Ipv4Addr,
}

/// Neighbours of every node, ordered by (outgoing interface, attachment order).
fn adjacency(topology: &Topology) -> Vec<Vec<Neighbor>> {
    topology
        .nodes()
        .iter()
        .map(|node| {
            let mut neighbors = Vec::new();
            for iface in node.interfaces() {
                let Some(link) = topology.link(iface.link) else {
                    continue;
                };
                for peer in link.receivers(Attachment::new(node.id(), iface.index)) {
                    if let Ok(peer_iface) = topology.interface(peer.node, peer.iface) {
                        neighbors.push(Neighbor {
                            node: peer.node,
                            via: iface.index,
                            address: peer_iface.address,
                        });
                    }
                }
            }
            neighbors
        })
        .collect()
}

/// BFS from `source`: hop distance and first hop toward every node.
fn shortest_paths(
    source: NodeId,
    adjacency: &[Vec<Neighbor>],
) -> (Vec<Option<u32>>, Vec<Option<Neighbor>>) {
    let mut dist = vec![None; adjacency.len()];
    let mut first_hop: Vec<Option<Neighbor>> = vec![None; adjacency.len()];
    let mut queue = VecDeque::new();

    dist[source] = Some(0);
    queue.push_back(source);
    while let Some(current) = queue.pop_front() {
        let hops = dist[current].unwrap_or(0);
        for neighbor in &adjacency[current] {
            if dist[neighbor.node].is_some() {
                continue;
            }
            dist[neighbor.node] = Some(hops + 1);
            first_hop[neighbor.node] = if current == source {
                Some(*neighbor)
            } else {
                first_hop[current]
            };
            queue.push_back(neighbor.node);
        }
    }
    (dist, first_hop)
}

/// Gateway for the single-exit default route of a one-interface node.
///
/// The peer on a point-to-point link; on a shared medium, the first attached
/// node that has more than one interface (the segment's router), if any.
fn single_exit_gateway(topology: &Topology, node: NodeId) -> Option<Ipv4Addr> {
    let iface = topology.interface(node, 0).ok()?;
    let link = topology.link(iface.link)?;
    let me = Attachment::new(node, 0);
    let gateway = match link.kind() {
        LinkKind::PointToPoint => link.peer_of(me),
        LinkKind::SharedMedium => link.receivers(me).find(|peer| {
            topology
                .node(peer.node)
                .is_some_and(|n| n.interface_count() > 1)
        }),
    }?;
    topology.address_of(gateway.node, gateway.iface).ok()
}

/// Computes every node's routing table from scratch.
///
/// Existing tables are cleared first, so calling this twice on an unchanged
/// topology yields identical tables. Returns the total number of routes
/// installed.
pub fn populate_routes(topology: &mut Topology) -> usize {
    let adjacency = adjacency(topology);

    // Nodes attached to each prefix, in node order
    let mut owners: BTreeMap<Prefix, Vec<NodeId>> = BTreeMap::new();
    for node in topology.nodes() {
        for iface in node.interfaces() {
            owners.entry(iface.prefix).or_default().push(node.id());
        }
    }

    let mut tables = Vec::with_capacity(topology.node_count());
    for node in topology.nodes() {
        let (dist, first_hop) = shortest_paths(node.id(), &adjacency);
        let mut table = RoutingTable::new();

        for (prefix, attached) in &owners {
            if let Some(iface) = node.interfaces().iter().find(|i| i.prefix == *prefix) {
                table.insert(Route {
                    prefix: *prefix,
                    iface: iface.index,
                    gateway: None,
                    metric: 0,
                });
                continue;
            }

            // Equidistant owners: the one reached through the lowest interface
            let nearest = attached
                .iter()
                .filter_map(|&owner| Some((dist[owner]?, first_hop[owner]?, owner)))
                .min_by_key(|&(hops, hop, owner)| (hops, hop.via, owner));
            let Some((hops, hop, _)) = nearest else {
                debug!(node = node.id(), %prefix, "prefix unreachable, no route installed");
                continue;
            };
            table.insert(Route {
                prefix: *prefix,
                iface: hop.via,
                gateway: Some(hop.address),
                metric: hops,
            });
        }

        if node.interface_count() == 1 {
            table.insert(Route {
                prefix: Prefix::DEFAULT,
                iface: 0,
                gateway: single_exit_gateway(topology, node.id()),
                metric: 1,
            });
        }

        tables.push(table);
    }

    let mut installed = 0;
    for (node, table) in topology.nodes_mut().iter_mut().zip(tables) {
        debug!(node = node.id(), routes = table.len(), "routing table populated");
        installed += table.len();
        *node.routes_mut() = table;
    }
    info!(nodes = topology.node_count(), routes = installed, "routes populated");
    installed
}
