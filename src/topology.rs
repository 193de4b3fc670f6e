//! Topology construction.
//!
//! The topology is the arena owning every [`Node`] and [`Link`]. It is built
//! once, before the simulation starts, and then handed to
//! [`SimulationBuilder`](crate::engine::SimulationBuilder), which takes
//! ownership and freezes it.
//!
//! # Example
//!
//! ```
//! use pktsim::link::{DataRate, LinkConfig};
//! use pktsim::topology::Topology;
//! use pktsim::types::millis;
//!
//! let mut topology = Topology::new();
//! let [server, client] = [topology.add_node(), topology.add_node()];
//! let config = LinkConfig::new(DataRate::mbps(5), millis(2));
//! topology
//!     .connect_point_to_point(server, client, config, "10.1.1.0/24".parse().unwrap())
//!     .unwrap();
//!
//! assert_eq!(topology.address_of(server, 0).unwrap().to_string(), "10.1.1.1");
//! assert_eq!(topology.address_of(client, 0).unwrap().to_string(), "10.1.1.2");
//! ```

use std::collections::{BTreeSet, HashSet};
use std::net::Ipv4Addr;

use thiserror::Error;
use tracing::debug;

use crate::address::{AddressAllocator, AddressError, Prefix};
use crate::link::{Attachment, Link, LinkConfig, LinkKind};
use crate::node::{Interface, Node};
use crate::types::{IfIndex, LinkId, NodeId};

/// Errors raised while describing a topology.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopologyError {
    #[error("topology has no nodes")]
    Empty,

    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    #[error("node {node} has no interface {iface}")]
    UnknownInterface { node: NodeId, iface: IfIndex },

    #[error("a {kind} link cannot join {count} nodes")]
    InvalidAttachmentCount { kind: LinkKind, count: usize },

    #[error("node {0} is attached twice to the same link")]
    DuplicateAttachment(NodeId),

    #[error("{nodes} nodes but {addresses} addresses given")]
    AddressCount { nodes: usize, addresses: usize },

    #[error("port {port} is already bound on node {node}")]
    PortInUse { node: NodeId, port: u16 },

    #[error("echo client on node {0} has a zero send interval")]
    ZeroInterval(NodeId),

    #[error(transparent)]
    Address(#[from] AddressError),
}

/// Result type for topology operations.
pub type TopologyResult<T> = Result<T, TopologyError>;

/// Arena of nodes and links.
#[derive(Clone, Debug, Default)]
pub struct Topology {
    nodes: Vec<Node>,
    links: Vec<Link>,
}

impl Topology {
    /// Creates an empty topology.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node named `n<id>` and returns its id.
    pub fn add_node(&mut self) -> NodeId {
        let id = self.nodes.len();
        self.add_named_node(format!("n{id}"))
    }

    /// Adds a node with an explicit name.
    pub fn add_named_node(&mut self, name: impl Into<String>) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node::new(id, name));
        id
    }

    /// Adds `count` nodes and returns their ids.
    pub fn add_nodes(&mut self, count: usize) -> Vec<NodeId> {
        (0..count).map(|_| self.add_node()).collect()
    }

    /// Joins two nodes with a point-to-point link; `a` gets host .1, `b` gets .2.
    pub fn connect_point_to_point(
        &mut self,
        a: NodeId,
        b: NodeId,
        config: LinkConfig,
        prefix: Prefix,
    ) -> TopologyResult<LinkId> {
        self.connect(LinkKind::PointToPoint, &[a, b], config, prefix)
    }

    /// Joins `nodes` on one shared-medium segment, addressed in order from `prefix`.
    pub fn connect_shared(
        &mut self,
        nodes: &[NodeId],
        config: LinkConfig,
        prefix: Prefix,
    ) -> TopologyResult<LinkId> {
        self.connect(LinkKind::SharedMedium, nodes, config, prefix)
    }

    /// Creates a link of `kind`, allocating host addresses from `prefix`.
    pub fn connect(
        &mut self,
        kind: LinkKind,
        nodes: &[NodeId],
        config: LinkConfig,
        prefix: Prefix,
    ) -> TopologyResult<LinkId> {
        let mut allocator = AddressAllocator::new(prefix);
        let addresses = nodes
            .iter()
            .map(|_| allocator.allocate())
            .collect::<Result<Vec<_>, _>>()?;
        self.connect_with_addresses(kind, nodes, config, prefix, &addresses)
    }

    /// Creates a link with explicitly assigned addresses.
    ///
    /// # Panics
    ///
    /// Panics if two attachments are given the same address: a segment with
    /// duplicate addresses is a construction defect, not a runtime condition.
    pub fn connect_with_addresses(
        &mut self,
        kind: LinkKind,
        nodes: &[NodeId],
        config: LinkConfig,
        prefix: Prefix,
        addresses: &[Ipv4Addr],
    ) -> TopologyResult<LinkId> {
        let count = nodes.len();
        if count < kind.min_attachments() || kind.max_attachments().is_some_and(|max| count > max) {
            return Err(TopologyError::InvalidAttachmentCount { kind, count });
        }
        if addresses.len() != count {
            return Err(TopologyError::AddressCount {
                nodes: count,
                addresses: addresses.len(),
            });
        }

        let mut seen = HashSet::new();
        for &node in nodes {
            if node >= self.nodes.len() {
                return Err(TopologyError::UnknownNode(node));
            }
            if !seen.insert(node) {
                return Err(TopologyError::DuplicateAttachment(node));
            }
        }
        for &address in addresses {
            if !prefix.contains(address) {
                return Err(AddressError::OutsidePrefix { address, prefix }.into());
            }
        }
        let unique: HashSet<_> = addresses.iter().collect();
        assert_eq!(
            unique.len(),
            addresses.len(),
            "duplicate address on segment {prefix}: {addresses:?}"
        );

        let id = self.links.len();
        let mut link = Link::new(id, kind, config);
        for (&node, &address) in nodes.iter().zip(addresses) {
            let iface = self.nodes[node].add_interface(address, prefix, id);
            link.attach(Attachment::new(node, iface));
        }
        self.links.push(link);

        debug!(link = id, %kind, %prefix, nodes = ?nodes, "link created");
        Ok(id)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub(crate) fn nodes_mut(&mut self) -> &mut [Node] {
        &mut self.nodes
    }

    pub fn link(&self, id: LinkId) -> Option<&Link> {
        self.links.get(id)
    }

    pub(crate) fn link_mut(&mut self, id: LinkId) -> Option<&mut Link> {
        self.links.get_mut(id)
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Interface `iface` of `node`.
    pub fn interface(&self, node: NodeId, iface: IfIndex) -> TopologyResult<&Interface> {
        self.node(node)
            .ok_or(TopologyError::UnknownNode(node))?
            .interface(iface)
            .ok_or(TopologyError::UnknownInterface { node, iface })
    }

    /// Address of interface `iface` of `node`.
    pub fn address_of(&self, node: NodeId, iface: IfIndex) -> TopologyResult<Ipv4Addr> {
        self.interface(node, iface).map(|i| i.address)
    }

    /// The interface that owns `address`, if any.
    pub fn find_address(&self, address: Ipv4Addr) -> Option<&Interface> {
        self.nodes
            .iter()
            .flat_map(|n| n.interfaces())
            .find(|i| i.address == address)
    }

    /// Every prefix in use, in ascending order.
    pub fn prefixes(&self) -> BTreeSet<Prefix> {
        self.nodes
            .iter()
            .flat_map(|n| n.interfaces())
            .map(|i| i.prefix)
            .collect()
    }

    /// Checks the topology can be simulated.
    pub fn validate(&self) -> TopologyResult<()> {
        if self.nodes.is_empty() {
            return Err(TopologyError::Empty);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::DataRate;
    use crate::types::millis;

    fn p2p() -> LinkConfig {
        LinkConfig::new(DataRate::mbps(5), millis(2))
    }

    fn prefix(s: &str) -> Prefix {
        s.parse().unwrap()
    }

    #[test]
    fn test_add_nodes() {
        let mut topology = Topology::new();
        assert!(topology.validate().is_err());
        assert_eq!(topology.add_nodes(3), vec![0, 1, 2]);
        assert_eq!(topology.node(2).unwrap().name(), "n2");
        assert_eq!(topology.add_named_node("server"), 3);
        assert!(topology.validate().is_ok());
    }

    #[test]
    fn test_shared_segment_addressing() {
        let mut topology = Topology::new();
        let nodes = topology.add_nodes(4);
        let config = LinkConfig::new(DataRate::mbps(100), 6560);
        let link = topology.connect_shared(&nodes, config, prefix("10.1.2.0/24")).unwrap();

        assert_eq!(topology.link(link).unwrap().attachments().len(), 4);
        assert_eq!(topology.address_of(3, 0).unwrap(), Ipv4Addr::new(10, 1, 2, 4));
        assert_eq!(topology.find_address(Ipv4Addr::new(10, 1, 2, 2)).unwrap().node, 1);
        assert_eq!(topology.prefixes().len(), 1);
    }

    #[test]
    fn test_interface_indices_follow_link_order() {
        let mut topology = Topology::new();
        let nodes = topology.add_nodes(3);
        topology.connect_point_to_point(nodes[0], nodes[1], p2p(), prefix("10.1.1.0/24")).unwrap();
        topology.connect_point_to_point(nodes[0], nodes[2], p2p(), prefix("10.1.2.0/24")).unwrap();

        let hub = topology.node(0).unwrap();
        assert_eq!(hub.interface_count(), 2);
        assert_eq!(hub.address(1), Some(Ipv4Addr::new(10, 1, 2, 1)));
        assert_eq!(topology.address_of(2, 0).unwrap(), Ipv4Addr::new(10, 1, 2, 2));
        assert!(matches!(
            topology.address_of(2, 1),
            Err(TopologyError::UnknownInterface { node: 2, iface: 1 })
        ));
    }

    #[test]
    fn test_invalid_links_rejected() {
        let mut topology = Topology::new();
        let nodes = topology.add_nodes(3);

        assert!(matches!(
            topology.connect(LinkKind::PointToPoint, &nodes, p2p(), prefix("10.1.1.0/24")),
            Err(TopologyError::InvalidAttachmentCount { count: 3, .. })
        ));
        assert!(matches!(
            topology.connect_shared(&[0], p2p(), prefix("10.1.1.0/24")),
            Err(TopologyError::InvalidAttachmentCount { count: 1, .. })
        ));
        assert!(matches!(
            topology.connect_point_to_point(0, 7, p2p(), prefix("10.1.1.0/24")),
            Err(TopologyError::UnknownNode(7))
        ));
        assert!(matches!(
            topology.connect_shared(&[0, 1, 0], p2p(), prefix("10.1.1.0/24")),
            Err(TopologyError::DuplicateAttachment(0))
        ));
        assert!(matches!(
            topology.connect_shared(&nodes, p2p(), prefix("10.1.1.0/31")),
            Err(TopologyError::Address(AddressError::Exhausted(_)))
        ));
        assert_eq!(topology.link_count(), 0);
    }

    #[test]
    fn test_explicit_addresses_must_fit_prefix() {
        let mut topology = Topology::new();
        let nodes = topology.add_nodes(2);
        let result = topology.connect_with_addresses(
            LinkKind::PointToPoint,
            &nodes,
            p2p(),
            prefix("10.1.1.0/24"),
            &[Ipv4Addr::new(10, 1, 1, 5), Ipv4Addr::new(10, 9, 9, 9)],
        );
        assert!(matches!(
            result,
            Err(TopologyError::Address(AddressError::OutsidePrefix { .. }))
        ));
    }

    #[test]
    #[should_panic(expected = "duplicate address")]
    fn test_duplicate_address_panics() {
        let mut topology = Topology::new();
        let nodes = topology.add_nodes(2);
        let same = Ipv4Addr::new(10, 1, 1, 5);
        let _ = topology.connect_with_addresses(
            LinkKind::PointToPoint,
            &nodes,
            p2p(),
            prefix("10.1.1.0/24"),
            &[same, same],
        );
    }
}
