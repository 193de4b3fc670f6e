//! Simulated hosts and routers.
//!
//! A node owns an ordered list of interfaces, a routing table and the ids of
//! the applications installed on it. Links are referenced by id; they live in
//! the [`Topology`](crate::topology::Topology) arena and are shared by every
//! interface attached to them.

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::address::Prefix;
use crate::routing::RoutingTable;
use crate::types::{AppId, IfIndex, LinkId, NodeId};

/// A network interface: one address on one link.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    /// Owning node
    pub node: NodeId,
    /// Position within the owning node's interface list
    pub index: IfIndex,
    /// Assigned address
    pub address: Ipv4Addr,
    /// Prefix of the attached segment
    pub prefix: Prefix,
    /// Attached link
    pub link: LinkId,
}

impl Interface {
    /// Returns true if a frame tagged for `next_hop` should be accepted here.
    ///
    /// Only the interface's own address matches. Broadcast next hops are
    /// filtered, so a packet sent to a broadcast address is never re-forwarded.
    pub fn accepts(&self, next_hop: Ipv4Addr) -> bool {
        next_hop == self.address
    }
}

/// A simulated node.
#[derive(Clone, Debug)]
pub struct Node {
    id: NodeId,
    name: String,
    interfaces: Vec<Interface>,
    routes: RoutingTable,
    apps: Vec<AppId>,
}

impl Node {
    /// Creates a node with no interfaces.
    pub fn new(id: NodeId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            interfaces: Vec::new(),
            routes: RoutingTable::new(),
            apps: Vec::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Interfaces in index order.
    pub fn interfaces(&self) -> &[Interface] {
        &self.interfaces
    }

    pub fn interface(&self, index: IfIndex) -> Option<&Interface> {
        self.interfaces.get(index)
    }

    pub fn interface_count(&self) -> usize {
        self.interfaces.len()
    }

    pub fn routes(&self) -> &RoutingTable {
        &self.routes
    }

    pub(crate) fn routes_mut(&mut self) -> &mut RoutingTable {
        &mut self.routes
    }

    /// Applications installed on this node.
    pub fn apps(&self) -> &[AppId] {
        &self.apps
    }

    pub(crate) fn add_interface(&mut self, address: Ipv4Addr, prefix: Prefix, link: LinkId) -> IfIndex {
        let index = self.interfaces.len();
        self.interfaces.push(Interface {
            node: self.id,
            index,
            address,
            prefix,
            link,
        });
        index
    }

    pub(crate) fn add_app(&mut self, app: AppId) {
        self.apps.push(app);
    }

    /// Returns true if `address` is assigned to one of this node's interfaces.
    pub fn owns_address(&self, address: Ipv4Addr) -> bool {
        self.interfaces.iter().any(|i| i.address == address)
    }

    /// The interface whose prefix contains `address`, i.e. the on-link exit.
    pub fn interface_on_prefix(&self, address: Ipv4Addr) -> Option<&Interface> {
        self.interfaces.iter().find(|i| i.prefix.contains(address))
    }

    /// Address of interface `index`.
    pub fn address(&self, index: IfIndex) -> Option<Ipv4Addr> {
        self.interfaces.get(index).map(|i| i.address)
    }
}
