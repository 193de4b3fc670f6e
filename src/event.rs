//! Event definitions for the simulation framework.
//!
//! Events carry a timestamp, an insertion sequence number and a payload
//! naming the entity that handles them. The scheduler orders them by
//! `(time, seq)`, so equal-time events run in the order they were scheduled.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::packet::{Frame, Packet};
use crate::types::{AppId, IfIndex, LinkId, NodeId, SimTime};

/// A scheduled event.
///
/// Equality and ordering only consider `(time, seq)`; the payload does not
/// take part in comparisons.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Event {
    /// The simulation time at which this event occurs
    pub time: SimTime,
    /// Insertion sequence number, unique per scheduler
    pub seq: u64,
    /// What happens when the event is dispatched
    pub payload: EventPayload,
}

impl Event {
    /// Creates a new event with the given time, sequence number and payload.
    pub fn new(time: SimTime, seq: u64, payload: EventPayload) -> Self {
        Self { time, seq, payload }
    }

    fn key(&self) -> (SimTime, u64) {
        (self.time, self.seq)
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Event {}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The payload of an event.
///
/// The variant set is closed: frames arriving at an interface, local
/// deliveries, and the three application lifecycle events.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum EventPayload {
    /// A frame reaches an interface attached to `link`.
    FrameArrival {
        link: LinkId,
        node: NodeId,
        iface: IfIndex,
        frame: Frame,
    },

    /// A packet addressed to the sending node itself.
    Loopback { node: NodeId, packet: Packet },

    /// An application's start time has been reached.
    AppStart { app: AppId },

    /// An application's stop time has been reached.
    AppStop { app: AppId },

    /// An application's periodic timer fired.
    AppTimer { app: AppId },
}

impl EventPayload {
    /// Returns the node this event is delivered to, if it targets a node.
    pub fn target_node(&self) -> Option<NodeId> {
        match self {
            EventPayload::FrameArrival { node, .. } | EventPayload::Loopback { node, .. } => {
                Some(*node)
            }
            _ => None,
        }
    }

    /// Returns the application this event is delivered to, if any.
    pub fn target_app(&self) -> Option<AppId> {
        match self {
            EventPayload::AppStart { app }
            | EventPayload::AppStop { app }
            | EventPayload::AppTimer { app } => Some(*app),
            _ => None,
        }
    }

    /// Short name used in log output.
    pub fn name(&self) -> &'static str {
        match self {
            EventPayload::FrameArrival { .. } => "frame_arrival",
            EventPayload::Loopback { .. } => "loopback",
            EventPayload::AppStart { .. } => "app_start",
            EventPayload::AppStop { .. } => "app_stop",
            EventPayload::AppTimer { .. } => "app_timer",
        }
    }
}
