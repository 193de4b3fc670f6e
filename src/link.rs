//! Links connecting node interfaces.
//!
//! A link models the wire between interfaces: every frame handed to
//! [`Link::transmit`] reaches each other attached interface after the link's
//! propagation delay plus the serialization delay of the frame at the link's
//! data rate.
//!
//! # Delivery Semantics
//!
//! | Kind | Receivers |
//! |------|-----------|
//! | PointToPoint | the single peer interface |
//! | SharedMedium | every attached interface except the sender |
//!
//! Links never drop or reorder frames and model no contention.
//!
//! # Example
//!
//! ```
//! use pktsim::link::{DataRate, LinkConfig};
//! use pktsim::types::millis;
//!
//! let config = LinkConfig::new("5Mbps".parse().unwrap(), millis(2));
//!
//! // 1024 bytes at 5 Mbps take 1.6384 ms, plus 2 ms of propagation
//! assert_eq!(config.transit_time(1024), 3_638_400);
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event::EventPayload;
use crate::packet::Frame;
use crate::scheduler::Scheduler;
use crate::types::{IfIndex, LinkId, NodeId, SimTime, NANOS_PER_SEC};

/// Error returned when a data rate string cannot be parsed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid data rate '{0}', expected e.g. 5Mbps, 100Mbps or 1Gbps")]
pub struct DataRateError(pub String);

/// Link capacity in bits per second.
///
/// Parses from and displays as strings such as `5Mbps`, `100Mbps`, `1Gbps`,
/// `64kbps` or `9600bps`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DataRate(u64);

impl DataRate {
    pub const fn bps(bits_per_second: u64) -> Self {
        Self(bits_per_second)
    }

    pub const fn kbps(kilobits: u64) -> Self {
        Self(kilobits * 1_000)
    }

    pub const fn mbps(megabits: u64) -> Self {
        Self(megabits * 1_000_000)
    }

    pub const fn gbps(gigabits: u64) -> Self {
        Self(gigabits * 1_000_000_000)
    }

    /// Raw rate in bits per second.
    pub fn bits_per_second(&self) -> u64 {
        self.0
    }

    /// Time needed to clock `bytes` onto the wire, rounded up to whole nanoseconds.
    ///
    /// A zero rate never finishes and saturates at [`SimTime::MAX`].
    pub fn transmission_time(&self, bytes: u32) -> SimTime {
        if self.0 == 0 {
            return SimTime::MAX;
        }
        let bits = u128::from(bytes) * 8;
        let rate = u128::from(self.0);
        let nanos = (bits * u128::from(NANOS_PER_SEC)).div_ceil(rate);
        nanos.min(u128::from(SimTime::MAX)) as SimTime
    }
}

impl fmt::Display for DataRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let units = [(1_000_000_000, "Gbps"), (1_000_000, "Mbps"), (1_000, "kbps")];
        for (scale, unit) in units {
            if self.0 >= scale && self.0 % scale == 0 {
                return write!(f, "{}{}", self.0 / scale, unit);
            }
        }
        write!(f, "{}bps", self.0)
    }
}

impl FromStr for DataRate {
    type Err = DataRateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DataRateError(s.to_string());
        let trimmed = s.trim();
        let lower = trimmed.to_ascii_lowercase();
        let body = lower.strip_suffix("bps").ok_or_else(invalid)?;

        let (number, scale) = match body.chars().last() {
            Some('k') => (&body[..body.len() - 1], 1e3),
            Some('m') => (&body[..body.len() - 1], 1e6),
            Some('g') => (&body[..body.len() - 1], 1e9),
            _ => (body, 1.0),
        };
        let value: f64 = number.trim().parse().map_err(|_| invalid())?;
        if !value.is_finite() || value < 0.0 {
            return Err(invalid());
        }
        Ok(Self((value * scale).round() as u64))
    }
}

impl TryFrom<String> for DataRate {
    type Error = DataRateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DataRate> for String {
    fn from(rate: DataRate) -> Self {
        rate.to_string()
    }
}

/// Typed link parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Capacity used for serialization delay
    pub data_rate: DataRate,
    /// Propagation delay in nanoseconds
    pub delay: SimTime,
}

impl LinkConfig {
    pub fn new(data_rate: DataRate, delay: SimTime) -> Self {
        Self { data_rate, delay }
    }

    /// Propagation plus serialization delay for a frame of `bytes`.
    pub fn transit_time(&self, bytes: u32) -> SimTime {
        self.delay
            .saturating_add(self.data_rate.transmission_time(bytes))
    }
}

/// Whether a link joins two interfaces or many.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    /// Exactly two attached interfaces
    PointToPoint,
    /// Two or more attached interfaces with broadcast delivery
    #[serde(alias = "shared")]
    SharedMedium,
}

impl LinkKind {
    /// Minimum number of attachments for a usable link.
    pub fn min_attachments(&self) -> usize {
        2
    }

    /// Maximum number of attachments, if bounded.
    pub fn max_attachments(&self) -> Option<usize> {
        match self {
            LinkKind::PointToPoint => Some(2),
            LinkKind::SharedMedium => None,
        }
    }
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkKind::PointToPoint => write!(f, "point-to-point"),
            LinkKind::SharedMedium => write!(f, "shared-medium"),
        }
    }
}

/// An interface attached to a link.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Attachment {
    pub node: NodeId,
    pub iface: IfIndex,
}

impl Attachment {
    pub fn new(node: NodeId, iface: IfIndex) -> Self {
        Self { node, iface }
    }
}

/// Counters kept per link.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkStats {
    /// Frames handed to the link
    pub frames_sent: u64,
    /// Copies scheduled for delivery (one per receiver per frame)
    pub copies_scheduled: u64,
    /// Bytes handed to the link
    pub bytes_sent: u64,
}

/// A point-to-point or shared-medium link.
#[derive(Clone, Debug)]
pub struct Link {
    id: LinkId,
    kind: LinkKind,
    config: LinkConfig,
    attachments: Vec<Attachment>,
    stats: LinkStats,
}

impl Link {
    /// Creates a link with no attachments.
    pub fn new(id: LinkId, kind: LinkKind, config: LinkConfig) -> Self {
        Self {
            id,
            kind,
            config,
            attachments: Vec::new(),
            stats: LinkStats::default(),
        }
    }

    pub fn id(&self) -> LinkId {
        self.id
    }

    pub fn kind(&self) -> LinkKind {
        self.kind
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Attached interfaces in attachment order.
    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    /// Attaches an interface.
    ///
    /// # Panics
    ///
    /// Panics when attaching a third interface to a point-to-point link.
    pub(crate) fn attach(&mut self, attachment: Attachment) {
        if let Some(max) = self.kind.max_attachments() {
            assert!(
                self.attachments.len() < max,
                "{} link {} already has {} attachments",
                self.kind,
                self.id,
                max
            );
        }
        self.attachments.push(attachment);
    }

    /// Every attachment except `from`, in attachment order.
    pub fn receivers(&self, from: Attachment) -> impl Iterator<Item = Attachment> + '_ {
        self.attachments.iter().copied().filter(move |a| *a != from)
    }

    /// The other end of a point-to-point link.
    pub fn peer_of(&self, from: Attachment) -> Option<Attachment> {
        match self.kind {
            LinkKind::PointToPoint => self.receivers(from).next(),
            LinkKind::SharedMedium => None,
        }
    }

    /// Puts `frame` on the wire from `from`.
    ///
    /// Schedules one [`EventPayload::FrameArrival`] per receiving interface,
    /// all at `now + transit_time`. Returns the number of copies scheduled.
    pub fn transmit(&mut self, from: Attachment, frame: Frame, scheduler: &mut Scheduler) -> usize {
        let transit = self.config.transit_time(frame.wire_size());
        self.stats.frames_sent += 1;
        self.stats.bytes_sent += u64::from(frame.wire_size());

        let receivers: Vec<Attachment> = self.receivers(from).collect();
        for to in &receivers {
            scheduler.schedule(
                transit,
                EventPayload::FrameArrival {
                    link: self.id,
                    node: to.node,
                    iface: to.iface,
                    frame: frame.clone(),
                },
            );
        }
        self.stats.copies_scheduled += receivers.len() as u64;
        receivers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Packet;
    use crate::types::millis;
    use std::net::{Ipv4Addr, SocketAddrV4};

    fn frame(size: u32) -> Frame {
        let dst = SocketAddrV4::new(Ipv4Addr::new(10, 1, 1, 2), 9);
        Frame::new(*dst.ip(), Packet::echo_request(49153, dst, size, 0, 0))
    }

    #[test]
    fn test_data_rate_parsing() {
        assert_eq!("5Mbps".parse::<DataRate>().unwrap(), DataRate::mbps(5));
        assert_eq!("100Mbps".parse::<DataRate>().unwrap(), DataRate::mbps(100));
        assert_eq!("1Gbps".parse::<DataRate>().unwrap(), DataRate::gbps(1));
        assert_eq!("64kbps".parse::<DataRate>().unwrap(), DataRate::kbps(64));
        assert_eq!("9600bps".parse::<DataRate>().unwrap(), DataRate::bps(9600));
        assert_eq!("1.5Mbps".parse::<DataRate>().unwrap(), DataRate::kbps(1500));
        assert!("fast".parse::<DataRate>().is_err());
        assert!("5Mb".parse::<DataRate>().is_err());
    }

    #[test]
    fn test_data_rate_display() {
        assert_eq!(DataRate::mbps(5).to_string(), "5Mbps");
        assert_eq!(DataRate::kbps(1500).to_string(), "1500kbps");
        assert_eq!(DataRate::bps(9600).to_string(), "9600bps");
    }

    #[test]
    fn test_transmission_time() {
        // 1024 bytes = 8192 bits at 5 Mbps
        assert_eq!(DataRate::mbps(5).transmission_time(1024), 1_638_400);
        // 1 byte at 3 bps rounds up
        assert_eq!(DataRate::bps(3).transmission_time(1), 2_666_666_667);
        assert_eq!(DataRate::bps(0).transmission_time(1), SimTime::MAX);
    }

    #[test]
    fn test_point_to_point_delivers_one_copy() {
        let mut link = Link::new(0, LinkKind::PointToPoint, LinkConfig::new(DataRate::mbps(5), millis(2)));
        link.attach(Attachment::new(0, 0));
        link.attach(Attachment::new(1, 0));

        let mut sched = Scheduler::new();
        let copies = link.transmit(Attachment::new(0, 0), frame(1024), &mut sched);
        assert_eq!(copies, 1);

        let event = sched.pop_due(None).unwrap();
        assert_eq!(event.time, 3_638_400);
        assert_eq!(event.payload.target_node(), Some(1));
        assert!(sched.is_empty());
        assert_eq!(link.peer_of(Attachment::new(1, 0)), Some(Attachment::new(0, 0)));
    }

    #[test]
    fn test_shared_medium_broadcasts() {
        let mut link = Link::new(3, LinkKind::SharedMedium, LinkConfig::new(DataRate::mbps(100), 6560));
        for node in 0..4 {
            link.attach(Attachment::new(node, 1));
        }

        let mut sched = Scheduler::new();
        let copies = link.transmit(Attachment::new(2, 1), frame(100), &mut sched);
        assert_eq!(copies, 3);

        let targets: Vec<_> = std::iter::from_fn(|| sched.pop_due(None))
            .map(|e| (e.time, e.payload.target_node().unwrap()))
            .collect();
        assert_eq!(targets, vec![(14_560, 0), (14_560, 1), (14_560, 3)]);
        assert_eq!(link.stats().copies_scheduled, 3);
        assert_eq!(link.peer_of(Attachment::new(0, 1)), None);
    }

    #[test]
    #[should_panic(expected = "already has 2 attachments")]
    fn test_point_to_point_rejects_third() {
        let mut link = Link::new(0, LinkKind::PointToPoint, LinkConfig::new(DataRate::mbps(5), 0));
        link.attach(Attachment::new(0, 0));
        link.attach(Attachment::new(1, 0));
        link.attach(Attachment::new(2, 0));
    }
}
