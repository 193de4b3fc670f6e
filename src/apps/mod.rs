//! Applications installed on nodes.
//!
//! The set of applications is closed: an [`Application`] is either an
//! [`EchoClient`] or an [`EchoServer`]. Both are plain state machines; the
//! engine feeds them lifecycle events and packets and acts on what they
//! return, so neither needs access to the scheduler or the topology.

pub mod echo_client;
pub mod echo_server;

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::types::{NodeId, Port, SimTime};

pub use echo_client::{ClientState, EchoClient, EchoClientConfig};
pub use echo_server::{EchoServer, EchoServerConfig, ServerState};

/// First ephemeral port handed to clients; each further client on the same
/// node gets the next one.
pub const EPHEMERAL_PORT_BASE: Port = 49153;

/// Which kind of application.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppKind {
    EchoClient,
    EchoServer,
}

impl fmt::Display for AppKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppKind::EchoClient => write!(f, "echo_client"),
            AppKind::EchoServer => write!(f, "echo_server"),
        }
    }
}

/// When an application starts, drawn once per instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartTime {
    /// Always the same instant
    Fixed(SimTime),
    /// Uniformly distributed over `[min, max]`, both ends inclusive
    Uniform { min: SimTime, max: SimTime },
}

impl StartTime {
    /// Draws a concrete start time.
    ///
    /// An inverted uniform range collapses to `min`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> SimTime {
        match *self {
            StartTime::Fixed(at) => at,
            StartTime::Uniform { min, max } if max <= min => min,
            StartTime::Uniform { min, max } => rng.gen_range(min..=max),
        }
    }

    /// Earliest possible start.
    pub fn earliest(&self) -> SimTime {
        match *self {
            StartTime::Fixed(at) => at,
            StartTime::Uniform { min, .. } => min,
        }
    }
}

impl Default for StartTime {
    fn default() -> Self {
        StartTime::Fixed(0)
    }
}

/// Traffic counters kept by every application.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppCounters {
    pub sent: u64,
    pub received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    /// Round-trip time of the first reply (clients only)
    pub first_rtt: Option<SimTime>,
    /// Round-trip time of the most recent reply (clients only)
    pub last_rtt: Option<SimTime>,
}

impl AppCounters {
    pub(crate) fn record_sent(&mut self, bytes: u32) {
        self.sent += 1;
        self.bytes_sent += u64::from(bytes);
    }

    pub(crate) fn record_received(&mut self, bytes: u32) {
        self.received += 1;
        self.bytes_received += u64::from(bytes);
    }

    pub(crate) fn record_rtt(&mut self, rtt: SimTime) {
        self.first_rtt.get_or_insert(rtt);
        self.last_rtt = Some(rtt);
    }
}

/// An installed application.
#[derive(Clone, Debug)]
pub enum Application {
    Client(EchoClient),
    Server(EchoServer),
}

impl Application {
    pub fn node(&self) -> NodeId {
        match self {
            Application::Client(c) => c.node(),
            Application::Server(s) => s.node(),
        }
    }

    pub fn kind(&self) -> AppKind {
        match self {
            Application::Client(_) => AppKind::EchoClient,
            Application::Server(_) => AppKind::EchoServer,
        }
    }

    /// Port the application is bound to.
    pub fn port(&self) -> Port {
        match self {
            Application::Client(c) => c.local_port(),
            Application::Server(s) => s.port(),
        }
    }

    /// Resolved start time.
    pub fn start_time(&self) -> SimTime {
        match self {
            Application::Client(c) => c.start_time(),
            Application::Server(s) => s.config().start,
        }
    }

    pub fn stop_time(&self) -> SimTime {
        match self {
            Application::Client(c) => c.config().stop,
            Application::Server(s) => s.config().stop,
        }
    }

    pub fn counters(&self) -> &AppCounters {
        match self {
            Application::Client(c) => c.counters(),
            Application::Server(s) => s.counters(),
        }
    }

    /// Whether packets for this application's port are currently accepted.
    pub fn is_receiving(&self) -> bool {
        match self {
            Application::Client(c) => c.is_receiving(),
            Application::Server(s) => s.is_listening(),
        }
    }

    /// Short label of the current state, for reports.
    pub fn state_name(&self) -> &'static str {
        match self {
            Application::Client(c) => c.state().name(),
            Application::Server(s) => s.state().name(),
        }
    }

    pub fn as_client(&self) -> Option<&EchoClient> {
        match self {
            Application::Client(c) => Some(c),
            Application::Server(_) => None,
        }
    }

    pub fn as_server(&self) -> Option<&EchoServer> {
        match self {
            Application::Server(s) => Some(s),
            Application::Client(_) => None,
        }
    }
}
