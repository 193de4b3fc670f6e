//! # pktsim
//!
//! A deterministic discrete-event simulator for small packet networks: hosts
//! and routers joined by point-to-point links and shared segments, static
//! shortest-path routing, and UDP-style echo clients and servers.
//!
//! ## Design Principles
//!
//! - **Owned scheduler**: one priority queue ordered by `(time, seq)` owns
//!   the simulated clock. There is no global state; a [`Simulation`] owns
//!   everything it touches.
//! - **Integer time**: [`SimTime`] is nanoseconds in a `u64`, so link delays
//!   and serialization times never drift.
//! - **Frozen topology**: nodes and links are described up front, routes are
//!   computed once, and the run is one-shot.
//! - **Closed variants**: links are point-to-point or shared-medium,
//!   applications are echo clients or echo servers.
//!
//! ## Features
//!
//! - `parallel` - Run the scenarios of a [`sweep`] on a rayon thread pool
//!
//! ## Quick Start
//!
//! ```rust
//! use pktsim::scenarios;
//! use pktsim::AppKind;
//!
//! // One server, three clients, 20 packets each
//! let mut params = scenarios::StarParams::default();
//! params.n_clients = 3;
//! params.n_packets = 20;
//! params.stop = std::time::Duration::from_secs(30);
//! let config = scenarios::star_with(params).unwrap();
//!
//! let report = config.run().unwrap();
//! assert_eq!(report.total_received(AppKind::EchoServer), 60);
//! println!("{}", report.summary());
//! ```
//!
//! ## Configuration-Driven Setup
//!
//! ```rust,ignore
//! use pktsim::config::ScenarioConfig;
//!
//! let config = ScenarioConfig::from_file("scenario.yaml")?;
//! let report = config.run()?;
//! ```

pub mod types;
pub mod address;
pub mod packet;
pub mod event;
pub mod scheduler;
pub mod link;
pub mod node;
pub mod topology;
pub mod routing;
pub mod apps;
pub mod trace;
pub mod engine;
pub mod stats;
pub mod config;
pub mod scenarios;
pub mod sweep;

// Re-export commonly used types
pub use types::{SimTime, NodeId, IfIndex, LinkId, AppId, Port};
pub use address::{Prefix, AddressError};
pub use packet::{Packet, PacketKind, Frame};
pub use event::{Event, EventPayload};
pub use scheduler::{Scheduler, RunOutcome};
pub use link::{DataRate, LinkConfig, LinkKind};
pub use node::{Interface, Node};
pub use topology::{Topology, TopologyError, TopologyResult};
pub use routing::{populate_routes, Route, RoutingTable};
pub use apps::{AppKind, Application, EchoClientConfig, EchoServerConfig, StartTime};
pub use trace::{JsonLinesTracer, PacketTracer, TraceRecorder};
pub use engine::{Simulation, SimulationBuilder};
pub use stats::{AppReport, DropStats, RunReport, Timer};
pub use config::{ConfigError, ConfigResult, ScenarioConfig, ScenarioConfigBuilder};

/// Initialize the tracing subscriber for logging.
///
/// `RUST_LOG` takes precedence over `level` when set.
///
/// # Example
///
/// ```rust,ignore
/// pktsim::init_logging("info");
/// ```
pub fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    // A second call (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}
