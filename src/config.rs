//! Scenario configuration.
//!
//! Scenarios can be described declaratively in YAML or JSON and turned into
//! a ready-to-run [`Simulation`].
//!
//! # Configuration File Structure
//!
//! ```yaml
//! simulation:
//!   stop_time: 20s
//!   seed: 1
//!   log_level: info
//!
//! nodes: 2
//!
//! segments:
//!   - kind: point_to_point
//!     nodes: [0, 1]
//!     data_rate: 5Mbps
//!     delay: 2ms
//!     prefix: 10.1.1.0/24
//!
//! applications:
//!   - type: echo_server
//!     node: 0
//!     port: 9
//!     start: 1s
//!     stop: 20s
//!   - type: echo_client
//!     node: 1
//!     server: { node: 0, interface: 0 }
//!     port: 9
//!     interval: 1s
//!     packet_size: 1024
//!     max_packets: 1
//!     start: { uniform: { min: 2s, max: 7s } }
//!     stop: 20s
//! ```
//!
//! Durations are humantime strings (`2ms`, `6560ns`, `1s 500ms`).

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::address::Prefix;
use crate::apps::{EchoClientConfig, EchoServerConfig, StartTime};
use crate::engine::{Simulation, SimulationBuilder};
use crate::link::{DataRate, LinkConfig, LinkKind};
use crate::stats::RunReport;
use crate::topology::{Topology, TopologyError};
use crate::types::{from_duration, IfIndex, NodeId, Port, SimTime};

/// Errors that can occur while loading or building a scenario.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown file format: {0}")]
    UnknownFormat(String),

    #[error("Topology error: {0}")]
    Topology(#[from] TopologyError),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

fn invalid<T>(message: impl Into<String>) -> ConfigResult<T> {
    Err(ConfigError::Validation(message.into()))
}

/// Global simulation parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationParams {
    /// Events after this time are discarded
    #[serde(default = "default_stop_time", with = "humantime_serde")]
    pub stop_time: Duration,

    /// Seed of the start-time RNG
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_stop_time() -> Duration {
    Duration::from_secs(20)
}

fn default_seed() -> u64 {
    crate::engine::DEFAULT_SEED
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            stop_time: default_stop_time(),
            seed: default_seed(),
            log_level: default_log_level(),
        }
    }
}

/// One link and the nodes attached to it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SegmentConfig {
    pub kind: LinkKind,

    /// Attached nodes, in attachment order
    pub nodes: Vec<NodeId>,

    pub data_rate: DataRate,

    #[serde(with = "humantime_serde")]
    pub delay: Duration,

    pub prefix: Prefix,

    /// Explicit addresses; allocated from `prefix` in node order when empty
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<Ipv4Addr>,
}

impl SegmentConfig {
    pub fn link_config(&self) -> LinkConfig {
        LinkConfig::new(self.data_rate, from_duration(self.delay))
    }

    /// Validates the segment against a topology of `node_count` nodes.
    pub fn validate(&self, index: usize, node_count: usize) -> ConfigResult<()> {
        let count = self.nodes.len();
        match self.kind {
            LinkKind::PointToPoint if count != 2 => {
                return invalid(format!(
                    "Segment {index} is point-to-point but joins {count} nodes"
                ));
            }
            LinkKind::SharedMedium if count < 2 => {
                return invalid(format!("Segment {index} is shared but joins {count} nodes"));
            }
            _ => {}
        }
        if let Some(node) = self.nodes.iter().find(|&&n| n >= node_count) {
            return invalid(format!("Segment {index} references non-existent node {node}"));
        }
        if self.prefix.prefix_len() > 30 {
            return invalid(format!(
                "Segment {index} prefix {} is longer than /30",
                self.prefix
            ));
        }
        if !self.addresses.is_empty() && self.addresses.len() != count {
            return invalid(format!(
                "Segment {index} lists {} addresses for {count} nodes",
                self.addresses.len()
            ));
        }
        if self.data_rate.bits_per_second() == 0 {
            return invalid(format!("Segment {index} has a zero data rate"));
        }
        Ok(())
    }
}

/// Where an echo client sends its requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerTarget {
    /// The address of a node's interface
    Interface { node: NodeId, interface: IfIndex },
    /// A literal address
    Address { address: Ipv4Addr },
}

/// Start time as written in a config file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StartSpec {
    Fixed(#[serde(with = "humantime_serde")] Duration),
    Uniform { uniform: DurationRange },
}

/// An inclusive range of durations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurationRange {
    #[serde(with = "humantime_serde")]
    pub min: Duration,
    #[serde(with = "humantime_serde")]
    pub max: Duration,
}

impl StartSpec {
    pub fn to_start_time(&self) -> StartTime {
        match self {
            StartSpec::Fixed(at) => StartTime::Fixed(from_duration(*at)),
            StartSpec::Uniform { uniform } => StartTime::Uniform {
                min: from_duration(uniform.min),
                max: from_duration(uniform.max),
            },
        }
    }
}

fn default_port() -> Port {
    9
}

fn default_server_start() -> Duration {
    Duration::from_secs(1)
}

fn default_client_start() -> StartSpec {
    StartSpec::Fixed(Duration::from_secs(2))
}

fn default_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_packet_size() -> u32 {
    1024
}

fn default_max_packets() -> u32 {
    1
}

/// An application to install.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ApplicationConfig {
    EchoServer {
        node: NodeId,
        #[serde(default = "default_port")]
        port: Port,
        #[serde(default = "default_server_start", with = "humantime_serde")]
        start: Duration,
        /// Defaults to the simulation stop time
        #[serde(default, with = "humantime_serde")]
        stop: Option<Duration>,
    },
    EchoClient {
        node: NodeId,
        server: ServerTarget,
        #[serde(default = "default_port")]
        port: Port,
        #[serde(default = "default_interval", with = "humantime_serde")]
        interval: Duration,
        #[serde(default = "default_packet_size")]
        packet_size: u32,
        /// 0 means no limit
        #[serde(default = "default_max_packets")]
        max_packets: u32,
        #[serde(default = "default_client_start")]
        start: StartSpec,
        #[serde(default, with = "humantime_serde")]
        stop: Option<Duration>,
    },
}

impl ApplicationConfig {
    pub fn node(&self) -> NodeId {
        match self {
            ApplicationConfig::EchoServer { node, .. } | ApplicationConfig::EchoClient { node, .. } => *node,
        }
    }

    /// Validates the application against the interface counts of every node.
    pub fn validate(&self, index: usize, interfaces: &[usize]) -> ConfigResult<()> {
        let node = self.node();
        if node >= interfaces.len() {
            return invalid(format!("Application {index} references non-existent node {node}"));
        }
        if let ApplicationConfig::EchoClient {
            server,
            interval,
            packet_size,
            start,
            ..
        } = self
        {
            if interval.is_zero() {
                return invalid(format!("Application {index} has a zero interval"));
            }
            if *packet_size == 0 {
                return invalid(format!("Application {index} has a zero packet size"));
            }
            if let StartSpec::Uniform { uniform } = start {
                if uniform.min > uniform.max {
                    return invalid(format!(
                        "Application {index} start range has min {:?} > max {:?}",
                        uniform.min, uniform.max
                    ));
                }
            }
            if let ServerTarget::Interface { node, interface } = *server {
                if interfaces.get(node).map_or(true, |&count| interface >= count) {
                    return invalid(format!(
                        "Application {index} targets missing interface {interface} of node {node}"
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Complete scenario configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    #[serde(default)]
    pub simulation: SimulationParams,

    /// Number of nodes, ids `0..nodes`
    pub nodes: usize,

    #[serde(default)]
    pub segments: Vec<SegmentConfig>,

    #[serde(default)]
    pub applications: Vec<ApplicationConfig>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            simulation: SimulationParams::default(),
            nodes: 1,
            segments: Vec::new(),
            applications: Vec::new(),
        }
    }
}

impl ScenarioConfig {
    /// Loads configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> ConfigResult<Self> {
        let config: ScenarioConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Loads configuration from a JSON string.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let config: ScenarioConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Loads configuration from a file, auto-detecting format.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        match ext.to_lowercase().as_str() {
            "yaml" | "yml" => Self::from_yaml_file(path),
            "json" => Self::from_json_file(path),
            _ => Err(ConfigError::UnknownFormat(ext.to_string())),
        }
    }

    /// Interface count of every node once all segments are attached.
    fn interface_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.nodes];
        for node in self.segments.iter().flat_map(|s| &s.nodes) {
            if let Some(count) = counts.get_mut(*node) {
                *count += 1;
            }
        }
        counts
    }

    /// Validates the entire configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.nodes == 0 {
            return invalid("Scenario has no nodes");
        }
        for (index, segment) in self.segments.iter().enumerate() {
            segment.validate(index, self.nodes)?;
        }

        let interfaces = self.interface_counts();
        let mut ports = HashMap::new();
        for (index, app) in self.applications.iter().enumerate() {
            app.validate(index, &interfaces)?;
            if let ApplicationConfig::EchoServer { node, port, .. } = app {
                if let Some(other) = ports.insert((*node, *port), index) {
                    return invalid(format!(
                        "Applications {other} and {index} both bind port {port} on node {node}"
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn to_yaml(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_yaml_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        std::fs::write(path, self.to_yaml()?)?;
        Ok(())
    }

    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Stop time as simulation time.
    pub fn stop_time(&self) -> SimTime {
        from_duration(self.simulation.stop_time)
    }

    /// Returns a copy with a different RNG seed.
    pub fn with_seed(&self, seed: u64) -> Self {
        let mut config = self.clone();
        config.simulation.seed = seed;
        config
    }

    /// Returns a copy that runs until `stop`.
    ///
    /// Applications whose stop time matched the old run stop time are moved
    /// along with it; earlier stops are kept.
    pub fn with_stop_time(&self, stop: Duration) -> Self {
        let old = self.simulation.stop_time;
        let mut config = self.clone();
        config.simulation.stop_time = stop;
        for app in &mut config.applications {
            let app_stop = match app {
                ApplicationConfig::EchoServer { stop, .. } | ApplicationConfig::EchoClient { stop, .. } => stop,
            };
            if *app_stop == Some(old) {
                *app_stop = Some(stop);
            }
        }
        config
    }

    /// Builds the topology described by `nodes` and `segments`.
    pub fn topology(&self) -> ConfigResult<Topology> {
        let mut topology = Topology::new();
        topology.add_nodes(self.nodes);
        for segment in &self.segments {
            let config = segment.link_config();
            if segment.addresses.is_empty() {
                topology.connect(segment.kind, &segment.nodes, config, segment.prefix)?;
            } else {
                topology.connect_with_addresses(
                    segment.kind,
                    &segment.nodes,
                    config,
                    segment.prefix,
                    &segment.addresses,
                )?;
            }
        }
        Ok(topology)
    }

    /// Validates, builds the topology and installs every application.
    pub fn builder(&self) -> ConfigResult<SimulationBuilder> {
        self.validate()?;
        let topology = self.topology()?;
        let mut builder = SimulationBuilder::new(topology).seed(self.simulation.seed);
        let default_stop = self.stop_time();

        for app in &self.applications {
            match *app {
                ApplicationConfig::EchoServer {
                    node,
                    port,
                    start,
                    stop,
                } => {
                    let config = EchoServerConfig::new(port)
                        .with_start(from_duration(start))
                        .with_stop(stop.map_or(default_stop, from_duration));
                    builder.install_echo_server(node, config)?;
                }
                ApplicationConfig::EchoClient {
                    node,
                    server,
                    port,
                    interval,
                    packet_size,
                    max_packets,
                    start,
                    stop,
                } => {
                    let address = match server {
                        ServerTarget::Interface { node, interface } => {
                            builder.topology().address_of(node, interface)?
                        }
                        ServerTarget::Address { address } => address,
                    };
                    let config = EchoClientConfig::new(SocketAddrV4::new(address, port))
                        .with_interval(from_duration(interval))
                        .with_packet_size(packet_size)
                        .with_max_packets(max_packets)
                        .with_start(start.to_start_time())
                        .with_stop(stop.map_or(default_stop, from_duration));
                    builder.install_echo_client(node, config)?;
                }
            }
        }
        Ok(builder)
    }

    pub fn build(&self) -> ConfigResult<Simulation> {
        Ok(self.builder()?.build()?)
    }

    /// Builds and runs until the configured stop time.
    pub fn run(&self) -> ConfigResult<RunReport> {
        Ok(self.build()?.run(Some(self.stop_time())))
    }
}

/// Builder for creating a [`ScenarioConfig`] programmatically.
#[derive(Default)]
pub struct ScenarioConfigBuilder {
    config: ScenarioConfig,
}

impl ScenarioConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nodes(mut self, count: usize) -> Self {
        self.config.nodes = count;
        self
    }

    pub fn stop_time(mut self, stop: Duration) -> Self {
        self.config.simulation.stop_time = stop;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.simulation.seed = seed;
        self
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.simulation.log_level = level.into();
        self
    }

    /// Adds a segment with addresses allocated from `prefix`.
    pub fn segment(
        mut self,
        kind: LinkKind,
        nodes: Vec<NodeId>,
        data_rate: DataRate,
        delay: Duration,
        prefix: Prefix,
    ) -> Self {
        self.config.segments.push(SegmentConfig {
            kind,
            nodes,
            data_rate,
            delay,
            prefix,
            addresses: Vec::new(),
        });
        self
    }

    pub fn point_to_point(self, a: NodeId, b: NodeId, data_rate: DataRate, delay: Duration, prefix: Prefix) -> Self {
        self.segment(LinkKind::PointToPoint, vec![a, b], data_rate, delay, prefix)
    }

    pub fn shared(self, nodes: Vec<NodeId>, data_rate: DataRate, delay: Duration, prefix: Prefix) -> Self {
        self.segment(LinkKind::SharedMedium, nodes, data_rate, delay, prefix)
    }

    pub fn application(mut self, app: ApplicationConfig) -> Self {
        self.config.applications.push(app);
        self
    }

    /// Adds an echo server listening from `start` until `stop`.
    pub fn echo_server(self, node: NodeId, port: Port, start: Duration, stop: Duration) -> Self {
        self.application(ApplicationConfig::EchoServer {
            node,
            port,
            start,
            stop: Some(stop),
        })
    }

    /// Adds an echo client with 1 s interval and 1024-byte requests.
    pub fn echo_client(
        self,
        node: NodeId,
        server: ServerTarget,
        port: Port,
        max_packets: u32,
        start: StartSpec,
        stop: Duration,
    ) -> Self {
        self.application(ApplicationConfig::EchoClient {
            node,
            server,
            port,
            interval: default_interval(),
            packet_size: default_packet_size(),
            max_packets,
            start,
            stop: Some(stop),
        })
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> ConfigResult<ScenarioConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
