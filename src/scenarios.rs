//! Preset scenarios.
//!
//! Each preset returns a validated [`ScenarioConfig`], so it can be run
//! directly, written out as YAML for editing, or fed to a sweep.
//!
//! | Preset | Topology |
//! |--------|----------|
//! | [`star`] | server hub with one point-to-point leaf per client |
//! | [`lan_chain`] | client, p2p, shared LAN, p2p, server |
//! | [`dual_lan`] | two shared segments joined by a p2p backbone |

use std::time::Duration;

use tracing::warn;

use crate::address::Prefix;
use crate::config::{
    ConfigError, ConfigResult, DurationRange, ScenarioConfig, ScenarioConfigBuilder, ServerTarget, StartSpec,
};
use crate::link::DataRate;
use crate::types::NodeId;

/// Point-to-point links: 5 Mbps, 2 ms.
pub const P2P_RATE: DataRate = DataRate::mbps(5);
pub const P2P_DELAY: Duration = Duration::from_millis(2);

/// Wired LAN: 100 Mbps, 6560 ns.
pub const LAN_RATE: DataRate = DataRate::mbps(100);
pub const LAN_DELAY: Duration = Duration::from_nanos(6560);

/// Wireless-style shared segment: 54 Mbps, 1 us.
pub const WLAN_RATE: DataRate = DataRate::mbps(54);
pub const WLAN_DELAY: Duration = Duration::from_micros(1);

/// Most stations per shared segment in [`dual_lan`].
pub const MAX_STATIONS: usize = 9;

const SERVER_START: Duration = Duration::from_secs(1);
const STOP: Duration = Duration::from_secs(20);

fn subnet(third_octet: usize) -> ConfigResult<Prefix> {
    format!("10.1.{third_octet}.0/24")
        .parse()
        .map_err(|e| ConfigError::Validation(format!("cannot build subnet {third_octet}: {e}")))
}

/// Parameters of the [`star`] preset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StarParams {
    pub n_clients: usize,
    pub n_packets: u32,
    /// Client start times are drawn from `[start_min, start_max]`
    pub start_min: Duration,
    pub start_max: Duration,
    /// Stop time of every application and of the run
    pub stop: Duration,
    pub seed: u64,
}

impl Default for StarParams {
    fn default() -> Self {
        Self {
            n_clients: 1,
            n_packets: 1,
            start_min: Duration::from_secs(2),
            start_max: Duration::from_secs(7),
            stop: STOP,
            seed: 1,
        }
    }
}

/// Star with `n_clients` clients and the default timing.
pub fn star(n_clients: usize, n_packets: u32) -> ConfigResult<ScenarioConfig> {
    star_with(StarParams {
        n_clients,
        n_packets,
        ..StarParams::default()
    })
}

/// Server `n0` with client `nk` on its own point-to-point link `10.1.k.0/24`.
///
/// Every client targets the server's address on `10.1.1.0`, port 15.
pub fn star_with(params: StarParams) -> ConfigResult<ScenarioConfig> {
    if params.n_clients < 1 {
        return Err(ConfigError::Validation("star needs at least one client".into()));
    }
    if params.n_clients > 254 {
        return Err(ConfigError::Validation(format!(
            "star supports at most 254 clients, got {}",
            params.n_clients
        )));
    }

    let port = 15;
    let mut builder = ScenarioConfigBuilder::new()
        .nodes(params.n_clients + 1)
        .seed(params.seed)
        .stop_time(params.stop)
        .echo_server(0, port, SERVER_START, params.stop);

    for k in 1..=params.n_clients {
        builder = builder.point_to_point(0, k, P2P_RATE, P2P_DELAY, subnet(k)?);
    }
    let start = StartSpec::Uniform {
        uniform: DurationRange {
            min: params.start_min,
            max: params.start_max,
        },
    };
    for k in 1..=params.n_clients {
        builder = builder.echo_client(
            k,
            ServerTarget::Interface { node: 0, interface: 0 },
            port,
            params.n_packets,
            start,
            params.stop,
        );
    }
    builder.build()
}

/// Client `n0` –p2p– `n1`, LAN of `n1` plus `n_lan` extra nodes, last LAN
/// node –p2p– server.
///
/// A LAN without extra nodes is widened to one extra node.
pub fn lan_chain(n_lan: usize, n_packets: u32) -> ConfigResult<ScenarioConfig> {
    let n_lan = if n_lan == 0 {
        warn!("lan_chain needs at least one extra LAN node, using 1");
        1
    } else {
        n_lan
    };

    let client: NodeId = 0;
    let lan: Vec<NodeId> = (1..=n_lan + 1).collect();
    let last_lan = n_lan + 1;
    let server = n_lan + 2;
    let port = 9;

    ScenarioConfigBuilder::new()
        .nodes(n_lan + 3)
        .point_to_point(client, 1, P2P_RATE, P2P_DELAY, subnet(1)?)
        .shared(lan, LAN_RATE, LAN_DELAY, subnet(2)?)
        .point_to_point(last_lan, server, P2P_RATE, P2P_DELAY, subnet(3)?)
        .echo_server(server, port, SERVER_START, STOP)
        .echo_client(
            client,
            ServerTarget::Interface { node: server, interface: 0 },
            port,
            n_packets,
            StartSpec::Fixed(Duration::from_secs(2)),
            STOP,
        )
        .build()
}

/// Two shared segments of `n_stations` stations each, joined by the
/// point-to-point backbone `n0` –10.1.1.0– `n1`.
///
/// `n1` and the first group of stations share `10.1.2.0/24`; `n0` and the
/// second group share `10.1.3.0/24`. The server runs on the last station
/// of `10.1.2.0`, the client on the last station of `10.1.3.0`.
pub fn dual_lan(n_stations: usize, n_packets: u32) -> ConfigResult<ScenarioConfig> {
    if n_stations == 0 || n_stations > MAX_STATIONS {
        return Err(ConfigError::Validation(format!(
            "dual_lan needs 1 to {MAX_STATIONS} stations per segment, got {n_stations}"
        )));
    }

    // n0, n1, then the 10.1.3.0 stations, then the 10.1.2.0 stations
    let client_side: Vec<NodeId> = (2..2 + n_stations).collect();
    let server_side: Vec<NodeId> = (2 + n_stations..2 + 2 * n_stations).collect();
    let client = 1 + n_stations;
    let server = 1 + 2 * n_stations;
    let port = 9;

    let server_segment: Vec<NodeId> = std::iter::once(1).chain(server_side).collect();
    let client_segment: Vec<NodeId> = std::iter::once(0).chain(client_side).collect();

    ScenarioConfigBuilder::new()
        .nodes(2 + 2 * n_stations)
        .point_to_point(0, 1, P2P_RATE, P2P_DELAY, subnet(1)?)
        .shared(server_segment, WLAN_RATE, WLAN_DELAY, subnet(2)?)
        .shared(client_segment, WLAN_RATE, WLAN_DELAY, subnet(3)?)
        .echo_server(server, port, SERVER_START, STOP)
        .echo_client(
            client,
            ServerTarget::Interface { node: server, interface: 0 },
            port,
            n_packets,
            StartSpec::Fixed(Duration::from_secs(2)),
            STOP,
        )
        .build()
}
