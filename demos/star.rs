//! Star topology built by hand.
//!
//! A server hub with one point-to-point leaf per client. Every client sends
//! a handful of echo requests to the hub, starting at a random time between
//! 2 and 7 seconds. A trace recorder captures every frame on the wire.
//!
//! Run with: `cargo run --example star`

use std::cell::RefCell;
use std::net::SocketAddrV4;
use std::rc::Rc;

use pktsim::types::{format_time, millis, seconds};
use pktsim::{
    AppKind, DataRate, EchoClientConfig, EchoServerConfig, LinkConfig, Prefix, SimulationBuilder, StartTime,
    Topology, TraceRecorder,
};

const N_CLIENTS: usize = 4;
const N_PACKETS: u32 = 5;
const SERVER_PORT: u16 = 15;
const STOP: u64 = seconds(30);

fn main() -> Result<(), Box<dyn std::error::Error>> {
    pktsim::init_logging("info");

    // ========================================================================
    // Topology: n0 is the hub, n1..=N_CLIENTS are leaves on 10.1.k.0/24
    // ========================================================================
    let mut topology = Topology::new();
    let hub = topology.add_named_node("hub");
    let leaves = topology.add_nodes(N_CLIENTS);

    let p2p = LinkConfig::new(DataRate::mbps(5), millis(2));
    for (k, &leaf) in leaves.iter().enumerate() {
        let prefix: Prefix = format!("10.1.{}.0/24", k + 1).parse()?;
        topology.connect_point_to_point(hub, leaf, p2p, prefix)?;
    }
    let server_addr = topology.address_of(hub, 0)?;

    // ========================================================================
    // Applications
    // ========================================================================
    let recorder = Rc::new(RefCell::new(TraceRecorder::new()));
    let mut builder = SimulationBuilder::new(topology).seed(7).tracer(Rc::clone(&recorder));

    builder.install_echo_server(hub, EchoServerConfig::new(SERVER_PORT).with_start(seconds(1)).with_stop(STOP))?;
    for &leaf in &leaves {
        let config = EchoClientConfig::new(SocketAddrV4::new(server_addr, SERVER_PORT))
            .with_max_packets(N_PACKETS)
            .with_start(StartTime::Uniform {
                min: seconds(2),
                max: seconds(7),
            })
            .with_stop(STOP);
        builder.install_echo_client(leaf, config)?;
    }

    let sim = builder.build()?;
    for app in sim.apps() {
        println!("{:>12} on n{} starts at {}", app.kind().to_string(), app.node(), format_time(app.start_time()));
    }

    // ========================================================================
    // Run
    // ========================================================================
    let report = sim.run(Some(STOP));
    println!();
    print!("{}", report.summary());

    let recorder = recorder.borrow();
    println!();
    println!("Frames traced:   {}", recorder.len());
    println!("  transmitted:   {}", recorder.transmits().count());
    println!("  received:      {}", recorder.receives().count());
    println!(
        "Server requests: {} of {}",
        report.total_received(AppKind::EchoServer),
        N_CLIENTS as u32 * N_PACKETS
    );
    Ok(())
}
