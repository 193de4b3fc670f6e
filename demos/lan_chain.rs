//! LAN chain from the preset scenarios.
//!
//! Client, point-to-point link, a shared LAN of four nodes, a second
//! point-to-point link, then the server. The scenario is printed as YAML,
//! run, and the per-application table is printed as CSV.
//!
//! Run with: `cargo run --example lan_chain`

use pktsim::scenarios;
use pktsim::types::format_time;
use pktsim::AppKind;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    pktsim::init_logging("warn");

    let config = scenarios::lan_chain(3, 20)?;
    println!("# Scenario");
    print!("{}", config.to_yaml()?);
    println!();

    let report = config.run()?;
    print!("{}", report.summary());
    println!();
    print!("{}", report.apps_to_csv());

    if let Some(client) = report.apps_of(AppKind::EchoClient).next() {
        if let Some(rtt) = client.first_rtt {
            println!();
            println!("First round trip: {}", format_time(rtt));
        }
    }
    Ok(())
}
