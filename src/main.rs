//! pktsim CLI
//!
//! Runs one of the preset scenarios or a scenario file and prints a report.
//!
//! # Example
//!
//! ```bash
//! # Star with three clients sending 20 packets each
//! pktsim --scenario star --n-clients 3 --n-packets 20 --stop-time 30s
//!
//! # Scenario file, JSON report and packet trace
//! pktsim --config scenario.yaml --report report.json --trace trace.jsonl
//! ```

use std::cell::RefCell;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;
use tracing::info;

use pktsim::config::ScenarioConfig;
use pktsim::trace::JsonLinesTracer;
use pktsim::types::from_duration;
use pktsim::{init_logging, scenarios, RunReport};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Scenario {
    /// Server hub with one point-to-point link per client
    Star,
    /// Client, p2p, shared LAN, p2p, server
    LanChain,
    /// Two shared segments joined by a p2p backbone
    DualLan,
}

/// Discrete-event packet network simulator
#[derive(Parser, Debug)]
#[command(name = "pktsim")]
#[command(version, about, long_about = None)]
struct Args {
    /// Preset scenario to run
    #[arg(long, value_enum, default_value = "star", conflicts_with = "config")]
    scenario: Scenario,

    /// Scenario file (YAML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of clients (star)
    #[arg(long, default_value = "1")]
    n_clients: usize,

    /// Packets per client; defaults to 1 (star, dual-lan) or 20 (lan-chain)
    #[arg(long)]
    n_packets: Option<u32>,

    /// Extra LAN nodes (lan-chain) or stations per segment (dual-lan)
    #[arg(long, default_value = "3")]
    n_lan: usize,

    /// Seed for application start times
    #[arg(long)]
    seed: Option<u64>,

    /// Stop time such as 20s or 1500ms; defaults to the scenario's own
    #[arg(long, value_parser = humantime::parse_duration)]
    stop_time: Option<Duration>,

    /// Write a JSON-lines packet trace to this file
    #[arg(long)]
    trace: Option<PathBuf>,

    /// Write the run report to this file (.json, or .csv plus _apps.csv and _links.csv)
    #[arg(long)]
    report: Option<PathBuf>,

    /// Print the scenario as YAML and exit
    #[arg(long)]
    print_config: bool,

    /// Log level (trace, debug, info, warn, error); defaults to the scenario's
    #[arg(long)]
    log_level: Option<String>,
}

fn scenario_config(args: &Args) -> Result<ScenarioConfig> {
    let mut config = match &args.config {
        Some(path) => ScenarioConfig::from_file(path)
            .wrap_err_with(|| format!("failed to load scenario {}", path.display()))?,
        None => match args.scenario {
            Scenario::Star => scenarios::star(args.n_clients, args.n_packets.unwrap_or(1))?,
            Scenario::LanChain => scenarios::lan_chain(args.n_lan, args.n_packets.unwrap_or(20))?,
            Scenario::DualLan => scenarios::dual_lan(args.n_lan, args.n_packets.unwrap_or(1))?,
        },
    };
    if let Some(seed) = args.seed {
        config.simulation.seed = seed;
    }
    if let Some(stop) = args.stop_time {
        config = config.with_stop_time(stop);
    }
    if let Some(level) = &args.log_level {
        config.simulation.log_level = level.clone();
    }
    Ok(config)
}

fn write_report(report: &RunReport, path: &Path) -> Result<()> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("csv") => {
            for written in report.to_csv_files(path)? {
                info!(path = %written.display(), "csv written");
            }
        }
        Some("json") => report.to_json_file(path)?,
        other => return Err(eyre!("unsupported report format: {}", other.unwrap_or(""))),
    }
    info!(path = %path.display(), "report written");
    Ok(())
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    let config = scenario_config(&args)?;
    init_logging(&config.simulation.log_level);
    if args.print_config {
        print!("{}", config.to_yaml()?);
        return Ok(());
    }

    let stop = from_duration(config.simulation.stop_time);
    let builder = config.builder()?;

    let report = match &args.trace {
        Some(path) => {
            let file = File::create(path).wrap_err_with(|| format!("cannot create {}", path.display()))?;
            let tracer = Rc::new(RefCell::new(JsonLinesTracer::new(BufWriter::new(file))));
            let report = builder.tracer(Rc::clone(&tracer)).build()?.run(Some(stop));

            let tracer = Rc::try_unwrap(tracer)
                .map_err(|_| eyre!("packet tracer is still shared after the run"))?
                .into_inner();
            let lines = tracer.written();
            tracer.finish().wrap_err("failed to write packet trace")?;
            info!(path = %path.display(), lines, "packet trace written");
            report
        }
        None => builder.build()?.run(Some(stop)),
    };

    print!("{}", report.summary());
    if let Some(path) = &args.report {
        write_report(&report, path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("pktsim").chain(extra.iter().copied())).unwrap()
    }

    #[test]
    fn test_log_level_from_scenario_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scenario.yaml");
        std::fs::write(&path, "simulation: { log_level: debug }\nnodes: 1\n").unwrap();
        let path = path.to_string_lossy().into_owned();

        let config = scenario_config(&args(&["--config", &path])).unwrap();
        assert_eq!(config.simulation.log_level, "debug");

        let config = scenario_config(&args(&["--config", &path, "--log-level", "warn"])).unwrap();
        assert_eq!(config.simulation.log_level, "warn");
    }

    #[test]
    fn test_preset_overrides() {
        let config = scenario_config(&args(&["--n-clients", "2", "--seed", "9", "--stop-time", "30s"])).unwrap();
        assert_eq!(config.simulation.seed, 9);
        assert_eq!(config.simulation.stop_time, Duration::from_secs(30));
        assert_eq!(config.simulation.log_level, "info");
    }
}
