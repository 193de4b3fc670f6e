//! Parameter sweeps over independent scenarios.
//!
//! Every scenario in a sweep is built and run on its own; nothing is shared
//! between runs, so with the `parallel` feature they are spread over the
//! rayon thread pool. Each individual simulation stays single-threaded.
//! Results always come back in input order.
//!
//! # Feature Flag
//!
//! ```toml
//! [dependencies]
//! pktsim = { version = "0.1", features = ["parallel"] }
//! ```

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::apps::AppKind;
use crate::config::{ConfigResult, ScenarioConfig};
use crate::stats::{RunReport, Timer};
use crate::types::SimTime;

fn run_one(index: usize, config: &ScenarioConfig, stop: Option<SimTime>) -> ConfigResult<RunReport> {
    let stop = stop.unwrap_or_else(|| config.stop_time());
    let result = config.build().map(|sim| sim.run(Some(stop)));
    if let Err(err) = &result {
        warn!(run = index, error = %err, "sweep run failed");
    }
    result
}

/// Runs every config, each until `stop` or, if `None`, its own stop time.
pub fn run_sweep(configs: &[ScenarioConfig], stop: Option<SimTime>) -> Vec<ConfigResult<RunReport>> {
    let timer = Timer::start();

    #[cfg(feature = "parallel")]
    let results: Vec<_> = configs
        .par_iter()
        .enumerate()
        .map(|(i, config)| run_one(i, config, stop))
        .collect();

    #[cfg(not(feature = "parallel"))]
    let results: Vec<_> = configs
        .iter()
        .enumerate()
        .map(|(i, config)| run_one(i, config, stop))
        .collect();

    info!(runs = configs.len(), wall_ms = timer.elapsed_ms(), "sweep finished");
    results
}

/// Runs `config` once per seed.
pub fn seed_sweep(config: &ScenarioConfig, seeds: &[u64]) -> Vec<ConfigResult<RunReport>> {
    let configs: Vec<_> = seeds.iter().map(|&seed| config.with_seed(seed)).collect();
    run_sweep(&configs, None)
}

/// Aggregate over the successful runs of a sweep.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepSummary {
    pub runs: usize,
    pub failed: usize,
    pub requests_sent: u64,
    pub replies_received: u64,
    /// Mean of every client's first round trip, in nanoseconds
    pub mean_first_rtt: Option<f64>,
}

impl SweepSummary {
    pub fn from_results(results: &[ConfigResult<RunReport>]) -> Self {
        let mut summary = SweepSummary {
            runs: results.len(),
            ..Self::default()
        };
        let mut rtts = Vec::new();
        for result in results {
            let Ok(report) = result else {
                summary.failed += 1;
                continue;
            };
            summary.requests_sent += report.total_sent(AppKind::EchoClient);
            summary.replies_received += report.total_received(AppKind::EchoClient);
            rtts.extend(report.apps_of(AppKind::EchoClient).filter_map(|a| a.first_rtt));
        }
        if !rtts.is_empty() {
            summary.mean_first_rtt = Some(rtts.iter().map(|&r| r as f64).sum::<f64>() / rtts.len() as f64);
        }
        summary
    }

    /// Fraction of requests that got a reply.
    pub fn delivery_ratio(&self) -> f64 {
        if self.requests_sent == 0 {
            0.0
        } else {
            self.replies_received as f64 / self.requests_sent as f64
        }
    }
}
