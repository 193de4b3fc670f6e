//! Run reports and their export formats.
//!
//! A [`RunReport`] is what [`Simulation::run`](crate::engine::Simulation::run)
//! returns: scheduler totals, network counters, drops by reason, one
//! [`LinkReport`] per link and one [`AppReport`] per installed application.
//! Reports export to JSON, CSV and a human-readable summary.

use std::collections::BTreeMap;
use std::io::Write;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::apps::AppKind;
use crate::link::{LinkKind, LinkStats};
use crate::types::{format_time, AppId, LinkId, NodeId, Port, SimTime};

/// Packets discarded by the network layer, by reason.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropStats {
    /// No route to the destination
    pub no_route: u64,
    /// TTL reached zero while forwarding
    pub ttl_expired: u64,
    /// No application bound to the destination port
    pub port_unreachable: u64,
    /// Application bound but not currently accepting packets
    pub not_listening: u64,
}

impl DropStats {
    pub fn total(&self) -> u64 {
        self.no_route + self.ttl_expired + self.port_unreachable + self.not_listening
    }
}

/// Final state and counters of one application.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppReport {
    pub app: AppId,
    pub node: NodeId,
    pub kind: AppKind,
    pub port: Port,
    pub state: String,
    /// Resolved start time
    pub start: SimTime,
    pub stop: SimTime,
    pub sent: u64,
    pub received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub first_rtt: Option<SimTime>,
    pub last_rtt: Option<SimTime>,
    /// Requests received per source address (servers only)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub received_from: BTreeMap<Ipv4Addr, u64>,
}

/// Counters of one link at the end of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkReport {
    pub link: LinkId,
    pub kind: LinkKind,
    #[serde(flatten)]
    pub stats: LinkStats,
}

/// Outcome of a simulation run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Events dispatched
    pub events_processed: u64,
    /// Events still queued past the stop time
    pub events_discarded: u64,
    /// Clock value at the end of the run
    pub final_time: SimTime,
    /// Largest event queue length observed
    pub peak_queue: usize,
    /// Frames handed to links
    pub frames_transmitted: u64,
    /// Frame copies accepted by a receiving interface
    pub frames_delivered: u64,
    /// Frame copies rejected by link-layer filtering
    pub frames_filtered: u64,
    /// Routes installed across all nodes
    pub routes_installed: usize,
    pub drops: DropStats,
    #[serde(default)]
    pub links: Vec<LinkReport>,
    pub apps: Vec<AppReport>,
    /// Real time spent in the run
    pub wall_time_ms: f64,
}

impl RunReport {
    /// Report of application `id`.
    pub fn app(&self, id: AppId) -> Option<&AppReport> {
        self.apps.iter().find(|a| a.app == id)
    }

    /// Reports of all applications of `kind`.
    pub fn apps_of(&self, kind: AppKind) -> impl Iterator<Item = &AppReport> {
        self.apps.iter().filter(move |a| a.kind == kind)
    }

    /// Packets sent by all clients.
    pub fn total_sent(&self, kind: AppKind) -> u64 {
        self.apps_of(kind).map(|a| a.sent).sum()
    }

    /// Packets received by all applications of `kind`.
    pub fn total_received(&self, kind: AppKind) -> u64 {
        self.apps_of(kind).map(|a| a.received).sum()
    }

    /// Dispatched events per wall-clock second.
    pub fn events_per_second(&self) -> f64 {
        if self.wall_time_ms > 0.0 {
            self.events_processed as f64 / (self.wall_time_ms / 1000.0)
        } else {
            0.0
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let json = self.to_json().map_err(std::io::Error::from)?;
        std::fs::write(path, json)
    }

    /// Run totals as `metric,value` rows.
    pub fn to_csv(&self) -> String {
        let mut csv = String::new();

        csv.push_str("metric,value\n");
        csv.push_str(&format!("events_processed,{}\n", self.events_processed));
        csv.push_str(&format!("events_discarded,{}\n", self.events_discarded));
        csv.push_str(&format!("final_time,{}\n", self.final_time));
        csv.push_str(&format!("peak_queue,{}\n", self.peak_queue));
        csv.push_str(&format!("frames_transmitted,{}\n", self.frames_transmitted));
        csv.push_str(&format!("frames_delivered,{}\n", self.frames_delivered));
        csv.push_str(&format!("frames_filtered,{}\n", self.frames_filtered));
        csv.push_str(&format!("routes_installed,{}\n", self.routes_installed));
        csv.push_str(&format!("drops_no_route,{}\n", self.drops.no_route));
        csv.push_str(&format!("drops_ttl_expired,{}\n", self.drops.ttl_expired));
        csv.push_str(&format!("drops_port_unreachable,{}\n", self.drops.port_unreachable));
        csv.push_str(&format!("drops_not_listening,{}\n", self.drops.not_listening));
        csv.push_str(&format!("wall_time_ms,{:.2}\n", self.wall_time_ms));

        csv
    }

    pub fn to_csv_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        std::fs::write(path, self.to_csv())
    }

    /// One row per application.
    pub fn apps_to_csv(&self) -> String {
        let mut csv = String::new();

        csv.push_str("app,node,kind,port,state,start,stop,sent,received,bytes_sent,bytes_received,first_rtt,last_rtt\n");
        for app in &self.apps {
            csv.push_str(&format!(
                "{},{},{},{},{},{},{},{},{},{},{},{},{}\n",
                app.app,
                app.node,
                app.kind,
                app.port,
                app.state,
                app.start,
                app.stop,
                app.sent,
                app.received,
                app.bytes_sent,
                app.bytes_received,
                app.first_rtt.map(|v| v.to_string()).unwrap_or_default(),
                app.last_rtt.map(|v| v.to_string()).unwrap_or_default(),
            ));
        }

        csv
    }

    pub fn apps_to_csv_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        std::fs::write(path, self.apps_to_csv())
    }

    /// One row per link.
    pub fn links_to_csv(&self) -> String {
        let mut csv = String::from("link,kind,frames_sent,copies_scheduled,bytes_sent\n");
        for link in &self.links {
            csv.push_str(&format!(
                "{},{},{},{},{}\n",
                link.link, link.kind, link.stats.frames_sent, link.stats.copies_scheduled, link.stats.bytes_sent
            ));
        }
        csv
    }

    /// Writes the totals to `path` and the per-application and per-link rows
    /// next to it as `<stem>_apps.csv` and `<stem>_links.csv`.
    ///
    /// Returns the paths written, totals first.
    pub fn to_csv_files<P: AsRef<Path>>(&self, path: P) -> std::io::Result<Vec<PathBuf>> {
        let path = path.as_ref();
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("report");
        let apps = path.with_file_name(format!("{stem}_apps.csv"));
        let links = path.with_file_name(format!("{stem}_links.csv"));

        self.to_csv_file(path)?;
        self.apps_to_csv_file(&apps)?;
        std::fs::write(&links, self.links_to_csv())?;
        Ok(vec![path.to_path_buf(), apps, links])
    }

    /// Writes a human-readable summary to a writer.
    pub fn write_summary<W: Write>(&self, mut w: W) -> std::io::Result<()> {
        writeln!(w, "=== Simulation Report ===")?;
        writeln!(w)?;

        writeln!(w, "--- Scheduler ---")?;
        writeln!(w, "Final simulation time: {}", format_time(self.final_time))?;
        writeln!(w, "Events processed: {}", self.events_processed)?;
        writeln!(w, "Events discarded: {}", self.events_discarded)?;
        writeln!(w, "Peak queue: {}", self.peak_queue)?;
        writeln!(w)?;

        writeln!(w, "--- Network ---")?;
        writeln!(w, "Routes installed: {}", self.routes_installed)?;
        writeln!(w, "Frames transmitted: {}", self.frames_transmitted)?;
        writeln!(w, "Frames delivered: {}", self.frames_delivered)?;
        writeln!(w, "Frames filtered: {}", self.frames_filtered)?;
        writeln!(
            w,
            "Drops: {} (no route {}, ttl {}, port unreachable {}, not listening {})",
            self.drops.total(),
            self.drops.no_route,
            self.drops.ttl_expired,
            self.drops.port_unreachable,
            self.drops.not_listening
        )?;
        writeln!(w)?;

        if !self.links.is_empty() {
            writeln!(w, "--- Links ---")?;
            for link in &self.links {
                writeln!(
                    w,
                    "Link {} ({}): {} frames, {} copies, {} bytes",
                    link.link, link.kind, link.stats.frames_sent, link.stats.copies_scheduled, link.stats.bytes_sent
                )?;
            }
            writeln!(w)?;
        }

        writeln!(w, "--- Timing ---")?;
        writeln!(w, "Wall time: {:.2} ms", self.wall_time_ms)?;
        writeln!(w, "Events/sec: {:.2}", self.events_per_second())?;
        writeln!(w)?;

        writeln!(w, "--- Applications ---")?;
        for app in &self.apps {
            writeln!(w, "App {} ({}) on node {} port {}: {}", app.app, app.kind, app.node, app.port, app.state)?;
            writeln!(w, "  Start: {}, Stop: {}", format_time(app.start), format_time(app.stop))?;
            writeln!(w, "  Sent: {}, Received: {}", app.sent, app.received)?;
            if let (Some(first), Some(last)) = (app.first_rtt, app.last_rtt) {
                writeln!(w, "  RTT first: {} ns, last: {} ns", first, last)?;
            }
            for (peer, count) in &app.received_from {
                writeln!(w, "  From {}: {}", peer, count)?;
            }
        }

        Ok(())
    }

    /// Returns the summary as a string.
    pub fn summary(&self) -> String {
        let mut buf = Vec::new();
        // Writing into a Vec cannot fail
        let _ = self.write_summary(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

/// A simple timer for measuring wall-clock time.
#[derive(Debug)]
pub struct Timer {
    start: std::time::Instant,
}

impl Timer {
    pub fn start() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }

    /// Returns elapsed time in milliseconds.
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::start()
    }
}
