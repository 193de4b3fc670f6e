//! Simulation driver.
//!
//! A [`SimulationBuilder`] takes ownership of a [`Topology`], installs
//! applications on it and freezes it into a [`Simulation`]: routes are
//! populated and every application's start and stop events are scheduled.
//! [`Simulation::run`] consumes the simulation, so a run is one-shot.
//!
//! # Example
//!
//! ```
//! use std::net::SocketAddrV4;
//! use pktsim::apps::{EchoClientConfig, EchoServerConfig, StartTime};
//! use pktsim::engine::SimulationBuilder;
//! use pktsim::link::{DataRate, LinkConfig};
//! use pktsim::topology::Topology;
//! use pktsim::types::{millis, seconds};
//!
//! let mut topology = Topology::new();
//! let [server, client] = [topology.add_node(), topology.add_node()];
//! let config = LinkConfig::new(DataRate::mbps(5), millis(2));
//! topology
//!     .connect_point_to_point(server, client, config, "10.1.1.0/24".parse().unwrap())
//!     .unwrap();
//! let remote = SocketAddrV4::new(topology.address_of(server, 0).unwrap(), 9);
//!
//! let mut builder = SimulationBuilder::new(topology);
//! builder.install_echo_server(server, EchoServerConfig::new(9)).unwrap();
//! let app = builder
//!     .install_echo_client(client, EchoClientConfig::new(remote).with_start(StartTime::Fixed(seconds(2))))
//!     .unwrap();
//!
//! let report = builder.build().unwrap().run(Some(seconds(20)));
//! assert_eq!(report.app(app).unwrap().received, 1);
//! assert_eq!(report.app(app).unwrap().first_rtt, Some(7_276_800));
//! ```

use std::collections::HashSet;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, trace};

use crate::apps::{
    Application, EchoClient, EchoClientConfig, EchoServer, EchoServerConfig, EPHEMERAL_PORT_BASE,
};
use crate::event::{Event, EventPayload};
use crate::link::Attachment;
use crate::packet::{Frame, Packet};
use crate::routing::populate_routes;
use crate::scheduler::Scheduler;
use crate::stats::{AppReport, DropStats, LinkReport, RunReport, Timer};
use crate::topology::{Topology, TopologyError, TopologyResult};
use crate::trace::{PacketTracer, TraceDirection, TraceRecord};
use crate::types::{format_time, AppId, IfIndex, LinkId, NodeId, Port, SimTime};

/// Default seed of the start-time RNG.
pub const DEFAULT_SEED: u64 = 1;

/// Collects applications and options before the topology is frozen.
pub struct SimulationBuilder {
    topology: Topology,
    apps: Vec<Application>,
    bound: HashSet<(NodeId, Port)>,
    rng: ChaCha8Rng,
    tracer: Option<Box<dyn PacketTracer>>,
}

impl SimulationBuilder {
    pub fn new(topology: Topology) -> Self {
        Self {
            topology,
            apps: Vec::new(),
            bound: HashSet::new(),
            rng: ChaCha8Rng::seed_from_u64(DEFAULT_SEED),
            tracer: None,
        }
    }

    /// Reseeds the RNG used to draw application start times.
    ///
    /// Applications installed before this call keep their start times.
    pub fn seed(mut self, seed: u64) -> Self {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
        self
    }

    /// Attaches a packet tracer.
    pub fn tracer(mut self, tracer: impl PacketTracer + 'static) -> Self {
        self.tracer = Some(Box::new(tracer));
        self
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Installs an echo server on `node`.
    pub fn install_echo_server(&mut self, node: NodeId, config: EchoServerConfig) -> TopologyResult<AppId> {
        self.bind(node, config.port)?;
        let app = Application::Server(EchoServer::new(node, config));
        Ok(self.push_app(node, app))
    }

    /// Installs an echo client on `node`, bound to the node's next ephemeral port.
    ///
    /// The start time is drawn here, so installation order decides which
    /// random draw each client gets.
    pub fn install_echo_client(&mut self, node: NodeId, config: EchoClientConfig) -> TopologyResult<AppId> {
        // A zero interval would re-arm the timer at the same instant forever
        if config.interval == 0 {
            return Err(TopologyError::ZeroInterval(node));
        }
        let topology_node = self.topology.node(node).ok_or(TopologyError::UnknownNode(node))?;
        let clients = topology_node
            .apps()
            .iter()
            .filter(|&&app| self.apps[app].as_client().is_some())
            .count();
        let port = EPHEMERAL_PORT_BASE.saturating_add(clients as Port);
        self.bind(node, port)?;

        let start = config.start.sample(&mut self.rng);
        debug!(node, port, start = %format_time(start), "echo client installed");
        let app = Application::Client(EchoClient::new(node, port, config, start));
        Ok(self.push_app(node, app))
    }

    fn bind(&mut self, node: NodeId, port: Port) -> TopologyResult<()> {
        if self.topology.node(node).is_none() {
            return Err(TopologyError::UnknownNode(node));
        }
        if !self.bound.insert((node, port)) {
            return Err(TopologyError::PortInUse { node, port });
        }
        Ok(())
    }

    fn push_app(&mut self, node: NodeId, app: Application) -> AppId {
        let id = self.apps.len();
        self.apps.push(app);
        if let Some(n) = self.topology.node_mut(node) {
            n.add_app(id);
        }
        id
    }

    /// Freezes the topology: populates routes and schedules every
    /// application's start and stop.
    pub fn build(self) -> TopologyResult<Simulation> {
        let SimulationBuilder {
            mut topology,
            apps,
            tracer,
            ..
        } = self;
        topology.validate()?;
        let routes_installed = populate_routes(&mut topology);

        let mut scheduler = Scheduler::new();
        for (id, app) in apps.iter().enumerate() {
            scheduler.schedule_at(app.start_time(), EventPayload::AppStart { app: id });
            scheduler.schedule_at(app.stop_time(), EventPayload::AppStop { app: id });
        }
        info!(
            nodes = topology.node_count(),
            links = topology.link_count(),
            apps = apps.len(),
            routes = routes_installed,
            "simulation built"
        );

        Ok(Simulation {
            scheduler,
            world: World {
                topology,
                apps,
                tracer,
                next_uid: 1,
                routes_installed,
                counters: NetworkCounters::default(),
            },
        })
    }
}

/// A frozen, ready-to-run simulation.
pub struct Simulation {
    scheduler: Scheduler,
    world: World,
}

impl Simulation {
    /// Builds a simulation without applications.
    pub fn build(topology: Topology) -> TopologyResult<Simulation> {
        SimulationBuilder::new(topology).build()
    }

    pub fn builder(topology: Topology) -> SimulationBuilder {
        SimulationBuilder::new(topology)
    }

    pub fn topology(&self) -> &Topology {
        &self.world.topology
    }

    pub fn apps(&self) -> &[Application] {
        &self.world.apps
    }

    /// Events scheduled but not yet run.
    pub fn pending(&self) -> usize {
        self.scheduler.pending()
    }

    /// Runs until the queue drains or the next event lies after `stop_time`.
    pub fn run(self, stop_time: Option<SimTime>) -> RunReport {
        let Simulation {
            mut scheduler,
            mut world,
        } = self;

        info!(stop = ?stop_time.map(format_time), events = scheduler.pending(), "simulation started");
        let timer = Timer::start();
        let outcome = scheduler.run(stop_time, |sched, event| world.dispatch(sched, event));
        let wall_time_ms = timer.elapsed_ms();
        info!(
            events = outcome.dispatched,
            discarded = outcome.discarded,
            time = %format_time(outcome.final_time),
            wall_ms = wall_time_ms,
            "simulation finished"
        );

        let apps = world
            .apps
            .iter()
            .enumerate()
            .map(|(id, app)| app_report(id, app))
            .collect();
        let links = world
            .topology
            .links()
            .iter()
            .map(|link| LinkReport {
                link: link.id(),
                kind: link.kind(),
                stats: *link.stats(),
            })
            .collect();

        RunReport {
            events_processed: outcome.dispatched,
            events_discarded: outcome.discarded as u64,
            final_time: outcome.final_time,
            peak_queue: scheduler.peak_queue(),
            frames_transmitted: world.counters.frames_transmitted,
            frames_delivered: world.counters.frames_delivered,
            frames_filtered: world.counters.frames_filtered,
            routes_installed: world.routes_installed,
            drops: world.counters.drops,
            links,
            apps,
            wall_time_ms,
        }
    }
}

fn app_report(id: AppId, app: &Application) -> AppReport {
    let counters = app.counters();
    AppReport {
        app: id,
        node: app.node(),
        kind: app.kind(),
        port: app.port(),
        state: app.state_name().to_string(),
        start: app.start_time(),
        stop: app.stop_time(),
        sent: counters.sent,
        received: counters.received,
        bytes_sent: counters.bytes_sent,
        bytes_received: counters.bytes_received,
        first_rtt: counters.first_rtt,
        last_rtt: counters.last_rtt,
        received_from: app
            .as_server()
            .map(|s| s.received_from().clone())
            .unwrap_or_default(),
    }
}

#[derive(Debug, Default)]
struct NetworkCounters {
    frames_transmitted: u64,
    frames_delivered: u64,
    frames_filtered: u64,
    drops: DropStats,
}

/// Everything the event handlers mutate, apart from the scheduler.
struct World {
    topology: Topology,
    apps: Vec<Application>,
    tracer: Option<Box<dyn PacketTracer>>,
    next_uid: u64,
    routes_installed: usize,
    counters: NetworkCounters,
}

impl World {
    fn dispatch(&mut self, sched: &mut Scheduler, event: Event) {
        trace!(time = event.time, seq = event.seq, event = event.payload.name(), "dispatch");
        match event.payload {
            EventPayload::FrameArrival {
                link,
                node,
                iface,
                frame,
            } => self.receive_frame(sched, link, node, iface, frame),
            EventPayload::Loopback { node, packet } => self.deliver_local(sched, node, packet),
            EventPayload::AppStart { app } => self.start_app(sched, app),
            EventPayload::AppStop { app } => self.stop_app(sched.now(), app),
            EventPayload::AppTimer { app } => self.app_timer(sched, app),
        }
    }

    fn start_app(&mut self, sched: &mut Scheduler, id: AppId) {
        let now = sched.now();
        let Some(app) = self.apps.get_mut(id) else {
            return;
        };
        match app {
            Application::Server(server) => server.on_start(now),
            Application::Client(client) => {
                let node = client.node();
                if let Some(packet) = client.on_start(now) {
                    self.client_sent(sched, id, node, packet);
                }
            }
        }
    }

    fn app_timer(&mut self, sched: &mut Scheduler, id: AppId) {
        let now = sched.now();
        if let Some(Application::Client(client)) = self.apps.get_mut(id) {
            let node = client.node();
            if let Some(packet) = client.on_timer(now) {
                self.client_sent(sched, id, node, packet);
            }
        }
    }

    /// Hands a client's request to the network and arms its next timer.
    fn client_sent(&mut self, sched: &mut Scheduler, id: AppId, node: NodeId, packet: Packet) {
        if let Some(Application::Client(client)) = self.apps.get(id) {
            if client.wants_timer() {
                sched.schedule(client.config().interval, EventPayload::AppTimer { app: id });
            }
        }
        self.send_from(sched, node, packet);
    }

    fn stop_app(&mut self, now: SimTime, id: AppId) {
        match self.apps.get_mut(id) {
            Some(Application::Server(server)) => server.on_stop(now),
            Some(Application::Client(client)) => client.on_stop(now),
            None => {}
        }
    }

    /// Network-layer send: route lookup, source fill-in, frame onto the link.
    fn send_from(&mut self, sched: &mut Scheduler, node: NodeId, mut packet: Packet) {
        let now = sched.now();
        if packet.uid == 0 {
            packet.uid = self.next_uid;
            self.next_uid += 1;
        }

        let Some(this) = self.topology.node(node) else {
            return;
        };
        let dst = *packet.dst.ip();
        if this.owns_address(dst) {
            if packet.src.ip().is_unspecified() {
                packet.src.set_ip(dst);
            }
            sched.schedule(0, EventPayload::Loopback { node, packet });
            return;
        }

        let Some(route) = this.routes().lookup(dst).copied() else {
            debug!(node, %dst, uid = packet.uid, time = %format_time(now), "no route, packet dropped");
            self.counters.drops.no_route += 1;
            return;
        };
        let Some(iface) = this.interface(route.iface) else {
            return;
        };
        if packet.src.ip().is_unspecified() {
            packet.src.set_ip(iface.address);
        }
        let link_id = iface.link;
        let frame = Frame::new(route.next_hop(dst), packet);

        self.trace(TraceDirection::Transmit, now, link_id, node, route.iface, &frame);
        if let Some(link) = self.topology.link_mut(link_id) {
            let copies = link.transmit(Attachment::new(node, route.iface), frame, sched);
            self.counters.frames_transmitted += 1;
            trace!(node, link = link_id, copies, "frame transmitted");
        }
    }

    fn receive_frame(&mut self, sched: &mut Scheduler, link: LinkId, node: NodeId, iface: IfIndex, frame: Frame) {
        self.trace(TraceDirection::Receive, sched.now(), link, node, iface, &frame);

        let accepted = self
            .topology
            .interface(node, iface)
            .is_ok_and(|i| i.accepts(frame.next_hop));
        if !accepted {
            self.counters.frames_filtered += 1;
            return;
        }
        self.counters.frames_delivered += 1;

        let mut packet = frame.packet;
        let for_us = self
            .topology
            .node(node)
            .is_some_and(|n| n.owns_address(*packet.dst.ip()));
        if for_us {
            self.deliver_local(sched, node, packet);
            return;
        }

        packet.ttl = packet.ttl.saturating_sub(1);
        if packet.ttl == 0 {
            debug!(node, uid = packet.uid, "ttl expired, packet dropped");
            self.counters.drops.ttl_expired += 1;
            return;
        }
        trace!(node, uid = packet.uid, dst = %packet.dst, "forwarding");
        self.send_from(sched, node, packet);
    }

    /// Hands a packet to the application bound to its destination port.
    fn deliver_local(&mut self, sched: &mut Scheduler, node: NodeId, packet: Packet) {
        let now = sched.now();
        let port = packet.dst.port();
        let bound = self
            .topology
            .node(node)
            .and_then(|n| n.apps().iter().copied().find(|&a| self.apps[a].port() == port));
        let Some(id) = bound else {
            debug!(node, port, uid = packet.uid, "port unreachable, packet dropped");
            self.counters.drops.port_unreachable += 1;
            return;
        };
        if !self.apps[id].is_receiving() {
            debug!(node, port, app = id, "application not listening, packet dropped");
            self.counters.drops.not_listening += 1;
            return;
        }

        match &mut self.apps[id] {
            Application::Server(server) => {
                if let Some(reply) = server.on_request(now, &packet) {
                    self.send_from(sched, node, reply);
                }
            }
            Application::Client(client) => client.on_reply(now, &packet),
        }
    }

    fn trace(&mut self, direction: TraceDirection, time: SimTime, link: LinkId, node: NodeId, iface: IfIndex, frame: &Frame) {
        let Some(tracer) = self.tracer.as_mut() else {
            return;
        };
        let record = TraceRecord {
            time,
            direction,
            link,
            node,
            iface,
            frame: frame.clone(),
        };
        match direction {
            TraceDirection::Transmit => tracer.on_transmit(&record),
            TraceDirection::Receive => tracer.on_receive(&record),
        }
    }
}
