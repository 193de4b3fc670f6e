//! Packet trace hooks.
//!
//! A [`PacketTracer`] sees every frame put on a link and every copy that
//! reaches an interface, before link-layer filtering. Two tracers are
//! provided: [`TraceRecorder`] keeps records in memory and
//! [`JsonLinesTracer`] writes one JSON object per line to any writer.

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::packet::Frame;
use crate::types::{IfIndex, LinkId, NodeId, SimTime};

/// Whether the frame was leaving or arriving at the interface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceDirection {
    Transmit,
    Receive,
}

/// One traced frame.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub time: SimTime,
    pub direction: TraceDirection,
    pub link: LinkId,
    pub node: NodeId,
    pub iface: IfIndex,
    pub frame: Frame,
}

/// Observer of link activity.
pub trait PacketTracer {
    fn on_transmit(&mut self, record: &TraceRecord);

    fn on_receive(&mut self, record: &TraceRecord);
}

impl<T: PacketTracer + ?Sized> PacketTracer for Box<T> {
    fn on_transmit(&mut self, record: &TraceRecord) {
        (**self).on_transmit(record);
    }

    fn on_receive(&mut self, record: &TraceRecord) {
        (**self).on_receive(record);
    }
}

/// Shared handle, so a caller can inspect a tracer after the simulation
/// that owned it has been consumed.
impl<T: PacketTracer> PacketTracer for Rc<RefCell<T>> {
    fn on_transmit(&mut self, record: &TraceRecord) {
        self.borrow_mut().on_transmit(record);
    }

    fn on_receive(&mut self, record: &TraceRecord) {
        self.borrow_mut().on_receive(record);
    }
}

/// Keeps every record in memory.
#[derive(Clone, Debug, Default)]
pub struct TraceRecorder {
    records: Vec<TraceRecord>,
}

impl TraceRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[TraceRecord] {
        &self.records
    }

    pub fn transmits(&self) -> impl Iterator<Item = &TraceRecord> {
        self.records.iter().filter(|r| r.direction == TraceDirection::Transmit)
    }

    pub fn receives(&self) -> impl Iterator<Item = &TraceRecord> {
        self.records.iter().filter(|r| r.direction == TraceDirection::Receive)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl PacketTracer for TraceRecorder {
    fn on_transmit(&mut self, record: &TraceRecord) {
        self.records.push(record.clone());
    }

    fn on_receive(&mut self, record: &TraceRecord) {
        self.records.push(record.clone());
    }
}

/// Writes records as JSON lines.
///
/// The first write error is kept and returned by [`finish`](Self::finish);
/// later records are skipped.
#[derive(Debug)]
pub struct JsonLinesTracer<W: Write> {
    writer: W,
    written: u64,
    error: Option<io::Error>,
}

impl<W: Write> JsonLinesTracer<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            written: 0,
            error: None,
        }
    }

    /// Number of lines written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flushes and returns the writer, or the first error encountered.
    pub fn finish(mut self) -> io::Result<W> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        self.writer.flush()?;
        Ok(self.writer)
    }

    fn write_record(&mut self, record: &TraceRecord) {
        if self.error.is_some() {
            return;
        }
        let result = serde_json::to_writer(&mut self.writer, record)
            .map_err(io::Error::from)
            .and_then(|()| self.writer.write_all(b"\n"));
        match result {
            Ok(()) => self.written += 1,
            Err(err) => {
                warn!(error = %err, "packet trace write failed, further records dropped");
                self.error = Some(err);
            }
        }
    }
}

impl<W: Write> PacketTracer for JsonLinesTracer<W> {
    fn on_transmit(&mut self, record: &TraceRecord) {
        self.write_record(record);
    }

    fn on_receive(&mut self, record: &TraceRecord) {
        self.write_record(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Packet;
    use std::net::{Ipv4Addr, SocketAddrV4};

    fn record(direction: TraceDirection) -> TraceRecord {
        let dst = SocketAddrV4::new(Ipv4Addr::new(10, 1, 1, 1), 9);
        TraceRecord {
            time: 2_000_000_000,
            direction,
            link: 0,
            node: 1,
            iface: 0,
            frame: Frame::new(*dst.ip(), Packet::echo_request(49153, dst, 1024, 0, 2_000_000_000)),
        }
    }

    #[test]
    fn test_recorder() {
        let mut recorder = TraceRecorder::new();
        recorder.on_transmit(&record(TraceDirection::Transmit));
        recorder.on_receive(&record(TraceDirection::Receive));
        assert_eq!(recorder.len(), 2);
        assert_eq!(recorder.transmits().count(), 1);
        assert_eq!(recorder.receives().count(), 1);
    }

    #[test]
    fn test_shared_recorder() {
        let shared = Rc::new(RefCell::new(TraceRecorder::new()));
        let mut handle: Box<dyn PacketTracer> = Box::new(Rc::clone(&shared));
        handle.on_transmit(&record(TraceDirection::Transmit));
        assert_eq!(shared.borrow().len(), 1);
    }

    #[test]
    fn test_json_lines() {
        let mut tracer = JsonLinesTracer::new(Vec::new());
        tracer.on_transmit(&record(TraceDirection::Transmit));
        tracer.on_receive(&record(TraceDirection::Receive));
        assert_eq!(tracer.written(), 2);

        let out = String::from_utf8(tracer.finish().unwrap()).unwrap();
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: TraceRecord = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(parsed.direction, TraceDirection::Receive);
        assert_eq!(parsed.frame.packet.size, 1024);
    }
}
