//! The discrete-event scheduler.
//!
//! A single priority queue ordering all future events by `(time, seq)`. The
//! scheduler owns the simulated clock: time only moves forward when an event
//! is popped. There is no ambient global instance; whoever drives the run
//! owns the scheduler and lends it to handlers.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use tracing::trace;

use crate::event::{Event, EventPayload};
use crate::types::SimTime;

/// Result of draining the scheduler with [`Scheduler::run`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunOutcome {
    /// Events dispatched during this run
    pub dispatched: u64,
    /// Events still queued past the stop time, dropped without running
    pub discarded: usize,
    /// Clock value when the run ended
    pub final_time: SimTime,
}

/// Priority queue of future events plus the simulated clock.
#[derive(Debug, Default)]
pub struct Scheduler {
    queue: BinaryHeap<Reverse<Event>>,
    now: SimTime,
    next_seq: u64,
    dispatched: u64,
    peak_queue: usize,
    closed: bool,
}

impl Scheduler {
    /// Creates an empty scheduler with the clock at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current simulated time.
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Schedules `payload` to run `delay` after the current time.
    ///
    /// A zero delay still defers the event to a later pump of the loop.
    /// Returns the sequence number assigned to the event.
    pub fn schedule(&mut self, delay: SimTime, payload: EventPayload) -> u64 {
        self.schedule_at(self.now.saturating_add(delay), payload)
    }

    /// Schedules `payload` at absolute time `time`.
    ///
    /// # Panics
    ///
    /// Panics if `time` lies before the current clock, or if the scheduler has
    /// already completed its run.
    pub fn schedule_at(&mut self, time: SimTime, payload: EventPayload) -> u64 {
        assert!(!self.closed, "scheduler is closed: the run has already completed");
        assert!(
            time >= self.now,
            "cannot schedule {} at {} before the current time {}",
            payload.name(),
            time,
            self.now
        );

        let seq = self.next_seq;
        self.next_seq += 1;
        trace!(time, seq, event = payload.name(), "scheduled");
        self.queue.push(Reverse(Event::new(time, seq, payload)));
        self.peak_queue = self.peak_queue.max(self.queue.len());
        seq
    }

    /// Time of the next queued event.
    pub fn peek_time(&self) -> Option<SimTime> {
        self.queue.peek().map(|Reverse(event)| event.time)
    }

    /// Pops the next event if it is due no later than `stop_time`.
    ///
    /// Advances the clock to the event's timestamp.
    pub fn pop_due(&mut self, stop_time: Option<SimTime>) -> Option<Event> {
        let next = self.peek_time()?;
        if stop_time.is_some_and(|stop| next > stop) {
            return None;
        }

        let Reverse(event) = self.queue.pop()?;
        self.now = event.time;
        self.dispatched += 1;
        Some(event)
    }

    /// Drives the queue, handing each due event to `handler`.
    ///
    /// The loop ends when the queue is empty or the next event lies after
    /// `stop_time`. Events left in the queue are discarded and the clock is
    /// moved to `stop_time`. The scheduler is closed afterwards.
    pub fn run<F>(&mut self, stop_time: Option<SimTime>, mut handler: F) -> RunOutcome
    where
        F: FnMut(&mut Scheduler, Event),
    {
        let start = self.dispatched;
        while let Some(event) = self.pop_due(stop_time) {
            handler(self, event);
        }

        let discarded = self.queue.len();
        self.queue.clear();
        if let Some(stop) = stop_time {
            if discarded > 0 && stop > self.now {
                self.now = stop;
            }
        }
        self.closed = true;

        RunOutcome {
            dispatched: self.dispatched - start,
            discarded,
            final_time: self.now,
        }
    }

    /// Number of events waiting in the queue.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Returns true if no events are queued.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Total events dispatched so far.
    pub fn processed(&self) -> u64 {
        self.dispatched
    }

    /// Largest queue length observed.
    pub fn peak_queue(&self) -> usize {
        self.peak_queue
    }

    /// Whether a run has completed on this scheduler.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}
