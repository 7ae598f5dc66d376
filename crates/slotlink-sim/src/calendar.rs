//! Virtual time: an event calendar plus the clock and timers the scheduler
//! sees.
//!
//! Timers are generation-tokened. Every `schedule` or `cancel` bumps the
//! timer's generation, so an event queued for an older generation is
//! recognised as stale when it comes off the heap and is never delivered.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::rc::Rc;

use slotlink_core::net::interface::{Clock, Timer, TimerStatus, UserId};

/// The two timers a scheduler owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerId {
    Slot,
    Tx,
}

impl TimerId {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimerId::Slot => "slot",
            TimerId::Tx => "tx",
        }
    }

    fn index(self) -> usize {
        match self {
            TimerId::Slot => 0,
            TimerId::Tx => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Timer { id: TimerId, generation: u64 },
    Arrival(UserId),
    ChannelStep,
}

/// A calendar entry. Ordered by time, then by insertion order.
#[derive(Debug, Clone, Copy)]
pub struct Event {
    pub at: f64,
    seq: u64,
    pub kind: EventKind,
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    // Reversed: BinaryHeap is a max-heap and we want the earliest event.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .at
            .total_cmp(&self.at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct TimerSlot {
    status: TimerStatus,
    generation: u64,
}

/// Min-heap of pending events and the current virtual time.
#[derive(Debug, Default)]
pub struct EventCalendar {
    now: f64,
    next_seq: u64,
    heap: BinaryHeap<Event>,
    timers: [TimerSlot; 2],
}

pub type SharedCalendar = Rc<RefCell<EventCalendar>>;

impl EventCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedCalendar {
        Rc::new(RefCell::new(Self::new()))
    }

    pub fn now(&self) -> f64 {
        self.now
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn push(&mut self, at: f64, kind: EventKind) {
        debug_assert!(at >= self.now, "event at {at} scheduled in the past ({})", self.now);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Event { at, seq, kind });
    }

    /// Pops the next event due at or before `until` and moves the clock to it.
    pub fn pop_until(&mut self, until: f64) -> Option<Event> {
        if self.heap.peek()?.at > until {
            return None;
        }
        let event = self.heap.pop()?;
        self.now = event.at;
        Some(event)
    }

    /// Moves the clock forward without consuming events.
    pub fn advance_to(&mut self, t: f64) {
        if t > self.now {
            self.now = t;
        }
    }

    pub fn timer_status(&self, id: TimerId) -> TimerStatus {
        self.timers[id.index()].status
    }

    pub fn arm(&mut self, id: TimerId, delay_s: f64) {
        debug_assert!(delay_s >= 0.0, "negative timer delay {delay_s}");
        let slot = &mut self.timers[id.index()];
        slot.generation += 1;
        slot.status = TimerStatus::Pending;
        let generation = slot.generation;
        let at = self.now + delay_s.max(0.0);
        self.push(at, EventKind::Timer { id, generation });
    }

    pub fn disarm(&mut self, id: TimerId) {
        let slot = &mut self.timers[id.index()];
        slot.generation += 1;
        slot.status = TimerStatus::Idle;
    }

    /// Marks `id` as firing if `generation` is its live expiry. Returns
    /// `false` for a stale event.
    pub fn begin_firing(&mut self, id: TimerId, generation: u64) -> bool {
        let slot = &mut self.timers[id.index()];
        if slot.generation != generation || slot.status != TimerStatus::Pending {
            return false;
        }
        slot.status = TimerStatus::Firing;
        true
    }

    /// Ends a callback. A timer not re-armed inside it goes idle.
    pub fn end_firing(&mut self, id: TimerId) {
        let slot = &mut self.timers[id.index()];
        if slot.status == TimerStatus::Firing {
            slot.status = TimerStatus::Idle;
        }
    }
}

/// Read-only view of the calendar's virtual time.
#[derive(Clone)]
pub struct SimClock {
    calendar: SharedCalendar,
}

impl SimClock {
    pub fn new(calendar: SharedCalendar) -> Self {
        Self { calendar }
    }
}

impl Clock for SimClock {
    fn now(&self) -> f64 {
        self.calendar.borrow().now()
    }
}

pub struct SimTimer {
    id: TimerId,
    calendar: SharedCalendar,
}

impl SimTimer {
    pub fn new(id: TimerId, calendar: SharedCalendar) -> Self {
        Self { id, calendar }
    }
}

impl Timer for SimTimer {
    fn schedule(&mut self, delay_s: f64) {
        self.calendar.borrow_mut().arm(self.id, delay_s);
    }

    fn cancel(&mut self) {
        self.calendar.borrow_mut().disarm(self.id);
    }

    fn status(&self) -> TimerStatus {
        self.calendar.borrow().timer_status(self.id)
    }
}
