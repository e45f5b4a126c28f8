//! Virtual-time event queue. Controllers never block: a command registers a
//! future event for one of its units and returns, and the machine later calls
//! back into the controller when the event comes due.

use log::trace;
use std::collections::{BTreeMap, HashMap};

/// The unit an event belongs to. Every controller numbers its units from zero;
/// the floppy controller's sector timer is just another unit number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventTarget {
    pub device: u8,
    pub unit: usize,
}

impl EventTarget {
    pub fn new(device: u8, unit: usize) -> Self {
        EventTarget { device, unit }
    }
}

/// A queue of (fire time, target) entries ordered by time, with first-in
/// first-out order among events due at the same time. Each target may have at
/// most one pending event.
#[derive(Debug, Default)]
pub struct Scheduler {
    now: u64,
    next_seq: u64,
    queue: BTreeMap<(u64, u64), EventTarget>,
    pending: HashMap<EventTarget, (u64, u64)>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time.
    pub fn now(&self) -> u64 {
        self.now
    }

    /// Schedule `target` to fire `delay` time units from now. Like the real
    /// event lists this models, activating a target that is already active
    /// leaves the original event alone; returns whether a new event was queued.
    pub fn activate(&mut self, target: EventTarget, delay: u64) -> bool {
        if self.is_active(target) {
            trace!("{:?} already active, not rescheduled.", target);
            return false;
        }
        let key = (self.now + delay, self.next_seq);
        self.next_seq += 1;
        self.queue.insert(key, target);
        self.pending.insert(target, key);
        trace!("{:?} scheduled for t={}.", target, key.0);
        true
    }

    /// Remove the pending event of `target`, if any. Returns whether one was
    /// removed.
    pub fn cancel(&mut self, target: EventTarget) -> bool {
        match self.pending.remove(&target) {
            Some(key) => {
                self.queue.remove(&key);
                trace!("{:?} cancelled.", target);
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, target: EventTarget) -> bool {
        self.pending.contains_key(&target)
    }

    /// Time left until `target` fires.
    pub fn time_remaining(&self, target: EventTarget) -> Option<u64> {
        self.pending.get(&target).map(|(at, _)| at.saturating_sub(self.now))
    }

    /// Fire time of the earliest pending event.
    pub fn next_event_time(&self) -> Option<u64> {
        self.queue.keys().next().map(|(at, _)| *at)
    }

    /// Take the earliest event if it is due at or before `limit`, advancing
    /// the clock to its fire time.
    pub fn pop_due(&mut self, limit: u64) -> Option<EventTarget> {
        let (&key, _) = self.queue.iter().next()?;
        if key.0 > limit {
            return None;
        }
        let target = self.queue.remove(&key)?;
        self.pending.remove(&target);
        self.now = self.now.max(key.0);
        Some(target)
    }

    /// Move the clock forward. Time never runs backwards.
    pub fn advance_to(&mut self, time: u64) {
        self.now = self.now.max(time);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: EventTarget = EventTarget { device: 0o27, unit: 0 };
    const B: EventTarget = EventTarget { device: 0o27, unit: 1 };
    const C: EventTarget = EventTarget { device: 0o33, unit: 2 };

    #[test]
    fn test_fires_in_time_order() {
        let mut s = Scheduler::new();
        assert!(s.activate(A, 300));
        assert!(s.activate(B, 100));
        assert!(s.activate(C, 200));
        assert_eq!(s.next_event_time(), Some(100));

        assert_eq!(s.pop_due(u64::MAX), Some(B));
        assert_eq!(s.now(), 100);
        assert_eq!(s.pop_due(u64::MAX), Some(C));
        assert_eq!(s.pop_due(250), None);
        assert_eq!(s.now(), 200);
        assert_eq!(s.pop_due(u64::MAX), Some(A));
        assert_eq!(s.now(), 300);
        assert_eq!(s.pop_due(u64::MAX), None);
    }

    #[test]
    fn test_same_time_is_fifo() {
        let mut s = Scheduler::new();
        s.activate(C, 10);
        s.activate(A, 10);
        s.activate(B, 10);
        assert_eq!(s.pop_due(10), Some(C));
        assert_eq!(s.pop_due(10), Some(A));
        assert_eq!(s.pop_due(10), Some(B));
    }

    #[test]
    fn test_one_event_per_target() {
        let mut s = Scheduler::new();
        assert!(s.activate(A, 50));
        assert!(!s.activate(A, 5));
        assert_eq!(s.time_remaining(A), Some(50));
        s.advance_to(20);
        assert_eq!(s.time_remaining(A), Some(30));
        assert_eq!(s.pop_due(u64::MAX), Some(A));
        assert!(!s.is_active(A));
    }

    #[test]
    fn test_clock_past_pending_event() {
        let mut s = Scheduler::new();
        s.activate(A, 10);
        s.advance_to(25);
        assert_eq!(s.time_remaining(A), Some(0));
        assert_eq!(s.pop_due(u64::MAX), Some(A));
        assert_eq!(s.now(), 25);
    }

    #[test]
    fn test_cancel() {
        let mut s = Scheduler::new();
        s.activate(A, 50);
        s.activate(B, 60);
        assert!(s.cancel(A));
        assert!(!s.cancel(A));
        assert!(!s.is_active(A));
        assert_eq!(s.pop_due(u64::MAX), Some(B));
        assert_eq!(s.pop_due(u64::MAX), None);
        // The clock never runs backwards.
        s.advance_to(10);
        assert_eq!(s.now(), 60);
    }
}
