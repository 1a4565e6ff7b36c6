//! The discrete-event scheduler driving the simulation.

use crate::network::Packet;
use crate::VehicleId;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Duration;

/// A deferred action of the simulation.
#[derive(Clone, Debug)]
pub enum Event {
    /// Advance the experiment by one traffic step.
    Step,
    /// Let the governor choose vehicles that should change lanes.
    SelectVehicles,
    /// A packet leaves its sender's network device.
    Transmit(Packet),
    /// Evaluate the responses collected for a lane change request.
    RunAlgorithm { vehicle: VehicleId, lane: u32 },
    /// Act on a lane change recommendation.
    Recommend {
        vehicle: VehicleId,
        recommend: bool,
        lane: u32,
    },
    /// Check that a recommended lane change actually happened.
    VerifyLaneChange { vehicle: VehicleId, lane: u32 },
    /// Start a fresh lane change negotiation.
    ChangeLane { vehicle: VehicleId, lane: u32 },
}

/// An event waiting in the queue.
struct Scheduled<E> {
    /// The simulation time at which the event is due.
    time: Duration,
    /// Submission order, used to break ties between events due at the same time.
    seq: u64,
    event: E,
}

impl<E> PartialEq for Scheduled<E> {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}

impl<E> Eq for Scheduled<E> {}

impl<E> PartialOrd for Scheduled<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for Scheduled<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the max-heap yields the earliest event first
        (other.time, other.seq).cmp(&(self.time, self.seq))
    }
}

/// A queue of timestamped events, executed strictly in time order.
/// Events due at the same time are executed in the order they were scheduled.
pub struct EventQueue<E> {
    heap: BinaryHeap<Scheduled<E>>,
    /// The next sequence number.
    seq: u64,
    /// The current simulation time.
    now: Duration,
}

impl<E> Default for EventQueue<E> {
    fn default() -> Self {
        Self {
            heap: BinaryHeap::new(),
            seq: 0,
            now: Duration::ZERO,
        }
    }
}

impl<E> EventQueue<E> {
    /// Creates an empty queue at time zero.
    pub fn new() -> Self {
        Default::default()
    }

    /// The current simulation time.
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Schedules an event to occur `delay` after the current time.
    pub fn schedule(&mut self, delay: Duration, event: E) {
        self.schedule_at(self.now + delay, event);
    }

    /// Schedules an event at an absolute time.
    /// Times in the past are clamped to the current time.
    pub fn schedule_at(&mut self, time: Duration, event: E) {
        let time = time.max(self.now);
        self.seq += 1;
        self.heap.push(Scheduled {
            time,
            seq: self.seq,
            event,
        });
    }

    /// The time of the next pending event.
    pub fn peek_time(&self) -> Option<Duration> {
        self.heap.peek().map(|s| s.time)
    }

    /// Removes the next event if it is due no later than `until`,
    /// advancing the current time to the event's time.
    pub fn pop_until(&mut self, until: Duration) -> Option<(Duration, E)> {
        if self.peek_time()? > until {
            return None;
        }
        let Scheduled { time, event, .. } = self.heap.pop()?;
        self.now = time;
        Some((time, event))
    }

    /// Moves the current time forward. Has no effect if `time` is in the past.
    pub fn advance_to(&mut self, time: Duration) {
        self.now = self.now.max(time);
    }

    /// The number of pending events.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Whether no events are pending.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::EventQueue;
    use std::time::Duration;

    #[test]
    fn pops_in_time_order() {
        let mut queue = EventQueue::new();
        queue.schedule(Duration::from_secs(3), 'c');
        queue.schedule(Duration::from_secs(1), 'a');
        queue.schedule(Duration::from_secs(2), 'b');

        let order: Vec<_> = std::iter::from_fn(|| queue.pop_until(Duration::MAX))
            .map(|(_, e)| e)
            .collect();
        assert_eq!(order, ['a', 'b', 'c']);
        assert_eq!(queue.now(), Duration::from_secs(3));
    }

    #[test]
    fn ties_keep_submission_order() {
        let mut queue = EventQueue::new();
        for i in 0..10 {
            queue.schedule(Duration::from_millis(100), i);
        }
        let order: Vec<_> = std::iter::from_fn(|| queue.pop_until(Duration::MAX))
            .map(|(_, e)| e)
            .collect();
        assert_eq!(order, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn stops_at_horizon() {
        let mut queue = EventQueue::new();
        queue.schedule(Duration::from_secs(1), 1);
        queue.schedule(Duration::from_secs(5), 2);

        assert_eq!(queue.pop_until(Duration::from_secs(2)), Some((Duration::from_secs(1), 1)));
        assert_eq!(queue.pop_until(Duration::from_secs(2)), None);
        assert_eq!(queue.len(), 1);

        queue.advance_to(Duration::from_secs(2));
        queue.schedule(Duration::from_secs(1), 3);
        assert_eq!(queue.peek_time(), Some(Duration::from_secs(3)));
    }

    #[test]
    fn delays_are_relative_to_current_time() {
        let mut queue = EventQueue::new();
        queue.schedule(Duration::from_secs(10), "late");
        queue.schedule_at(Duration::from_secs(2), "early");
        let (time, _) = queue.pop_until(Duration::MAX).unwrap();
        assert_eq!(time, Duration::from_secs(2));

        queue.schedule(Duration::from_millis(100), "after early");
        let (time, event) = queue.pop_until(Duration::MAX).unwrap();
        assert_eq!(time, Duration::from_millis(2100));
        assert_eq!(event, "after early");
    }
}
