//! Periodic task scheduler driven by explicit instants.
//!
//! The scheduler never sleeps on its own. The runtime asks for the next
//! deadline, waits for it, and then calls [`Scheduler::due`]; tests call
//! `due` with synthetic instants instead.

use std::time::{Duration, Instant};

const MIN_PERIOD: Duration = Duration::from_millis(1);

#[derive(Debug, Clone)]
struct Periodic<K> {
    key: K,
    period: Duration,
    next: Instant,
}

/// Independently-rated periodic tasks identified by `K`.
#[derive(Debug, Clone)]
pub struct Scheduler<K> {
    tasks: Vec<Periodic<K>>,
}

impl<K> Default for Scheduler<K> {
    fn default() -> Self {
        Self { tasks: Vec::new() }
    }
}

impl<K: Copy + PartialEq> Scheduler<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `key` every `period`, first at `start + period`.
    ///
    /// Re-registering a key replaces its previous schedule.
    pub fn every(&mut self, key: K, period: Duration, start: Instant) {
        self.cancel(key);
        let period = period.max(MIN_PERIOD);
        self.tasks.push(Periodic {
            key,
            period,
            next: start + period,
        });
    }

    /// Stop running `key`. Returns false if it was not scheduled.
    pub fn cancel(&mut self, key: K) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|task| task.key != key);
        self.tasks.len() != before
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.tasks.iter().map(|task| task.next).min()
    }

    /// Keys whose deadline is at or before `now`, in registration order.
    ///
    /// A task that fell behind fires once and its missed periods are skipped.
    pub fn due(&mut self, now: Instant) -> Vec<K> {
        let mut fired = Vec::new();
        for task in &mut self.tasks {
            if task.next > now {
                continue;
            }
            fired.push(task.key);
            let behind = now.duration_since(task.next).as_nanos() / task.period.as_nanos();
            let periods = u32::try_from(behind + 1).unwrap_or(u32::MAX);
            task.next += task.period * periods;
        }
        fired
    }
}
