// ABOUTME: Per-build FIFO of swarms waiting on an in-flight build.
// ABOUTME: Enqueue and drain-all are atomic with respect to each other.

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::model::{BuildKey, BuildStatus};

/// Queues and final statuses of one build's attempts.
struct Attempts<T> {
    waiting: BTreeMap<u32, VecDeque<T>>,
    finished: BTreeMap<u32, BuildStatus>,
}

impl<T> Default for Attempts<T> {
    fn default() -> Self {
        Self {
            waiting: BTreeMap::new(),
            finished: BTreeMap::new(),
        }
    }
}

/// Outcome of [`WaitList::push`].
#[derive(Debug)]
pub enum Enqueued<T> {
    /// The waiter is queued and will be handed back by `finish`.
    Queued,
    /// The attempt finished before the waiter got in line; the caller keeps
    /// the waiter and acts on the status itself.
    AlreadyFinished { waiter: T, status: BuildStatus },
}

/// Wait-lists keyed by build, one queue per attempt. A late waiter for
/// attempt `n` never joins or displaces the queue of attempt `n + 1`; it
/// gets attempt `n`'s recorded status instead.
pub struct WaitList<T> {
    builds: Mutex<HashMap<BuildKey, Attempts<T>>>,
}

impl<T> Default for WaitList<T> {
    fn default() -> Self {
        Self {
            builds: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> WaitList<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, key: &BuildKey, attempt: u32, waiter: T) -> Enqueued<T> {
        let mut builds = self.builds.lock();
        let attempts = builds.entry(key.clone()).or_default();

        if let Some(status) = attempts.finished.get(&attempt) {
            return Enqueued::AlreadyFinished {
                waiter,
                status: *status,
            };
        }
        attempts.waiting.entry(attempt).or_default().push_back(waiter);
        Enqueued::Queued
    }

    /// Mark `attempt` finished and take every waiter queued for it, in
    /// arrival order. Queues of other attempts are left alone.
    pub fn finish(&self, key: &BuildKey, attempt: u32, status: BuildStatus) -> Vec<T> {
        let mut builds = self.builds.lock();
        let attempts = builds.entry(key.clone()).or_default();
        attempts.finished.insert(attempt, status);
        attempts
            .waiting
            .remove(&attempt)
            .map(Vec::from)
            .unwrap_or_default()
    }

    /// Waiters currently queued for `key`, across attempts.
    pub fn waiting(&self, key: &BuildKey) -> usize {
        self.builds
            .lock()
            .get(key)
            .map_or(0, |attempts| attempts.waiting.values().map(VecDeque::len).sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AppName;

    fn key() -> BuildKey {
        BuildKey::new(AppName::new("billing").unwrap(), "v3")
    }

    #[test]
    fn finish_drains_in_arrival_order() {
        let list = WaitList::new();
        assert!(matches!(list.push(&key(), 1, "a"), Enqueued::Queued));
        assert!(matches!(list.push(&key(), 1, "b"), Enqueued::Queued));
        assert_eq!(list.waiting(&key()), 2);

        let drained = list.finish(&key(), 1, BuildStatus::Success);
        assert_eq!(drained, vec!["a", "b"]);
        assert_eq!(list.waiting(&key()), 0);
    }

    #[test]
    fn late_waiter_learns_outcome() {
        let list = WaitList::new();
        list.push(&key(), 1, "a");
        list.finish(&key(), 1, BuildStatus::Failed);

        match list.push(&key(), 1, "late") {
            Enqueued::AlreadyFinished { waiter, status } => {
                assert_eq!(waiter, "late");
                assert_eq!(status, BuildStatus::Failed);
            }
            Enqueued::Queued => panic!("late waiter should not be queued"),
        }
    }

    #[test]
    fn new_attempt_queues_after_failed_one() {
        let list = WaitList::new();
        list.push(&key(), 1, "a");
        list.finish(&key(), 1, BuildStatus::Failed);

        assert!(matches!(list.push(&key(), 2, "b"), Enqueued::Queued));
        assert_eq!(list.finish(&key(), 2, BuildStatus::Success), vec!["b"]);
    }

    #[test]
    fn finishing_old_attempt_leaves_newer_queue_alone() {
        let list = WaitList::new();
        list.push(&key(), 2, "b");
        assert!(list.finish(&key(), 1, BuildStatus::Success).is_empty());
        assert_eq!(list.waiting(&key()), 1);
    }

    #[test]
    fn late_waiter_for_old_attempt_keeps_newer_queue() {
        let list = WaitList::new();
        list.push(&key(), 1, "a");
        list.finish(&key(), 1, BuildStatus::Failed);
        assert!(matches!(list.push(&key(), 2, "claimant"), Enqueued::Queued));

        match list.push(&key(), 1, "late") {
            Enqueued::AlreadyFinished { waiter, status } => {
                assert_eq!(waiter, "late");
                assert_eq!(status, BuildStatus::Failed);
            }
            Enqueued::Queued => panic!("late waiter joined a finished attempt"),
        }

        assert_eq!(list.finish(&key(), 2, BuildStatus::Success), vec!["claimant"]);
        assert_eq!(list.waiting(&key()), 0);
    }

    #[test]
    fn newer_attempt_queues_beside_undrained_older_one() {
        let list = WaitList::new();
        list.push(&key(), 1, "a");
        list.push(&key(), 2, "b");
        assert_eq!(list.waiting(&key()), 2);

        assert_eq!(list.finish(&key(), 1, BuildStatus::Failed), vec!["a"]);
        assert_eq!(list.finish(&key(), 2, BuildStatus::Success), vec!["b"]);
    }
}
