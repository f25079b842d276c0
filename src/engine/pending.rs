//! Pending write queue: writes attempted during a primary-store outage
//!
//! FIFO buffer replayed in order once the primary recovers. The queue never
//! blocks reads; draining is guarded by an atomic flag so only one drain
//! runs at a time, and a later save for the same action replaces the queued
//! one in place (keeping its FIFO position) instead of duplicating it.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::engine::types::QuestionnaireGraph;
use crate::metrics;

#[derive(Debug, Clone)]
pub struct PendingWrite {
    pub graph: QuestionnaireGraph,
    pub queued_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct PendingWriteQueue {
    queue: Mutex<VecDeque<PendingWrite>>,
    draining: AtomicBool,
}

impl PendingWriteQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Queue a write for replay. A queued write for the same action is
    /// replaced in place so replay order stays FIFO by first enqueue.
    pub fn enqueue(&self, graph: QuestionnaireGraph) {
        let mut queue = self.queue.lock();
        let write = PendingWrite {
            graph,
            queued_at: Utc::now(),
        };
        if let Some(existing) = queue
            .iter_mut()
            .find(|w| w.graph.action_id == write.graph.action_id)
        {
            *existing = write;
        } else {
            queue.push_back(write);
        }
        metrics::PENDING_WRITES.set(queue.len() as i64);
    }

    /// Pop the oldest queued write. Only the active drain calls this.
    pub fn pop_front(&self) -> Option<PendingWrite> {
        let mut queue = self.queue.lock();
        let write = queue.pop_front();
        metrics::PENDING_WRITES.set(queue.len() as i64);
        write
    }

    /// Put a write back at the head after a failed replay, unless a newer
    /// write for the same action arrived while it was out of the queue.
    pub fn push_front(&self, write: PendingWrite) {
        let mut queue = self.queue.lock();
        let superseded = queue
            .iter()
            .any(|w| w.graph.action_id == write.graph.action_id);
        if !superseded {
            queue.push_front(write);
        }
        metrics::PENDING_WRITES.set(queue.len() as i64);
    }

    /// Claim the drain guard. Returns false when a drain is already running.
    pub fn begin_drain(&self) -> bool {
        self.draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn end_drain(&self) {
        self.draining.store(false, Ordering::Release);
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(action_id: &str) -> QuestionnaireGraph {
        QuestionnaireGraph {
            action_id: action_id.to_string(),
            action_text: format!("action {action_id}"),
            questions: vec![],
            details: vec![],
        }
    }

    #[test]
    fn replays_in_enqueue_order() {
        let q = PendingWriteQueue::new();
        q.enqueue(graph("a"));
        q.enqueue(graph("b"));
        q.enqueue(graph("c"));
        assert_eq!(q.pop_front().unwrap().graph.action_id, "a");
        assert_eq!(q.pop_front().unwrap().graph.action_id, "b");
        assert_eq!(q.pop_front().unwrap().graph.action_id, "c");
        assert!(q.pop_front().is_none());
    }

    #[test]
    fn same_action_replaces_in_place() {
        let q = PendingWriteQueue::new();
        q.enqueue(graph("a"));
        q.enqueue(graph("b"));
        let mut newer = graph("a");
        newer.action_text = "updated".to_string();
        q.enqueue(newer);

        assert_eq!(q.len(), 2);
        let first = q.pop_front().unwrap();
        assert_eq!(first.graph.action_id, "a");
        assert_eq!(first.graph.action_text, "updated");
    }

    #[test]
    fn drain_guard_is_exclusive() {
        let q = PendingWriteQueue::new();
        assert!(q.begin_drain());
        assert!(!q.begin_drain());
        q.end_drain();
        assert!(q.begin_drain());
    }

    #[test]
    fn failed_replay_requeues_at_head_unless_superseded() {
        let q = PendingWriteQueue::new();
        q.enqueue(graph("a"));
        q.enqueue(graph("b"));

        let popped = q.pop_front().unwrap();
        q.push_front(popped);
        assert_eq!(q.pop_front().unwrap().graph.action_id, "a");

        // Superseded: a newer "b" arrives while the old one is out.
        let popped = q.pop_front().unwrap();
        assert_eq!(popped.graph.action_id, "b");
        q.enqueue(graph("b"));
        q.push_front(popped);
        assert_eq!(q.len(), 1);
    }
}
