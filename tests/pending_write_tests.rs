//! Pending-write queue replay tests
//!
//! Writes issued during a primary outage must queue in call order, survive
//! until recovery, and replay FIFO exactly once before other operations
//! observe state.

mod common;

use common::{fast_breaker, harness, sample_graph};
use std::time::Duration;

use prashna::engine::{RetrievalOutcome, SaveOutcome};

#[tokio::test]
async fn save_during_outage_is_queued_not_lost() {
    let h = harness(fast_breaker(), vec![]);
    h.store.set_failing(true);

    let result = h.engine.save_questionnaire(&sample_graph("act1"), "tester").await;
    assert_eq!(result.outcome, SaveOutcome::Queued);
    assert_eq!(h.engine.pending().len(), 1);
    assert!(
        h.store.save_log.lock().is_empty(),
        "nothing may reach the primary during the outage"
    );
}

#[tokio::test]
async fn queued_write_applies_before_the_next_operation_after_recovery() {
    let h = harness(fast_breaker(), vec![]);
    h.store.set_failing(true);

    let result = h.engine.save_questionnaire(&sample_graph("act1"), "tester").await;
    assert_eq!(result.outcome, SaveOutcome::Queued);

    // Recover and wait out the breaker cooldown so the next operation's
    // drain is admitted as the probe.
    h.store.set_failing(false);
    tokio::time::sleep(Duration::from_millis(80)).await;

    // The read itself must observe the replayed write: drain happens first.
    match h.engine.get_questionnaire("act1").await {
        RetrievalOutcome::Hit { graph, tier } => {
            assert_eq!(tier, "primary");
            assert_eq!(graph.action_id, "act1");
        }
        other => panic!("expected replayed write to be readable, got {other:?}"),
    }
    assert_eq!(h.engine.pending().len(), 0);
    assert_eq!(h.store.save_log.lock().as_slice(), ["act1"]);
}

#[tokio::test]
async fn ten_outage_saves_replay_fifo_exactly_once() {
    let h = harness(fast_breaker(), vec![]);
    h.store.set_failing(true);

    let expected: Vec<String> = (0..10).map(|i| format!("act{i}")).collect();
    for id in &expected {
        let result = h.engine.save_questionnaire(&sample_graph(id), "tester").await;
        assert_eq!(result.outcome, SaveOutcome::Queued, "save {id} should queue");
    }
    assert_eq!(h.engine.pending().len(), 10);

    h.store.set_failing(false);
    tokio::time::sleep(Duration::from_millis(80)).await;

    // Any operation triggers the drain once health is restored.
    let _ = h.engine.get_questionnaire("act0").await;

    assert_eq!(h.engine.pending().len(), 0);
    let log = h.store.save_log.lock().clone();
    assert_eq!(log, expected, "replay must be FIFO and exactly once");
}

#[tokio::test]
async fn newer_save_for_same_action_supersedes_queued_one() {
    let h = harness(fast_breaker(), vec![]);
    h.store.set_failing(true);

    let mut first = sample_graph("act1");
    first.action_text = "first version".to_string();
    h.engine.save_questionnaire(&first, "tester").await;

    let mut second = sample_graph("act1");
    second.action_text = "second version".to_string();
    h.engine.save_questionnaire(&second, "tester").await;

    assert_eq!(h.engine.pending().len(), 1, "same action replaces in place");

    h.store.set_failing(false);
    tokio::time::sleep(Duration::from_millis(80)).await;
    let _ = h.engine.get_questionnaire("act1").await;

    let stored = h.store.actions.get("act1").unwrap().clone();
    assert_eq!(stored.action_text, "second version");
    assert_eq!(h.store.save_log.lock().len(), 1);
}

#[tokio::test]
async fn replay_failure_keeps_the_write_queued() {
    let h = harness(fast_breaker(), vec![]);
    h.store.set_failing(true);

    h.engine.save_questionnaire(&sample_graph("act1"), "tester").await;
    assert_eq!(h.engine.pending().len(), 1);

    // Cooldown passes but the store is still down: the drain's probe fails
    // and the write goes back to the head of the queue.
    tokio::time::sleep(Duration::from_millis(80)).await;
    let _ = h.engine.get_questionnaire("other").await;

    assert_eq!(h.engine.pending().len(), 1, "failed replay must requeue");
    assert!(h.store.save_log.lock().is_empty());
}
