use std::time::Duration;

use intentctx::intent::{AbortKind, ContextState, Constraints, Intent, background};
use tokio::time::Instant;

use super::child;

#[tokio::test]
async fn given_timeout_when_it_elapses_then_context_aborts_with_deadline_exceeded() {
    let root = background();
    let (task, _cancel) = root.with_intent(
        Intent::new("Task"),
        Constraints::timeout(Duration::from_millis(30)),
    );
    assert_eq!(task.state(), ContextState::Pending);

    tokio::time::timeout(Duration::from_secs(2), task.done())
        .await
        .expect("deadline timer should fire");

    assert_eq!(task.state(), ContextState::Aborted);
    let reason = task.err_state().expect("expired context should carry a reason");
    assert!(reason.is_deadline());
    assert_eq!(reason.message, "context deadline exceeded");
    assert_eq!(reason.origin, task.id());
}

#[tokio::test]
async fn given_ancestor_deadline_when_it_elapses_then_descendants_abort_with_same_reason() {
    let root = background();
    let (publish, _cancel) = root.with_intent(
        Intent::new("PublishVideo"),
        Constraints::timeout(Duration::from_millis(30)),
    );
    let transcode = child(&publish, "Transcode");
    let segment = child(&child(&transcode, "Variant"), "Segment");

    tokio::time::timeout(Duration::from_secs(2), segment.done())
        .await
        .expect("segment should observe the ancestor deadline");

    let reason = segment.err_state().expect("segment should carry a reason");
    assert_eq!(reason.kind, AbortKind::DeadlineExceeded);
    assert_eq!(reason.origin, publish.id());
    assert_eq!(transcode.state(), ContextState::Aborted);
    assert_eq!(root.state(), ContextState::Pending);
}

#[tokio::test]
async fn given_fulfilled_context_when_deadline_passes_then_it_stays_done() {
    let root = background();
    let (task, _cancel) = root.with_intent(
        Intent::new("Task"),
        Constraints::timeout(Duration::from_millis(20)),
    );
    assert!(task.fulfill());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(task.state(), ContextState::Done);
    assert!(task.err_state().is_none());
}

#[tokio::test]
async fn given_deadline_in_the_past_when_created_then_child_is_born_aborted() {
    let root = background();
    let past = Instant::now()
        .checked_sub(Duration::from_millis(5))
        .unwrap_or_else(Instant::now);
    let (task, _cancel) = root.with_intent(Intent::new("Task"), Constraints::deadline(past));

    assert_eq!(task.state(), ContextState::Aborted);
    assert!(task.err_state().is_some_and(|reason| reason.is_deadline()));
}

#[test]
fn given_no_runtime_when_deadline_passes_then_reads_observe_expiry() {
    let root = background();
    let (task, _cancel) = root.with_intent(
        Intent::new("Task"),
        Constraints::timeout(Duration::from_millis(10)),
    );
    std::thread::sleep(Duration::from_millis(30));

    assert!(!task.fulfill(), "fulfill after the deadline should lose");
    assert_eq!(task.state(), ContextState::Aborted);
    assert!(task.err_state().is_some_and(|reason| reason.is_deadline()));
}

#[test]
fn given_expired_ancestor_when_child_state_read_then_child_is_aborted() {
    let root = background();
    let (parent, _cancel) = root.with_intent(
        Intent::new("Parent"),
        Constraints::timeout(Duration::from_millis(10)),
    );
    let leaf = child(&parent, "Leaf");
    std::thread::sleep(Duration::from_millis(30));

    assert_eq!(leaf.state(), ContextState::Aborted);
    assert_eq!(
        leaf.err_state().map(|reason| reason.origin),
        Some(parent.id().to_string())
    );
}

#[tokio::test]
async fn given_child_deadline_later_than_parent_when_parent_expires_then_child_follows_parent() {
    let root = background();
    let (parent, _) = root.with_intent(
        Intent::new("Parent"),
        Constraints::timeout(Duration::from_millis(20)),
    );
    let (late, _) = parent.with_intent(
        Intent::new("Late"),
        Constraints::timeout(Duration::from_secs(30)),
    );

    tokio::time::timeout(Duration::from_secs(2), late.done())
        .await
        .expect("parent deadline should bound the child");
    assert_eq!(
        late.err_state().map(|reason| reason.origin),
        Some(parent.id().to_string())
    );
}

#[tokio::test]
async fn given_pending_context_with_long_deadline_when_dropped_then_timer_task_ends() {
    let metrics = tokio::runtime::Handle::current().metrics();
    let before = metrics.num_alive_tasks();

    let root = background();
    let (task, _) = root.with_intent(
        Intent::new("Task"),
        Constraints::timeout(Duration::from_secs(3_600)),
    );
    tokio::task::yield_now().await;
    assert_eq!(metrics.num_alive_tasks(), before + 1);

    drop(task);
    drop(root);
    for _ in 0..10 {
        if metrics.num_alive_tasks() == before {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(metrics.num_alive_tasks(), before);
}
