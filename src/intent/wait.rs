use std::{future::Future, pin::pin};

use futures_util::future::join_all;
use tokio::time::sleep_until;

use crate::intent::{
    context::IntentContext,
    error::{FailedContext, WaitError},
    types::ContextState,
};

/// Waits until every context is terminal or `external` completes, whichever
/// happens first.
///
/// `external` is any signal: a `CancellationToken::cancelled()` future, a
/// `tokio::time::sleep`, or `std::future::pending()` to wait indefinitely.
/// It never terminates the awaited contexts. Succeeds only when all of them
/// ended `done`.
pub async fn wait_all<F>(external: F, contexts: &[IntentContext]) -> Result<(), WaitError>
where
    F: Future<Output = ()>,
{
    if contexts.is_empty() {
        return Ok(());
    }

    let mut external = pin!(external);
    let interrupted = loop {
        // Deadline timers may be missing for contexts created outside a
        // runtime, so the earliest pending deadline is watched here too.
        let next_deadline = contexts
            .iter()
            .filter(|context| !context.is_terminal())
            .filter_map(IntentContext::pending_deadline)
            .min();
        let deadline_passed = async {
            match next_deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        let all_terminal = join_all(contexts.iter().map(IntentContext::done));
        tokio::select! {
            biased;
            _ = all_terminal => break false,
            _ = &mut external => break true,
            // The next `is_terminal` pass expires whatever is overdue.
            _ = deadline_passed => continue,
        }
    };

    if interrupted {
        let pending: Vec<_> = contexts
            .iter()
            .filter(|context| !context.is_terminal())
            .map(describe)
            .collect();
        // Everything may have finished right as the external signal fired.
        if !pending.is_empty() {
            tracing::debug!(
                target: "intent_context",
                pending = pending.len(),
                total = contexts.len(),
                "wait_all_interrupted"
            );
            return Err(WaitError::Interrupted { pending });
        }
    }

    let failed: Vec<_> = contexts
        .iter()
        .filter(|context| context.state() != ContextState::Done)
        .map(describe)
        .collect();
    if failed.is_empty() {
        return Ok(());
    }

    tracing::debug!(
        target: "intent_context",
        failed = failed.len(),
        total = contexts.len(),
        "wait_all_aborted"
    );
    Err(WaitError::Aborted {
        total: contexts.len(),
        failed,
    })
}

fn describe(context: &IntentContext) -> FailedContext {
    FailedContext {
        id: context.id().to_string(),
        name: context.name().to_string(),
        reason: context.err_state(),
    }
}
