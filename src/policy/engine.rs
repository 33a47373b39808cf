use serde::Serialize;

use crate::{
    intent::{IntentContext, error::policy_cancelled},
    policy::{
        registry::PolicyRegistry,
        types::{Action, AdjustFn, Decision, Scope},
    },
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnforcementReport {
    pub applied: usize,
    pub skipped: usize,
    pub adjusted_contexts: usize,
    pub root_cancelled: bool,
}

/// Applies decisions to the tree in the order given.
///
/// Subtree adjustments reach terminal descendants too, so introspection sees
/// the same params everywhere; nothing is re-run because of it.
pub fn enforce_policies(context: &IntentContext, decisions: &[Decision]) -> EnforcementReport {
    let mut report = EnforcementReport::default();

    for decision in decisions {
        match decision.action {
            Action::Adjust => {
                let Some(adjust) = decision.adjust.as_ref() else {
                    tracing::warn!(
                        target: "policy",
                        policy_id = %decision.policy_id,
                        context_id = %context.id(),
                        "adjust_decision_without_fn_skipped"
                    );
                    report.skipped += 1;
                    continue;
                };
                let targets = match decision.scope {
                    Scope::Subtree => context.subtree(),
                    Scope::Root => vec![context.root()],
                };
                apply_adjust(adjust, &targets);
                report.adjusted_contexts += targets.len();
                tracing::info!(
                    target: "policy",
                    policy_id = %decision.policy_id,
                    context_id = %context.id(),
                    scope = ?decision.scope,
                    adjusted = targets.len(),
                    "params_adjusted"
                );
            }
            Action::CancelRoot => {
                let root = context.root();
                let cancelled =
                    root.abort_with(policy_cancelled(decision.reason.clone(), root.id()));
                report.root_cancelled |= cancelled;
                tracing::info!(
                    target: "policy",
                    policy_id = %decision.policy_id,
                    context_id = %context.id(),
                    root_id = %root.id(),
                    reason = %decision.reason,
                    cancelled,
                    "root_cancel_enforced"
                );
            }
        }
        report.applied += 1;
    }

    report
}

fn apply_adjust(adjust: &AdjustFn, targets: &[IntentContext]) {
    for target in targets {
        target.update_params(|params| adjust(params));
    }
}

/// Evaluates `context` against `registry` and enforces the outcome right
/// away, before any work is started on the context.
pub fn evaluate_and_enforce(
    registry: &PolicyRegistry,
    context: &IntentContext,
) -> (Vec<Decision>, EnforcementReport) {
    let decisions = registry.evaluate(context);
    let report = enforce_policies(context, &decisions);
    (decisions, report)
}
