use std::sync::{Arc, OnceLock, RwLock};

use crate::{
    intent::IntentContext,
    policy::{
        error::{PolicyError, invalid_policy},
        types::{Decision, Policy},
    },
};

#[derive(Default)]
struct RegistryState {
    // Kept sorted by (priority, registration order).
    policies: Vec<Arc<dyn Policy>>,
}

/// Append-only, priority-ordered set of policies.
#[derive(Default)]
pub struct PolicyRegistry {
    state: RwLock<RegistryState>,
}

impl PolicyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P>(&self, policy: P) -> Result<(), PolicyError>
    where
        P: Policy + 'static,
    {
        self.register_arc(Arc::new(policy))
    }

    pub fn register_arc(&self, policy: Arc<dyn Policy>) -> Result<(), PolicyError> {
        let policy_id = policy.id().trim().to_string();
        if policy_id.is_empty() {
            return Err(invalid_policy("policy id cannot be empty"));
        }

        let mut guard = self.state.write().expect("lock poisoned");
        if guard
            .policies
            .iter()
            .any(|existing| existing.id().trim() == policy_id)
        {
            return Err(PolicyError::DuplicatePolicy { policy_id });
        }

        let priority = policy.priority();
        let position = guard
            .policies
            .partition_point(|existing| existing.priority() <= priority);
        guard.policies.insert(position, policy);

        tracing::info!(
            target: "policy",
            policy_id = %policy_id,
            priority,
            position,
            "policy_registered"
        );
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.state.read().expect("lock poisoned").policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Policy ids in evaluation order.
    pub fn ids(&self) -> Vec<String> {
        self.ordered()
            .iter()
            .map(|policy| policy.id().to_string())
            .collect()
    }

    fn ordered(&self) -> Vec<Arc<dyn Policy>> {
        self.state.read().expect("lock poisoned").policies.clone()
    }

    /// Runs matching policies in ascending priority and collects their
    /// decisions, stopping right after the first decision flagged `stop`.
    ///
    /// A policy whose check fails contributes no decisions; the others still
    /// run.
    pub fn evaluate(&self, context: &IntentContext) -> Vec<Decision> {
        let mut decisions = Vec::new();

        for policy in self.ordered() {
            if !policy.matches(context) {
                continue;
            }

            let produced = match policy.check(context) {
                Ok(produced) => produced,
                Err(err) => {
                    tracing::warn!(
                        target: "policy",
                        policy_id = %policy.id(),
                        context_id = %context.id(),
                        error = %err,
                        "policy_check_failed"
                    );
                    continue;
                }
            };

            for decision in produced {
                let stop = decision.stop;
                tracing::info!(
                    target: "policy",
                    policy_id = %decision.policy_id,
                    context_id = %context.id(),
                    context = %context.name(),
                    action = ?decision.action,
                    scope = ?decision.scope,
                    reason = %decision.reason,
                    stop,
                    "policy_decision"
                );
                decisions.push(decision);
                if stop {
                    return decisions;
                }
            }
        }

        decisions
    }
}

static GLOBAL_REGISTRY: OnceLock<PolicyRegistry> = OnceLock::new();

/// Process-wide registry used by the free functions of this module.
pub fn global_registry() -> &'static PolicyRegistry {
    GLOBAL_REGISTRY.get_or_init(PolicyRegistry::new)
}

pub fn register_policy<P>(policy: P) -> Result<(), PolicyError>
where
    P: Policy + 'static,
{
    global_registry().register(policy)
}

pub fn evaluate_policies(context: &IntentContext) -> Vec<Decision> {
    global_registry().evaluate(context)
}
