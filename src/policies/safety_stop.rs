use crate::{
    config::SafetyStopConfig,
    intent::IntentContext,
    policy::{Decision, Policy, PolicyError},
};

pub const SAFETY_STOP_ID: &str = "safety_stop";
pub const SAFETY_BLOCK_KEY: &str = "safety.block";

/// Cancels the whole tree when a context carries `safety.block = true`.
/// Applies to every intent and ends evaluation.
#[derive(Debug, Clone)]
pub struct SafetyStop {
    priority: i32,
}

impl SafetyStop {
    pub fn new() -> Self {
        Self::from_config(&SafetyStopConfig::default())
    }

    pub fn from_config(config: &SafetyStopConfig) -> Self {
        Self {
            priority: config.priority,
        }
    }
}

impl Default for SafetyStop {
    fn default() -> Self {
        Self::new()
    }
}

impl Policy for SafetyStop {
    fn id(&self) -> &str {
        SAFETY_STOP_ID
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn matches(&self, _context: &IntentContext) -> bool {
        true
    }

    fn check(&self, context: &IntentContext) -> Result<Vec<Decision>, PolicyError> {
        if context.params().bool_or(SAFETY_BLOCK_KEY, false) {
            return Ok(vec![
                Decision::cancel_root(SAFETY_STOP_ID, "safety override engaged").with_stop(true),
            ]);
        }
        Ok(Vec::new())
    }
}
