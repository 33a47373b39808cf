pub mod quality_cap;
pub mod safety_stop;

pub use quality_cap::{QUALITY_CAP_ID, QualityCap, TARGET_QUALITY_KEY, TRANSCODE_INTENT};
pub use safety_stop::{SAFETY_BLOCK_KEY, SAFETY_STOP_ID, SafetyStop};

use crate::{
    config::PolicyConfig,
    policy::{PolicyError, PolicyRegistry},
};

/// Registers the enabled built-in policies. Policies already present in the
/// registry are left as they are.
pub fn register_builtin_policies(
    registry: &PolicyRegistry,
    config: &PolicyConfig,
) -> Result<(), PolicyError> {
    if config.safety_stop.enabled {
        register_once(registry.register(SafetyStop::from_config(&config.safety_stop)))?;
    }
    if config.quality_cap.enabled {
        register_once(registry.register(QualityCap::from_config(&config.quality_cap)))?;
    }
    Ok(())
}

fn register_once(result: Result<(), PolicyError>) -> Result<(), PolicyError> {
    match result {
        Err(PolicyError::DuplicatePolicy { policy_id }) => {
            tracing::debug!(target: "policy", policy_id = %policy_id, "policy_already_registered");
            Ok(())
        }
        other => other,
    }
}
