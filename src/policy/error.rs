use thiserror::Error;

use crate::policy::types::PolicyId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("invalid policy: {message}")]
    InvalidPolicy { message: String },
    #[error("policy '{policy_id}' is already registered")]
    DuplicatePolicy { policy_id: PolicyId },
    #[error("policy '{policy_id}' check failed: {message}")]
    CheckFailed { policy_id: PolicyId, message: String },
}

pub fn invalid_policy(message: impl Into<String>) -> PolicyError {
    PolicyError::InvalidPolicy {
        message: message.into(),
    }
}

pub fn check_failed(policy_id: impl Into<PolicyId>, message: impl Into<String>) -> PolicyError {
    PolicyError::CheckFailed {
        policy_id: policy_id.into(),
        message: message.into(),
    }
}
