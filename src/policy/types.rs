use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    intent::{IntentContext, Params},
    policy::error::PolicyError,
};

pub type PolicyId = String;
pub type AdjustFn = Arc<dyn Fn(&mut Params) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Root,
    Subtree,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Adjust,
    CancelRoot,
}

/// An effect a policy proposes for the context it inspected.
#[derive(Clone)]
pub struct Decision {
    pub policy_id: PolicyId,
    pub scope: Scope,
    pub action: Action,
    pub adjust: Option<AdjustFn>,
    pub reason: String,
    pub stop: bool,
}

impl Decision {
    pub fn adjust<F>(
        policy_id: impl Into<PolicyId>,
        scope: Scope,
        reason: impl Into<String>,
        adjust: F,
    ) -> Self
    where
        F: Fn(&mut Params) + Send + Sync + 'static,
    {
        Self {
            policy_id: policy_id.into(),
            scope,
            action: Action::Adjust,
            adjust: Some(Arc::new(adjust)),
            reason: reason.into(),
            stop: false,
        }
    }

    pub fn cancel_root(policy_id: impl Into<PolicyId>, reason: impl Into<String>) -> Self {
        Self {
            policy_id: policy_id.into(),
            scope: Scope::Root,
            action: Action::CancelRoot,
            adjust: None,
            reason: reason.into(),
            stop: false,
        }
    }

    pub fn with_stop(mut self, stop: bool) -> Self {
        self.stop = stop;
        self
    }
}

impl fmt::Debug for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decision")
            .field("policy_id", &self.policy_id)
            .field("scope", &self.scope)
            .field("action", &self.action)
            .field("adjust", &self.adjust.as_ref().map(|_| "<fn>"))
            .field("reason", &self.reason)
            .field("stop", &self.stop)
            .finish()
    }
}

pub trait Policy: Send + Sync {
    fn id(&self) -> &str;

    /// Lower runs first.
    fn priority(&self) -> i32;

    fn matches(&self, context: &IntentContext) -> bool;

    fn check(&self, context: &IntentContext) -> Result<Vec<Decision>, PolicyError>;
}
