use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::intent::types::ContextId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortKind {
    DeadlineExceeded,
    ExternallyCancelled,
    PolicyCancelled,
}

impl AbortKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::ExternallyCancelled => "externally_cancelled",
            Self::PolicyCancelled => "policy_cancelled",
        }
    }
}

/// Why a context ended up `aborted`.
///
/// Descendants aborted by propagation carry the reason of the node the abort
/// started from; `origin` names that node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbortReason {
    pub kind: AbortKind,
    pub message: String,
    pub origin: ContextId,
}

impl AbortReason {
    pub fn new(kind: AbortKind, message: impl Into<String>, origin: impl Into<ContextId>) -> Self {
        Self {
            kind,
            message: message.into(),
            origin: origin.into(),
        }
    }

    pub fn is_deadline(&self) -> bool {
        self.kind == AbortKind::DeadlineExceeded
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.kind.as_str())
    }
}

impl std::error::Error for AbortReason {}

pub fn deadline_exceeded(origin: impl Into<ContextId>) -> AbortReason {
    AbortReason::new(
        AbortKind::DeadlineExceeded,
        "context deadline exceeded",
        origin,
    )
}

pub fn externally_cancelled(origin: impl Into<ContextId>) -> AbortReason {
    AbortReason::new(AbortKind::ExternallyCancelled, "context canceled", origin)
}

pub fn policy_cancelled(message: impl Into<String>, origin: impl Into<ContextId>) -> AbortReason {
    AbortReason::new(AbortKind::PolicyCancelled, message, origin)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedContext {
    pub id: ContextId,
    pub name: String,
    pub reason: Option<AbortReason>,
}

impl fmt::Display for FailedContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            Some(reason) => write!(f, "{}[{}]: {}", self.name, self.id, reason),
            None => write!(f, "{}[{}]", self.name, self.id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WaitError {
    #[error("{} of {total} awaited context(s) aborted: {}", .failed.len(), join_failed(.failed))]
    Aborted {
        total: usize,
        failed: Vec<FailedContext>,
    },
    #[error("wait interrupted with {} context(s) still pending: {}", .pending.len(), join_failed(.pending))]
    Interrupted { pending: Vec<FailedContext> },
}

impl WaitError {
    pub fn failed(&self) -> &[FailedContext] {
        match self {
            Self::Aborted { failed, .. } => failed,
            Self::Interrupted { pending } => pending,
        }
    }
}

fn join_failed(items: &[FailedContext]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
