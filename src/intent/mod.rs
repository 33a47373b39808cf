pub mod context;
pub mod error;
pub mod types;
pub mod wait;

pub use context::{CancelGuard, CancelHandle, ContextSnapshot, IntentContext};
pub use error::{AbortKind, AbortReason, FailedContext, WaitError};
pub use types::{ContextId, ContextState, Constraints, Intent, ParamValue, Params};
pub use wait::wait_all;

pub fn background() -> IntentContext {
    IntentContext::background()
}

pub fn with_intent(
    parent: &IntentContext,
    intent: Intent,
    constraints: Constraints,
) -> (IntentContext, CancelHandle) {
    parent.with_intent(intent, constraints)
}
