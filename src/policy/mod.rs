pub mod engine;
pub mod error;
pub mod registry;
pub mod types;

pub use engine::{EnforcementReport, enforce_policies, evaluate_and_enforce};
pub use error::PolicyError;
pub use registry::{PolicyRegistry, evaluate_policies, global_registry, register_policy};
pub use types::{Action, AdjustFn, Decision, Policy, PolicyId, Scope};
