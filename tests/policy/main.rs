mod evaluate;
mod scenarios;

use std::sync::{Arc, Mutex};

use intentctx::{
    intent::{Constraints, Intent, IntentContext, Params},
    policy::{Decision, Policy, PolicyError, Scope, error::check_failed},
};

pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn calls(log: &CallLog) -> Vec<String> {
    log.lock().expect("lock poisoned").clone()
}

pub fn child(parent: &IntentContext, intent: Intent) -> IntentContext {
    parent.with_intent(intent, Constraints::none()).0
}

#[derive(Clone, Copy)]
pub enum Outcome {
    Nothing,
    Tag,
    TagAndStop,
    Fail,
}

/// Policy whose behaviour is fixed up front; records every check it runs.
pub struct ScriptedPolicy {
    pub id: String,
    pub priority: i32,
    pub only: Option<&'static str>,
    pub outcome: Outcome,
    pub log: CallLog,
}

impl ScriptedPolicy {
    pub fn new(id: &str, priority: i32, outcome: Outcome, log: &CallLog) -> Self {
        Self {
            id: id.to_string(),
            priority,
            only: None,
            outcome,
            log: Arc::clone(log),
        }
    }

    pub fn only_for(mut self, intent: &'static str) -> Self {
        self.only = Some(intent);
        self
    }
}

impl Policy for ScriptedPolicy {
    fn id(&self) -> &str {
        &self.id
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn matches(&self, context: &IntentContext) -> bool {
        self.only.is_none_or(|intent| context.name() == intent)
    }

    fn check(&self, _context: &IntentContext) -> Result<Vec<Decision>, PolicyError> {
        self.log.lock().expect("lock poisoned").push(self.id.clone());
        let id = self.id.clone();
        let tag = move |params: &mut Params| {
            params.insert(format!("tag.{id}"), true);
        };
        match self.outcome {
            Outcome::Nothing => Ok(Vec::new()),
            Outcome::Tag => Ok(vec![Decision::adjust(
                self.id.clone(),
                Scope::Subtree,
                "tagged",
                tag,
            )]),
            Outcome::TagAndStop => Ok(vec![
                Decision::adjust(self.id.clone(), Scope::Subtree, "tagged", tag).with_stop(true),
            ]),
            Outcome::Fail => Err(check_failed(self.id.clone(), "backend unavailable")),
        }
    }
}
