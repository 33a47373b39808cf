use intentctx::{
    intent::{Intent, background},
    policy::{Action, PolicyRegistry},
};

use super::{Outcome, ScriptedPolicy, call_log, calls, child};

#[test]
fn given_stop_decision_when_evaluating_then_later_policies_do_not_run() {
    let log = call_log();
    let registry = PolicyRegistry::new();
    registry
        .register(ScriptedPolicy::new("tag", 1, Outcome::Tag, &log))
        .expect("tag should register");
    registry
        .register(ScriptedPolicy::new("halt", 2, Outcome::TagAndStop, &log))
        .expect("halt should register");
    registry
        .register(ScriptedPolicy::new("never", 3, Outcome::Tag, &log))
        .expect("never should register");

    let decisions = registry.evaluate(&background());

    let ids: Vec<_> = decisions.iter().map(|d| d.policy_id.as_str()).collect();
    assert_eq!(ids, vec!["tag", "halt"]);
    assert!(decisions[1].stop);
    assert_eq!(calls(&log), vec!["tag", "halt"]);
}

#[test]
fn given_failing_policy_when_evaluating_then_others_still_contribute() {
    let log = call_log();
    let registry = PolicyRegistry::new();
    registry
        .register(ScriptedPolicy::new("broken", 1, Outcome::Fail, &log))
        .expect("broken should register");
    registry
        .register(ScriptedPolicy::new("healthy", 2, Outcome::Tag, &log))
        .expect("healthy should register");

    let decisions = registry.evaluate(&background());

    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].policy_id, "healthy");
    assert_eq!(decisions[0].action, Action::Adjust);
    assert_eq!(calls(&log), vec!["broken", "healthy"]);
}

#[test]
fn given_non_matching_policy_when_evaluating_then_it_is_not_checked() {
    let log = call_log();
    let registry = PolicyRegistry::new();
    registry
        .register(
            ScriptedPolicy::new("transcode_only", 1, Outcome::TagAndStop, &log)
                .only_for("Transcode"),
        )
        .expect("policy should register");
    registry
        .register(ScriptedPolicy::new("everything", 2, Outcome::Tag, &log))
        .expect("policy should register");

    let root = background();
    let thumbnail = child(&root, Intent::new("Thumbnail"));
    let decisions = registry.evaluate(&thumbnail);
    assert_eq!(decisions.len(), 1);
    assert_eq!(calls(&log), vec!["everything"]);

    let transcode = child(&root, Intent::new("Transcode"));
    let decisions = registry.evaluate(&transcode);
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].policy_id, "transcode_only");
}

#[test]
fn given_empty_registry_when_evaluating_then_no_decisions() {
    let registry = PolicyRegistry::new();
    assert!(registry.evaluate(&background()).is_empty());
}

#[test]
fn given_evaluation_when_decisions_returned_then_tree_is_untouched() {
    let log = call_log();
    let registry = PolicyRegistry::new();
    registry
        .register(ScriptedPolicy::new("tag", 1, Outcome::Tag, &log))
        .expect("tag should register");

    let root = background();
    let decisions = registry.evaluate(&root);
    assert_eq!(decisions.len(), 1);
    assert!(root.params().is_empty());
}
