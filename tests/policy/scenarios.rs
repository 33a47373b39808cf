use intentctx::{
    config::PolicyConfig,
    intent::{AbortKind, ContextState, Intent, background},
    policies::{
        QualityCap, SAFETY_BLOCK_KEY, SAFETY_STOP_ID, SafetyStop, TARGET_QUALITY_KEY,
        TRANSCODE_INTENT, register_builtin_policies,
    },
    policy::{
        PolicyRegistry, evaluate_and_enforce, evaluate_policies, global_registry,
        register_policy,
    },
};

use super::child;

fn builtin_registry() -> PolicyRegistry {
    let registry = PolicyRegistry::new();
    register_builtin_policies(&registry, &PolicyConfig::default())
        .expect("builtins should register");
    registry
}

#[test]
fn given_transcode_above_cap_when_evaluated_and_enforced_then_quality_is_capped() {
    let registry = builtin_registry();
    let root = background();
    let publish = child(
        &root,
        Intent::new("PublishVideo").with_param(SAFETY_BLOCK_KEY, false),
    );
    let transcode = child(
        &publish,
        Intent::new(TRANSCODE_INTENT).with_param(TARGET_QUALITY_KEY, 1440),
    );
    let variant = child(
        &transcode,
        Intent::new("Variant").with_param(TARGET_QUALITY_KEY, 1440),
    );

    let (decisions, report) = evaluate_and_enforce(&registry, &transcode);

    assert_eq!(decisions.len(), 1);
    assert_eq!(report.adjusted_contexts, 2);
    assert_eq!(transcode.params().get_i64(TARGET_QUALITY_KEY), Some(1080));
    assert_eq!(variant.params().get_i64(TARGET_QUALITY_KEY), Some(1080));
    assert_eq!(root.state(), ContextState::Pending);
    assert_eq!(publish.state(), ContextState::Pending);
}

#[test]
fn given_safety_block_on_transcode_when_evaluated_then_quality_cap_never_runs() {
    let registry = builtin_registry();
    let root = background();
    let transcode = child(
        &root,
        Intent::new(TRANSCODE_INTENT)
            .with_param(SAFETY_BLOCK_KEY, true)
            .with_param(TARGET_QUALITY_KEY, 1440),
    );

    let decisions = registry.evaluate(&transcode);

    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].policy_id, SAFETY_STOP_ID);
}

#[test]
fn given_safety_block_on_nested_descendant_when_enforced_then_root_and_siblings_abort() {
    let registry = builtin_registry();
    let root = background();
    let publish = child(&root, Intent::new("PublishVideo"));
    let sibling = child(&publish, Intent::new("Thumbnail"));
    let sibling_leaf = child(&sibling, Intent::new("Resize"));
    let transcode = child(&publish, Intent::new(TRANSCODE_INTENT));
    let blocked = child(
        &transcode,
        Intent::new("Variant").with_param(SAFETY_BLOCK_KEY, true),
    );

    let (_, report) = evaluate_and_enforce(&registry, &blocked);

    assert!(report.root_cancelled);
    assert_eq!(root.state(), ContextState::Aborted);
    assert_eq!(sibling_leaf.state(), ContextState::Aborted);
    let reason = sibling.err_state().expect("sibling should carry the root reason");
    assert_eq!(reason.kind, AbortKind::PolicyCancelled);
    assert_eq!(reason.origin, root.id());
    assert_eq!(transcode.params().get(TARGET_QUALITY_KEY), None);
}

#[test]
fn given_global_registry_when_policies_registered_then_free_functions_use_it() {
    // The process-wide registry is shared by every test in this binary, so
    // only this test touches it.
    register_policy(SafetyStop::new()).expect("safety stop should register globally");
    register_policy(QualityCap::new()).expect("quality cap should register globally");
    assert!(register_policy(SafetyStop::new()).is_err());
    assert_eq!(global_registry().len(), 2);

    let transcode = child(
        &background(),
        Intent::new(TRANSCODE_INTENT).with_param(TARGET_QUALITY_KEY, 1440),
    );
    let decisions = evaluate_policies(&transcode);
    assert_eq!(decisions.len(), 1);
}

#[test]
fn given_done_root_when_cancel_root_enforced_then_pending_descendants_abort() {
    let registry = builtin_registry();
    let root = background();
    let publish = child(&root, Intent::new("PublishVideo"));
    let worker = child(&publish, Intent::new(TRANSCODE_INTENT));
    let blocked = child(
        &worker,
        Intent::new("Segment").with_param(SAFETY_BLOCK_KEY, true),
    );
    assert!(root.fulfill());

    let (decisions, report) = evaluate_and_enforce(&registry, &blocked);

    assert_eq!(decisions.len(), 1);
    assert!(!report.root_cancelled, "a done root keeps its own state");
    assert_eq!(root.state(), ContextState::Done);
    for node in [&publish, &worker, &blocked] {
        assert_eq!(node.state(), ContextState::Aborted, "{}", node.name());
        let reason = node.err_state().expect("swept node should carry a reason");
        assert_eq!(reason.kind, AbortKind::PolicyCancelled);
        assert_eq!(reason.origin, root.id());
    }
}
