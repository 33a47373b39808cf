use std::{future::Future, sync::Arc, time::Duration};

use serde::Serialize;
use tracing::Instrument;

use crate::{
    config::PipelineConfig,
    intent::{
        AbortKind, AbortReason, ContextSnapshot, ContextState, Constraints, Intent,
        IntentContext, WaitError, wait_all,
    },
    pipeline::{
        CDN_PUSH_INTENT, PUBLISH_INTENT, THUMBNAIL_INTENT, TRANSCODE_INTENT,
        stages::{Stages, join_stage_tasks},
    },
    policies::{SAFETY_BLOCK_KEY, TARGET_QUALITY_KEY},
    policy::PolicyRegistry,
};

#[derive(Debug, Clone, Serialize)]
pub struct PublishOutcome {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    pub state: ContextState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub err_state: Option<AbortReason>,
    pub tree: ContextSnapshot,
}

/// Simulated publish flow: transcode, thumbnail and CDN push under one
/// `PublishVideo` context, with policies enforced on every node it creates.
pub struct VideoPublishPipeline {
    stages: Stages,
    run_id: Option<String>,
}

impl VideoPublishPipeline {
    pub fn new(config: PipelineConfig, registry: Arc<PolicyRegistry>) -> Self {
        Self {
            stages: Stages::new(config, registry),
            run_id: None,
        }
    }

    /// Tags the `publish` span and the outcome, linking them to the log run.
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    /// Runs the flow under `root`. If `shutdown` completes first the publish
    /// context is cancelled and the outcome reports it aborted.
    pub async fn run<F>(&self, root: &IntentContext, shutdown: F) -> PublishOutcome
    where
        F: Future<Output = ()>,
    {
        let span = tracing::info_span!(
            target: "pipeline",
            "publish",
            run_id = self.run_id.as_deref().unwrap_or_default(),
            video_id = %self.stages.config().video_id
        );
        self.publish(root, shutdown).instrument(span).await
    }

    async fn publish<F>(&self, root: &IntentContext, shutdown: F) -> PublishOutcome
    where
        F: Future<Output = ()>,
    {
        let config = self.stages.config();
        let (publish, cancel) = root.with_intent(
            Intent::new(PUBLISH_INTENT)
                .with_param("videoID", config.video_id.as_str())
                .with_param(SAFETY_BLOCK_KEY, config.safety_block)
                .with_param(TARGET_QUALITY_KEY, config.target_quality),
            Constraints::timeout(Duration::from_millis(config.deadline_ms)),
        );
        // Dropping this future mid-flight tears the tree down.
        let cancel_guard = cancel.drop_guard();
        self.stages.enforce(&publish);

        // Children get explicit copies of what they need from the publish
        // params, read after enforcement.
        let publish_params = publish.params();
        let transcode = self.stages.create(
            &publish,
            Intent::new(TRANSCODE_INTENT)
                .with_param("segmentCount", config.segment_count)
                .with_param("segmentMs", config.segment_ms)
                .with_param(
                    TARGET_QUALITY_KEY,
                    publish_params.i64_or(TARGET_QUALITY_KEY, config.target_quality),
                ),
        );
        let thumbnail = self.stages.create(
            &publish,
            Intent::new(THUMBNAIL_INTENT)
                .with_param("frames", config.thumbnail_frames)
                .with_param("sizes", config.thumbnail_sizes.clone()),
        );
        let cdn = self.stages.create(&publish, Intent::new(CDN_PUSH_INTENT));

        let tasks = vec![
            tokio::spawn(self.stages.clone().transcode(transcode.clone()).in_current_span()),
            tokio::spawn(self.stages.clone().thumbnail(thumbnail.clone()).in_current_span()),
            tokio::spawn(self.stages.clone().cdn_push(cdn.clone()).in_current_span()),
        ];

        let stages = [transcode, thumbnail, cdn];
        match wait_all(shutdown, &stages).await {
            Ok(()) => {
                publish.fulfill();
            }
            Err(WaitError::Interrupted { pending }) => {
                tracing::warn!(
                    target: "pipeline",
                    context_id = %publish.id(),
                    pending = pending.len(),
                    "publish_interrupted"
                );
                cancel_guard.disarm().cancel();
                join_stage_tasks(&publish, tasks).await;
                return self.outcome(&publish);
            }
            Err(err) => {
                tracing::warn!(
                    target: "pipeline",
                    context_id = %publish.id(),
                    error = %err,
                    "publish_children_failed"
                );
                publish.abort(AbortKind::ExternallyCancelled, "publish stages failed");
            }
        }
        cancel_guard.disarm();

        join_stage_tasks(&publish, tasks).await;
        self.outcome(&publish)
    }

    fn outcome(&self, publish: &IntentContext) -> PublishOutcome {
        let outcome = PublishOutcome {
            run_id: self.run_id.clone(),
            state: publish.state(),
            err_state: publish.err_state(),
            tree: publish.snapshot(),
        };
        tracing::info!(
            target: "pipeline",
            context_id = %publish.id(),
            state = %outcome.state,
            reason = ?outcome.err_state.as_ref().map(|reason| reason.to_string()),
            "publish_finished"
        );
        outcome
    }
}
