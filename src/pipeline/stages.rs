use std::{future, sync::Arc, time::Duration};

use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::{
    config::PipelineConfig,
    intent::{AbortKind, Constraints, Intent, IntentContext, WaitError, wait_all},
    pipeline::{EXTRACT_FRAME_INTENT, RESIZE_INTENT, SEGMENT_INTENT, VARIANT_INTENT},
    policies::TARGET_QUALITY_KEY,
    policy::{PolicyRegistry, evaluate_and_enforce},
};

/// Shared state handed to every stage task.
#[derive(Clone)]
pub struct Stages {
    config: Arc<PipelineConfig>,
    registry: Arc<PolicyRegistry>,
}

impl Stages {
    pub fn new(config: PipelineConfig, registry: Arc<PolicyRegistry>) -> Self {
        Self {
            config: Arc::new(config),
            registry,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Creates a child and runs the policies against it before any work
    /// starts, so workers read the enforced params.
    pub fn create(&self, parent: &IntentContext, intent: Intent) -> IntentContext {
        let (context, _cancel) = parent.with_intent(intent, Constraints::none());
        self.enforce(&context);
        context
    }

    pub fn enforce(&self, context: &IntentContext) {
        let (decisions, report) = evaluate_and_enforce(&self.registry, context);
        tracing::info!(
            target: "pipeline",
            context_id = %context.id(),
            intent = %context.name(),
            decisions = decisions.len(),
            adjusted = report.adjusted_contexts,
            root_cancelled = report.root_cancelled,
            params = ?context.params(),
            "policies_enforced"
        );
    }

    pub async fn transcode(self, transcode: IntentContext) {
        let params = transcode.params();
        let target = params.i64_or(TARGET_QUALITY_KEY, i64::MAX);
        let segment_count = params
            .get_i64("segmentCount")
            .and_then(|count| usize::try_from(count).ok())
            .unwrap_or(self.config.segment_count);
        let segment_ms = params
            .get_i64("segmentMs")
            .and_then(|ms| u64::try_from(ms).ok())
            .unwrap_or(self.config.segment_ms);

        let mut qualities: Vec<i64> = self
            .config
            .variant_qualities
            .iter()
            .copied()
            .filter(|quality| *quality <= target)
            .collect();
        if qualities.is_empty() && target != i64::MAX {
            qualities.push(target);
        }

        let mut variants = Vec::with_capacity(qualities.len());
        let mut tasks = Vec::with_capacity(qualities.len());
        for quality in qualities {
            let variant = self.create(
                &transcode,
                Intent::new(VARIANT_INTENT)
                    .with_param("quality", quality)
                    .with_param(TARGET_QUALITY_KEY, target),
            );
            let work = self.clone().segments(
                variant.clone(),
                segment_count,
                Duration::from_millis(segment_ms),
            );
            tasks.push(tokio::spawn(work.in_current_span()));
            variants.push(variant);
        }

        finish_stage(&transcode, wait_all(future::pending(), &variants).await);
        join_stage_tasks(&transcode, tasks).await;
    }

    async fn segments(self, variant: IntentContext, count: usize, work: Duration) {
        let mut segments = Vec::with_capacity(count);
        let mut tasks = Vec::with_capacity(count);
        for idx in 0..count {
            let segment =
                self.create(&variant, Intent::new(SEGMENT_INTENT).with_param("idx", idx));
            tasks.push(tokio::spawn(simulate_work(segment.clone(), work).in_current_span()));
            segments.push(segment);
        }

        finish_stage(&variant, wait_all(future::pending(), &segments).await);
        join_stage_tasks(&variant, tasks).await;
    }

    pub async fn thumbnail(self, thumbnail: IntentContext) {
        let frames = thumbnail
            .params()
            .get_i64("frames")
            .unwrap_or(i64::from(self.config.thumbnail_frames));

        let mut steps = vec![self.create(
            &thumbnail,
            Intent::new(EXTRACT_FRAME_INTENT).with_param("frames", frames),
        )];
        let extract = simulate_work(
            steps[0].clone(),
            Duration::from_millis(self.config.extract_frame_ms),
        );
        let mut tasks = vec![tokio::spawn(extract.in_current_span())];
        for size in &self.config.thumbnail_sizes {
            let resize =
                self.create(&thumbnail, Intent::new(RESIZE_INTENT).with_param("size", *size));
            let work = simulate_work(resize.clone(), Duration::from_millis(self.config.resize_ms));
            tasks.push(tokio::spawn(work.in_current_span()));
            steps.push(resize);
        }

        finish_stage(&thumbnail, wait_all(future::pending(), &steps).await);
        join_stage_tasks(&thumbnail, tasks).await;
    }

    pub async fn cdn_push(self, cdn: IntentContext) {
        simulate_work(cdn, Duration::from_millis(self.config.cdn_push_ms)).await;
    }
}

/// Races a fixed amount of work against the context's cancellation.
/// Returns whether the work completed and fulfilled the context.
pub async fn simulate_work(context: IntentContext, work: Duration) -> bool {
    tokio::select! {
        biased;
        _ = context.done() => {
            tracing::info!(
                target: "pipeline",
                context_id = %context.id(),
                intent = %context.name(),
                reason = ?context.err_state().map(|reason| reason.to_string()),
                "work_cancelled"
            );
            false
        }
        _ = tokio::time::sleep(work) => {
            let fulfilled = context.fulfill();
            tracing::info!(
                target: "pipeline",
                context_id = %context.id(),
                intent = %context.name(),
                state = %context.state(),
                "work_finished"
            );
            fulfilled
        }
    }
}

/// Fulfils a stage whose children all succeeded, aborts it otherwise.
pub fn finish_stage(stage: &IntentContext, children: Result<(), WaitError>) {
    match children {
        Ok(()) => {
            stage.fulfill();
        }
        Err(err) => {
            tracing::warn!(
                target: "pipeline",
                context_id = %stage.id(),
                intent = %stage.name(),
                error = %err,
                "stage_children_failed"
            );
            stage.abort(
                AbortKind::ExternallyCancelled,
                format!("{} children failed", stage.name()),
            );
        }
    }
    tracing::info!(
        target: "pipeline",
        context_id = %stage.id(),
        intent = %stage.name(),
        state = %stage.state(),
        "stage_finished"
    );
}

pub async fn join_stage_tasks<T>(stage: &IntentContext, tasks: Vec<JoinHandle<T>>) {
    for task in tasks {
        if let Err(err) = task.await {
            tracing::error!(
                target: "pipeline",
                context_id = %stage.id(),
                intent = %stage.name(),
                error = %err,
                "stage_task_join_failed"
            );
        }
    }
}
