use crate::{
    config::QualityCapConfig,
    intent::IntentContext,
    policy::{Decision, Policy, PolicyError, Scope},
};

pub const QUALITY_CAP_ID: &str = "cap_quality";
pub const TARGET_QUALITY_KEY: &str = "transcode.targetQuality";
pub const TRANSCODE_INTENT: &str = "Transcode";

/// Clamps `transcode.targetQuality` on `Transcode` intents down to the cap,
/// across the whole subtree.
#[derive(Debug, Clone)]
pub struct QualityCap {
    priority: i32,
    max_quality: i64,
}

impl QualityCap {
    pub fn new() -> Self {
        Self::from_config(&QualityCapConfig::default())
    }

    pub fn from_config(config: &QualityCapConfig) -> Self {
        Self {
            priority: config.priority,
            max_quality: config.max_quality,
        }
    }
}

impl Default for QualityCap {
    fn default() -> Self {
        Self::new()
    }
}

impl Policy for QualityCap {
    fn id(&self) -> &str {
        QUALITY_CAP_ID
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn matches(&self, context: &IntentContext) -> bool {
        context.name() == TRANSCODE_INTENT
    }

    fn check(&self, context: &IntentContext) -> Result<Vec<Decision>, PolicyError> {
        let Some(quality) = context.params().get_i64(TARGET_QUALITY_KEY) else {
            return Ok(Vec::new());
        };
        if quality <= self.max_quality {
            return Ok(Vec::new());
        }

        let cap = self.max_quality;
        Ok(vec![Decision::adjust(
            QUALITY_CAP_ID,
            Scope::Subtree,
            format!("quality above cap; forcing {cap}"),
            move |params| {
                params.insert(TARGET_QUALITY_KEY, cap);
            },
        )])
    }
}
