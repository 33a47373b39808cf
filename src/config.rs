use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use jsonschema::{JSONSchema, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const CONFIG_SCHEMA: &str = include_str!("../intentctx.schema.json");

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub policies: PolicyConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

fn default_enabled_true() -> bool {
    true
}

fn default_logging_dir() -> PathBuf {
    PathBuf::from("./logs")
}

fn default_logging_filter() -> String {
    "info".to_string()
}

fn default_logging_rotation() -> LoggingRotation {
    LoggingRotation::Daily
}

fn default_logging_retention_days() -> usize {
    7
}

fn default_logging_targets() -> BTreeMap<String, String> {
    ["intent_context", "policy", "pipeline"]
        .into_iter()
        .map(|target| (target.to_string(), "info".to_string()))
        .collect()
}

fn default_stderr_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum LoggingRotation {
    Daily,
    Hourly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_logging_filter")]
    pub filter: String,
    #[serde(default = "default_logging_rotation")]
    pub rotation: LoggingRotation,
    #[serde(default = "default_logging_retention_days")]
    pub retention_days: usize,
    /// Level per crate target, layered over `filter`.
    #[serde(default = "default_logging_targets")]
    pub targets: BTreeMap<String, String>,
    #[serde(default)]
    pub stderr: StderrLoggingConfig,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_logging_dir(),
            filter: default_logging_filter(),
            rotation: default_logging_rotation(),
            retention_days: default_logging_retention_days(),
            targets: default_logging_targets(),
            stderr: StderrLoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StderrLoggingConfig {
    #[serde(default = "default_enabled_true")]
    pub enabled: bool,
    #[serde(default = "default_stderr_level")]
    pub level: String,
}

impl Default for StderrLoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_stderr_level(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub safety_stop: SafetyStopConfig,
    #[serde(default)]
    pub quality_cap: QualityCapConfig,
}

fn default_safety_stop_priority() -> i32 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyStopConfig {
    #[serde(default = "default_enabled_true")]
    pub enabled: bool,
    #[serde(default = "default_safety_stop_priority")]
    pub priority: i32,
}

impl Default for SafetyStopConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            priority: default_safety_stop_priority(),
        }
    }
}

fn default_quality_cap_priority() -> i32 {
    10
}

fn default_max_quality() -> i64 {
    1080
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityCapConfig {
    #[serde(default = "default_enabled_true")]
    pub enabled: bool,
    #[serde(default = "default_quality_cap_priority")]
    pub priority: i32,
    #[serde(default = "default_max_quality")]
    pub max_quality: i64,
}

impl Default for QualityCapConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            priority: default_quality_cap_priority(),
            max_quality: default_max_quality(),
        }
    }
}

fn default_video_id() -> String {
    "VID-42".to_string()
}

fn default_pipeline_deadline_ms() -> u64 {
    6_000
}

fn default_target_quality() -> i64 {
    1440
}

fn default_segment_count() -> usize {
    3
}

fn default_segment_ms() -> u64 {
    220
}

fn default_variant_qualities() -> Vec<i64> {
    vec![1080, 720]
}

fn default_thumbnail_frames() -> u32 {
    3
}

fn default_thumbnail_sizes() -> Vec<u32> {
    vec![120, 320]
}

fn default_extract_frame_ms() -> u64 {
    250
}

fn default_resize_ms() -> u64 {
    200
}

fn default_cdn_push_ms() -> u64 {
    600
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_video_id")]
    pub video_id: String,
    #[serde(default = "default_pipeline_deadline_ms")]
    pub deadline_ms: u64,
    #[serde(default = "default_target_quality")]
    pub target_quality: i64,
    #[serde(default)]
    pub safety_block: bool,
    #[serde(default = "default_segment_count")]
    pub segment_count: usize,
    #[serde(default = "default_segment_ms")]
    pub segment_ms: u64,
    #[serde(default = "default_variant_qualities")]
    pub variant_qualities: Vec<i64>,
    #[serde(default = "default_thumbnail_frames")]
    pub thumbnail_frames: u32,
    #[serde(default = "default_thumbnail_sizes")]
    pub thumbnail_sizes: Vec<u32>,
    #[serde(default = "default_extract_frame_ms")]
    pub extract_frame_ms: u64,
    #[serde(default = "default_resize_ms")]
    pub resize_ms: u64,
    #[serde(default = "default_cdn_push_ms")]
    pub cdn_push_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            video_id: default_video_id(),
            deadline_ms: default_pipeline_deadline_ms(),
            target_quality: default_target_quality(),
            safety_block: false,
            segment_count: default_segment_count(),
            segment_ms: default_segment_ms(),
            variant_qualities: default_variant_qualities(),
            thumbnail_frames: default_thumbnail_frames(),
            thumbnail_sizes: default_thumbnail_sizes(),
            extract_frame_ms: default_extract_frame_ms(),
            resize_ms: default_resize_ms(),
            cdn_push_ms: default_cdn_push_ms(),
        }
    }
}

impl Config {
    pub fn load(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("failed to read {}", config_path.display()))?;
        let mut config = Self::parse(&config_content)
            .with_context(|| format!("invalid config {}", config_path.display()))?;

        let config_base = config_path.parent().unwrap_or_else(|| Path::new("."));
        if !config.logging.dir.is_absolute() {
            config.logging.dir = config_base.join(&config.logging.dir);
        }

        Ok(config)
    }

    pub fn parse(config_content: &str) -> Result<Self> {
        let config_value: Value =
            json5::from_str(config_content).context("failed to parse config as json5")?;
        validate_against_schema(&config_value)?;
        serde_json::from_value(config_value).context("failed to deserialize config")
    }
}

fn validate_against_schema(config_value: &Value) -> Result<()> {
    let schema: Value =
        serde_json::from_str(CONFIG_SCHEMA).context("failed to parse embedded config schema")?;
    let compiled =
        JSONSchema::compile(&schema).map_err(|e| anyhow!("failed to compile schema: {e}"))?;

    match compiled.validate(config_value) {
        Ok(()) => Ok(()),
        Err(errors_iter) => {
            let validation_errors: Vec<ValidationError> = errors_iter.collect();
            let messages: Vec<String> = validation_errors
                .into_iter()
                .map(|error| error.to_string())
                .collect();
            Err(anyhow!("config validation failed: {}", messages.join("; ")))
        }
    }
}
