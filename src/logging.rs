//! Subscriber for the demo binary: JSON lines on disk for every crate target,
//! a short human view on stderr.

use std::{
    collections::BTreeMap,
    fs::{self, DirEntry},
    io,
    path::Path,
    time::{Duration, SystemTime},
};

use anyhow::{Context, Result, anyhow, bail};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, Layer, filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};
use uuid::Uuid;

use crate::config::{LoggingConfig, LoggingRotation};

const LOG_FILE_PREFIX: &str = "intentctx.log";
const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Flushes the file writer when dropped. The run id is stamped on the
/// `logging_initialized` event and on every publish outcome of the run.
pub struct LoggingGuard {
    run_id: String,
    _flush: WorkerGuard,
}

impl LoggingGuard {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }
}

pub fn init_tracing(config: &LoggingConfig) -> Result<LoggingGuard> {
    let directives = target_directives(&config.filter, &config.targets)?;
    let file_filter = EnvFilter::try_new(&directives)
        .with_context(|| format!("invalid logging filter '{directives}'"))?;
    let stderr_level = level(&config.stderr.level)
        .with_context(|| format!("invalid logging.stderr.level '{}'", config.stderr.level))?;

    if config.dir.as_os_str().is_empty() {
        bail!("logging.dir cannot be empty");
    }
    fs::create_dir_all(&config.dir)
        .with_context(|| format!("failed to create log dir {}", config.dir.display()))?;
    let sweep_failures = sweep_expired(
        &config.dir,
        Duration::from_secs(config.retention_days as u64 * SECS_PER_DAY),
        SystemTime::now(),
    );

    let rotation = match config.rotation {
        LoggingRotation::Daily => Rotation::DAILY,
        LoggingRotation::Hourly => Rotation::HOURLY,
    };
    let appender = RollingFileAppender::new(rotation, &config.dir, LOG_FILE_PREFIX);
    let (file_writer, flush) = tracing_appender::non_blocking(appender);

    let json_lines = fmt::layer()
        .json()
        .flatten_event(true)
        .with_current_span(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_ansi(false)
        .with_writer(file_writer)
        .with_filter(file_filter);
    let human = config.stderr.enabled.then(|| {
        fmt::layer()
            .compact()
            .without_time()
            .with_writer(io::stderr)
            .with_filter(stderr_level)
    });

    tracing_subscriber::registry()
        .with(ErrorLayer::default())
        .with(json_lines)
        .with(human)
        .try_init()
        .context("tracing subscriber already installed")?;

    let run_id = Uuid::now_v7().to_string();
    tracing::info!(
        target: "logging",
        run_id = %run_id,
        dir = %config.dir.display(),
        directives = %directives,
        "logging_initialized"
    );
    for failure in sweep_failures {
        tracing::warn!(target: "logging", failure = %failure, "log_sweep_failed");
    }

    Ok(LoggingGuard {
        run_id,
        _flush: flush,
    })
}

/// `filter` with a `target=level` directive appended for each configured
/// target it does not already mention.
fn target_directives(filter: &str, targets: &BTreeMap<String, String>) -> Result<String> {
    let filter = filter.trim();
    if filter.is_empty() {
        bail!("logging.filter cannot be empty");
    }

    let mut directives = vec![filter.to_string()];
    for (target, target_level) in targets {
        level(target_level)
            .with_context(|| format!("invalid level '{target_level}' for target '{target}'"))?;
        let named = filter
            .split(',')
            .any(|directive| directive.trim().starts_with(&format!("{target}=")));
        if !named {
            directives.push(format!("{target}={target_level}"));
        }
    }
    Ok(directives.join(","))
}

fn level(value: &str) -> Result<LevelFilter> {
    value.parse::<LevelFilter>().map_err(|err| anyhow!("{err}"))
}

/// Deletes log files older than `keep_for`. Failures are returned for
/// reporting once the subscriber is up.
fn sweep_expired(dir: &Path, keep_for: Duration, now: SystemTime) -> Vec<String> {
    let cutoff = now.checked_sub(keep_for).unwrap_or(SystemTime::UNIX_EPOCH);
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => return vec![format!("cannot list {}: {err}", dir.display())],
    };

    entries
        .flatten()
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(LOG_FILE_PREFIX))
        .filter(|entry| last_modified(entry).is_some_and(|modified| modified <= cutoff))
        .filter_map(|entry| {
            fs::remove_file(entry.path())
                .err()
                .map(|err| format!("cannot remove {}: {err}", entry.path().display()))
        })
        .collect()
}

fn last_modified(entry: &DirEntry) -> Option<SystemTime> {
    let metadata = entry.metadata().ok()?;
    metadata.is_file().then(|| metadata.modified().ok()).flatten()
}
