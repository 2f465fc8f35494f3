//! Tracing setup for the `survey` binary.
//!
//! Human-readable events go to stderr so they never mix with command output
//! on stdout. When `log_file` is configured, every event at `debug` or above
//! is also appended there as one JSON object per line, independent of the
//! stderr filter.

use std::env;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use tracing::Subscriber;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::SurveyConfig;

/// Env var holding a filter directive; overrides `log_level`.
pub const FILTER_ENV: &str = "SURVEY_LOG";

const DEFAULT_DIRECTIVE: &str = "info";

/// Set once a subscriber is installed for this process.
static INSTALLED: Mutex<bool> = Mutex::new(false);

/// Resolved logging settings for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    /// Filter directive for stderr, e.g. `warn` or `promptability_survey=debug`.
    pub directive: String,
    /// JSON-lines file receiving debug-level events.
    pub file: Option<PathBuf>,
}

impl LogSettings {
    /// `SURVEY_LOG` > `log_level` > `info`.
    pub fn from_config(config: &SurveyConfig) -> Self {
        Self::resolve(
            config.log_level.as_deref(),
            config.log_file.as_deref(),
            env::var(FILTER_ENV).ok(),
        )
    }

    fn resolve(
        log_level: Option<&str>,
        log_file: Option<&Path>,
        env_directive: Option<String>,
    ) -> Self {
        let directive = env_directive
            .filter(|d| !d.trim().is_empty())
            .or_else(|| log_level.map(str::to_owned))
            .unwrap_or_else(|| DEFAULT_DIRECTIVE.to_owned());
        Self {
            directive,
            file: log_file.map(Path::to_path_buf),
        }
    }

    fn stderr_filter(&self) -> anyhow::Result<EnvFilter> {
        EnvFilter::try_new(&self.directive)
            .with_context(|| format!("invalid log filter '{}'", self.directive))
    }
}

/// Install the global subscriber for `config`. Later calls are no-ops.
pub fn init(config: &SurveyConfig) -> anyhow::Result<()> {
    let mut installed = INSTALLED
        .lock()
        .map_err(|_| anyhow::anyhow!("logging setup lock poisoned"))?;
    if *installed {
        return Ok(());
    }
    let settings = LogSettings::from_config(config);
    subscriber(&settings)?
        .try_init()
        .context("failed to install tracing subscriber")?;
    *installed = true;
    Ok(())
}

fn subscriber(settings: &LogSettings) -> anyhow::Result<impl Subscriber + Send + Sync + 'static> {
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .with_filter(settings.stderr_filter()?);

    let file_layer = match &settings.file {
        Some(path) => Some(
            tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(open_append(path)?))
                .with_target(false)
                .with_ansi(false)
                .json()
                .with_filter(LevelFilter::DEBUG),
        ),
        None => None,
    };

    Ok(tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer))
}

fn open_append(path: &Path) -> anyhow::Result<File> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => fs::create_dir_all(dir)
            .with_context(|| format!("cannot create log directory {}", dir.display()))?,
        _ => {}
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("cannot open log file {}", path.display()))
}
