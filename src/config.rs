use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::cli::GlobalArgs;
use crate::error::SurveyError;
use crate::form::DEFAULT_STORAGE_KEY;
use crate::storage;
use crate::submit::{DEFAULT_API_KEY_HEADER, SubmitTarget};

// Precedence: CLI > env > file > defaults.

const DEFAULT_STORAGE_DIR: &str = ".survey";
const DEFAULT_TIMEOUT_SEC: u64 = 30;
const DEFAULT_LANGUAGE: &str = "en-US";

const ENV_PREFIX: &str = "SURVEY_";

/// Resolved configuration for a survey session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurveyConfig {
    /// Submission endpoint. Only required by commands that submit.
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    /// Header that carries `api_key` (default `x-api-key`).
    pub api_key_header: String,
    /// Directory holding persisted answers.
    pub storage_dir: PathBuf,
    /// Versioned key the answers are stored under.
    pub storage_key: String,
    /// TOML questionnaire; the built-in questionnaire is used when unset.
    pub questions_path: Option<PathBuf>,
    pub timeout_sec: u64,
    pub user_agent: String,
    pub language: String,
    pub log_level: Option<String>,
    pub log_file: Option<PathBuf>,
}

/// TOML-deserializable config file representation. All fields optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    endpoint: Option<String>,
    api_key: Option<String>,
    api_key_header: Option<String>,
    storage_dir: Option<PathBuf>,
    storage_key: Option<String>,
    questions_path: Option<PathBuf>,
    timeout_sec: Option<u64>,
    user_agent: Option<String>,
    language: Option<String>,
    log_level: Option<String>,
    log_file: Option<PathBuf>,
}

/// Intermediate layer where every field is optional, used to merge sources.
#[derive(Debug, Default)]
struct ConfigLayer {
    endpoint: Option<String>,
    api_key: Option<String>,
    api_key_header: Option<String>,
    storage_dir: Option<PathBuf>,
    storage_key: Option<String>,
    questions_path: Option<PathBuf>,
    timeout_sec: Option<u64>,
    user_agent: Option<String>,
    language: Option<String>,
    log_level: Option<String>,
    log_file: Option<PathBuf>,
}

impl From<FileConfig> for ConfigLayer {
    fn from(fc: FileConfig) -> Self {
        ConfigLayer {
            endpoint: fc.endpoint,
            api_key: fc.api_key,
            api_key_header: fc.api_key_header,
            storage_dir: fc.storage_dir,
            storage_key: fc.storage_key,
            questions_path: fc.questions_path,
            timeout_sec: fc.timeout_sec,
            user_agent: fc.user_agent,
            language: fc.language,
            log_level: fc.log_level,
            log_file: fc.log_file,
        }
    }
}

impl SurveyConfig {
    /// Load configuration with precedence: CLI > env > file > defaults.
    ///
    /// `config_path`: optional path to a TOML config file.
    /// `cli_args`: values provided on the command line.
    pub fn load(config_path: Option<&Path>, cli_args: &GlobalArgs) -> anyhow::Result<Self> {
        Self::load_with_env(config_path, cli_args, real_env_var)
    }

    /// Internal constructor that accepts an env-var lookup function,
    /// enabling deterministic testing without process-global mutation.
    fn load_with_env(
        config_path: Option<&Path>,
        cli_args: &GlobalArgs,
        env_fn: fn(&str) -> Option<String>,
    ) -> anyhow::Result<Self> {
        let file_layer = match config_path {
            Some(path) => load_file_layer(path)?,
            None => ConfigLayer::default(),
        };
        let env_layer = load_env_layer(env_fn)?;
        let cli_layer = cli_layer_from(cli_args);

        let merged = merge_layers(file_layer, env_layer, cli_layer);

        Ok(SurveyConfig {
            endpoint: merged.endpoint.filter(|e| !e.trim().is_empty()),
            api_key: merged.api_key.filter(|k| !k.is_empty()),
            api_key_header: merged
                .api_key_header
                .unwrap_or_else(|| DEFAULT_API_KEY_HEADER.to_owned()),
            storage_dir: merged
                .storage_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_DIR)),
            storage_key: merged
                .storage_key
                .unwrap_or_else(|| DEFAULT_STORAGE_KEY.to_owned()),
            questions_path: merged.questions_path,
            timeout_sec: merged.timeout_sec.unwrap_or(DEFAULT_TIMEOUT_SEC),
            user_agent: merged.user_agent.unwrap_or_else(default_user_agent),
            language: merged
                .language
                .or_else(system_language)
                .unwrap_or_else(|| DEFAULT_LANGUAGE.to_owned()),
            log_level: merged.log_level,
            log_file: merged.log_file,
        })
    }

    /// Reject values that would only fail later, mid-session.
    pub fn validate(&self) -> anyhow::Result<()> {
        storage::check_key(&self.storage_key)?;
        if self.timeout_sec == 0 {
            anyhow::bail!("timeout_sec must be greater than zero");
        }
        if self.api_key_header.trim().is_empty() {
            anyhow::bail!("api_key_header must not be empty");
        }
        Ok(())
    }

    /// Submission target, or an error when no endpoint is configured.
    pub fn submit_target(&self) -> Result<SubmitTarget, SurveyError> {
        let endpoint = self
            .endpoint
            .as_deref()
            .ok_or(SurveyError::EndpointNotConfigured)?;
        let target = SubmitTarget::new(endpoint);
        Ok(match &self.api_key {
            Some(key) => target.with_api_key(self.api_key_header.as_str(), key.as_str()),
            None => target,
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_sec)
    }
}

fn default_user_agent() -> String {
    format!("promptability-survey/{}", env!("CARGO_PKG_VERSION"))
}

/// `LANG=en_US.UTF-8` becomes `en-US`; `C` and `POSIX` carry no language.
fn system_language() -> Option<String> {
    env::var("LANG").ok().and_then(|l| locale_to_language(&l))
}

fn locale_to_language(locale: &str) -> Option<String> {
    let base = locale.split(['.', '@']).next().unwrap_or_default().trim();
    if base.is_empty() || base == "C" || base == "POSIX" {
        return None;
    }
    Some(base.replace('_', "-"))
}

fn load_file_layer(path: &Path) -> anyhow::Result<ConfigLayer> {
    let contents = fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;
    let fc: FileConfig = toml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("failed to parse config file {}: {e}", path.display()))?;
    Ok(fc.into())
}

fn real_env_var(suffix: &str) -> Option<String> {
    let key = format!("{ENV_PREFIX}{suffix}");
    env::var(&key).ok().filter(|v| !v.is_empty())
}

fn load_env_layer(env_fn: fn(&str) -> Option<String>) -> Result<ConfigLayer, SurveyError> {
    Ok(ConfigLayer {
        endpoint: env_fn("ENDPOINT"),
        api_key: env_fn("API_KEY"),
        api_key_header: env_fn("API_KEY_HEADER"),
        storage_dir: env_fn("STORAGE_DIR").map(PathBuf::from),
        storage_key: env_fn("STORAGE_KEY"),
        questions_path: env_fn("QUESTIONS_PATH").map(PathBuf::from),
        timeout_sec: parse_env_u64(env_fn, "TIMEOUT_SEC")?,
        user_agent: env_fn("USER_AGENT"),
        language: env_fn("LANGUAGE"),
        log_level: env_fn("LOG_LEVEL"),
        log_file: env_fn("LOG_FILE").map(PathBuf::from),
    })
}

fn parse_env_u64(
    env_fn: fn(&str) -> Option<String>,
    suffix: &str,
) -> Result<Option<u64>, SurveyError> {
    match env_fn(suffix) {
        Some(s) => s
            .parse::<u64>()
            .map(Some)
            .map_err(|e| SurveyError::ConfigEnvParseError {
                var: format!("{ENV_PREFIX}{suffix}"),
                detail: e.to_string(),
            }),
        None => Ok(None),
    }
}

fn cli_layer_from(args: &GlobalArgs) -> ConfigLayer {
    ConfigLayer {
        endpoint: args.endpoint.clone(),
        api_key: args.api_key.clone(),
        api_key_header: None,
        storage_dir: args.storage_dir.clone(),
        storage_key: args.storage_key.clone(),
        questions_path: args.questions.clone(),
        timeout_sec: args.timeout_sec,
        user_agent: None,
        language: args.language.clone(),
        log_level: args.log_level.clone(),
        log_file: args.log_file.clone(),
    }
}

/// Merge three layers. For each field, pick CLI first, then env, then file.
fn merge_layers(file: ConfigLayer, env: ConfigLayer, cli: ConfigLayer) -> ConfigLayer {
    ConfigLayer {
        endpoint: cli.endpoint.or(env.endpoint).or(file.endpoint),
        api_key: cli.api_key.or(env.api_key).or(file.api_key),
        api_key_header: cli
            .api_key_header
            .or(env.api_key_header)
            .or(file.api_key_header),
        storage_dir: cli.storage_dir.or(env.storage_dir).or(file.storage_dir),
        storage_key: cli.storage_key.or(env.storage_key).or(file.storage_key),
        questions_path: cli
            .questions_path
            .or(env.questions_path)
            .or(file.questions_path),
        timeout_sec: cli.timeout_sec.or(env.timeout_sec).or(file.timeout_sec),
        user_agent: cli.user_agent.or(env.user_agent).or(file.user_agent),
        language: cli.language.or(env.language).or(file.language),
        log_level: cli.log_level.or(env.log_level).or(file.log_level),
        log_file: cli.log_file.or(env.log_file).or(file.log_file),
    }
}
