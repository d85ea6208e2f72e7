use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub linear: LinearConfig,
    pub llm: LlmConfig,
    pub agent: AgentConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LinearConfig {
    pub api_url: String,
    pub api_key: Option<SecretString>,
    pub team_keys: Vec<String>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub max_iterations: u32,
    pub pacing_secs: u64,
    pub template_dir: Option<PathBuf>,
    pub tracker_schema_path: Option<PathBuf>,
    pub sql_schema_path: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    OpenAi,
    Anthropic,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub linear_api_key: Option<String>,
    pub max_iterations: Option<u32>,
    pub pacing_secs: Option<u64>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

pub const DEFAULT_LINEAR_API_URL: &str = "https://api.linear.app/graphql";

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://ema.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            linear: LinearConfig {
                api_url: DEFAULT_LINEAR_API_URL.to_string(),
                api_key: None,
                team_keys: Vec::new(),
                timeout_secs: 30,
            },
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: Some("http://localhost:11434".to_string()),
                model: "llama3.1".to_string(),
                timeout_secs: 120,
                max_retries: 2,
            },
            agent: AgentConfig::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            pacing_secs: 10,
            template_dir: None,
            tracker_schema_path: None,
            sql_schema_path: None,
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|anthropic|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("ema.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(linear) = patch.linear {
            if let Some(api_url) = linear.api_url {
                self.linear.api_url = api_url;
            }
            if let Some(api_key) = linear.api_key {
                self.linear.api_key = Some(secret_value(api_key));
            }
            if let Some(team_keys) = linear.team_keys {
                self.linear.team_keys = team_keys;
            }
            if let Some(timeout_secs) = linear.timeout_secs {
                self.linear.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(api_key) = llm.api_key {
                self.llm.api_key = Some(secret_value(api_key));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(agent) = patch.agent {
            if let Some(max_iterations) = agent.max_iterations {
                self.agent.max_iterations = max_iterations;
            }
            if let Some(pacing_secs) = agent.pacing_secs {
                self.agent.pacing_secs = pacing_secs;
            }
            if let Some(template_dir) = agent.template_dir {
                self.agent.template_dir = Some(template_dir);
            }
            if let Some(tracker_schema_path) = agent.tracker_schema_path {
                self.agent.tracker_schema_path = Some(tracker_schema_path);
            }
            if let Some(sql_schema_path) = agent.sql_schema_path {
                self.agent.sql_schema_path = Some(sql_schema_path);
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        let database_url = read_env("EMA_DATABASE_URL").or_else(|| read_env("DB_URL"));
        if let Some(value) = database_url {
            self.database.url = value;
        }
        if let Some(value) = read_env("EMA_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("EMA_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("EMA_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("EMA_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("EMA_LINEAR_API_URL") {
            self.linear.api_url = value;
        }
        let linear_api_key = read_env("EMA_LINEAR_API_KEY").or_else(|| read_env("LINEAR_API_KEY"));
        if let Some(value) = linear_api_key {
            self.linear.api_key = Some(secret_value(value));
        }
        let team_keys = read_env("EMA_LINEAR_TEAM_KEYS").or_else(|| read_env("LINEAR_TEAM_KEYS"));
        if let Some(value) = team_keys {
            self.linear.team_keys = parse_list("EMA_LINEAR_TEAM_KEYS", &value)?;
        }
        if let Some(value) = read_env("EMA_LINEAR_TIMEOUT_SECS") {
            self.linear.timeout_secs = parse_u64("EMA_LINEAR_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("EMA_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("EMA_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("EMA_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("EMA_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("EMA_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("EMA_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("EMA_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_u32("EMA_LLM_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("EMA_AGENT_MAX_ITERATIONS") {
            self.agent.max_iterations = parse_u32("EMA_AGENT_MAX_ITERATIONS", &value)?;
        }
        if let Some(value) = read_env("EMA_AGENT_PACING_SECS") {
            self.agent.pacing_secs = parse_u64("EMA_AGENT_PACING_SECS", &value)?;
        }
        if let Some(value) = read_env("EMA_AGENT_TEMPLATE_DIR") {
            self.agent.template_dir = Some(PathBuf::from(value));
        }
        if let Some(value) = read_env("EMA_AGENT_TRACKER_SCHEMA_PATH") {
            self.agent.tracker_schema_path = Some(PathBuf::from(value));
        }
        if let Some(value) = read_env("EMA_AGENT_SQL_SCHEMA_PATH") {
            self.agent.sql_schema_path = Some(PathBuf::from(value));
        }

        let log_level = read_env("EMA_LOGGING_LEVEL").or_else(|| read_env("EMA_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("EMA_LOGGING_FORMAT").or_else(|| read_env("EMA_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(linear_api_key) = overrides.linear_api_key {
            self.linear.api_key = Some(secret_value(linear_api_key));
        }
        if let Some(max_iterations) = overrides.max_iterations {
            self.agent.max_iterations = max_iterations;
        }
        if let Some(pacing_secs) = overrides.pacing_secs {
            self.agent.pacing_secs = pacing_secs;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_linear(&self.linear)?;
        validate_llm(&self.llm)?;
        validate_agent(&self.agent)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("ema.toml"), PathBuf::from("config/ema.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_linear(linear: &LinearConfig) -> Result<(), ConfigError> {
    if !linear.api_url.starts_with("http://") && !linear.api_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "linear.api_url must start with http:// or https://".to_string(),
        ));
    }

    if linear.timeout_secs == 0 || linear.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "linear.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    match llm.provider {
        LlmProvider::OpenAi | LlmProvider::Anthropic => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for openai/anthropic providers".to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for ollama provider".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn validate_agent(agent: &AgentConfig) -> Result<(), ConfigError> {
    if agent.max_iterations == 0 || agent.max_iterations > 100 {
        return Err(ConfigError::Validation(
            "agent.max_iterations must be in range 1..=100".to_string(),
        ));
    }

    if agent.pacing_secs > 300 {
        return Err(ConfigError::Validation(
            "agent.pacing_secs must be in range 0..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Accepts either a JSON array of strings or a comma-separated list.
fn parse_list(key: &str, value: &str) -> Result<Vec<String>, ConfigError> {
    let trimmed = value.trim();
    if trimmed.starts_with('[') {
        return serde_json::from_str::<Vec<String>>(trimmed).map_err(|_| {
            ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
        });
    }

    Ok(trimmed
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect())
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    linear: Option<LinearPatch>,
    llm: Option<LlmPatch>,
    agent: Option<AgentPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LinearPatch {
    api_url: Option<String>,
    api_key: Option<String>,
    team_keys: Option<Vec<String>>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentPatch {
    max_iterations: Option<u32>,
    pacing_secs: Option<u64>,
    template_dir: Option<PathBuf>,
    tracker_schema_path: Option<PathBuf>,
    sql_schema_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
