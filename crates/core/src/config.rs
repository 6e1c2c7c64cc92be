use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub slack: SlackConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct SlackConfig {
    pub bot_token: SecretString,
    /// Incoming-webhook URL of the channel that receives ticket messages.
    pub webhook_url: String,
    pub verification_token: Option<SecretString>,
    pub signing_secret: Option<SecretString>,
    /// Full API base override, e.g. a local recorder. Also rewrites outbound webhook hosts.
    pub api_url: Option<String>,
    /// Workspace host prefix, giving `https://<env>.slack.com`.
    pub env: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
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
    pub port: Option<u16>,
    pub slack_bot_token: Option<String>,
    pub slack_webhook_url: Option<String>,
    pub slack_api_url: Option<String>,
    pub slack_signing_secret: Option<String>,
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

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://tickets.db?mode=rwc".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            slack: SlackConfig {
                bot_token: String::new().into(),
                webhook_url: String::new(),
                verification_token: None,
                signing_secret: None,
                api_url: None,
                env: None,
                timeout_secs: 10,
            },
            server: ServerConfig { bind_address: "127.0.0.1".to_string(), port: 3000 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
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
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from("ticketrelay.toml"));
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

        if let Some(slack) = patch.slack {
            if let Some(bot_token) = slack.bot_token {
                self.slack.bot_token = secret_value(bot_token);
            }
            if let Some(webhook_url) = slack.webhook_url {
                self.slack.webhook_url = webhook_url;
            }
            if let Some(verification_token) = slack.verification_token {
                self.slack.verification_token = Some(secret_value(verification_token));
            }
            if let Some(signing_secret) = slack.signing_secret {
                self.slack.signing_secret = Some(secret_value(signing_secret));
            }
            if let Some(api_url) = slack.api_url {
                self.slack.api_url = Some(api_url);
            }
            if let Some(env) = slack.env {
                self.slack.env = Some(env);
            }
            if let Some(timeout_secs) = slack.timeout_secs {
                self.slack.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
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

    /// Prefixed variables first, then the bare names older deployments used.
    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("TICKETRELAY_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("TICKETRELAY_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("TICKETRELAY_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("TICKETRELAY_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("TICKETRELAY_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env_or("TICKETRELAY_SLACK_BOT_TOKEN", "SLACK_TOKEN") {
            self.slack.bot_token = secret_value(value);
        }
        if let Some(value) = read_env_or("TICKETRELAY_SLACK_WEBHOOK_URL", "SLACK_WEBHOOK") {
            self.slack.webhook_url = value;
        }
        if let Some(value) =
            read_env_or("TICKETRELAY_SLACK_VERIFICATION_TOKEN", "SLACK_VERIFICATION_TOKEN")
        {
            self.slack.verification_token = Some(secret_value(value));
        }
        if let Some(value) = read_env_or("TICKETRELAY_SLACK_SIGNING_SECRET", "SLACK_SIGNING_SECRET")
        {
            self.slack.signing_secret = Some(secret_value(value));
        }
        if let Some(value) = read_env_or("TICKETRELAY_SLACK_API_URL", "SLACK_URL") {
            self.slack.api_url = Some(value);
        }
        if let Some(value) = read_env_or("TICKETRELAY_SLACK_ENV", "SLACK_ENV") {
            self.slack.env = Some(value);
        }
        if let Some(value) = read_env("TICKETRELAY_SLACK_TIMEOUT_SECS") {
            self.slack.timeout_secs = parse_u64("TICKETRELAY_SLACK_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("TICKETRELAY_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("TICKETRELAY_SERVER_PORT") {
            self.server.port = parse_u16("TICKETRELAY_SERVER_PORT", &value)?;
        } else if let Some(value) = read_env("PORT") {
            self.server.port = parse_u16("PORT", &value)?;
        }

        let log_level =
            read_env("TICKETRELAY_LOGGING_LEVEL").or_else(|| read_env("TICKETRELAY_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("TICKETRELAY_LOGGING_FORMAT").or_else(|| read_env("TICKETRELAY_LOG_FORMAT"));
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
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(bot_token) = overrides.slack_bot_token {
            self.slack.bot_token = secret_value(bot_token);
        }
        if let Some(webhook_url) = overrides.slack_webhook_url {
            self.slack.webhook_url = webhook_url;
        }
        if let Some(api_url) = overrides.slack_api_url {
            self.slack.api_url = Some(api_url);
        }
        if let Some(signing_secret) = overrides.slack_signing_secret {
            self.slack.signing_secret = Some(secret_value(signing_secret));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_slack(&self.slack)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("ticketrelay.toml"), PathBuf::from("config/ticketrelay.toml")]
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

fn validate_slack(slack: &SlackConfig) -> Result<(), ConfigError> {
    let bot_token = slack.bot_token.expose_secret();
    if bot_token.is_empty() {
        return Err(ConfigError::Validation(
            "slack.bot_token is required (SLACK_TOKEN). Get it from https://api.slack.com/apps > Your App > OAuth & Permissions".to_string(),
        ));
    }
    if !bot_token.starts_with("xoxb-") && !bot_token.starts_with("xoxp-") {
        return Err(ConfigError::Validation(
            "slack.bot_token must start with `xoxb-` or `xoxp-`".to_string(),
        ));
    }

    let webhook_url = slack.webhook_url.trim();
    if webhook_url.is_empty() {
        return Err(ConfigError::Validation(
            "slack.webhook_url is required (SLACK_WEBHOOK). Create an incoming webhook for the ticket channel".to_string(),
        ));
    }
    if !is_http_url(webhook_url) {
        return Err(ConfigError::Validation(
            "slack.webhook_url must start with http:// or https://".to_string(),
        ));
    }

    let has_secret = |value: &Option<SecretString>| {
        value.as_ref().map(|secret| !secret.expose_secret().trim().is_empty()).unwrap_or(false)
    };
    if !has_secret(&slack.verification_token) && !has_secret(&slack.signing_secret) {
        return Err(ConfigError::Validation(
            "slack.verification_token or slack.signing_secret is required to verify interactive messages".to_string(),
        ));
    }

    if let Some(api_url) = &slack.api_url {
        if !is_http_url(api_url) {
            return Err(ConfigError::Validation(
                "slack.api_url must start with http:// or https://".to_string(),
            ));
        }
    }

    if slack.timeout_secs == 0 || slack.timeout_secs > 120 {
        return Err(ConfigError::Validation(
            "slack.timeout_secs must be in range 1..=120".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.bind_address.trim().is_empty() {
        return Err(ConfigError::Validation("server.bind_address must not be empty".to_string()));
    }

    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
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

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn read_env_or(key: &str, legacy_key: &str) -> Option<String> {
    read_env(key).or_else(|| read_env(legacy_key))
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
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

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    slack: Option<SlackPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SlackPatch {
    bot_token: Option<String>,
    webhook_url: Option<String>,
    verification_token: Option<String>,
    signing_secret: Option<String>,
    api_url: Option<String>,
    env: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
