use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::attribution::{
    ModelParameters, RoleWeights, DEFAULT_HALF_LIFE_DAYS, FALLBACK_ROLE_WEIGHT,
};
use crate::domain::attribution::AttributionModel;
use crate::domain::touchpoint::TouchpointType;
use crate::errors::{ApplicationError, DomainError};

#[derive(Clone, Debug, PartialEq)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub attribution: AttributionConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AttributionConfig {
    pub default_model: AttributionModel,
    pub half_life_days: f64,
    pub fallback_role_weight: f64,
    /// Per-type weights layered over the built-in role table.
    pub role_weights: BTreeMap<TouchpointType, f64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
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
    pub log_format: Option<LogFormat>,
    pub default_model: Option<AttributionModel>,
    pub half_life_days: Option<f64>,
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
                url: "sqlite://partnerline.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            attribution: AttributionConfig {
                default_model: AttributionModel::EqualSplit,
                half_life_days: DEFAULT_HALF_LIFE_DAYS,
                fallback_role_weight: FALLBACK_ROLE_WEIGHT,
                role_weights: BTreeMap::new(),
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl From<ConfigError> for ApplicationError {
    fn from(error: ConfigError) -> Self {
        ApplicationError::Configuration(error.to_string())
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

impl AttributionConfig {
    pub fn role_weights(&self) -> RoleWeights {
        self.role_weights
            .iter()
            .fold(RoleWeights::default(), |weights, (kind, weight)| {
                weights.with_weight(kind.clone(), *weight)
            })
            .with_fallback(self.fallback_role_weight)
    }

    pub fn model_parameters(&self) -> ModelParameters {
        ModelParameters::default()
            .with_half_life_days(self.half_life_days)
            .with_role_weights(self.role_weights())
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch)?;
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from("partnerline.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) -> Result<(), ConfigError> {
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

        if let Some(attribution) = patch.attribution {
            if let Some(default_model) = attribution.default_model {
                self.attribution.default_model =
                    default_model.parse().map_err(|error: DomainError| {
                        ConfigError::Validation(format!("attribution.default_model: {error}"))
                    })?;
            }
            if let Some(half_life_days) = attribution.half_life_days {
                self.attribution.half_life_days = half_life_days;
            }
            if let Some(fallback_role_weight) = attribution.fallback_role_weight {
                self.attribution.fallback_role_weight = fallback_role_weight;
            }
            if let Some(role_weights) = attribution.role_weights {
                for (kind, weight) in role_weights {
                    self.attribution.role_weights.insert(TouchpointType::from(kind), weight);
                }
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

        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("PARTNERLINE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("PARTNERLINE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("PARTNERLINE_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("PARTNERLINE_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("PARTNERLINE_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("PARTNERLINE_ATTRIBUTION_DEFAULT_MODEL") {
            self.attribution.default_model =
                parse_model("PARTNERLINE_ATTRIBUTION_DEFAULT_MODEL", &value)?;
        }
        if let Some(value) = read_env("PARTNERLINE_ATTRIBUTION_HALF_LIFE_DAYS") {
            self.attribution.half_life_days =
                parse_f64("PARTNERLINE_ATTRIBUTION_HALF_LIFE_DAYS", &value)?;
        }
        if let Some(value) = read_env("PARTNERLINE_ATTRIBUTION_FALLBACK_ROLE_WEIGHT") {
            self.attribution.fallback_role_weight =
                parse_f64("PARTNERLINE_ATTRIBUTION_FALLBACK_ROLE_WEIGHT", &value)?;
        }

        let log_level =
            read_env("PARTNERLINE_LOGGING_LEVEL").or_else(|| read_env("PARTNERLINE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("PARTNERLINE_LOGGING_FORMAT").or_else(|| read_env("PARTNERLINE_LOG_FORMAT"));
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
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
        if let Some(default_model) = overrides.default_model {
            self.attribution.default_model = default_model;
        }
        if let Some(half_life_days) = overrides.half_life_days {
            self.attribution.half_life_days = half_life_days;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_attribution(&self.attribution)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("partnerline.toml"), PathBuf::from("config/partnerline.toml")]
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

fn validate_attribution(attribution: &AttributionConfig) -> Result<(), ConfigError> {
    if !(attribution.half_life_days.is_finite() && attribution.half_life_days > 0.0) {
        return Err(ConfigError::Validation(
            "attribution.half_life_days must be a positive number of days".to_string(),
        ));
    }

    if !(attribution.fallback_role_weight.is_finite() && attribution.fallback_role_weight >= 0.0)
    {
        return Err(ConfigError::Validation(
            "attribution.fallback_role_weight must be zero or greater".to_string(),
        ));
    }

    if let Some((kind, _)) =
        attribution.role_weights.iter().find(|(_, weight)| !(weight.is_finite() && **weight >= 0.0))
    {
        return Err(ConfigError::Validation(format!(
            "attribution.role_weights.{kind} must be zero or greater"
        )));
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

fn parse_model(key: &str, value: &str) -> Result<AttributionModel, ConfigError> {
    value.parse::<AttributionModel>().map_err(|_| ConfigError::InvalidEnvOverride {
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

fn parse_f64(key: &str, value: &str) -> Result<f64, ConfigError> {
    value.trim().parse::<f64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    attribution: Option<AttributionPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AttributionPatch {
    default_model: Option<String>,
    half_life_days: Option<f64>,
    fallback_role_weight: Option<f64>,
    role_weights: Option<BTreeMap<String, f64>>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
