use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use partnerline_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line(
        "database.url",
        &config.database.url,
        source("database.url", &["PARTNERLINE_DATABASE_URL"]),
    ));
    lines.push(render_line(
        "database.max_connections",
        &config.database.max_connections.to_string(),
        source("database.max_connections", &["PARTNERLINE_DATABASE_MAX_CONNECTIONS"]),
    ));
    lines.push(render_line(
        "database.timeout_secs",
        &config.database.timeout_secs.to_string(),
        source("database.timeout_secs", &["PARTNERLINE_DATABASE_TIMEOUT_SECS"]),
    ));

    lines.push(render_line(
        "attribution.default_model",
        config.attribution.default_model.as_str(),
        source("attribution.default_model", &["PARTNERLINE_ATTRIBUTION_DEFAULT_MODEL"]),
    ));
    lines.push(render_line(
        "attribution.half_life_days",
        &config.attribution.half_life_days.to_string(),
        source("attribution.half_life_days", &["PARTNERLINE_ATTRIBUTION_HALF_LIFE_DAYS"]),
    ));
    lines.push(render_line(
        "attribution.fallback_role_weight",
        &config.attribution.fallback_role_weight.to_string(),
        source(
            "attribution.fallback_role_weight",
            &["PARTNERLINE_ATTRIBUTION_FALLBACK_ROLE_WEIGHT"],
        ),
    ));
    for (kind, weight) in config.attribution.role_weights().iter() {
        let key_path = format!("attribution.role_weights.{kind}");
        lines.push(render_line(&key_path, &weight.to_string(), source(&key_path, &[])));
    }

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", &["PARTNERLINE_LOGGING_LEVEL", "PARTNERLINE_LOG_LEVEL"]),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format).to_lowercase(),
        source("logging.format", &["PARTNERLINE_LOGGING_FORMAT", "PARTNERLINE_LOG_FORMAT"]),
    ));

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("partnerline.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/partnerline.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
