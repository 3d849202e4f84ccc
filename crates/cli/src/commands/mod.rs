pub mod attribute;
pub mod calculate;
pub mod compare;
pub mod config;
pub mod input;
pub mod migrate;
pub mod seed;

use partnerline_core::config::{AppConfig, LoadOptions};
use partnerline_core::{ApplicationError, AttributionModel, DealId, DomainError, InterfaceError};
use serde::Serialize;
use serde_json::Value;
use tokio::runtime::Runtime;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

/// Error carried out of async command bodies. Attribution failures also
/// carry the interface-facing error so the payload can report its
/// correlation id and user message.
#[derive(Debug)]
pub(crate) struct Failure {
    error_class: &'static str,
    message: String,
    exit_code: u8,
    interface: Option<InterfaceError>,
}

/// `(error_class, message, exit_code)`
impl From<(&'static str, String, u8)> for Failure {
    fn from((error_class, message, exit_code): (&'static str, String, u8)) -> Self {
        Self { error_class, message, exit_code, interface: None }
    }
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            correlation_id: None,
            hint: None,
            data: None,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn success_with_data(
        command: &str,
        message: impl Into<String>,
        data: &impl Serialize,
    ) -> Self {
        let data = match serde_json::to_value(data) {
            Ok(data) => data,
            Err(error) => {
                return Self::failure(command, "serialization", error.to_string(), 1);
            }
        };
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            correlation_id: None,
            hint: None,
            data: Some(data),
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            correlation_id: None,
            hint: None,
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    pub(crate) fn from_failure(command: &str, failure: impl Into<Failure>) -> Self {
        let Failure { error_class, message, exit_code, interface } = failure.into();
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message,
            correlation_id: interface.as_ref().map(|error| error.correlation_id().to_string()),
            hint: interface.as_ref().map(InterfaceError::user_message),
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

pub(crate) fn load_config(command: &str) -> Result<AppConfig, CommandResult> {
    AppConfig::load(LoadOptions::default()).map_err(|error| {
        CommandResult::failure(
            command,
            "config_validation",
            format!("configuration issue: {error}"),
            2,
        )
    })
}

pub(crate) fn build_runtime(command: &str) -> Result<Runtime, CommandResult> {
    tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
        CommandResult::failure(
            command,
            "runtime_init",
            format!("failed to initialize async runtime: {error}"),
            3,
        )
    })
}

/// Explicit `--model` wins; otherwise the configured default applies.
pub(crate) fn resolve_model(
    command: &str,
    requested: Option<&str>,
    config: &AppConfig,
) -> Result<AttributionModel, CommandResult> {
    match requested {
        Some(name) => name.parse().map_err(|error: DomainError| {
            CommandResult::failure(command, "unknown_model", error.to_string(), 2)
        }),
        None => Ok(config.attribution.default_model),
    }
}

/// Attribution failures are correlated by the deal they were raised for.
pub(crate) fn attribution_failure(deal_id: &DealId, error: ApplicationError) -> Failure {
    let error_class = match &error {
        ApplicationError::Domain(DomainError::DealNotFound(_)) => "deal_not_found",
        ApplicationError::Domain(DomainError::UnknownModel(_)) => "unknown_model",
        ApplicationError::Domain(DomainError::InvariantViolation(_)) => "invariant_violation",
        ApplicationError::Persistence(_) => "persistence",
        ApplicationError::Conflict { .. } => "conflict",
        ApplicationError::Configuration(_) => "config_validation",
    };
    let message = error.to_string();
    let interface = error.into_interface(deal_id.to_string());
    warn!(
        event_name = "cli.attribution.failed",
        correlation_id = %interface.correlation_id(),
        error_class,
        error = %message,
        "attribution failed"
    );
    Failure { error_class, message, exit_code: 4, interface: Some(interface) }
}
