use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use partnerline_cli::commands::{attribute, calculate, compare, config, migrate, seed};
use serde_json::Value;
use tempfile::TempDir;

const DEMO_DEAL: &str = r#"{
    "deal": { "id": "deal-file-001", "amount": "100000.00", "closed_at": "2026-03-31T00:00:00Z" },
    "touchpoints": [
        { "partner_id": "partner-a", "type": "referral", "timestamp": "2026-03-01T09:00:00Z" },
        { "partner_id": "partner-b", "type": "demo", "timestamp": "2026-03-10T15:30:00Z" },
        { "partner_id": "partner-c", "type": "content_share", "timestamp": "2026-03-20T11:00:00Z" }
    ],
    "partners": [
        { "id": "partner-a", "name": "Northwind", "commission_rate": "15" },
        { "id": "partner-b", "name": "Contoso", "commission_rate": "10" }
    ]
}"#;

#[test]
fn attribute_splits_equally_and_reports_commission() {
    let dir = TempDir::new().expect("temp dir");
    let input = write_deal(&dir, DEMO_DEAL);

    with_env(&[("PARTNERLINE_DATABASE_URL", "sqlite::memory:")], || {
        let result = attribute::run(&input, Some("equal_split"));
        assert_eq!(result.exit_code, 0, "unexpected output: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "attribute");
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["data"]["model"], "equal_split");

        let results = payload["data"]["results"].as_array().expect("results array");
        assert_eq!(results.len(), 3);
        assert_eq!(results[0]["partner_id"], "partner-a");
        assert_eq!(results[0]["percentage"], "33.34");
        assert_eq!(results[1]["percentage"], "33.33");
        assert_eq!(results[1]["commission_amount"], "3333.00");
        // partner-c has no rate on file
        assert_eq!(results[2]["commission_amount"], "0.00");
    });
}

#[test]
fn attribute_uses_configured_default_model() {
    let dir = TempDir::new().expect("temp dir");
    let input = write_deal(&dir, DEMO_DEAL);

    with_env(&[("PARTNERLINE_ATTRIBUTION_DEFAULT_MODEL", "last_touch")], || {
        let result = attribute::run(&input, None);
        assert_eq!(result.exit_code, 0, "unexpected output: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["data"]["model"], "last_touch");
        assert_eq!(payload["data"]["results"][0]["partner_id"], "partner-c");
        assert_eq!(payload["data"]["results"][0]["percentage"], "100.00");
    });
}

#[test]
fn attribute_rejects_unknown_model() {
    let dir = TempDir::new().expect("temp dir");
    let input = write_deal(&dir, DEMO_DEAL);

    with_env(&[], || {
        let result = attribute::run(&input, Some("linear"));
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "unknown_model");
    });
}

#[test]
fn attribute_reports_unreadable_input() {
    let dir = TempDir::new().expect("temp dir");
    let input = write_deal(&dir, "{ not json");

    with_env(&[], || {
        let result = attribute::run(&input, Some("first_touch"));
        assert_eq!(result.exit_code, 2);
        assert_eq!(parse_payload(&result.output)["error_class"], "input");
    });
}

#[test]
fn compare_runs_all_five_models() {
    let dir = TempDir::new().expect("temp dir");
    let input = write_deal(&dir, DEMO_DEAL);

    with_env(&[], || {
        let result = compare::run(&input);
        assert_eq!(result.exit_code, 0, "unexpected output: {}", result.output);

        let payload = parse_payload(&result.output);
        let models = payload["data"]["models"].as_object().expect("models map");
        assert_eq!(models.len(), 5);
        assert_eq!(models["first_touch"][0]["partner_id"], "partner-a");
        assert_eq!(models["role_based"].as_array().map(Vec::len), Some(3));
    });
}

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&[("PARTNERLINE_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_for_invalid_url() {
    with_env(&[("PARTNERLINE_DATABASE_URL", "postgres://elsewhere")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn seed_then_calculate_persists_and_summarizes() {
    let dir = TempDir::new().expect("temp dir");
    let url = format!("sqlite://{}", dir.path().join("partnerline.db").display());

    with_env(&[("PARTNERLINE_DATABASE_URL", url.as_str())], || {
        let seeded = seed::run();
        assert_eq!(seeded.exit_code, 0, "unexpected output: {}", seeded.output);
        assert!(parse_payload(&seeded.output)["message"]
            .as_str()
            .is_some_and(|message| message.contains("deal-demo-001")));

        let deals = vec!["deal-demo-001".to_string(), "deal-demo-002".to_string()];
        let result = calculate::run(&deals, Some("first_touch"), false);
        assert_eq!(result.exit_code, 0, "unexpected output: {}", result.output);

        let payload = parse_payload(&result.output);
        let partners = payload["data"]["partners"].as_array().expect("partner summaries");
        let fabrikam = partners
            .iter()
            .find(|summary| summary["partner_id"] == "partner-fabrikam")
            .expect("fabrikam wins the open deal");
        assert_eq!(fabrikam["deal_count"], 1);
        assert_eq!(fabrikam["total_amount"], "48000.00");
    });
}

#[test]
fn calculate_reports_missing_deal() {
    let dir = TempDir::new().expect("temp dir");
    let url = format!("sqlite://{}", dir.path().join("empty.db").display());

    with_env(&[("PARTNERLINE_DATABASE_URL", url.as_str())], || {
        let result = calculate::run(&["deal-missing".to_string()], None, true);
        assert_eq!(result.exit_code, 4);
        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "deal_not_found");
        assert_eq!(payload["correlation_id"], "deal-missing");
        assert_eq!(payload["hint"], "The requested deal could not be found.");
    });
}

#[test]
fn config_reports_env_sources() {
    with_env(&[("PARTNERLINE_ATTRIBUTION_HALF_LIFE_DAYS", "14")], || {
        let output = config::run();
        assert!(output.contains(
            "- attribution.half_life_days = 14 (source: env (PARTNERLINE_ATTRIBUTION_HALF_LIFE_DAYS))"
        ));
        assert!(output.contains("- logging.level = info (source: default)"));
    });
}

fn write_deal(dir: &TempDir, contents: &str) -> PathBuf {
    let path = dir.path().join("deal.json");
    fs::write(&path, contents).expect("write deal file");
    path
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "PARTNERLINE_DATABASE_URL",
        "PARTNERLINE_DATABASE_MAX_CONNECTIONS",
        "PARTNERLINE_DATABASE_TIMEOUT_SECS",
        "PARTNERLINE_ATTRIBUTION_DEFAULT_MODEL",
        "PARTNERLINE_ATTRIBUTION_HALF_LIFE_DAYS",
        "PARTNERLINE_ATTRIBUTION_FALLBACK_ROLE_WEIGHT",
        "PARTNERLINE_LOGGING_LEVEL",
        "PARTNERLINE_LOGGING_FORMAT",
        "PARTNERLINE_LOG_LEVEL",
        "PARTNERLINE_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
