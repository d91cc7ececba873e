use std::env;
use std::fs;
use std::sync::{Mutex, OnceLock};

use rosterbot_cli::commands::{doctor, inspect, lookup, search};
use serde_json::Value;
use tempfile::TempDir;

const TOKEN: &str = "123456:cli-test";
const SHEET: &str = "\
building,block,unit,full_name,mobile,secondary_phone,amount
A,1,12,Ali Rezaei,9.123456789,,1250000
A,1,14,Sara Ahmadi,,09350000000,
A,2,3,Reza Karimi,09121111111,,0
B,1,1,Maryam Nouri,09122222222,,
";

fn sheet() -> TempDir {
    let dir = TempDir::new().expect("temp dir");
    fs::write(dir.path().join("subscribers.csv"), SHEET).expect("write sheet");
    dir
}

fn sheet_path(dir: &TempDir) -> String {
    dir.path().join("subscribers.csv").display().to_string()
}

#[test]
fn inspect_summarizes_buildings_and_blocks() {
    let dir = sheet();
    let path = sheet_path(&dir);
    with_env(&[("ROSTERBOT_TELEGRAM_BOT_TOKEN", TOKEN), ("ROSTERBOT_DATASET_PATH", &path)], || {
        let result = inspect::run(None);
        assert_eq!(result.exit_code, 0, "expected inspect success: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "inspect");
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["data"]["records"], 4);
        assert_eq!(payload["data"]["buildings"][0]["building"], "A");
        assert_eq!(payload["data"]["buildings"][0]["blocks"], serde_json::json!(["1", "2"]));
        assert_eq!(payload["data"]["buildings"][0]["records"], 3);
    });
}

#[test]
fn inspect_rejects_unknown_building() {
    let dir = sheet();
    let path = sheet_path(&dir);
    with_env(&[("ROSTERBOT_TELEGRAM_BOT_TOKEN", TOKEN), ("ROSTERBOT_DATASET_PATH", &path)], || {
        let result = inspect::run(Some("Z"));
        assert_eq!(result.exit_code, 1);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "unknown_building");
    });
}

#[test]
fn inspect_building_filter_ignores_case() {
    let dir = sheet();
    let path = sheet_path(&dir);
    with_env(&[("ROSTERBOT_TELEGRAM_BOT_TOKEN", TOKEN), ("ROSTERBOT_DATASET_PATH", &path)], || {
        let result = inspect::run(Some("a"));
        assert_eq!(result.exit_code, 0, "expected inspect success: {}", result.output);

        let payload = parse_payload(&result.output);
        let buildings = payload["data"]["buildings"].as_array().cloned().unwrap_or_default();
        assert_eq!(buildings.len(), 1);
        assert_eq!(buildings[0]["building"], "A");
        assert_eq!(buildings[0]["records"], 3);
    });
}

#[test]
fn lookup_finds_a_record_by_exact_key() {
    let dir = sheet();
    let path = sheet_path(&dir);
    with_env(&[("ROSTERBOT_TELEGRAM_BOT_TOKEN", TOKEN), ("ROSTERBOT_DATASET_PATH", &path)], || {
        let result = lookup::run("A", "1", "14");
        assert_eq!(result.exit_code, 0, "expected lookup success: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "lookup");
        assert_eq!(payload["data"]["key"], "A_1_14");
        assert_eq!(payload["data"]["matches"], 1);
        assert!(payload["message"].as_str().unwrap_or_default().contains("Sara Ahmadi"));

        let missing = lookup::run("A", "1", "99");
        assert_eq!(missing.exit_code, 1);
        assert_eq!(parse_payload(&missing.output)["error_class"], "no_match");
    });
}

#[test]
fn search_renders_the_reply_for_a_unit_number() {
    let dir = sheet();
    let path = sheet_path(&dir);
    with_env(&[("ROSTERBOT_TELEGRAM_BOT_TOKEN", TOKEN), ("ROSTERBOT_DATASET_PATH", &path)], || {
        let result = search::run("A", "1", "12", None);
        assert_eq!(result.exit_code, 0, "expected search success: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["data"]["matches"], 1);
        let message = payload["message"].as_str().unwrap_or_default();
        assert!(message.contains("Ali Rezaei"));
        assert!(message.contains("9123456789"));
        assert!(message.contains("1,250,000 Toman"));
    });
}

#[test]
fn search_reports_no_match_with_exit_code() {
    let dir = sheet();
    let path = sheet_path(&dir);
    with_env(&[("ROSTERBOT_TELEGRAM_BOT_TOKEN", TOKEN), ("ROSTERBOT_DATASET_PATH", &path)], || {
        let result = search::run("A", "1", "99", None);
        assert_eq!(result.exit_code, 1);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "no_match");
    });
}

#[test]
fn search_fails_when_dataset_is_missing() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("absent.csv").display().to_string();
    with_env(&[("ROSTERBOT_TELEGRAM_BOT_TOKEN", TOKEN), ("ROSTERBOT_DATASET_PATH", &path)], || {
        let result = search::run("A", "1", "12", None);
        assert_eq!(result.exit_code, 4);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "dataset_unavailable");
    });
}

#[test]
fn commands_return_config_failure_without_token() {
    with_env(&[], || {
        let result = search::run("A", "1", "12", None);
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "search");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn doctor_passes_with_loadable_dataset() {
    let dir = sheet();
    let path = sheet_path(&dir);
    with_env(&[("ROSTERBOT_TELEGRAM_BOT_TOKEN", TOKEN), ("ROSTERBOT_DATASET_PATH", &path)], || {
        let payload = parse_payload(&doctor::run(true));
        assert_eq!(payload["overall_status"], "pass");

        let checks = payload["checks"].as_array().cloned().unwrap_or_default();
        let dataset = checks.iter().find(|check| check["name"] == "dataset_load");
        assert!(dataset.is_some_and(|check| check["details"]
            .as_str()
            .is_some_and(|details| details.starts_with("loaded 4 records"))));
    });
}

#[test]
fn doctor_fails_access_check_when_directory_is_missing() {
    let dir = sheet();
    let path = sheet_path(&dir);
    let access = dir.path().join("gone").join("access.json").display().to_string();
    let vars = [
        ("ROSTERBOT_TELEGRAM_BOT_TOKEN", TOKEN),
        ("ROSTERBOT_DATASET_PATH", path.as_str()),
        ("ROSTERBOT_ACCESS_STORE_PATH", access.as_str()),
    ];
    with_env(&vars, || {
        let payload = parse_payload(&doctor::run(true));
        assert_eq!(payload["overall_status"], "fail");

        let checks = payload["checks"].as_array().cloned().unwrap_or_default();
        let store = checks.iter().find(|check| check["name"] == "access_store");
        assert!(store.is_some_and(|check| check["status"] == "fail"));
    });
}

#[test]
fn doctor_skips_downstream_checks_when_config_invalid() {
    with_env(&[], || {
        let payload = parse_payload(&doctor::run(true));
        assert_eq!(payload["overall_status"], "fail");
        assert_eq!(payload["checks"][1]["status"], "skipped");
        assert_eq!(payload["checks"][2]["status"], "skipped");
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "ROSTERBOT_DATASET_PATH",
        "ROSTERBOT_TELEGRAM_BOT_TOKEN",
        "ROSTERBOT_TELEGRAM_API_BASE_URL",
        "ROSTERBOT_TELEGRAM_POLL_TIMEOUT_SECS",
        "ROSTERBOT_ACCESS_STORE_PATH",
        "ROSTERBOT_ACCESS_ALLOWED_USERS",
        "ROSTERBOT_SEARCH_MAX_RESULTS",
        "ROSTERBOT_SEARCH_CURRENCY_SUFFIX",
        "ROSTERBOT_SERVER_BIND_ADDRESS",
        "ROSTERBOT_SERVER_HEALTH_CHECK_PORT",
        "ROSTERBOT_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "ROSTERBOT_LOGGING_LEVEL",
        "ROSTERBOT_LOGGING_FORMAT",
        "ROSTERBOT_LOG_LEVEL",
        "ROSTERBOT_LOG_FORMAT",
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
