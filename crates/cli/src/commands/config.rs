use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use rosterbot_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_key: &str| {
        field_source(key_path, Some(env_key), config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let allowed_users = config
        .access
        .allowed_users
        .iter()
        .map(|user| user.0.to_string())
        .collect::<Vec<_>>()
        .join(",");
    let entries = [
        (
            "dataset.path",
            config.dataset.path.display().to_string(),
            "ROSTERBOT_DATASET_PATH",
        ),
        (
            "telegram.bot_token",
            redact_token(config.telegram.bot_token.expose_secret()),
            "ROSTERBOT_TELEGRAM_BOT_TOKEN",
        ),
        (
            "telegram.api_base_url",
            config.telegram.api_base_url.clone(),
            "ROSTERBOT_TELEGRAM_API_BASE_URL",
        ),
        (
            "telegram.poll_timeout_secs",
            config.telegram.poll_timeout_secs.to_string(),
            "ROSTERBOT_TELEGRAM_POLL_TIMEOUT_SECS",
        ),
        (
            "access.store_path",
            config
                .access
                .store_path
                .as_ref()
                .map_or_else(|| "<in-memory>".to_string(), |path| path.display().to_string()),
            "ROSTERBOT_ACCESS_STORE_PATH",
        ),
        (
            "access.allowed_users",
            if allowed_users.is_empty() { "<none>".to_string() } else { allowed_users },
            "ROSTERBOT_ACCESS_ALLOWED_USERS",
        ),
        (
            "search.max_results",
            config.search.max_results.to_string(),
            "ROSTERBOT_SEARCH_MAX_RESULTS",
        ),
        (
            "search.currency_suffix",
            config.search.currency_suffix.clone(),
            "ROSTERBOT_SEARCH_CURRENCY_SUFFIX",
        ),
        (
            "server.bind_address",
            config.server.bind_address.clone(),
            "ROSTERBOT_SERVER_BIND_ADDRESS",
        ),
        (
            "server.health_check_port",
            config.server.health_check_port.to_string(),
            "ROSTERBOT_SERVER_HEALTH_CHECK_PORT",
        ),
        ("logging.level", config.logging.level.clone(), "ROSTERBOT_LOGGING_LEVEL"),
        ("logging.format", format!("{:?}", config.logging.format), "ROSTERBOT_LOGGING_FORMAT"),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, value, env_key) in entries {
        lines.push(render_line(key, &value, source(key, env_key)));
    }
    lines.push(render_line(
        "normalization.phone_rewrites",
        &format!("{} rules", config.normalization.phone_rewrites.len()),
        field_source(
            "normalization.phone_rewrites",
            None,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        ),
    ));

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("rosterbot.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/rosterbot.toml");
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
    env_key: Option<&str>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_key {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
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

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((bot_id, _)) = trimmed.split_once(':') {
        return format!("{bot_id}:***");
    }

    "<redacted>".to_string()
}

#[cfg(test)]
mod tests {
    use super::{contains_path, redact_token};

    #[test]
    fn bot_tokens_keep_only_the_bot_id() {
        assert_eq!(redact_token("123456:ABC-def"), "123456:***");
        assert_eq!(redact_token("  "), "<empty>");
        assert_eq!(redact_token("opaque"), "<redacted>");
    }

    #[test]
    fn nested_keys_are_found_in_the_file_document() {
        let doc: toml::Value = "[search]\nmax_results = 3\n".parse().expect("valid toml");
        assert!(contains_path(&doc, "search.max_results"));
        assert!(!contains_path(&doc, "search.currency_suffix"));
    }
}
