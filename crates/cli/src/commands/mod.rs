pub mod config;
pub mod doctor;
pub mod inspect;
pub mod lookup;
pub mod search;

use rosterbot_core::config::{AppConfig, LoadOptions};
use rosterbot_core::{CsvDatasetLoader, DatasetCatalog};
use serde::Serialize;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome<T: Serialize> {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::success_with(command, message, None::<()>)
    }

    pub fn success_with<T: Serialize>(
        command: &str,
        message: impl Into<String>,
        data: Option<T>,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data,
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
            data: None::<()>,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

/// Loads config and the dataset it points at, mapping failures to the shared exit codes.
pub(crate) fn load_catalog(command: &str) -> Result<(AppConfig, DatasetCatalog), CommandResult> {
    let config = AppConfig::load(LoadOptions::default()).map_err(|error| {
        CommandResult::failure(
            command,
            "config_validation",
            format!("configuration issue: {error}"),
            2,
        )
    })?;

    let normalizer = config.field_normalizer().map_err(|error| {
        CommandResult::failure(command, "config_validation", error.to_string(), 2)
    })?;
    let loader = CsvDatasetLoader::new(
        config.dataset.path.clone(),
        config.dataset.columns.clone(),
        normalizer,
    );
    let catalog = DatasetCatalog::load_from(&loader);
    if let Err(error) = catalog.snapshot() {
        return Err(CommandResult::failure(command, "dataset_unavailable", error.to_string(), 4));
    }

    Ok((config, catalog))
}

fn serialize_payload<T: Serialize>(payload: CommandOutcome<T>) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\
             \"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}
