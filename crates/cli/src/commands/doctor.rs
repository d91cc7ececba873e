use rosterbot_core::config::{AppConfig, LoadOptions};
use rosterbot_core::{AccessStore, CsvDatasetLoader, DatasetLoader, FileAccessStore};
use secrecy::ExposeSecret;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn failed(name: &'static str, details: String) -> Self {
        Self { name, status: CheckStatus::Fail, details }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\
                 \"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_bot_token(&config));
            checks.push(check_dataset(&config));
            checks.push(check_access_store(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["bot_token_readiness", "dataset_load", "access_store"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_bot_token(config: &AppConfig) -> DoctorCheck {
    let bot_id = config.telegram.bot_token.expose_secret().split(':').next().unwrap_or_default();
    DoctorCheck {
        name: "bot_token_readiness",
        status: CheckStatus::Pass,
        details: format!(
            "token for bot {bot_id} validated by config contract; api at {}",
            config.telegram.api_base_url
        ),
    }
}

fn check_dataset(config: &AppConfig) -> DoctorCheck {
    let normalizer = match config.field_normalizer() {
        Ok(normalizer) => normalizer,
        Err(error) => return DoctorCheck::failed("dataset_load", error.to_string()),
    };
    let loader = CsvDatasetLoader::new(
        config.dataset.path.clone(),
        config.dataset.columns.clone(),
        normalizer,
    );

    match loader.load() {
        Ok(records) if records.is_empty() => DoctorCheck {
            name: "dataset_load",
            status: CheckStatus::Fail,
            details: format!("{} contains no subscriber rows", loader.describe()),
        },
        Ok(records) => DoctorCheck {
            name: "dataset_load",
            status: CheckStatus::Pass,
            details: format!("loaded {} records from {}", records.len(), loader.describe()),
        },
        Err(error) => DoctorCheck::failed("dataset_load", error.to_string()),
    }
}

fn check_access_store(config: &AppConfig) -> DoctorCheck {
    let Some(path) = &config.access.store_path else {
        return DoctorCheck {
            name: "access_store",
            status: CheckStatus::Pass,
            details: format!(
                "in-memory access list seeded with {} users; not persisted across restarts",
                config.access.allowed_users.len()
            ),
        };
    };

    let opened = FileAccessStore::open(path).and_then(|store| {
        store.ensure_writable()?;
        store.members()
    });
    match opened {
        Ok(members) => DoctorCheck {
            name: "access_store",
            status: CheckStatus::Pass,
            details: format!("{} holds {} users", path.display(), members.len()),
        },
        Err(error) => DoctorCheck::failed("access_store", error.to_string()),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
