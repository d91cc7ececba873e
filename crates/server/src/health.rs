use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use rosterbot_core::{DatasetCatalog, DatasetLoader, DatasetStatus};
use rosterbot_telegram::{PollingHealth, PollingState};
use serde::Serialize;
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct OpsState {
    catalog: Arc<DatasetCatalog>,
    loader: Arc<dyn DatasetLoader>,
    polling: PollingHealth,
}

impl OpsState {
    pub fn new(
        catalog: Arc<DatasetCatalog>,
        loader: Arc<dyn DatasetLoader>,
        polling: PollingHealth,
    ) -> Self {
        Self { catalog, loader, polling }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub dataset: HealthCheck,
    pub polling: HealthCheck,
    pub checked_at: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReloadResponse {
    pub status: &'static str,
    pub records: Option<usize>,
    pub detail: String,
}

pub fn router(state: OpsState) -> Router {
    Router::new().route("/health", get(health)).route("/reload", post(reload)).with_state(state)
}

pub async fn spawn(bind_address: &str, port: u16, state: OpsState) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.health.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "ops endpoint started"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(state)).await {
            error!(
                event_name = "system.health.error",
                correlation_id = "bootstrap",
                error = %error,
                "ops endpoint server terminated unexpectedly"
            );
        }
    });

    Ok(())
}

pub async fn health(State(state): State<OpsState>) -> (StatusCode, Json<HealthResponse>) {
    let dataset = dataset_check(&state.catalog);
    let polling = polling_check(&state.polling);
    let ready = dataset.status == "ready" && polling.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "rosterbot-server runtime initialized".to_string(),
        },
        dataset,
        polling,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

/// Re-reads the dataset source. Loading touches the filesystem, so it runs off the async workers.
pub async fn reload(State(state): State<OpsState>) -> (StatusCode, Json<ReloadResponse>) {
    let OpsState { catalog, loader, .. } = state;
    let outcome = tokio::task::spawn_blocking(move || catalog.reload(loader.as_ref())).await;

    match outcome {
        Ok(Ok(records)) => (
            StatusCode::OK,
            Json(ReloadResponse {
                status: "ready",
                records: Some(records),
                detail: format!("{records} records loaded"),
            }),
        ),
        Ok(Err(reload_error)) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReloadResponse {
                status: "degraded",
                records: None,
                detail: reload_error.to_string(),
            }),
        ),
        Err(join_error) => {
            warn!(
                event_name = "system.reload.panicked",
                correlation_id = "reload",
                error = %join_error,
                "dataset reload task failed"
            );
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ReloadResponse {
                    status: "degraded",
                    records: None,
                    detail: "reload task failed".to_string(),
                }),
            )
        }
    }
}

fn dataset_check(catalog: &DatasetCatalog) -> HealthCheck {
    match catalog.status() {
        DatasetStatus::Ready { dataset, source, loaded_at } => HealthCheck {
            status: "ready",
            detail: format!(
                "{} records from {source} loaded at {}",
                dataset.len(),
                loaded_at.to_rfc3339()
            ),
        },
        DatasetStatus::Unavailable { reason } => {
            HealthCheck { status: "degraded", detail: format!("dataset unavailable: {reason}") }
        }
    }
}

fn polling_check(polling: &PollingHealth) -> HealthCheck {
    let snapshot = polling.snapshot();
    let status = if snapshot.state == PollingState::Connected { "ready" } else { "degraded" };
    let detail = match (snapshot.state, snapshot.last_error) {
        (PollingState::Connected, _) => "receiving updates".to_string(),
        (state, Some(error)) => format!(
            "{} after {} consecutive failures: {error}",
            state.as_str(),
            snapshot.consecutive_failures
        ),
        (state, None) => state.as_str().to_string(),
    };
    HealthCheck { status, detail }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        extract::State,
        http::{Request, StatusCode},
        Json,
    };
    use rosterbot_core::{DatasetCatalog, Record, StaticDatasetLoader};
    use rosterbot_telegram::{PollingHealth, TransportError};
    use tower::ServiceExt;

    use crate::health::{health, router, OpsState};

    fn loader() -> Arc<StaticDatasetLoader> {
        Arc::new(StaticDatasetLoader::new(vec![Record {
            building: "A".to_owned(),
            block: "1".to_owned(),
            unit: "12".to_owned(),
            full_name: "Ali Rezaei".to_owned(),
            ..Record::default()
        }]))
    }

    fn connected() -> PollingHealth {
        let polling = PollingHealth::default();
        polling.record_connected();
        polling
    }

    #[tokio::test]
    async fn health_returns_ready_when_dataset_is_loaded() {
        let loader = loader();
        let catalog = Arc::new(DatasetCatalog::load_from(loader.as_ref()));

        let (status, Json(payload)) =
            health(State(OpsState::new(catalog, loader, connected()))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.dataset.status, "ready");
        assert_eq!(payload.polling.status, "ready");
        assert!(payload.dataset.detail.starts_with("1 records"));
    }

    #[tokio::test]
    async fn health_reports_reconnecting_poller_as_degraded() {
        let loader = loader();
        let catalog = Arc::new(DatasetCatalog::load_from(loader.as_ref()));
        let polling = connected();
        polling.record_failure(&TransportError::Receive("connection reset".to_owned()));
        polling.record_failure(&TransportError::Connect("dns failure".to_owned()));

        let (status, Json(payload)) =
            health(State(OpsState::new(catalog, loader, polling))).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.status, "degraded");
        assert_eq!(payload.dataset.status, "ready");
        assert_eq!(payload.polling.status, "degraded");
        assert!(payload.polling.detail.starts_with("reconnecting after 2 consecutive failures"));
    }

    #[tokio::test]
    async fn health_returns_service_unavailable_when_dataset_is_missing() {
        let catalog = Arc::new(DatasetCatalog::unavailable("file missing"));

        let (status, Json(payload)) =
            health(State(OpsState::new(catalog, loader(), connected()))).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.status, "degraded");
        assert_eq!(payload.service.status, "ready");
    }

    #[tokio::test]
    async fn reload_endpoint_restores_an_unavailable_dataset() {
        let catalog = Arc::new(DatasetCatalog::unavailable("not loaded yet"));
        let app = router(OpsState::new(Arc::clone(&catalog), loader(), connected()));
        let request =
            Request::builder().method("POST").uri("/reload").body(Body::empty()).expect("request");

        let response = app.oneshot(request).await.expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), 4096).await.expect("body");
        let payload: serde_json::Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(payload["records"], 1);
        assert!(catalog.snapshot().is_ok());
    }
}
