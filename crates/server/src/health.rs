use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::pipeline::QuotePipeline;

#[derive(Clone)]
pub struct HealthState {
    pipeline: Arc<QuotePipeline>,
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
    pub logo: HealthCheck,
    pub delivery: HealthCheck,
    pub archive: HealthCheck,
    pub checked_at: String,
}

pub fn router(pipeline: Arc<QuotePipeline>) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { pipeline })
}

/// Ready only when the logo can be read; delivery and archival are informational because
/// either may be deliberately left unconfigured.
pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let logo = logo_check(&state.pipeline).await;
    let ready = logo.status == "ready";

    let delivery = match state.pipeline.delivery_provider() {
        Some(provider) => {
            HealthCheck { status: "configured", detail: format!("sending through {provider}") }
        }
        None => HealthCheck {
            status: "disabled",
            detail: "no delivery credential; quotes are returned as downloads".to_string(),
        },
    };
    let archive = if state.pipeline.archive_enabled() {
        HealthCheck { status: "configured", detail: "uploading rendered quotes".to_string() }
    } else {
        HealthCheck { status: "disabled", detail: "no archive credential".to_string() }
    };

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "quotedesk-server runtime initialized".to_string(),
        },
        logo,
        delivery,
        archive,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn logo_check(pipeline: &QuotePipeline) -> HealthCheck {
    let path = pipeline.logo().path().display().to_string();
    if pipeline.logo().is_readable().await {
        HealthCheck { status: "ready", detail: format!("logo asset {path} is readable") }
    } else {
        HealthCheck { status: "degraded", detail: format!("logo asset {path} cannot be read") }
    }
}
