//! Quote form endpoints: submission and reference-number suggestion.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Local;
use quotedesk_core::domain::quote::QuoteRequest;
use quotedesk_core::domain::reference::suggest_reference;
use quotedesk_core::errors::ApplicationError;
use quotedesk_core::recipients::RecipientPlan;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::email::DeliveryReceipt;
use crate::pipeline::{QuotePipeline, SubmissionOutcome};

const SENT_MESSAGE: &str = "Quote generated and sent successfully";

#[derive(Clone)]
pub struct QuotesState {
    pipeline: Arc<QuotePipeline>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SentResponse {
    pub success: bool,
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: &'static str,
    pub details: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipients: Option<RecipientPlan>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceQuery {
    #[serde(default)]
    pub client_name: String,
}

pub fn router(pipeline: Arc<QuotePipeline>) -> Router {
    Router::new()
        .route("/generate-quote", post(generate_quote))
        .route("/api/reference-number", get(reference_number))
        .with_state(QuotesState { pipeline })
}

async fn generate_quote(
    State(state): State<QuotesState>,
    payload: Result<Json<QuoteRequest>, JsonRejection>,
) -> Response {
    let correlation_id = Uuid::new_v4().to_string();

    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            warn!(
                event_name = "quote.request.malformed",
                correlation_id = %correlation_id,
                quote_id = "unknown",
                error = %rejection.body_text(),
                "quote request body could not be parsed"
            );
            let body = ErrorResponse {
                error: "Invalid quote request",
                details: rejection.body_text(),
                field: None,
                correlation_id: Some(correlation_id),
                provider: None,
                recipients: None,
            };
            return (StatusCode::BAD_REQUEST, Json(body)).into_response();
        }
    };

    let report = state.pipeline.process(request, &correlation_id).await;
    match report.result {
        Ok(SubmissionOutcome::Delivered { receipt, .. }) => {
            let (email_status_code, email_id) = match receipt {
                DeliveryReceipt::StatusCode(code) => (Some(code), None),
                DeliveryReceipt::MessageId(id) => (None, Some(id)),
            };
            let body =
                SentResponse { success: true, message: SENT_MESSAGE, email_status_code, email_id };
            (StatusCode::OK, Json(body)).into_response()
        }
        Ok(SubmissionOutcome::Download { filename, pdf }) => {
            info!(
                event_name = "quote.download.returned",
                correlation_id = %correlation_id,
                filename = %filename,
                bytes = pdf.as_bytes().len(),
                "returning quote pdf to the caller"
            );
            let headers = [
                (header::CONTENT_TYPE, "application/pdf".to_string()),
                (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{filename}\"")),
            ];
            (StatusCode::OK, headers, pdf.into_bytes()).into_response()
        }
        Err(application_error) => error_response(application_error, correlation_id),
    }
}

fn error_response(application_error: ApplicationError, correlation_id: String) -> Response {
    let summary = application_error.user_message();
    if application_error.is_client_error() {
        let field = match &application_error {
            ApplicationError::Validation(validation) => Some(validation.field().to_string()),
            _ => None,
        };
        let body = ErrorResponse {
            error: summary,
            details: application_error.to_string(),
            field,
            correlation_id: Some(correlation_id),
            provider: None,
            recipients: None,
        };
        return (StatusCode::BAD_REQUEST, Json(body)).into_response();
    }

    let body = match application_error {
        ApplicationError::Delivery { provider, message, recipients } => ErrorResponse {
            error: summary,
            details: message,
            field: None,
            correlation_id: Some(correlation_id),
            provider: Some(provider),
            recipients: Some(recipients),
        },
        other => {
            error!(
                event_name = "quote.request.failed",
                correlation_id = %correlation_id,
                error = %other,
                "quote request failed"
            );
            let details = match other {
                ApplicationError::Render(details) => details,
                other => other.to_string(),
            };
            ErrorResponse {
                error: summary,
                details,
                field: None,
                correlation_id: Some(correlation_id),
                provider: None,
                recipients: None,
            }
        }
    };
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}

async fn reference_number(Query(query): Query<ReferenceQuery>) -> Response {
    match suggest_reference(&query.client_name, Local::now().date_naive()) {
        Some(suggestion) => (StatusCode::OK, Json(suggestion)).into_response(),
        None => {
            let body = ErrorResponse {
                error: "Client name is required",
                details: "clientName must contain at least one non-space character".to_string(),
                field: Some("clientName".to_string()),
                correlation_id: None,
                provider: None,
                recipients: None,
            };
            (StatusCode::BAD_REQUEST, Json(body)).into_response()
        }
    }
}
