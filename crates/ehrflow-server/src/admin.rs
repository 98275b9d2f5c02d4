//! Admin and inbound HTTP handlers.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};
use tracing::{error, info};

use ehrflow_inbound::InboundDisposition;
use ehrflow_tasks::TaskDefinition;

use crate::server::AppState;

fn operation_outcome(code: &str, issue_type: &str, diagnostics: &str) -> Json<Value> {
    Json(json!({
        "resourceType": "OperationOutcome",
        "issue": [{
            "severity": "error",
            "code": issue_type,
            "details": {
                "coding": [{
                    "system": "https://fhir.nhs.uk/STU3/ValueSet/Spine-ErrorOrWarningCode-1",
                    "code": code
                }]
            },
            "diagnostics": diagnostics
        }]
    }))
}

fn internal_error(err: impl std::fmt::Display) -> Response {
    error!(error = %err, "admin request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        operation_outcome("INTERNAL_SERVER_ERROR", "exception", "An internal error occurred"),
    )
        .into_response()
}

/// `POST /resend/{conversation_id}` — restart a failed transfer.
pub async fn resend(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> Response {
    let conversation = match state.store.get(&conversation_id).await {
        Ok(conversation) => conversation,
        Err(err) => return internal_error(err),
    };

    let Some(conversation) = conversation else {
        return (
            StatusCode::NOT_FOUND,
            operation_outcome(
                "INVALID_IDENTIFIER_VALUE",
                "value",
                "Provide a conversationId that exists and retry the operation",
            ),
        )
            .into_response();
    };

    if !conversation.is_resendable() {
        // Not resendable is either a transfer that already completed (a
        // positive acknowledgement landed) or one that is still running.
        let diagnostics = if conversation.is_terminal() {
            "The transfer completed successfully and cannot be resent"
        } else {
            "The transfer is still in progress and cannot be resent"
        };
        return (
            StatusCode::FORBIDDEN,
            operation_outcome("PRECONDITION_FAILED", "business-rule", diagnostics),
        )
            .into_response();
    }

    if let Err(err) = state.store.reset_for_resend(&conversation_id).await {
        return internal_error(err);
    }
    let fetch =
        TaskDefinition::structured_record_fetch(&conversation_id, &conversation.request);
    if let Err(err) = state.dispatcher.dispatch(&fetch).await {
        return internal_error(err);
    }

    info!(conversation_id = %conversation_id, "resend accepted");
    StatusCode::ACCEPTED.into_response()
}

/// `POST /inbound` — entry point for the messaging layer's delivery hook.
pub async fn inbound(State(state): State<AppState>, body: String) -> Response {
    match state.inbound.process(&body).await {
        InboundDisposition::Acknowledge => StatusCode::ACCEPTED.into_response(),
        InboundDisposition::Reject => (
            StatusCode::UNPROCESSABLE_ENTITY,
            operation_outcome(
                "INVALID_REQUEST_MESSAGE",
                "invalid",
                "The inbound message could not be read",
            ),
        )
            .into_response(),
    }
}

/// `GET /healthcheck`
pub async fn healthcheck() -> Json<Value> {
    Json(json!({"status": "UP"}))
}
