//! Axum handlers for the identity routes.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::subsystems::identity::IdentifyRequest;
use crate::subsystems::store::ContactStore;

use super::ApiState;

// ── Request types ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct IdentifyBody {
    email: Option<String>,
    phone_number: Option<PhoneField>,
}

/// Clients send the phone number either as a string or as a bare JSON number.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PhoneField {
    Text(String),
    Number(serde_json::Number),
}

impl PhoneField {
    fn into_string(self) -> String {
        match self {
            PhoneField::Text(s) => s,
            PhoneField::Number(n) => n.to_string(),
        }
    }
}

impl From<IdentifyBody> for IdentifyRequest {
    fn from(body: IdentifyBody) -> Self {
        IdentifyRequest::new(body.email, body.phone_number.map(PhoneField::into_string))
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn message(status: StatusCode, msg: impl std::fmt::Display) -> Response {
    (status, Json(json!({ "message": msg.to_string() }))).into_response()
}

// ── Handlers ──────────────────────────────────────────────────────────────────

/// POST /identify
pub(super) async fn identify<S>(
    State(state): State<ApiState<S>>,
    body: Result<Json<IdentifyBody>, JsonRejection>,
) -> Response
where
    S: ContactStore + 'static,
{
    let request: IdentifyRequest = match body {
        Ok(Json(body)) => body.into(),
        Err(rejection) => {
            warn!("identify: rejected body: {rejection}");
            return message(StatusCode::BAD_REQUEST, rejection.body_text());
        }
    };

    let engine = state.engine.clone();
    let outcome = tokio::task::spawn_blocking(move || engine.identify(&request)).await;

    match outcome {
        Ok(Ok(consolidation)) => {
            info!(
                primary = consolidation.contact.primary_contact_id,
                is_new = consolidation.is_new,
                "identify ok"
            );
            (
                StatusCode::OK,
                Json(json!({ "contact": consolidation.contact })),
            )
                .into_response()
        }
        Ok(Err(e)) if e.is_client_error() => {
            warn!("identify: {e}");
            message(StatusCode::BAD_REQUEST, e)
        }
        Ok(Err(e)) => {
            error!("identify failed: {e}");
            message(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
        Err(e) => {
            error!("identify task failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Internal server error" })),
            )
                .into_response()
        }
    }
}

/// GET /health
pub(super) async fn health() -> Response {
    (StatusCode::OK, Json(json!({ "status": "ok" }))).into_response()
}
