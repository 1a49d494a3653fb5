//! Content webhook endpoint.
//!
//! The CMS posts here after a publish; we verify the signature, map the
//! document to cache tags and invalidate them.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::services::revalidate::WebhookPayload;
use crate::services::signature::SIGNATURE_HEADER;
use crate::state::AppState;

#[derive(Debug, Serialize)]
struct RevalidateResponse {
    revalidated: bool,
    now: i64,
}

#[derive(Debug, Serialize)]
struct ReadyResponse {
    status: &'static str,
    message: &'static str,
    timestamp: i64,
}

/// Create the revalidation router.
pub fn router() -> Router<AppState> {
    Router::new().route("/api/revalidate", post(revalidate).get(ready))
}

/// Handle a signed webhook delivery.
async fn revalidate(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<RevalidateResponse>> {
    // A header that is present but not valid UTF-8 must not read as "absent".
    let signature = headers
        .get(SIGNATURE_HEADER)
        .map(|value| value.to_str().unwrap_or_default());

    if let Err(e) = state.revalidate().verify(&body, signature) {
        warn!(reason = %e, "rejected webhook delivery");
        return Err(AppError::InvalidSignature);
    }

    let payload: WebhookPayload = serde_json::from_slice(&body)?;
    let outcome = state.revalidate().revalidate(&payload).await?;

    info!(
        content_type = payload.content_type().unwrap_or("-"),
        tags = outcome.tags.len(),
        "webhook processed"
    );

    Ok(Json(RevalidateResponse {
        revalidated: true,
        now: chrono::Utc::now().timestamp_millis(),
    }))
}

/// Readiness probe for the webhook endpoint.
async fn ready() -> Json<ReadyResponse> {
    Json(ReadyResponse {
        status: "ok",
        message: "Revalidation endpoint is ready",
        timestamp: chrono::Utc::now().timestamp_millis(),
    })
}
