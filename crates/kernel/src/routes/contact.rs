//! Contact form endpoint.

use std::net::SocketAddr;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::http::{Extensions, HeaderMap};
use axum::routing::post;
use axum::{Json, Router};

use crate::middleware::{ResolvedLocale, get_client_id};
use crate::services::contact::ContactResult;
use crate::state::AppState;

/// Create the contact form router.
pub fn router() -> Router<AppState> {
    Router::new().route("/api/contact", post(submit_contact))
}

/// Accept a submission.
///
/// Always answers 200; the form reads `success` and shows `message` or
/// `error` in the visitor's language.
async fn submit_contact(
    State(state): State<AppState>,
    headers: HeaderMap,
    extensions: Extensions,
    body: Bytes,
) -> Json<ContactResult> {
    let addr = extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client_id = get_client_id(addr, &headers);

    let locale = match extensions.get::<ResolvedLocale>() {
        Some(ResolvedLocale(locale)) => locale.clone(),
        None => state
            .locale_routing()
            .locales()
            .default_locale()
            .to_string(),
    };

    let outcome = state.contact().submit(&client_id, &body).await;
    Json(outcome.to_result(&locale))
}
