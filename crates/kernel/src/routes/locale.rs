//! Locale context for client code, and the page fallback.
//!
//! Both handlers read what the negotiation middleware attached to the
//! request; neither performs negotiation itself.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::middleware::{LOCALE_HEADER, URL_HEADER};
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LocaleContext {
    locale: String,
    url: Option<String>,
    default_locale: String,
    locales: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct NotFound {
    error: &'static str,
    path: String,
    locale: Option<String>,
}

/// Create the locale context router.
pub fn router() -> Router<AppState> {
    Router::new().route("/api/locale", get(locale_context))
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn locale_context(State(state): State<AppState>, headers: HeaderMap) -> Json<LocaleContext> {
    let locales = state.locale_routing().locales();
    let default_locale = locales.default_locale().to_string();

    Json(LocaleContext {
        locale: header_str(&headers, LOCALE_HEADER).unwrap_or_else(|| default_locale.clone()),
        url: header_str(&headers, URL_HEADER),
        default_locale,
        locales: state.config().locales.clone(),
    })
}

/// Fallback for paths no route claims.
///
/// Page rendering lives elsewhere; this reports the path after prefix
/// stripping together with the negotiated locale.
pub async fn not_found(uri: Uri, headers: HeaderMap) -> (StatusCode, Json<NotFound>) {
    (
        StatusCode::NOT_FOUND,
        Json(NotFound {
            error: "Not found",
            path: uri.path().to_string(),
            locale: header_str(&headers, LOCALE_HEADER),
        }),
    )
}
