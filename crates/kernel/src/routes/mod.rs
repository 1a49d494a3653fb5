//! HTTP route handlers.

pub mod contact;
pub mod health;
pub mod locale;
pub mod revalidate;

use axum::Router;
use axum::http::{HeaderValue, Method};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::config::Config;
use crate::state::AppState;

/// Build the full application router.
///
/// Locale negotiation wraps an inner router that is mounted as the fallback
/// service, so the prefix it strips is gone before routing happens.
pub fn router(state: AppState) -> Router {
    let routes = Router::new()
        .merge(revalidate::router())
        .merge(contact::router())
        .merge(locale::router())
        .merge(health::router())
        .fallback(locale::not_found)
        .with_state(state.clone());

    let cors = build_cors_layer(state.config());

    // Middleware layers (last added = first executed in request flow):
    // TraceLayer → CORS → locale negotiation → routes
    Router::new()
        .fallback_service(routes)
        .layer(axum::middleware::from_fn_with_state(
            state,
            crate::middleware::negotiate_locale,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn build_cors_layer(config: &Config) -> CorsLayer {
    let methods = [Method::GET, Method::POST, Method::OPTIONS];

    if config.cors_allowed_origins.len() == 1 && config.cors_allowed_origins[0] == "*" {
        CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods(methods)
            .allow_headers(tower_http::cors::Any)
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_allowed_origins
            .iter()
            .filter_map(|o| match o.parse::<HeaderValue>() {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!(origin = %o, "ignoring unparseable CORS origin");
                    None
                }
            })
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers(tower_http::cors::Any)
    }
}
