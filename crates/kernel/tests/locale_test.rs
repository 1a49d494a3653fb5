#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Locale negotiation tests.
//!
//! Pages are not rendered by the kernel, so unrouted paths land on the JSON
//! fallback, which reports the path after prefix stripping and the locale
//! the middleware resolved.

mod common;

use axum::http::StatusCode;
use isbim_kernel::Config;
use isbim_kernel::config::LocalePrefix;
use isbim_test_utils::assert;

use common::{TestApp, body_json, location, set_cookies};

fn with_prefix(prefix: LocalePrefix) -> Config {
    Config {
        locale_prefix: prefix,
        ..Config::default()
    }
}

#[tokio::test]
async fn unprefixed_page_without_hints_uses_base_locale() {
    let app = TestApp::new();

    let response = app.get("/about", &[]).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(set_cookies(&response).is_empty());
    let json = body_json(response).await;
    assert::str_field(&json, "path", "/about");
    assert::str_field(&json, "locale", "en");
}

#[tokio::test]
async fn prefixed_page_is_rewritten_and_sets_cookie() {
    let app = TestApp::new();

    let response = app.get("/zh/about?ref=nav", &[]).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let cookies = set_cookies(&response);
    assert_eq!(cookies.len(), 1);
    assert::contains(&cookies[0], "site_locale=zh");
    assert::contains(&cookies[0], "Path=/");
    assert::contains(&cookies[0], "SameSite=Lax");

    let json = body_json(response).await;
    assert::str_field(&json, "path", "/about");
    assert::str_field(&json, "locale", "zh");
}

#[tokio::test]
async fn bare_prefix_maps_to_root() {
    let app = TestApp::new();

    let response = app.get("/zh", &[]).await;

    let json = body_json(response).await;
    assert::str_field(&json, "path", "/");
    assert::str_field(&json, "locale", "zh");
}

#[tokio::test]
async fn matching_cookie_is_not_rewritten() {
    let app = TestApp::new();

    let response = app.get("/zh/about", &[("cookie", "site_locale=zh")]).await;

    assert!(set_cookies(&response).is_empty());
}

#[tokio::test]
async fn url_prefix_beats_cookie() {
    let app = TestApp::new();

    let response = app
        .get("/zh/about", &[("cookie", "theme=dark; site_locale=en")])
        .await;

    let cookies = set_cookies(&response);
    assert_eq!(cookies.len(), 1);
    assert::contains(&cookies[0], "site_locale=zh");
    let json = body_json(response).await;
    assert::str_field(&json, "locale", "zh");
}

#[tokio::test]
async fn base_locale_prefix_redirects_to_canonical_url() {
    let app = TestApp::new();

    let response = app.get("/en/about?ref=nav", &[]).await;

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), "/about?ref=nav");
}

#[tokio::test]
async fn base_prefix_redirect_stays_on_site() {
    let app = TestApp::new();

    for path in ["/en//evil.example/phish", "/en///evil.example/x", "/en/%2F"] {
        let response = app.get(path, &[]).await;
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT, "{path}");
        let target = location(&response);
        assert!(target.starts_with('/'), "{path} -> {target}");
        assert!(!target.starts_with("//"), "{path} -> {target}");
    }

    let response = app.get("/en//evil.example/phish", &[]).await;
    assert_eq!(location(&response), "/evil.example/phish");
}

#[tokio::test]
async fn rewritten_path_has_no_leading_double_slash() {
    let app = TestApp::new();

    let response = app.get("/zh//evil.example/x", &[]).await;

    let json = body_json(response).await;
    assert::str_field(&json, "path", "/evil.example/x");
    assert::str_field(&json, "locale", "zh");
}

#[tokio::test]
async fn accept_language_redirects_to_prefixed_page() {
    let app = TestApp::new();

    let response = app
        .get("/about", &[("accept-language", "zh-HK,zh;q=0.9,en;q=0.8")])
        .await;

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), "/zh/about");
}

#[tokio::test]
async fn root_redirect_has_no_trailing_slash() {
    let app = TestApp::new();

    let response = app.get("/", &[("accept-language", "zh")]).await;

    assert_eq!(location(&response), "/zh");
}

#[tokio::test]
async fn cookie_beats_accept_language() {
    let app = TestApp::new();

    let response = app
        .get(
            "/about",
            &[("cookie", "site_locale=en"), ("accept-language", "zh")],
        )
        .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert::str_field(&json, "locale", "en");
}

#[tokio::test]
async fn cookie_alone_redirects() {
    let app = TestApp::new();

    let response = app.get("/contact", &[("cookie", "site_locale=zh")]).await;

    assert_eq!(location(&response), "/zh/contact");
}

#[tokio::test]
async fn unknown_cookie_and_language_fall_back_to_base() {
    let app = TestApp::new();

    let response = app
        .get(
            "/about",
            &[("cookie", "site_locale=fr"), ("accept-language", "fr-FR, de;q=0.5")],
        )
        .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert::str_field(&json, "locale", "en");
}

#[tokio::test]
async fn locale_lookalike_segment_is_not_a_prefix() {
    let app = TestApp::new();

    let response = app.get("/enterprise", &[]).await;

    let json = body_json(response).await;
    assert::str_field(&json, "path", "/enterprise");
}

#[tokio::test]
async fn always_strategy_prefixes_base_locale() {
    let app = TestApp::with_config(with_prefix(LocalePrefix::Always));

    let response = app.get("/about", &[]).await;
    assert_eq!(location(&response), "/en/about");

    let response = app.get("/en/about", &[]).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert::str_field(&json, "path", "/about");
    assert::str_field(&json, "locale", "en");
}

#[tokio::test]
async fn never_strategy_does_not_redirect() {
    let app = TestApp::with_config(with_prefix(LocalePrefix::Never));

    let response = app.get("/about", &[("accept-language", "zh")]).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert::str_field(&json, "path", "/about");
    assert::str_field(&json, "locale", "zh");
}

#[tokio::test]
async fn static_assets_are_never_redirected() {
    let app = TestApp::new();

    for path in ["/logo.png", "/static/site.css", "/_next/chunk"] {
        let response = app.get(path, &[("accept-language", "zh")]).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{path}");
        let json = body_json(response).await;
        assert::str_field(&json, "path", path);
        assert::str_field(&json, "locale", "zh");
    }
}

#[tokio::test]
async fn locale_context_reports_negotiated_locale_and_url() {
    let app = TestApp::new();

    let response = app
        .get(
            "/api/locale?x=1",
            &[("host", "www.isbim.com.hk"), ("accept-language", "zh-TW")],
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert::str_field(&json, "locale", "zh");
    assert::str_field(&json, "url", "http://www.isbim.com.hk/api/locale?x=1");
    assert::str_field(&json, "defaultLocale", "en");
    assert_eq!(json["locales"], serde_json::json!(["en", "zh"]));
}

#[tokio::test]
async fn forwarded_headers_shape_the_url() {
    let app = TestApp::new();

    let response = app
        .get(
            "/api/locale",
            &[
                ("host", "internal:8080"),
                ("x-forwarded-host", "www.isbim.com.hk"),
                ("x-forwarded-proto", "https"),
            ],
        )
        .await;

    let json = body_json(response).await;
    assert::str_field(&json, "url", "https://www.isbim.com.hk/api/locale");
}

#[tokio::test]
async fn missing_host_falls_back_to_site_url() {
    let app = TestApp::new();

    let response = app.get("/api/locale", &[]).await;

    let json = body_json(response).await;
    assert::str_field(&json, "url", "http://localhost:3000/api/locale");
}

#[tokio::test]
async fn client_supplied_locale_headers_are_overwritten() {
    let app = TestApp::new();

    let response = app
        .get(
            "/api/locale",
            &[
                ("x-locale", "zh"),
                ("x-url", "https://evil.example/"),
                ("host", "www.isbim.com.hk"),
            ],
        )
        .await;

    let json = body_json(response).await;
    assert::str_field(&json, "locale", "en");
    assert::str_field(&json, "url", "http://www.isbim.com.hk/api/locale");
}

#[tokio::test]
async fn api_paths_never_set_the_locale_cookie() {
    let app = TestApp::new();

    let response = app.get("/api/locale", &[("accept-language", "zh")]).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookies(&response).is_empty());
}
