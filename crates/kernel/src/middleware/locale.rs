//! Locale negotiation middleware.
//!
//! Resolves exactly one locale for each request using a chain of
//! negotiators. Resolution order: URL prefix → locale cookie →
//! Accept-Language → base locale. Resolution never fails.
//!
//! The resolved locale and the fully-qualified request URL are handed to the
//! rendering layer as request headers (`x-locale`, `x-url`) and the locale
//! also as a [`ResolvedLocale`] extension. Client-supplied copies of those
//! headers are always discarded.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderValue, Request, Uri, header},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use cookie::{Cookie, SameSite};
use url::Url;

use crate::config::{Config, LocalePrefix};
use crate::state::AppState;

/// Request header carrying the resolved locale tag.
pub const LOCALE_HEADER: &str = "x-locale";

/// Request header carrying the fully-qualified request URL.
pub const URL_HEADER: &str = "x-url";

/// Locale cookie lifetime (one year).
const COOKIE_MAX_AGE_DAYS: i64 = 365;

/// The resolved locale for the current request.
///
/// Stored in request extensions for per-request access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLocale(pub String);

/// The fixed set of supported locales plus the base locale.
#[derive(Debug, Clone)]
pub struct LocaleSet {
    known: Vec<String>,
    /// Lowercased tag → canonical tag.
    folded: HashMap<String, String>,
    default: String,
}

impl LocaleSet {
    /// Build a locale set. The base locale is added if missing from `known`.
    pub fn new(known: Vec<String>, default: String) -> Self {
        let mut known = known;
        if !known.contains(&default) {
            known.push(default.clone());
        }
        let folded = known.iter().map(|k| (k.to_lowercase(), k.clone())).collect();
        Self {
            known,
            folded,
            default,
        }
    }

    /// Base locale.
    pub fn default_locale(&self) -> &str {
        &self.default
    }

    /// Exact, case-sensitive membership.
    pub fn contains(&self, tag: &str) -> bool {
        self.known.iter().any(|k| k == tag)
    }

    /// Case-insensitive lookup returning the canonical tag.
    pub fn canonical(&self, tag: &str) -> Option<&str> {
        self.folded.get(&tag.to_lowercase()).map(String::as_str)
    }
}

/// Trait for locale negotiation strategies.
///
/// Implementations inspect the request and return a locale tag if they can
/// determine the desired locale. The middleware chains negotiators by
/// priority (highest first) and uses the first match.
pub trait LocaleNegotiator: Send + Sync {
    /// Attempt to negotiate a locale from the request.
    fn negotiate(&self, request: &Request<Body>) -> Option<String>;

    /// Priority of this negotiator (higher = checked first).
    fn priority(&self) -> i32;
}

/// Extracts the locale from a URL prefix (e.g., `/zh/about` → "zh", "/about").
///
/// Only matches exact, case-sensitive locale tags followed by `/` or
/// end-of-path, preventing false matches like `/enterprise`.
pub struct UrlPrefixNegotiator {
    locales: Arc<LocaleSet>,
}

impl UrlPrefixNegotiator {
    pub fn new(locales: Arc<LocaleSet>) -> Self {
        Self { locales }
    }

    /// Extract the locale tag from a URL prefix.
    ///
    /// Returns `Some((locale, remaining_path))` if the first path segment is
    /// a known locale.
    pub fn extract_prefix<'a>(&self, path: &'a str) -> Option<(&'a str, &'a str)> {
        let trimmed = path.strip_prefix('/')?;

        let (candidate, rest) = match trimmed.find('/') {
            Some(pos) => (&trimmed[..pos], &trimmed[pos..]),
            None => (trimmed, ""),
        };

        if !self.locales.contains(candidate) {
            return None;
        }

        if rest.is_empty() {
            // Bare prefix like "/zh" → locale "zh", path "/"
            Some((candidate, "/"))
        } else {
            Some((candidate, rest))
        }
    }
}

/// Negotiates the locale from a cookie set on a prior visit.
pub struct CookieNegotiator {
    cookie_name: String,
    locales: Arc<LocaleSet>,
}

impl CookieNegotiator {
    pub fn new(cookie_name: impl Into<String>, locales: Arc<LocaleSet>) -> Self {
        Self {
            cookie_name: cookie_name.into(),
            locales,
        }
    }

    /// Raw cookie value, if the request carries the locale cookie.
    fn cookie_value(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(Cookie::split_parse)
            .filter_map(Result::ok)
            .find(|c| c.name() == self.cookie_name)
            .map(|c| c.value().to_string())
    }
}

impl LocaleNegotiator for CookieNegotiator {
    fn negotiate(&self, request: &Request<Body>) -> Option<String> {
        let value = self.cookie_value(request.headers())?;
        self.locales.canonical(value.trim()).map(str::to_string)
    }

    fn priority(&self) -> i32 {
        75
    }
}

/// Negotiates the locale from the Accept-Language HTTP header.
///
/// Parses quality values and returns the highest-quality tag that matches a
/// known locale, either exactly or by its primary subtag.
pub struct AcceptLanguageNegotiator {
    locales: Arc<LocaleSet>,
}

impl AcceptLanguageNegotiator {
    pub fn new(locales: Arc<LocaleSet>) -> Self {
        Self { locales }
    }

    /// Parse Accept-Language header value into (tag, quality) pairs,
    /// sorted by quality descending (stable sort preserves original order
    /// for ties). Entries with `q=0` mean "not acceptable" and are dropped.
    fn parse_accept_language(header: &str) -> Vec<(String, f32)> {
        let mut langs: Vec<(String, f32)> = header
            .split(',')
            .filter_map(|part| {
                let part = part.trim();
                if part.is_empty() {
                    return None;
                }

                let mut segments = part.split(';');
                let lang = segments.next()?.trim().to_lowercase();
                if lang.is_empty() {
                    return None;
                }

                let quality = segments
                    .find_map(|s| {
                        let s = s.trim();
                        s.strip_prefix("q=")
                            .and_then(|q| q.trim().parse::<f32>().ok())
                    })
                    .unwrap_or(1.0);
                // RFC 9110 §12.4.2: quality values are 0.000–1.000
                let quality = if quality.is_nan() { 0.0 } else { quality.clamp(0.0, 1.0) };

                (quality > 0.0).then_some((lang, quality))
            })
            .collect();

        langs.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        langs
    }
}

impl LocaleNegotiator for AcceptLanguageNegotiator {
    fn negotiate(&self, request: &Request<Body>) -> Option<String> {
        let header = request
            .headers()
            .get(header::ACCEPT_LANGUAGE)?
            .to_str()
            .ok()?;

        for (lang, _quality) in Self::parse_accept_language(header) {
            if lang == "*" {
                continue;
            }
            if let Some(tag) = self.locales.canonical(&lang) {
                return Some(tag.to_string());
            }
            // Primary subtag (e.g., "zh-hk" → "zh")
            if let Some(primary) = lang.split('-').next()
                && let Some(tag) = self.locales.canonical(primary)
            {
                return Some(tag.to_string());
            }
        }

        None
    }

    fn priority(&self) -> i32 {
        50
    }
}

/// Everything the middleware needs, built once at startup.
pub struct LocaleRouting {
    locales: Arc<LocaleSet>,
    url_prefix: UrlPrefixNegotiator,
    cookie: Arc<CookieNegotiator>,
    /// Sorted by priority, highest first.
    negotiators: Vec<Arc<dyn LocaleNegotiator>>,
    prefix: LocalePrefix,
    cookie_name: String,
    site_url: Url,
}

impl LocaleRouting {
    /// Build the negotiator chain from configuration.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let locales = Arc::new(LocaleSet::new(
            config.locales.clone(),
            config.default_locale.clone(),
        ));
        let site_url = Url::parse(&config.site_url)?;

        let cookie = Arc::new(CookieNegotiator::new(
            config.locale_cookie.clone(),
            locales.clone(),
        ));
        let mut negotiators: Vec<Arc<dyn LocaleNegotiator>> = vec![
            cookie.clone(),
            Arc::new(AcceptLanguageNegotiator::new(locales.clone())),
        ];
        negotiators.sort_by_key(|n| std::cmp::Reverse(n.priority()));

        Ok(Self {
            url_prefix: UrlPrefixNegotiator::new(locales.clone()),
            locales,
            cookie,
            negotiators,
            prefix: config.locale_prefix,
            cookie_name: config.locale_cookie.clone(),
            site_url,
        })
    }

    pub fn locales(&self) -> &LocaleSet {
        &self.locales
    }
}

/// Middleware to negotiate the active locale for each request.
///
/// 1. Drop client-supplied `x-locale` / `x-url`.
/// 2. System paths (API, static assets, health) get a locale from cookie /
///    Accept-Language / base and are never redirected or rewritten.
/// 3. A URL prefix wins and is stripped before routing; the locale cookie is
///    refreshed when it disagrees.
/// 4. Unprefixed pages negotiate the locale and may be redirected to their
///    canonical prefixed form, depending on the prefix strategy.
pub async fn negotiate_locale(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let routing = state.locale_routing();

    request.headers_mut().remove(LOCALE_HEADER);
    request.headers_mut().remove(URL_HEADER);

    let full_url = request_url(&request, &routing.site_url);
    let path = request.uri().path().to_string();

    if is_system_path(&path) {
        let locale = select_locale(&routing.locales, &routing.negotiators, &request);
        return forward(request, next, locale, &full_url, None, &routing.cookie_name).await;
    }

    if let Some((locale, rest)) = routing.url_prefix.extract_prefix(&path) {
        let locale = locale.to_string();
        let rest = same_origin_path(rest);
        let cookie_locale = routing.cookie.negotiate(&request);
        let refresh_cookie = (cookie_locale.as_deref() != Some(locale.as_str())).then_some(locale.as_str());

        if routing.prefix == LocalePrefix::AsNeeded && locale == routing.locales.default_locale() {
            let target = with_query(&rest, request.uri().query());
            tracing::debug!(from = %path, to = %target, "redirecting base-locale prefix to canonical URL");
            return redirect(&target, refresh_cookie, &routing.cookie_name);
        }

        match rewrite_uri_path(request.uri(), &rest) {
            Ok(new_uri) => {
                tracing::debug!(
                    original = %request.uri(),
                    new_uri = %new_uri,
                    locale = %locale,
                    "stripped locale prefix from URI"
                );
                *request.uri_mut() = new_uri;
            }
            Err(e) => {
                tracing::warn!(error = %e, path = %path, "failed to strip locale prefix");
            }
        }

        let refresh_cookie = refresh_cookie.map(str::to_string);
        return forward(
            request,
            next,
            locale,
            &full_url,
            refresh_cookie.as_deref(),
            &routing.cookie_name,
        )
        .await;
    }

    let locale = select_locale(&routing.locales, &routing.negotiators, &request);

    let needs_prefix = match routing.prefix {
        LocalePrefix::Always => true,
        LocalePrefix::AsNeeded => locale != routing.locales.default_locale(),
        LocalePrefix::Never => false,
    };

    if needs_prefix {
        let prefixed = if path == "/" {
            format!("/{locale}")
        } else {
            format!("/{locale}{path}")
        };
        let target = with_query(&prefixed, request.uri().query());
        tracing::debug!(from = %path, to = %target, "redirecting to locale-prefixed URL");
        return redirect(&target, None, &routing.cookie_name);
    }

    forward(request, next, locale, &full_url, None, &routing.cookie_name).await
}

/// Select the active locale from negotiators (sync, testable).
///
/// Negotiator results are validated against the locale set; the base locale
/// is the final fallback.
fn select_locale(
    locales: &LocaleSet,
    negotiators: &[Arc<dyn LocaleNegotiator>],
    request: &Request<Body>,
) -> String {
    for negotiator in negotiators {
        if let Some(locale) = negotiator.negotiate(request) {
            if locales.contains(&locale) {
                return locale;
            }
            tracing::warn!(
                negotiator_locale = %locale,
                "negotiator returned unknown locale, ignoring"
            );
        }
    }

    locales.default_locale().to_string()
}

/// Attach locale headers and extension, run the rest of the stack, and set
/// the locale cookie on the way out when asked to.
async fn forward(
    mut request: Request<Body>,
    next: Next,
    locale: String,
    full_url: &str,
    set_cookie: Option<&str>,
    cookie_name: &str,
) -> Response {
    match HeaderValue::from_str(&locale) {
        Ok(v) => {
            request.headers_mut().insert(LOCALE_HEADER, v);
        }
        Err(e) => tracing::warn!(error = %e, locale = %locale, "locale is not a valid header value"),
    }
    match HeaderValue::from_str(full_url) {
        Ok(v) => {
            request.headers_mut().insert(URL_HEADER, v);
        }
        Err(e) => tracing::warn!(error = %e, "request URL is not a valid header value"),
    }
    request.extensions_mut().insert(ResolvedLocale(locale));

    let mut response = next.run(request).await;
    if let Some(locale) = set_cookie {
        append_locale_cookie(response.headers_mut(), cookie_name, locale);
    }
    response
}

fn redirect(target: &str, set_cookie: Option<&str>, cookie_name: &str) -> Response {
    let mut response = Redirect::temporary(target).into_response();
    if let Some(locale) = set_cookie {
        append_locale_cookie(response.headers_mut(), cookie_name, locale);
    }
    response
}

fn append_locale_cookie(headers: &mut HeaderMap, cookie_name: &str, locale: &str) {
    let cookie = Cookie::build((cookie_name.to_string(), locale.to_string()))
        .path("/")
        .max_age(cookie::time::Duration::days(COOKIE_MAX_AGE_DAYS))
        .same_site(SameSite::Lax)
        .build();

    match HeaderValue::from_str(&cookie.to_string()) {
        Ok(v) => {
            headers.append(header::SET_COOKIE, v);
        }
        Err(e) => tracing::warn!(error = %e, "failed to encode locale cookie"),
    }
}

/// Paths that are never redirected or rewritten.
fn is_system_path(path: &str) -> bool {
    path.starts_with("/api/")
        || path == "/api"
        || path.starts_with("/static/")
        || path.starts_with("/_next/")
        || path == "/health"
        || path.rsplit('/').next().is_some_and(|segment| segment.contains('.'))
}

/// Reconstruct the absolute URL the client requested.
///
/// Origin comes from forwarding headers or `Host`, falling back to the
/// configured site URL. The path is set verbatim so a `//host` path cannot
/// change the origin.
fn request_url(request: &Request<Body>, site_url: &Url) -> String {
    let headers = request.headers();
    let header_str = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    let host = header_str("x-forwarded-host").or_else(|| header_str(header::HOST.as_str()));
    let proto = header_str("x-forwarded-proto").unwrap_or(site_url.scheme());

    let mut url = host
        .and_then(|h| Url::parse(&format!("{proto}://{h}")).ok())
        .unwrap_or_else(|| site_url.clone());
    url.set_path(request.uri().path());
    url.set_query(request.uri().query());
    url.into()
}

/// Collapse leading slashes and backslashes to a single `/`.
///
/// Browsers read `//host` and `/\host` in a `Location` header as another
/// origin, so a stripped remainder like `//evil.example` must not reach a
/// redirect or the rewritten URI as-is.
fn same_origin_path(path: &str) -> String {
    format!("/{}", path.trim_start_matches(['/', '\\']))
}

fn with_query(path: &str, query: Option<&str>) -> String {
    match query {
        Some(q) => format!("{path}?{q}"),
        None => path.to_string(),
    }
}

/// Rewrite a URI to a new path while preserving query string.
fn rewrite_uri_path(original: &Uri, new_path: &str) -> Result<Uri, axum::http::uri::InvalidUri> {
    with_query(new_path, original.query()).parse()
}
