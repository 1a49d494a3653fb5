//! Configuration loaded from environment variables.

use std::env;
use std::str::FromStr;

use anyhow::{Context, Result, bail};

/// Content types whose changes also bust aggregate/listing caches.
const DEFAULT_CRITICAL_TYPES: &[&str] = &["post", "news", "career", "product", "imageAsset"];

/// How locale prefixes appear in page URLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LocalePrefix {
    /// Base locale is unprefixed; every other locale carries its prefix.
    #[default]
    AsNeeded,
    /// Every page URL carries a locale prefix.
    Always,
    /// Prefixes are honoured when present but never enforced.
    Never,
}

impl FromStr for LocalePrefix {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "as-needed" | "as_needed" => Ok(Self::AsNeeded),
            "always" => Ok(Self::Always),
            "never" => Ok(Self::Never),
            other => bail!("unknown locale prefix strategy: {other}"),
        }
    }
}

/// Where contact-form submission counts are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RateLimitBackend {
    /// Process-local sliding log. Single instance only.
    #[default]
    Memory,
    /// Fixed-window counter in Redis, shared by every instance.
    Redis,
}

impl FromStr for RateLimitBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "redis" => Ok(Self::Redis),
            other => bail!("unknown rate limit backend: {other}"),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port (default: 3000).
    pub port: u16,

    /// Public site URL, used for absolute links and as the origin fallback
    /// when a request carries no Host header.
    pub site_url: String,

    /// Redis connection URL. When None, tag invalidation is a no-op.
    pub redis_url: Option<String>,

    /// Shared secret for webhook signatures. When None, signature
    /// verification is skipped entirely.
    pub webhook_secret: Option<String>,

    /// Reject unsigned webhooks when a secret is configured (default: false).
    pub require_signature: bool,

    /// Content types that also invalidate the catch-all tag.
    pub critical_types: Vec<String>,

    /// Namespace for derived cache tags (default: "source").
    pub cache_tag_prefix: String,

    /// Supported locale tags, in preference order.
    pub locales: Vec<String>,

    /// Base locale used whenever nothing else resolves.
    pub default_locale: String,

    /// URL prefix strategy (default: as-needed).
    pub locale_prefix: LocalePrefix,

    /// Name of the cookie remembering the visitor's locale.
    pub locale_cookie: String,

    /// Contact submissions allowed per window (default: 3).
    pub contact_rate_limit_max: u32,

    /// Contact rate-limit window in seconds (default: 300).
    pub contact_rate_limit_window_secs: u64,

    /// Contact rate-limit storage (default: memory).
    pub rate_limit_backend: RateLimitBackend,

    /// SMTP host for email delivery. When None, email is disabled.
    pub smtp_host: Option<String>,

    /// SMTP port (default: 587).
    pub smtp_port: u16,

    /// SMTP username for authentication.
    pub smtp_username: Option<String>,

    /// SMTP password for authentication.
    pub smtp_password: Option<String>,

    /// SMTP encryption mode: "starttls" (default), "tls", or "none".
    pub smtp_encryption: String,

    /// From address for outgoing email.
    pub smtp_from_email: String,

    /// Recipient of contact-form submissions.
    pub contact_to_email: String,

    /// CORS allowed origins (comma-separated, default: "*").
    pub cors_allowed_origins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            site_url: "http://localhost:3000".to_string(),
            redis_url: None,
            webhook_secret: None,
            require_signature: false,
            critical_types: DEFAULT_CRITICAL_TYPES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            cache_tag_prefix: "source".to_string(),
            locales: vec!["en".to_string(), "zh".to_string()],
            default_locale: "en".to_string(),
            locale_prefix: LocalePrefix::AsNeeded,
            locale_cookie: "site_locale".to_string(),
            contact_rate_limit_max: 3,
            contact_rate_limit_window_secs: 300,
            rate_limit_backend: RateLimitBackend::Memory,
            smtp_host: None,
            smtp_port: 587,
            smtp_username: None,
            smtp_password: None,
            smtp_encryption: "starttls".to_string(),
            smtp_from_email: "noreply@localhost".to_string(),
            contact_to_email: "info@isbim.com.hk".to_string(),
            cors_allowed_origins: vec!["*".to_string()],
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .context("PORT must be a valid u16")?;

        let site_url = env::var("SITE_URL")
            .map(|v| v.trim_end_matches('/').to_string())
            .unwrap_or_else(|_| format!("http://localhost:{port}"));
        url::Url::parse(&site_url).context("SITE_URL must be an absolute URL")?;

        let redis_url = non_empty_var("REDIS_URL");
        let webhook_secret = non_empty_var("SANITY_WEBHOOK_SECRET");

        let require_signature = env::var("REVALIDATE_REQUIRE_SIGNATURE")
            .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let critical_types = env::var("REVALIDATE_CRITICAL_TYPES")
            .map(|v| split_list(&v))
            .unwrap_or(defaults.critical_types);

        let cache_tag_prefix = non_empty_var("CACHE_TAG_PREFIX").unwrap_or(defaults.cache_tag_prefix);

        let locales = env::var("LOCALES")
            .map(|v| split_list(&v))
            .unwrap_or(defaults.locales);
        if locales.is_empty() {
            bail!("LOCALES must name at least one locale");
        }

        let default_locale = non_empty_var("DEFAULT_LOCALE").unwrap_or_else(|| locales[0].clone());
        if !locales.contains(&default_locale) {
            bail!("DEFAULT_LOCALE {default_locale} is not listed in LOCALES");
        }

        let locale_prefix = match env::var("LOCALE_PREFIX") {
            Ok(v) => v.parse().context("LOCALE_PREFIX must be as-needed, always, or never")?,
            Err(_) => LocalePrefix::default(),
        };

        let locale_cookie = non_empty_var("LOCALE_COOKIE").unwrap_or(defaults.locale_cookie);

        let contact_rate_limit_max = env::var("CONTACT_RATE_LIMIT_MAX")
            .unwrap_or_else(|_| "3".to_string())
            .parse()
            .context("CONTACT_RATE_LIMIT_MAX must be a valid u32")?;

        let contact_rate_limit_window_secs = env::var("CONTACT_RATE_LIMIT_WINDOW_SECS")
            .unwrap_or_else(|_| "300".to_string())
            .parse()
            .context("CONTACT_RATE_LIMIT_WINDOW_SECS must be a valid u64")?;

        let rate_limit_backend = match env::var("RATE_LIMIT_BACKEND") {
            Ok(v) => v.parse().context("RATE_LIMIT_BACKEND must be memory or redis")?,
            Err(_) => RateLimitBackend::default(),
        };
        if rate_limit_backend == RateLimitBackend::Redis && redis_url.is_none() {
            bail!("RATE_LIMIT_BACKEND=redis requires REDIS_URL");
        }

        let smtp_host = non_empty_var("SMTP_HOST");

        let smtp_port = env::var("SMTP_PORT")
            .unwrap_or_else(|_| "587".to_string())
            .parse()
            .context("SMTP_PORT must be a valid u16")?;

        let smtp_username = non_empty_var("SMTP_USERNAME");
        let smtp_password = non_empty_var("SMTP_PASSWORD");

        let smtp_encryption = env::var("SMTP_ENCRYPTION")
            .unwrap_or_else(|_| "starttls".to_string())
            .to_lowercase();

        let smtp_from_email =
            env::var("SMTP_FROM_EMAIL").unwrap_or_else(|_| "noreply@localhost".to_string());

        let contact_to_email = non_empty_var("CONTACT_TO_EMAIL").unwrap_or(defaults.contact_to_email);

        let cors_allowed_origins = env::var("CORS_ALLOWED_ORIGINS")
            .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_else(|_| vec!["*".to_string()]);

        Ok(Self {
            port,
            site_url,
            redis_url,
            webhook_secret,
            require_signature,
            critical_types,
            cache_tag_prefix,
            locales,
            default_locale,
            locale_prefix,
            locale_cookie,
            contact_rate_limit_max,
            contact_rate_limit_window_secs,
            rate_limit_backend,
            smtp_host,
            smtp_port,
            smtp_username,
            smtp_password,
            smtp_encryption,
            smtp_from_email,
            contact_to_email,
            cors_allowed_origins,
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
