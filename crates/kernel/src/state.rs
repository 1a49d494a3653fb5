//! Application state shared across all handlers.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use redis::Client as RedisClient;
use tracing::{info, warn};

use crate::cache::{CacheLayer, TagInvalidator};
use crate::config::{Config, RateLimitBackend};
use crate::middleware::{LocaleRouting, RedisLimiter, SlidingWindowLimiter, SubmissionLimiter};
use crate::services::contact::ContactService;
use crate::services::email::{LogMailer, Mailer, SmtpMailer};
use crate::services::revalidate::RevalidateService;
use crate::time::SystemClock;

/// Shared application state.
///
/// Wrapped in Arc internally so Clone is cheap. Every process-wide mutable
/// structure (limiter log, cache handle) is owned here and nowhere else.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,

    /// Locale negotiator chain and prefix strategy.
    locale_routing: LocaleRouting,

    /// Shared tag-indexed cache (Redis), if configured.
    cache: CacheLayer,

    /// Webhook verification and tag invalidation.
    revalidate: RevalidateService,

    /// Contact form pipeline.
    contact: ContactService,
}

impl AppState {
    /// Build production state from configuration.
    pub fn new(config: &Config) -> Result<Self> {
        let redis = config
            .redis_url
            .as_deref()
            .map(RedisClient::open)
            .transpose()
            .context("invalid REDIS_URL")?;

        let cache = CacheLayer::new(redis.clone());

        let window = Duration::from_secs(config.contact_rate_limit_window_secs);
        let limiter: Arc<dyn SubmissionLimiter> = match (config.rate_limit_backend, redis) {
            (RateLimitBackend::Redis, Some(client)) => {
                info!("contact rate limit shared via Redis");
                Arc::new(RedisLimiter::new(
                    client,
                    "contact",
                    config.contact_rate_limit_max,
                    window,
                ))
            }
            _ => {
                info!("contact rate limit is process-local; counts are not shared between instances");
                Arc::new(SlidingWindowLimiter::new(
                    config.contact_rate_limit_max,
                    window,
                    Arc::new(SystemClock),
                ))
            }
        };

        let mailer: Arc<dyn Mailer> = match config.smtp_host.as_deref() {
            Some(host) => Arc::new(
                SmtpMailer::new(
                    host,
                    config.smtp_port,
                    config.smtp_username.as_deref(),
                    config.smtp_password.as_deref(),
                    &config.smtp_encryption,
                    config.smtp_from_email.clone(),
                )
                .context("failed to create SMTP mailer")?,
            ),
            None => {
                warn!("SMTP_HOST not set; contact form submissions will only be logged");
                Arc::new(LogMailer)
            }
        };

        let invalidator: Arc<dyn TagInvalidator> = Arc::new(cache.clone());
        Self::from_parts(config.clone(), cache, invalidator, limiter, mailer)
    }

    /// Assemble state from explicit collaborators.
    pub fn from_parts(
        config: Config,
        cache: CacheLayer,
        invalidator: Arc<dyn TagInvalidator>,
        limiter: Arc<dyn SubmissionLimiter>,
        mailer: Arc<dyn Mailer>,
    ) -> Result<Self> {
        let locale_routing =
            LocaleRouting::from_config(&config).context("failed to build locale routing")?;

        if config.webhook_secret.is_none() {
            warn!(
                "SANITY_WEBHOOK_SECRET not set; webhook signatures are NOT verified. \
                 Only expose /api/revalidate on a trusted network path."
            );
        }

        let revalidate = RevalidateService::new(
            invalidator,
            config.cache_tag_prefix.clone(),
            config.critical_types.clone(),
            config.webhook_secret.clone(),
            config.require_signature,
        );

        let contact = ContactService::new(limiter, mailer, config.contact_to_email.clone())?;

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                locale_routing,
                cache,
                revalidate,
                contact,
            }),
        })
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn locale_routing(&self) -> &LocaleRouting {
        &self.inner.locale_routing
    }

    pub fn cache(&self) -> &CacheLayer {
        &self.inner.cache
    }

    pub fn revalidate(&self) -> &RevalidateService {
        &self.inner.revalidate
    }

    pub fn contact(&self) -> &ContactService {
        &self.inner.contact
    }
}
