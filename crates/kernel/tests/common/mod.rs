#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Common test utilities for integration tests.
//!
//! [`TestApp`] drives the REAL kernel router and state; only the outer
//! collaborators (cache invalidation, mail delivery, the clock) are swapped
//! for recording stand-ins so tests can observe their effects.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, header};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use isbim_kernel::cache::{CacheError, CacheLayer, TagInvalidator};
use isbim_kernel::middleware::SlidingWindowLimiter;
use isbim_kernel::services::email::{Mailer, OutgoingEmail};
use isbim_kernel::time::ManualClock;
use isbim_kernel::{AppState, Config, router};

/// Records every tag it is asked to invalidate.
#[derive(Debug, Default)]
pub struct RecordingInvalidator {
    tags: Mutex<Vec<String>>,
    fail: bool,
}

impl RecordingInvalidator {
    /// An invalidator whose every call fails like an unreachable Redis.
    pub fn failing() -> Self {
        Self {
            tags: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn tags(&self) -> Vec<String> {
        self.tags.lock().unwrap().clone()
    }
}

#[async_trait]
impl TagInvalidator for RecordingInvalidator {
    async fn invalidate_tag(&self, tag: &str) -> Result<(), CacheError> {
        if self.fail {
            return Err(CacheError::Redis(redis::RedisError::from((
                redis::ErrorKind::IoError,
                "connection refused",
            ))));
        }
        self.tags.lock().unwrap().push(tag.to_string());
        Ok(())
    }
}

/// Records every email instead of sending it.
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutgoingEmail>>,
    fail: bool,
}

impl RecordingMailer {
    /// A mailer whose every send fails.
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: OutgoingEmail) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("smtp unavailable");
        }
        self.sent.lock().unwrap().push(email);
        Ok(())
    }
}

/// Test application wrapper using the REAL kernel routes and state.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub invalidator: Arc<RecordingInvalidator>,
    pub mailer: Arc<RecordingMailer>,
    pub clock: ManualClock,
}

impl TestApp {
    /// App with default configuration.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// App with a custom configuration.
    pub fn with_config(config: Config) -> Self {
        Self::build(
            config,
            RecordingInvalidator::default(),
            RecordingMailer::default(),
        )
    }

    /// App with explicit recording collaborators.
    pub fn build(config: Config, invalidator: RecordingInvalidator, mailer: RecordingMailer) -> Self {
        Self::build_with_cache(config, CacheLayer::new(None), invalidator, mailer)
    }

    /// App with an explicit cache handle, for health reporting.
    pub fn build_with_cache(
        config: Config,
        cache: CacheLayer,
        invalidator: RecordingInvalidator,
        mailer: RecordingMailer,
    ) -> Self {
        let invalidator = Arc::new(invalidator);
        let mailer = Arc::new(mailer);
        let clock = ManualClock::new();

        let limiter = Arc::new(SlidingWindowLimiter::new(
            config.contact_rate_limit_max,
            std::time::Duration::from_secs(config.contact_rate_limit_window_secs),
            Arc::new(clock.clone()),
        ));

        let state = AppState::from_parts(
            config,
            cache,
            invalidator.clone(),
            limiter,
            mailer.clone(),
        )
        .expect("Failed to build test state");

        Self {
            router: router(state.clone()),
            state,
            invalidator,
            mailer,
            clock,
        }
    }

    /// Send a request to the test application.
    pub async fn request(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request")
    }

    /// GET `uri` with extra headers.
    pub async fn get(&self, uri: &str, headers: &[(&str, &str)]) -> Response<Body> {
        let mut builder = Request::builder().uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        self.request(builder.body(Body::empty()).unwrap()).await
    }

    /// POST a JSON body with extra headers.
    pub async fn post_json(
        &self,
        uri: &str,
        body: &str,
        headers: &[(&str, &str)],
    ) -> Response<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        self.request(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }
}

/// Read a response body as JSON.
pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).expect("response body is not JSON")
}

/// All `Set-Cookie` values on a response.
pub fn set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect()
}

/// The `Location` header of a redirect.
pub fn location(response: &Response<Body>) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .expect("missing Location header")
        .to_str()
        .unwrap()
        .to_string()
}
