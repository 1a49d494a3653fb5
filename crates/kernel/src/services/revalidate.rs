//! On-demand cache revalidation driven by content-source webhooks.
//!
//! A publish/update/delete in the content source posts a small payload
//! naming the document's type, id and slug. Those are turned into cache tags
//! and every tag is invalidated so the next read fetches fresh content.

use std::collections::HashSet;
use std::sync::Arc;

use futures_util::future::try_join_all;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::cache::{CacheError, TagInvalidator};
use crate::services::signature::{self, SignatureError};

/// Suffix of the catch-all tag busted by critical content types.
const CATCH_ALL: &str = "all";

/// Webhook body sent by the content source.
///
/// Only the fields used for tag derivation are read; everything else in the
/// document is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(rename = "_type", default)]
    pub content_type: Option<String>,

    #[serde(rename = "_id", default)]
    pub content_id: Option<String>,

    #[serde(default)]
    pub slug: Option<SlugField>,
}

/// A document slug, either `{ "current": "..." }` or a bare string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SlugField {
    Plain(String),
    Object {
        #[serde(default)]
        current: Option<String>,
    },
}

impl WebhookPayload {
    pub fn content_type(&self) -> Option<&str> {
        non_blank(self.content_type.as_deref())
    }

    pub fn content_id(&self) -> Option<&str> {
        non_blank(self.content_id.as_deref())
    }

    pub fn slug(&self) -> Option<&str> {
        match &self.slug {
            Some(SlugField::Plain(s)) => non_blank(Some(s)),
            Some(SlugField::Object { current }) => non_blank(current.as_deref()),
            None => None,
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Outcome of a revalidation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revalidation {
    /// Tags that were invalidated, in derivation order.
    pub tags: Vec<String>,
}

/// Verifies webhook signatures and invalidates derived cache tags.
#[derive(Clone)]
pub struct RevalidateService {
    invalidator: Arc<dyn TagInvalidator>,
    tag_prefix: String,
    critical_types: HashSet<String>,
    secret: Option<String>,
    require_signature: bool,
}

impl RevalidateService {
    pub fn new(
        invalidator: Arc<dyn TagInvalidator>,
        tag_prefix: impl Into<String>,
        critical_types: impl IntoIterator<Item = String>,
        secret: Option<String>,
        require_signature: bool,
    ) -> Self {
        Self {
            invalidator,
            tag_prefix: tag_prefix.into(),
            critical_types: critical_types.into_iter().collect(),
            secret,
            require_signature,
        }
    }

    /// Whether incoming webhooks are checked at all.
    pub fn verification_enabled(&self) -> bool {
        self.secret.is_some()
    }

    /// Check the signature header against the raw body.
    ///
    /// Without a configured secret every request passes. With a secret, a
    /// present header must match; an absent header passes unless
    /// `require_signature` is set.
    pub fn verify(&self, body: &[u8], signature: Option<&str>) -> Result<(), SignatureError> {
        let Some(secret) = self.secret.as_deref() else {
            return Ok(());
        };

        match signature {
            Some(sig) => signature::verify(body, sig, secret),
            None if self.require_signature => Err(SignatureError::Missing),
            None => {
                warn!("unsigned webhook accepted; set REVALIDATE_REQUIRE_SIGNATURE to reject");
                Ok(())
            }
        }
    }

    /// Derive the cache tags affected by a payload.
    ///
    /// Empty when the payload names no content type.
    pub fn tags_for(&self, payload: &WebhookPayload) -> Vec<String> {
        let Some(content_type) = payload.content_type() else {
            return Vec::new();
        };

        let prefix = &self.tag_prefix;
        let mut tags = vec![format!("{prefix}:{content_type}")];

        if let Some(id) = payload.content_id() {
            tags.push(format!("{prefix}:{content_type}:{id}"));
        }

        if let Some(slug) = payload.slug() {
            let tag = format!("{prefix}:{content_type}:{slug}");
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }

        if self.critical_types.contains(content_type) {
            tags.push(format!("{prefix}:{CATCH_ALL}"));
        }

        tags
    }

    /// Invalidate every tag derived from `payload`.
    ///
    /// Calls run concurrently. The first failure drops the outstanding calls
    /// and is returned; the sender is expected to retry the delivery.
    pub async fn revalidate(&self, payload: &WebhookPayload) -> Result<Revalidation, CacheError> {
        let tags = self.tags_for(payload);

        if tags.is_empty() {
            warn!(
                content_id = ?payload.content_id(),
                "webhook payload has no content type; nothing to revalidate"
            );
            return Ok(Revalidation { tags });
        }

        try_join_all(tags.iter().map(|tag| self.invalidator.invalidate_tag(tag))).await?;

        info!(
            content_type = ?payload.content_type(),
            content_id = ?payload.content_id(),
            slug = ?payload.slug(),
            tags = ?tags,
            "content revalidated"
        );
        debug!(count = tags.len(), "cache tags invalidated");

        Ok(Revalidation { tags })
    }
}

impl std::fmt::Debug for RevalidateService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RevalidateService")
            .field("tag_prefix", &self.tag_prefix)
            .field("critical_types", &self.critical_types)
            .field("verification_enabled", &self.secret.is_some())
            .field("require_signature", &self.require_signature)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::cache::CacheLayer;

    fn service(secret: Option<&str>, require: bool) -> RevalidateService {
        RevalidateService::new(
            Arc::new(CacheLayer::new(None)),
            "source",
            ["post", "news", "career", "product", "imageAsset"]
                .into_iter()
                .map(String::from),
            secret.map(String::from),
            require,
        )
    }

    fn payload(json: &str) -> WebhookPayload {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn tags_for_critical_type_include_catch_all() {
        let svc = service(None, false);
        let tags = svc.tags_for(&payload(
            r#"{"_type":"news","_id":"abc123","slug":{"current":"launch-announcement"}}"#,
        ));
        assert_eq!(
            tags,
            vec![
                "source:news",
                "source:news:abc123",
                "source:news:launch-announcement",
                "source:all",
            ]
        );
    }

    #[test]
    fn tags_for_non_critical_type_skip_catch_all() {
        let svc = service(None, false);
        let tags = svc.tags_for(&payload(r#"{"_type":"legalPage","_id":"privacy"}"#));
        assert_eq!(tags, vec!["source:legalPage", "source:legalPage:privacy"]);
    }

    #[test]
    fn tags_for_missing_type_is_empty() {
        let svc = service(None, false);
        assert!(svc.tags_for(&payload(r#"{"_id":"abc"}"#)).is_empty());
        assert!(svc.tags_for(&payload(r#"{"_type":"  "}"#)).is_empty());
    }

    #[test]
    fn tags_for_accepts_plain_slug_and_dedupes() {
        let svc = service(None, false);
        let tags = svc.tags_for(&payload(r#"{"_type":"product","_id":"bim","slug":"bim"}"#));
        assert_eq!(tags, vec!["source:product", "source:product:bim", "source:all"]);
    }

    #[test]
    fn tags_for_ignores_slug_without_current() {
        let svc = service(None, false);
        let tags = svc.tags_for(&payload(r#"{"_type":"page","slug":{}}"#));
        assert_eq!(tags, vec!["source:page"]);
    }

    #[test]
    fn verify_skipped_without_secret() {
        let svc = service(None, true);
        assert!(!svc.verification_enabled());
        assert_eq!(svc.verify(b"{}", Some("garbage")), Ok(()));
        assert_eq!(svc.verify(b"{}", None), Ok(()));
    }

    #[test]
    fn verify_lenient_when_header_absent() {
        let svc = service(Some("s3cret"), false);
        assert_eq!(svc.verify(b"{}", None), Ok(()));
    }

    #[test]
    fn verify_strict_when_required() {
        let svc = service(Some("s3cret"), true);
        assert_eq!(svc.verify(b"{}", None), Err(SignatureError::Missing));
        let sig = signature::sign(b"{}", "s3cret");
        assert_eq!(svc.verify(b"{}", Some(&sig)), Ok(()));
    }

    #[tokio::test]
    async fn revalidate_no_type_is_noop() {
        let svc = service(None, false);
        let result = svc.revalidate(&WebhookPayload::default()).await.unwrap();
        assert!(result.tags.is_empty());
    }
}
