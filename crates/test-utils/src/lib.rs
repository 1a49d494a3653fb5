//! isBIM test utilities.
//!
//! Helpers for integration testing: webhook payload and signature builders,
//! contact form fixtures, and assertion utilities for JSON responses.

use hmac::{Hmac, Mac};
use serde_json::Value as JsonValue;
use sha2::Sha256;

/// Secret used by test applications that verify webhooks.
pub const TEST_WEBHOOK_SECRET: &str = "test-webhook-secret";

/// Compute the hex HMAC-SHA256 of `body`, as the CMS would send it.
///
/// Deliberately independent of the kernel's own signing code.
pub fn sign(body: &str, secret: &str) -> String {
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        unreachable!("HMAC accepts keys of any length");
    };
    mac.update(body.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Create a webhook payload for a document type.
pub fn webhook(content_type: &str) -> TestWebhook {
    TestWebhook {
        fields: serde_json::json!({ "_type": content_type }),
    }
}

/// A webhook payload builder.
#[derive(Debug, Clone)]
pub struct TestWebhook {
    pub fields: JsonValue,
}

impl TestWebhook {
    /// Payload with no document type at all.
    pub fn untyped() -> Self {
        Self {
            fields: serde_json::json!({}),
        }
    }

    /// Set the document id.
    pub fn with_id(self, id: &str) -> Self {
        self.with_field("_id", JsonValue::String(id.to_string()))
    }

    /// Set the slug in the CMS's `{ "current": ... }` shape.
    pub fn with_slug(self, slug: &str) -> Self {
        self.with_field("slug", serde_json::json!({ "current": slug }))
    }

    /// Set the slug as a bare string.
    pub fn with_plain_slug(self, slug: &str) -> Self {
        self.with_field("slug", JsonValue::String(slug.to_string()))
    }

    /// Add an arbitrary field.
    pub fn with_field(mut self, name: &str, value: JsonValue) -> Self {
        if let Some(obj) = self.fields.as_object_mut() {
            obj.insert(name.to_string(), value);
        }
        self
    }

    /// Serialized request body.
    pub fn body(&self) -> String {
        self.fields.to_string()
    }
}

/// Create a valid contact submission.
pub fn contact_form() -> TestContact {
    TestContact {
        fields: serde_json::json!({
            "name": "Chan Tai Man",
            "email": "tm.chan@example.com",
            "company": "Example Engineering Ltd",
            "message": "We would like a demo of the digital twin platform.",
        }),
    }
}

/// A contact form payload builder.
#[derive(Debug, Clone)]
pub struct TestContact {
    pub fields: JsonValue,
}

impl TestContact {
    /// Set a string field.
    pub fn with(mut self, name: &str, value: &str) -> Self {
        if let Some(obj) = self.fields.as_object_mut() {
            obj.insert(name.to_string(), JsonValue::String(value.to_string()));
        }
        self
    }

    /// Remove a field.
    pub fn without(mut self, name: &str) -> Self {
        if let Some(obj) = self.fields.as_object_mut() {
            obj.remove(name);
        }
        self
    }

    /// Serialized request body.
    pub fn body(&self) -> String {
        self.fields.to_string()
    }
}

/// Assertion helpers for JSON content.
pub mod assert {
    use serde_json::Value;

    /// Assert that a JSON value has a specific key.
    pub fn has_key(value: &Value, key: &str) {
        assert!(
            value.get(key).is_some(),
            "Expected JSON to have key '{}', got: {}",
            key,
            value
        );
    }

    /// Assert that a JSON value lacks a specific key.
    pub fn lacks_key(value: &Value, key: &str) {
        assert!(
            value.get(key).is_none(),
            "Expected JSON to lack key '{}', got: {}",
            key,
            value
        );
    }

    /// Assert that a string field equals `expected`.
    pub fn str_field(value: &Value, key: &str, expected: &str) {
        assert_eq!(
            value.get(key).and_then(Value::as_str),
            Some(expected),
            "field '{}' mismatch in {}",
            key,
            value
        );
    }

    /// Assert that a string contains a substring.
    pub fn contains(haystack: &str, needle: &str) {
        assert!(
            haystack.contains(needle),
            "Expected string to contain '{}'\nActual: {}",
            needle,
            haystack
        );
    }
}
