//! HMAC-SHA256 webhook signature verification.
//!
//! The content source signs the raw request body with a shared secret and
//! sends the hex digest in a header. Verification recomputes the digest and
//! compares the decoded bytes in constant time.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the body signature.
pub const SIGNATURE_HEADER: &str = "sanity-webhook-signature";

/// Signature verification failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("signature header missing")]
    Missing,

    #[error("signature is not valid hex")]
    Malformed,

    #[error("signature mismatch")]
    Mismatch,
}

/// Compute the hex-encoded HMAC-SHA256 of `body` under `secret`.
pub fn sign(body: &[u8], secret: &str) -> String {
    hex::encode(digest(body, secret))
}

/// Verify a signature header value against `body`.
///
/// Accepts raw hex or `sha256=<hex>`, in either case.
pub fn verify(body: &[u8], signature: &str, secret: &str) -> Result<(), SignatureError> {
    let signature = signature.trim();
    if signature.is_empty() {
        return Err(SignatureError::Missing);
    }

    let hex_part = signature.strip_prefix("sha256=").unwrap_or(signature);
    let provided = hex::decode(hex_part).map_err(|_| SignatureError::Malformed)?;
    let expected = digest(body, secret);

    // ct_eq on slices of different length returns false without comparing.
    if bool::from(expected.as_slice().ct_eq(provided.as_slice())) {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

fn digest(body: &[u8], secret: &str) -> Vec<u8> {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        unreachable!("HMAC-SHA256 accepts any key length");
    };
    mac.update(body);
    mac.finalize().into_bytes().to_vec()
}
