//! Signature schemes for inbound webhooks and outbound partner callbacks.
//!
//! Every scheme signs the raw request body byte-for-byte. Callers must never re-serialize a parsed
//! payload before verification, since key ordering and whitespace would change the digest.
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Maximum allowed clock skew between an S2S request timestamp and the server clock.
const S2S_MAX_SKEW: Duration = Duration::minutes(5);

/// A pluggable signing scheme. One implementation exists per provider signature style, so a
/// stronger scheme can be substituted per provider without touching call sites.
pub trait SignatureScheme: Send + Sync {
    /// Compute the signature (hex digest) over the raw bytes.
    fn sign(&self, data: &[u8]) -> String;

    /// Check a provided signature against the raw bytes.
    fn verify(&self, data: &[u8], provided: &str) -> bool;
}

//--------------------------------------     LegacyMd5       ---------------------------------------------------------
/// The legacy Piro/Genesis webhook scheme: `hex(MD5(raw_body || shared_secret))`.
///
/// MD5 is cryptographically weak; the scheme is reproduced exactly for compatibility with the
/// providers that still require it.
pub struct LegacyMd5 {
    secret: String,
}

impl LegacyMd5 {
    pub fn new(secret: impl Into<String>) -> Self {
        Self { secret: secret.into() }
    }
}

impl SignatureScheme for LegacyMd5 {
    fn sign(&self, data: &[u8]) -> String {
        let mut hasher = Md5::new();
        hasher.update(data);
        hasher.update(self.secret.as_bytes());
        encode_hex(&hasher.finalize())
    }

    fn verify(&self, data: &[u8], provided: &str) -> bool {
        // The legacy scheme never specified a constant-time compare, and the providers themselves
        // compare plain strings. Keep the behaviour bit-compatible.
        self.sign(data).eq_ignore_ascii_case(provided)
    }
}

//--------------------------------------     CallbackHmac    ---------------------------------------------------------
/// HMAC-SHA256 hex digest over the serialized JSON payload. Used to sign outbound partner
/// callbacks and to verify Hilogate/OY/Gidi webhooks.
pub struct CallbackHmac {
    secret: String,
}

impl CallbackHmac {
    pub fn new(secret: impl Into<String>) -> Self {
        Self { secret: secret.into() }
    }
}

impl SignatureScheme for CallbackHmac {
    fn sign(&self, data: &[u8]) -> String {
        hmac_sha256_hex(self.secret.as_bytes(), data)
    }

    fn verify(&self, data: &[u8], provided: &str) -> bool {
        verify_hmac_sha256(self.secret.as_bytes(), data, provided)
    }
}

//--------------------------------------     S2S signatures  ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum S2sVerifyError {
    #[error("The request timestamp is not a valid RFC3339 timestamp: {0}")]
    MalformedTimestamp(String),
    #[error("The request timestamp is outside the permitted 5 minute window")]
    StaleTimestamp,
    #[error("The request signature does not match the request contents")]
    InvalidSignature,
}

/// Compute the inbound S2S API signature: `HMAC-SHA256(METHOD:PATH:TIMESTAMP:RAWBODY, secret)`.
pub fn s2s_signature(method: &str, path: &str, timestamp: &str, raw_body: &[u8], secret: &str) -> String {
    let mut mac = new_mac(secret.as_bytes());
    mac.update(method.as_bytes());
    mac.update(b":");
    mac.update(path.as_bytes());
    mac.update(b":");
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(raw_body);
    encode_hex(&mac.finalize().into_bytes())
}

/// Verify an inbound S2S signature with a constant-time comparison, rejecting requests whose
/// timestamp skews more than 5 minutes from `now` in either direction.
pub fn verify_s2s_signature(
    method: &str,
    path: &str,
    timestamp: &str,
    raw_body: &[u8],
    secret: &str,
    provided: &str,
    now: DateTime<Utc>,
) -> Result<(), S2sVerifyError> {
    let ts = DateTime::parse_from_rfc3339(timestamp)
        .map_err(|e| S2sVerifyError::MalformedTimestamp(e.to_string()))?
        .with_timezone(&Utc);
    let skew = if ts > now { ts - now } else { now - ts };
    if skew > S2S_MAX_SKEW {
        return Err(S2sVerifyError::StaleTimestamp);
    }
    let mut mac = new_mac(secret.as_bytes());
    mac.update(method.as_bytes());
    mac.update(b":");
    mac.update(path.as_bytes());
    mac.update(b":");
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(raw_body);
    match decode_hex(provided) {
        Some(sig) => mac.verify_slice(&sig).map_err(|_| S2sVerifyError::InvalidSignature),
        None => Err(S2sVerifyError::InvalidSignature),
    }
}

//--------------------------------------     helpers         ---------------------------------------------------------
pub fn hmac_sha256_hex(secret: &[u8], data: &[u8]) -> String {
    let mut mac = new_mac(secret);
    mac.update(data);
    encode_hex(&mac.finalize().into_bytes())
}

/// Constant-time HMAC verification against a hex-encoded signature.
pub fn verify_hmac_sha256(secret: &[u8], data: &[u8], provided: &str) -> bool {
    let sig = match decode_hex(provided) {
        Some(s) => s,
        None => return false,
    };
    let mut mac = new_mac(secret);
    mac.update(data);
    mac.verify_slice(&sig).is_ok()
}

fn new_mac(secret: &[u8]) -> HmacSha256 {
    // HMAC accepts keys of any length, so new_from_slice cannot fail.
    HmacSha256::new_from_slice(secret).unwrap_or_else(|_| unreachable!("HMAC accepts keys of any size"))
}

pub(crate) fn encode_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len()).step_by(2).map(|i| u8::from_str_radix(s.get(i..i + 2)?, 16).ok()).collect()
}
