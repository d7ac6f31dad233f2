//! Slack request signing.
//!
//! Slack signs every request it sends with HMAC-SHA256 over
//! `"{version}:{timestamp}:{body}"` keyed with the app's signing secret and
//! sends the result as `x-slack-signature: {version}={hex}`, together with
//! `x-slack-request-timestamp`.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::config::{DEFAULT_MAX_SKEW, DEFAULT_SIGNING_VERSION, SlackConfig};
use crate::error::{SlackError, SlackResult};
use crate::event::InboundEvent;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the request timestamp.
pub const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";

/// Header carrying the request signature.
pub const SIGNATURE_HEADER: &str = "x-slack-signature";

/// Secret, version tag and replay window used to check signatures.
#[derive(Clone)]
pub struct SigningContext {
    secret: SecretString,
    version: String,
    max_skew: Duration,
}

impl std::fmt::Debug for SigningContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningContext")
            .field("secret", &"[REDACTED]")
            .field("version", &self.version)
            .field("max_skew", &self.max_skew)
            .finish()
    }
}

impl SigningContext {
    /// Create a context with the default version (`v0`) and 5 minute window.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: crate::config::secret(secret),
            version: DEFAULT_SIGNING_VERSION.to_string(),
            max_skew: DEFAULT_MAX_SKEW,
        }
    }

    /// Build the context from configuration.
    pub fn from_config(config: &SlackConfig) -> SlackResult<Self> {
        let secret = config
            .signing_secret()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| SlackError::Config("Signing secret not configured".to_string()))?;
        Ok(Self::new(secret)
            .with_version(config.signing_version())
            .with_max_skew(config.max_skew()))
    }

    /// Override the version tag.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Override the replay window.
    pub fn with_max_skew(mut self, max_skew: Duration) -> Self {
        self.max_skew = max_skew;
        self
    }

    /// Version tag.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Replay window.
    pub fn max_skew(&self) -> Duration {
        self.max_skew
    }

    /// Compute the signature Slack would send for `timestamp` and `body`.
    pub fn sign(&self, timestamp: &str, body: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(self.version.as_bytes());
        mac.update(b":");
        mac.update(timestamp.as_bytes());
        mac.update(b":");
        mac.update(body.as_bytes());
        format!("{}={}", self.version, hex::encode(mac.finalize().into_bytes()))
    }

    /// Verify `event` against the current time.
    pub fn verify(&self, event: &InboundEvent) -> SlackResult<()> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| SlackError::Internal(format!("System clock before epoch: {}", e)))?
            .as_secs();
        self.verify_at(event, now as i64)
    }

    /// Verify `event` as of `now` (unix seconds).
    ///
    /// Every failure, including a stale timestamp, is an error.
    pub fn verify_at(&self, event: &InboundEvent, now: i64) -> SlackResult<()> {
        let timestamp = event.header(TIMESTAMP_HEADER).ok_or_else(|| {
            SlackError::SignatureVerification(format!("missing {} header", TIMESTAMP_HEADER))
        })?;
        let received = event.header(SIGNATURE_HEADER).ok_or_else(|| {
            SlackError::SignatureVerification(format!("missing {} header", SIGNATURE_HEADER))
        })?;

        let ts: i64 = timestamp.trim().parse().map_err(|_| {
            SlackError::SignatureVerification(format!("malformed timestamp: {}", timestamp))
        })?;

        let skew = now.abs_diff(ts);
        if skew > self.max_skew.as_secs() {
            warn!(skew, "Rejecting request outside the replay window");
            return Err(SlackError::SignatureVerification(format!(
                "timestamp is {}s away from server time",
                skew
            )));
        }

        let expected = self.sign(timestamp, event.body().unwrap_or_default());
        if expected.as_bytes().ct_eq(received.as_bytes()).unwrap_u8() != 1 {
            warn!(route = event.route_key(), "Request signature mismatch");
            return Err(SlackError::SignatureVerification(
                "signature mismatch".to_string(),
            ));
        }

        Ok(())
    }

    /// `true` when `event` verifies; failures are logged and swallowed.
    pub fn is_valid(&self, event: &InboundEvent) -> bool {
        self.verify(event).is_ok()
    }
}
