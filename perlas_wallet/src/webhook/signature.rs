//! Webhook authentication: hex HMAC-SHA256 over the raw body.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::errors::{WebhookError, WebhookResult};

type HmacSha256 = Hmac<Sha256>;

/// Webhook settings
#[derive(Debug, Clone, Default)]
pub struct WebhookConfig {
    /// Shared secret; verification is disabled when `None`
    pub secret: Option<String>,
}

impl WebhookConfig {
    /// Read `GATEWAY_WEBHOOK_SECRET`; empty values count as unset
    pub fn from_env() -> Self {
        Self {
            secret: std::env::var("GATEWAY_WEBHOOK_SECRET")
                .ok()
                .filter(|s| !s.is_empty()),
        }
    }

    pub fn verification_enabled(&self) -> bool {
        self.secret.is_some()
    }
}

fn mac_for(secret: &str) -> WebhookResult<HmacSha256> {
    HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| WebhookError::InvalidSignature)
}

/// Hex signature of `body` under `secret`
pub fn sign(secret: &str, body: &[u8]) -> WebhookResult<String> {
    let mut mac = mac_for(secret)?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Checks inbound signatures against the configured secret
#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    secret: Option<String>,
}

impl SignatureVerifier {
    pub fn new(config: &WebhookConfig) -> Self {
        Self {
            secret: config.secret.clone(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.secret.is_some()
    }

    /// Verify `signature` (hex) for `body`. Comparison is constant time.
    pub fn verify(&self, body: &[u8], signature: Option<&str>) -> WebhookResult<()> {
        let Some(secret) = &self.secret else {
            return Ok(());
        };
        let provided = signature
            .map(str::trim)
            .and_then(|s| hex::decode(s).ok())
            .ok_or(WebhookError::InvalidSignature)?;

        let mut mac = mac_for(secret)?;
        mac.update(body);
        mac.verify_slice(&provided)
            .map_err(|_| WebhookError::InvalidSignature)
    }
}
