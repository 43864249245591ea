use std::time::Duration;

use log::*;
use prc_common::Secret;

use crate::ProviderId;

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

/// Connection settings for a single provider. Loaded from `PRC_<PROVIDER>_*` environment
/// variables, e.g. `PRC_HILOGATE_BASE_URL` and `PRC_HILOGATE_SECRET`.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub provider: ProviderId,
    pub base_url: String,
    pub merchant_id: String,
    pub secret: Secret<String>,
    /// Bounded timeout for all outbound calls. A timed-out status query is a failure, never a hang.
    pub request_timeout: Duration,
}

impl ProviderConfig {
    pub fn new(provider: ProviderId, base_url: &str, merchant_id: &str, secret: Secret<String>) -> Self {
        Self {
            provider,
            base_url: base_url.trim_end_matches('/').to_string(),
            merchant_id: merchant_id.to_string(),
            secret,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }

    pub fn from_env_or_default(provider: ProviderId) -> Self {
        let prefix = format!("PRC_{}", provider.as_str().to_ascii_uppercase());
        let base_url = std::env::var(format!("{prefix}_BASE_URL")).unwrap_or_else(|_| {
            warn!("🧩️ {prefix}_BASE_URL not set. Using a placeholder that will fail on first use.");
            format!("https://api.{}.example.com", provider.as_str())
        });
        let merchant_id = std::env::var(format!("{prefix}_MERCHANT_ID")).unwrap_or_else(|_| {
            warn!("🧩️ {prefix}_MERCHANT_ID not set.");
            String::default()
        });
        let secret = Secret::new(std::env::var(format!("{prefix}_SECRET")).unwrap_or_else(|_| {
            warn!("🧩️ {prefix}_SECRET not set. Webhook verification for {provider} will reject everything.");
            String::default()
        }));
        let request_timeout = std::env::var(format!("{prefix}_TIMEOUT_SECS"))
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS));
        let mut cfg = Self::new(provider, &base_url, &merchant_id, secret);
        cfg.request_timeout = request_timeout;
        cfg
    }
}
