use std::{collections::HashMap, str::FromStr, sync::Arc};

use futures::future::BoxFuture;
use log::*;
use provider_tools::{ProviderApi, ProviderApiError, ProviderConfig, ProviderId, ProviderPaymentStatus};

/// The set of configured provider clients, keyed by provider id. Shared by the webhook routes
/// (for signature schemes) and the fallback poller (for status queries).
#[derive(Clone)]
pub struct ProviderRegistry {
    apis: Arc<HashMap<ProviderId, ProviderApi>>,
}

impl ProviderRegistry {
    pub fn new(configs: Vec<ProviderConfig>) -> Result<Self, ProviderApiError> {
        let mut apis = HashMap::with_capacity(configs.len());
        for config in configs {
            let provider = config.provider;
            apis.insert(provider, ProviderApi::new(config)?);
        }
        Ok(Self { apis: Arc::new(apis) })
    }

    pub fn api(&self, provider: ProviderId) -> Option<&ProviderApi> {
        self.apis.get(&provider)
    }
}

/// Where the poller gets a payment's current status from. The server uses the real provider
/// clients; tests script the responses.
pub trait StatusSource: Send + Sync + 'static {
    fn payment_status<'a>(
        &'a self,
        provider: &'a str,
        reference: &'a str,
    ) -> BoxFuture<'a, Result<ProviderPaymentStatus, ProviderApiError>>;
}

impl StatusSource for ProviderRegistry {
    fn payment_status<'a>(
        &'a self,
        provider: &'a str,
        reference: &'a str,
    ) -> BoxFuture<'a, Result<ProviderPaymentStatus, ProviderApiError>> {
        Box::pin(async move {
            let id = ProviderId::from_str(provider)
                .map_err(|e| ProviderApiError::RequestError(e.to_string()))?;
            let api = self.api(id).ok_or_else(|| {
                warn!("🌐️ No client configured for provider {id}");
                ProviderApiError::Initialization(format!("provider {id} is not configured"))
            })?;
            api.get_payment_status(reference).await
        })
    }
}
