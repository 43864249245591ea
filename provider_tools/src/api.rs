use std::sync::Arc;

use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
    Method,
};
use serde::Serialize;
use serde_json::Value;

use crate::{
    config::ProviderConfig,
    data_objects::{NewProviderPayment, ProviderPaymentStatus, ProviderTransfer},
    signing::{CallbackHmac, LegacyMd5, SignatureScheme},
    ProviderApiError,
    ProviderId,
};

/// A thin client for one provider's REST API. All responses are normalized into
/// [`ProviderPaymentStatus`] so the engine never sees provider-specific shapes.
#[derive(Clone)]
pub struct ProviderApi {
    config: ProviderConfig,
    client: Arc<Client>,
    scheme: Arc<dyn SignatureScheme>,
}

impl ProviderApi {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderApiError> {
        let mut headers = HeaderMap::with_capacity(2);
        let merchant = HeaderValue::from_str(&config.merchant_id)
            .map_err(|e| ProviderApiError::Initialization(e.to_string()))?;
        headers.insert("X-Merchant-Id", merchant);
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ProviderApiError::Initialization(e.to_string()))?;
        let scheme = webhook_scheme(config.provider, config.secret.reveal());
        Ok(Self { config, client: Arc::new(client), scheme })
    }

    pub fn provider(&self) -> ProviderId {
        self.config.provider
    }

    /// The signature scheme this provider uses for its webhooks.
    pub fn signature_scheme(&self) -> &dyn SignatureScheme {
        self.scheme.as_ref()
    }

    /// Create a payment at the provider for the given reference and amount.
    pub async fn create_payment(&self, payment: &NewProviderPayment) -> Result<ProviderPaymentStatus, ProviderApiError> {
        let path = match self.config.provider {
            ProviderId::Hilogate => "/api/v1/transactions".to_string(),
            ProviderId::Oy => "/api/payment-checkout".to_string(),
            ProviderId::Gidi => "/v2/payments".to_string(),
            ProviderId::Piro | ProviderId::Genesis => "/gateway/payment/create".to_string(),
        };
        let raw = self.rest_query(Method::POST, &path, Some(payment)).await?;
        ProviderPaymentStatus::from_value(raw).ok_or(ProviderApiError::MissingField("status"))
    }

    /// Query the current status of a payment by its best-known reference.
    pub async fn get_payment_status(&self, reference: &str) -> Result<ProviderPaymentStatus, ProviderApiError> {
        let path = match self.config.provider {
            ProviderId::Hilogate => format!("/api/v1/transactions/{reference}"),
            ProviderId::Oy => format!("/api/payment-checkout/status/{reference}"),
            ProviderId::Gidi => format!("/v2/payments/{reference}/status"),
            ProviderId::Piro | ProviderId::Genesis => format!("/gateway/payment/status/{reference}"),
        };
        trace!("🌐️ [{}] querying payment status for {reference}", self.config.provider);
        let raw = self.rest_query::<()>(Method::GET, &path, None).await?;
        ProviderPaymentStatus::from_value(raw).ok_or(ProviderApiError::MissingField("status"))
    }

    /// Initiate a disbursement/transfer at the provider.
    pub async fn create_transfer(&self, transfer: &ProviderTransfer) -> Result<ProviderPaymentStatus, ProviderApiError> {
        let path = match self.config.provider {
            ProviderId::Hilogate => "/api/v1/withdrawals".to_string(),
            ProviderId::Oy => "/api/remit".to_string(),
            ProviderId::Gidi => "/v2/disbursements".to_string(),
            ProviderId::Piro | ProviderId::Genesis => "/gateway/transfer/create".to_string(),
        };
        let raw = self.rest_query(Method::POST, &path, Some(transfer)).await?;
        ProviderPaymentStatus::from_value(raw).ok_or(ProviderApiError::MissingField("status"))
    }

    async fn rest_query<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Value, ProviderApiError> {
        let url = format!("{}{path}", self.config.base_url);
        trace!("🌐️ [{}] {method} {url}", self.config.provider);
        let mut req = self.client.request(method, url);
        if let Some(body) = body {
            let bytes = serde_json::to_vec(body).map_err(|e| ProviderApiError::JsonError(e.to_string()))?;
            let signature = self.scheme.sign(&bytes);
            req = req.header("X-Signature", signature).body(bytes);
        }
        let response = req.send().await.map_err(|e| ProviderApiError::RequestError(e.to_string()))?;
        if response.status().is_success() {
            response.json::<Value>().await.map_err(|e| ProviderApiError::JsonError(e.to_string()))
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.map_err(|e| ProviderApiError::RequestError(e.to_string()))?;
            debug!("🌐️ [{}] provider returned error {status}: {message}", self.config.provider);
            Err(ProviderApiError::QueryError { status, message })
        }
    }
}

/// Piro and Genesis still use the legacy MD5 body digest; everyone else signs with HMAC-SHA256.
fn webhook_scheme(provider: ProviderId, secret: &str) -> Arc<dyn SignatureScheme> {
    match provider {
        ProviderId::Piro | ProviderId::Genesis => Arc::new(LegacyMd5::new(secret)),
        ProviderId::Hilogate | ProviderId::Oy | ProviderId::Gidi => Arc::new(CallbackHmac::new(secret)),
    }
}
