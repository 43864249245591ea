use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

//--------------------------------------     ProviderId      ---------------------------------------------------------
/// The payment providers the reconciliation core knows how to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Hilogate,
    Oy,
    Gidi,
    Piro,
    Genesis,
}

impl ProviderId {
    pub const ALL: [ProviderId; 5] =
        [ProviderId::Hilogate, ProviderId::Oy, ProviderId::Gidi, ProviderId::Piro, ProviderId::Genesis];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Hilogate => "hilogate",
            ProviderId::Oy => "oy",
            ProviderId::Gidi => "gidi",
            ProviderId::Piro => "piro",
            ProviderId::Genesis => "genesis",
        }
    }

    /// The header each provider uses to carry its webhook signature.
    pub fn signature_header(&self) -> &'static str {
        match self {
            ProviderId::Hilogate => "X-Hilogate-Signature",
            ProviderId::Oy => "X-Oy-Signature",
            ProviderId::Gidi => "X-Gidi-Signature",
            ProviderId::Piro => "X-Piro-Signature",
            ProviderId::Genesis => "X-Genesis-Signature",
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("Unknown payment provider: {0}")]
pub struct UnknownProvider(String);

impl FromStr for ProviderId {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hilogate" => Ok(Self::Hilogate),
            "oy" => Ok(Self::Oy),
            "gidi" => Ok(Self::Gidi),
            "piro" => Ok(Self::Piro),
            "genesis" => Ok(Self::Genesis),
            other => Err(UnknownProvider(other.to_string())),
        }
    }
}

impl Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

//--------------------------------------  SettlementOutcome  ---------------------------------------------------------
/// The internal reading of a provider's status vocabulary. Anything not recognised as terminal is
/// `Unknown` and must leave the order untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementOutcome {
    Success,
    Failure,
    Unknown,
}

impl SettlementOutcome {
    pub fn from_provider_status(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "SUCCESS" | "PAID" | "DONE" | "COMPLETED" | "SETTLED" => Self::Success,
            "FAILED" | "CANCELLED" | "EXPIRED" | "VOID" | "ERROR" => Self::Failure,
            _ => Self::Unknown,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

//-------------------------------------- ProviderPaymentStatus -------------------------------------------------------
/// The normalized `{status, amounts, timestamps, raw}` shape every provider response is mapped
/// into before the engine sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderPaymentStatus {
    /// The provider's status word, verbatim.
    pub status: String,
    /// Gross amount in minor units, when the provider reports one.
    pub gross_amount: Option<i64>,
    /// The provider's own fee in minor units, when reported.
    pub provider_fee: Option<i64>,
    /// When the customer's payment landed at the provider.
    pub payment_received_time: Option<DateTime<Utc>>,
    /// The provider-side payment id, when reported.
    pub payment_id: Option<String>,
    /// The untouched provider response, persisted on the order for audit.
    pub raw: Value,
}

impl ProviderPaymentStatus {
    pub fn outcome(&self) -> SettlementOutcome {
        SettlementOutcome::from_provider_status(&self.status)
    }

    /// Pull the normalized fields out of a raw provider response. Providers disagree on envelope
    /// shape, so both top-level fields and a `data` sub-object are searched.
    pub fn from_value(raw: Value) -> Option<Self> {
        let status = lookup_str(&raw, "status")?;
        let gross_amount = lookup_i64(&raw, "amount").or_else(|| lookup_i64(&raw, "net_amount"));
        let provider_fee = lookup_i64(&raw, "fee").or_else(|| lookup_i64(&raw, "total_fee"));
        let payment_id = lookup_str(&raw, "payment_id").or_else(|| lookup_str(&raw, "trx_id"));
        let payment_received_time = lookup_str(&raw, "paid_at")
            .or_else(|| lookup_str(&raw, "payment_received_time"))
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc));
        Some(Self { status, gross_amount, provider_fee, payment_received_time, payment_id, raw })
    }
}

fn lookup<'a>(raw: &'a Value, key: &str) -> Option<&'a Value> {
    raw.get(key).or_else(|| raw.get("data").and_then(|d| d.get(key)))
}

fn lookup_str(raw: &Value, key: &str) -> Option<String> {
    lookup(raw, key).and_then(|v| v.as_str()).map(|s| s.to_string())
}

fn lookup_i64(raw: &Value, key: &str) -> Option<i64> {
    let v = lookup(raw, key)?;
    v.as_i64().or_else(|| v.as_f64().map(|f| f.round() as i64))
}

//-------------------------------------- request shapes --------------------------------------------------------------
#[derive(Debug, Clone, Serialize)]
pub struct NewProviderPayment {
    pub reference: String,
    pub amount: i64,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderTransfer {
    pub reference: String,
    pub amount: i64,
    pub bank_code: String,
    pub account_number: String,
    pub account_name: String,
}
