use std::fmt::Display;

use chrono::{DateTime, Utc};
use recon_engine::db_types::OrderId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}

/// Body of `POST /api/loan-settlements`. Either `order_ids` or the
/// `sub_merchant_id`/`start`/`end` triple must be supplied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanSettlementParams {
    #[serde(default)]
    pub order_ids: Option<Vec<OrderId>>,
    #[serde(default)]
    pub sub_merchant_id: Option<String>,
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub dry_run: bool,
}

/// Body of `POST /api/loan-settlements/revert`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanRevertParams {
    pub sub_merchant_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub export_only: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSubmitted {
    pub job_id: u64,
}
