use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use log::error;
use prc_common::MinorUnits;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use thiserror::Error;

//--------------------------------------        OrderId        -------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, sqlx::Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderId(pub String);

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl OrderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------      OrderStatus      -------------------------------------------------------
/// The canonical order status vocabulary.
///
/// `PENDING` orders move to `PAID` or a terminal failure state via provider confirmation.
/// `PAID`/`SUCCESS`/`DONE`/`SETTLED` orders can be forced into `LN_SETTLED` by loan settlement,
/// and an `LN_SETTLED` order only ever leaves that state via a snapshot revert. The failure
/// states are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Created, no payment confirmation seen yet.
    Pending,
    /// Payment received in full; carries a pending (awaiting-settlement) balance.
    Paid,
    /// Externally confirmed successful (provider vocabulary); settlement-bearing.
    Success,
    /// Externally completed; settlement-bearing.
    Done,
    /// Settled through the normal pipeline (completion flow is out of scope here).
    Settled,
    /// Force-settled by the administrative loan-settlement flow. Reversible via snapshot.
    LnSettled,
    Failed,
    Cancelled,
    Expired,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Paid => "PAID",
            OrderStatus::Success => "SUCCESS",
            OrderStatus::Done => "DONE",
            OrderStatus::Settled => "SETTLED",
            OrderStatus::LnSettled => "LN_SETTLED",
            OrderStatus::Failed => "FAILED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Expired => "EXPIRED",
        }
    }

    /// The absorbing failure states.
    pub fn is_terminal_failure(&self) -> bool {
        matches!(self, OrderStatus::Failed | OrderStatus::Cancelled | OrderStatus::Expired)
    }

    /// Statuses eligible for forced loan settlement in range mode.
    pub fn is_loan_settleable(&self) -> bool {
        matches!(self, OrderStatus::Paid | OrderStatus::Success | OrderStatus::Done | OrderStatus::Settled)
    }
}

impl Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid order status: {0}")]
pub struct ConversionError(String);

impl FromStr for OrderStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "PAID" => Ok(Self::Paid),
            "SUCCESS" => Ok(Self::Success),
            "DONE" => Ok(Self::Done),
            "SETTLED" => Ok(Self::Settled),
            // LN_SETTLE appears in historical data; LN_SETTLED is the canonical spelling and the
            // only form ever written back.
            "LN_SETTLED" | "LN_SETTLE" => Ok(Self::LnSettled),
            "FAILED" => Ok(Self::Failed),
            "CANCELLED" => Ok(Self::Cancelled),
            "EXPIRED" => Ok(Self::Expired),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

impl From<String> for OrderStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid order status: {value}. But this conversion cannot fail. Defaulting to Pending");
            OrderStatus::Pending
        })
    }
}

//--------------------------------------        Order          -------------------------------------------------------
/// The central entity. Mutated exclusively through compare-and-swap transitions; never deleted.
#[derive(Debug, Clone, FromRow)]
pub struct Order {
    pub id: OrderId,
    pub partner_client_id: String,
    pub sub_merchant_id: String,
    pub provider: String,
    pub status: OrderStatus,
    /// Gross amount in integer minor units.
    pub amount: MinorUnits,
    /// Awaiting-settlement balance while PAID.
    pub pending_amount: Option<MinorUnits>,
    pub settlement_amount: Option<MinorUnits>,
    pub settlement_status: Option<String>,
    pub settlement_time: Option<DateTime<Utc>>,
    /// Platform fee computed at payment time.
    pub fee_platform: Option<MinorUnits>,
    /// The provider's own fee, as reported by the provider.
    pub fee_provider: Option<MinorUnits>,
    pub payment_received_time: Option<DateTime<Utc>>,
    pub trx_expiration_time: Option<DateTime<Utc>>,
    /// Set only when the order is forced into LN_SETTLED.
    pub loaned_at: Option<DateTime<Utc>>,
    pub provider_payment_id: Option<String>,
    pub provider_ref: Option<String>,
    /// Opaque last-seen provider response.
    pub provider_payload: Option<String>,
    #[sqlx(json)]
    pub metadata: OrderMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// The best-known reference to hand a provider's status endpoint: the provider payment id if
    /// we have one, else the client reference, else the order id itself.
    pub fn best_provider_reference(&self) -> &str {
        self.provider_payment_id
            .as_deref()
            .or(self.provider_ref.as_deref())
            .unwrap_or_else(|| self.id.as_str())
    }

    /// The amount a loan settlement captures: the pending balance while PAID, otherwise the
    /// settled amount.
    pub fn loanable_amount(&self) -> Option<MinorUnits> {
        self.pending_amount.or(self.settlement_amount)
    }
}

//--------------------------------------       NewOrder        -------------------------------------------------------
/// Seed data for a PENDING order. Order creation itself belongs to the (out-of-scope) payment
/// creation flow; this is the shape it hands the store.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub id: OrderId,
    pub partner_client_id: String,
    pub sub_merchant_id: String,
    pub provider: String,
    pub amount: MinorUnits,
    pub provider_ref: Option<String>,
    pub trx_expiration_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl NewOrder {
    pub fn new(id: OrderId, partner_client_id: &str, sub_merchant_id: &str, provider: &str, amount: MinorUnits) -> Self {
        Self {
            id,
            partner_client_id: partner_client_id.to_string(),
            sub_merchant_id: sub_merchant_id.to_string(),
            provider: provider.to_string(),
            amount,
            provider_ref: None,
            trx_expiration_time: None,
            created_at: Utc::now(),
        }
    }
}

//--------------------------------------     OrderMetadata     -------------------------------------------------------
/// The append-only audit bag embedded in `orders.metadata`.
///
/// Field names are pinned to the legacy persisted JSON (`loanSettlementHistory`,
/// `lastLoanSettlement`, `lastLoanSettlementRevert`) since revert logic reads historical entries
/// verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderMetadata {
    #[serde(default)]
    pub loan_settlement_history: Vec<LoanSettlementEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_loan_settlement: Option<LoanSettlementEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_loan_settlement_revert: Option<LoanRevertEntry>,
}

/// One forward (mark) audit entry. The snapshot on its own is sufficient to restore the order;
/// a revert never needs external lookups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanSettlementEntry {
    pub reason: String,
    pub previous_status: OrderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marked_by: Option<String>,
    pub marked_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub snapshot: SettlementSnapshot,
}

/// The complete pre-transition state of the settlement-relevant fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementSnapshot {
    pub status: OrderStatus,
    pub pending_amount: Option<MinorUnits>,
    pub settlement_status: Option<String>,
    pub settlement_amount: Option<MinorUnits>,
    pub settlement_time: Option<DateTime<Utc>>,
    pub loaned_at: Option<DateTime<Utc>>,
    /// The LoanEntry shadowing this order before the transition, if one existed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_loan_entry: Option<LoanEntrySnapshot>,
}

impl SettlementSnapshot {
    pub fn of(order: &Order, previous_loan_entry: Option<LoanEntrySnapshot>) -> Self {
        Self {
            status: order.status,
            pending_amount: order.pending_amount,
            settlement_status: order.settlement_status.clone(),
            settlement_amount: order.settlement_amount,
            settlement_time: order.settlement_time,
            loaned_at: order.loaned_at,
            previous_loan_entry,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanEntrySnapshot {
    pub sub_merchant_id: String,
    pub amount: MinorUnits,
    pub metadata: Value,
}

/// One backward (revert) audit entry, with a back-reference to the entry it undoes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanRevertEntry {
    pub reverted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reverted_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// The values this revert restored.
    pub restored: SettlementSnapshot,
    /// `marked_at` of the forward entry being reverted.
    pub reverts: DateTime<Utc>,
}

//--------------------------------------      LoanEntry        -------------------------------------------------------
/// One-to-one shadow of an order while it is in LN_SETTLED state.
#[derive(Debug, Clone, FromRow)]
pub struct LoanEntry {
    pub order_id: OrderId,
    pub sub_merchant_id: String,
    pub amount: MinorUnits,
    #[sqlx(json)]
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LoanEntry {
    pub fn snapshot(&self) -> LoanEntrySnapshot {
        LoanEntrySnapshot {
            sub_merchant_id: self.sub_merchant_id.clone(),
            amount: self.amount,
            metadata: self.metadata.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewLoanEntry {
    pub order_id: OrderId,
    pub sub_merchant_id: String,
    pub amount: MinorUnits,
    pub metadata: Value,
}

//--------------------------------------     CallbackJob       -------------------------------------------------------
/// A persisted outbound status notification. Created in the same transaction as the order
/// transition it reports; delivered by the dispatcher with at-least-once semantics.
#[derive(Debug, Clone, FromRow)]
pub struct CallbackJob {
    pub id: i64,
    pub order_id: OrderId,
    pub partner_client_id: String,
    pub url: String,
    pub payload: String,
    pub signature: String,
    pub attempts: i64,
    pub delivered: bool,
    pub last_error: Option<String>,
    pub status_code: Option<i64>,
    pub response_body: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCallbackJob {
    pub order_id: OrderId,
    pub partner_client_id: String,
    pub url: String,
    /// Serialized JSON, signed byte-for-byte. Receivers verify against these exact bytes.
    pub payload: String,
    pub signature: String,
}

/// Terminal copy of a job that exhausted its delivery attempts.
#[derive(Debug, Clone, FromRow)]
pub struct CallbackDeadLetter {
    pub id: i64,
    pub order_id: OrderId,
    pub partner_client_id: String,
    pub url: String,
    pub payload: String,
    pub signature: String,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub status_code: Option<i64>,
    pub response_body: Option<String>,
    pub created_at: DateTime<Utc>,
    pub dead_lettered_at: DateTime<Utc>,
}

/// What the dispatcher observed on one delivery attempt.
#[derive(Debug, Clone)]
pub struct DeliveryAttempt {
    pub delivered: bool,
    pub status_code: Option<u16>,
    pub error: Option<String>,
    pub response_body: Option<String>,
}

//--------------------------------------    PartnerClient      -------------------------------------------------------
/// Read-only view of the partner client directory. Configuration management is out of scope;
/// the engine only ever reads this table.
#[derive(Debug, Clone, FromRow)]
pub struct PartnerClient {
    pub id: String,
    pub callback_url: Option<String>,
    pub callback_secret: Option<String>,
}

impl PartnerClient {
    /// The callback destination, when the partner has one fully configured.
    pub fn callback_target(&self) -> Option<(&str, &str)> {
        match (self.callback_url.as_deref(), self.callback_secret.as_deref()) {
            (Some(url), Some(secret)) if !url.is_empty() && !secret.is_empty() => Some((url, secret)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn status_round_trip_and_alias() {
        for s in ["PENDING", "PAID", "SUCCESS", "DONE", "SETTLED", "LN_SETTLED", "FAILED", "CANCELLED", "EXPIRED"] {
            let status: OrderStatus = s.parse().unwrap();
            assert_eq!(status.as_str(), s);
        }
        // Legacy alias parses but is never written back
        let status: OrderStatus = "LN_SETTLE".parse().unwrap();
        assert_eq!(status, OrderStatus::LnSettled);
        assert_eq!(status.as_str(), "LN_SETTLED");
    }

    #[test]
    fn metadata_legacy_field_names() {
        let meta = OrderMetadata {
            loan_settlement_history: vec![LoanSettlementEntry {
                reason: "bulk loan settlement".to_string(),
                previous_status: OrderStatus::Paid,
                marked_by: Some("ops-1".to_string()),
                marked_at: Utc::now(),
                note: None,
                snapshot: SettlementSnapshot {
                    status: OrderStatus::Paid,
                    pending_amount: Some(MinorUnits::from(495)),
                    settlement_status: None,
                    settlement_amount: None,
                    settlement_time: None,
                    loaned_at: None,
                    previous_loan_entry: None,
                },
            }],
            last_loan_settlement: None,
            last_loan_settlement_revert: None,
        };
        let json = serde_json::to_value(&meta).unwrap();
        let history = json.get("loanSettlementHistory").expect("legacy field name must be kept");
        let entry = &history[0];
        assert_eq!(entry["previousStatus"], "PAID");
        assert_eq!(entry["markedBy"], "ops-1");
        assert_eq!(entry["snapshot"]["pendingAmount"], 495);
        let round: OrderMetadata = serde_json::from_value(json).unwrap();
        assert_eq!(round, meta);
    }
}
