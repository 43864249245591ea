use chrono::{DateTime, Utc};
use prc_common::MinorUnits;

use crate::db_types::{
    LoanRevertEntry,
    LoanSettlementEntry,
    NewLoanEntry,
    OrderId,
    OrderMetadata,
    OrderStatus,
    SettlementSnapshot,
};

//--------------------------------------   OrderRangeQuery     -------------------------------------------------------
/// Cursor for paging through a date range. Pages are ordered by `(created_at, id)` with the id as
/// a lexicographic tie-break, so rows sharing a timestamp are still returned exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeCursor {
    pub created_at: DateTime<Utc>,
    pub id: OrderId,
}

/// A bounded page request over a sub-merchant's orders. Cursor-based on purpose: offset paging
/// drifts under concurrent writes.
#[derive(Debug, Clone)]
pub struct OrderRangeQuery {
    pub sub_merchant_id: String,
    pub statuses: Vec<OrderStatus>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub after: Option<RangeCursor>,
    pub limit: u32,
}

impl OrderRangeQuery {
    pub fn new(sub_merchant_id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            sub_merchant_id: sub_merchant_id.to_string(),
            statuses: Vec::new(),
            start,
            end,
            after: None,
            limit: 100,
        }
    }

    pub fn with_statuses(mut self, statuses: Vec<OrderStatus>) -> Self {
        self.statuses = statuses;
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn after(mut self, cursor: RangeCursor) -> Self {
        self.after = Some(cursor);
        self
    }
}

//--------------------------------------   PaidOrderUpdate     -------------------------------------------------------
/// The field set written by the PENDING → PAID transition.
#[derive(Debug, Clone)]
pub struct PaidOrderUpdate {
    pub pending_amount: MinorUnits,
    pub fee_platform: MinorUnits,
    pub fee_provider: MinorUnits,
    pub payment_received_time: DateTime<Utc>,
    pub provider_payment_id: Option<String>,
    pub provider_payload: Option<String>,
}

//-------------------------------------- Prepared loan writes --------------------------------------------------------
/// A fully-resolved forced settlement for one order: the metadata with the history entry already
/// appended, the CAS guard, and the LoanEntry to upsert (when the captured amount is positive).
#[derive(Debug, Clone)]
pub struct PreparedLoanSettlement {
    pub order_id: OrderId,
    /// The status the order must still hold for the write to land.
    pub expected_status: OrderStatus,
    pub loaned_at: DateTime<Utc>,
    pub metadata: OrderMetadata,
    pub entry: LoanSettlementEntry,
    pub loan_entry: Option<NewLoanEntry>,
}

/// A fully-resolved revert for one LN_SETTLED order, replaying its snapshot.
#[derive(Debug, Clone)]
pub struct PreparedLoanRevert {
    pub order_id: OrderId,
    pub snapshot: SettlementSnapshot,
    pub metadata: OrderMetadata,
    pub entry: LoanRevertEntry,
}

/// Per-item result of a chunked loan write. A race loss is benign: some other transition won and
/// the item is reported, never retried blindly.
#[derive(Debug, Clone)]
pub enum LoanItemOutcome {
    Ok(OrderId),
    RaceLost(OrderId),
}

impl LoanItemOutcome {
    pub fn order_id(&self) -> &OrderId {
        match self {
            LoanItemOutcome::Ok(id) | LoanItemOutcome::RaceLost(id) => id,
        }
    }
}
