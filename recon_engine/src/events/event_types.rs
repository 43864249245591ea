use serde::{Deserialize, Serialize};

use crate::db_types::{LoanRevertEntry, LoanSettlementEntry, Order, OrderStatus};

/// An order moved PENDING → PAID through webhook ingestion or the fallback poller.
#[derive(Debug, Clone)]
pub struct OrderPaidEvent {
    pub order: Order,
}

impl OrderPaidEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

/// An order reached a terminal failure state.
#[derive(Debug, Clone)]
pub struct OrderFailedEvent {
    pub order: Order,
    pub status: OrderStatus,
}

impl OrderFailedEvent {
    pub fn new(order: Order) -> Self {
        let status = order.status;
        Self { order, status }
    }
}

/// One order was force-settled by the loan settlement flow. Consumed by the audit-log sink and
/// by the callback producer hook.
#[derive(Debug, Clone)]
pub struct LoanSettledEvent {
    pub order: Order,
    pub entry: LoanSettlementEntry,
}

/// One LN_SETTLED order was restored from its snapshot.
#[derive(Debug, Clone)]
pub struct LoanRevertedEvent {
    pub order: Order,
    pub entry: LoanRevertEntry,
}

/// The admin-log record emitted once per administrative bulk action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkActionRecord {
    pub action: String,
    pub sub_merchant_id: Option<String>,
    pub operator: Option<String>,
    pub ok_count: usize,
    pub failed_count: usize,
}
