use thiserror::Error;

use crate::{
    db_types::{
        CallbackDeadLetter,
        CallbackJob,
        DeliveryAttempt,
        LoanEntry,
        NewCallbackJob,
        NewOrder,
        Order,
        OrderId,
        OrderStatus,
        PartnerClient,
    },
    traits::{LoanItemOutcome, OrderRangeQuery, PaidOrderUpdate, PreparedLoanRevert, PreparedLoanSettlement},
};

/// The order-store contract for the reconciliation engine.
///
/// Every mutation is a conditional (compare-and-swap) write keyed on the order id and its expected
/// current status. A `None`/`RaceLost` result means zero rows were affected: some concurrent
/// transition won, and the caller reports a benign per-item failure instead of retrying.
#[allow(async_fn_in_trait)]
pub trait ReconBackend: Clone {
    /// The URL of the backing store.
    fn url(&self) -> &str;

    /// Inserts a PENDING order. The entry point used by the (out-of-scope) payment-creation flow
    /// and by tests. Idempotent: returns `false` if the order already existed.
    async fn insert_order(&self, order: NewOrder) -> Result<bool, ReconBackendError>;

    async fn fetch_order(&self, id: &OrderId) -> Result<Option<Order>, ReconBackendError>;

    /// Looks up the partner client owning an order. A missing row is a configuration error that
    /// the caller maps to PartnerConfigMissing.
    async fn fetch_partner(&self, partner_client_id: &str) -> Result<Option<PartnerClient>, ReconBackendError>;

    /// CAS transition PENDING → PAID, setting the pending balance, fees and payment timestamps.
    /// When `callback` is given, the job row is persisted in the same transaction as the order
    /// update; delivery happens later, never inside this call.
    async fn settle_order_paid(
        &self,
        id: &OrderId,
        update: PaidOrderUpdate,
        callback: Option<NewCallbackJob>,
    ) -> Result<Option<Order>, ReconBackendError>;

    /// CAS transition PENDING → a terminal failure status, clearing pending and settlement
    /// amounts.
    async fn fail_order(
        &self,
        id: &OrderId,
        new_status: OrderStatus,
        provider_payload: Option<String>,
    ) -> Result<Option<Order>, ReconBackendError>;

    /// One page of a cursor-paginated range fetch, ordered by `(created_at, id)`.
    async fn fetch_orders_page(&self, query: &OrderRangeQuery) -> Result<Vec<Order>, ReconBackendError>;

    async fn fetch_loan_entry(&self, order_id: &OrderId) -> Result<Option<LoanEntry>, ReconBackendError>;

    /// Applies one chunk of prepared forced settlements inside a single transaction. A per-item
    /// race loss is recorded in the outcome list and does not roll back sibling items; only
    /// store-level errors abort the chunk.
    async fn apply_loan_settlements(
        &self,
        items: &[PreparedLoanSettlement],
    ) -> Result<Vec<LoanItemOutcome>, ReconBackendError>;

    /// Applies one chunk of prepared reverts inside a single transaction, restoring each order
    /// and its LoanEntry exactly from the snapshot. Same isolation contract as
    /// [`Self::apply_loan_settlements`].
    async fn apply_loan_reverts(
        &self,
        items: &[PreparedLoanRevert],
    ) -> Result<Vec<LoanItemOutcome>, ReconBackendError>;

    /// Closes the store connection.
    async fn close(&mut self) -> Result<(), ReconBackendError> {
        Ok(())
    }
}

/// The outbound callback queue contract: a single-purpose, at-least-once delivery queue for
/// status notifications.
#[allow(async_fn_in_trait)]
pub trait CallbackQueue: Clone {
    /// Persists a signed job outside of an order transition (used by loan-settlement event
    /// hooks; webhook ingestion enqueues transactionally via
    /// [`ReconBackend::settle_order_paid`]).
    async fn enqueue_callback(&self, job: NewCallbackJob) -> Result<CallbackJob, ReconBackendError>;

    /// Whether any callback job (active or dead-lettered) exists for the order. The existence of
    /// such a record is the dedup key for webhook idempotency and tells the fallback poller to
    /// stand down.
    async fn callback_recorded(&self, order_id: &OrderId) -> Result<bool, ReconBackendError>;

    /// Undelivered jobs with attempts below the ceiling, oldest first.
    async fn fetch_due_callbacks(&self, limit: u32, max_attempts: i64) -> Result<Vec<CallbackJob>, ReconBackendError>;

    /// Records one delivery attempt and returns the updated job.
    async fn record_callback_attempt(
        &self,
        job_id: i64,
        attempt: DeliveryAttempt,
    ) -> Result<CallbackJob, ReconBackendError>;

    /// Moves an exhausted job to the dead-letter store and removes it from the active queue, in
    /// one transaction. Dead letters are terminal.
    async fn dead_letter_callback(&self, job_id: i64) -> Result<CallbackDeadLetter, ReconBackendError>;

    /// Dead letters, newest first, for operator inspection.
    async fn fetch_dead_letters(&self, limit: u32) -> Result<Vec<CallbackDeadLetter>, ReconBackendError>;
}

#[derive(Debug, Clone, Error)]
pub enum ReconBackendError {
    #[error("Internal database engine error: {0}")]
    DatabaseError(String),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("The requested callback job {0} does not exist")]
    CallbackJobNotFound(i64),
    #[error("Could not serialize metadata: {0}")]
    MetadataError(String),
}

impl From<sqlx::Error> for ReconBackendError {
    fn from(e: sqlx::Error) -> Self {
        ReconBackendError::DatabaseError(e.to_string())
    }
}

impl From<serde_json::Error> for ReconBackendError {
    fn from(e: serde_json::Error) -> Self {
        ReconBackendError::MetadataError(e.to_string())
    }
}
