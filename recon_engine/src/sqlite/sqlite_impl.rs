//! `SqliteDatabase` is the concrete SQLite backend for the reconciliation engine. It implements
//! the [`ReconBackend`] and [`CallbackQueue`] traits by composing the low-level functions in
//! [`super::db`] into transactions.
use std::fmt::Debug;

use log::*;
use sqlx::SqlitePool;

use super::db::{callbacks, create_schema, loans, new_pool, orders, partners};
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
    traits::{
        CallbackQueue,
        LoanItemOutcome,
        OrderRangeQuery,
        PaidOrderUpdate,
        PreparedLoanRevert,
        PreparedLoanSettlement,
        ReconBackend,
        ReconBackendError,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, ReconBackendError> {
        let pool = new_pool(url, max_connections).await?;
        create_schema(&pool).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    /// A fresh in-memory database. Used by tests and local tooling.
    pub async fn new_in_memory() -> Result<Self, ReconBackendError> {
        Self::new_with_url("sqlite::memory:", 1).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Seeds a partner client row (directory writes are otherwise out of scope).
    pub async fn upsert_partner(&self, partner: &PartnerClient) -> Result<(), ReconBackendError> {
        let mut conn = self.pool.acquire().await?;
        partners::upsert(partner, &mut conn).await?;
        Ok(())
    }
}

impl ReconBackend for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_order(&self, order: NewOrder) -> Result<bool, ReconBackendError> {
        let mut conn = self.pool.acquire().await?;
        let id = order.id.clone();
        let inserted = orders::idempotent_insert(order, &mut conn).await?;
        if inserted {
            debug!("🗃️ Order [{id}] saved as PENDING");
        } else {
            debug!("🗃️ Order [{id}] already exists. Insert skipped.");
        }
        Ok(inserted)
    }

    async fn fetch_order(&self, id: &OrderId) -> Result<Option<Order>, ReconBackendError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order(id, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_partner(&self, partner_client_id: &str) -> Result<Option<PartnerClient>, ReconBackendError> {
        let mut conn = self.pool.acquire().await?;
        let partner = partners::fetch(partner_client_id, &mut conn).await?;
        Ok(partner)
    }

    /// The order update and the callback job land in one transaction, so a crash can never leave
    /// a PAID order without its pending notification (or vice versa). Delivery happens later.
    async fn settle_order_paid(
        &self,
        id: &OrderId,
        update: PaidOrderUpdate,
        callback: Option<NewCallbackJob>,
    ) -> Result<Option<Order>, ReconBackendError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::mark_paid(id, &update, &mut tx).await?;
        if order.is_some() {
            if let Some(job) = callback {
                let job = callbacks::insert(job, &mut tx).await?;
                debug!("🗃️ Callback job {} enqueued for order [{id}]", job.id);
            }
            debug!("🗃️ Order [{id}] marked PAID, pending {}", update.pending_amount);
        } else {
            debug!("🗃️ Order [{id}] was not PENDING anymore. Paid transition lost the race.");
        }
        tx.commit().await?;
        Ok(order)
    }

    async fn fail_order(
        &self,
        id: &OrderId,
        new_status: OrderStatus,
        provider_payload: Option<String>,
    ) -> Result<Option<Order>, ReconBackendError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::mark_failed(id, new_status, provider_payload.as_deref(), &mut conn).await?;
        if order.is_some() {
            debug!("🗃️ Order [{id}] marked {new_status}");
        }
        Ok(order)
    }

    async fn fetch_orders_page(&self, query: &OrderRangeQuery) -> Result<Vec<Order>, ReconBackendError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::fetch_page(query, &mut conn).await?;
        Ok(orders)
    }

    async fn fetch_loan_entry(&self, order_id: &OrderId) -> Result<Option<LoanEntry>, ReconBackendError> {
        let mut conn = self.pool.acquire().await?;
        let entry = loans::fetch(order_id, &mut conn).await?;
        Ok(entry)
    }

    async fn apply_loan_settlements(
        &self,
        items: &[PreparedLoanSettlement],
    ) -> Result<Vec<LoanItemOutcome>, ReconBackendError> {
        let mut tx = self.pool.begin().await?;
        let mut outcomes = Vec::with_capacity(items.len());
        for item in items {
            let rows = orders::apply_loan_settlement(item, &mut tx).await?;
            if rows == 0 {
                debug!("🗃️ Order [{}] changed concurrently. Loan settlement skipped.", item.order_id);
                outcomes.push(LoanItemOutcome::RaceLost(item.order_id.clone()));
                continue;
            }
            if let Some(entry) = &item.loan_entry {
                loans::upsert(entry.clone(), &mut tx).await?;
            }
            outcomes.push(LoanItemOutcome::Ok(item.order_id.clone()));
        }
        tx.commit().await?;
        Ok(outcomes)
    }

    async fn apply_loan_reverts(
        &self,
        items: &[PreparedLoanRevert],
    ) -> Result<Vec<LoanItemOutcome>, ReconBackendError> {
        let mut tx = self.pool.begin().await?;
        let mut outcomes = Vec::with_capacity(items.len());
        for item in items {
            let rows = orders::apply_loan_revert(item, &mut tx).await?;
            if rows == 0 {
                debug!("🗃️ Order [{}] is no longer LN_SETTLED. Revert skipped.", item.order_id);
                outcomes.push(LoanItemOutcome::RaceLost(item.order_id.clone()));
                continue;
            }
            match &item.snapshot.previous_loan_entry {
                Some(snapshot) => loans::restore_snapshot(&item.order_id, snapshot, &mut tx).await?,
                None => {
                    loans::delete(&item.order_id, &mut tx).await?;
                },
            }
            outcomes.push(LoanItemOutcome::Ok(item.order_id.clone()));
        }
        tx.commit().await?;
        Ok(outcomes)
    }

    async fn close(&mut self) -> Result<(), ReconBackendError> {
        self.pool.close().await;
        Ok(())
    }
}

impl CallbackQueue for SqliteDatabase {
    async fn enqueue_callback(&self, job: NewCallbackJob) -> Result<CallbackJob, ReconBackendError> {
        let mut conn = self.pool.acquire().await?;
        let job = callbacks::insert(job, &mut conn).await?;
        debug!("🗃️ Callback job {} enqueued for order [{}]", job.id, job.order_id);
        Ok(job)
    }

    async fn callback_recorded(&self, order_id: &OrderId) -> Result<bool, ReconBackendError> {
        let mut conn = self.pool.acquire().await?;
        let recorded = callbacks::recorded_for_order(order_id, &mut conn).await?;
        Ok(recorded)
    }

    async fn fetch_due_callbacks(&self, limit: u32, max_attempts: i64) -> Result<Vec<CallbackJob>, ReconBackendError> {
        let mut conn = self.pool.acquire().await?;
        let jobs = callbacks::fetch_due(limit, max_attempts, &mut conn).await?;
        Ok(jobs)
    }

    async fn record_callback_attempt(
        &self,
        job_id: i64,
        attempt: DeliveryAttempt,
    ) -> Result<CallbackJob, ReconBackendError> {
        let mut conn = self.pool.acquire().await?;
        let job = callbacks::record_attempt(job_id, &attempt, &mut conn).await?;
        Ok(job)
    }

    async fn dead_letter_callback(&self, job_id: i64) -> Result<CallbackDeadLetter, ReconBackendError> {
        let mut tx = self.pool.begin().await?;
        let dead = callbacks::dead_letter(job_id, &mut tx).await?;
        tx.commit().await?;
        Ok(dead)
    }

    async fn fetch_dead_letters(&self, limit: u32) -> Result<Vec<CallbackDeadLetter>, ReconBackendError> {
        let mut conn = self.pool.acquire().await?;
        let rows = callbacks::fetch_dead_letters(limit, &mut conn).await?;
        Ok(rows)
    }
}
