use std::{collections::HashMap, fmt::Debug};

use chrono::{DateTime, Utc};
use futures_util::{stream, StreamExt};
use log::*;
use provider_tools::{CallbackHmac, SignatureScheme};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{
        LoanRevertEntry,
        LoanSettlementEntry,
        NewCallbackJob,
        NewLoanEntry,
        Order,
        OrderId,
        OrderStatus,
        SettlementSnapshot,
    },
    events::{EventProducers, LoanRevertedEvent, LoanSettledEvent},
    rce_api::errors::ReconApiError,
    traits::{
        CallbackQueue,
        LoanItemOutcome,
        OrderRangeQuery,
        PreparedLoanRevert,
        PreparedLoanSettlement,
        RangeCursor,
        ReconBackend,
    },
};

/// Orders written per transaction.
const CHUNK_SIZE: usize = 50;
/// Chunk transactions in flight at once.
const MAX_PARALLEL_CHUNKS: usize = 4;
/// Rows per page when loading range-mode candidates.
const PAGE_SIZE: u32 = 200;

/// How the orders to settle are selected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LoanSelection {
    /// An explicit list. Every order must currently be PAID.
    Orders(Vec<OrderId>),
    /// Every settlement-bearing order for the sub-merchant in `[start, end]`.
    Range {
        sub_merchant_id: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanSettlementRequest {
    pub selection: LoanSelection,
    pub operator: Option<String>,
    pub note: Option<String>,
    /// Compute the summary without writing anything.
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanRevertRequest {
    pub sub_merchant_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub operator: Option<String>,
    pub note: Option<String>,
    /// Compute the would-be result without writing anything.
    #[serde(default)]
    pub export_only: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanItemFailure {
    pub order_id: OrderId,
    pub reason: String,
}

/// The per-item result of a bulk loan action. Never a bare boolean: every order that did not
/// transition is listed with the reason it was skipped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoanActionSummary {
    pub ok: Vec<OrderId>,
    pub failed: Vec<LoanItemFailure>,
}

impl LoanActionSummary {
    pub fn ok_count(&self) -> usize {
        self.ok.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    fn fail(&mut self, order_id: OrderId, reason: impl Into<String>) {
        self.failed.push(LoanItemFailure { order_id, reason: reason.into() });
    }
}

/// `LoanSettlementApi` handles the administrative bulk flows: forcing settlement-bearing orders
/// into `LN_SETTLED` and reverting them from their snapshots.
pub struct LoanSettlementApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for LoanSettlementApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LoanSettlementApi")
    }
}

impl<B> Clone for LoanSettlementApi<B>
where B: Clone
{
    fn clone(&self) -> Self {
        Self { db: self.db.clone(), producers: self.producers.clone() }
    }
}

impl<B> LoanSettlementApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }
}

impl<B> LoanSettlementApi<B>
where B: ReconBackend + CallbackQueue
{
    /// Force-settle a batch of orders.
    ///
    /// Idempotent on re-run: orders already `LN_SETTLED` count as ok without a second history
    /// entry. Ineligible orders become per-item failures and never abort their siblings.
    pub async fn mark_loan_settled(&self, request: LoanSettlementRequest) -> Result<LoanActionSummary, ReconApiError> {
        let mut summary = LoanActionSummary::default();
        let range_mode = matches!(request.selection, LoanSelection::Range { .. });
        let candidates = self.settlement_candidates(&request.selection, &mut summary).await?;
        let now = Utc::now();
        let mut prepared = Vec::with_capacity(candidates.len());
        for order in candidates {
            if order.status == OrderStatus::LnSettled {
                // Already settled by a previous run.
                summary.ok.push(order.id);
                continue;
            }
            let eligible = if range_mode { order.status.is_loan_settleable() } else { order.status == OrderStatus::Paid };
            if !eligible {
                summary.fail(order.id.clone(), format!("status {} is not eligible for loan settlement", order.status));
                continue;
            }
            let item = self.prepare_settlement(&order, &request, now).await?;
            prepared.push(item);
        }
        if request.dry_run {
            summary.ok.extend(prepared.into_iter().map(|p| p.order_id));
            debug!("💸️ Dry run: {} would settle, {} would fail", summary.ok_count(), summary.failed_count());
            return Ok(summary);
        }
        let entries: HashMap<OrderId, LoanSettlementEntry> =
            prepared.iter().map(|p| (p.order_id.clone(), p.entry.clone())).collect();
        let chunks: Vec<Vec<PreparedLoanSettlement>> = prepared.chunks(CHUNK_SIZE).map(<[_]>::to_vec).collect();
        let mut results = stream::iter(chunks)
            .map(|chunk| {
                let db = self.db.clone();
                async move { db.apply_loan_settlements(&chunk).await }
            })
            .buffered(MAX_PARALLEL_CHUNKS);
        while let Some(outcomes) = results.next().await {
            for outcome in outcomes? {
                match outcome {
                    LoanItemOutcome::Ok(id) => {
                        if let Some(entry) = entries.get(&id) {
                            self.notify_loan_settled(&id, entry).await?;
                        }
                        summary.ok.push(id);
                    },
                    LoanItemOutcome::RaceLost(id) => {
                        summary.fail(id, "order changed status concurrently");
                    },
                }
            }
        }
        info!("💸️ Loan settlement complete. {} ok, {} failed.", summary.ok_count(), summary.failed_count());
        Ok(summary)
    }

    /// Restore `LN_SETTLED` orders in the range from their `lastLoanSettlement` snapshots.
    pub async fn revert_loan_settled(&self, request: LoanRevertRequest) -> Result<LoanActionSummary, ReconApiError> {
        let mut summary = LoanActionSummary::default();
        let candidates = self
            .collect_range(&request.sub_merchant_id, request.start, request.end, vec![OrderStatus::LnSettled])
            .await?;
        let now = Utc::now();
        let mut prepared = Vec::with_capacity(candidates.len());
        for order in candidates {
            let forward = order
                .metadata
                .last_loan_settlement
                .clone()
                .or_else(|| order.metadata.loan_settlement_history.last().cloned());
            let Some(forward) = forward else {
                summary.fail(order.id.clone(), "no loan settlement snapshot to revert");
                continue;
            };
            prepared.push(prepare_revert(&order, &forward, &request, now));
        }
        if request.export_only {
            summary.ok.extend(prepared.into_iter().map(|p| p.order_id));
            debug!("💸️ Export only: {} would revert, {} would fail", summary.ok_count(), summary.failed_count());
            return Ok(summary);
        }
        let entries: HashMap<OrderId, LoanRevertEntry> =
            prepared.iter().map(|p| (p.order_id.clone(), p.entry.clone())).collect();
        let chunks: Vec<Vec<PreparedLoanRevert>> = prepared.chunks(CHUNK_SIZE).map(<[_]>::to_vec).collect();
        let mut results = stream::iter(chunks)
            .map(|chunk| {
                let db = self.db.clone();
                async move { db.apply_loan_reverts(&chunk).await }
            })
            .buffered(MAX_PARALLEL_CHUNKS);
        while let Some(outcomes) = results.next().await {
            for outcome in outcomes? {
                match outcome {
                    LoanItemOutcome::Ok(id) => {
                        if let Some(entry) = entries.get(&id) {
                            self.call_loan_reverted_hook(&id, entry).await?;
                        }
                        summary.ok.push(id);
                    },
                    LoanItemOutcome::RaceLost(id) => {
                        summary.fail(id, "order changed status concurrently");
                    },
                }
            }
        }
        info!("💸️ Loan revert complete. {} ok, {} failed.", summary.ok_count(), summary.failed_count());
        Ok(summary)
    }

    async fn settlement_candidates(
        &self,
        selection: &LoanSelection,
        summary: &mut LoanActionSummary,
    ) -> Result<Vec<Order>, ReconApiError> {
        match selection {
            LoanSelection::Orders(ids) => {
                let mut orders = Vec::with_capacity(ids.len());
                for id in ids {
                    match self.db.fetch_order(id).await? {
                        Some(order) => orders.push(order),
                        None => summary.fail(id.clone(), "order does not exist"),
                    }
                }
                Ok(orders)
            },
            LoanSelection::Range { sub_merchant_id, start, end } => {
                // LN_SETTLED is included so a re-run counts prior work as ok.
                let statuses = vec![
                    OrderStatus::Paid,
                    OrderStatus::Success,
                    OrderStatus::Done,
                    OrderStatus::Settled,
                    OrderStatus::LnSettled,
                ];
                self.collect_range(sub_merchant_id, *start, *end, statuses).await
            },
        }
    }

    async fn prepare_settlement(
        &self,
        order: &Order,
        request: &LoanSettlementRequest,
        now: DateTime<Utc>,
    ) -> Result<PreparedLoanSettlement, ReconApiError> {
        let previous_entry = self.db.fetch_loan_entry(&order.id).await?;
        let snapshot = SettlementSnapshot::of(order, previous_entry.map(|e| e.snapshot()));
        let entry = LoanSettlementEntry {
            reason: "loan settlement".to_string(),
            previous_status: order.status,
            marked_by: request.operator.clone(),
            marked_at: now,
            note: request.note.clone(),
            snapshot,
        };
        let mut metadata = order.metadata.clone();
        metadata.loan_settlement_history.push(entry.clone());
        metadata.last_loan_settlement = Some(entry.clone());
        let loan_entry = order.loanable_amount().filter(prc_common::MinorUnits::is_positive).map(|amount| NewLoanEntry {
            order_id: order.id.clone(),
            sub_merchant_id: order.sub_merchant_id.clone(),
            amount,
            metadata: serde_json::json!({
                "reason": entry.reason,
                "markedAt": entry.marked_at,
                "markedBy": entry.marked_by,
            }),
        });
        Ok(PreparedLoanSettlement {
            order_id: order.id.clone(),
            expected_status: order.status,
            loaned_at: now,
            metadata,
            entry,
            loan_entry,
        })
    }

    async fn collect_range(
        &self,
        sub_merchant_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        statuses: Vec<OrderStatus>,
    ) -> Result<Vec<Order>, ReconApiError> {
        let mut orders = Vec::new();
        let mut query = OrderRangeQuery::new(sub_merchant_id, start, end).with_statuses(statuses).with_limit(PAGE_SIZE);
        loop {
            let page = self.db.fetch_orders_page(&query).await?;
            let full_page = page.len() as u32 == PAGE_SIZE;
            if let Some(last) = page.last() {
                query = query.after(RangeCursor { created_at: last.created_at, id: last.id.clone() });
            }
            orders.extend(page);
            if !full_page {
                break;
            }
        }
        Ok(orders)
    }

    /// Post-transition work for one settled order: queue the partner notification and publish the
    /// `LoanSettledEvent`. The job row is written by the normal callback queue, so delivery and
    /// retry behave exactly as for payment notifications.
    async fn notify_loan_settled(&self, id: &OrderId, entry: &LoanSettlementEntry) -> Result<(), ReconApiError> {
        let Some(order) = self.db.fetch_order(id).await? else {
            warn!("💸️ Order [{id}] vanished after loan settlement. No notification sent.");
            return Ok(());
        };
        match self.db.fetch_partner(&order.partner_client_id).await? {
            Some(partner) => match partner.callback_target() {
                Some((url, secret)) => {
                    let job = build_settlement_callback_job(&order, entry, url, secret)?;
                    self.db.enqueue_callback(job).await?;
                },
                None => {
                    debug!("💸️ Partner {} has no callback target. Order [{}] settles silently.", partner.id, order.id);
                },
            },
            None => {
                warn!("💸️ Partner {} is not configured. Order [{}] settles without notification.", order.partner_client_id, order.id);
            },
        }
        for emitter in &self.producers.loan_settled_producer {
            emitter.publish_event(LoanSettledEvent { order: order.clone(), entry: entry.clone() }).await;
        }
        Ok(())
    }

    async fn call_loan_reverted_hook(&self, id: &OrderId, entry: &LoanRevertEntry) -> Result<(), ReconApiError> {
        if self.producers.loan_reverted_producer.is_empty() {
            return Ok(());
        }
        if let Some(order) = self.db.fetch_order(id).await? {
            for emitter in &self.producers.loan_reverted_producer {
                emitter.publish_event(LoanRevertedEvent { order: order.clone(), entry: entry.clone() }).await;
            }
        }
        Ok(())
    }
}

fn prepare_revert(
    order: &Order,
    forward: &LoanSettlementEntry,
    request: &LoanRevertRequest,
    now: DateTime<Utc>,
) -> PreparedLoanRevert {
    let entry = LoanRevertEntry {
        reverted_at: now,
        reverted_by: request.operator.clone(),
        note: request.note.clone(),
        restored: forward.snapshot.clone(),
        reverts: forward.marked_at,
    };
    let mut metadata = order.metadata.clone();
    metadata.last_loan_settlement = None;
    metadata.last_loan_settlement_revert = Some(entry.clone());
    PreparedLoanRevert { order_id: order.id.clone(), snapshot: forward.snapshot.clone(), metadata, entry }
}

/// Build the signed notification telling the partner an order was loan-settled. Same shape and
/// signing rules as the payment notification: random nonce for receiver-side dedup, HMAC over the
/// exact serialized bytes.
fn build_settlement_callback_job(
    order: &Order,
    entry: &LoanSettlementEntry,
    url: &str,
    secret: &str,
) -> Result<NewCallbackJob, ReconApiError> {
    let nonce: String = rand::thread_rng().sample_iter(&Alphanumeric).take(16).map(char::from).collect();
    let settled_amount = entry.snapshot.pending_amount.or(entry.snapshot.settlement_amount);
    let payload = serde_json::to_string(&serde_json::json!({
        "order_id": order.id,
        "sub_merchant_id": order.sub_merchant_id,
        "status": OrderStatus::LnSettled,
        "amount": order.amount,
        "settlement_amount": settled_amount,
        "marked_at": entry.marked_at,
        "nonce": nonce,
    }))?;
    let signature = CallbackHmac::new(secret).sign(payload.as_bytes());
    Ok(NewCallbackJob {
        order_id: order.id.clone(),
        partner_client_id: order.partner_client_id.clone(),
        url: url.to_string(),
        payload,
        signature,
    })
}
