use std::fmt::Debug;

use chrono::Utc;
use log::*;
use prc_common::MinorUnits;
use provider_tools::{CallbackHmac, ProviderPaymentStatus, SettlementOutcome, SignatureScheme};
use rand::{distributions::Alphanumeric, Rng};

use crate::{
    db_types::{NewCallbackJob, Order, OrderId, OrderStatus},
    events::{EventProducers, OrderFailedEvent, OrderPaidEvent},
    helpers::{compute_fee, FeeSchedule},
    rce_api::errors::ReconApiError,
    traits::{CallbackQueue, PaidOrderUpdate, ReconBackend},
};

/// What a single provider status update did to an order.
#[derive(Debug, Clone)]
pub enum ProviderUpdateResult {
    /// PENDING → PAID landed; the callback job (if any) is persisted alongside it.
    Paid(Order),
    /// PENDING → a terminal failure state landed.
    Failed(Order),
    /// The order already left PENDING, or a callback record exists for it. Nothing was touched.
    AlreadyProcessed,
    /// The provider status word is not in the terminal vocabulary. Nothing was touched.
    Ignored,
    /// A concurrent transition won the compare-and-swap between our read and our write.
    RaceLost,
}

/// `ReconciliationApi` is the single code path that turns a provider's view of a payment into an
/// order transition. Webhook ingestion and the fallback poller both call
/// [`Self::process_provider_update`], so fees, idempotency and callback enqueueing cannot drift
/// between the two.
pub struct ReconciliationApi<B> {
    db: B,
    producers: EventProducers,
    fee_schedule: FeeSchedule,
}

impl<B> Debug for ReconciliationApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReconciliationApi")
    }
}

impl<B> Clone for ReconciliationApi<B>
where B: Clone
{
    fn clone(&self) -> Self {
        Self { db: self.db.clone(), producers: self.producers.clone(), fee_schedule: self.fee_schedule }
    }
}

impl<B> ReconciliationApi<B> {
    pub fn new(db: B, producers: EventProducers, fee_schedule: FeeSchedule) -> Self {
        Self { db, producers, fee_schedule }
    }

    pub fn fee_schedule(&self) -> FeeSchedule {
        self.fee_schedule
    }
}

impl<B> ReconciliationApi<B>
where B: ReconBackend + CallbackQueue
{
    pub fn db(&self) -> &B {
        &self.db
    }

    /// Apply one verified provider status to an order.
    ///
    /// The caller has already authenticated the source (webhook signature, or a trusted poller
    /// query). This method owns everything downstream: idempotency, vocabulary mapping, fee
    /// computation, the conditional transition, and the transactional callback enqueue.
    pub async fn process_provider_update(
        &self,
        order_id: &OrderId,
        status: &ProviderPaymentStatus,
    ) -> Result<ProviderUpdateResult, ReconApiError> {
        let order =
            self.db.fetch_order(order_id).await?.ok_or_else(|| ReconApiError::OrderNotFound(order_id.clone()))?;
        if order.status != OrderStatus::Pending || self.db.callback_recorded(order_id).await? {
            debug!("🔁️📦️ Order [{order_id}] is already processed ({}). Skipping.", order.status);
            return Ok(ProviderUpdateResult::AlreadyProcessed);
        }
        match status.outcome() {
            SettlementOutcome::Unknown => {
                debug!("🔁️📦️ Provider status '{}' for order [{order_id}] is not terminal. No-op.", status.status);
                Ok(ProviderUpdateResult::Ignored)
            },
            SettlementOutcome::Success => self.settle_paid(order, status).await,
            SettlementOutcome::Failure => self.settle_failed(order, status).await,
        }
    }

    async fn settle_paid(&self, order: Order, status: &ProviderPaymentStatus) -> Result<ProviderUpdateResult, ReconApiError> {
        let gross = status.gross_amount.map(MinorUnits::from).unwrap_or(order.amount);
        let received = status.payment_received_time.unwrap_or_else(Utc::now);
        let breakdown = compute_fee(gross, self.fee_schedule.rate_for(received));
        let update = PaidOrderUpdate {
            pending_amount: breakdown.settlement,
            fee_platform: breakdown.fee,
            fee_provider: MinorUnits::from(status.provider_fee.unwrap_or(0)),
            payment_received_time: received,
            provider_payment_id: status.payment_id.clone(),
            provider_payload: serde_json::to_string(&status.raw).ok(),
        };
        let partner = self
            .db
            .fetch_partner(&order.partner_client_id)
            .await?
            .ok_or_else(|| ReconApiError::PartnerConfigMissing(order.partner_client_id.clone()))?;
        let callback = match partner.callback_target() {
            Some((url, secret)) => Some(build_callback_job(&order, &update, url, secret)?),
            None => {
                info!("🔁️📦️ Partner {} has no callback target. Order [{}] settles silently.", partner.id, order.id);
                None
            },
        };
        match self.db.settle_order_paid(&order.id, update, callback).await? {
            Some(updated) => {
                debug!(
                    "🔁️📦️ Order [{}] marked PAID. Fee {}, pending {}.",
                    updated.id,
                    breakdown.fee,
                    breakdown.settlement
                );
                self.call_order_paid_hook(&updated).await;
                Ok(ProviderUpdateResult::Paid(updated))
            },
            None => {
                info!("🔁️📦️ Lost the race marking order [{}] PAID. Another transition won.", order.id);
                Ok(ProviderUpdateResult::RaceLost)
            },
        }
    }

    async fn settle_failed(&self, order: Order, status: &ProviderPaymentStatus) -> Result<ProviderUpdateResult, ReconApiError> {
        let new_status = failure_status(&status.status);
        let payload = serde_json::to_string(&status.raw).ok();
        match self.db.fail_order(&order.id, new_status, payload).await? {
            Some(updated) => {
                debug!("🔁️📦️ Order [{}] moved to {new_status}.", updated.id);
                self.call_order_failed_hook(&updated).await;
                Ok(ProviderUpdateResult::Failed(updated))
            },
            None => {
                info!("🔁️📦️ Lost the race failing order [{}]. Another transition won.", order.id);
                Ok(ProviderUpdateResult::RaceLost)
            },
        }
    }

    async fn call_order_paid_hook(&self, order: &Order) {
        for emitter in &self.producers.order_paid_producer {
            trace!("🔁️📦️ Notifying order paid hook subscribers");
            emitter.publish_event(OrderPaidEvent::new(order.clone())).await;
        }
    }

    async fn call_order_failed_hook(&self, order: &Order) {
        for emitter in &self.producers.order_failed_producer {
            trace!("🔁️📦️ Notifying order failed hook subscribers");
            emitter.publish_event(OrderFailedEvent::new(order.clone())).await;
        }
    }
}

/// Map a terminal failure word onto the canonical failure status.
pub fn failure_status(raw: &str) -> OrderStatus {
    match raw.trim().to_ascii_uppercase().as_str() {
        "EXPIRED" => OrderStatus::Expired,
        "CANCELLED" | "VOID" => OrderStatus::Cancelled,
        _ => OrderStatus::Failed,
    }
}

/// Build the signed notification for a freshly paid order. The payload carries a random nonce so
/// receivers can deduplicate at-least-once delivery, and the signature is computed over the exact
/// serialized bytes that will be POSTed.
fn build_callback_job(
    order: &Order,
    update: &PaidOrderUpdate,
    url: &str,
    secret: &str,
) -> Result<NewCallbackJob, ReconApiError> {
    let nonce: String = rand::thread_rng().sample_iter(&Alphanumeric).take(16).map(char::from).collect();
    let payload = serde_json::to_string(&serde_json::json!({
        "order_id": order.id,
        "sub_merchant_id": order.sub_merchant_id,
        "status": OrderStatus::Paid,
        "amount": order.amount,
        "fee_platform": update.fee_platform,
        "settlement_amount": update.pending_amount,
        "payment_received_time": update.payment_received_time,
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
