//! Delivers queued callback jobs to partner endpoints.
//!
//! At-least-once, no ordering across jobs. Receivers deduplicate on the nonce inside the signed
//! payload. A job that exhausts its attempts moves to the dead-letter store and stays there until
//! an operator intervenes.
use log::*;
use recon_engine::{
    db_types::{CallbackJob, DeliveryAttempt},
    traits::CallbackQueue,
    SqliteDatabase,
};
use reqwest::Client;
use tokio::task::JoinHandle;

use crate::config::DispatcherConfig;

pub const CALLBACK_SIGNATURE_HEADER: &str = "X-Callback-Signature";

/// Starts the dispatch loop. Do not await the returned JoinHandle, as it will run indefinitely.
pub fn start_dispatcher(db: SqliteDatabase, config: DispatcherConfig) -> JoinHandle<()> {
    tokio::spawn(async move {
        let client = match Client::builder().timeout(config.request_timeout).build() {
            Ok(client) => client,
            Err(e) => {
                error!("📮️ Could not build the callback HTTP client. Dispatcher disabled. {e}");
                return;
            },
        };
        let mut timer = tokio::time::interval(config.interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!("📮️ Callback dispatcher started (every {:?}, {} attempts max)", config.interval, config.max_attempts);
        loop {
            timer.tick().await;
            if let Err(e) = dispatch_due(&db, &client, &config).await {
                error!("📮️ Error in the callback dispatch cycle: {e}");
            }
        }
    })
}

async fn dispatch_due(
    db: &SqliteDatabase,
    client: &Client,
    config: &DispatcherConfig,
) -> Result<(), recon_engine::traits::ReconBackendError> {
    let due = db.fetch_due_callbacks(config.batch_size, config.max_attempts).await?;
    if due.is_empty() {
        return Ok(());
    }
    debug!("📮️ {} callback jobs due for delivery", due.len());
    for job in due {
        let attempt = attempt_delivery(client, &job).await;
        let delivered = attempt.delivered;
        let updated = db.record_callback_attempt(job.id, attempt).await?;
        if delivered {
            info!("📮️ Callback for order [{}] delivered on attempt {}", updated.order_id, updated.attempts);
        } else if updated.attempts >= config.max_attempts {
            warn!(
                "📮️ Callback for order [{}] exhausted its {} attempts. Dead-lettering.",
                updated.order_id, config.max_attempts
            );
            db.dead_letter_callback(updated.id).await?;
        } else {
            debug!(
                "📮️ Callback for order [{}] failed attempt {}/{}. Will retry.",
                updated.order_id, updated.attempts, config.max_attempts
            );
        }
    }
    Ok(())
}

/// One POST to the partner. Any 2xx counts as delivered; everything else, including transport
/// errors, is recorded for the retry bookkeeping.
async fn attempt_delivery(client: &Client, job: &CallbackJob) -> DeliveryAttempt {
    let response = client
        .post(&job.url)
        .header("Content-Type", "application/json")
        .header(CALLBACK_SIGNATURE_HEADER, &job.signature)
        .body(job.payload.clone())
        .send()
        .await;
    match response {
        Ok(res) => {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            DeliveryAttempt {
                delivered: status.is_success(),
                status_code: Some(status.as_u16()),
                error: (!status.is_success()).then(|| format!("received status {status}")),
                response_body: (!body.is_empty()).then_some(body),
            }
        },
        Err(e) => {
            debug!("📮️ Callback POST to {} failed: {e}", job.url);
            DeliveryAttempt { delivered: false, status_code: None, error: Some(e.to_string()), response_body: None }
        },
    }
}
