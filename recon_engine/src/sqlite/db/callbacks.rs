use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{CallbackDeadLetter, CallbackJob, DeliveryAttempt, NewCallbackJob, OrderId},
    traits::ReconBackendError,
};

pub async fn insert(job: NewCallbackJob, conn: &mut SqliteConnection) -> Result<CallbackJob, ReconBackendError> {
    let job = sqlx::query_as(
        r#"
            INSERT INTO callback_jobs (order_id, partner_client_id, url, payload, signature)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *;
        "#,
    )
    .bind(job.order_id.as_str())
    .bind(job.partner_client_id)
    .bind(job.url)
    .bind(job.payload)
    .bind(job.signature)
    .fetch_one(conn)
    .await?;
    Ok(job)
}

/// Whether any callback record exists for the order, in the active queue or the dead-letter
/// store. This is the dedup key for webhook idempotency and the poller's stand-down signal.
pub async fn recorded_for_order(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let (exists,): (bool,) = sqlx::query_as(
        r#"
            SELECT EXISTS (SELECT 1 FROM callback_jobs WHERE order_id = $1)
                OR EXISTS (SELECT 1 FROM callback_dead_letters WHERE order_id = $1);
        "#,
    )
    .bind(order_id.as_str())
    .fetch_one(conn)
    .await?;
    Ok(exists)
}

pub async fn fetch_due(limit: u32, max_attempts: i64, conn: &mut SqliteConnection) -> Result<Vec<CallbackJob>, sqlx::Error> {
    let jobs = sqlx::query_as(
        "SELECT * FROM callback_jobs WHERE delivered = 0 AND attempts < $1 ORDER BY created_at ASC LIMIT $2",
    )
    .bind(max_attempts)
    .bind(i64::from(limit))
    .fetch_all(conn)
    .await?;
    Ok(jobs)
}

pub async fn record_attempt(
    job_id: i64,
    attempt: &DeliveryAttempt,
    conn: &mut SqliteConnection,
) -> Result<CallbackJob, ReconBackendError> {
    let job: Option<CallbackJob> = sqlx::query_as(
        r#"
            UPDATE callback_jobs SET
                attempts = attempts + 1,
                delivered = $1,
                status_code = $2,
                last_error = $3,
                response_body = $4,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $5
            RETURNING *;
        "#,
    )
    .bind(attempt.delivered)
    .bind(attempt.status_code.map(i64::from))
    .bind(attempt.error.as_deref())
    .bind(attempt.response_body.as_deref())
    .bind(job_id)
    .fetch_optional(conn)
    .await?;
    job.ok_or(ReconBackendError::CallbackJobNotFound(job_id))
}

/// Copies an exhausted job into the dead-letter store and removes it from the active queue.
/// The caller wraps this in a transaction.
pub async fn dead_letter(job_id: i64, conn: &mut SqliteConnection) -> Result<CallbackDeadLetter, ReconBackendError> {
    let dead: Option<CallbackDeadLetter> = sqlx::query_as(
        r#"
            INSERT INTO callback_dead_letters
                (order_id, partner_client_id, url, payload, signature, attempts, last_error, status_code,
                 response_body, created_at)
            SELECT order_id, partner_client_id, url, payload, signature, attempts, last_error, status_code,
                 response_body, created_at
            FROM callback_jobs WHERE id = $1
            RETURNING *;
        "#,
    )
    .bind(job_id)
    .fetch_optional(&mut *conn)
    .await?;
    let dead = dead.ok_or(ReconBackendError::CallbackJobNotFound(job_id))?;
    sqlx::query("DELETE FROM callback_jobs WHERE id = $1").bind(job_id).execute(conn).await?;
    debug!("📮️ Callback job {job_id} for order {} moved to the dead-letter store", dead.order_id);
    Ok(dead)
}

pub async fn fetch_dead_letters(limit: u32, conn: &mut SqliteConnection) -> Result<Vec<CallbackDeadLetter>, sqlx::Error> {
    let rows = sqlx::query_as("SELECT * FROM callback_dead_letters ORDER BY dead_lettered_at DESC LIMIT $1")
        .bind(i64::from(limit))
        .fetch_all(conn)
        .await?;
    Ok(rows)
}
