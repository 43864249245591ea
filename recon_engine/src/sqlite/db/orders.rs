use log::trace;
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db_types::{NewOrder, Order, OrderId, OrderStatus},
    traits::{OrderRangeQuery, PaidOrderUpdate, PreparedLoanRevert, PreparedLoanSettlement, ReconBackendError},
};

/// Inserts a new PENDING order. Idempotent: returns `false` if the order id already exists.
pub async fn idempotent_insert(order: NewOrder, conn: &mut SqliteConnection) -> Result<bool, ReconBackendError> {
    let result = sqlx::query(
        r#"
            INSERT OR IGNORE INTO orders (
                id,
                partner_client_id,
                sub_merchant_id,
                provider,
                amount,
                provider_ref,
                trx_expiration_time,
                created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8);
        "#,
    )
    .bind(order.id)
    .bind(order.partner_client_id)
    .bind(order.sub_merchant_id)
    .bind(order.provider)
    .bind(order.amount.value())
    .bind(order.provider_ref)
    .bind(order.trx_expiration_time)
    .bind(order.created_at)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn fetch_order(id: &OrderId, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE id = $1").bind(id.as_str()).fetch_optional(conn).await?;
    Ok(order)
}

/// The PENDING → PAID compare-and-swap. Zero rows (a `None` return) means the order left PENDING
/// concurrently and this update lost the race.
pub async fn mark_paid(
    id: &OrderId,
    update: &PaidOrderUpdate,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, ReconBackendError> {
    let order = sqlx::query_as(
        r#"
            UPDATE orders SET
                status = 'PAID',
                pending_amount = $1,
                settlement_amount = NULL,
                settlement_status = NULL,
                settlement_time = NULL,
                fee_platform = $2,
                fee_provider = $3,
                payment_received_time = $4,
                provider_payment_id = COALESCE($5, provider_payment_id),
                provider_payload = COALESCE($6, provider_payload),
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $7 AND status = 'PENDING'
            RETURNING *;
        "#,
    )
    .bind(update.pending_amount.value())
    .bind(update.fee_platform.value())
    .bind(update.fee_provider.value())
    .bind(update.payment_received_time)
    .bind(update.provider_payment_id.as_deref())
    .bind(update.provider_payload.as_deref())
    .bind(id.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

/// The PENDING → terminal-failure compare-and-swap. Clears both the pending and the settlement
/// amount sets.
pub async fn mark_failed(
    id: &OrderId,
    new_status: OrderStatus,
    provider_payload: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, ReconBackendError> {
    let order = sqlx::query_as(
        r#"
            UPDATE orders SET
                status = $1,
                pending_amount = NULL,
                settlement_amount = NULL,
                settlement_status = NULL,
                settlement_time = NULL,
                provider_payload = COALESCE($2, provider_payload),
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $3 AND status = 'PENDING'
            RETURNING *;
        "#,
    )
    .bind(new_status.as_str())
    .bind(provider_payload)
    .bind(id.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

/// One page of a date-range query, keyset-paginated on `(created_at, id)` so rows sharing a
/// timestamp are returned exactly once across pages.
pub async fn fetch_page(query: &OrderRangeQuery, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    let mut builder = QueryBuilder::new("SELECT * FROM orders WHERE sub_merchant_id = ");
    builder.push_bind(query.sub_merchant_id.as_str());
    builder.push(" AND created_at >= ");
    builder.push_bind(query.start);
    builder.push(" AND created_at <= ");
    builder.push_bind(query.end);
    if !query.statuses.is_empty() {
        let statuses = query.statuses.iter().map(|s| format!("'{s}'")).collect::<Vec<_>>().join(",");
        builder.push(format!(" AND status IN ({statuses})"));
    }
    if let Some(cursor) = &query.after {
        builder.push(" AND (created_at > ");
        builder.push_bind(cursor.created_at);
        builder.push(" OR (created_at = ");
        builder.push_bind(cursor.created_at);
        builder.push(" AND id > ");
        builder.push_bind(cursor.id.as_str());
        builder.push("))");
    }
    builder.push(" ORDER BY created_at ASC, id ASC LIMIT ");
    builder.push_bind(i64::from(query.limit));
    trace!("📝️ Executing query: {}", builder.sql());
    let orders = builder.build_query_as::<Order>().fetch_all(conn).await?;
    Ok(orders)
}

/// The forced-settlement compare-and-swap for one prepared item. Returns the number of affected
/// rows: zero means the expected status no longer held.
pub async fn apply_loan_settlement(
    item: &PreparedLoanSettlement,
    conn: &mut SqliteConnection,
) -> Result<u64, ReconBackendError> {
    let metadata = serde_json::to_string(&item.metadata)?;
    let result = sqlx::query(
        r#"
            UPDATE orders SET
                status = 'LN_SETTLED',
                pending_amount = NULL,
                settlement_status = NULL,
                loaned_at = $1,
                metadata = $2,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $3 AND status = $4;
        "#,
    )
    .bind(item.loaned_at)
    .bind(metadata)
    .bind(item.order_id.as_str())
    .bind(item.expected_status.as_str())
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

/// The revert compare-and-swap: replays the snapshot over an order that is still LN_SETTLED.
pub async fn apply_loan_revert(
    item: &PreparedLoanRevert,
    conn: &mut SqliteConnection,
) -> Result<u64, ReconBackendError> {
    let metadata = serde_json::to_string(&item.metadata)?;
    let snap = &item.snapshot;
    let result = sqlx::query(
        r#"
            UPDATE orders SET
                status = $1,
                pending_amount = $2,
                settlement_status = $3,
                settlement_amount = $4,
                settlement_time = $5,
                loaned_at = $6,
                metadata = $7,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $8 AND status = 'LN_SETTLED';
        "#,
    )
    .bind(snap.status.as_str())
    .bind(snap.pending_amount.map(|m| m.value()))
    .bind(snap.settlement_status.as_deref())
    .bind(snap.settlement_amount.map(|m| m.value()))
    .bind(snap.settlement_time)
    .bind(snap.loaned_at)
    .bind(metadata)
    .bind(item.order_id.as_str())
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}
