use sqlx::SqliteConnection;

use crate::{
    db_types::{LoanEntry, LoanEntrySnapshot, NewLoanEntry, OrderId},
    traits::ReconBackendError,
};

/// Upserts the loan entry shadowing an order. The order id is the natural key, so re-marking an
/// order replaces its entry rather than duplicating it.
pub async fn upsert(entry: NewLoanEntry, conn: &mut SqliteConnection) -> Result<(), ReconBackendError> {
    let metadata = serde_json::to_string(&entry.metadata)?;
    sqlx::query(
        r#"
            INSERT INTO loan_entries (order_id, sub_merchant_id, amount, metadata)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (order_id) DO UPDATE SET
                sub_merchant_id = excluded.sub_merchant_id,
                amount = excluded.amount,
                metadata = excluded.metadata,
                updated_at = CURRENT_TIMESTAMP;
        "#,
    )
    .bind(entry.order_id.as_str())
    .bind(entry.sub_merchant_id)
    .bind(entry.amount.value())
    .bind(metadata)
    .execute(conn)
    .await?;
    Ok(())
}

/// Restores a loan entry from a snapshot taken before a prior forced settlement.
pub async fn restore_snapshot(
    order_id: &OrderId,
    snapshot: &LoanEntrySnapshot,
    conn: &mut SqliteConnection,
) -> Result<(), ReconBackendError> {
    let entry = NewLoanEntry {
        order_id: order_id.clone(),
        sub_merchant_id: snapshot.sub_merchant_id.clone(),
        amount: snapshot.amount,
        metadata: snapshot.metadata.clone(),
    };
    upsert(entry, conn).await
}

pub async fn fetch(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<Option<LoanEntry>, sqlx::Error> {
    let entry = sqlx::query_as("SELECT * FROM loan_entries WHERE order_id = $1")
        .bind(order_id.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(entry)
}

pub async fn delete(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let result =
        sqlx::query("DELETE FROM loan_entries WHERE order_id = $1").bind(order_id.as_str()).execute(conn).await?;
    Ok(result.rows_affected() > 0)
}
