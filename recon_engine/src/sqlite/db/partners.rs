use sqlx::SqliteConnection;

use crate::db_types::PartnerClient;

pub async fn fetch(id: &str, conn: &mut SqliteConnection) -> Result<Option<PartnerClient>, sqlx::Error> {
    let partner =
        sqlx::query_as("SELECT * FROM partner_clients WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(partner)
}

/// Seeds or updates a partner row. The directory is owned by the out-of-scope configuration
/// module; this exists for provisioning and tests.
pub async fn upsert(partner: &PartnerClient, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
            INSERT INTO partner_clients (id, callback_url, callback_secret)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE SET
                callback_url = excluded.callback_url,
                callback_secret = excluded.callback_secret;
        "#,
    )
    .bind(partner.id.as_str())
    .bind(partner.callback_url.as_deref())
    .bind(partner.callback_secret.as_deref())
    .execute(conn)
    .await?;
    Ok(())
}
