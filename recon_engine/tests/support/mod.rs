use chrono::{DateTime, TimeZone, Utc};
use prc_common::MinorUnits;
use provider_tools::ProviderPaymentStatus;
use recon_engine::{
    db_types::{NewOrder, OrderId, PartnerClient},
    SqliteDatabase,
};

pub async fn new_db() -> SqliteDatabase {
    let _ = env_logger::try_init();
    SqliteDatabase::new_in_memory().await.expect("Error creating in-memory database")
}

pub async fn seed_partner(db: &SqliteDatabase, id: &str, callback: Option<(&str, &str)>) {
    let partner = PartnerClient {
        id: id.to_string(),
        callback_url: callback.map(|(url, _)| url.to_string()),
        callback_secret: callback.map(|(_, secret)| secret.to_string()),
    };
    db.upsert_partner(&partner).await.expect("Error seeding partner");
}

pub async fn seed_order(db: &SqliteDatabase, id: &str, partner: &str, sub_merchant: &str, amount: i64) {
    seed_order_at(db, id, partner, sub_merchant, amount, Utc::now()).await;
}

pub async fn seed_order_at(
    db: &SqliteDatabase,
    id: &str,
    partner: &str,
    sub_merchant: &str,
    amount: i64,
    created_at: DateTime<Utc>,
) {
    use recon_engine::traits::ReconBackend;
    let mut order = NewOrder::new(OrderId::from(id.to_string()), partner, sub_merchant, "piro", MinorUnits::from(amount));
    order.created_at = created_at;
    let inserted = db.insert_order(order).await.expect("Error inserting order");
    assert!(inserted, "order {id} already existed");
}

/// A provider success response received mid-week (Wednesday in the Asia/Jakarta calendar).
pub fn weekday_success(amount: i64) -> ProviderPaymentStatus {
    ProviderPaymentStatus {
        status: "SUCCESS".to_string(),
        gross_amount: Some(amount),
        provider_fee: Some(2),
        payment_received_time: Some(Utc.with_ymd_and_hms(2025, 3, 5, 3, 0, 0).unwrap()),
        payment_id: Some("prov-pay-1".to_string()),
        raw: serde_json::json!({"status": "SUCCESS", "amount": amount}),
    }
}

pub fn provider_status(word: &str) -> ProviderPaymentStatus {
    ProviderPaymentStatus {
        status: word.to_string(),
        gross_amount: None,
        provider_fee: None,
        payment_received_time: None,
        payment_id: None,
        raw: serde_json::json!({"status": word}),
    }
}
