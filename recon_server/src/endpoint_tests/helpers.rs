use std::sync::Arc;

use actix_web::{
    http::StatusCode,
    test,
    test::TestRequest,
    web::ServiceConfig,
    App,
};
use chrono::{TimeZone, Utc};
use futures::future::BoxFuture;
use prc_common::{MinorUnits, Secret};
use provider_tools::{ProviderApiError, ProviderConfig, ProviderId, ProviderPaymentStatus};
use recon_engine::{
    db_types::{Order, OrderId, OrderMetadata, OrderStatus},
    events::EventProducers,
    helpers::{FeeRate, FeeSchedule},
    ReconciliationApi,
    SqliteDatabase,
};

use crate::{providers::{ProviderRegistry, StatusSource}, status_poller::StatusPoller};

/// Builds the app from `configure`, fires the request, and returns status plus body.
pub async fn send_request<F>(req: TestRequest, configure: F) -> (StatusCode, String)
where F: FnOnce(&mut ServiceConfig) {
    let _ = env_logger::try_init().ok();
    let app = App::new().configure(configure);
    let service = test::init_service(app).await;
    let res = test::call_service(&service, req.to_request()).await;
    let status = res.status();
    let body = test::read_body(res).await;
    (status, String::from_utf8_lossy(&body).into_owned())
}

pub fn test_fee_schedule() -> FeeSchedule {
    FeeSchedule { weekday: FeeRate::new(1.0, 0), weekend: FeeRate::new(1.0, 0) }
}

/// Registry with only Hilogate configured, signing with `hilogate-secret`.
pub fn hilogate_registry() -> ProviderRegistry {
    let config = ProviderConfig::new(
        ProviderId::Hilogate,
        "https://api.hilogate.test",
        "merchant-1",
        Secret::new("hilogate-secret".to_string()),
    );
    ProviderRegistry::new(vec![config]).unwrap()
}

/// A status source for tests that never expect a poller query.
struct NeverSource;

impl StatusSource for NeverSource {
    fn payment_status<'a>(
        &'a self,
        _provider: &'a str,
        _reference: &'a str,
    ) -> BoxFuture<'a, Result<ProviderPaymentStatus, ProviderApiError>> {
        Box::pin(async { Err(ProviderApiError::RequestError("no status source in this test".to_string())) })
    }
}

/// A poller that never fires. Endpoint tests only need it present as app data.
pub async fn inert_poller() -> StatusPoller {
    let db = SqliteDatabase::new_in_memory().await.unwrap();
    let api = ReconciliationApi::new(db, EventProducers::default(), test_fee_schedule());
    StatusPoller::new(api, Arc::new(NeverSource), Vec::new())
}

pub fn pending_order(id: &OrderId) -> Order {
    let created = Utc.with_ymd_and_hms(2025, 3, 5, 2, 0, 0).unwrap();
    Order {
        id: id.clone(),
        partner_client_id: "partner-1".to_string(),
        sub_merchant_id: "sub-1".to_string(),
        provider: "hilogate".to_string(),
        status: OrderStatus::Pending,
        amount: MinorUnits::from(1000),
        pending_amount: None,
        settlement_amount: None,
        settlement_status: None,
        settlement_time: None,
        fee_platform: None,
        fee_provider: None,
        payment_received_time: None,
        trx_expiration_time: None,
        loaned_at: None,
        provider_payment_id: None,
        provider_ref: None,
        provider_payload: None,
        metadata: OrderMetadata::default(),
        created_at: created,
        updated_at: created,
    }
}
