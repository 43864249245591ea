use actix_web::{http::StatusCode, test::TestRequest, web, web::ServiceConfig};
use prc_common::MinorUnits;
use provider_tools::{CallbackHmac, SignatureScheme};
use recon_engine::{
    db_types::{OrderId, OrderStatus, PartnerClient},
    events::EventProducers,
    ReconciliationApi,
};
use serde_json::Value;

use super::{
    helpers::{hilogate_registry, inert_poller, pending_order, send_request, test_fee_schedule},
    mocks::MockBackend,
};
use crate::{config::ServerConfig, routes::ProviderWebhookRoute, status_poller::StatusPoller};

const SUCCESS_BODY: &str = r#"{"order_id":"ord-1","status":"SUCCESS","amount":1000,"fee":25,"paid_at":"2025-03-05T03:00:00Z"}"#;

fn sign(body: &str) -> String {
    CallbackHmac::new("hilogate-secret").sign(body.as_bytes())
}

fn webhook(provider: &str, body: &str, signature: Option<&str>) -> TestRequest {
    let mut req = TestRequest::post().uri(&format!("/webhook/{provider}")).set_payload(body.to_string());
    if let Some(sig) = signature {
        req = req.insert_header(("X-Hilogate-Signature", sig));
    }
    req
}

fn configure_with(backend: MockBackend, poller: StatusPoller) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg: &mut ServiceConfig| {
        let mut config = ServerConfig::from_env_or_default();
        config.watch_on_pending_webhook = false;
        let api = ReconciliationApi::new(backend, EventProducers::default(), test_fee_schedule());
        cfg.app_data(web::Data::new(api))
            .app_data(web::Data::new(hilogate_registry()))
            .app_data(web::Data::new(poller))
            .app_data(web::Data::new(config))
            .service(ProviderWebhookRoute::<MockBackend>::new());
    }
}

#[actix_web::test]
async fn unknown_provider_is_rejected() {
    let poller = inert_poller().await;
    let req = webhook("paypal", SUCCESS_BODY, Some(&sign(SUCCESS_BODY)));
    let (status, body) = send_request(req, configure_with(MockBackend::new(), poller)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("Unknown provider"), "body: {body}");
}

#[actix_web::test]
async fn unconfigured_provider_is_a_server_error() {
    let poller = inert_poller().await;
    // Piro is a real provider, but the test registry only configures Hilogate.
    let req = webhook("piro", SUCCESS_BODY, None);
    let (status, body) = send_request(req, configure_with(MockBackend::new(), poller)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.contains("not configured"), "body: {body}");
}

#[actix_web::test]
async fn missing_signature_is_rejected_without_touching_the_store() {
    let poller = inert_poller().await;
    // No expectations on the mock: any store call would panic the test.
    let req = webhook("hilogate", SUCCESS_BODY, None);
    let (status, body) = send_request(req, configure_with(MockBackend::new(), poller)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("signature is invalid or missing"), "body: {body}");
}

#[actix_web::test]
async fn tampered_body_fails_verification() {
    let poller = inert_poller().await;
    let signature = sign(SUCCESS_BODY);
    let tampered = SUCCESS_BODY.replace("1000", "9000");
    let req = webhook("hilogate", &tampered, Some(&signature));
    let (status, _) = send_request(req, configure_with(MockBackend::new(), poller)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn verified_success_webhook_marks_the_order_paid() {
    let poller = inert_poller().await;
    let mut backend = MockBackend::new();
    backend.expect_fetch_order().returning(|id| Ok(Some(pending_order(id))));
    backend.expect_callback_recorded().returning(|_| Ok(false));
    backend.expect_fetch_partner().returning(|id| {
        Ok(Some(PartnerClient {
            id: id.to_string(),
            callback_url: Some("https://partner.test/callbacks".to_string()),
            callback_secret: Some("partner-secret".to_string()),
        }))
    });
    backend
        .expect_settle_order_paid()
        .withf(|_, update, callback| {
            // 1% of 1000, floored settlement, and a signed callback job alongside.
            update.fee_platform == MinorUnits::from(10) &&
                update.pending_amount == MinorUnits::from(990) &&
                update.fee_provider == MinorUnits::from(25) &&
                callback.as_ref().is_some_and(|job| {
                    CallbackHmac::new("partner-secret").verify(job.payload.as_bytes(), &job.signature)
                })
        })
        .returning(|id, update, _| {
            let mut order = pending_order(id);
            order.status = OrderStatus::Paid;
            order.pending_amount = Some(update.pending_amount);
            order.fee_platform = Some(update.fee_platform);
            Ok(Some(order))
        });
    let req = webhook("hilogate", SUCCESS_BODY, Some(&sign(SUCCESS_BODY)));
    let (status, body) = send_request(req, configure_with(backend, poller)).await;
    assert_eq!(status, StatusCode::OK);
    let response: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(response["success"], Value::Bool(true));
    assert_eq!(response["message"], "Order marked as paid.");
}

#[actix_web::test]
async fn replayed_webhook_is_acknowledged_without_a_second_transition() {
    let poller = inert_poller().await;
    let mut backend = MockBackend::new();
    backend.expect_fetch_order().returning(|id| Ok(Some(pending_order(id))));
    // A callback row already exists for the order, so the update is a no-op.
    backend.expect_callback_recorded().returning(|_| Ok(true));
    let req = webhook("hilogate", SUCCESS_BODY, Some(&sign(SUCCESS_BODY)));
    let (status, body) = send_request(req, configure_with(backend, poller)).await;
    assert_eq!(status, StatusCode::OK);
    let response: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(response["message"], "Order already processed.");
}

#[actix_web::test]
async fn webhook_for_an_unknown_order_is_not_found() {
    let poller = inert_poller().await;
    let mut backend = MockBackend::new();
    backend.expect_fetch_order().withf(|id| id == &OrderId::from("ord-1".to_string())).returning(|_| Ok(None));
    let req = webhook("hilogate", SUCCESS_BODY, Some(&sign(SUCCESS_BODY)));
    let (status, _) = send_request(req, configure_with(backend, poller)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
