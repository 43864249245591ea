use actix_web::{http::StatusCode, test::TestRequest, web, web::ServiceConfig};
use chrono::{TimeZone, Utc};
use recon_engine::{
    db_types::{CallbackDeadLetter, OrderId},
    events::EventProducers,
    ReconciliationApi,
};
use serde_json::Value;

use super::{
    helpers::{send_request, test_fee_schedule},
    mocks::MockBackend,
};
use crate::routes::DeadLettersRoute;

fn dead_letter() -> CallbackDeadLetter {
    let created = Utc.with_ymd_and_hms(2025, 3, 5, 3, 0, 0).unwrap();
    CallbackDeadLetter {
        id: 1,
        order_id: OrderId::from("ord-1".to_string()),
        partner_client_id: "partner-1".to_string(),
        url: "https://partner.test/callbacks".to_string(),
        payload: r#"{"order_id":"ord-1"}"#.to_string(),
        signature: "feedface".to_string(),
        attempts: 5,
        last_error: Some("HTTP 503".to_string()),
        status_code: Some(503),
        response_body: None,
        created_at: created,
        dead_lettered_at: created + chrono::Duration::minutes(30),
    }
}

fn configure_with(backend: MockBackend) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg: &mut ServiceConfig| {
        let api = ReconciliationApi::new(backend, EventProducers::default(), test_fee_schedule());
        cfg.app_data(web::Data::new(api)).service(DeadLettersRoute::<MockBackend>::new());
    }
}

#[actix_web::test]
async fn dead_letters_are_listed_for_inspection() {
    let mut backend = MockBackend::new();
    backend.expect_fetch_dead_letters().returning(|_| Ok(vec![dead_letter()]));
    let req = TestRequest::get().uri("/callbacks/dead-letters");
    let (status, body) = send_request(req, configure_with(backend)).await;
    assert_eq!(status, StatusCode::OK);
    let letters: Vec<Value> = serde_json::from_str(&body).unwrap();
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0]["order_id"], "ord-1");
    assert_eq!(letters[0]["attempts"], 5);
    assert_eq!(letters[0]["status_code"], 503);
    assert_eq!(letters[0]["last_error"], "HTTP 503");
}

#[actix_web::test]
async fn an_empty_queue_returns_an_empty_list() {
    let mut backend = MockBackend::new();
    backend.expect_fetch_dead_letters().returning(|_| Ok(Vec::new()));
    let req = TestRequest::get().uri("/callbacks/dead-letters");
    let (status, body) = send_request(req, configure_with(backend)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "[]");
}
