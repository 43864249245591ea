//! End-to-end tests for the reconciliation flow API against an in-memory SQLite backend.
use std::collections::BTreeSet;

use chrono::Utc;
use prc_common::MinorUnits;
use provider_tools::{signing::SignatureScheme, CallbackHmac};
use recon_engine::{
    db_types::{OrderId, OrderStatus},
    events::EventProducers,
    helpers::{FeeRate, FeeSchedule},
    traits::{CallbackQueue, OrderRangeQuery, RangeCursor, ReconBackend},
    ProviderUpdateResult,
    ReconciliationApi,
};

mod support;

fn one_percent_schedule() -> FeeSchedule {
    FeeSchedule { weekday: FeeRate::new(1.0, 0), weekend: FeeRate::new(2.0, 0) }
}

#[tokio::test]
async fn successful_update_marks_paid_and_enqueues_signed_callback() {
    let db = support::new_db().await;
    support::seed_partner(&db, "partner-1", Some(("https://partner.test/cb", "s3cret"))).await;
    support::seed_order(&db, "ord-1", "partner-1", "subm-1", 500).await;
    let api = ReconciliationApi::new(db.clone(), EventProducers::default(), one_percent_schedule());

    let status = support::weekday_success(500);
    let result = api.process_provider_update(&OrderId::from("ord-1".to_string()), &status).await.unwrap();
    let order = match result {
        ProviderUpdateResult::Paid(order) => order,
        other => panic!("Expected Paid, got {other:?}"),
    };
    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(order.fee_platform, Some(MinorUnits::from(5)));
    assert_eq!(order.pending_amount, Some(MinorUnits::from(495)));
    assert_eq!(order.provider_payment_id.as_deref(), Some("prov-pay-1"));

    // Exactly one callback job, signed over the exact payload bytes
    let jobs = db.fetch_due_callbacks(10, 5).await.unwrap();
    assert_eq!(jobs.len(), 1);
    let job = &jobs[0];
    assert_eq!(job.order_id, OrderId::from("ord-1".to_string()));
    assert_eq!(job.url, "https://partner.test/cb");
    assert!(CallbackHmac::new("s3cret").verify(job.payload.as_bytes(), &job.signature));
    assert!(db.callback_recorded(&job.order_id).await.unwrap());

    // A replay of the same webhook is a no-op
    let replay = api.process_provider_update(&OrderId::from("ord-1".to_string()), &status).await.unwrap();
    assert!(matches!(replay, ProviderUpdateResult::AlreadyProcessed));
    assert_eq!(db.fetch_due_callbacks(10, 5).await.unwrap().len(), 1);
}

#[tokio::test]
async fn unknown_status_vocabulary_is_a_no_op() {
    let db = support::new_db().await;
    support::seed_partner(&db, "partner-1", None).await;
    support::seed_order(&db, "ord-2", "partner-1", "subm-1", 500).await;
    let api = ReconciliationApi::new(db.clone(), EventProducers::default(), one_percent_schedule());

    let result =
        api.process_provider_update(&OrderId::from("ord-2".to_string()), &support::provider_status("PROCESSING")).await.unwrap();
    assert!(matches!(result, ProviderUpdateResult::Ignored));
    let order = db.fetch_order(&OrderId::from("ord-2".to_string())).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
    assert!(order.pending_amount.is_none());
}

#[tokio::test]
async fn failure_status_moves_order_to_terminal_state() {
    let db = support::new_db().await;
    support::seed_partner(&db, "partner-1", None).await;
    support::seed_order(&db, "ord-3", "partner-1", "subm-1", 500).await;
    let api = ReconciliationApi::new(db.clone(), EventProducers::default(), one_percent_schedule());

    let result =
        api.process_provider_update(&OrderId::from("ord-3".to_string()), &support::provider_status("EXPIRED")).await.unwrap();
    let order = match result {
        ProviderUpdateResult::Failed(order) => order,
        other => panic!("Expected Failed, got {other:?}"),
    };
    assert_eq!(order.status, OrderStatus::Expired);
    assert!(order.pending_amount.is_none());
    assert!(order.settlement_amount.is_none());
    // Failure transitions never enqueue callbacks
    assert!(db.fetch_due_callbacks(10, 5).await.unwrap().is_empty());
}

#[tokio::test]
async fn missing_order_is_reported() {
    let db = support::new_db().await;
    let api = ReconciliationApi::new(db, EventProducers::default(), one_percent_schedule());
    let err = api
        .process_provider_update(&OrderId::from("no-such-order".to_string()), &support::provider_status("SUCCESS"))
        .await
        .unwrap_err();
    assert!(matches!(err, recon_engine::ReconApiError::OrderNotFound(_)));
}

#[tokio::test]
async fn cursor_pagination_handles_identical_timestamps() {
    let db = support::new_db().await;
    support::seed_partner(&db, "partner-1", None).await;
    let stamp = Utc::now();
    for id in ["pg-a", "pg-b", "pg-c", "pg-d"] {
        support::seed_order_at(&db, id, "partner-1", "subm-page", 100, stamp).await;
    }

    let hour = chrono::Duration::hours(1);
    let base = OrderRangeQuery::new("subm-page", stamp - hour, stamp + hour)
        .with_statuses(vec![OrderStatus::Pending])
        .with_limit(3);
    let first = db.fetch_orders_page(&base).await.unwrap();
    assert_eq!(first.len(), 3);
    let last = first.last().unwrap();
    let second = db
        .fetch_orders_page(&base.clone().after(RangeCursor { created_at: last.created_at, id: last.id.clone() }))
        .await
        .unwrap();
    assert_eq!(second.len(), 1);

    let seen: BTreeSet<String> = first.iter().chain(second.iter()).map(|o| o.id.to_string()).collect();
    assert_eq!(seen, BTreeSet::from(["pg-a".into(), "pg-b".into(), "pg-c".into(), "pg-d".into()]));
}
