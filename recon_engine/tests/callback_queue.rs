//! Callback queue semantics: attempt accounting and dead-lettering.
use recon_engine::{
    db_types::{DeliveryAttempt, NewCallbackJob, OrderId},
    traits::CallbackQueue,
};

mod support;

fn new_job(order: &str) -> NewCallbackJob {
    NewCallbackJob {
        order_id: OrderId::from(order.to_string()),
        partner_client_id: "partner-1".to_string(),
        url: "https://partner.test/cb".to_string(),
        payload: r#"{"status":"PAID"}"#.to_string(),
        signature: "deadbeef".to_string(),
    }
}

fn failed_attempt(code: u16) -> DeliveryAttempt {
    DeliveryAttempt {
        delivered: false,
        status_code: Some(code),
        error: Some(format!("received status {code}")),
        response_body: Some("try later".to_string()),
    }
}

#[tokio::test]
async fn delivered_jobs_leave_the_due_queue() {
    let db = support::new_db().await;
    let job = db.enqueue_callback(new_job("cb-1")).await.unwrap();
    assert_eq!(job.attempts, 0);
    assert!(!job.delivered);

    let attempt = DeliveryAttempt { delivered: true, status_code: Some(200), error: None, response_body: None };
    let job = db.record_callback_attempt(job.id, attempt).await.unwrap();
    assert!(job.delivered);
    assert_eq!(job.attempts, 1);
    assert!(db.fetch_due_callbacks(10, 5).await.unwrap().is_empty());
    // The record still counts for idempotency checks
    assert!(db.callback_recorded(&OrderId::from("cb-1".to_string())).await.unwrap());
}

#[tokio::test]
async fn exhausted_jobs_move_to_the_dead_letter_store() {
    let db = support::new_db().await;
    let job = db.enqueue_callback(new_job("cb-2")).await.unwrap();
    let mut updated = job.clone();
    for _ in 0..3 {
        updated = db.record_callback_attempt(job.id, failed_attempt(503)).await.unwrap();
    }
    assert_eq!(updated.attempts, 3);
    // Below the ceiling the job is still due; at the ceiling it is not
    assert_eq!(db.fetch_due_callbacks(10, 5).await.unwrap().len(), 1);
    assert!(db.fetch_due_callbacks(10, 3).await.unwrap().is_empty());

    let dead = db.dead_letter_callback(job.id).await.unwrap();
    assert_eq!(dead.order_id, OrderId::from("cb-2".to_string()));
    assert_eq!(dead.attempts, 3);
    assert_eq!(dead.status_code, Some(503));
    assert_eq!(dead.payload, job.payload);
    assert!(db.fetch_due_callbacks(10, 5).await.unwrap().is_empty());
    // Dead letters still satisfy the idempotency check
    assert!(db.callback_recorded(&OrderId::from("cb-2".to_string())).await.unwrap());
    let letters = db.fetch_dead_letters(10).await.unwrap();
    assert_eq!(letters.len(), 1);
}
