use std::{sync::Arc, time::Duration};

use actix_web::{http::StatusCode, test::TestRequest, web, web::ServiceConfig};
use futures::future::BoxFuture;
use recon_engine::{
    LoanActionSummary,
    LoanRevertRequest,
    LoanSelection,
    LoanSettlementRequest,
    ReconApiError,
};
use serde_json::{json, Value};

use super::helpers::send_request;
use crate::{
    config::WorkerConfig,
    job_worker::{JobStatus, JobWorker, LoanRunner},
    routes::{LoanJobStatusRoute, LoanRevertRoute, LoanSettlementRoute},
};

/// Completes instantly, reporting every selected order as settled.
struct InstantRunner;

impl LoanRunner for InstantRunner {
    fn settle(&self, request: LoanSettlementRequest) -> BoxFuture<'static, Result<LoanActionSummary, ReconApiError>> {
        let ok = match request.selection {
            LoanSelection::Orders(ids) => ids,
            LoanSelection::Range { .. } => Vec::new(),
        };
        Box::pin(async move { Ok(LoanActionSummary { ok, failed: Vec::new() }) })
    }

    fn revert(&self, _request: LoanRevertRequest) -> BoxFuture<'static, Result<LoanActionSummary, ReconApiError>> {
        Box::pin(async { Ok(LoanActionSummary::default()) })
    }
}

fn test_worker() -> JobWorker {
    let config = WorkerConfig { concurrency: 2, queue_capacity: 8 };
    JobWorker::start(Arc::new(InstantRunner), &config)
}

fn configure_with(worker: JobWorker) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg: &mut ServiceConfig| {
        cfg.app_data(web::Data::new(worker))
            .service(LoanRevertRoute::new())
            .service(LoanSettlementRoute::new())
            .service(LoanJobStatusRoute::new());
    }
}

async fn wait_for_completion(worker: &JobWorker, job_id: u64) -> LoanActionSummary {
    for _ in 0..100 {
        if let Some(snapshot) = worker.job(job_id) {
            match snapshot.status {
                JobStatus::Completed => return snapshot.summary.unwrap(),
                JobStatus::Failed => panic!("job {job_id} failed: {:?}", snapshot.error),
                _ => {},
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} did not complete in time");
}

#[actix_web::test]
async fn settlement_submission_returns_a_job_id() {
    let worker = test_worker();
    let body = json!({ "order_ids": ["ord-1", "ord-2"], "operator": "ops@example.com" });
    let req = TestRequest::post().uri("/loan-settlements").set_json(&body);
    let (status, body) = send_request(req, configure_with(worker.clone())).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let response: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(response["job_id"], json!(1));
    let summary = wait_for_completion(&worker, 1).await;
    assert_eq!(summary.ok_count(), 2);
}

#[actix_web::test]
async fn a_selection_must_be_provided() {
    let req = TestRequest::post().uri("/loan-settlements").set_json(json!({}));
    let (status, body) = send_request(req, configure_with(test_worker())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("order_ids"), "body: {body}");
}

#[actix_web::test]
async fn a_partial_range_is_rejected() {
    // sub_merchant_id without start and end selects nothing.
    let body = json!({ "sub_merchant_id": "sub-1", "start": "2025-03-01T00:00:00Z" });
    let req = TestRequest::post().uri("/loan-settlements").set_json(&body);
    let (status, _) = send_request(req, configure_with(test_worker())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn revert_submission_returns_a_job_id() {
    let worker = test_worker();
    let body = json!({
        "sub_merchant_id": "sub-1",
        "start": "2025-03-01T00:00:00Z",
        "end": "2025-03-31T23:59:59Z",
        "operator": "ops@example.com"
    });
    let req = TestRequest::post().uri("/loan-settlements/revert").set_json(&body);
    let (status, body) = send_request(req, configure_with(worker.clone())).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let response: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(response["job_id"], json!(1));
    let summary = wait_for_completion(&worker, 1).await;
    assert_eq!(summary.ok_count(), 0);
}

#[actix_web::test]
async fn job_status_handles_unknown_and_malformed_ids() {
    let worker = test_worker();
    let req = TestRequest::get().uri("/loan-settlements/999");
    let (status, _) = send_request(req, configure_with(worker.clone())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let req = TestRequest::get().uri("/loan-settlements/not-a-number");
    let (status, _) = send_request(req, configure_with(worker)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn job_snapshot_reports_queue_and_completion_times() {
    let worker = test_worker();
    let body = json!({ "order_ids": ["ord-9"] });
    let req = TestRequest::post().uri("/loan-settlements").set_json(&body);
    let (status, _) = send_request(req, configure_with(worker.clone())).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    wait_for_completion(&worker, 1).await;

    let req = TestRequest::get().uri("/loan-settlements/1");
    let (status, body) = send_request(req, configure_with(worker)).await;
    assert_eq!(status, StatusCode::OK);
    let snapshot: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(snapshot["status"], "completed");
    assert_eq!(snapshot["kind"], "settle");
    assert!(snapshot["started_at"].is_string());
    assert!(snapshot["finished_at"].is_string());
}
