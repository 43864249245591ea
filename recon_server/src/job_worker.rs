//! Bounded background execution for the administrative loan-settlement flows.
//!
//! Bulk settlements can touch tens of thousands of orders, so the HTTP handlers only enqueue a
//! job and return its id. A fixed-size concurrency gate runs the jobs; everything beyond the gate
//! queues and is promoted in strict arrival order as slots free up. Job state lives in memory:
//! a restart drops unfinished jobs and the operator resubmits (the flows themselves are
//! idempotent).
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
        Mutex,
    },
};

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use log::*;
use recon_engine::{
    events::BulkActionRecord,
    LoanActionSummary,
    LoanRevertRequest,
    LoanSelection,
    LoanSettlementApi,
    LoanSettlementRequest,
    ReconApiError,
    SqliteDatabase,
};
use serde::Serialize;
use tokio::sync::{mpsc, Semaphore};

use crate::{config::WorkerConfig, errors::ServerError};

/// The executor seam. The server plugs in [`LoanSettlementApi`]; tests plug in a stub with
/// controllable timing.
pub trait LoanRunner: Send + Sync + 'static {
    fn settle(&self, request: LoanSettlementRequest) -> BoxFuture<'static, Result<LoanActionSummary, ReconApiError>>;
    fn revert(&self, request: LoanRevertRequest) -> BoxFuture<'static, Result<LoanActionSummary, ReconApiError>>;
}

impl LoanRunner for LoanSettlementApi<SqliteDatabase> {
    fn settle(&self, request: LoanSettlementRequest) -> BoxFuture<'static, Result<LoanActionSummary, ReconApiError>> {
        let api = self.clone();
        Box::pin(async move { api.mark_loan_settled(request).await })
    }

    fn revert(&self, request: LoanRevertRequest) -> BoxFuture<'static, Result<LoanActionSummary, ReconApiError>> {
        let api = self.clone();
        Box::pin(async move { api.revert_loan_settled(request).await })
    }
}

#[derive(Debug, Clone)]
pub enum LoanJobKind {
    Settle(LoanSettlementRequest),
    Revert(LoanRevertRequest),
}

impl LoanJobKind {
    fn label(&self) -> &'static str {
        match self {
            LoanJobKind::Settle(_) => "settle",
            LoanJobKind::Revert(_) => "revert",
        }
    }

    /// The admin-log record for this action, completed with counts once the job finishes.
    fn audit_record(&self) -> BulkActionRecord {
        let (sub_merchant_id, operator) = match self {
            LoanJobKind::Settle(r) => {
                let scope = match &r.selection {
                    LoanSelection::Range { sub_merchant_id, .. } => Some(sub_merchant_id.clone()),
                    LoanSelection::Orders(_) => None,
                };
                (scope, r.operator.clone())
            },
            LoanJobKind::Revert(r) => (Some(r.sub_merchant_id.clone()), r.operator.clone()),
        };
        BulkActionRecord { action: self.label().to_string(), sub_merchant_id, operator, ok_count: 0, failed_count: 0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

/// A point-in-time view of a job, for polling clients.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub id: u64,
    pub kind: String,
    pub status: JobStatus,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub summary: Option<LoanActionSummary>,
    pub error: Option<String>,
}

struct JobEntry {
    snapshot: JobSnapshot,
    // Taken by the scheduler when the job is promoted to Running.
    request: Option<LoanJobKind>,
}

type JobTable = Arc<Mutex<HashMap<u64, JobEntry>>>;

/// Handle to the worker. Cheap to clone; all clones share the same queue and job table.
#[derive(Clone)]
pub struct JobWorker {
    sender: mpsc::Sender<u64>,
    jobs: JobTable,
    next_id: Arc<AtomicU64>,
}

impl JobWorker {
    /// Starts the scheduler task and returns the submission handle. Do not await the scheduler;
    /// it runs for the life of the process.
    pub fn start(runner: Arc<dyn LoanRunner>, config: &WorkerConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity);
        let jobs: JobTable = Arc::new(Mutex::new(HashMap::new()));
        let worker = Self { sender, jobs: jobs.clone(), next_id: Arc::new(AtomicU64::new(1)) };
        tokio::spawn(scheduler(receiver, jobs, runner, config.concurrency));
        info!("🏗️ Loan settlement job worker started with {} slots", config.concurrency);
        worker
    }

    /// Enqueue a job and return its id. Fails fast when the queue is full instead of blocking
    /// the HTTP handler.
    pub fn submit(&self, kind: LoanJobKind) -> Result<u64, ServerError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let snapshot = JobSnapshot {
            id,
            kind: kind.label().to_string(),
            status: JobStatus::Queued,
            submitted_at: Utc::now(),
            started_at: None,
            finished_at: None,
            summary: None,
            error: None,
        };
        if let Ok(mut table) = self.jobs.lock() {
            table.insert(id, JobEntry { snapshot, request: Some(kind) });
        }
        match self.sender.try_send(id) {
            Ok(()) => {
                debug!("🏗️ Job {id} queued");
                Ok(id)
            },
            Err(e) => {
                if let Ok(mut table) = self.jobs.lock() {
                    table.remove(&id);
                }
                warn!("🏗️ Job queue is full. Rejecting submission. {e}");
                Err(ServerError::JobQueueFull)
            },
        }
    }

    pub fn job(&self, id: u64) -> Option<JobSnapshot> {
        self.jobs.lock().ok().and_then(|table| table.get(&id).map(|entry| entry.snapshot.clone()))
    }
}

/// Pulls job ids off the queue in arrival order, waiting for a free slot before each promotion.
/// Waiting for the permit *before* receiving the next id is what makes promotion strictly FIFO.
async fn scheduler(mut receiver: mpsc::Receiver<u64>, jobs: JobTable, runner: Arc<dyn LoanRunner>, slots: usize) {
    let gate = Arc::new(Semaphore::new(slots));
    while let Some(id) = receiver.recv().await {
        let Ok(permit) = gate.clone().acquire_owned().await else {
            break;
        };
        let request = match jobs.lock() {
            Ok(mut table) => match table.get_mut(&id) {
                Some(entry) => {
                    entry.snapshot.status = JobStatus::Running;
                    entry.snapshot.started_at = Some(Utc::now());
                    entry.request.take()
                },
                None => None,
            },
            Err(_) => None,
        };
        let Some(request) = request else {
            continue;
        };
        debug!("🏗️ Job {id} promoted to running");
        let runner = Arc::clone(&runner);
        let jobs = jobs.clone();
        let mut record = request.audit_record();
        tokio::spawn(async move {
            let result = match request {
                LoanJobKind::Settle(r) => runner.settle(r).await,
                LoanJobKind::Revert(r) => runner.revert(r).await,
            };
            if let Ok(mut table) = jobs.lock() {
                if let Some(entry) = table.get_mut(&id) {
                    entry.snapshot.finished_at = Some(Utc::now());
                    match result {
                        Ok(summary) => {
                            record.ok_count = summary.ok_count();
                            record.failed_count = summary.failed_count();
                            let line = serde_json::to_string(&record).unwrap_or_else(|_| format!("{record:?}"));
                            info!(target: "prc::audit", "{line}");
                            info!(
                                "🏗️ Job {id} completed. {} ok, {} failed.",
                                summary.ok_count(),
                                summary.failed_count()
                            );
                            entry.snapshot.status = JobStatus::Completed;
                            entry.snapshot.summary = Some(summary);
                        },
                        Err(e) => {
                            warn!("🏗️ Job {id} failed. {e}");
                            entry.snapshot.status = JobStatus::Failed;
                            entry.snapshot.error = Some(e.to_string());
                        },
                    }
                }
            }
            drop(permit);
        });
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use tokio::sync::Notify;

    use super::*;

    /// Runs until released, so tests control exactly when each job finishes.
    struct GatedRunner {
        release: Arc<Notify>,
    }

    impl LoanRunner for GatedRunner {
        fn settle(&self, _: LoanSettlementRequest) -> BoxFuture<'static, Result<LoanActionSummary, ReconApiError>> {
            let release = self.release.clone();
            Box::pin(async move {
                release.notified().await;
                Ok(LoanActionSummary::default())
            })
        }

        fn revert(&self, _: LoanRevertRequest) -> BoxFuture<'static, Result<LoanActionSummary, ReconApiError>> {
            let release = self.release.clone();
            Box::pin(async move {
                release.notified().await;
                Ok(LoanActionSummary::default())
            })
        }
    }

    fn settle_job() -> LoanJobKind {
        LoanJobKind::Settle(LoanSettlementRequest {
            selection: recon_engine::LoanSelection::Orders(vec![]),
            operator: None,
            note: None,
            dry_run: false,
        })
    }

    async fn wait_for(worker: &JobWorker, id: u64, status: JobStatus) {
        for _ in 0..200 {
            if worker.job(id).map(|j| j.status) == Some(status) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("Job {id} never reached {status:?}");
    }

    #[tokio::test]
    async fn third_job_queues_and_promotes_in_arrival_order() {
        let _ = env_logger::try_init();
        let release = Arc::new(Notify::new());
        let runner = Arc::new(GatedRunner { release: release.clone() });
        let config = WorkerConfig { concurrency: 2, queue_capacity: 16 };
        let worker = JobWorker::start(runner, &config);

        let a = worker.submit(settle_job()).unwrap();
        let b = worker.submit(settle_job()).unwrap();
        let c = worker.submit(settle_job()).unwrap();
        wait_for(&worker, a, JobStatus::Running).await;
        wait_for(&worker, b, JobStatus::Running).await;

        // Both slots taken, the third job waits with no start time
        let queued = worker.job(c).unwrap();
        assert_eq!(queued.status, JobStatus::Queued);
        assert!(queued.started_at.is_none());

        // Finishing one job promotes the queued one with a fresh start time
        release.notify_one();
        wait_for(&worker, c, JobStatus::Running).await;
        let promoted = worker.job(c).unwrap();
        let started = promoted.started_at.unwrap();
        assert!(started >= promoted.submitted_at);

        release.notify_one();
        release.notify_one();
        wait_for(&worker, a, JobStatus::Completed).await;
        wait_for(&worker, b, JobStatus::Completed).await;
        wait_for(&worker, c, JobStatus::Completed).await;
        assert!(worker.job(c).unwrap().summary.is_some());
    }

    #[test]
    fn audit_records_carry_the_scope_of_the_action() {
        let order_job = settle_job();
        let record = order_job.audit_record();
        assert_eq!(record.action, "settle");
        assert!(record.sub_merchant_id.is_none());

        let range_job = LoanJobKind::Settle(LoanSettlementRequest {
            selection: LoanSelection::Range {
                sub_merchant_id: "subm-7".to_string(),
                start: Utc::now(),
                end: Utc::now(),
            },
            operator: Some("ops-1".to_string()),
            note: None,
            dry_run: false,
        });
        let record = range_job.audit_record();
        assert_eq!(record.sub_merchant_id.as_deref(), Some("subm-7"));
        assert_eq!(record.operator.as_deref(), Some("ops-1"));

        let revert_job = LoanJobKind::Revert(LoanRevertRequest {
            sub_merchant_id: "subm-7".to_string(),
            start: Utc::now(),
            end: Utc::now(),
            operator: None,
            note: None,
            export_only: false,
        });
        let record = revert_job.audit_record();
        assert_eq!(record.action, "revert");
        assert_eq!(record.sub_merchant_id.as_deref(), Some("subm-7"));
    }

    #[tokio::test]
    async fn unknown_job_id_returns_none() {
        let release = Arc::new(Notify::new());
        let worker = JobWorker::start(Arc::new(GatedRunner { release }), &WorkerConfig::default());
        assert!(worker.job(999).is_none());
    }
}
