//! Fallback reconciliation for orders whose webhook never arrives.
//!
//! One in-memory watcher per order id, firing on a fixed backoff schedule. Each tick stands down
//! as soon as the webhook path has clearly done its work (a callback record exists, or the order
//! left PENDING); otherwise it queries the provider directly and pushes any terminal status
//! through the exact same update path the webhook uses. Watchers do not survive a restart; they
//! are reconciliation aids, not the source of truth.
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use log::*;
use recon_engine::{
    db_types::{OrderId, OrderStatus},
    traits::{CallbackQueue, ReconBackend},
    ReconciliationApi,
    SqliteDatabase,
};
use tokio::{sync::Mutex, task::JoinHandle};

use crate::providers::StatusSource;

#[derive(Clone)]
pub struct StatusPoller {
    inner: Arc<PollerInner>,
}

/// One registered watcher. The generation tag lets a finishing task tell whether the map entry
/// is still its own or a re-watch has already replaced it.
struct WatchEntry {
    generation: u64,
    handle: JoinHandle<()>,
}

struct PollerInner {
    api: ReconciliationApi<SqliteDatabase>,
    source: Arc<dyn StatusSource>,
    backoff: Vec<Duration>,
    watchers: Mutex<HashMap<OrderId, WatchEntry>>,
    next_generation: AtomicU64,
}

enum Tick {
    Stop,
    Reschedule,
}

impl StatusPoller {
    pub fn new(api: ReconciliationApi<SqliteDatabase>, source: Arc<dyn StatusSource>, backoff: Vec<Duration>) -> Self {
        Self {
            inner: Arc::new(PollerInner {
                api,
                source,
                backoff,
                watchers: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(0),
            }),
        }
    }

    /// Start watching an order. Returns `false` (a no-op) if a watcher for the order is already
    /// active.
    pub async fn watch(&self, order_id: OrderId) -> bool {
        let mut watchers = self.inner.watchers.lock().await;
        if let Some(entry) = watchers.get(&order_id) {
            if !entry.handle.is_finished() {
                debug!("🕵️ Order [{order_id}] is already being watched");
                return false;
            }
        }
        let generation = self.inner.next_generation.fetch_add(1, Ordering::SeqCst);
        let inner = Arc::clone(&self.inner);
        let id = order_id.clone();
        let handle = tokio::spawn(async move {
            run_watcher(&inner, &id).await;
            // Clear only our own registration; a re-watch may have replaced the entry already.
            let mut watchers = inner.watchers.lock().await;
            if watchers.get(&id).is_some_and(|entry| entry.generation == generation) {
                watchers.remove(&id);
            }
        });
        watchers.insert(order_id.clone(), WatchEntry { generation, handle });
        info!("🕵️ Watching order [{order_id}] for a missing webhook");
        true
    }

    /// Abort and clear the watcher for an order, if one exists.
    pub async fn cancel(&self, order_id: &OrderId) {
        if let Some(entry) = self.inner.watchers.lock().await.remove(order_id) {
            entry.handle.abort();
            debug!("🕵️ Watcher for order [{order_id}] cancelled");
        }
    }

    pub async fn is_watching(&self, order_id: &OrderId) -> bool {
        self.inner.watchers.lock().await.get(order_id).map(|entry| !entry.handle.is_finished()).unwrap_or(false)
    }
}

async fn run_watcher(inner: &PollerInner, order_id: &OrderId) {
    for (attempt, delay) in inner.backoff.iter().enumerate() {
        tokio::time::sleep(*delay).await;
        trace!("🕵️ Watcher tick {} for order [{order_id}]", attempt + 1);
        match tick(inner, order_id).await {
            Tick::Stop => return,
            Tick::Reschedule => {},
        }
    }
    info!("🕵️ Watcher for order [{order_id}] exhausted its schedule without a terminal status. Giving up.");
}

async fn tick(inner: &PollerInner, order_id: &OrderId) -> Tick {
    match inner.api.db().callback_recorded(order_id).await {
        Ok(true) => {
            debug!("🕵️ A callback record exists for order [{order_id}]. Watcher standing down.");
            return Tick::Stop;
        },
        Ok(false) => {},
        Err(e) => {
            warn!("🕵️ Could not check callback records for order [{order_id}]: {e}");
            return Tick::Reschedule;
        },
    }
    let order = match inner.api.db().fetch_order(order_id).await {
        Ok(Some(order)) => order,
        Ok(None) => {
            warn!("🕵️ Watched order [{order_id}] no longer exists. Watcher standing down.");
            return Tick::Stop;
        },
        Err(e) => {
            warn!("🕵️ Could not fetch watched order [{order_id}]: {e}");
            return Tick::Reschedule;
        },
    };
    if order.status != OrderStatus::Pending {
        debug!("🕵️ Order [{order_id}] is already {}. Watcher standing down.", order.status);
        return Tick::Stop;
    }
    let status = match inner.source.payment_status(&order.provider, order.best_provider_reference()).await {
        Ok(status) => status,
        Err(e) => {
            // The provider being unreachable is exactly what the backoff is for.
            debug!("🕵️ Status query for order [{order_id}] failed: {e}");
            return Tick::Reschedule;
        },
    };
    if !status.outcome().is_terminal() {
        trace!("🕵️ Order [{order_id}] still '{}' at the provider. Rescheduling.", status.status);
        return Tick::Reschedule;
    }
    match inner.api.process_provider_update(order_id, &status).await {
        Ok(result) => {
            info!("🕵️ Fallback reconciliation resolved order [{order_id}]: {result:?}");
            Tick::Stop
        },
        Err(e) => {
            warn!("🕵️ Fallback update for order [{order_id}] failed: {e}");
            Tick::Stop
        },
    }
}
