use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use log::*;
use recon_engine::{
    events::{EventHandlers, EventHooks, LoanRevertedEvent, LoanSettledEvent, OrderFailedEvent, OrderPaidEvent},
    LoanSettlementApi,
    ReconciliationApi,
    SqliteDatabase,
};

use crate::{
    config::ServerConfig,
    dispatcher::start_dispatcher,
    errors::ServerError,
    job_worker::JobWorker,
    providers::ProviderRegistry,
    routes::{
        health,
        DeadLettersRoute,
        LoanJobStatusRoute,
        LoanRevertRoute,
        LoanSettlementRoute,
        ProviderWebhookRoute,
        WatchOrderRoute,
    },
    status_poller::StatusPoller,
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let handlers = EventHandlers::new(config.event_buffer_size, audit_log_hooks());
    let producers = handlers.producers();
    handlers.start_handlers().await;

    let registry =
        ProviderRegistry::new(config.providers.clone()).map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let flow_api = ReconciliationApi::new(db.clone(), producers.clone(), config.fee_schedule);
    let poller = StatusPoller::new(flow_api.clone(), Arc::new(registry.clone()), config.poller.backoff.clone());
    let loan_api = LoanSettlementApi::new(db.clone(), producers);
    let worker = JobWorker::start(Arc::new(loan_api), &config.worker);
    let _dispatcher = start_dispatcher(db, config.dispatcher.clone());

    let srv = create_server_instance(config, flow_api, registry, poller, worker)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn create_server_instance(
    config: ServerConfig,
    api: ReconciliationApi<SqliteDatabase>,
    registry: ProviderRegistry,
    poller: StatusPoller,
    worker: JobWorker,
) -> Result<Server, ServerError> {
    let host = config.host.clone();
    let port = config.port;
    let srv = HttpServer::new(move || {
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("prc::access_log"))
            .app_data(web::Data::new(api.clone()))
            .app_data(web::Data::new(registry.clone()))
            .app_data(web::Data::new(poller.clone()))
            .app_data(web::Data::new(worker.clone()))
            .app_data(web::Data::new(config.clone()))
            .service(health)
            .service(ProviderWebhookRoute::<SqliteDatabase>::new())
            .service(
                web::scope("/api")
                    .service(LoanRevertRoute::new())
                    .service(LoanSettlementRoute::new())
                    .service(LoanJobStatusRoute::new())
                    .service(WatchOrderRoute::new())
                    .service(DeadLettersRoute::<SqliteDatabase>::new()),
            )
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((host.as_str(), port))?
    .run();
    Ok(srv)
}

type HookFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// The default event subscriptions: every order transition and bulk action lands in the audit
/// log as a structured line.
fn audit_log_hooks() -> EventHooks {
    let mut hooks = EventHooks::default();
    hooks.on_order_paid(|ev: OrderPaidEvent| -> HookFuture {
        Box::pin(async move {
            info!(
                target: "prc::audit",
                "order_paid order={} sub_merchant={} amount={} fee={:?}",
                ev.order.id, ev.order.sub_merchant_id, ev.order.amount, ev.order.fee_platform
            );
        })
    });
    hooks.on_order_failed(|ev: OrderFailedEvent| -> HookFuture {
        Box::pin(async move {
            info!(
                target: "prc::audit",
                "order_failed order={} sub_merchant={} status={}",
                ev.order.id, ev.order.sub_merchant_id, ev.status
            );
        })
    });
    hooks.on_loan_settled(|ev: LoanSettledEvent| -> HookFuture {
        Box::pin(async move {
            info!(
                target: "prc::audit",
                "loan_settled order={} sub_merchant={} previous_status={} marked_by={:?}",
                ev.order.id, ev.order.sub_merchant_id, ev.entry.previous_status, ev.entry.marked_by
            );
        })
    });
    hooks.on_loan_reverted(|ev: LoanRevertedEvent| -> HookFuture {
        Box::pin(async move {
            info!(
                target: "prc::audit",
                "loan_reverted order={} sub_merchant={} restored_status={} reverted_by={:?}",
                ev.order.id, ev.order.sub_merchant_id, ev.entry.restored.status, ev.entry.reverted_by
            );
        })
    });
    hooks
}
