//! Request handler definitions
//!
//! Define each route and its handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
use std::str::FromStr;

use actix_web::{get, web, HttpRequest, HttpResponse, Responder};
use log::*;
use provider_tools::ProviderId;
use recon_engine::{
    db_types::OrderId,
    traits::{CallbackQueue, ReconBackend},
    LoanRevertRequest,
    LoanSelection,
    LoanSettlementRequest,
    ProviderUpdateResult,
    ReconciliationApi,
};

use crate::{
    config::ServerConfig,
    data_objects::{JobSubmitted, JsonResponse, LoanRevertParams, LoanSettlementParams},
    errors::ServerError,
    job_worker::{JobWorker, LoanJobKind},
    providers::ProviderRegistry,
    status_poller::StatusPoller,
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal) => {
        paste::paste! { pub struct [<$name:camel Route>];}
        paste::paste! {
            impl [<$name:camel Route>] {
                #[allow(clippy::new_without_default)]
                pub fn new() -> Self { Self }
            }
        }
        paste::paste! {
            impl actix_web::dev::HttpServiceFactory for [<$name:camel Route>] {
                fn register(self, config: &mut actix_web::dev::AppService) {
                    let res = actix_web::Resource::new($path)
                        .name(stringify!($name))
                        .guard(actix_web::guard::$method())
                        .to($name);
                    actix_web::dev::HttpServiceFactory::register(res, config);
                }
            }
        }
    };

    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]<B>(core::marker::PhantomData<fn() -> B>);}
        paste::paste! { impl<B> [<$name:camel Route>]<B> {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self(core::marker::PhantomData::<fn() -> B>)
            }
        }}
        paste::paste! { impl<B> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<B>
        where
            B: $($bounds +)+ 'static,
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::<B>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//---------------------------------------------   Webhooks  ----------------------------------------------------
route!(provider_webhook => Post "/webhook/{provider}" impl ReconBackend, CallbackQueue);
/// Per-provider payment status webhook.
///
/// The signature is verified over the raw body bytes before anything is parsed; the provider
/// signed those exact bytes and reserializing them would invalidate the check. A verified but
/// non-terminal status is acknowledged with a no-op (and, when enabled, a fallback watcher).
pub async fn provider_webhook<B>(
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Bytes,
    api: web::Data<ReconciliationApi<B>>,
    providers: web::Data<ProviderRegistry>,
    poller: web::Data<StatusPoller>,
    config: web::Data<ServerConfig>,
) -> Result<HttpResponse, ServerError>
where
    B: ReconBackend + CallbackQueue,
{
    let provider = ProviderId::from_str(&path.into_inner()).map_err(|e| {
        debug!("📨️ Webhook for unknown provider. {e}");
        ServerError::UnknownProvider(e.to_string())
    })?;
    let provider_api = providers.api(provider).ok_or_else(|| {
        error!("📨️ Webhook received for {provider}, but no client is configured for it.");
        ServerError::ConfigurationError(format!("provider {provider} is not configured"))
    })?;
    let signature = req
        .headers()
        .get(provider.signature_header())
        .and_then(|v| v.to_str().ok())
        .ok_or(ServerError::InvalidSignature)?;
    if !provider_api.signature_scheme().verify(&body, signature) {
        warn!("📨️ Invalid {provider} webhook signature. Rejecting.");
        return Err(ServerError::InvalidSignature);
    }
    let (order_id, status) = super::helpers::parse_webhook_body(&body)?;
    debug!("📨️ Verified {provider} webhook for order [{order_id}] with status '{}'", status.status);
    let result = api.process_provider_update(&order_id, &status).await?;
    let response = match result {
        ProviderUpdateResult::Paid(order) => {
            info!("📨️ Order [{}] marked PAID via {provider} webhook", order.id);
            JsonResponse::success("Order marked as paid.")
        },
        ProviderUpdateResult::Failed(order) => {
            info!("📨️ Order [{}] moved to {} via {provider} webhook", order.id, order.status);
            JsonResponse::success("Order marked as failed.")
        },
        ProviderUpdateResult::AlreadyProcessed => JsonResponse::success("Order already processed."),
        ProviderUpdateResult::Ignored => {
            if config.watch_on_pending_webhook {
                poller.watch(order_id).await;
            }
            JsonResponse::success("Status is not terminal. No action taken.")
        },
        ProviderUpdateResult::RaceLost => JsonResponse::success("Order was updated concurrently."),
    };
    Ok(HttpResponse::Ok().json(response))
}

//-----------------------------------------   Loan settlements  ------------------------------------------------
route!(loan_settlement => Post "/loan-settlements");
/// Submit a bulk loan settlement as a background job. Returns the job id immediately.
pub async fn loan_settlement(
    body: web::Json<LoanSettlementParams>,
    worker: web::Data<JobWorker>,
) -> Result<HttpResponse, ServerError> {
    let params = body.into_inner();
    let selection = match (params.order_ids, params.sub_merchant_id, params.start, params.end) {
        (Some(ids), _, _, _) if !ids.is_empty() => LoanSelection::Orders(ids),
        (_, Some(sub_merchant_id), Some(start), Some(end)) => LoanSelection::Range { sub_merchant_id, start, end },
        _ => {
            return Err(ServerError::InvalidRequestBody(
                "Provide either order_ids, or sub_merchant_id with start and end".to_string(),
            ))
        },
    };
    let request = LoanSettlementRequest {
        selection,
        operator: params.operator,
        note: params.note,
        dry_run: params.dry_run,
    };
    let job_id = worker.submit(LoanJobKind::Settle(request))?;
    debug!("💸️ Loan settlement submitted as job {job_id}");
    Ok(HttpResponse::Accepted().json(JobSubmitted { job_id }))
}

route!(loan_revert => Post "/loan-settlements/revert");
pub async fn loan_revert(
    body: web::Json<LoanRevertParams>,
    worker: web::Data<JobWorker>,
) -> Result<HttpResponse, ServerError> {
    let params = body.into_inner();
    let request = LoanRevertRequest {
        sub_merchant_id: params.sub_merchant_id,
        start: params.start,
        end: params.end,
        operator: params.operator,
        note: params.note,
        export_only: params.export_only,
    };
    let job_id = worker.submit(LoanJobKind::Revert(request))?;
    debug!("💸️ Loan revert submitted as job {job_id}");
    Ok(HttpResponse::Accepted().json(JobSubmitted { job_id }))
}

route!(loan_job_status => Get "/loan-settlements/{job_id}");
pub async fn loan_job_status(
    path: web::Path<String>,
    worker: web::Data<JobWorker>,
) -> Result<HttpResponse, ServerError> {
    let raw = path.into_inner();
    let job_id =
        raw.parse::<u64>().map_err(|_| ServerError::InvalidRequestBody(format!("Invalid job id: {raw}")))?;
    match worker.job(job_id) {
        Some(snapshot) => Ok(HttpResponse::Ok().json(snapshot)),
        None => Err(ServerError::NoRecordFound(format!("Job {job_id} is unknown"))),
    }
}

//----------------------------------------------   Watchers  ---------------------------------------------------
route!(watch_order => Post "/orders/{order_id}/watch");
/// Register a fallback status watcher for an order. Re-watching is a no-op.
pub async fn watch_order(path: web::Path<String>, poller: web::Data<StatusPoller>) -> Result<HttpResponse, ServerError> {
    let order_id = OrderId::from(path.into_inner());
    let registered = poller.watch(order_id.clone()).await;
    let message =
        if registered { format!("Watching order {order_id}") } else { format!("Order {order_id} is already watched") };
    Ok(HttpResponse::Ok().json(JsonResponse::success(message)))
}

//--------------------------------------------   Dead letters  -------------------------------------------------
route!(dead_letters => Get "/callbacks/dead-letters" impl ReconBackend, CallbackQueue);
/// The callbacks that exhausted every delivery attempt, newest first.
pub async fn dead_letters<B>(api: web::Data<ReconciliationApi<B>>) -> Result<HttpResponse, ServerError>
where B: ReconBackend + CallbackQueue {
    let letters = api.db().fetch_dead_letters(100).await.map_err(|e| ServerError::BackendError(e.to_string()))?;
    let summary: Vec<serde_json::Value> = letters
        .iter()
        .map(|l| {
            serde_json::json!({
                "order_id": l.order_id,
                "url": l.url,
                "attempts": l.attempts,
                "last_error": l.last_error,
                "status_code": l.status_code,
                "dead_lettered_at": l.dead_lettered_at,
            })
        })
        .collect();
    Ok(HttpResponse::Ok().json(summary))
}
