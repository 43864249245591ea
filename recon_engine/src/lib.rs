//! Payment reconciliation and settlement engine.
//!
//! This library contains the core logic for reconciling orders against payment providers and
//! settling them. It is HTTP-agnostic; the server crate wires it to the outside world.
//!
//! The library is divided into three main sections:
//! 1. Database management and control ([`mod@sqlite`]). SQLite is the supported backend. Access
//!    goes through the trait contracts in [`mod@traits`]; the data types are defined in
//!    [`mod@db_types`] and are public.
//! 2. The engine public API ([`mod@rce_api`]): the reconciliation flow API shared by webhook
//!    ingestion and the fallback poller, and the bulk loan-settlement API.
//! 3. A set of events ([`mod@events`]) emitted when orders transition. A simple actor style hook
//!    system lets the server subscribe audit sinks and callback producers to these events.

pub mod db_types;
pub mod events;
pub mod helpers;
mod rce_api;
pub mod sqlite;
pub mod traits;

pub use rce_api::{
    errors::ReconApiError,
    flow_api::{failure_status, ProviderUpdateResult, ReconciliationApi},
    loan_api::{
        LoanActionSummary,
        LoanItemFailure,
        LoanRevertRequest,
        LoanSelection,
        LoanSettlementApi,
        LoanSettlementRequest,
    },
};
pub use sqlite::SqliteDatabase;
