//! # Reconciliation engine public API
//!
//! The `rce_api` module exposes the programmatic API for the reconciliation engine. The pattern
//! is the same for every API: an instance is created by supplying a database backend that
//! implements the backend traits the API needs, plus the event producers it should notify.
//!
//! * [`flow_api`] turns verified provider status updates into order transitions. It is the single
//!   code path shared by webhook ingestion and the fallback poller.
//! * [`loan_api`] handles the administrative bulk flows: forced loan settlement and its
//!   snapshot-based revert.
//!
//! ```rust,ignore
//! use recon_engine::{ReconciliationApi, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url(...).await?;
//! let api = ReconciliationApi::new(db, producers, fee_schedule);
//! let result = api.process_provider_update(&order_id, &status).await?;
//! ```

pub mod errors;
pub mod flow_api;
pub mod loan_api;
