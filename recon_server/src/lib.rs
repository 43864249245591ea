//! # Payment reconciliation server
//!
//! The HTTP face of the reconciliation engine. The server exposes
//!
//! * provider webhook endpoints with per-provider signature verification,
//! * administrative loan settlement and revert endpoints, run as bounded background jobs,
//! * a dead-letter listing for callbacks that exhausted their retries,
//!
//! and runs three background services: the callback dispatcher, the fallback status poller and
//! the loan job worker. Configuration comes entirely from `PRC_*` environment variables, see
//! [`config::ServerConfig`].

pub mod config;
pub mod data_objects;
pub mod dispatcher;
pub mod errors;
pub mod helpers;
pub mod job_worker;
pub mod providers;
pub mod routes;
pub mod server;
pub mod status_poller;

#[cfg(test)]
mod endpoint_tests;
