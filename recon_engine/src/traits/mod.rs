//! Backend behaviour contracts for the reconciliation engine.
//!
//! Specific stores (SQLite today) implement these traits. Everything above them, from the flow
//! API to the callback dispatcher, is written against the traits so server tests can mock the
//! store.
mod data_objects;
mod recon_backend;

pub use data_objects::{
    LoanItemOutcome,
    OrderRangeQuery,
    PaidOrderUpdate,
    PreparedLoanRevert,
    PreparedLoanSettlement,
    RangeCursor,
};
pub use recon_backend::{CallbackQueue, ReconBackend, ReconBackendError};
