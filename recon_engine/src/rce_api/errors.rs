use thiserror::Error;

use crate::{db_types::OrderId, traits::ReconBackendError};

#[derive(Debug, Clone, Error)]
pub enum ReconApiError {
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("Partner client {0} has no callback configuration")]
    PartnerConfigMissing(String),
    #[error("Backend error: {0}")]
    BackendError(#[from] ReconBackendError),
    #[error("Could not serialize callback payload: {0}")]
    PayloadError(String),
}

impl From<serde_json::Error> for ReconApiError {
    fn from(e: serde_json::Error) -> Self {
        ReconApiError::PayloadError(e.to_string())
    }
}
