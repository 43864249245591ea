use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use recon_engine::ReconApiError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("Webhook signature is invalid or missing")]
    InvalidSignature,
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("The job queue is full. Try again later.")]
    JobQueueFull,
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::InvalidSignature => StatusCode::BAD_REQUEST,
            Self::UnknownProvider(_) => StatusCode::BAD_REQUEST,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::JobQueueFull => StatusCode::SERVICE_UNAVAILABLE,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

impl From<ReconApiError> for ServerError {
    fn from(e: ReconApiError) -> Self {
        match e {
            ReconApiError::OrderNotFound(id) => Self::NoRecordFound(format!("Order {id} not found")),
            // A partner row without callback configuration is an operator problem, not the
            // provider's. Surfaced as a 500 and logged upstream.
            ReconApiError::PartnerConfigMissing(id) => {
                Self::ConfigurationError(format!("Partner client {id} is not configured"))
            },
            ReconApiError::BackendError(e) => Self::BackendError(e.to_string()),
            ReconApiError::PayloadError(e) => Self::BackendError(e),
        }
    }
}
