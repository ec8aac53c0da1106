use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use mec_core::ChainCommunicationError;
use serde::Serialize;

/// Failures surfaced by a federation run (spec §7, *FederationError*).
/// Anything the Ledger Adapter didn't already recover internally lands
/// here; the FM recovers nothing automatically.
#[derive(Debug, thiserror::Error)]
pub enum FederationError {
    #[error("ledger error: {0}")]
    Ledger(#[from] ChainCommunicationError),
    #[error("domain orchestrator error: {0}")]
    DomainOrchestrator(String),
    #[error("timed out waiting for {0}")]
    ProtocolTimeout(&'static str),
    #[error("no bid qualified under the configured price threshold")]
    NoQualifyingBid,
    #[error("invalid request: {0}")]
    InvalidInput(String),
    #[error("this domain is not configured for role {0:?}")]
    WrongRole(&'static str),
    #[error("service {0} not found")]
    NotFound(String),
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    message: String,
}

impl IntoResponse for FederationError {
    fn into_response(self) -> Response {
        let status = match &self {
            FederationError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            FederationError::WrongRole(_) => StatusCode::FORBIDDEN,
            FederationError::NotFound(_) => StatusCode::NOT_FOUND,
            FederationError::Ledger(e) if e.is_service_not_open() => StatusCode::NOT_FOUND,
            FederationError::Ledger(e) if e.is_already_registered() || e.is_not_registered() => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            success: false,
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
