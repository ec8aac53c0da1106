use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Failures surfaced by the Domain Orchestrator's host-local operations
/// (spec §7, *OrchestrationError*): container runtime or kernel calls that
/// failed. Always reported to the FM as HTTP 500 with a structured body.
#[derive(Debug, thiserror::Error)]
pub enum OrchestrationError {
    #[error("container runtime error: {0}")]
    Docker(#[from] bollard::errors::Error),
    #[error("container {0:?} not found")]
    ContainerNotFound(String),
    #[error("network {0:?} not found")]
    NetworkNotFound(String),
    #[error("deployment of {0:?} did not reach running state within the deadline")]
    DeployTimeout(String),
    #[error("a monitor is already running")]
    MonitorAlreadyRunning,
    #[error("no monitor is running")]
    MonitorNotRunning,
    #[error("vxlan command failed: {0}")]
    VxlanCommand(String),
    #[error("invalid request: {0}")]
    InvalidInput(String),
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    message: String,
}

impl IntoResponse for OrchestrationError {
    fn into_response(self) -> Response {
        let status = match &self {
            OrchestrationError::ContainerNotFound(_) | OrchestrationError::NetworkNotFound(_) => StatusCode::NOT_FOUND,
            OrchestrationError::MonitorAlreadyRunning => StatusCode::CONFLICT,
            OrchestrationError::MonitorNotRunning => StatusCode::NOT_FOUND,
            OrchestrationError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            success: false,
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
