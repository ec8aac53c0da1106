use std::sync::Arc;

use axum::Router;

use crate::docker_ops::DockerOrchestrator;
use crate::monitor::ResourceMonitor;

mod routes;

/// Shared state for every request handler. The DO is otherwise stateless:
/// all durable state lives in the container runtime and the kernel (spec
/// §4.2).
pub struct AppState {
    pub docker: DockerOrchestrator,
    pub monitor: ResourceMonitor,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(routes::router())
        .with_state(state)
}
