use std::net::SocketAddr;
use std::sync::Arc;

use domain_orchestrator::docker_ops::DockerOrchestrator;
use domain_orchestrator::monitor::ResourceMonitor;
use domain_orchestrator::{build_router, AppState, Settings};
use mec_base::CoreMetrics;
use tracing::info;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    let settings = Settings::load()?;
    settings.tracing.start_tracing()?;

    if let Some(port) = settings.metrics_port {
        let metrics = Arc::new(CoreMetrics::new(
            "domain-orchestrator",
            Some(port),
            prometheus::Registry::new(),
        )?);
        metrics.run_http_server();
    }

    let state = Arc::new(AppState {
        docker: DockerOrchestrator::connect()?,
        monitor: ResourceMonitor::default(),
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.listen_port));
    info!(%addr, "domain orchestrator listening");

    axum::Server::bind(&addr)
        .serve(build_router(state).into_make_service())
        .await?;
    Ok(())
}
