use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use eyre::{Report, Result};
use futures_util::future::select_all;
use tokio::task::JoinHandle;
use tracing::{info_span, instrument::Instrumented, Instrument};

use crate::{metrics::CoreMetrics, settings::Settings};

/// Properties every federation agent carries regardless of role.
#[derive(Debug)]
pub struct FederationAgentCore {
    pub metrics: Arc<CoreMetrics>,
    pub settings: Settings,
}

/// Settings of an agent, loadable from config files and environment alone.
pub trait NewFromSettings: AsRef<Settings> + Sized {
    type Error: Into<Report>;

    fn new() -> std::result::Result<Self, Self::Error>;
}

/// A fundamental agent which does not make any assumptions about the role
/// it plays in the federation protocol.
#[async_trait]
pub trait BaseAgent: Send + Sync + Debug {
    const AGENT_NAME: &'static str;

    type Settings: NewFromSettings;

    async fn from_settings(settings: Self::Settings, metrics: Arc<CoreMetrics>) -> Result<Self>
    where
        Self: Sized;

    /// Start running this agent; the returned handle resolves when the
    /// agent's supervised tasks end.
    #[allow(clippy::async_yields_async)]
    async fn run(&self) -> Instrumented<JoinHandle<Result<()>>>;
}

/// Call this from `main` to fully initialize and run the agent for its
/// entire lifecycle: loads settings, starts tracing, starts the metrics
/// server, then runs the agent until its tasks end.
pub async fn agent_main<A: BaseAgent>() -> Result<()> {
    color_eyre::install()?;

    let settings = A::Settings::new().map_err(Into::into)?;
    let core_settings: &Settings = settings.as_ref();
    core_settings.tracing.start_tracing()?;

    let metrics = Arc::new(CoreMetrics::new(
        A::AGENT_NAME,
        core_settings.metrics_port,
        prometheus::Registry::new(),
    )?);
    metrics.clone().run_http_server();

    let agent = A::from_settings(settings, metrics).await?;
    agent.run().await.await?
}

/// Run multiple supervised tasks and shut the whole agent down if any one
/// of them ends, cancelling the rest.
#[allow(clippy::unit_arg, unused_must_use)]
pub fn run_all(tasks: Vec<Instrumented<JoinHandle<Result<(), Report>>>>) -> Instrumented<JoinHandle<Result<()>>> {
    debug_assert!(!tasks.is_empty(), "no tasks submitted");
    let span = info_span!("run_all");
    tokio::spawn(async move {
        let (res, _, remaining) = select_all(tasks).await;
        for task in remaining.into_iter() {
            crate::cancel_task!(task);
        }
        res?
    })
    .instrument(span)
}
