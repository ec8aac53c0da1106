use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use axum::{extract::State, routing::get, Router};
use eyre::Result;
use prometheus::{
    histogram_opts, labels, opts, register_counter_vec_with_registry,
    register_histogram_vec_with_registry, register_int_counter_vec_with_registry,
    register_int_gauge_vec_with_registry, CounterVec, Encoder, HistogramVec, IntCounterVec,
    IntGaugeVec, Registry,
};
use tokio::task::JoinHandle;

macro_rules! namespaced {
    ($name:expr) => {
        format!("{}_{}", super::NAMESPACE, $name)
    };
}

/// Prometheus metrics for one running agent (Domain Orchestrator or
/// Federation Manager).
pub struct CoreMetrics {
    registry: Registry,
    const_labels: HashMap<String, String>,
    listen_port: Option<u16>,
    agent_name: String,

    service_requests: IntGaugeVec,
    bids_submitted: IntCounterVec,
    deployments: IntCounterVec,
    phase_duration_seconds: HistogramVec,
    ledger_errors: IntCounterVec,
    span_events: IntCounterVec,
    span_duration_seconds: CounterVec,
}

impl CoreMetrics {
    /// - `for_agent`: `"domain-orchestrator"` or `"federation-manager"`.
    /// - `listen_port`: port the `/metrics` server binds on; `None` disables
    ///   it entirely.
    pub fn new(for_agent: &str, listen_port: Option<u16>, registry: Registry) -> prometheus::Result<Self> {
        let const_labels: HashMap<String, String> = labels! {
            namespaced!("baselib_version") => env!("CARGO_PKG_VERSION").into(),
            "agent".into() => for_agent.into(),
        };
        let const_labels_ref = const_labels
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect::<HashMap<_, _>>();

        let service_requests = register_int_gauge_vec_with_registry!(
            opts!(
                namespaced!("service_requests"),
                "Service requests currently tracked, by state",
                const_labels_ref
            ),
            &["state"],
            registry
        )?;

        let bids_submitted = register_int_counter_vec_with_registry!(
            opts!(
                namespaced!("bids_submitted_total"),
                "Bids submitted by this domain acting as a provider",
                const_labels_ref
            ),
            &["outcome"],
            registry
        )?;

        let deployments = register_int_counter_vec_with_registry!(
            opts!(
                namespaced!("deployments_total"),
                "Container deployments performed by the Domain Orchestrator",
                const_labels_ref
            ),
            &["outcome"],
            registry
        )?;

        let phase_duration_seconds = register_histogram_vec_with_registry!(
            histogram_opts!(
                namespaced!("phase_duration_seconds"),
                "Wall-clock time spent in each protocol phase",
                const_labels.clone()
            ),
            &["phase"],
            registry
        )?;

        let ledger_errors = register_int_counter_vec_with_registry!(
            opts!(
                namespaced!("ledger_errors_total"),
                "Ledger adapter errors, by kind",
                const_labels_ref
            ),
            &["kind"],
            registry
        )?;

        let span_events = register_int_counter_vec_with_registry!(
            opts!(
                namespaced!("span_events_total"),
                "Number of span events emitted, by level",
                const_labels_ref
            ),
            &["event_level"],
            registry
        )?;

        let span_duration_seconds = register_counter_vec_with_registry!(
            opts!(
                namespaced!("span_duration_seconds"),
                "Duration from tracing span creation to span destruction",
                const_labels_ref
            ),
            &["span_name", "span_target"],
            registry
        )?;

        Ok(Self {
            agent_name: for_agent.into(),
            registry,
            listen_port,
            const_labels,
            service_requests,
            bids_submitted,
            deployments,
            phase_duration_seconds,
            ledger_errors,
            span_events,
            span_duration_seconds,
        })
    }

    /// Service requests currently tracked, labeled by `state`
    /// (`open`/`closed`/`deployed`).
    pub fn service_requests(&self) -> IntGaugeVec {
        self.service_requests.clone()
    }

    /// Bids this domain submitted as a provider, labeled by `outcome`
    /// (`won`/`lost`/`not_open`).
    pub fn bids_submitted(&self) -> IntCounterVec {
        self.bids_submitted.clone()
    }

    /// Container deployments, labeled by `outcome` (`success`/`failure`).
    pub fn deployments(&self) -> IntCounterVec {
        self.deployments.clone()
    }

    /// Wall-clock duration of each named protocol phase.
    pub fn phase_duration_seconds(&self) -> HistogramVec {
        self.phase_duration_seconds.clone()
    }

    /// Ledger adapter errors, labeled by `kind`
    /// (`transient`/`revert`/`timeout`).
    pub fn ledger_errors(&self) -> IntCounterVec {
        self.ledger_errors.clone()
    }

    pub fn span_events(&self) -> IntCounterVec {
        self.span_events.clone()
    }

    pub fn span_duration_seconds(&self) -> CounterVec {
        self.span_duration_seconds.clone()
    }

    /// Gather available metrics into an encoded (plaintext, OpenMetrics
    /// format) report.
    pub fn gather(&self) -> prometheus::Result<Vec<u8>> {
        let collected_metrics = self.registry.gather();
        let mut out_buf = Vec::with_capacity(1024 * 16);
        let encoder = prometheus::TextEncoder::new();
        encoder.encode(&collected_metrics, &mut out_buf)?;
        Ok(out_buf)
    }

    /// Run an HTTP server serving OpenMetrics reports on `/metrics`. Returns
    /// a ready-resolved handle if `listen_port` was never configured.
    pub fn run_http_server(self: Arc<Self>) -> JoinHandle<()> {
        let Some(port) = self.listen_port else {
            tracing::info!("not starting prometheus server");
            return tokio::spawn(std::future::ready(()));
        };
        tracing::info!(port, "starting prometheus server");
        let app = Router::new()
            .route("/metrics", get(serve_metrics))
            .with_state(self);
        tokio::spawn(async move {
            let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
            if let Err(err) = axum::Server::bind(&addr).serve(app.into_make_service()).await {
                tracing::error!(?err, "metrics server exited");
            }
        })
    }

    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    #[allow(dead_code)]
    fn const_labels_str(&self) -> HashMap<&str, &str> {
        self.const_labels
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect()
    }
}

async fn serve_metrics(State(metrics): State<Arc<CoreMetrics>>) -> Result<Vec<u8>, axum::http::StatusCode> {
    metrics
        .gather()
        .map_err(|_| axum::http::StatusCode::INTERNAL_SERVER_ERROR)
}

impl Debug for CoreMetrics {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "CoreMetrics {{ agent_name: {}, listen_port: {:?} }}",
            self.agent_name, self.listen_port
        )
    }
}
