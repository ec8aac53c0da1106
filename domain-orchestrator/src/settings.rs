use mec_base::settings::{loader, TracingConfig};
use serde::Deserialize;

/// Configuration for the Domain Orchestrator binary. Unlike the Federation
/// Manager, the DO never talks to the ledger, so it does not carry
/// `mec_base::Settings`'s chain-credential fields — only what a stateless
/// host-local HTTP service needs.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Port the DO's own REST API listens on.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    /// Port the `/metrics` server listens on. Absent disables it.
    #[serde(default)]
    pub metrics_port: Option<u16>,
    #[serde(default)]
    pub tracing: TracingConfig,
}

fn default_listen_port() -> u16 {
    8000
}

impl Settings {
    pub fn load() -> eyre::Result<Self> {
        loader::load_settings_object("ORCHESTRATOR")
    }
}
