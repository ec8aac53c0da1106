use ethers::types::{Address, H256};
use mec_core::Role;
use serde::Deserialize;

pub mod loader;
mod trace;

pub use trace::{Level, Style, TracingConfig};

/// The configuration every federation agent needs regardless of whether it
/// is running as the Domain Orchestrator or the Federation Manager: how to
/// reach the ledger, who this domain is, and how to log/expose metrics.
///
/// Fields that would naturally be integers are kept as `String` so they can
/// be overridden by environment variables (`config::Environment` does not
/// coerce types); callers parse them in `from_settings`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// `ws://` or `http://` URL of the ledger node.
    pub rpc_url: String,
    /// EIP-55 address of the deployed federation contract.
    pub contract_address: Address,
    /// This domain's signing key, hex-encoded with or without `0x`.
    pub private_key: H256,
    /// `consumer` or `provider` for this run.
    pub role: Role,
    /// Human-readable name used in logs and CSV output.
    pub domain_name: String,
    /// Small integer identifying this host in the testbed; derives VXLAN
    /// id/port and the `/24` within the federation `/16`.
    pub node_id: u8,
    /// Port the `/metrics` server listens on. Absent disables the server.
    #[serde(default)]
    pub metrics_port: Option<u16>,
    #[serde(default)]
    pub tracing: TracingConfig,
}

impl AsRef<Settings> for Settings {
    fn as_ref(&self) -> &Settings {
        self
    }
}
