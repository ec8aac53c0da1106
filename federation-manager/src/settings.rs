use std::net::Ipv4Addr;

use mec_base::settings::loader;
use serde::Deserialize;

/// Federation Manager configuration: everything `mec_base::Settings`
/// carries (ledger endpoint, role, node id, tracing) plus how to reach this
/// domain's Domain Orchestrator and where to write run telemetry.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(flatten)]
    pub base: mec_base::Settings,
    /// Base URL of this domain's Domain Orchestrator, e.g.
    /// `http://localhost:8000`.
    pub do_base_url: String,
    /// Network interface carrying traffic to peer domains, passed to the
    /// DO's `ConfigureVxlan` as `dev`.
    pub uplink_device: String,
    /// Name of the already-running workload container this FM attaches to
    /// the federation overlay.
    pub workload_container: String,
    /// Directory CSV phase-telemetry files are written into.
    #[serde(default = "default_csv_dir")]
    pub csv_dir: String,
    /// Numeric chain id the ledger node reports, needed to sign
    /// transactions with `ethers::signers::LocalWallet`.
    pub chain_id: u64,
    /// Port the FM's own REST API listens on.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    /// This domain's IP address on the host's data-plane network, announced
    /// as the `ip_address` field of its `Endpoint`.
    pub local_ip: Ipv4Addr,
    /// The consumer's `/16` federation supernet, partitioned into `/24`s by
    /// node id (spec §6). Only meaningful in the consumer role.
    #[serde(default)]
    pub federation_net: Option<(Ipv4Addr, u8)>,
    /// Name of the docker bridge network used for this domain's single-run
    /// VXLAN overlay. Batched provider runs mint their own per-service names
    /// instead (`fed-net-<k>`).
    #[serde(default = "default_docker_net_name")]
    pub docker_net_name: String,
    #[serde(default = "default_subnet")]
    pub docker_subnet: String,
    #[serde(default = "default_ip_range")]
    pub docker_ip_range: String,
}

fn default_docker_net_name() -> String {
    "fed-net".to_string()
}

fn default_subnet() -> String {
    "10.61.0.0/24".to_string()
}

fn default_ip_range() -> String {
    "10.61.0.0/25".to_string()
}

fn default_csv_dir() -> String {
    "./telemetry".to_string()
}

fn default_listen_port() -> u16 {
    9000
}

impl AsRef<mec_base::Settings> for Settings {
    fn as_ref(&self) -> &mec_base::Settings {
        &self.base
    }
}

impl Settings {
    pub fn load() -> eyre::Result<Self> {
        loader::load_settings_object("FEDERATION_MANAGER")
    }
}

impl mec_base::agent::NewFromSettings for Settings {
    type Error = eyre::Report;

    fn new() -> Result<Self, Self::Error> {
        Self::load()
    }
}
