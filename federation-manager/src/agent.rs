use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use ethers::types::H256;
use eyre::Result;
use ledger_adapter::{EthereumLedgerAdapter, LedgerAdapter};
use mec_base::agent::{BaseAgent, FederationAgentCore};
use mec_base::metrics::CoreMetrics;
use tokio::task::JoinHandle;
use tracing::{info, instrument::Instrumented, Instrument};

use crate::server::{build_router, AppState};
use crate::settings::Settings;

/// The Federation Manager agent: holds the ledger connection and drives the
/// REST surface the rest of this domain (and its peers' Federation
/// Managers, via HTTP) calls into.
pub struct FederationManagerAgent {
    core: FederationAgentCore,
    settings: Settings,
    adapter: Arc<dyn LedgerAdapter>,
}

impl fmt::Debug for FederationManagerAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FederationManagerAgent")
            .field("core", &self.core)
            .field("domain_name", &self.settings.base.domain_name)
            .finish()
    }
}

#[async_trait]
impl BaseAgent for FederationManagerAgent {
    const AGENT_NAME: &'static str = "federation-manager";

    type Settings = Settings;

    async fn from_settings(settings: Self::Settings, metrics: Arc<CoreMetrics>) -> Result<Self> {
        let private_key: H256 = settings.base.private_key;
        let adapter = EthereumLedgerAdapter::connect(
            &settings.base.rpc_url,
            settings.base.contract_address,
            private_key,
            settings.chain_id,
        )
        .await?;
        Ok(Self {
            core: FederationAgentCore { metrics, settings: settings.base.clone() },
            adapter: Arc::new(adapter),
            settings,
        })
    }

    async fn run(&self) -> Instrumented<JoinHandle<Result<()>>> {
        let state = Arc::new(AppState::new(self.adapter.clone(), self.settings.clone()));
        let addr = SocketAddr::from(([0, 0, 0, 0], self.settings.listen_port));
        let router = build_router(state);
        let span = tracing::info_span!("federation_manager_server");

        tokio::spawn(async move {
            info!(%addr, "federation manager listening");
            axum::Server::bind(&addr).serve(router.into_make_service()).await?;
            Ok(())
        })
        .instrument(span)
    }
}
