use federation_manager::FederationManagerAgent;
use mec_base::agent::agent_main;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    agent_main::<FederationManagerAgent>().await
}
