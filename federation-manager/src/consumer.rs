use std::time::Duration;

use ledger_adapter::LedgerAdapter;
use mec_core::{qualifying, subnet_for_node, vxlan_id_for_node, vxlan_port_for_node, Bid, Endpoint, PhaseRecorder, ServiceId, ServiceState};
use tracing::{info, warn};

use crate::do_client::DoClient;
use crate::error::FederationError;
use crate::settings::Settings;

const POLL_INTERVAL: Duration = Duration::from_millis(200);
const BID_WAIT_DEADLINE: Duration = Duration::from_secs(60);
const DEPLOY_WAIT_DEADLINE: Duration = Duration::from_secs(60);

pub struct ConsumerRun {
    pub service_id: ServiceId,
    pub recorder: PhaseRecorder,
    pub connection_ok: bool,
}

/// Drive the full consumer-side lifecycle for one run (spec §4.3):
/// announce, collect bids, choose a winner, wait for deployment, stitch the
/// VXLAN overlay, and probe reachability.
pub async fn run_consumer(
    adapter: &dyn LedgerAdapter,
    do_client: &DoClient,
    settings: &Settings,
    requirements: &str,
    offers_to_wait: u64,
    price_threshold: Option<u64>,
) -> Result<ConsumerRun, FederationError> {
    let mut recorder = PhaseRecorder::new();

    let node_id = settings.base.node_id;
    let federation_net = settings
        .federation_net
        .ok_or_else(|| FederationError::InvalidInput("federation_net is required for the consumer role".into()))?;

    let consumer_endpoint = Endpoint {
        ip_address: settings.local_ip,
        vxlan_id: Some(vxlan_id_for_node(node_id)),
        vxlan_port: Some(vxlan_port_for_node(node_id)),
        federation_net: Some(federation_net),
    };

    let (_, service_id, start_block) = adapter
        .announce_service(&settings.base.domain_name, requirements, &consumer_endpoint)
        .await?;
    recorder.mark("service_announced");
    recorder.set_service_id(service_id.to_string());
    info!(%service_id, "announced service");

    let winner = collect_bids_and_select_winner(adapter, &service_id, start_block, offers_to_wait, price_threshold, &mut recorder).await?;

    adapter.choose_provider(&service_id, winner.bid_index).await?;
    recorder.mark("winner_choosen");

    wait_for_deployed(adapter, &service_id, &mut recorder).await?;

    let connection_ok = stitch_network_and_probe(adapter, do_client, settings, &service_id, &mut recorder).await?;

    Ok(ConsumerRun {
        service_id,
        recorder,
        connection_ok,
    })
}

async fn collect_bids_and_select_winner(
    adapter: &dyn LedgerAdapter,
    service_id: &ServiceId,
    start_block: u64,
    offers_to_wait: u64,
    price_threshold: Option<u64>,
    recorder: &mut PhaseRecorder,
) -> Result<Bid, FederationError> {
    let deadline = tokio::time::Instant::now() + BID_WAIT_DEADLINE;
    let mut since_block = start_block;
    let mut seen_count = 0u64;
    let mut required_marked = false;

    loop {
        let (events, new_since) = adapter.get_new_bids(since_block).await?;
        since_block = new_since;
        for event in events
            .into_iter()
            .filter(|e| &e.service_id == service_id)
            .filter(|e| price_threshold.map(|max| e.price <= max).unwrap_or(true))
        {
            seen_count += 1;
            recorder.mark(format!("bid_received_{}", event.bid_index));
        }
        if !required_marked && seen_count >= offers_to_wait {
            recorder.mark("required_bids_received");
            required_marked = true;
            break;
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(FederationError::ProtocolTimeout("bid collection"));
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }

    let bids = adapter.get_bids(service_id).await?;
    let candidates: Vec<&Bid> = match price_threshold {
        Some(max) => qualifying(&bids, max),
        None => bids.iter().collect(),
    };
    let winner = candidates
        .into_iter()
        .min_by_key(|b| (b.price, b.bid_index))
        .ok_or(FederationError::NoQualifyingBid)?;
    Ok(*winner)
}

async fn wait_for_deployed(
    adapter: &dyn LedgerAdapter,
    service_id: &ServiceId,
    recorder: &mut PhaseRecorder,
) -> Result<(), FederationError> {
    let deadline = tokio::time::Instant::now() + DEPLOY_WAIT_DEADLINE;
    loop {
        if adapter.get_service_state(service_id).await? == ServiceState::Deployed {
            recorder.mark("confirm_deployment_received");
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(FederationError::ProtocolTimeout("deployment"));
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

async fn stitch_network_and_probe(
    adapter: &dyn LedgerAdapter,
    do_client: &DoClient,
    settings: &Settings,
    service_id: &ServiceId,
    recorder: &mut PhaseRecorder,
) -> Result<bool, FederationError> {
    recorder.mark("establish_vxlan_connection_with_provider_start");

    let (provider_endpoint, federated_host) = adapter.get_service_info(service_id, false).await?;
    let federation_net = provider_endpoint
        .federation_net
        .ok_or_else(|| FederationError::InvalidInput("provider endpoint is missing federation_net".into()))?;
    let (_subnet_ip, prefix) = subnet_for_node(federation_net, settings.base.node_id);
    let subnet = format!("{}/{}", federation_net.0, prefix);

    let vxlan_id = provider_endpoint
        .vxlan_id
        .ok_or_else(|| FederationError::InvalidInput("provider endpoint is missing vxlan_id".into()))?;
    let dst_port = provider_endpoint
        .vxlan_port
        .ok_or_else(|| FederationError::InvalidInput("provider endpoint is missing vxlan_port".into()))?;

    do_client
        .configure_vxlan(
            &settings.local_ip.to_string(),
            &provider_endpoint.ip_address.to_string(),
            &settings.uplink_device,
            vxlan_id,
            dst_port,
            &subnet,
            &settings.docker_ip_range,
            &settings.docker_net_name,
        )
        .await?;

    do_client
        .attach_to_network(&settings.workload_container, &settings.docker_net_name)
        .await?;
    recorder.mark("establish_vxlan_connection_with_provider_finished");

    let federated_host = federated_host.ok_or_else(|| FederationError::InvalidInput("provider has no federated host yet".into()))?;
    let probe = do_client
        .exec(&settings.workload_container, &format!("ping -c 6 -i 0.2 {federated_host}"))
        .await?;

    let loss = parse_packet_loss(&probe.stdout);
    let connection_ok = loss.map(|l| l < 100.0).unwrap_or(false);
    if connection_ok {
        recorder.mark("connection_test_success");
    } else {
        warn!(%service_id, loss = ?loss, "reachability probe failed");
        recorder.mark("connection_test_failure");
    }
    Ok(connection_ok)
}

/// Extract the `NN% packet loss` figure from `ping`'s summary line.
fn parse_packet_loss(stdout: &str) -> Option<f64> {
    stdout.lines().find_map(|line| {
        let marker = "% packet loss";
        let idx = line.find(marker)?;
        let prefix = &line[..idx];
        let start = prefix.rfind(|c: char| !c.is_ascii_digit() && c != '.').map(|i| i + 1).unwrap_or(0);
        prefix[start..].parse::<f64>().ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_packet_loss_from_ping_summary() {
        let stdout = "6 packets transmitted, 6 received, 0% packet loss, time 1005ms";
        assert_eq!(parse_packet_loss(stdout), Some(0.0));
    }

    #[test]
    fn parses_full_loss() {
        let stdout = "6 packets transmitted, 0 received, 100% packet loss, time 1005ms";
        assert_eq!(parse_packet_loss(stdout), Some(100.0));
    }
}
