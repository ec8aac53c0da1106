use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::{Path as AxumPath, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use ethers::types::H256;
use mec_core::{Endpoint, ServiceId, ServiceState};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::warn;

use crate::consumer::run_consumer;
use crate::error::FederationError;
use crate::models::{BatchOutcome, RunOutcome, StartConsumerRequest, StartProviderBatchedRequest, StartProviderRequest};
use crate::provider::{run_provider_batched, run_provider_single, BatchResult, SingleOutcome};

use super::{AppState, Subscription};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/announce_service", post(announce_service))
        .route("/place_bid", post(place_bid))
        .route("/choose_provider", post(choose_provider))
        .route("/service_state/:id", get(service_state))
        .route("/service_deployed", post(service_deployed))
        .route("/register_domain/:name", post(register_domain))
        .route("/unregister_domain", delete(unregister_domain))
        .route("/tx_receipt/:tx_hash", get(tx_receipt))
        .route("/web3_info", get(web3_info))
        .route("/start_experiments_registration", post(start_experiments_registration))
        .route("/start_experiments_consumer", post(start_experiments_consumer))
        .route("/start_experiments_provider", post(start_experiments_provider))
        .route(
            "/start_experiments_provider_multiple_requests",
            post(start_experiments_provider_multiple_requests),
        )
        .route("/subscriptions", post(create_subscription).get(list_subscriptions))
        .route("/subscriptions/:id", delete(delete_subscription))
}

#[derive(Serialize)]
struct Reply<T> {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
}

impl<T> Reply<T> {
    fn ok(message: impl Into<String>, data: T) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.into(),
            data: Some(data),
        })
    }
}

impl Reply<()> {
    fn ok_empty(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.into(),
            data: None,
        })
    }
}

fn parse_h256(s: &str) -> Result<H256, FederationError> {
    H256::from_str(s.trim_start_matches("0x")).map_err(|_| FederationError::InvalidInput(format!("not a tx hash: {s}")))
}

#[derive(Deserialize)]
struct AnnounceServiceRequest {
    requirements: String,
}

#[derive(Serialize)]
struct AnnounceServiceReply {
    tx_hash: String,
    service_id: String,
}

async fn announce_service(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AnnounceServiceRequest>,
) -> Result<Json<Reply<AnnounceServiceReply>>, FederationError> {
    let endpoint = Endpoint {
        ip_address: state.settings.local_ip,
        vxlan_id: state.settings.federation_net.map(|_| mec_core::vxlan_id_for_node(state.settings.base.node_id)),
        vxlan_port: state.settings.federation_net.map(|_| mec_core::vxlan_port_for_node(state.settings.base.node_id)),
        federation_net: state.settings.federation_net,
    };
    let (tx_hash, service_id, _) = state
        .adapter
        .announce_service(&state.settings.base.domain_name, &req.requirements, &endpoint)
        .await?;
    Ok(Reply::ok(
        "announced",
        AnnounceServiceReply {
            tx_hash: format!("{tx_hash:#x}"),
            service_id: service_id.to_string(),
        },
    ))
}

#[derive(Deserialize)]
struct PlaceBidRequest {
    service_id: String,
    price: u64,
    #[serde(default)]
    provider_endpoint: Option<String>,
}

async fn place_bid(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PlaceBidRequest>,
) -> Result<Json<Reply<String>>, FederationError> {
    let service_id = ServiceId::from_raw(req.service_id);
    let endpoint = match req.provider_endpoint {
        Some(s) => Endpoint::parse(&s).map_err(|e| FederationError::InvalidInput(e.to_string()))?,
        None => Endpoint {
            ip_address: state.settings.local_ip,
            vxlan_id: None,
            vxlan_port: None,
            federation_net: None,
        },
    };
    let tx_hash = state.adapter.place_bid(&service_id, req.price, &endpoint).await?;
    Ok(Reply::ok("bid placed", format!("{tx_hash:#x}")))
}

#[derive(Deserialize)]
struct ChooseProviderRequest {
    service_id: String,
    bid_index: u64,
}

async fn choose_provider(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChooseProviderRequest>,
) -> Result<Json<Reply<String>>, FederationError> {
    let service_id = ServiceId::from_raw(req.service_id);
    let tx_hash = state.adapter.choose_provider(&service_id, req.bid_index).await?;
    Ok(Reply::ok("provider chosen", format!("{tx_hash:#x}")))
}

async fn service_state(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<Reply<ServiceState>>, FederationError> {
    let service_id = ServiceId::from_raw(id);
    let state_value = state.adapter.get_service_state(&service_id).await?;
    Ok(Reply::ok("ok", state_value))
}

#[derive(Deserialize)]
struct ServiceDeployedRequest {
    service_id: String,
    federated_host: String,
}

async fn service_deployed(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ServiceDeployedRequest>,
) -> Result<Json<Reply<String>>, FederationError> {
    let service_id = ServiceId::from_raw(req.service_id);
    let tx_hash = state.adapter.service_deployed(&service_id, &req.federated_host).await?;
    Ok(Reply::ok("deployment confirmed", format!("{tx_hash:#x}")))
}

async fn register_domain(
    State(state): State<Arc<AppState>>,
    AxumPath(name): AxumPath<String>,
) -> Result<Json<Reply<String>>, FederationError> {
    let tx_hash = state.adapter.register_domain(&name).await?;
    Ok(Reply::ok("registered", format!("{tx_hash:#x}")))
}

async fn unregister_domain(State(state): State<Arc<AppState>>) -> Result<Json<Reply<String>>, FederationError> {
    let tx_hash = state.adapter.unregister_domain().await?;
    Ok(Reply::ok("unregistered", format!("{tx_hash:#x}")))
}

async fn tx_receipt(
    State(state): State<Arc<AppState>>,
    AxumPath(tx_hash): AxumPath<String>,
) -> Result<Json<Reply<Option<bool>>>, FederationError> {
    let hash = parse_h256(&tx_hash)?;
    let status = state.adapter.transaction_receipt(hash).await?;
    Ok(Reply::ok("ok", status))
}

#[derive(Serialize)]
struct Web3Info {
    chain_id: u64,
    current_block: u64,
    domain_name: String,
    node_id: u8,
}

async fn web3_info(State(state): State<Arc<AppState>>) -> Result<Json<Reply<Web3Info>>, FederationError> {
    let current_block = state.adapter.current_block().await?;
    Ok(Reply::ok(
        "ok",
        Web3Info {
            chain_id: state.settings.chain_id,
            current_block,
            domain_name: state.settings.base.domain_name.clone(),
            node_id: state.settings.base.node_id,
        },
    ))
}

async fn start_experiments_registration(State(state): State<Arc<AppState>>) -> Result<Json<Reply<String>>, FederationError> {
    let tx_hash = state.adapter.register_domain(&state.settings.base.domain_name).await?;
    Ok(Reply::ok("domain registered", format!("{tx_hash:#x}")))
}

fn write_telemetry(csv_dir: &str, service_id: &ServiceId, recorder: &mec_core::PhaseRecorder) {
    let dir = Path::new(csv_dir);
    if let Err(err) = std::fs::create_dir_all(dir) {
        warn!(%err, "could not create telemetry directory");
        return;
    }
    let path = dir.join(format!("{service_id}.csv"));
    if let Err(err) = recorder.write(&path) {
        warn!(%err, path = %path.display(), "failed to write phase telemetry");
    }
}

async fn start_experiments_consumer(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StartConsumerRequest>,
) -> Result<Json<Reply<RunOutcome>>, FederationError> {
    let run = run_consumer(
        state.adapter.as_ref(),
        &state.do_client,
        &state.settings,
        &req.requirements,
        req.offers_to_wait,
        req.price_threshold,
    )
    .await?;
    write_telemetry(&state.settings.csv_dir, &run.service_id, &run.recorder);
    let outcome = if run.connection_ok {
        RunOutcome::success(&run.service_id)
    } else {
        RunOutcome::success_with_detail(&run.service_id, "reachability probe failed")
    };
    Ok(Reply::ok("run complete", outcome))
}

async fn start_experiments_provider(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StartProviderRequest>,
) -> Result<Json<Reply<RunOutcome>>, FederationError> {
    let outcome = run_provider_single(
        state.adapter.as_ref(),
        &state.do_client,
        &state.settings,
        req.requirements_filter.as_deref(),
        req.bid_price,
        &req.image,
    )
    .await?;
    let (service_id, recorder, result) = match outcome {
        SingleOutcome::Deployed { service_id, recorder } => {
            let r = RunOutcome::success(&service_id);
            (service_id, recorder, r)
        }
        SingleOutcome::Lost { service_id, recorder } => {
            let r = RunOutcome::success_with_detail(&service_id, "lost the bid");
            (service_id, recorder, r)
        }
        SingleOutcome::Skipped { service_id, recorder } => {
            let r = RunOutcome::success_with_detail(&service_id, "request closed before bid landed");
            (service_id, recorder, r)
        }
    };
    write_telemetry(&state.settings.csv_dir, &service_id, &recorder);
    Ok(Reply::ok("run complete", result))
}

async fn start_experiments_provider_multiple_requests(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StartProviderBatchedRequest>,
) -> Result<Json<Reply<BatchOutcome>>, FederationError> {
    let BatchResult {
        deployed,
        lost,
        skipped,
        recorder,
    } = run_provider_batched(
        state.adapter.as_ref(),
        &state.do_client,
        &state.settings,
        req.requirements_filter.as_deref(),
        req.bid_price,
        &req.image,
        req.requests_to_wait,
    )
    .await?;

    let batch_id = ServiceId::from_raw(format!("batch{}", chrono::Utc::now().timestamp()));
    write_telemetry(&state.settings.csv_dir, &batch_id, &recorder);

    Ok(Reply::ok(
        "batch complete",
        BatchOutcome {
            deployed: deployed.into_iter().map(|id| id.to_string()).collect(),
            lost: lost.into_iter().map(|id| id.to_string()).collect(),
            skipped: skipped.into_iter().map(|id| id.to_string()).collect(),
        },
    ))
}

#[derive(Deserialize)]
struct CreateSubscriptionRequest {
    kind: String,
    callback_url: String,
}

#[derive(Serialize)]
struct SubscriptionCreated {
    id: u64,
}

async fn create_subscription(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSubscriptionRequest>,
) -> Result<Json<Reply<SubscriptionCreated>>, FederationError> {
    let id = state.next_subscription_id.fetch_add(1, Ordering::SeqCst);
    let task = spawn_subscription_task(state.clone(), id, req.kind.clone(), req.callback_url.clone());
    state.subscriptions.lock().await.insert(
        id,
        Subscription {
            kind: req.kind,
            callback_url: req.callback_url,
            task,
        },
    );
    Ok(Reply::ok("subscribed", SubscriptionCreated { id }))
}

#[derive(Serialize)]
struct SubscriptionSummary {
    id: u64,
    kind: String,
    callback_url: String,
}

async fn list_subscriptions(State(state): State<Arc<AppState>>) -> Json<Reply<Vec<SubscriptionSummary>>> {
    let subs = state.subscriptions.lock().await;
    let summaries = subs
        .iter()
        .map(|(id, s)| SubscriptionSummary {
            id: *id,
            kind: s.kind.clone(),
            callback_url: s.callback_url.clone(),
        })
        .collect();
    Reply::ok("ok", summaries)
}

async fn delete_subscription(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<u64>,
) -> Result<Json<Reply<()>>, FederationError> {
    let removed = state.subscriptions.lock().await.remove(&id);
    match removed {
        Some(sub) => {
            sub.task.abort();
            Ok(Reply::ok_empty("unsubscribed"))
        }
        None => Err(FederationError::NotFound(format!("subscription {id}"))),
    }
}

/// Poll one event kind every two seconds and forward new entries as JSON to
/// `callback_url`, until the subscription is deleted and its task aborted.
fn spawn_subscription_task(state: Arc<AppState>, id: u64, kind: String, callback_url: String) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let client = reqwest::Client::new();
        let mut since_block = state.adapter.current_block().await.unwrap_or(0);
        loop {
            tokio::time::sleep(std::time::Duration::from_secs(2)).await;
            let forwarded = match kind.as_str() {
                "announcement" => state.adapter.get_new_announcements(since_block).await.map(|(e, n)| (e.len(), n)),
                "bid" => state.adapter.get_new_bids(since_block).await.map(|(e, n)| (e.len(), n)),
                "closed" => state.adapter.get_new_closed(since_block).await.map(|(e, n)| (e.len(), n)),
                "registration" => state.adapter.get_new_registrations(since_block).await.map(|(e, n)| (e.len(), n)),
                other => {
                    warn!(subscription_id = id, kind = other, "unknown subscription kind, stopping");
                    return;
                }
            };
            match forwarded {
                Ok((new_count, next_block)) => {
                    since_block = next_block;
                    if new_count > 0 {
                        let body = serde_json::json!({"subscription_id": id, "kind": kind, "new_count": new_count});
                        if let Err(err) = client.post(&callback_url).json(&body).send().await {
                            warn!(subscription_id = id, %err, "failed to deliver subscription callback");
                        }
                    }
                }
                Err(err) => warn!(subscription_id = id, %err, "subscription poll failed"),
            }
        }
    })
}
