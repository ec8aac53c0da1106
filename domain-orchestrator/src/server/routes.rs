use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::error::OrchestrationError;
use crate::vxlan::{self, SystemLinkRunner, VxlanParams};

use super::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/deploy_docker_service", post(deploy_docker_service))
        .route("/delete_docker_service", delete(delete_docker_service))
        .route("/scale_docker_service", post(scale_docker_service))
        .route("/attach_to_network", post(attach_to_network))
        .route("/exec", post(exec))
        .route("/service_ips", get(service_ips))
        .route("/configure_vxlan", post(configure_vxlan))
        .route("/delete_vxlan", delete(delete_vxlan))
        .route("/cleanup", delete(cleanup))
        .route("/monitor/start", post(monitor_start))
        .route("/monitor/stop", post(monitor_stop))
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

#[derive(Deserialize)]
struct DeployServiceRequest {
    image: String,
    name: String,
    network: String,
    replicas: u32,
    container_port: Option<u16>,
    host_port_start: Option<u16>,
    #[serde(default)]
    env: Vec<String>,
}

async fn deploy_docker_service(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DeployServiceRequest>,
) -> Result<Json<Reply<HashMap<String, String>>>, OrchestrationError> {
    let ips = state
        .docker
        .deploy_service(
            &req.image,
            &req.name,
            &req.network,
            req.replicas,
            req.container_port,
            req.host_port_start,
            &req.env,
        )
        .await?;
    Ok(Reply::ok("deployed", ips))
}

#[derive(Deserialize)]
struct NamePrefixRequest {
    name: String,
}

async fn delete_docker_service(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NamePrefixRequest>,
) -> Result<Json<Reply<u32>>, OrchestrationError> {
    let count = state.docker.delete_service(&req.name).await?;
    Ok(Reply::ok("deleted", count))
}

#[derive(Deserialize)]
struct ScaleServiceRequest {
    name: String,
    replicas: u32,
}

async fn scale_docker_service(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ScaleServiceRequest>,
) -> Result<Json<Reply<HashMap<String, String>>>, OrchestrationError> {
    let ips = state.docker.scale_service(&req.name, req.replicas).await?;
    Ok(Reply::ok("scaled", ips))
}

#[derive(Deserialize)]
struct AttachRequest {
    container_name: String,
    network_name: String,
}

async fn attach_to_network(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AttachRequest>,
) -> Result<Json<Reply<()>>, OrchestrationError> {
    state
        .docker
        .attach_to_network(&req.container_name, &req.network_name)
        .await?;
    Ok(Reply::ok_empty("attached"))
}

#[derive(Deserialize)]
struct ExecRequest {
    container_name: String,
    cmd: String,
}

#[derive(Serialize)]
struct ExecReply {
    exit_code: i64,
    stdout: String,
    stderr: String,
}

async fn exec(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ExecRequest>,
) -> Result<Json<Reply<ExecReply>>, OrchestrationError> {
    let result = state.docker.exec(&req.container_name, &req.cmd).await?;
    Ok(Reply::ok(
        "executed",
        ExecReply {
            exit_code: result.exit_code,
            stdout: result.stdout,
            stderr: result.stderr,
        },
    ))
}

#[derive(Deserialize)]
struct ServiceIpsQuery {
    name: String,
}

async fn service_ips(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ServiceIpsQuery>,
) -> Result<Json<Reply<HashMap<String, String>>>, OrchestrationError> {
    let ips = state.docker.service_ips(&query.name).await?;
    Ok(Reply::ok("ok", ips))
}

#[derive(Deserialize)]
struct ConfigureVxlanRequest {
    local_ip: String,
    remote_ip: String,
    dev: String,
    vxlan_id: u32,
    dst_port: u16,
    subnet: String,
    ip_range: String,
    docker_net_name: String,
}

async fn configure_vxlan(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ConfigureVxlanRequest>,
) -> Result<Json<Reply<()>>, OrchestrationError> {
    let network_id = state
        .docker
        .ensure_bridge_network(&req.docker_net_name, &req.subnet, &req.ip_range)
        .await?;
    let bridge = crate::docker_ops::DockerOrchestrator::bridge_name_for_network(&network_id);

    let params = VxlanParams {
        local_ip: &req.local_ip,
        remote_ip: &req.remote_ip,
        dev: &req.dev,
        vxlan_id: req.vxlan_id,
        dst_port: req.dst_port,
        bridge: &bridge,
    };
    vxlan::configure_vxlan(&SystemLinkRunner, &params).await?;
    Ok(Reply::ok_empty("vxlan configured"))
}

#[derive(Deserialize)]
struct DeleteVxlanRequest {
    vxlan_id: u32,
    #[serde(default)]
    #[allow(dead_code)]
    docker_net_name: Option<String>,
}

async fn delete_vxlan(Json(req): Json<DeleteVxlanRequest>) -> Result<Json<Reply<()>>, OrchestrationError> {
    vxlan::delete_vxlan(&SystemLinkRunner, req.vxlan_id).await?;
    Ok(Reply::ok_empty("vxlan deleted"))
}

#[derive(Deserialize)]
struct CleanupRequest {
    container_prefix: String,
    network_prefix: String,
    vxlan_prefix: String,
}

async fn cleanup(State(state): State<Arc<AppState>>, Json(req): Json<CleanupRequest>) -> Json<Reply<()>> {
    state
        .docker
        .cleanup_by_prefix(&req.container_prefix, &req.network_prefix, &req.vxlan_prefix)
        .await;
    Reply::ok_empty("cleanup complete")
}

#[derive(Deserialize)]
struct MonitorStartRequest {
    container_ref: String,
    interval_s: u64,
    csv_path: Option<String>,
}

async fn monitor_start(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MonitorStartRequest>,
) -> Result<Json<Reply<()>>, OrchestrationError> {
    state
        .monitor
        .start(
            state.docker.client().clone(),
            req.container_ref,
            req.interval_s,
            req.csv_path,
        )
        .await?;
    Ok(Reply::ok_empty("monitor started"))
}

async fn monitor_stop(State(state): State<Arc<AppState>>) -> Result<Json<Reply<()>>, OrchestrationError> {
    state.monitor.stop().await?;
    Ok(Reply::ok_empty("monitor stopped"))
}
