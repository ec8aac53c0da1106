use std::collections::HashMap;
use std::time::Duration;

use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::warn;

use crate::error::FederationError;

/// How long a single DO call may take before the client gives up and
/// retries, mirroring `utils.py`'s poll-with-timeout idiom.
const DO_CALL_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_RETRIES: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_millis(500);

#[derive(Deserialize)]
struct DoReply<T> {
    success: bool,
    message: String,
    #[serde(default)]
    data: Option<T>,
}

/// Thin HTTP client to the local Domain Orchestrator. Every method retries
/// on a non-`success` JSON body up to `MAX_RETRIES` times (spec's DO calls
/// are host-local and expected to be reliable; retries absorb transient
/// container-runtime hiccups, not network partitions).
#[derive(Clone)]
pub struct DoClient {
    base_url: String,
    http: Client,
}

impl DoClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            http: Client::builder().timeout(DO_CALL_TIMEOUT).build().expect("http client"),
        }
    }

    async fn post<Req: Serialize, Resp: DeserializeOwned>(&self, path: &str, body: &Req) -> Result<Resp, FederationError> {
        self.call_with_retry(|| self.http.post(format!("{}{}", self.base_url, path)).json(body))
            .await
    }

    async fn post_empty<Req: Serialize>(&self, path: &str, body: &Req) -> Result<(), FederationError> {
        self.call_with_retry_empty(|| self.http.post(format!("{}{}", self.base_url, path)).json(body))
            .await
    }

    async fn delete<Req: Serialize, Resp: DeserializeOwned>(&self, path: &str, body: &Req) -> Result<Resp, FederationError> {
        self.call_with_retry(|| self.http.delete(format!("{}{}", self.base_url, path)).json(body))
            .await
    }

    /// Sends requests until a reply with a populated `data` arrives, or
    /// retries are exhausted. Used by every DO call whose body carries a
    /// payload on success.
    async fn call_with_retry<Resp, F>(&self, build: F) -> Result<Resp, FederationError>
    where
        Resp: DeserializeOwned,
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut last_err = String::new();
        for attempt in 0..MAX_RETRIES {
            let response = match build().send().await {
                Ok(r) => r,
                Err(e) => {
                    last_err = e.to_string();
                    warn!(attempt, error = %last_err, "domain orchestrator call failed, retrying");
                    tokio::time::sleep(RETRY_DELAY).await;
                    continue;
                }
            };
            let reply: DoReply<Resp> = match response.json().await {
                Ok(r) => r,
                Err(e) => {
                    last_err = e.to_string();
                    tokio::time::sleep(RETRY_DELAY).await;
                    continue;
                }
            };
            if reply.success {
                return reply
                    .data
                    .ok_or_else(|| FederationError::DomainOrchestrator("missing data in successful reply".into()));
            }
            last_err = reply.message;
            tokio::time::sleep(RETRY_DELAY).await;
        }
        Err(FederationError::DomainOrchestrator(last_err))
    }

    /// Same retry loop as `call_with_retry`, for DO endpoints whose reply
    /// carries no `data` at all on success (`configure_vxlan`,
    /// `attach_to_network`) — `reply.success` alone is the signal, since
    /// `Option<()>` can never be deserialized from an absent/null field.
    async fn call_with_retry_empty<F>(&self, build: F) -> Result<(), FederationError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut last_err = String::new();
        for attempt in 0..MAX_RETRIES {
            let response = match build().send().await {
                Ok(r) => r,
                Err(e) => {
                    last_err = e.to_string();
                    warn!(attempt, error = %last_err, "domain orchestrator call failed, retrying");
                    tokio::time::sleep(RETRY_DELAY).await;
                    continue;
                }
            };
            let reply: DoReply<()> = match response.json().await {
                Ok(r) => r,
                Err(e) => {
                    last_err = e.to_string();
                    tokio::time::sleep(RETRY_DELAY).await;
                    continue;
                }
            };
            if reply.success {
                return Ok(());
            }
            last_err = reply.message;
            tokio::time::sleep(RETRY_DELAY).await;
        }
        Err(FederationError::DomainOrchestrator(last_err))
    }

    pub async fn deploy_service(
        &self,
        image: &str,
        name: &str,
        network: &str,
        replicas: u32,
        container_port: Option<u16>,
        host_port_start: Option<u16>,
        env: &[String],
    ) -> Result<HashMap<String, String>, FederationError> {
        #[derive(Serialize)]
        struct Req<'a> {
            image: &'a str,
            name: &'a str,
            network: &'a str,
            replicas: u32,
            container_port: Option<u16>,
            host_port_start: Option<u16>,
            env: &'a [String],
        }
        self.post(
            "/deploy_docker_service",
            &Req {
                image,
                name,
                network,
                replicas,
                container_port,
                host_port_start,
                env,
            },
        )
        .await
    }

    pub async fn configure_vxlan(
        &self,
        local_ip: &str,
        remote_ip: &str,
        dev: &str,
        vxlan_id: u32,
        dst_port: u16,
        subnet: &str,
        ip_range: &str,
        docker_net_name: &str,
    ) -> Result<(), FederationError> {
        #[derive(Serialize)]
        struct Req<'a> {
            local_ip: &'a str,
            remote_ip: &'a str,
            dev: &'a str,
            vxlan_id: u32,
            dst_port: u16,
            subnet: &'a str,
            ip_range: &'a str,
            docker_net_name: &'a str,
        }
        self.post_empty(
            "/configure_vxlan",
            &Req {
                local_ip,
                remote_ip,
                dev,
                vxlan_id,
                dst_port,
                subnet,
                ip_range,
                docker_net_name,
            },
        )
        .await
    }

    pub async fn attach_to_network(&self, container_name: &str, network_name: &str) -> Result<(), FederationError> {
        #[derive(Serialize)]
        struct Req<'a> {
            container_name: &'a str,
            network_name: &'a str,
        }
        self.post_empty("/attach_to_network", &Req { container_name, network_name }).await
    }

    pub async fn exec(&self, container_name: &str, cmd: &str) -> Result<ExecOutput, FederationError> {
        #[derive(Serialize)]
        struct Req<'a> {
            container_name: &'a str,
            cmd: &'a str,
        }
        self.post("/exec", &Req { container_name, cmd }).await
    }

    pub async fn delete_service(&self, name: &str) -> Result<u32, FederationError> {
        #[derive(Serialize)]
        struct Req<'a> {
            name: &'a str,
        }
        self.delete("/delete_docker_service", &Req { name }).await
    }
}

#[derive(Deserialize)]
pub struct ExecOutput {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn retries_until_a_success_reply_arrives() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/attach_to_network"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": false,
                "message": "container is still starting",
            })))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/attach_to_network"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "message": "attached",
                "data": null,
            })))
            .with_priority(2)
            .mount(&server)
            .await;

        let client = DoClient::new(server.uri());
        client.attach_to_network("mecapp-0", "fed-net-0").await.unwrap();
    }

    #[tokio::test]
    async fn gives_up_after_exhausting_retries() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/attach_to_network"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": false,
                "message": "container not found",
            })))
            .mount(&server)
            .await;

        let client = DoClient::new(server.uri());
        let err = client.attach_to_network("mecapp-0", "fed-net-0").await.unwrap_err();
        assert!(matches!(err, FederationError::DomainOrchestrator(msg) if msg == "container not found"));
    }
}
