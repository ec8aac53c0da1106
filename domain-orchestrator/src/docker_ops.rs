use std::collections::HashMap;
use std::time::Duration;

use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, RemoveContainerOptions, StartContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::models::{EndpointSettings, HostConfig, PortBinding};
use bollard::network::{ConnectNetworkOptions, CreateNetworkOptions, ListNetworksOptions};
use bollard::Docker;
use futures_util::StreamExt;
use tracing::{info, warn};

use crate::error::OrchestrationError;

/// How often deployment polls the container's status while waiting for it
/// to reach `running` (spec §4.2, "Key algorithms" / "Container
/// deployment").
const POLL_INTERVAL: Duration = Duration::from_millis(500);
/// Deadline for a replica to reach `running` before the whole deployment is
/// rolled back.
const DEPLOY_DEADLINE: Duration = Duration::from_secs(60);

pub struct Exec {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
}

/// Thin wrapper around `bollard::Docker` implementing the container-runtime
/// side of the Domain Orchestrator's contract (spec §4.2).
pub struct DockerOrchestrator {
    docker: Docker,
}

impl DockerOrchestrator {
    pub fn connect() -> Result<Self, OrchestrationError> {
        Ok(Self {
            docker: Docker::connect_with_local_defaults()?,
        })
    }

    pub fn client(&self) -> &Docker {
        &self.docker
    }

    /// Deploy `replicas` copies of `image` onto `network`, named
    /// `<name>_<i>` for `i` in `[1, replicas]`. If `host_port_start` is set,
    /// container port `container_port` is bound to `host_port_start + i -
    /// 1`. On timeout, every replica already started is force-removed
    /// before returning an error — no partial success.
    #[allow(clippy::too_many_arguments)]
    pub async fn deploy_service(
        &self,
        image: &str,
        name: &str,
        network: &str,
        replicas: u32,
        container_port: Option<u16>,
        host_port_start: Option<u16>,
        env: &[String],
    ) -> Result<HashMap<String, String>, OrchestrationError> {
        let mut started = Vec::new();
        for i in 1..=replicas {
            let container_name = format!("{name}_{i}");
            let host_config = container_port.zip(host_port_start).map(|(port, start)| {
                let mut port_bindings = HashMap::new();
                port_bindings.insert(
                    format!("{port}/tcp"),
                    Some(vec![PortBinding {
                        host_ip: None,
                        host_port: Some((start + (i as u16) - 1).to_string()),
                    }]),
                );
                HostConfig {
                    port_bindings: Some(port_bindings),
                    ..Default::default()
                }
            });

            let config = Config {
                image: Some(image.to_string()),
                env: Some(env.to_vec()),
                host_config,
                networking_config: Some(bollard::container::NetworkingConfig {
                    endpoints_config: HashMap::from([(
                        network.to_string(),
                        EndpointSettings::default(),
                    )]),
                }),
                ..Default::default()
            };

            let create_result = self
                .docker
                .create_container(
                    Some(CreateContainerOptions {
                        name: container_name.clone(),
                        platform: None,
                    }),
                    config,
                )
                .await;
            if create_result.is_err() {
                self.rollback(&started).await;
                return Err(create_result.unwrap_err().into());
            }
            self.docker
                .start_container(&container_name, None::<StartContainerOptions<String>>)
                .await?;
            started.push(container_name.clone());

            if let Err(err) = self.wait_running(&container_name).await {
                self.rollback(&started).await;
                return Err(err);
            }
        }

        self.service_ips(name).await
    }

    async fn wait_running(&self, container_name: &str) -> Result<(), OrchestrationError> {
        let deadline = tokio::time::Instant::now() + DEPLOY_DEADLINE;
        loop {
            let inspect = self.docker.inspect_container(container_name, None).await?;
            if inspect
                .state
                .as_ref()
                .and_then(|s| s.running)
                .unwrap_or(false)
            {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(OrchestrationError::DeployTimeout(container_name.to_string()));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn rollback(&self, started: &[String]) {
        for name in started {
            warn!(container = name, "rolling back partially deployed replica");
            let _ = self
                .docker
                .remove_container(
                    name,
                    Some(RemoveContainerOptions {
                        force: true,
                        ..Default::default()
                    }),
                )
                .await;
        }
    }

    /// Scale an existing service up or down to `target_replicas`, reusing
    /// the first replica's image and network (`services.py`'s
    /// `scale_docker_containers`, supplemented per spec's DO operation
    /// table).
    pub async fn scale_service(
        &self,
        name: &str,
        target_replicas: u32,
    ) -> Result<HashMap<String, String>, OrchestrationError> {
        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions::<String> {
                all: true,
                ..Default::default()
            }))
            .await?;

        let mut replica_names: Vec<String> = containers
            .iter()
            .flat_map(|c| c.names.clone().unwrap_or_default())
            .map(|n| n.trim_start_matches('/').to_string())
            .filter(|n| n.starts_with(&format!("{name}_")))
            .collect();
        replica_names.sort();

        let current = replica_names.len() as u32;
        if target_replicas > current {
            let Some(first_id) = replica_names.first().cloned() else {
                return Err(OrchestrationError::ContainerNotFound(name.to_string()));
            };
            let inspect = self.docker.inspect_container(&first_id, None).await?;
            let image = inspect
                .config
                .as_ref()
                .and_then(|c| c.image.clone())
                .ok_or_else(|| OrchestrationError::ContainerNotFound(first_id.clone()))?;
            let network = inspect
                .network_settings
                .and_then(|n| n.networks)
                .and_then(|n| n.into_keys().next())
                .ok_or_else(|| OrchestrationError::NetworkNotFound(name.to_string()))?;

            for i in (current + 1)..=target_replicas {
                let container_name = format!("{name}_{i}");
                let config = Config {
                    image: Some(image.clone()),
                    networking_config: Some(bollard::container::NetworkingConfig {
                        endpoints_config: HashMap::from([(network.clone(), EndpointSettings::default())]),
                    }),
                    ..Default::default()
                };
                self.docker
                    .create_container(
                        Some(CreateContainerOptions {
                            name: container_name.clone(),
                            platform: None,
                        }),
                        config,
                    )
                    .await?;
                self.docker
                    .start_container(&container_name, None::<StartContainerOptions<String>>)
                    .await?;
                self.wait_running(&container_name).await?;
            }
        } else {
            for name in replica_names.into_iter().skip(target_replicas as usize) {
                self.docker
                    .remove_container(
                        &name,
                        Some(RemoveContainerOptions {
                            force: true,
                            ..Default::default()
                        }),
                    )
                    .await?;
            }
        }

        self.service_ips(name).await
    }

    /// Remove every container whose name starts with `prefix`. Returns the
    /// count removed.
    pub async fn delete_service(&self, prefix: &str) -> Result<u32, OrchestrationError> {
        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions::<String> {
                all: true,
                ..Default::default()
            }))
            .await?;

        let mut removed = 0;
        for c in containers {
            let matches = c
                .names
                .unwrap_or_default()
                .iter()
                .any(|n| n.trim_start_matches('/').starts_with(prefix));
            if !matches {
                continue;
            }
            let Some(id) = c.id else { continue };
            self.docker
                .remove_container(
                    &id,
                    Some(RemoveContainerOptions {
                        force: true,
                        ..Default::default()
                    }),
                )
                .await?;
            removed += 1;
        }
        Ok(removed)
    }

    pub async fn attach_to_network(&self, container_name: &str, network_name: &str) -> Result<(), OrchestrationError> {
        self.docker
            .connect_network(
                network_name,
                ConnectNetworkOptions {
                    container: container_name,
                    endpoint_config: EndpointSettings::default(),
                },
            )
            .await
            .map_err(|e| match &e {
                bollard::errors::Error::DockerResponseServerError { status_code, .. } if *status_code == 404 => {
                    OrchestrationError::ContainerNotFound(container_name.to_string())
                }
                other => OrchestrationError::Docker(clone_docker_error(other)),
            })
    }

    pub async fn exec(&self, container_name: &str, cmd: &str) -> Result<Exec, OrchestrationError> {
        let exec = self
            .docker
            .create_exec(
                container_name,
                CreateExecOptions {
                    cmd: Some(vec!["sh".to_string(), "-c".to_string(), cmd.to_string()]),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await?;

        let mut stdout = String::new();
        let mut stderr = String::new();
        if let StartExecResults::Attached { mut output, .. } = self.docker.start_exec(&exec.id, None).await? {
            while let Some(Ok(msg)) = output.next().await {
                match msg {
                    bollard::container::LogOutput::StdOut { message } => {
                        stdout.push_str(&String::from_utf8_lossy(&message))
                    }
                    bollard::container::LogOutput::StdErr { message } => {
                        stderr.push_str(&String::from_utf8_lossy(&message))
                    }
                    _ => {}
                }
            }
        }

        let inspect = self.docker.inspect_exec(&exec.id).await?;
        Ok(Exec {
            exit_code: inspect.exit_code.unwrap_or(-1),
            stdout,
            stderr,
        })
    }

    /// Map `container_name -> ip` for every running container whose name
    /// starts with `prefix`.
    pub async fn service_ips(&self, prefix: &str) -> Result<HashMap<String, String>, OrchestrationError> {
        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions::<String> {
                all: false,
                ..Default::default()
            }))
            .await?;

        let mut ips = HashMap::new();
        for c in containers {
            let Some(name) = c
                .names
                .unwrap_or_default()
                .into_iter()
                .map(|n| n.trim_start_matches('/').to_string())
                .find(|n| n.starts_with(prefix))
            else {
                continue;
            };
            let Some(networks) = c.network_settings.and_then(|n| n.networks) else {
                continue;
            };
            if let Some(ip) = networks.values().find_map(|n| n.ip_address.clone()).filter(|ip| !ip.is_empty()) {
                ips.insert(name, ip);
            }
        }
        Ok(ips)
    }

    pub async fn ensure_bridge_network(
        &self,
        name: &str,
        subnet: &str,
        ip_range: &str,
    ) -> Result<String, OrchestrationError> {
        let existing = self
            .docker
            .list_networks(Some(ListNetworksOptions {
                filters: HashMap::from([("name".to_string(), vec![name.to_string()])]),
            }))
            .await?;
        if let Some(net) = existing.into_iter().find(|n| n.name.as_deref() == Some(name)) {
            return Ok(net.id.unwrap_or_default());
        }

        let ipam_config = bollard::models::IpamConfig {
            subnet: Some(subnet.to_string()),
            ip_range: Some(ip_range.to_string()),
            ..Default::default()
        };
        let response = self
            .docker
            .create_network(CreateNetworkOptions {
                name,
                driver: "bridge",
                ipam: bollard::models::Ipam {
                    config: Some(vec![ipam_config]),
                    ..Default::default()
                },
                ..Default::default()
            })
            .await?;
        Ok(response.id.unwrap_or_default())
    }

    pub async fn delete_network(&self, name: &str) -> Result<(), OrchestrationError> {
        match self.docker.remove_network(name).await {
            Ok(()) => Ok(()),
            Err(bollard::errors::Error::DockerResponseServerError { status_code, .. }) if status_code == 404 => Ok(()),
            Err(other) => Err(other.into()),
        }
    }

    /// The kernel bridge name Docker derives for a user-defined network:
    /// `br-<first 12 hex chars of the network id>`.
    pub fn bridge_name_for_network(network_id: &str) -> String {
        format!("br-{}", &network_id[..network_id.len().min(12)])
    }

    /// Best-effort teardown of every container and network whose name
    /// starts with the matching prefix, plus any matching vxlan interfaces.
    /// Errors are logged per-resource, not propagated (spec §4.2,
    /// CleanupByPrefix).
    pub async fn cleanup_by_prefix(&self, container_prefix: &str, network_prefix: &str, vxlan_prefix: &str) {
        match crate::vxlan::list_vxlan_interfaces(vxlan_prefix).await {
            Ok(ifaces) => {
                for iface in ifaces {
                    if let Ok(id) = iface.trim_start_matches("vxlan").parse::<u32>() {
                        if let Err(err) = crate::vxlan::delete_vxlan(&crate::vxlan::SystemLinkRunner, id).await {
                            warn!(%err, iface, "failed to clean up vxlan interface");
                        }
                    }
                }
            }
            Err(err) => warn!(%err, "failed to list vxlan interfaces during cleanup"),
        }
        self.cleanup_containers_and_networks(container_prefix, network_prefix).await
    }

    async fn cleanup_containers_and_networks(&self, container_prefix: &str, network_prefix: &str) {
        match self.delete_service(container_prefix).await {
            Ok(n) => info!(count = n, prefix = container_prefix, "cleaned up containers"),
            Err(err) => warn!(%err, prefix = container_prefix, "failed to clean up containers"),
        }

        let networks = match self.docker.list_networks::<String>(None).await {
            Ok(n) => n,
            Err(err) => {
                warn!(%err, "failed to list networks during cleanup");
                return;
            }
        };
        for net in networks {
            let Some(name) = net.name.filter(|n| n.starts_with(network_prefix)) else {
                continue;
            };
            if let Err(err) = self.delete_network(&name).await {
                warn!(%err, network = name, "failed to clean up network");
            }
        }
    }
}

fn clone_docker_error(err: &bollard::errors::Error) -> bollard::errors::Error {
    bollard::errors::Error::DockerResponseServerError {
        status_code: match err {
            bollard::errors::Error::DockerResponseServerError { status_code, .. } => *status_code,
            _ => 500,
        },
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_bridge_name_from_network_id() {
        let id = "abcdef0123456789ffff";
        assert_eq!(DockerOrchestrator::bridge_name_for_network(id), "br-abcdef012345");
    }

    #[test]
    fn bridge_name_handles_short_ids() {
        assert_eq!(DockerOrchestrator::bridge_name_for_network("abc"), "br-abc");
    }
}
