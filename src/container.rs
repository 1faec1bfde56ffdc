//! Container lifecycle control: image pull, run, bind mounts, port mapping, liveness probing,
//! teardown, and in-container firewall installation.

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::Arc,
    time::Duration,
};

use bollard::models::{ContainerCreateBody, HostConfig, PortBinding};
use tokio::{net::TcpStream, time::Instant};

use crate::{
    config::SandboxConfig,
    core::{
        client::Client,
        copy::{CopyDataSource, CopyToContainer},
        error::{ContainerError, Result},
    },
};

pub use crate::core::mounts::{AccessMode, Mount, MountType};

/// The container-internal port the kernel gateway is expected to listen on.
pub const EXECUTOR_INTERNAL_PORT: u16 = 8888;
/// The container-internal port the resource service is expected to listen on.
pub const RESOURCE_INTERNAL_PORT: u16 = 8900;

/// The fixed working directory inside the container that bind-mount targets and generated tool
/// stubs are rooted under.
pub const WORKING_DIR: &str = "/app";

/// Describes the container to provision. Host ports left unset are allocated as ephemerals.
#[derive(Debug, Clone)]
pub struct ContainerDescriptor {
    image: String,
    executor_port: Option<u16>,
    resource_port: Option<u16>,
    binds: Vec<Mount>,
    env: HashMap<String, String>,
}

impl ContainerDescriptor {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            executor_port: None,
            resource_port: None,
            binds: Vec::new(),
            env: HashMap::new(),
        }
    }

    /// Fix the host port the kernel gateway is mapped to. Left unset, a host-allocated ephemeral
    /// port is used.
    pub fn with_executor_port(mut self, port: u16) -> Self {
        self.executor_port = Some(port);
        self
    }

    /// Fix the host port the resource service is mapped to.
    pub fn with_resource_port(mut self, port: u16) -> Self {
        self.resource_port = Some(port);
        self
    }

    /// Adds a bind mount. Only `MountType::Bind` mounts are honored; the container path is
    /// normalized to be relative to [`WORKING_DIR`].
    pub fn with_bind(mut self, mount: Mount) -> Self {
        self.binds.push(mount);
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// A running, health-gated sandbox container.
#[derive(Debug)]
pub struct ContainerHandle {
    id: String,
    client: Arc<Client>,
    executor_port: u16,
    resource_port: u16,
    stopped: bool,
}

impl ContainerHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn executor_port(&self) -> u16 {
        self.executor_port
    }

    pub fn resource_port(&self) -> u16 {
        self.resource_port
    }

    /// The host this container's mapped ports are reachable on.
    pub async fn host(&self) -> Result<url::Host> {
        self.client.docker_hostname().await.map_err(Into::into)
    }

    /// Forcefully removes the container. Idempotent: a missing container is not an error.
    ///
    /// This is the primary teardown path. `Drop` also removes the container as a last-resort
    /// net if `stop` was never called, but logs failures rather than surfacing them.
    pub async fn stop(mut self) -> Result<()> {
        let result = match self.client.rm(&self.id).await {
            Ok(()) => Ok(()),
            Err(err) if is_not_found(&err) => Ok(()),
            Err(err) => Err(err.into()),
        };
        self.stopped = true;
        result
    }

    /// Installs an in-container egress firewall permitting outbound traffic only to the listed
    /// hosts. Requires the container to run as a non-root user; the install step itself still
    /// runs the script as the container's entry user, which must have the capabilities the
    /// script needs (documented at the image level, outside this crate's scope).
    pub async fn install_firewall(&self, allow_list: &[String]) -> Result<()> {
        let whoami = self
            .client
            .exec(&self.id, vec!["id".into(), "-u".into()])
            .await
            .map_err(ContainerError::from)?;
        let uid = drain_stdout(whoami).await?;

        if uid.trim() == "0" {
            return Err(ContainerError::UnsupportedMode {
                id: self.id.clone(),
                reason: "container is running as root; firewall install requires a non-root layout".into(),
            });
        }

        let script = render_firewall_script(allow_list);
        let install = CopyToContainer::new(
            CopyDataSource::Data(script.into_bytes()),
            "/tmp/install_firewall.sh",
        );
        self.client
            .copy_to_container(&self.id, &install)
            .await
            .map_err(ContainerError::from)?;

        let mut run = self
            .client
            .exec(&self.id, vec!["sh".into(), "/tmp/install_firewall.sh".into()])
            .await
            .map_err(ContainerError::from)?;
        let exec_id = run.id().to_string();
        let stderr = run.stderr_to_vec().await.map_err(ContainerError::Io)?;
        drain_stdout(run).await?;
        self.ensure_exec_succeeded(&exec_id, 0, String::from_utf8_lossy(&stderr).into_owned())
            .await?;

        Ok(())
    }

    async fn ensure_exec_succeeded(&self, exec_id: &str, expected: i64, stderr: String) -> Result<()> {
        let inspect = self.client.inspect_exec(exec_id).await.map_err(ContainerError::from)?;
        if let Some(actual) = inspect.exit_code {
            if actual != expected {
                return Err(ContainerError::Exec(
                    crate::core::error::ExecError::ExitCodeMismatch {
                        expected,
                        actual,
                        stderr,
                    },
                ));
            }
        }
        Ok(())
    }
}

impl Drop for ContainerHandle {
    fn drop(&mut self) {
        if self.stopped {
            return;
        }
        let id = self.id.clone();
        let client = self.client.clone();

        crate::core::async_drop::async_drop(async move {
            log::trace!("Drop was called for container {id}, cleaning up");
            match client.rm(&id).await {
                Ok(()) => log::debug!("container {id} was successfully dropped"),
                Err(err) if is_not_found(&err) => {}
                Err(err) => log::error!("failed to remove container {id} on drop: {err}"),
            }
        });
    }
}

fn is_not_found(err: &crate::core::client::ClientError) -> bool {
    matches!(
        err,
        crate::core::client::ClientError::RemoveContainer(bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            ..
        })
    )
}

async fn drain_stdout(mut exec: crate::core::client::exec::ExecResult) -> Result<String> {
    let stdout = exec.stdout_to_vec().await?;
    Ok(String::from_utf8_lossy(&stdout).into_owned())
}

fn render_firewall_script(allow_list: &[String]) -> String {
    let mut script = String::from(
        "#!/bin/sh\nset -e\niptables -P OUTPUT DROP\niptables -A OUTPUT -o lo -j ACCEPT\niptables -A OUTPUT -p udp --dport 53 -j ACCEPT\n",
    );
    for host in allow_list {
        script.push_str(&format!(
            "iptables -A OUTPUT -d {host} -j ACCEPT\n",
            host = shell_escape(host)
        ));
    }
    script
}

fn shell_escape(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

/// Provisions and tears down sandbox containers.
pub struct ContainerController {
    client: Arc<Client>,
    config: SandboxConfig,
}

impl ContainerController {
    pub async fn new() -> Result<Self> {
        Self::with_config(SandboxConfig::default()).await
    }

    pub async fn with_config(config: SandboxConfig) -> Result<Self> {
        let client = Client::new().await.map_err(ContainerError::from)?;
        Ok(Self {
            client: Arc::new(client),
            config,
        })
    }

    /// Ensures the image is present, starts a detached container with the requested bind mounts
    /// and environment, and waits until both endpoints accept TCP connections (or a deadline
    /// elapses). Any partially-created container is removed before a failure is surfaced.
    pub async fn start(&self, descriptor: ContainerDescriptor) -> Result<ContainerHandle> {
        self.client
            .pull_image(&descriptor.image)
            .await
            .map_err(ContainerError::from)?;

        let executor_port = match descriptor.executor_port {
            Some(port) => port,
            None => allocate_ephemeral_port().await?,
        };
        let resource_port = match descriptor.resource_port {
            Some(port) => port,
            None => allocate_ephemeral_port().await?,
        };

        let config = self.build_container_config(&descriptor, executor_port, resource_port)?;

        let id = self
            .client
            .create_container(None, config)
            .await
            .map_err(ContainerError::from)?;

        if let Err(err) = self.client.start_container(&id).await {
            let _ = self.client.rm(&id).await;
            return Err(err.into());
        }

        let host = match self.client.docker_hostname().await {
            Ok(host) => host.to_string(),
            Err(err) => {
                let _ = self.client.rm(&id).await;
                return Err(err.into());
            }
        };

        let (initial_backoff, max_backoff) = self.config.liveness_backoff();
        let deadline = Instant::now() + self.config.liveness_timeout();
        if let Err(err) =
            wait_until_reachable(&host, executor_port, deadline, initial_backoff, max_backoff).await
        {
            let _ = self.client.rm(&id).await;
            return Err(err);
        }
        if let Err(err) =
            wait_until_reachable(&host, resource_port, deadline, initial_backoff, max_backoff).await
        {
            let _ = self.client.rm(&id).await;
            return Err(err);
        }

        Ok(ContainerHandle {
            id,
            client: self.client.clone(),
            executor_port,
            resource_port,
            stopped: false,
        })
    }

    fn build_container_config(
        &self,
        descriptor: &ContainerDescriptor,
        executor_port: u16,
        resource_port: u16,
    ) -> Result<ContainerCreateBody> {
        let mut exposed_ports = HashMap::new();
        exposed_ports.insert(format!("{EXECUTOR_INTERNAL_PORT}/tcp"), HashMap::new());
        exposed_ports.insert(format!("{RESOURCE_INTERNAL_PORT}/tcp"), HashMap::new());

        let mut port_bindings = HashMap::new();
        port_bindings.insert(
            format!("{EXECUTOR_INTERNAL_PORT}/tcp"),
            Some(vec![PortBinding {
                host_ip: Some("0.0.0.0".into()),
                host_port: Some(executor_port.to_string()),
            }]),
        );
        port_bindings.insert(
            format!("{RESOURCE_INTERNAL_PORT}/tcp"),
            Some(vec![PortBinding {
                host_ip: Some("0.0.0.0".into()),
                host_port: Some(resource_port.to_string()),
            }]),
        );

        let binds = descriptor
            .binds
            .iter()
            .map(bind_to_docker_spec)
            .collect::<Result<Vec<_>>>()?;

        let env = descriptor
            .env
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();

        let host_config = HostConfig {
            binds: Some(binds),
            port_bindings: Some(port_bindings),
            ..Default::default()
        };

        Ok(ContainerCreateBody {
            image: Some(descriptor.image.clone()),
            env: Some(env),
            exposed_ports: Some(exposed_ports),
            host_config: Some(host_config),
            working_dir: Some(WORKING_DIR.to_string()),
            ..Default::default()
        })
    }
}

fn bind_to_docker_spec(mount: &Mount) -> Result<String> {
    if mount.mount_type() != MountType::Bind {
        return Err(ContainerError::other(format!(
            "unsupported mount type for sandbox bind: {:?}",
            mount.mount_type()
        )));
    }
    let source = mount.source().ok_or_else(|| {
        ContainerError::other("bind mount is missing a host source path".to_string())
    })?;
    let target = mount
        .target()
        .ok_or_else(|| ContainerError::other("bind mount is missing a container target".to_string()))?;
    let target = normalize_bind_target(target);

    Ok(format!("{source}:{target}:{}", mount.access_mode()))
}

fn normalize_bind_target(target: &str) -> String {
    if target.starts_with('/') {
        target.to_string()
    } else {
        format!("{WORKING_DIR}/{target}")
    }
}

async fn allocate_ephemeral_port() -> Result<u16> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", 0))
        .await
        .map_err(ContainerError::Io)?;
    listener.local_addr().map(|addr| addr.port()).map_err(ContainerError::Io)
}

async fn wait_until_reachable(
    host: &str,
    port: u16,
    deadline: Instant,
    initial_backoff: Duration,
    max_backoff: Duration,
) -> Result<()> {
    let mut backoff = initial_backoff;
    let target: String = format!("{host}:{port}");
    let started = Instant::now();

    loop {
        if tcp_connect(&target).await {
            return Ok(());
        }

        if Instant::now() >= deadline {
            return Err(ContainerError::LivenessTimeout {
                id: target,
                elapsed_ms: started.elapsed().as_millis() as u64,
            });
        }

        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(max_backoff);
    }
}

async fn tcp_connect(target: &str) -> bool {
    if let Ok(addr) = target.parse::<SocketAddr>() {
        return TcpStream::connect(addr).await.is_ok();
    }
    TcpStream::connect(target).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_firewall_script_includes_every_allowed_host() {
        let script = render_firewall_script(&["gradion.ai".into(), "example.com".into()]);
        assert!(script.contains("-d 'gradion.ai' -j ACCEPT"));
        assert!(script.contains("-d 'example.com' -j ACCEPT"));
        assert!(script.starts_with("#!/bin/sh"));
    }

    #[test]
    fn normalize_bind_target_anchors_relative_paths_under_working_dir() {
        assert_eq!(normalize_bind_target("data"), "/app/data");
        assert_eq!(normalize_bind_target("/abs/data"), "/abs/data");
    }

    #[tokio::test]
    async fn allocate_ephemeral_port_returns_a_bindable_port() {
        let port = allocate_ephemeral_port().await.unwrap();
        assert!(port > 0);
    }
}
