use std::time::Duration;

use bollard::{Docker, API_DEFAULT_VERSION};
use url::Url;

use crate::core::env;

use super::ClientError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2 * 60);

pub(super) fn init(config: &env::Config) -> Result<Docker, ClientError> {
    let host = config.docker_host();
    let parsed = Url::parse(&host)
        .map_err(|e| ClientError::InvalidDockerHost(format!("{host}: {e}")))?;

    let docker = match parsed.scheme() {
        "https" => connect_with_ssl(config)?,
        "http" | "tcp" => {
            if config.tls_verify() {
                connect_with_ssl(config)?
            } else {
                Docker::connect_with_http(&host, DEFAULT_TIMEOUT.as_secs(), API_DEFAULT_VERSION)
                    .map_err(ClientError::Init)?
            }
        }
        #[cfg(unix)]
        "unix" => Docker::connect_with_unix(&host, DEFAULT_TIMEOUT.as_secs(), API_DEFAULT_VERSION)
            .map_err(ClientError::Init)?,
        #[cfg(windows)]
        "npipe" => {
            Docker::connect_with_named_pipe(&host, DEFAULT_TIMEOUT.as_secs(), API_DEFAULT_VERSION)
                .map_err(ClientError::Init)?
        }
        scheme => return Err(ClientError::InvalidDockerHost(format!("unsupported scheme: {scheme}"))),
    };

    Ok(docker)
}

fn connect_with_ssl(config: &env::Config) -> Result<Docker, ClientError> {
    let cert_path = config
        .cert_path()
        .ok_or_else(|| ClientError::InvalidDockerHost("DOCKER_CERT_PATH not set".into()))?;

    Docker::connect_with_ssl(
        &config.docker_host(),
        &cert_path.join("key.pem"),
        &cert_path.join("cert.pem"),
        &cert_path.join("ca.pem"),
        DEFAULT_TIMEOUT.as_secs(),
        API_DEFAULT_VERSION,
    )
    .map_err(ClientError::Init)
}
