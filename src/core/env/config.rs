use std::{
    borrow::Cow,
    path::{Path, PathBuf},
};

use etcetera::BaseStrategy;

use crate::core::env::GetEnvValue;

#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("invalid DOCKER_HOST: {0}")]
    InvalidDockerHost(String),
}

/// The default path to the Docker configuration file.
const DEFAULT_DOCKER_CONFIG_PATH: &str = ".docker";
const DOCKER_CONFIG_FILE: &str = "config.json";

/// The default `DOCKER_HOST` address that we will try to connect to.
#[cfg(unix)]
pub const DEFAULT_DOCKER_HOST: &str = "unix:///var/run/docker.sock";

/// The default `DOCKER_HOST` address that a windows client will try to connect to.
#[cfg(windows)]
pub const DEFAULT_DOCKER_HOST: &str = "npipe:////./pipe/docker_engine";

#[derive(Debug, Default)]
pub(crate) struct Config {
    host: Option<String>,
    tls_verify: Option<bool>,
    cert_path: Option<PathBuf>,
    docker_auth_config: Option<String>,
    platform: Option<String>,
}

impl Config {
    pub(crate) async fn load<E>() -> Result<Self, ConfigurationError>
    where
        E: GetEnvValue,
    {
        Self::load_from_env_config::<E>().await
    }

    async fn load_from_env_config<E>() -> Result<Self, ConfigurationError>
    where
        E: GetEnvValue,
    {
        let host = E::get_env_value("DOCKER_HOST");
        let tls_verify = E::get_env_value("DOCKER_TLS_VERIFY").map(|v| v == "1");
        let cert_path = E::get_env_value("DOCKER_CERT_PATH").map(PathBuf::from);
        let platform = E::get_env_value("DOCKER_DEFAULT_PLATFORM").filter(|v| !v.trim().is_empty());

        let docker_auth_config = read_docker_auth_config::<E>().await;

        Ok(Config {
            host,
            tls_verify,
            cert_path,
            docker_auth_config,
            platform,
        })
    }

    /// The Docker host to use. The host is resolved in the following order:
    ///  1. `DOCKER_HOST` environment variable.
    ///  2. Read the default Docker socket path, without the unix schema. E.g. `/var/run/docker.sock`.
    ///  3. Read the rootless Docker socket path, checking in the following alternative locations:
    ///     1. `${XDG_RUNTIME_DIR}/.docker/run/docker.sock`.
    ///     2. `${HOME}/.docker/run/docker.sock`.
    ///     3. `${HOME}/.docker/desktop/docker.sock`.
    ///  4. The default Docker socket including schema will be returned if none of the above are set.
    pub(crate) fn docker_host(&self) -> Cow<'_, str> {
        self.host
            .as_deref()
            .map(Cow::Borrowed)
            .unwrap_or_else(|| {
                if cfg!(unix) {
                    validate_path("/var/run/docker.sock".into())
                        .or_else(|| {
                            runtime_dir().and_then(|dir| {
                                validate_path(format!("{}/.docker/run/docker.sock", dir.display()))
                            })
                        })
                        .or_else(|| {
                            home_dir().and_then(|dir| {
                                validate_path(format!("{}/.docker/run/docker.sock", dir.display()))
                            })
                        })
                        .or_else(|| {
                            home_dir().and_then(|dir| {
                                validate_path(format!(
                                    "{}/.docker/desktop/docker.sock",
                                    dir.display()
                                ))
                            })
                        })
                        .map(|p| format!("unix://{p}"))
                        .map(Cow::Owned)
                        .unwrap_or(DEFAULT_DOCKER_HOST.into())
                } else {
                    DEFAULT_DOCKER_HOST.into()
                }
            })
    }

    pub(crate) fn tls_verify(&self) -> bool {
        self.tls_verify.unwrap_or_default()
    }

    pub(crate) fn cert_path(&self) -> Option<&Path> {
        self.cert_path.as_deref()
    }

    pub(crate) fn docker_auth_config(&self) -> Option<&str> {
        self.docker_auth_config.as_deref()
    }

    pub(crate) fn platform(&self) -> Option<&str> {
        self.platform.as_deref()
    }
}

/// Validate the path exists and return it if it does.
fn validate_path(path: String) -> Option<String> {
    if Path::new(&path).exists() {
        Some(path)
    } else {
        None
    }
}

fn home_dir() -> Option<PathBuf> {
    etcetera::home_dir().ok()
}

fn runtime_dir() -> Option<PathBuf> {
    etcetera::choose_base_strategy().ok()?.runtime_dir()
}

/// Read the Docker authentication configuration in the following order:
///
/// 1. `DOCKER_AUTH_CONFIG` environment variable, unmarshalling the string value from its JSON representation and using it as the Docker config.
/// 2. `DOCKER_CONFIG` environment variable, as an alternative path to the directory containing Docker `config.json` file.
/// 3. else it will load the default Docker config file, which lives in the user's home, e.g. `~/.docker/config.json`.
async fn read_docker_auth_config<E>() -> Option<String>
where
    E: GetEnvValue,
{
    match E::get_env_value("DOCKER_AUTH_CONFIG") {
        Some(cfg) => Some(cfg),
        None => {
            let mut path_to_config = match E::get_env_value("DOCKER_CONFIG").map(PathBuf::from) {
                Some(path_to_config) => path_to_config,
                None => {
                    let home_dir = home_dir()?;
                    home_dir.join(DEFAULT_DOCKER_CONFIG_PATH)
                }
            };
            path_to_config.push(DOCKER_CONFIG_FILE);
            tokio::fs::read_to_string(path_to_config).await.ok()
        }
    }
}
