mod config;

pub use config::ConfigurationError;
pub(crate) use config::Config;

/// Abstracts over reading a value from the environment.
pub trait GetEnvValue {
    fn get_env_value(key: &str) -> Option<String>;
}

/// Represents the operating system environment for use within a production environment.
#[derive(Debug)]
pub struct Os;

impl GetEnvValue for Os {
    fn get_env_value(key: &str) -> Option<String> {
        ::std::env::var(key).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct FakeEnv;

    impl GetEnvValue for FakeEnv {
        fn get_env_value(key: &str) -> Option<String> {
            match key {
                "DOCKER_DEFAULT_PLATFORM" => Some("linux/amd64".to_owned()),
                _ => None,
            }
        }
    }

    #[tokio::test]
    async fn loads_platform_from_env() {
        let config = Config::load::<FakeEnv>().await.unwrap();
        assert_eq!(config.platform(), Some("linux/amd64"));
    }
}
