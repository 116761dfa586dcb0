//! Server configuration.
//!
//! Environment access goes through the [`EnvProvider`] capability so the rest
//! of the crate — the fetch and aggregation core in particular — never touches
//! process state directly.

use std::path::PathBuf;

/// Capability for reading configuration values by key.
pub trait EnvProvider: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

/// [`EnvProvider`] over the process environment.
pub struct ProcessEnv;

impl EnvProvider for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Resolved server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind address, `HOST` (default `0.0.0.0`).
    pub host: String,
    /// Bind port, `PORT` (default 8080).
    pub port: u16,
    /// Upstream admin key, `OPENAI_ADMIN_KEY`. The usage endpoint reports an
    /// error when absent rather than the server refusing to start.
    pub admin_key: Option<String>,
    /// Usage endpoint override, `USAGE_API_URL`.
    pub usage_api_url: Option<String>,
    /// Mapping store location, `MAPPINGS_PATH` (default `data/mappings.json`).
    pub mappings_path: PathBuf,
    /// Seed file merged by the migration endpoint, `SEED_MAPPINGS_PATH`.
    pub seed_mappings_path: Option<PathBuf>,
}

impl Config {
    /// Build a configuration from the given environment.
    pub fn from_env(env: &dyn EnvProvider) -> Self {
        let host = env.get("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = env
            .get("PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        Self {
            host,
            port,
            admin_key: env.get("OPENAI_ADMIN_KEY").filter(|k| !k.is_empty()),
            usage_api_url: env.get("USAGE_API_URL").filter(|u| !u.is_empty()),
            mappings_path: env
                .get("MAPPINGS_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data/mappings.json")),
            seed_mappings_path: env.get("SEED_MAPPINGS_PATH").map(PathBuf::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct FakeEnv(HashMap<&'static str, &'static str>);

    impl EnvProvider for FakeEnv {
        fn get(&self, key: &str) -> Option<String> {
            self.0.get(key).map(|v| v.to_string())
        }
    }

    #[test]
    fn test_defaults_when_env_empty() {
        let config = Config::from_env(&FakeEnv(HashMap::new()));

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert!(config.admin_key.is_none());
        assert!(config.usage_api_url.is_none());
        assert_eq!(config.mappings_path, PathBuf::from("data/mappings.json"));
        assert!(config.seed_mappings_path.is_none());
    }

    #[test]
    fn test_overrides_from_env() {
        let config = Config::from_env(&FakeEnv(
            [
                ("HOST", "127.0.0.1"),
                ("PORT", "9000"),
                ("OPENAI_ADMIN_KEY", "sk-admin-xyz"),
                ("USAGE_API_URL", "https://proxy.test/usage"),
                ("MAPPINGS_PATH", "/var/lib/dashboard/mappings.json"),
                ("SEED_MAPPINGS_PATH", "seed.json"),
            ]
            .into(),
        ));

        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 9000);
        assert_eq!(config.admin_key.as_deref(), Some("sk-admin-xyz"));
        assert_eq!(config.usage_api_url.as_deref(), Some("https://proxy.test/usage"));
        assert_eq!(
            config.mappings_path,
            PathBuf::from("/var/lib/dashboard/mappings.json")
        );
        assert_eq!(config.seed_mappings_path, Some(PathBuf::from("seed.json")));
    }

    #[test]
    fn test_invalid_port_falls_back() {
        let config = Config::from_env(&FakeEnv([("PORT", "not-a-port")].into()));
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn test_empty_admin_key_treated_as_absent() {
        let config = Config::from_env(&FakeEnv([("OPENAI_ADMIN_KEY", "")].into()));
        assert!(config.admin_key.is_none());
    }
}
