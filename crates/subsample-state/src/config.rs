//! Store connection configuration.
//!
//! Each store (source, target) is configured by its own set of prefixed
//! environment variables:
//!
//! - `{P}_SQL_DB` (required)
//! - `{P}_SQL_USER` (required)
//! - `{P}_SQL_PASSWORD` (required)
//! - `{P}_SQL_HOST` (required)
//! - `{P}_SQL_PORT` (required)
//! - `{P}_ENV` (optional) - `DEVELOPMENT` disables encrypted transport
//! - `{P}_SQL_NAMESPACE` (optional, default: "subsample")
//! - `{P}_SQL_URL` (optional) - full endpoint such as `mem://`; when set, only
//!   the namespace and database are read and no sign-in is performed

use std::fmt;

use crate::error::ConfigError;

/// Prefix of the source store variables.
pub const SOURCE_PREFIX: &str = "SOURCE";
/// Prefix of the target store variables.
pub const TARGET_PREFIX: &str = "TARGET";

const DEFAULT_NAMESPACE: &str = "subsample";
const DEFAULT_DATABASE: &str = "main";
const DEVELOPMENT_MODE: &str = "DEVELOPMENT";

/// Where and how to reach a store.
#[derive(Clone, PartialEq, Eq)]
pub enum StoreEndpoint {
    /// Explicit endpoint URL, no authentication.
    Url(String),
    /// Authenticated network endpoint.
    Remote {
        host: String,
        port: u16,
        require_tls: bool,
        username: String,
        password: String,
    },
}

impl fmt::Debug for StoreEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreEndpoint::Url(url) => f.debug_tuple("Url").field(url).finish(),
            StoreEndpoint::Remote {
                host,
                port,
                require_tls,
                username,
                ..
            } => f
                .debug_struct("Remote")
                .field("host", host)
                .field("port", port)
                .field("require_tls", require_tls)
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
        }
    }
}

/// Connection settings for one store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Variable prefix, used in log lines
    pub label: String,
    pub namespace: String,
    pub database: String,
    pub endpoint: StoreEndpoint,
}

impl StoreConfig {
    /// Read the configuration for `prefix` from the process environment.
    pub fn from_env(prefix: &str) -> Result<Self, ConfigError> {
        Self::from_lookup(prefix, |key| std::env::var(key).ok())
    }

    /// Read the configuration for `prefix` through an arbitrary lookup.
    pub fn from_lookup<F>(prefix: &str, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| format!("{prefix}_{suffix}");
        let required = |suffix: &str| {
            let key = var(suffix);
            lookup(&key)
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::MissingVar(key))
        };

        let namespace =
            lookup(&var("SQL_NAMESPACE")).unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());

        if let Some(url) = lookup(&var("SQL_URL")).filter(|v| !v.is_empty()) {
            let database =
                lookup(&var("SQL_DB")).unwrap_or_else(|| DEFAULT_DATABASE.to_string());
            return Ok(Self {
                label: prefix.to_string(),
                namespace,
                database,
                endpoint: StoreEndpoint::Url(url),
            });
        }

        let database = required("SQL_DB")?;
        let username = required("SQL_USER")?;
        let password = required("SQL_PASSWORD")?;
        let host = required("SQL_HOST")?;
        let port_raw = required("SQL_PORT")?;
        let port = port_raw
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort {
                var: var("SQL_PORT"),
                value: port_raw.clone(),
            })?;
        let require_tls = lookup(&var("ENV"))
            .map(|mode| mode != DEVELOPMENT_MODE)
            .unwrap_or(true);

        Ok(Self {
            label: prefix.to_string(),
            namespace,
            database,
            endpoint: StoreEndpoint::Remote {
                host,
                port,
                require_tls,
                username,
                password,
            },
        })
    }

    /// Create a configuration for an in-process memory store.
    pub fn in_memory(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            endpoint: StoreEndpoint::Url("mem://".to_string()),
        }
    }

    /// Endpoint URL handed to the database driver.
    pub fn endpoint_url(&self) -> String {
        match &self.endpoint {
            StoreEndpoint::Url(url) => url.clone(),
            StoreEndpoint::Remote {
                host,
                port,
                require_tls,
                ..
            } => {
                let scheme = if *require_tls { "wss" } else { "ws" };
                format!("{scheme}://{host}:{port}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    const FULL: &[(&str, &str)] = &[
        ("SOURCE_SQL_DB", "prod"),
        ("SOURCE_SQL_USER", "reader"),
        ("SOURCE_SQL_PASSWORD", "secret"),
        ("SOURCE_SQL_HOST", "db.internal"),
        ("SOURCE_SQL_PORT", "8000"),
    ];

    #[test]
    fn remote_config_requires_tls_by_default() {
        let config = StoreConfig::from_lookup("SOURCE", lookup_from(FULL)).unwrap();
        assert_eq!(config.database, "prod");
        assert_eq!(config.namespace, "subsample");
        assert_eq!(config.endpoint_url(), "wss://db.internal:8000");
    }

    #[test]
    fn development_mode_disables_tls() {
        let mut vars = FULL.to_vec();
        vars.push(("SOURCE_ENV", "DEVELOPMENT"));
        let config = StoreConfig::from_lookup("SOURCE", lookup_from(&vars)).unwrap();
        assert_eq!(config.endpoint_url(), "ws://db.internal:8000");
    }

    #[test]
    fn missing_required_variable_fails_fast() {
        let vars: Vec<_> = FULL
            .iter()
            .copied()
            .filter(|(k, _)| *k != "SOURCE_SQL_HOST")
            .collect();
        let err = StoreConfig::from_lookup("SOURCE", lookup_from(&vars)).unwrap_err();
        assert_eq!(err, ConfigError::MissingVar("SOURCE_SQL_HOST".to_string()));
    }

    #[test]
    fn bad_port_is_rejected() {
        let mut vars: Vec<_> = FULL
            .iter()
            .copied()
            .filter(|(k, _)| *k != "SOURCE_SQL_PORT")
            .collect();
        vars.push(("SOURCE_SQL_PORT", "not-a-port"));
        let err = StoreConfig::from_lookup("SOURCE", lookup_from(&vars)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPort { .. }));
    }

    #[test]
    fn url_override_skips_credentials() {
        let config =
            StoreConfig::from_lookup("TARGET", lookup_from(&[("TARGET_SQL_URL", "mem://")]))
                .unwrap();
        assert_eq!(config.endpoint, StoreEndpoint::Url("mem://".to_string()));
        assert_eq!(config.database, "main");
        assert_eq!(config.label, "TARGET");
    }

    #[test]
    fn debug_output_redacts_password() {
        let config = StoreConfig::from_lookup("SOURCE", lookup_from(FULL)).unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
