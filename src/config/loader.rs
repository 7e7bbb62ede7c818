//! Configuration Loader
//!
//! Layers configuration sources with the `config` crate, lowest precedence first:
//!
//! 1. Built-in defaults ([`OrdersConfig::default`])
//! 2. A TOML file: `ORDERS_CONFIG_PATH` if set (must exist), else `config/orders.toml` if present
//! 3. Nested environment variables, e.g. `ORDERS__BROKER__QUEUE=orders.q`
//! 4. Flat variables kept for deployments that predate the nested form
//!    (`RABBITMQ_URL`, `EXCHANGE`, `QUEUE`, `USERS_BASE_URL`, `HTTP_TIMEOUT_MS`, ...)

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

use config::{Environment, File, FileFormat};
use tracing::{debug, info};

use super::error::{ConfigResult, ConfigurationError};
use super::OrdersConfig;

/// Environment variable naming an explicit configuration file
pub const CONFIG_PATH_ENV: &str = "ORDERS_CONFIG_PATH";

/// Optional configuration file looked up relative to the working directory
const DEFAULT_CONFIG_FILE: &str = "config/orders";

const ENV_PREFIX: &str = "ORDERS";

/// Flat environment variables and the configuration keys they override
const LEGACY_OVERRIDES: &[(&str, &str)] = &[
    ("RABBITMQ_URL", "broker.url"),
    ("EXCHANGE", "broker.exchange"),
    ("QUEUE", "broker.queue"),
    ("ROUTING_KEY_ENTITY_CREATED", "broker.entity_created_routing_key"),
    ("ROUTING_KEY_ENTITY_UPDATED", "broker.entity_updated_routing_key"),
    ("USERS_BASE_URL", "peer.base_url"),
    ("HTTP_TIMEOUT_MS", "peer.request_timeout_ms"),
];

impl OrdersConfig {
    /// Load configuration from the process environment
    pub fn load() -> ConfigResult<Self> {
        let config_file = env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from);
        let vars: HashMap<String, String> = env::vars().collect();
        Self::load_with_env(config_file.as_deref(), &vars)
    }

    /// Load configuration from an explicit file and variable set
    ///
    /// Useful for testing without modifying global environment variables.
    pub fn load_with_env(
        config_file: Option<&Path>,
        vars: &HashMap<String, String>,
    ) -> ConfigResult<Self> {
        let defaults = config::Config::try_from(&OrdersConfig::default())?;
        let mut builder = config::Config::builder().add_source(defaults);

        builder = match config_file {
            Some(path) => {
                if !path.is_file() {
                    return Err(ConfigurationError::file_not_found(
                        path.display().to_string(),
                    ));
                }
                debug!(path = %path.display(), "Loading configuration file");
                builder.add_source(File::from(path).format(FileFormat::Toml))
            }
            None => builder.add_source(
                File::with_name(DEFAULT_CONFIG_FILE)
                    .format(FileFormat::Toml)
                    .required(false),
            ),
        };

        let env_source: config::Map<String, String> = vars
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .source(Some(env_source)),
        );

        for (var, key) in LEGACY_OVERRIDES {
            if let Some(value) = vars.get(*var) {
                builder = builder
                    .set_override(*key, value.as_str())
                    .map_err(|e| ConfigurationError::environment_override(*var, e))?;
            }
        }

        let config: OrdersConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        info!(
            broker_url = %redact_url(&config.broker.url),
            exchange = %config.broker.exchange,
            queue = %config.broker.queue,
            peer = %config.peer.name,
            peer_base_url = %config.peer.base_url,
            "Configuration loaded successfully"
        );

        Ok(config)
    }
}

/// Mask credentials embedded in a connection URL for logging
pub fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}***{}", &url[..scheme_end + 3], &url[at..])
        }
        _ => url.to_string(),
    }
}
