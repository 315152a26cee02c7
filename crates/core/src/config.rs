//! Session configuration
//!
//! Values come from defaults, an optional file, and `KEYWAY_`-prefixed
//! environment variables (nested keys use `__`, e.g. `KEYWAY_ENDPOINTS__LOGIN`).

use crate::credentials::StorageKeys;
use crate::error::{CoreError, CoreResult};
use crate::tracing::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix
const ENV_PREFIX: &str = "KEYWAY";

/// Client session configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Base URL of the API; empty means relative to the page origin
    pub base_url: String,

    /// Prefix for the `Authorization` header value (e.g. `Bearer`).
    /// When unset the raw access token is sent.
    pub authorization_scheme: Option<String>,

    /// Per-request timeout in seconds (native targets only)
    pub request_timeout_secs: Option<u64>,

    pub user_agent: Option<String>,

    /// Identity endpoint paths
    pub endpoints: EndpointConfig,

    /// Storage key names for persisted credentials
    pub storage: StorageKeys,

    /// Subscriber settings for native applications
    pub logging: LoggingConfig,
}

/// Paths of the remote identity endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub login: String,
    pub refresh: String,
    pub logout: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            authorization_scheme: None,
            request_timeout_secs: Some(30),
            user_agent: None,
            endpoints: EndpointConfig::default(),
            storage: StorageKeys::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            login: "/auth/login".to_string(),
            refresh: "/auth/refresh".to_string(),
            logout: "/auth/logout".to_string(),
        }
    }
}

impl SessionConfig {
    /// Load configuration from a file, with environment overrides
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the values are invalid
    pub fn from_file(path: impl AsRef<Path>) -> CoreResult<Self> {
        let builder = config::Config::builder().add_source(config::File::from(path.as_ref()));
        Self::build(builder, Self::environment())
    }

    /// Load configuration from defaults and environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if environment variables cannot be parsed
    pub fn from_env() -> CoreResult<Self> {
        Self::build(config::Config::builder(), Self::environment())
    }

    fn environment() -> config::Environment {
        config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    fn build(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
        environment: config::Environment,
    ) -> CoreResult<Self> {
        let settings = builder.add_source(environment).build()?;
        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants that serde cannot express
    pub fn validate(&self) -> CoreResult<()> {
        for (name, path) in [
            ("login", &self.endpoints.login),
            ("refresh", &self.endpoints.refresh),
            ("logout", &self.endpoints.logout),
        ] {
            if !path.starts_with('/') {
                return Err(CoreError::invalid_config(format!(
                    "endpoint path for {name} must start with '/': {path}"
                )));
            }
        }

        let keys = &self.storage;
        if keys.access_token.is_empty() || keys.refresh_token.is_empty() || keys.user.is_empty() {
            return Err(CoreError::invalid_config("storage key names must not be empty"));
        }
        if keys.access_token == keys.refresh_token
            || keys.access_token == keys.user
            || keys.refresh_token == keys.user
        {
            return Err(CoreError::invalid_config("storage key names must be distinct"));
        }

        if self.request_timeout_secs == Some(0) {
            return Err(CoreError::invalid_config(
                "request_timeout_secs must be greater than zero",
            ));
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}
