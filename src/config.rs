//! Provider configuration with builder pattern
//!
//! Example file:
//!
//! ```toml
//! [connection]
//! api_endpoint = "https://localhost:8443/"
//! cert = "/etc/concerto/api/cert.pem"
//! key = "/etc/concerto/api/private/key.pem"
//!
//! [logging]
//! level = "info"
//! format = "pretty"
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing_subscriber::{fmt, EnvFilter};

use crate::{Error, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How to reach the Concerto API
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectionConfig {
    #[serde(alias = "apiendpoint")]
    pub api_endpoint: String,
    /// PEM client certificate
    pub cert: PathBuf,
    /// PEM private key for `cert`
    pub key: PathBuf,
    /// Extra root certificate for the API server
    #[serde(default)]
    pub ca_cert: Option<PathBuf>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Pretty,
        }
    }
}

impl LoggingConfig {
    /// Install the global tracing subscriber; `RUST_LOG` wins over `level`
    pub fn init(&self) {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));

        match self.format {
            LogFormat::Json => fmt().json().with_env_filter(filter).init(),
            LogFormat::Pretty => fmt().with_env_filter(filter).init(),
        }
    }
}

impl ProviderConfig {
    pub fn builder() -> ProviderConfigBuilder {
        ProviderConfigBuilder::default()
    }

    /// Read and validate a TOML config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: ProviderConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let endpoint = &self.connection.api_endpoint;
        if endpoint.is_empty() {
            return Err(Error::Config("api_endpoint cannot be empty".into()));
        }
        if !endpoint.starts_with("https://") && !endpoint.starts_with("http://") {
            return Err(Error::Config(format!(
                "api_endpoint must be an http(s) URL, got '{}'",
                endpoint
            )));
        }
        if self.connection.cert.as_os_str().is_empty() {
            return Err(Error::Config("cert cannot be empty".into()));
        }
        if self.connection.key.as_os_str().is_empty() {
            return Err(Error::Config("key cannot be empty".into()));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct ProviderConfigBuilder {
    connection: ConnectionConfig,
    logging: LoggingConfig,
}

impl ProviderConfigBuilder {
    pub fn api_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.connection.api_endpoint = endpoint.into();
        self
    }

    pub fn cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.connection.cert = path.into();
        self
    }

    pub fn key(mut self, path: impl Into<PathBuf>) -> Self {
        self.connection.key = path.into();
        self
    }

    pub fn ca_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.connection.ca_cert = Some(path.into());
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.connection.timeout_secs = Some(secs);
        self
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.logging.level = level.into();
        self
    }

    pub fn log_format(mut self, format: LogFormat) -> Self {
        self.logging.format = format;
        self
    }

    pub fn build(self) -> ProviderConfig {
        ProviderConfig {
            connection: self.connection,
            logging: self.logging,
        }
    }

    pub fn build_validated(self) -> Result<ProviderConfig> {
        let config = self.build();
        config.validate()?;
        Ok(config)
    }
}
