//! Layered configuration: built-in defaults, then an optional TOML file, then
//! command-line/environment overrides. Read once at process start.

use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Backend endpoint, credentials and driver tuning.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendSettings {
    /// Bolt endpoint, e.g. `bolt://localhost:7687`.
    pub uri: String,
    /// Username.
    pub user: String,
    /// Password.
    pub password: String,
    /// Upper bound of the driver's connection pool.
    pub max_connections: usize,
    /// Rows fetched per round trip.
    pub fetch_size: usize,
    /// Per-statement deadline in milliseconds.
    pub statement_timeout_ms: u64,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password: "password".to_string(),
            max_connections: 16,
            fetch_size: 256,
            statement_timeout_ms: 30_000,
        }
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Interface to bind.
    pub host: IpAddr,
    /// Port to bind.
    pub port: u16,
    /// Extra CORS origins. Empty disables CORS handling.
    pub allow_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 5000,
            allow_origins: Vec::new(),
        }
    }
}

/// Complete process configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// `[backend]` section.
    pub backend: BackendSettings,
    /// `[server]` section.
    pub server: ServerSettings,
}

/// Values supplied on the command line or through the environment. `None` keeps the
/// file/default value.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Backend URI.
    pub uri: Option<String>,
    /// Backend user.
    pub user: Option<String>,
    /// Backend password.
    pub password: Option<String>,
    /// Statement deadline in milliseconds.
    pub statement_timeout_ms: Option<u64>,
    /// Listener host.
    pub host: Option<IpAddr>,
    /// Listener port.
    pub port: Option<u16>,
    /// Appended to the configured CORS origins.
    pub allow_origins: Vec<String>,
}

impl GatewayConfig {
    /// Loads the file at `explicit`, or the default location when it exists.
    ///
    /// An explicit path that does not exist is an error; a missing default file is not.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::Missing {
                        path: path.to_path_buf(),
                    });
                }
                read_file(path)?
            }
            None => match default_config_path() {
                Some(path) if path.exists() => read_file(&path)?,
                _ => GatewayConfig::default(),
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Parses a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: GatewayConfig =
            toml::from_str(contents).map_err(|source| ConfigError::Parse {
                path: PathBuf::from("<inline>"),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Applies overrides on top of the loaded values.
    pub fn apply(&mut self, overrides: ConfigOverrides) -> Result<(), ConfigError> {
        if let Some(uri) = overrides.uri {
            self.backend.uri = uri;
        }
        if let Some(user) = overrides.user {
            self.backend.user = user;
        }
        if let Some(password) = overrides.password {
            self.backend.password = password;
        }
        if let Some(timeout) = overrides.statement_timeout_ms {
            self.backend.statement_timeout_ms = timeout;
        }
        if let Some(host) = overrides.host {
            self.server.host = host;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        self.server.allow_origins.extend(overrides.allow_origins);
        self.validate()
    }

    /// Per-statement deadline.
    pub fn statement_timeout(&self) -> Duration {
        Duration::from_millis(self.backend.statement_timeout_ms)
    }

    /// Copy suitable for printing: the password is masked.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.backend.password = "********".to_string();
        copy
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.backend.uri.trim().is_empty() {
            return Err(ConfigError::Invalid("backend.uri cannot be empty".into()));
        }
        if self.backend.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "backend.max_connections must be at least 1".into(),
            ));
        }
        if self.backend.fetch_size == 0 {
            return Err(ConfigError::Invalid(
                "backend.fetch_size must be at least 1".into(),
            ));
        }
        if self.backend.statement_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "backend.statement_timeout_ms must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn read_file(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An explicitly requested file does not exist.
    #[error("config file {path} does not exist")]
    Missing {
        /// Requested path.
        path: PathBuf,
    },
    /// The file exists but could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// File path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The file is not valid TOML for [`GatewayConfig`].
    #[error("failed to parse config {path}: {source}")]
    Parse {
        /// File path.
        path: PathBuf,
        /// Underlying parse error.
        source: toml::de::Error,
    },
    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// `<config dir>/graphgate/config.toml`, when the platform has a config directory.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("graphgate").join("config.toml"))
}
