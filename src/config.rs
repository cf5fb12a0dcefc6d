//! Configuration loading and constants.
//!
//! Defines the defaults the server starts with (port 8000, `cert.pem`/`key.pem`
//! in the working directory, the working directory as document root) and the
//! optional TOML file that can override them. `AppConfig` is the root
//! configuration struct; command line flags are applied on top of it with
//! [`AppConfig::apply_overrides`].

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use const_format::formatcp;
use serde::Deserialize;

// =============================================================================
// Network Defaults
// =============================================================================

/// Default bind host (all IPv4 interfaces)
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default HTTPS port
pub const DEFAULT_PORT: u16 = 8000;

/// Default port for the optional plain HTTP redirect listener
pub const DEFAULT_REDIRECT_PORT: u16 = 8080;

/// Seconds to wait for open connections after a shutdown signal
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 10;

/// External address used to pick the outbound interface. No packet is sent.
pub const DISCOVERY_TARGET_ADDR: &str = "8.8.8.8:80";

// =============================================================================
// HTTP Response Cache Control
// =============================================================================
// The quiz page is edited while phones have it open, so every response is
// revalidated instead of cached.

/// Revalidate on every load
pub const HTTP_CACHE_MAX_AGE: u32 = 0;

pub const CACHE_CONTROL_FILES: &str = formatcp!("no-cache, max-age={}", HTTP_CACHE_MAX_AGE);

// =============================================================================
// Default Paths and Strings
// =============================================================================

/// Config file picked up from the working directory when `--config` is not given
pub const DEFAULT_CONFIG_PATH: &str = "quizserve.toml";

/// Default certificate chain (PEM)
pub const DEFAULT_CERT_PATH: &str = "cert.pem";

/// Default private key (PEM)
pub const DEFAULT_KEY_PATH: &str = "key.pem";

/// Default document root
pub const DEFAULT_ROOT: &str = ".";

/// Default log filter when RUST_LOG is not set
pub const DEFAULT_LOG_FILTER: &str = "quizserve=info,tower_http=info";

/// Default log format (text or json)
pub const DEFAULT_LOG_FORMAT: &str = "text";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Listener configuration
    #[serde(default)]
    pub http: HttpServerConfig,
    /// Certificate and key locations
    #[serde(default)]
    pub tls: TlsConfig,
    /// Document root and listing behaviour
    #[serde(default)]
    pub files: FilesConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTPS listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default = "HttpServerConfig::default_host")]
    pub host: String,
    #[serde(default = "HttpServerConfig::default_port")]
    pub port: u16,
    /// Grace period for open connections once shutdown starts
    #[serde(default = "HttpServerConfig::default_shutdown_grace")]
    pub shutdown_grace_seconds: u64,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
            shutdown_grace_seconds: Self::default_shutdown_grace(),
        }
    }
}

impl HttpServerConfig {
    fn default_host() -> String {
        DEFAULT_HOST.to_string()
    }

    fn default_port() -> u16 {
        DEFAULT_PORT
    }

    fn default_shutdown_grace() -> u64 {
        DEFAULT_SHUTDOWN_GRACE_SECS
    }

    /// Address to bind. The host must be a literal IP address.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self.host.parse().map_err(|_| {
            ConfigError::Validation(format!(
                "http.host must be an IP address, got '{}'",
                self.host
            ))
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

/// TLS configuration. Certificates are provided by the operator; the server
/// never generates or renews them.
#[derive(Debug, Clone, Deserialize)]
pub struct TlsConfig {
    #[serde(default = "TlsConfig::default_cert_path")]
    pub cert_path: PathBuf,
    #[serde(default = "TlsConfig::default_key_path")]
    pub key_path: PathBuf,
    /// Also listen on plain HTTP and redirect to HTTPS
    #[serde(default)]
    pub redirect_http: bool,
    #[serde(default = "TlsConfig::default_redirect_port")]
    pub redirect_port: u16,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            cert_path: Self::default_cert_path(),
            key_path: Self::default_key_path(),
            redirect_http: false,
            redirect_port: Self::default_redirect_port(),
        }
    }
}

impl TlsConfig {
    fn default_cert_path() -> PathBuf {
        PathBuf::from(DEFAULT_CERT_PATH)
    }

    fn default_key_path() -> PathBuf {
        PathBuf::from(DEFAULT_KEY_PATH)
    }

    fn default_redirect_port() -> u16 {
        DEFAULT_REDIRECT_PORT
    }
}

/// Static file configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FilesConfig {
    #[serde(default = "FilesConfig::default_root")]
    pub root: PathBuf,
    /// Render an index page for directories without `index.html`
    #[serde(default = "FilesConfig::default_directory_listing")]
    pub directory_listing: bool,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            root: Self::default_root(),
            directory_listing: Self::default_directory_listing(),
        }
    }
}

impl FilesConfig {
    fn default_root() -> PathBuf {
        PathBuf::from(DEFAULT_ROOT)
    }

    fn default_directory_listing() -> bool {
        true
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "text" (human-readable, default) or "json" (structured)
    #[serde(default = "LoggingConfig::default_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: DEFAULT_LOG_FORMAT.to_string(),
        }
    }
}

impl LoggingConfig {
    fn default_format() -> String {
        DEFAULT_LOG_FORMAT.to_string()
    }
}

/// Values given on the command line. `None` keeps the config file value.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub cert_path: Option<PathBuf>,
    pub key_path: Option<PathBuf>,
    pub root: Option<PathBuf>,
    pub no_listing: bool,
}

impl AppConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load an explicitly requested file, or the default file if it exists,
    /// or fall back to built-in defaults.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::load(path),
            None if Path::new(DEFAULT_CONFIG_PATH).is_file() => Self::load(DEFAULT_CONFIG_PATH),
            None => Ok(Self::default()),
        }
    }

    pub fn apply_overrides(&mut self, overrides: Overrides) {
        if let Some(host) = overrides.host {
            self.http.host = host;
        }
        if let Some(port) = overrides.port {
            self.http.port = port;
        }
        if let Some(cert_path) = overrides.cert_path {
            self.tls.cert_path = cert_path;
        }
        if let Some(key_path) = overrides.key_path {
            self.tls.key_path = key_path;
        }
        if let Some(root) = overrides.root {
            self.files.root = root;
        }
        if overrides.no_listing {
            self.files.directory_listing = false;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.http.socket_addr()?;

        if self.tls.cert_path.as_os_str().is_empty() || self.tls.key_path.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "tls.cert_path and tls.key_path must not be empty".to_string(),
            ));
        }

        if self.tls.redirect_http && self.http.port != 0 && self.tls.redirect_port == self.http.port {
            return Err(ConfigError::Validation(format!(
                "tls.redirect_port ({}) must differ from http.port",
                self.tls.redirect_port
            )));
        }

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            return Err(ConfigError::Validation(format!(
                "logging.format must be \"text\" or \"json\", got '{}'",
                self.logging.format
            )));
        }

        if !self.files.root.is_dir() {
            return Err(ConfigError::Validation(format!(
                "files.root '{}' is not a directory",
                self.files.root.display()
            )));
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Configuration error: {0}")]
    Validation(String),
}
