//! Server configuration.
//!
//! Configuration can be loaded from:
//! - TOML configuration file (`ferry.toml`, `/etc/ferry/ferry.toml`,
//!   `~/.config/ferry/ferry.toml`)
//! - Environment variables (`FERRY_*`, nested keys separated by `__`)
//! - An explicit file named by `FERRY_CONFIG`

use anyhow::{Context, Result};
use ferry_core::ResolverConfig;
use ferry_live::BrokerConfig;
use ferry_realm::ExposerConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application layout.
    #[serde(default)]
    pub app: AppConfig,

    /// Live channel configuration.
    #[serde(default)]
    pub live: LiveConfig,

    /// Cross-realm exposure configuration.
    #[serde(default)]
    pub expose: ExposeConfig,

    /// Route resolution limits.
    #[serde(default)]
    pub resolver: ResolverSettings,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Application directories. Realm directories are relative to `base_dir`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application root.
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    /// Frontend realm directory.
    #[serde(default = "default_frontend_dir")]
    pub frontend_dir: PathBuf,

    /// Backend realm directory.
    #[serde(default = "default_backend_dir")]
    pub backend_dir: PathBuf,

    /// Common realm directory.
    #[serde(default = "default_common_dir")]
    pub common_dir: PathBuf,

    /// Directory served route by route when the backend has no entrypoint.
    #[serde(default)]
    pub pages_dir: Option<PathBuf>,
}

/// Live channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveConfig {
    /// Enable the live channel and hot reloading.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Keep-alive interval in milliseconds.
    #[serde(default = "default_ping_interval")]
    pub ping_interval_ms: u64,

    /// Window in milliseconds in which reloads are logged together.
    #[serde(default = "default_reload_window")]
    pub reload_window_ms: u64,
}

/// Cross-realm exposure configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExposeConfig {
    /// Quiet period in milliseconds before a stub is regenerated.
    #[serde(default = "default_debounce")]
    pub debounce_ms: u64,

    /// Web path prefix of backend module stubs.
    #[serde(default = "default_src_prefix")]
    pub src_prefix: String,

    /// Web path prefix of specifier stubs.
    #[serde(default = "default_external_prefix")]
    pub external_prefix: String,

    /// Extensions of interface modules.
    #[serde(default = "default_interface_extensions")]
    pub interface_extensions: Vec<String>,
}

/// Route resolution limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverSettings {
    /// Maximum entrypoint nesting depth.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_base_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_frontend_dir() -> PathBuf {
    PathBuf::from("frontend")
}

fn default_backend_dir() -> PathBuf {
    PathBuf::from("backend")
}

fn default_common_dir() -> PathBuf {
    PathBuf::from("common")
}

fn default_ping_interval() -> u64 {
    5_000 // 5 seconds
}

fn default_reload_window() -> u64 {
    200
}

fn default_debounce() -> u64 {
    500
}

fn default_src_prefix() -> String {
    "/@ferry/src/".to_string()
}

fn default_external_prefix() -> String {
    "/@ferry/external/".to_string()
}

fn default_interface_extensions() -> Vec<String> {
    vec!["dx".to_string(), "dxb".to_string()]
}

fn default_max_depth() -> usize {
    ferry_core::resolver::DEFAULT_MAX_DEPTH
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            app: AppConfig::default(),
            live: LiveConfig::default(),
            expose: ExposeConfig::default(),
            resolver: ResolverSettings::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            frontend_dir: default_frontend_dir(),
            backend_dir: default_backend_dir(),
            common_dir: default_common_dir(),
            pages_dir: None,
        }
    }
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ping_interval_ms: default_ping_interval(),
            reload_window_ms: default_reload_window(),
        }
    }
}

impl Default for ExposeConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce(),
            src_prefix: default_src_prefix(),
            external_prefix: default_external_prefix(),
            interface_extensions: default_interface_extensions(),
        }
    }
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl AppConfig {
    /// Resolve a configured directory against the base directory.
    #[must_use]
    pub fn dir(&self, dir: &Path) -> PathBuf {
        self.base_dir.join(dir)
    }

    /// Absolute-or-relative frontend directory.
    #[must_use]
    pub fn frontend(&self) -> PathBuf {
        self.dir(&self.frontend_dir)
    }

    /// Absolute-or-relative backend directory.
    #[must_use]
    pub fn backend(&self) -> PathBuf {
        self.dir(&self.backend_dir)
    }

    /// Absolute-or-relative common directory.
    #[must_use]
    pub fn common(&self) -> PathBuf {
        self.dir(&self.common_dir)
    }

    /// Pages directory, if configured.
    #[must_use]
    pub fn pages(&self) -> Option<PathBuf> {
        self.pages_dir.as_deref().map(|dir| self.dir(dir))
    }
}

impl Config {
    /// Load configuration from the file named by `FERRY_CONFIG`, or else
    /// from the first existing default file overridden by `FERRY_*`
    /// environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed or an
    /// environment variable holds a value of the wrong type.
    pub fn load() -> Result<Self> {
        if let Ok(path) = std::env::var("FERRY_CONFIG") {
            return Self::from_file(shellexpand::tilde(&path).as_ref());
        }

        let config_paths = [
            "ferry.toml",
            "/etc/ferry/ferry.toml",
            "~/.config/ferry/ferry.toml",
        ];

        let mut builder = config::Config::builder();
        if let Some(path) = config_paths
            .iter()
            .map(|path| shellexpand::tilde(path).into_owned())
            .find(|path| Path::new(path).exists())
        {
            tracing::debug!(path = %path, "Using config file");
            builder = builder.add_source(
                config::File::with_name(&path)
                    .format(config::FileFormat::Toml)
                    .required(true),
            );
        }

        builder
            .add_source(
                config::Environment::with_prefix("FERRY")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to load configuration")?
            .try_deserialize()
            .context("Invalid configuration")
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not form a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address: {}:{}", self.host, self.port))
    }

    /// Broker settings derived from the live section.
    #[must_use]
    pub fn broker_config(&self) -> BrokerConfig {
        BrokerConfig {
            reload_window: Duration::from_millis(self.live.reload_window_ms),
            ping_interval: Duration::from_millis(self.live.ping_interval_ms),
        }
    }

    /// Exposer settings derived from the app and expose sections.
    #[must_use]
    pub fn exposer_config(&self) -> ExposerConfig {
        ExposerConfig {
            base_dir: self.app.base_dir.clone(),
            src_prefix: self.expose.src_prefix.clone(),
            external_prefix: self.expose.external_prefix.clone(),
            interface_extensions: self.expose.interface_extensions.clone(),
            debounce: Duration::from_millis(self.expose.debounce_ms),
            ..ExposerConfig::default()
        }
    }

    /// Resolver settings.
    #[must_use]
    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            max_depth: self.resolver.max_depth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, 8080);
        assert!(config.live.enabled);
        assert_eq!(config.live.ping_interval_ms, 5000);
        assert_eq!(config.resolver.max_depth, 64);
        assert!(config.app.pages_dir.is_none());
    }

    #[test]
    fn test_config_bind_addr() {
        let config = Config::default();
        let addr = config.bind_addr().unwrap();
        assert_eq!(addr.port(), 8080);

        let broken = Config {
            host: "not a host".to_string(),
            ..Config::default()
        };
        assert!(broken.bind_addr().is_err());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            host = "0.0.0.0"
            port = 9000

            [app]
            base_dir = "/srv/app"
            pages_dir = "pages"

            [expose]
            debounce_ms = 50
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert_eq!(config.app.pages(), Some(PathBuf::from("/srv/app/pages")));
        assert_eq!(config.app.backend(), PathBuf::from("/srv/app/backend"));
        assert_eq!(config.exposer_config().debounce, Duration::from_millis(50));
        assert_eq!(config.expose.src_prefix, "/@ferry/src/");
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ferry.toml");
        std::fs::write(&path, "[live]\nenabled = false\nping_interval_ms = 1000\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert!(!config.live.enabled);
        assert_eq!(config.broker_config().ping_interval, Duration::from_secs(1));

        std::fs::write(&path, "port = \"eighty\"").unwrap();
        let err = Config::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
