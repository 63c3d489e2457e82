use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Env var naming an explicit config file
pub const CONFIG_ENV: &str = "SPLUNK_LOGGING_CONFIG";

/// Main configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub log_level: LogLevel,
    pub splunk: SplunkConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Off,
}

impl LogLevel {
    pub fn as_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Trace => log::LevelFilter::Trace,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Off => log::LevelFilter::Off,
        }
    }
}

/// Collector connection and delivery settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SplunkConfig {
    /// Collector host name or address, without scheme
    pub address: String,
    /// HTTP Event Collector port
    pub port: u16,
    /// Use https instead of http
    pub https: bool,
    /// HEC token, sent as `Authorization: Splunk <token>`
    pub token: String,
    /// Master switch; when false nothing is sent
    pub enabled: bool,
    /// Deliver on background workers instead of the caller's thread
    pub threaded: bool,
    /// Application version added to request snapshots
    pub version: Option<String>,
    /// Per-request timeout
    pub timeout_secs: u64,
    /// Verify the collector's TLS certificate
    pub verify_tls: bool,
    /// Delivery worker threads when threaded
    pub workers: usize,
    /// Events that may wait for a worker before new ones are dropped
    pub queue_capacity: usize,
}

impl Default for SplunkConfig {
    fn default() -> Self {
        Self {
            address: "localhost".to_string(),
            port: 8088,
            https: true,
            token: String::new(),
            enabled: false,
            threaded: false,
            version: None,
            timeout_secs: 5,
            verify_tls: false,
            workers: 2,
            queue_capacity: 256,
        }
    }
}

impl SplunkConfig {
    /// https without certificate verification
    pub fn skips_tls_verification(&self) -> bool {
        self.https && !self.verify_tls
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let mut config = Self::load_file(config_path)?;
        config.apply_env();
        Ok(config)
    }

    fn load_file(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            let path = Self::expand_path(path);
            return Self::load_from_file(&path).context(format!("Failed to load config from {}", path.display()));
        }

        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = Self::expand_path(Path::new(&env_path));
            if path.exists() {
                match Self::load_from_file(&path) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", CONFIG_ENV, e);
                    }
                }
            }
        }

        // Try ~/.config/splunk-logging/splunk-logging.yaml
        if let Some(config_dir) = dirs::config_dir() {
            let path = config_dir.join("splunk-logging").join("splunk-logging.yaml");
            if path.exists() {
                match Self::load_from_file(&path) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", path.display(), e);
                    }
                }
            }
        }

        // Try ./splunk-logging.yaml (for development)
        let local_config = PathBuf::from("splunk-logging.yaml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load local config: {}", e);
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Secrets and deployment-specific values may come from the environment
    fn apply_env(&mut self) {
        if let Ok(token) = std::env::var("SPLUNK_TOKEN") {
            self.splunk.token = token;
        }
        if let Ok(address) = std::env::var("SPLUNK_ADDRESS") {
            self.splunk.address = address;
        }
    }

    /// Expand a path that may contain ~ or env vars
    pub fn expand_path(path: &Path) -> PathBuf {
        let path_str = path.to_string_lossy();
        let expanded = shellexpand::full(&path_str).unwrap_or_else(|_| path_str.clone());
        PathBuf::from(expanded.as_ref())
    }
}
