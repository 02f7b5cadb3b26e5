//! 配置加载
//!
//! TOML file named by `NETDIAG_CONFIG` (default `netdiag.toml`, optional).
//! Every field has a default, so an empty or missing file is a valid config.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use netdiag_toolbox::{
    EndpointCatalog, FastComCatalog, MAX_REQUEST_COUNT, MeterConfig, PingConfig, StaticCatalog,
};
use serde::Deserialize;

const CONFIG_ENV: &str = "NETDIAG_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "netdiag.toml";
const HTML_PATH_ENV: &str = "HTML_PATH";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub log: LogConfig,
    pub probe: ProbeConfig,
    pub bandwidth: BandwidthConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub bind: String,
    /// Worker threads; defaults to the number of CPUs.
    pub workers: Option<usize>,
    /// Directory served under `/static`.
    pub static_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:80".to_string(),
            workers: None,
            static_path: PathBuf::from("/var/www/html"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// `EnvFilter` directive, overridden by `RUST_LOG`.
    pub level: String,
    pub format: LogFormat,
    pub ansi: bool,
    /// Write daily-rotated files here instead of stdout.
    pub directory: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            ansi: true,
            directory: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProbeConfig {
    /// Echo requests per ping call.
    pub count: usize,
    pub timeout_ms: u64,
    pub interval_ms: u64,
    pub privileged: bool,
    pub payload_size: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        let defaults = PingConfig::default();
        Self {
            count: netdiag_toolbox::DEFAULT_REQUEST_COUNT,
            timeout_ms: u64::try_from(defaults.timeout.as_millis()).unwrap_or(1000),
            interval_ms: u64::try_from(defaults.interval.as_millis()).unwrap_or(1000),
            privileged: defaults.privileged,
            payload_size: defaults.payload_size,
        }
    }
}

impl ProbeConfig {
    pub const fn ping_config(&self) -> PingConfig {
        PingConfig {
            timeout: Duration::from_millis(self.timeout_ms),
            interval: Duration::from_millis(self.interval_ms),
            payload_size: self.payload_size,
            privileged: self.privileged,
        }
    }

    /// Upper bound on one ping call: the last request is sent after
    /// `count - 1` intervals and waits one timeout.
    pub fn session_bound(&self) -> Duration {
        let config = self.ping_config();
        let sends = u32::try_from(self.count.saturating_sub(1)).unwrap_or(u32::MAX);
        config.interval.saturating_mul(sends) + config.timeout
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogKind {
    #[default]
    Fast,
    Static,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BandwidthConfig {
    pub catalog: CatalogKind,
    /// Endpoints of the `static` catalog.
    pub endpoints: Vec<String>,
    /// Targets requested from fast.com.
    pub url_count: usize,
    pub concurrency: usize,
    pub interval_ms: u64,
    pub max_duration_secs: u64,
    pub max_bytes: u64,
    pub request_timeout_secs: u64,
    /// How long a client may leave one SSE frame unread.
    pub write_timeout_secs: u64,
}

impl Default for BandwidthConfig {
    fn default() -> Self {
        let defaults = MeterConfig::default();
        Self {
            catalog: CatalogKind::Fast,
            endpoints: Vec::new(),
            url_count: 3,
            concurrency: defaults.concurrency,
            interval_ms: u64::try_from(defaults.interval.as_millis()).unwrap_or(250),
            max_duration_secs: defaults.max_duration.as_secs(),
            max_bytes: defaults.max_bytes,
            request_timeout_secs: defaults.request_timeout.as_secs(),
            write_timeout_secs: 10,
        }
    }
}

impl BandwidthConfig {
    pub fn meter_config(&self) -> MeterConfig {
        MeterConfig {
            concurrency: self.concurrency,
            interval: Duration::from_millis(self.interval_ms),
            max_duration: Duration::from_secs(self.max_duration_secs),
            max_bytes: self.max_bytes,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            ..MeterConfig::default()
        }
    }

    pub const fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    pub fn catalog(&self) -> anyhow::Result<Arc<dyn EndpointCatalog>> {
        Ok(match self.catalog {
            CatalogKind::Fast => Arc::new(FastComCatalog::new(self.url_count)),
            CatalogKind::Static => Arc::new(StaticCatalog::parse(self.endpoints.as_slice())?),
        })
    }
}

impl AppConfig {
    /// Load from `NETDIAG_CONFIG` or `./netdiag.toml`, then apply `HTML_PATH`.
    pub fn load() -> anyhow::Result<Self> {
        let explicit = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        let path = explicit
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else if explicit.is_some() {
            bail!("configuration file {} does not exist", path.display());
        } else {
            Self::default()
        };

        if let Some(html) = std::env::var_os(HTML_PATH_ENV).filter(|v| !v.is_empty()) {
            config.server.static_path = PathBuf::from(html);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml(&text)
            .with_context(|| format!("invalid configuration in {}", path.display()))
    }

    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !(1..=MAX_REQUEST_COUNT).contains(&self.probe.count) {
            bail!(
                "probe.count must be between 1 and {MAX_REQUEST_COUNT}, got {}",
                self.probe.count
            );
        }
        self.probe.ping_config().validate()?;
        self.bandwidth.meter_config().validate()?;
        if self.bandwidth.catalog == CatalogKind::Static && self.bandwidth.endpoints.is_empty() {
            bail!("bandwidth.catalog = \"static\" requires at least one endpoint");
        }
        if self.bandwidth.write_timeout_secs == 0 {
            bail!("bandwidth.write_timeout_secs must be positive");
        }
        if self.server.workers == Some(0) {
            bail!("server.workers must be positive");
        }
        Ok(())
    }
}
