//! Shared application state and the toolbox seam used by the handlers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use netdiag_toolbox::{
    LookupResult, Measurement, ProbeStatistics, StreamPublisher, ToolboxResult, ToolboxService,
    WhoisResult,
};

use crate::config::AppConfig;

const WHOIS_TIMEOUT_SECS: u64 = 30;
const NSLOOKUP_TIMEOUT_SECS: u64 = 15;
const CATALOG_TIMEOUT_SECS: u64 = 30;
/// Slack added to the computed ping session bound.
const PING_GRACE_SECS: u64 = 5;

#[async_trait]
pub trait ToolboxGateway: Send + Sync {
    async fn ping(&self, target: &str) -> ToolboxResult<ProbeStatistics>;

    async fn whois_lookup(&self, domain: &str) -> ToolboxResult<WhoisResult>;

    async fn nslookup(&self, host: &str) -> ToolboxResult<LookupResult>;

    async fn bandwidth(&self) -> ToolboxResult<Measurement>;
}

/// [`ToolboxGateway`] over a configured [`ToolboxService`].
pub struct DefaultToolboxGateway {
    service: ToolboxService,
    ping_count: usize,
}

impl DefaultToolboxGateway {
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let service = ToolboxService::builder()
            .ping_config(config.probe.ping_config())
            .meter_config(config.bandwidth.meter_config())
            .catalog(config.bandwidth.catalog()?)
            .build()?;
        Ok(Self {
            service,
            ping_count: config.probe.count,
        })
    }
}

#[async_trait]
impl ToolboxGateway for DefaultToolboxGateway {
    async fn ping(&self, target: &str) -> ToolboxResult<ProbeStatistics> {
        self.service.ping(target, self.ping_count).await
    }

    async fn whois_lookup(&self, domain: &str) -> ToolboxResult<WhoisResult> {
        self.service.whois_lookup(domain).await
    }

    async fn nslookup(&self, host: &str) -> ToolboxResult<LookupResult> {
        self.service.nslookup(host).await
    }

    async fn bandwidth(&self) -> ToolboxResult<Measurement> {
        self.service.bandwidth().await
    }
}

/// Upper bounds on the request/response operations.
#[derive(Debug, Clone, Copy)]
pub struct RequestTimeouts {
    pub ping: Duration,
    pub whois: Duration,
    pub nslookup: Duration,
    /// Endpoint discovery before the event stream starts.
    pub catalog: Duration,
}

impl Default for RequestTimeouts {
    fn default() -> Self {
        Self {
            ping: Duration::from_secs(3 + PING_GRACE_SECS),
            whois: Duration::from_secs(WHOIS_TIMEOUT_SECS),
            nslookup: Duration::from_secs(NSLOOKUP_TIMEOUT_SECS),
            catalog: Duration::from_secs(CATALOG_TIMEOUT_SECS),
        }
    }
}

impl RequestTimeouts {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            ping: config.probe.session_bound() + Duration::from_secs(PING_GRACE_SECS),
            ..Self::default()
        }
    }
}

pub struct AppState {
    pub toolbox: Arc<dyn ToolboxGateway>,
    pub publisher: StreamPublisher,
    pub timeouts: RequestTimeouts,
}

impl AppState {
    pub fn new(toolbox: Arc<dyn ToolboxGateway>, config: &AppConfig) -> Self {
        Self {
            toolbox,
            publisher: StreamPublisher::new(config.bandwidth.write_timeout()),
            timeouts: RequestTimeouts::from_config(config),
        }
    }
}
