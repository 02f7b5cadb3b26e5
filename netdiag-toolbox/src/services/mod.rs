//! Service façade exposing all toolbox operations.

pub mod bandwidth;
mod nslookup;
pub mod probe;
pub mod resolver;
mod whois;

use std::net::IpAddr;
use std::sync::Arc;

use crate::error::{ToolboxError, ToolboxResult};
use crate::types::{LookupResult, ProbeStatistics, WhoisResult};
use bandwidth::{BandwidthMeter, EndpointCatalog, Measurement};
use probe::Pinger;
use resolver::{HostResolver, SystemResolver};

/// Validate and normalise a hostname or IP address input.
///
/// Trims whitespace, passes through valid IP addresses unchanged, converts
/// internationalised domain names (IDN) to ASCII via IDNA 2008, and rejects
/// empty or overlong inputs.
pub(crate) fn validate_target(target: &str) -> ToolboxResult<String> {
    let target = target.trim();
    if target.is_empty() {
        return Err(ToolboxError::InvalidArgument(
            "Target is required".to_string(),
        ));
    }
    if target.parse::<IpAddr>().is_ok() {
        return Ok(target.to_string());
    }
    let ascii = idna::domain_to_ascii_strict(target)
        .map_err(|_| ToolboxError::InvalidArgument(format!("Invalid host name: {target}")))?;
    if ascii.len() > 253 {
        return Err(ToolboxError::InvalidArgument(format!(
            "Host name exceeds maximum length of 253 characters (got {})",
            ascii.len()
        )));
    }
    Ok(ascii)
}

/// Entry point for all network diagnostic operations.
///
/// Cheap to clone; every clone shares the same collaborators.
///
/// ```rust,no_run
/// use netdiag_toolbox::{PingConfig, ToolboxService};
/// # async fn demo() -> netdiag_toolbox::ToolboxResult<()> {
/// let service = ToolboxService::builder().ping_config(PingConfig::default()).build()?;
/// let stats = service.ping("example.com", 3).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ToolboxService {
    resolver: Arc<dyn HostResolver>,
    pinger: Pinger,
    catalog: Arc<dyn EndpointCatalog>,
    meter: BandwidthMeter,
}

impl ToolboxService {
    pub fn new(
        resolver: Arc<dyn HostResolver>,
        pinger: Pinger,
        catalog: Arc<dyn EndpointCatalog>,
        meter: BandwidthMeter,
    ) -> Self {
        Self {
            resolver,
            pinger,
            catalog,
            meter,
        }
    }

    pub fn builder() -> ToolboxServiceBuilder {
        ToolboxServiceBuilder::default()
    }

    /// Send `count` ICMP echo requests to `target` and summarize the replies.
    pub async fn ping(&self, target: &str, count: usize) -> ToolboxResult<ProbeStatistics> {
        self.pinger.run(target, count).await
    }

    /// Query WHOIS information for a domain.
    ///
    /// Returns the raw record together with the registration fields parsed from it.
    pub async fn whois_lookup(&self, domain: &str) -> ToolboxResult<WhoisResult> {
        let domain = validate_target(domain)?;
        whois::whois_lookup(&domain).await
    }

    /// Resolve the addresses of a hostname, IPv4 first.
    pub async fn nslookup(&self, host: &str) -> ToolboxResult<LookupResult> {
        let host = validate_target(host)?;
        nslookup::nslookup(self.resolver.as_ref(), &host).await
    }

    /// Discover endpoints and start a bandwidth run against them.
    pub async fn bandwidth(&self) -> ToolboxResult<Measurement> {
        let endpoints = self.catalog.endpoints().await?;
        self.meter.measure(endpoints)
    }
}

/// Assembles a [`ToolboxService`] over production collaborators unless told otherwise.
#[derive(Default)]
pub struct ToolboxServiceBuilder {
    resolver: Option<Arc<dyn HostResolver>>,
    ping_config: probe::PingConfig,
    network: Option<Arc<dyn probe::IcmpNetwork>>,
    catalog: Option<Arc<dyn EndpointCatalog>>,
    meter_config: bandwidth::MeterConfig,
    transport: Option<Arc<dyn bandwidth::Transport>>,
}

impl ToolboxServiceBuilder {
    #[must_use]
    pub fn resolver(mut self, resolver: Arc<dyn HostResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    #[must_use]
    pub fn ping_config(mut self, config: probe::PingConfig) -> Self {
        self.ping_config = config;
        self
    }

    #[must_use]
    pub fn network(mut self, network: Arc<dyn probe::IcmpNetwork>) -> Self {
        self.network = Some(network);
        self
    }

    #[must_use]
    pub fn catalog(mut self, catalog: Arc<dyn EndpointCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    #[must_use]
    pub fn meter_config(mut self, config: bandwidth::MeterConfig) -> Self {
        self.meter_config = config;
        self
    }

    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn bandwidth::Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Validate the tuning and build the service.
    pub fn build(self) -> ToolboxResult<ToolboxService> {
        self.ping_config.validate()?;
        self.meter_config.validate()?;

        let resolver = self.resolver.unwrap_or_else(|| Arc::new(SystemResolver));
        let network = self.network.unwrap_or_else(|| {
            Arc::new(probe::SystemIcmpNetwork::new(self.ping_config.privileged))
        });
        let pinger = Pinger::new(self.ping_config, Arc::clone(&resolver), network);

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(bandwidth::HttpTransport::new(
                self.meter_config.request_timeout,
            )?),
        };
        let catalog = self
            .catalog
            .unwrap_or_else(|| Arc::new(bandwidth::FastComCatalog::default()));
        let meter = BandwidthMeter::new(self.meter_config, transport);

        Ok(ToolboxService::new(resolver, pinger, catalog, meter))
    }
}
