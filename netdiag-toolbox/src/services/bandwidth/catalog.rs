//! Discovery of bandwidth test endpoints.

use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use crate::error::{ToolboxError, ToolboxResult};

const FAST_COM_URL: &str = "https://fast.com";
const FAST_COM_API: &str = "https://api.fast.com/netflix/speedtest/v2";
const CATALOG_TIMEOUT_SECS: u64 = 10;

/// Produces the ordered list of endpoints a bandwidth run downloads from.
#[async_trait]
pub trait EndpointCatalog: Send + Sync {
    /// Fails with [`ToolboxError::NoEndpointsAvailable`] when nothing is found.
    async fn endpoints(&self) -> ToolboxResult<Vec<Url>>;
}

/// A fixed, configured list.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    endpoints: Vec<Url>,
}

impl StaticCatalog {
    pub const fn new(endpoints: Vec<Url>) -> Self {
        Self { endpoints }
    }

    /// Parse every entry as an absolute URL.
    pub fn parse<S: AsRef<str>>(endpoints: &[S]) -> ToolboxResult<Self> {
        let endpoints = endpoints
            .iter()
            .map(|raw| {
                Url::parse(raw.as_ref()).map_err(|e| {
                    ToolboxError::InvalidArgument(format!("Invalid endpoint {}: {e}", raw.as_ref()))
                })
            })
            .collect::<ToolboxResult<Vec<_>>>()?;
        Ok(Self::new(endpoints))
    }
}

#[async_trait]
impl EndpointCatalog for StaticCatalog {
    async fn endpoints(&self) -> ToolboxResult<Vec<Url>> {
        if self.endpoints.is_empty() {
            return Err(ToolboxError::NoEndpointsAvailable);
        }
        Ok(self.endpoints.clone())
    }
}

/// Netflix's fast.com directory.
///
/// The API token is scraped from the page's application bundle, then the
/// speedtest API hands out `url_count` download targets.
#[derive(Debug, Clone)]
pub struct FastComCatalog {
    client: Client,
    url_count: usize,
}

impl Default for FastComCatalog {
    fn default() -> Self {
        Self::new(3)
    }
}

#[derive(Deserialize)]
struct SpeedtestResponse {
    #[serde(default)]
    targets: Vec<SpeedtestTarget>,
}

#[derive(Deserialize)]
struct SpeedtestTarget {
    url: String,
}

impl FastComCatalog {
    pub fn new(url_count: usize) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(CATALOG_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self {
            client,
            url_count: url_count.max(1),
        }
    }

    async fn fetch_text(&self, url: &str) -> ToolboxResult<String> {
        self.client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| ToolboxError::UpstreamError(format!("Request to {url} failed: {e}")))?
            .text()
            .await
            .map_err(|e| ToolboxError::UpstreamError(format!("Failed to read {url}: {e}")))
    }

    async fn token(&self) -> ToolboxResult<String> {
        let page = self.fetch_text(FAST_COM_URL).await?;
        let script = find_script_path(&page)?.ok_or_else(|| {
            ToolboxError::UpstreamError("fast.com page references no app bundle".to_string())
        })?;
        let bundle = self.fetch_text(&format!("{FAST_COM_URL}{script}")).await?;
        find_token(&bundle)?.ok_or_else(|| {
            ToolboxError::UpstreamError("fast.com bundle carries no API token".to_string())
        })
    }
}

#[async_trait]
impl EndpointCatalog for FastComCatalog {
    async fn endpoints(&self) -> ToolboxResult<Vec<Url>> {
        let token = self.token().await?;
        let url_count = self.url_count.to_string();
        let api = Url::parse_with_params(
            FAST_COM_API,
            &[
                ("https", "true"),
                ("token", token.as_str()),
                ("urlCount", url_count.as_str()),
            ],
        )
        .map_err(|e| ToolboxError::UpstreamError(format!("Invalid speedtest API URL: {e}")))?;

        let response: SpeedtestResponse = self
            .client
            .get(api)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| ToolboxError::UpstreamError(format!("Speedtest API request failed: {e}")))?
            .json()
            .await
            .map_err(|e| {
                ToolboxError::UpstreamError(format!("Failed to parse speedtest API response: {e}"))
            })?;

        let endpoints = parse_targets(response);
        log::info!("fast.com returned {} endpoints", endpoints.len());
        if endpoints.is_empty() {
            return Err(ToolboxError::NoEndpointsAvailable);
        }
        Ok(endpoints)
    }
}

fn parse_targets(response: SpeedtestResponse) -> Vec<Url> {
    response
        .targets
        .into_iter()
        .filter_map(|target| match Url::parse(&target.url) {
            Ok(url) => Some(url),
            Err(e) => {
                log::warn!("Skipping malformed endpoint {}: {e}", target.url);
                None
            }
        })
        .collect()
}

fn capture(pattern: &str, text: &str) -> ToolboxResult<Option<String>> {
    let re = Regex::new(pattern)
        .map_err(|e| ToolboxError::UpstreamError(format!("Invalid pattern {pattern}: {e}")))?;
    Ok(re
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string()))
}

/// Path of the `app-*.js` bundle referenced by the fast.com page.
fn find_script_path(html: &str) -> ToolboxResult<Option<String>> {
    capture(r#"<script[^>]*\ssrc="(/app-[^"]*\.js)""#, html)
}

fn find_token(bundle: &str) -> ToolboxResult<Option<String>> {
    capture(r#"token:"([A-Za-z0-9]+)""#, bundle)
}
