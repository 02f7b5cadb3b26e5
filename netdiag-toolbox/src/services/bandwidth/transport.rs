//! Download seam used by the bandwidth meter.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::Client;
use url::Url;

use crate::error::{ToolboxError, ToolboxResult};

/// Body chunks of one running download.
pub type TransferStream = BoxStream<'static, ToolboxResult<Bytes>>;

/// Opens downloads.
///
/// Dropping the returned stream must release the underlying connection.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, url: &Url) -> ToolboxResult<TransferStream>;
}

/// [`Transport`] over HTTP GET requests.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// `request_timeout` bounds every download from connect to last byte.
    pub fn new(request_timeout: Duration) -> ToolboxResult<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| ToolboxError::NetworkError(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }

    pub const fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open(&self, url: &Url) -> ToolboxResult<TransferStream> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| {
                ToolboxError::TransferError(format!("{}: {e}", url.host_str().unwrap_or("?")))
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolboxError::TransferError(format!(
                "{} returned {status}",
                url.host_str().unwrap_or("?")
            )));
        }

        log::debug!("Download opened: {}", url.host_str().unwrap_or("?"));
        Ok(response
            .bytes_stream()
            .map(|chunk| {
                chunk.map_err(|e| {
                    ToolboxError::TransferError(format!("Download stream error: {e}"))
                })
            })
            .boxed())
    }
}
