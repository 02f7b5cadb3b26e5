//! 统一错误类型定义

use serde::Serialize;
use thiserror::Error;

/// 工具箱错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "code", content = "details")]
pub enum ToolboxError {
    /// Malformed or missing target, or an out-of-range parameter.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The target hostname does not resolve to any address.
    #[error("Resolution error: {0}")]
    ResolutionError(String),

    /// A raw ICMP socket could not be opened for lack of privilege.
    #[error("Permission error: {0}")]
    PermissionError(String),

    /// Local network failure while setting up a conversation.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// A single bandwidth transfer failed.
    #[error("Transfer error: {0}")]
    TransferError(String),

    /// The endpoint catalog produced no candidates.
    #[error("No endpoints available")]
    NoEndpointsAvailable,

    /// An external collaborator (WHOIS, DNS, endpoint directory) failed.
    #[error("Upstream error: {0}")]
    UpstreamError(String),
}

impl ToolboxError {
    /// Whether the error is caused by the caller's input rather than the deployment.
    ///
    /// Level `warn` should be used when returning `true` and level `error` when returning `false`.
    #[must_use]
    pub const fn is_expected(&self) -> bool {
        matches!(self, Self::InvalidArgument(_) | Self::ResolutionError(_))
    }

    /// Stable machine-readable name of the variant.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "InvalidArgument",
            Self::ResolutionError(_) => "ResolutionError",
            Self::PermissionError(_) => "PermissionError",
            Self::NetworkError(_) => "NetworkError",
            Self::TransferError(_) => "TransferError",
            Self::NoEndpointsAvailable => "NoEndpointsAvailable",
            Self::UpstreamError(_) => "UpstreamError",
        }
    }
}

/// 工具箱 Result 类型别名
pub type ToolboxResult<T> = std::result::Result<T, ToolboxError>;
