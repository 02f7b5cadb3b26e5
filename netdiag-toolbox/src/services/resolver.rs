//! Shared DNS resolver helpers and the host resolution seam used by the probe engine.

use std::net::IpAddr;
use std::sync::LazyLock;

use async_trait::async_trait;
use hickory_resolver::{
    TokioResolver,
    config::{ResolverConfig, ResolverOpts},
    name_server::TokioConnectionProvider,
};

use crate::error::{ToolboxError, ToolboxResult};

/// Shared default DNS resolver.
///
/// On Unix/Windows this uses the host system configuration (e.g. `/etc/resolv.conf`).
/// If the system configuration cannot be loaded, it falls back to Hickory's default
/// upstream set (Google Public DNS).
pub(crate) static DEFAULT_RESOLVER: LazyLock<TokioResolver> = LazyLock::new(build_system_resolver);

/// Build a resolver using the host system DNS configuration (with fallback).
fn build_system_resolver() -> TokioResolver {
    #[cfg(any(unix, target_os = "windows"))]
    {
        match TokioResolver::builder_tokio() {
            Ok(builder) => return builder.build(),
            Err(e) => {
                log::warn!(
                    "Failed to load system DNS configuration, falling back to defaults: {e}"
                );
            }
        }
    }

    let provider = TokioConnectionProvider::default();
    TokioResolver::builder_with_config(ResolverConfig::default(), provider)
        .with_options(ResolverOpts::default())
        .build()
}

/// Resolves a hostname to its addresses.
#[async_trait]
pub trait HostResolver: Send + Sync {
    /// Return every address of `host`, IPv4 first.
    ///
    /// Fails with [`ToolboxError::ResolutionError`] when nothing resolves.
    async fn resolve(&self, host: &str) -> ToolboxResult<Vec<IpAddr>>;
}

/// [`HostResolver`] backed by the system-configured resolver.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

#[async_trait]
impl HostResolver for SystemResolver {
    async fn resolve(&self, host: &str) -> ToolboxResult<Vec<IpAddr>> {
        let lookup = DEFAULT_RESOLVER
            .lookup_ip(host)
            .await
            .map_err(|e| ToolboxError::ResolutionError(format!("{host}: {e}")))?;

        let ips = order_addresses(lookup.iter());
        if ips.is_empty() {
            return Err(ToolboxError::ResolutionError(format!(
                "{host}: no addresses found"
            )));
        }
        Ok(ips)
    }
}

/// Deduplicate and put IPv4 addresses ahead of IPv6 ones, keeping relative order.
pub(crate) fn order_addresses(addrs: impl IntoIterator<Item = IpAddr>) -> Vec<IpAddr> {
    let mut v4 = Vec::new();
    let mut v6 = Vec::new();
    for ip in addrs {
        let bucket = if ip.is_ipv4() { &mut v4 } else { &mut v6 };
        if !bucket.contains(&ip) {
            bucket.push(ip);
        }
    }
    v4.extend(v6);
    v4
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_order_addresses_prefers_ipv4() {
        let input: Vec<IpAddr> = vec![
            "::1".parse().unwrap(),
            "10.0.0.1".parse().unwrap(),
            "::1".parse().unwrap(),
            "10.0.0.2".parse().unwrap(),
            "10.0.0.1".parse().unwrap(),
        ];
        let ordered = order_addresses(input);
        let rendered: Vec<String> = ordered.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["10.0.0.1", "10.0.0.2", "::1"]);
    }

    #[tokio::test]
    async fn test_unresolvable_name_fails() {
        // The `.invalid` TLD is reserved and never resolves (RFC 6761).
        let result = SystemResolver.resolve("does-not-exist.invalid").await;
        assert!(matches!(result, Err(ToolboxError::ResolutionError(_))));
    }

    #[tokio::test]
    #[ignore = "requires network access"]
    async fn test_resolve_real_host() {
        let ips = SystemResolver.resolve("example.com").await.unwrap();
        assert!(!ips.is_empty());
    }
}
