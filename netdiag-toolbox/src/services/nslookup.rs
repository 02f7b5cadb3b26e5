//! Address lookup for a hostname.

use std::net::IpAddr;

use crate::error::ToolboxResult;
use crate::services::resolver::HostResolver;
use crate::types::LookupResult;

/// Resolve A and AAAA records of `host`. Literal addresses are echoed back.
pub async fn nslookup(resolver: &dyn HostResolver, host: &str) -> ToolboxResult<LookupResult> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(LookupResult {
            host: host.to_string(),
            ips: vec![ip],
        });
    }

    let ips = resolver.resolve(host).await?;
    log::debug!("nslookup {host}: {} addresses", ips.len());
    Ok(LookupResult {
        host: host.to_string(),
        ips,
    })
}
