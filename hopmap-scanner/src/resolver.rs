use crate::error::{Result, ScanError};
use std::net::{IpAddr, Ipv4Addr};
use tracing::{debug, error};

/// Resolves domain names to a single IPv4 address using the system resolver.
#[derive(Debug, Clone, Default)]
pub struct Resolver;

impl Resolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolve `domain`, logging and swallowing any failure.
    pub async fn resolve(&self, domain: &str) -> Option<Ipv4Addr> {
        match self.lookup(domain).await {
            Ok(addr) => {
                debug!("Resolved {} to {}", domain, addr);
                Some(addr)
            }
            Err(e) => {
                error!("DNS resolution failed for {}: {}", domain, e);
                None
            }
        }
    }

    pub async fn lookup(&self, domain: &str) -> Result<Ipv4Addr> {
        if domain.is_empty() || domain.chars().any(char::is_whitespace) {
            return Err(ScanError::InvalidAddress(format!("{:?}", domain)));
        }
        if let Ok(addr) = domain.parse::<Ipv4Addr>() {
            return Ok(addr);
        }

        let addrs = tokio::net::lookup_host((domain, 0)).await?;
        addrs
            .filter_map(|sock| match sock.ip() {
                IpAddr::V4(v4) => Some(v4),
                IpAddr::V6(_) => None,
            })
            .next()
            .ok_or_else(|| ScanError::LookupFailed(format!("no IPv4 address for {}", domain)))
    }
}
