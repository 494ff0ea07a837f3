//! DNS resolution with a 5-minute cache (§4.D "DNS").
//!
//! Resolves upstream hosts via the platform resolver and caches the first
//! returned address per hostname. On resolution failure the caller stamps
//! `destination` as `unknown` and attaches an error to the transaction; the
//! proxy leg is not aborted (a failing connect attempt is itself
//! capturable as an `UpstreamError`).

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioResolver;

/// How long a resolved hostname -> address mapping stays valid.
const CACHE_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    addr: IpAddr,
    resolved_at: Instant,
}

/// Hostname placeholder recorded on a transaction when resolution fails
/// (§4.D "stamp destination as unknown").
pub const UNKNOWN_DESTINATION: &str = "unknown";

#[derive(Clone)]
pub struct DnsCache {
    resolver: Arc<TokioResolver>,
    cache: Arc<DashMap<String, CacheEntry>>,
}

impl DnsCache {
    pub fn new() -> Self {
        let resolver =
            TokioResolver::tokio(ResolverConfig::default(), ResolverOpts::default());
        Self {
            resolver: Arc::new(resolver),
            cache: Arc::new(DashMap::new()),
        }
    }

    /// Resolve `host` to its first address, consulting and refreshing the
    /// cache. Returns `None` if the platform resolver fails.
    pub async fn resolve(&self, host: &str) -> Option<IpAddr> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Some(ip);
        }

        if let Some(entry) = self.cache.get(host) {
            if entry.resolved_at.elapsed() < CACHE_TTL {
                return Some(entry.addr);
            }
        }

        let response = self.resolver.lookup_ip(host).await.ok()?;
        let addr = response.iter().next()?;
        self.cache.insert(
            host.to_string(),
            CacheEntry { addr, resolved_at: Instant::now() },
        );
        Some(addr)
    }
}

impl Default for DnsCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn literal_ip_resolves_without_lookup() {
        let cache = DnsCache::new();
        let resolved = cache.resolve("127.0.0.1").await;
        assert_eq!(resolved, Some("127.0.0.1".parse::<IpAddr>().unwrap()));
    }
}
