//! Server discovery: resolves a bare server name to a reachable HTTPS base URL.
//!
//! Resolution order (Matrix server-name resolution, without SRV):
//!
//! 1. **IP literal / explicit port**: `server:8448` → use as-is
//! 2. **`.well-known/matrix/server`**: GET `https://<name>/.well-known/matrix/server`
//!    If found, follow the delegated server name.
//! 3. **Direct HTTPS fallback**: `https://<name>:8448`
//!
//! Results are cached in memory with a 24-hour TTL.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::sync::RwLock;
use tracing::debug;

use crate::{error::FederationError, types::WellKnownServer};

/// Default federation port.
const DEFAULT_FED_PORT: u16 = 8448;

/// How long to cache a resolved base URL before re-resolving.
const CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// How a base URL was arrived at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    /// The name already carried a port.
    Explicit,
    /// `.well-known` named a delegate.
    Delegated,
    /// Default port on the name itself.
    Fallback,
}

#[derive(Debug)]
struct CacheEntry {
    base_url: String,
    resolved_at: Instant,
}

/// Base URLs by server name, shared by every outbound request.
#[derive(Debug, Clone)]
pub struct DiscoveryCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
    http: reqwest::Client,
}

impl DiscoveryCache {
    pub fn new(timeout: Duration) -> Result<Self, FederationError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("Haven-Federation/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { entries: Arc::default(), http })
    }

    /// HTTPS base URL for `server_name`.
    pub async fn resolve(&self, server_name: &str) -> Result<String, FederationError> {
        if let Some(entry) = self.entries.read().await.get(server_name) {
            if entry.resolved_at.elapsed() < CACHE_TTL {
                return Ok(entry.base_url.clone());
            }
        }

        if server_name.is_empty() {
            return Err(FederationError::DiscoveryFailed(String::new(), "empty server name".into()));
        }
        let (route, base_url) = self.route(server_name).await;
        debug!(server = server_name, ?route, base_url = %base_url, "Resolved federation endpoint");

        self.entries.write().await.insert(
            server_name.to_owned(),
            CacheEntry { base_url: base_url.clone(), resolved_at: Instant::now() },
        );
        Ok(base_url)
    }

    /// Forget `server_name`, e.g. after its endpoint refused a connection.
    pub async fn invalidate(&self, server_name: &str) {
        self.entries.write().await.remove(server_name);
    }

    async fn route(&self, server_name: &str) -> (Route, String) {
        if has_explicit_port(server_name) {
            return (Route::Explicit, format!("https://{}", server_name));
        }
        match self.well_known_delegate(server_name).await {
            Some(delegate) => (Route::Delegated, base_url_for(&delegate)),
            None => (Route::Fallback, base_url_for(server_name)),
        }
    }

    async fn well_known_delegate(&self, server_name: &str) -> Option<String> {
        let url = format!("https://{}/.well-known/matrix/server", server_name);
        let resp = self.http.get(&url).send().await.ok()?.error_for_status().ok()?;
        let wk: WellKnownServer = resp.json().await.ok()?;
        Some(wk.server).filter(|s| !s.is_empty())
    }
}

fn base_url_for(host: &str) -> String {
    if has_explicit_port(host) {
        format!("https://{}", host)
    } else {
        format!("https://{}:{}", host, DEFAULT_FED_PORT)
    }
}

/// `host:port` or `[v6]:port`. A bare IPv6 literal has several colons and no port.
fn has_explicit_port(server_name: &str) -> bool {
    if server_name.starts_with('[') {
        return server_name.contains("]:");
    }
    server_name.matches(':').count() == 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_port_detection() {
        assert!(has_explicit_port("haven.example.com:8448"));
        assert!(!has_explicit_port("haven.example.com"));
        assert!(has_explicit_port("[::1]:8448"));
        assert!(!has_explicit_port("::1"));
    }

    #[test]
    fn default_port_added_when_absent() {
        assert_eq!(base_url_for("fed.example.org"), "https://fed.example.org:8448");
        assert_eq!(base_url_for("fed.example.org:443"), "https://fed.example.org:443");
    }

    #[tokio::test]
    async fn explicit_port_resolves_without_network() {
        let cache = DiscoveryCache::new(Duration::from_secs(1)).unwrap();
        assert_eq!(cache.resolve("localhost:8448").await.unwrap(), "https://localhost:8448");
        cache.invalidate("localhost:8448").await;
        assert!(cache.resolve("").await.is_err());
    }
}
