use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock, RwLock};

use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use tokio::net::lookup_host;
use tracing::trace;

/// Process-wide resolver shared by every attacker that does not inject its
/// own instance.
pub fn shared_resolver() -> Arc<CachedResolver> {
    static SHARED: OnceLock<Arc<CachedResolver>> = OnceLock::new();
    SHARED
        .get_or_init(|| Arc::new(CachedResolver::default()))
        .clone()
}

/// Caching DNS resolver.
///
/// The first lookup for a host goes to the system resolver; the ordered
/// address list it returns is cached and served to every later dial of the
/// same host. Entries carry no TTL and are refreshed only via [`flush`].
/// The connector tries the cached addresses in order and reports the last
/// error when none accepts a connection.
///
/// [`flush`]: CachedResolver::flush
#[derive(Clone, Debug, Default)]
pub struct CachedResolver {
    cache: Arc<RwLock<HashMap<String, Vec<SocketAddr>>>>,
}

impl CachedResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves `host`, serving repeat lookups from the cache.
    ///
    /// # Errors
    ///
    /// Returns the system resolver's error, or `NotFound` when the host
    /// resolved to no addresses.
    pub async fn lookup(&self, host: &str) -> io::Result<Vec<SocketAddr>> {
        if let Some(addrs) = self.cached(host) {
            trace!(host, "resolved from cache");
            return Ok(addrs);
        }

        let addrs: Vec<SocketAddr> = lookup_host((host, 0u16)).await?.collect();
        if addrs.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no addresses resolved for {host}"),
            ));
        }
        if let Ok(mut cache) = self.cache.write() {
            cache.insert(host.to_owned(), addrs.clone());
        }
        Ok(addrs)
    }

    /// Drops every cached entry; the next lookup per host hits the system
    /// resolver again.
    pub fn flush(&self) {
        if let Ok(mut cache) = self.cache.write() {
            cache.clear();
        }
    }

    fn cached(&self, host: &str) -> Option<Vec<SocketAddr>> {
        self.cache
            .read()
            .ok()
            .and_then(|cache| cache.get(host).cloned())
    }
}

impl Resolve for CachedResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let resolver = self.clone();
        Box::pin(async move {
            let addrs = resolver.lookup(name.as_str()).await?;
            Ok(Box::new(addrs.into_iter()) as Addrs)
        })
    }
}

/// Address family restriction for dials, the "tcp"/"tcp4"/"tcp6" selector.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum IpFamily {
    #[default]
    Any,
    V4,
    V6,
}

impl IpFamily {
    const fn allows(self, addr: &SocketAddr) -> bool {
        match self {
            Self::Any => true,
            Self::V4 => addr.is_ipv4(),
            Self::V6 => addr.is_ipv6(),
        }
    }
}

/// Restricts a shared [`CachedResolver`] to one address family without
/// duplicating its cache.
#[derive(Clone, Debug)]
pub(crate) struct FamilyResolver {
    inner: Arc<CachedResolver>,
    family: IpFamily,
}

impl FamilyResolver {
    pub(crate) const fn new(inner: Arc<CachedResolver>, family: IpFamily) -> Self {
        Self { inner, family }
    }
}

impl Resolve for FamilyResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let resolver = self.clone();
        Box::pin(async move {
            let mut addrs = resolver.inner.lookup(name.as_str()).await?;
            addrs.retain(|addr| resolver.family.allows(addr));
            if addrs.is_empty() {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no addresses in the requested family for {}", name.as_str()),
                )
                .into());
            }
            Ok(Box::new(addrs.into_iter()) as Addrs)
        })
    }
}
