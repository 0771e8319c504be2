use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use reqwest::redirect;
use reqwest::{Certificate, Client, ClientBuilder, Identity, Proxy};
use tracing::error;

use crate::error::{ClientError, RedirectCapExceeded};
use crate::resolve::{CachedResolver, FamilyResolver, IpFamily};

/// Default cap on open idle connections per target host.
pub const DEFAULT_CONNECTIONS: usize = 10_000;
/// Default request and connect timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default number of redirects a hit follows before failing.
pub const DEFAULT_REDIRECTS: usize = 10;
/// TCP keep-alive probe interval while keep-alive is enabled.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Redirect handling for every hit of an attack.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Redirects {
    /// Return the first response verbatim, even on 3xx.
    NoFollow,
    /// Follow up to this many redirects; one more fails the hit.
    Limit(usize),
}

impl Default for Redirects {
    fn default() -> Self {
        Self::Limit(DEFAULT_REDIRECTS)
    }
}

/// Wire protocol spoken by the attack. Modes are mutually exclusive and fix
/// the transport for the attacker's lifetime.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Protocol {
    /// Plain HTTP/1.1 over the pooled transport.
    #[default]
    Http1,
    /// HTTP/2 negotiated over TLS via ALPN.
    Http2,
    /// HTTP/2 with prior knowledge over cleartext TCP.
    H2c,
}

/// Proxy selection for the shared client.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum ProxySelection {
    /// Honor the process proxy environment variables.
    #[default]
    Environment,
    /// Route every request through the given proxy URL.
    Url(String),
    /// Never proxy, even when the environment asks for one.
    Disabled,
}

/// TLS material and verification policy.
#[derive(Clone, Debug)]
pub struct TlsSetup {
    /// Accept any server certificate and hostname. Load targets are
    /// routinely fronted by self-signed certificates, so this is the
    /// default; flip it off to verify.
    pub insecure: bool,
    /// Extra root certificates to trust.
    pub root_certs: Vec<Certificate>,
    /// Client certificate and key presented during the handshake.
    pub identity: Option<Identity>,
}

impl Default for TlsSetup {
    fn default() -> Self {
        Self {
            insecure: true,
            root_certs: Vec::new(),
            identity: None,
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct ClientConfig {
    pub(crate) timeout: Duration,
    pub(crate) connections: usize,
    pub(crate) redirects: Redirects,
    pub(crate) keep_alive: bool,
    pub(crate) local_addr: Option<IpAddr>,
    pub(crate) proxy: ProxySelection,
    pub(crate) tls: TlsSetup,
    pub(crate) protocol: Protocol,
    pub(crate) ip_family: IpFamily,
    pub(crate) resolver: Arc<CachedResolver>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            connections: DEFAULT_CONNECTIONS,
            redirects: Redirects::default(),
            keep_alive: true,
            local_addr: None,
            proxy: ProxySelection::default(),
            tls: TlsSetup::default(),
            protocol: Protocol::default(),
            ip_family: IpFamily::default(),
            resolver: crate::resolve::shared_resolver(),
        }
    }
}

/// Builds the shared client. Transport settings land first; the protocol
/// switch is applied last because it fixes the negotiation mode.
pub(crate) fn build_client(config: &ClientConfig) -> Result<Client, ClientError> {
    let mut builder = Client::builder()
        .timeout(config.timeout)
        .connect_timeout(config.timeout)
        .pool_max_idle_per_host(config.connections)
        .redirect(redirect_policy(config.redirects));

    builder = match config.ip_family {
        IpFamily::Any => builder.dns_resolver(config.resolver.clone()),
        family => builder.dns_resolver(Arc::new(FamilyResolver::new(
            config.resolver.clone(),
            family,
        ))),
    };

    if config.keep_alive {
        builder = builder.tcp_keepalive(KEEPALIVE_INTERVAL);
    } else {
        builder = builder
            .tcp_keepalive(None)
            .pool_max_idle_per_host(0)
            .pool_idle_timeout(Some(Duration::ZERO));
    }

    if let Some(addr) = config.local_addr {
        builder = builder.local_address(addr);
    }

    builder = match &config.proxy {
        ProxySelection::Environment => builder,
        ProxySelection::Url(url) => {
            let proxy = Proxy::all(url).map_err(|err| {
                error!("Invalid proxy URL '{}': {}", url, err);
                ClientError::InvalidProxyUrl {
                    url: url.clone(),
                    source: err,
                }
            })?;
            builder.proxy(proxy)
        }
        ProxySelection::Disabled => builder.no_proxy(),
    };

    builder = apply_tls(builder, &config.tls);

    builder = match config.protocol {
        Protocol::Http1 => builder.http1_only(),
        Protocol::Http2 => builder,
        Protocol::H2c => builder.http2_prior_knowledge(),
    };

    builder.build().map_err(|err| {
        error!("Failed to build HTTP client: {}", err);
        ClientError::Build { source: err }
    })
}

fn apply_tls(mut builder: ClientBuilder, tls: &TlsSetup) -> ClientBuilder {
    if tls.insecure {
        builder = builder
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true);
    }
    for cert in &tls.root_certs {
        builder = builder.add_root_certificate(cert.clone());
    }
    if let Some(identity) = tls.identity.clone() {
        builder = builder.identity(identity);
    }
    builder
}

fn redirect_policy(redirects: Redirects) -> redirect::Policy {
    match redirects {
        Redirects::NoFollow => redirect::Policy::none(),
        Redirects::Limit(cap) => redirect::Policy::custom(move |attempt| {
            if attempt.previous().len() > cap {
                attempt.error(RedirectCapExceeded { cap })
            } else {
                attempt.follow()
            }
        }),
    }
}
