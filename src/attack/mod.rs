//! The attack façade: configuration, lifetime, stop signal, and the pacer
//! and worker machinery behind `attack`.
mod pacer;
mod result;
mod worker;


use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use reqwest::Client;
use tokio::sync::{Mutex, broadcast, mpsc};
use tracing::warn;

use crate::client::{
    ClientConfig, Protocol, ProxySelection, Redirects, TlsSetup, build_client,
};
use crate::error::ClientError;
use crate::resolve::{CachedResolver, IpFamily};
use crate::target::Targeter;

pub use result::Hit;

/// Initial number of workers carrying an attack. More are spawned on demand
/// to sustain the rate against slow responses; the pool never shrinks
/// within one attack.
pub const DEFAULT_WORKERS: u64 = 10;

/// One-shot stop broadcast: fires at most once, and once fired stays fired
/// for every observer.
#[derive(Clone)]
pub(crate) struct StopSignal {
    fired: Arc<AtomicBool>,
    tx: broadcast::Sender<()>,
}

impl StopSignal {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            fired: Arc::new(AtomicBool::new(false)),
            tx,
        }
    }

    pub(crate) fn fire(&self) {
        if !self.fired.swap(true, Ordering::SeqCst) {
            drop(self.tx.send(()));
        }
    }

    pub(crate) fn is_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }
}

/// Configures and builds an [`Attacker`].
///
/// Settings override the defaults in any order; the protocol switch is
/// applied after every transport setting when the client is built.
#[derive(Clone, Debug)]
pub struct AttackerBuilder {
    workers: u64,
    config: ClientConfig,
}

impl Default for AttackerBuilder {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            config: ClientConfig::default(),
        }
    }
}

impl AttackerBuilder {
    /// Initial number of workers used to carry an attack.
    #[must_use]
    pub const fn workers(mut self, workers: u64) -> Self {
        self.workers = workers;
        self
    }

    /// Cap on open idle connections per target host.
    #[must_use]
    pub const fn connections(mut self, connections: usize) -> Self {
        self.config.connections = connections;
        self
    }

    /// Redirect policy applied to every hit.
    #[must_use]
    pub const fn redirects(mut self, redirects: Redirects) -> Self {
        self.config.redirects = redirects;
        self
    }

    /// Request and connect timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Local address requests are sent from.
    #[must_use]
    pub const fn local_addr(mut self, addr: IpAddr) -> Self {
        self.config.local_addr = Some(addr);
        self
    }

    /// Toggles TCP keep-alive and connection pooling.
    #[must_use]
    pub const fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.config.keep_alive = keep_alive;
        self
    }

    /// TLS material and verification policy.
    #[must_use]
    pub fn tls(mut self, tls: TlsSetup) -> Self {
        self.config.tls = tls;
        self
    }

    /// Proxy selection; defaults to the process environment.
    #[must_use]
    pub fn proxy(mut self, proxy: ProxySelection) -> Self {
        self.config.proxy = proxy;
        self
    }

    /// Wire protocol: HTTP/1.1, HTTP/2 over TLS, or H2C.
    #[must_use]
    pub const fn protocol(mut self, protocol: Protocol) -> Self {
        self.config.protocol = protocol;
        self
    }

    /// Restricts dials to one address family.
    #[must_use]
    pub const fn ip_family(mut self, family: IpFamily) -> Self {
        self.config.ip_family = family;
        self
    }

    /// Injects a DNS resolver; defaults to the process-wide cached one.
    #[must_use]
    pub fn resolver(mut self, resolver: Arc<CachedResolver>) -> Self {
        self.config.resolver = resolver;
        self
    }

    /// Builds the attacker and its shared HTTP client.
    ///
    /// # Errors
    ///
    /// Returns an error when the client cannot be constructed, e.g. for an
    /// invalid proxy URL.
    pub fn build(self) -> Result<Attacker, ClientError> {
        let client = build_client(&self.config)?;
        Ok(Attacker {
            client,
            stop: StopSignal::new(),
            workers: self.workers,
        })
    }
}

/// An attack executor wrapping a shared HTTP client.
///
/// One attacker carries one attack: [`stop`](Attacker::stop) is permanent,
/// so build a fresh attacker per attack.
#[derive(Clone)]
pub struct Attacker {
    client: Client,
    stop: StopSignal,
    workers: u64,
}

impl Attacker {
    #[must_use]
    pub fn builder() -> AttackerBuilder {
        AttackerBuilder::default()
    }

    /// Builds an attacker with default settings.
    ///
    /// # Errors
    ///
    /// Returns an error when the default client cannot be constructed.
    pub fn new() -> Result<Self, ClientError> {
        Self::builder().build()
    }

    /// Attacks targets drawn from `targeter` at `rate` hits per second for
    /// `duration` (zero means until [`stop`](Attacker::stop)), returning
    /// the result stream immediately. Results carry `name` and arrive in
    /// completion order; the stream closes once every dispatched hit has
    /// produced its result.
    ///
    /// Must be called within a Tokio runtime. The caller has to drain the
    /// stream: a stalled consumer stalls workers and grows the pool.
    pub fn attack(
        &self,
        targeter: Arc<dyn Targeter>,
        rate: u64,
        duration: Duration,
        name: &str,
    ) -> mpsc::Receiver<Hit> {
        let (results_tx, results_rx) = mpsc::channel(1);
        if rate == 0 {
            warn!("attack rate must be positive; closing the result stream");
            return results_rx;
        }

        let (ticks_tx, ticks_rx) = mpsc::channel(1);
        let ctx = worker::WorkerContext {
            client: self.client.clone(),
            targeter,
            attack: Arc::from(name),
            stop: self.stop.clone(),
            ticks: Arc::new(Mutex::new(ticks_rx)),
            results: results_tx,
        };

        let mut handles = Vec::new();
        for _ in 0..self.workers {
            handles.push(worker::spawn(ctx.clone()));
        }
        tokio::spawn(pacer::run(
            pacer::Pacer::new(rate, duration),
            ticks_tx,
            ctx,
            handles,
        ));

        results_rx
    }

    /// Stops the current attack. Idempotent; safe from any thread and from
    /// within a [`Targeter`]. In-flight requests run to their own timeout.
    pub fn stop(&self) {
        self.stop.fire();
    }
}
