//! Open-loop HTTP load generation.
//!
//! This crate provides the core attack engine of a load-generation tool: a
//! constant-rate pacer hands monotonically increasing sequence numbers to a
//! dynamically growing pool of workers, each of which pulls a target from a
//! caller-supplied [`Targeter`], performs one HTTP request through a shared
//! client, and emits one [`Hit`] record. The rate is external and constant;
//! slow upstreams grow the worker pool instead of dropping ticks. Target
//! parsing, result aggregation and reporting live in the callers.
pub mod attack;
pub mod client;
pub mod error;
pub mod resolve;
pub mod target;

pub use attack::{Attacker, AttackerBuilder, Hit};
pub use client::{Protocol, ProxySelection, Redirects, TlsSetup};
pub use error::{ClientError, TargetError};
pub use resolve::{CachedResolver, IpFamily, shared_resolver};
pub use target::{StaticTargeter, Target, Targeter};
