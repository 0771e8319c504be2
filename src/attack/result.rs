use std::time::{Duration, SystemTime};

use bytes::Bytes;

/// The outcome of one hit. Exactly one record is emitted per dispatched
/// sequence number, in completion order.
///
/// `error` is empty exactly when the transport succeeded, the body was read
/// to the end, and the status landed in `[200, 400)`.
#[derive(Clone, Debug, PartialEq)]
pub struct Hit {
    /// Name of the attack this hit belongs to.
    pub attack: String,
    /// Sequence number; contiguous from 0 within one attack.
    pub seq: u64,
    /// Wall-clock instant the request was sent.
    pub timestamp: SystemTime,
    /// Time from send to the last body byte. Stays zero when the request
    /// itself or the body read failed.
    pub latency: Duration,
    /// HTTP status code; 0 when no response was obtained.
    pub code: u16,
    /// Response body bytes read.
    pub bytes_in: u64,
    /// Declared request body length; 0 when the length was unknown.
    pub bytes_out: u64,
    /// Full response body.
    pub body: Bytes,
    /// Failure description; empty on success.
    pub error: String,
}

impl Hit {
    pub(super) fn new(attack: &str, seq: u64) -> Self {
        Self {
            attack: attack.to_owned(),
            seq,
            timestamp: SystemTime::now(),
            latency: Duration::ZERO,
            code: 0,
            bytes_in: 0,
            bytes_out: 0,
            body: Bytes::new(),
            error: String::new(),
        }
    }

    /// Whether the hit completed without a transport, body or status error.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_empty()
    }
}
