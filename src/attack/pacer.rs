use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::debug;

use super::worker::{self, WorkerContext};

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Schedules hit `k` at `began + k * interval` on absolute time: a pacer
/// that falls behind fires ticks back-to-back until it catches up, so drift
/// does not accumulate and numbering stays gap-free.
pub(super) struct Pacer {
    interval_ns: u64,
    hits: u64,
}

impl Pacer {
    /// `rate` must be positive. Only a literally zero `duration` means
    /// unbounded; any positive duration schedules at least one hit, even
    /// when shorter than the pacing interval.
    pub(super) fn new(rate: u64, duration: Duration) -> Self {
        let hits = (rate as f64 * duration.as_secs_f64()).round() as u64;
        Self {
            interval_ns: NANOS_PER_SEC / rate.max(1),
            hits: if duration.is_zero() { 0 } else { hits.max(1) },
        }
    }

    pub(super) const fn total_hits(&self) -> u64 {
        self.hits
    }

    pub(super) fn deadline(&self, began: Instant, seq: u64) -> Instant {
        began + Duration::from_nanos(self.interval_ns.saturating_mul(seq))
    }
}

/// The attack loop: sleep to the next absolute deadline, then arbitrate
/// between stop, a worker accepting the tick, and pool growth.
pub(super) async fn run(
    pacer: Pacer,
    ticks: mpsc::Sender<u64>,
    ctx: WorkerContext,
    mut handles: Vec<JoinHandle<()>>,
) {
    let mut stop_rx = ctx.stop.subscribe();
    let began = Instant::now();
    let mut seq: u64 = 0;

    loop {
        tokio::select! {
            () = sleep_until(pacer.deadline(began, seq)) => {}
            _ = stop_rx.recv() => break,
        }

        if ctx.stop.is_fired() || ctx.results.is_closed() {
            break;
        }

        match ticks.try_send(seq) {
            Ok(()) => {
                seq += 1;
                if pacer.hits > 0 && seq == pacer.hits {
                    break;
                }
            }
            Err(TrySendError::Full(_)) => {
                // Every worker is mid-request: grow the pool, let the fresh
                // worker reach the queue, and retry the same tick after the
                // (already expired) pacing sleep.
                handles.push(worker::spawn(ctx.clone()));
                debug!(workers = handles.len(), seq, "all workers busy, spawned another");
                tokio::task::yield_now().await;
            }
            Err(TrySendError::Closed(_)) => break,
        }
    }

    // Closing the tick channel drains the workers; awaiting every handle
    // guarantees each dispatched sequence number has produced its result
    // before the last result sender drops and the stream closes.
    drop(ticks);
    for handle in handles {
        drop(handle.await);
    }
}
