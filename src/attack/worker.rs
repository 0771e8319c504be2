use std::sync::Arc;
use std::time::SystemTime;

use reqwest::{Body, Client, StatusCode};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::StopSignal;
use super::result::Hit;
use crate::target::{Target, Targeter};

/// Shared handles every worker runs with; cloned per spawned worker.
#[derive(Clone)]
pub(super) struct WorkerContext {
    pub(super) client: Client,
    pub(super) targeter: Arc<dyn Targeter>,
    pub(super) attack: Arc<str>,
    pub(super) stop: StopSignal,
    pub(super) ticks: Arc<Mutex<mpsc::Receiver<u64>>>,
    pub(super) results: mpsc::Sender<Hit>,
}

pub(super) fn spawn(ctx: WorkerContext) -> JoinHandle<()> {
    tokio::spawn(run(ctx))
}

/// Dequeues sequence numbers until the tick channel closes and drains,
/// emitting one result per number.
async fn run(ctx: WorkerContext) {
    loop {
        let seq = {
            let mut ticks = ctx.ticks.lock().await;
            ticks.recv().await
        };
        let Some(seq) = seq else {
            break;
        };
        let hit = hit(&ctx, seq).await;
        if ctx.results.send(hit).await.is_err() {
            // Nobody is draining results anymore.
            break;
        }
    }
}

/// Performs one request and records its outcome. Transport errors take
/// precedence over the status text; a Targeter failure stops the attack.
pub(super) async fn hit(ctx: &WorkerContext, seq: u64) -> Hit {
    let mut hit = Hit::new(&ctx.attack, seq);

    let mut target = Target::default();
    if let Err(err) = ctx.targeter.fill(&mut target) {
        ctx.stop.fire();
        hit.error = err.to_string();
        return hit;
    }

    let request = match target.request() {
        Ok(request) => request,
        Err(err) => {
            hit.error = err.to_string();
            return hit;
        }
    };
    let bytes_out = request
        .body()
        .and_then(Body::as_bytes)
        .map_or(0, |body| u64::try_from(body.len()).unwrap_or(u64::MAX));

    hit.timestamp = SystemTime::now();
    let sent = Instant::now();
    let response = match ctx.client.execute(request).await {
        Ok(response) => response,
        Err(err) => {
            hit.error = error_chain(&err);
            return hit;
        }
    };

    let status = response.status();
    let body = match response.bytes().await {
        Ok(body) => body,
        Err(err) => {
            hit.error = error_chain(&err);
            return hit;
        }
    };

    hit.latency = sent.elapsed();
    hit.bytes_in = u64::try_from(body.len()).unwrap_or(u64::MAX);
    hit.bytes_out = bytes_out;
    hit.body = body;

    hit.code = status.as_u16();
    if hit.code < 200 || hit.code >= 400 {
        hit.error = status_line(status);
    }

    hit
}

/// Formats a status the way servers write it, e.g. "503 Service Unavailable".
pub(super) fn status_line(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {}", status.as_u16(), reason),
        None => status.as_u16().to_string(),
    }
}

/// Joins an error with its sources so transport causes (connect failures,
/// the redirect cap) survive stringification. Causes already present in the
/// message are not repeated.
pub(super) fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}
