use std::io::{Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tracing_subscriber::{EnvFilter, FmtSubscriber};

pub const OK_RESPONSE: &[u8] =
    b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nOK";
pub const ERROR_RESPONSE: &[u8] =
    b"HTTP/1.1 500 Internal Server Error\r\nContent-Length: 9\r\nConnection: close\r\n\r\noverload!";
pub const REDIRECT_BODY: &[u8] = b"gone elsewhere";

pub fn init_logging() {
    let filter = std::env::var("VOLLEY_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .map_or_else(
            |_| EnvFilter::new("info"),
            |value| EnvFilter::try_new(value).unwrap_or_else(|_| EnvFilter::new("info")),
        );

    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();

    // Tests race to install the subscriber; losing the race is fine.
    drop(tracing::subscriber::set_global_default(subscriber));
}

pub struct ServerHandle {
    shutdown: mpsc::Sender<()>,
    thread: Option<thread::JoinHandle<()>>,
    hits: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl ServerHandle {
    /// Requests the server has answered so far.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// Highest number of requests that were in flight at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        let _send_result = self.shutdown.send(());
        if let Some(handle) = self.thread.take() {
            drop(handle.join());
        }
    }
}

/// Spawn a lightweight HTTP server that answers every request with
/// `response` after `delay`.
///
/// # Errors
///
/// Returns an error if the listener cannot be created or configured.
pub fn spawn_http_server(
    response: &'static [u8],
    delay: Duration,
) -> Result<(String, ServerHandle), String> {
    spawn_server(move |_| response.to_vec(), delay)
}

/// Spawn a server that 302-redirects every request back to itself.
///
/// # Errors
///
/// Returns an error if the listener cannot be created or configured.
pub fn spawn_redirect_server() -> Result<(String, ServerHandle), String> {
    spawn_server(
        |addr| {
            let mut response = format!(
                "HTTP/1.1 302 Found\r\nLocation: http://{}/next\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                addr,
                REDIRECT_BODY.len()
            )
            .into_bytes();
            response.extend_from_slice(REDIRECT_BODY);
            response
        },
        Duration::ZERO,
    )
}

fn spawn_server<F>(respond: F, delay: Duration) -> Result<(String, ServerHandle), String>
where
    F: Fn(std::net::SocketAddr) -> Vec<u8> + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0")
        .map_err(|err| format!("bind test server failed: {}", err))?;
    let addr = listener
        .local_addr()
        .map_err(|err| format!("server addr failed: {}", err))?;
    listener
        .set_nonblocking(true)
        .map_err(|err| format!("set_nonblocking failed: {}", err))?;

    let (shutdown_tx, shutdown_rx) = mpsc::channel();
    let hits = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let in_flight = Arc::new(AtomicUsize::new(0));

    let handle = {
        let hits = hits.clone();
        let peak = peak.clone();
        let respond = Arc::new(respond);
        thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                match listener.accept() {
                    Ok((stream, _)) => {
                        let hits = hits.clone();
                        let peak = peak.clone();
                        let in_flight = in_flight.clone();
                        let respond = respond.clone();
                        thread::spawn(move || {
                            let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                            peak.fetch_max(current, Ordering::SeqCst);
                            handle_client(stream, &respond(addr), delay, &hits);
                            in_flight.fetch_sub(1, Ordering::SeqCst);
                        });
                    }
                    Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                        thread::sleep(Duration::from_millis(10));
                    }
                    Err(_) => break,
                }
            }
        })
    };

    Ok((
        format!("http://{}", addr),
        ServerHandle {
            shutdown: shutdown_tx,
            thread: Some(handle),
            hits,
            peak,
        },
    ))
}

fn handle_client(mut stream: TcpStream, response: &[u8], delay: Duration, hits: &AtomicUsize) {
    let mut buffer = [0u8; 4096];
    if stream.read(&mut buffer).is_err() {
        return;
    }
    // Counted before the response goes out, so totals are settled by the
    // time the client observes the reply.
    hits.fetch_add(1, Ordering::SeqCst);
    if !delay.is_zero() {
        thread::sleep(delay);
    }
    if stream.write_all(response).is_err() {
        return;
    }
    if stream.flush().is_err() {
        return;
    }
    drop(stream.shutdown(Shutdown::Both));
}
