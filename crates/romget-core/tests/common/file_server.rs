//! Minimal HTTP/1.1 server for integration tests.
//!
//! Serves one static body for every GET path. Can throttle the body into
//! delayed chunks, answer with a fixed error status, or omit Content-Length.
//! Counts requests and tracks how many connections were streaming at once.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct FileServerOptions {
    /// Status line code; anything but 200 is sent with an empty body.
    pub status: u16,
    /// If false, the response has no Content-Length and ends on close.
    pub content_length: bool,
    /// Bytes written per chunk.
    pub chunk_size: usize,
    /// Pause after each chunk.
    pub chunk_delay: Duration,
}

impl Default for FileServerOptions {
    fn default() -> Self {
        Self {
            status: 200,
            content_length: true,
            chunk_size: 16 * 1024,
            chunk_delay: Duration::ZERO,
        }
    }
}

impl FileServerOptions {
    /// Streams `body` slowly enough that a transfer stays in flight for a while.
    pub fn slow() -> Self {
        Self {
            chunk_size: 256,
            chunk_delay: Duration::from_millis(50),
            ..Self::default()
        }
    }

    pub fn failing(status: u16) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }
}

#[derive(Debug, Default)]
pub struct ServerStats {
    requests: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ServerStats {
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn enter(&self) -> InFlight<'_> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        InFlight(self)
    }
}

/// Counts one connection as in flight until dropped. Dropped before the final
/// chunk goes out, so a client can only finish after the count went down.
struct InFlight<'a>(&'a ServerStats);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct FileServer {
    base_url: String,
    stats: Arc<ServerStats>,
}

impl FileServer {
    /// Base URL with trailing slash, e.g. "http://127.0.0.1:12345/".
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path.trim_start_matches('/'))
    }

    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }
}

/// Starts a server in a background thread serving `body`. Runs until the process exits.
pub fn start(body: Vec<u8>) -> FileServer {
    start_with_options(body, FileServerOptions::default())
}

pub fn start_with_options(body: Vec<u8>, opts: FileServerOptions) -> FileServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let body = Arc::new(body);
    let stats = Arc::new(ServerStats::default());
    let server_stats = Arc::clone(&stats);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let body = Arc::clone(&body);
            let stats = Arc::clone(&server_stats);
            thread::spawn(move || handle(stream, &body, opts, &stats));
        }
    });
    FileServer {
        base_url: format!("http://127.0.0.1:{}/", port),
        stats,
    }
}

fn handle(mut stream: TcpStream, body: &[u8], opts: FileServerOptions, stats: &ServerStats) {
    let mut in_flight = Some(stats.enter());
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    let method = std::str::from_utf8(&buf[..n])
        .ok()
        .and_then(|r| r.split_whitespace().next())
        .unwrap_or("");
    if !method.eq_ignore_ascii_case("GET") {
        let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\n\r\n");
        return;
    }

    if opts.status != 200 {
        let response = format!(
            "HTTP/1.1 {} {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            opts.status,
            reason(opts.status)
        );
        let _ = stream.write_all(response.as_bytes());
        return;
    }

    let length = if opts.content_length {
        format!("Content-Length: {}\r\n", body.len())
    } else {
        String::new()
    };
    let head = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\n{}Connection: close\r\n\r\n",
        length
    );
    if stream.write_all(head.as_bytes()).is_err() {
        return;
    }
    let chunks: Vec<&[u8]> = body.chunks(opts.chunk_size.max(1)).collect();
    let last = chunks.len().saturating_sub(1);
    for (i, chunk) in chunks.into_iter().enumerate() {
        if i == last {
            in_flight.take();
        }
        if stream.write_all(chunk).is_err() || stream.flush().is_err() {
            return;
        }
        if i != last && !opts.chunk_delay.is_zero() {
            thread::sleep(opts.chunk_delay);
        }
    }
}

fn reason(status: u16) -> &'static str {
    match status {
        404 => "Not Found",
        403 => "Forbidden",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Error",
    }
}
