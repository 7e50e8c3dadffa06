#![allow(dead_code)]
#![allow(unused_imports)]
//! Shared integration test utilities.
//!
//! Import with:
//! ```
//! #[macro_use]
//! mod common;
//! use common::*;
//! ```

use fdstream::{PollWatcher, Stream, Watcher};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Once};
use std::time::Duration;
use tracing_subscriber::fmt::format::FmtSpan;

static INIT_LOGGING: Once = Once::new();

/// Upper bound for any single end-to-end wait.
pub const E2E_TIMEOUT: Duration = Duration::from_secs(5);

/// Initialize test logging with trace-level output.
pub fn init_test_logging() {
    init_test_logging_with_level(tracing::Level::TRACE);
}

/// Initialize test logging with a custom level. The first call wins.
pub fn init_test_logging_with_level(level: tracing::Level) {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_test_writer()
            .with_file(true)
            .with_line_number(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_ansi(false)
            .try_init();
    });
}

/// A connected loopback TCP pair: (client, accepted server side).
pub fn tcp_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
    let addr = listener.local_addr().expect("local addr");
    let client = TcpStream::connect(addr).expect("connect");
    let (server, _) = listener.accept().expect("accept");
    (client, server)
}

/// A polling watcher plus a stream over the client half of a TCP pair.
pub fn polled_tcp_stream() -> (Arc<PollWatcher>, Stream, TcpStream) {
    let watcher = Arc::new(PollWatcher::new().expect("poller"));
    let (client, server) = tcp_pair();
    let stream = Stream::from_tcp(client, watcher.clone());
    (watcher, stream, server)
}

/// A polling watcher plus streams over both halves of a TCP pair.
///
/// Nagle is disabled on both halves so small writes go out at once.
pub fn polled_stream_pair() -> (Arc<PollWatcher>, Stream, Stream) {
    let watcher = Arc::new(PollWatcher::new().expect("poller"));
    let (client, server) = tcp_pair();
    client.set_nodelay(true).expect("nodelay");
    server.set_nodelay(true).expect("nodelay");
    let a = Stream::from_tcp(client, watcher.clone());
    let b = Stream::from_tcp(server, watcher.clone());
    (watcher, a, b)
}

/// Drives `watcher` until it has nothing left to watch.
pub fn drain(watcher: &PollWatcher) -> bool {
    watcher
        .run_until(E2E_TIMEOUT, || watcher.is_empty())
        .expect("poll")
}

/// Log a test phase transition with a visual separator.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        tracing::info!(phase = %$name, "========================================");
        tracing::info!(phase = %$name, "TEST PHASE: {}", $name);
        tracing::info!(phase = %$name, "========================================");
    };
}

/// Log a section within a test phase.
#[macro_export]
macro_rules! test_section {
    ($name:expr) => {
        tracing::debug!(section = %$name, "--- {} ---", $name);
    };
}

/// Log test completion.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        tracing::info!(test = %$name, "test completed successfully: {}", $name);
    };
}

/// Log before assertions for context.
#[macro_export]
macro_rules! assert_with_log {
    ($cond:expr, $msg:expr, $expected:expr, $actual:expr) => {
        tracing::debug!(
            expected = ?$expected,
            actual = ?$actual,
            "Asserting: {}",
            $msg
        );
        assert!($cond, "{}: expected {:?}, got {:?}", $msg, $expected, $actual);
    };
}
