//! fdstream: a dual-mode byte stream over a connected descriptor.
//!
//! # Overview
//!
//! A [`Stream`] wraps one already-connected descriptor and lets callers mix
//! two styles of I/O on it:
//!
//! - **Direct transfer**: blocking or non-blocking `read`/`write`, with
//!   interrupted calls retried and both would-block spellings folded into a
//!   single [`ErrorKind::WouldBlock`].
//! - **Readiness callbacks**: at most one read and one write callback, driven
//!   by an injected [`Watcher`]. A callback returns `true` to stay installed.
//!
//! On top of that, [`stream_print!`] writes formatted text through a buffered
//! handle created on first use, and [`Stream::destroy`] deregisters and closes
//! the descriptor exactly once.
//!
//! # Module Structure
//!
//! - [`stream`]: the stream and its transfer, readiness and text facets
//! - [`watcher`]: notification service contract plus the polling and lab
//!   implementations
//! - [`config`]: polling watcher configuration (programmatic and environment)
//! - [`error`]: error kinds and recoverability
//! - [`tracing_compat`]: logging macros, no-ops unless `tracing-integration`
//!   is enabled
//!
//! # Example
//!
//! ```ignore
//! use fdstream::{stream_print, PollWatcher, Stream};
//! use std::sync::Arc;
//!
//! let watcher = Arc::new(PollWatcher::new()?);
//! let stream = Stream::from_tcp(std::net::TcpStream::connect("127.0.0.1:7000")?, watcher.clone());
//!
//! stream_print!(stream, "HELLO {}\r\n", 1)?;
//! stream.flush()?;
//!
//! stream.on_read(Some(|s: &Stream| {
//!     let mut buf = [0u8; 1024];
//!     match s.read(&mut buf, false) {
//!         Ok(0) => false,
//!         Ok(_) => true,
//!         Err(e) => e.is_would_block(),
//!     }
//! }))?;
//!
//! while !watcher.is_empty() {
//!     watcher.poll_once(None)?;
//! }
//! stream.destroy();
//! ```

#![cfg(unix)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]

pub mod config;
pub mod error;
pub mod stream;
pub mod tracing_compat;
pub mod watcher;

#[cfg(test)]
mod test_utils;

pub use config::{ConfigError, WatcherConfig};
pub use error::{Error, ErrorKind, Recoverability, Result};
pub use stream::{Callback, Stream};
pub use watcher::{Dispatch, Interest, LabWatcher, PollWatcher, WatchEvent, Watcher};
