//! Error types for stream operations.
//!
//! Every failure is returned, never logged in place of being returned and
//! never retried internally (the one exception is a system call interrupted
//! by a signal, which the transfer path restarts and never reports).
//!
//! # Error Kinds
//!
//! - **WouldBlock**: a non-blocking transfer could not make progress. Both OS
//!   spellings (`EAGAIN`, `EWOULDBLOCK`) collapse into this one kind.
//! - **Transport**: the descriptor reported a failure (reset, broken pipe,
//!   generic I/O error). The underlying `io::Error` and its OS code are kept.
//! - **TextHandle**: the buffered text handle could not be opened or written.
//!   The raw transfer path is unaffected.
//! - **Watcher**: the notification service refused a registration change.

use core::fmt;
use std::io;

/// The kind of stream error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The operation would have to suspend; retry when the descriptor is ready.
    WouldBlock,
    /// The transport reported a failure.
    Transport,
    /// The buffered text handle failed to open or to accept formatted output.
    TextHandle,
    /// The notification service rejected a registration change.
    Watcher,
}

impl ErrorKind {
    /// Returns the recoverability classification for this error kind.
    #[must_use]
    pub const fn recoverability(&self) -> Recoverability {
        match self {
            Self::WouldBlock => Recoverability::Transient,
            Self::TextHandle => Recoverability::Permanent,
            Self::Transport | Self::Watcher => Recoverability::Unknown,
        }
    }

    /// Returns true if this error kind is typically retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.recoverability(), Recoverability::Transient)
    }

    const fn describe(&self) -> &'static str {
        match self {
            Self::WouldBlock => "operation would block",
            Self::Transport => "transport failure",
            Self::TextHandle => "text handle unavailable",
            Self::Watcher => "watcher registration failed",
        }
    }
}

/// Classification of error recoverability for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Recoverability {
    /// Temporary condition that may clear on retry.
    Transient,
    /// Will not succeed on retry.
    Permanent,
    /// Depends on context; the caller decides (e.g. whether to close the stream).
    Unknown,
}

impl Recoverability {
    /// Returns true if this error is safe to retry.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        matches!(self, Self::Transient)
    }

    /// Returns true if this error should never be retried.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent)
    }
}

/// The error type for stream operations.
#[derive(Debug, thiserror::Error)]
pub struct Error {
    kind: ErrorKind,
    #[source]
    source: Option<io::Error>,
}

impl Error {
    /// Creates a new error with the given kind and no source.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self { kind, source: None }
    }

    /// The canonical would-block outcome.
    #[must_use]
    pub const fn would_block() -> Self {
        Self::new(ErrorKind::WouldBlock)
    }

    /// Wraps an I/O failure reported by the transport.
    #[must_use]
    pub fn transport(source: io::Error) -> Self {
        Self::new(ErrorKind::Transport).with_source(source)
    }

    /// Wraps a failure of the buffered text handle.
    #[must_use]
    pub fn text_handle(source: io::Error) -> Self {
        Self::new(ErrorKind::TextHandle).with_source(source)
    }

    /// Wraps a failure reported by the notification service.
    #[must_use]
    pub fn watcher(source: io::Error) -> Self {
        Self::new(ErrorKind::Watcher).with_source(source)
    }

    /// Attaches the underlying I/O error.
    #[must_use]
    pub fn with_source(mut self, source: io::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns true for the canonical would-block outcome.
    #[must_use]
    pub const fn is_would_block(&self) -> bool {
        matches!(self.kind, ErrorKind::WouldBlock)
    }

    /// Returns the recoverability classification.
    #[must_use]
    pub const fn recoverability(&self) -> Recoverability {
        self.kind.recoverability()
    }

    /// Returns the OS error code of the underlying failure, if any.
    #[must_use]
    pub fn raw_os_error(&self) -> Option<i32> {
        self.source.as_ref().and_then(io::Error::raw_os_error)
    }

    /// Returns the underlying I/O error kind, if any.
    #[must_use]
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        self.source.as_ref().map(io::Error::kind)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "{}: {source}", self.kind.describe()),
            None => f.write_str(self.kind.describe()),
        }
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err.kind {
            ErrorKind::WouldBlock => io::Error::from(io::ErrorKind::WouldBlock),
            _ => match err.source {
                Some(source) => source,
                None => io::Error::new(io::ErrorKind::Other, err.kind.describe()),
            },
        }
    }
}

/// A specialized Result type for stream operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::init_test_logging;

    fn init_test(name: &str) {
        init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn would_block_is_transient() {
        init_test("would_block_is_transient");
        let err = Error::would_block();
        crate::assert_with_log!(err.is_would_block(), "canonical", true, err.is_would_block());
        let retry = err.recoverability().should_retry();
        crate::assert_with_log!(retry, "retryable", true, retry);
        crate::assert_with_log!(
            err.raw_os_error().is_none(),
            "no os code",
            None::<i32>,
            err.raw_os_error()
        );
        crate::test_complete!("would_block_is_transient");
    }

    #[test]
    fn transport_error_keeps_os_code() {
        init_test("transport_error_keeps_os_code");
        let err = Error::transport(io::Error::from_raw_os_error(libc::ECONNRESET));
        crate::assert_with_log!(
            err.kind() == ErrorKind::Transport,
            "kind",
            ErrorKind::Transport,
            err.kind()
        );
        crate::assert_with_log!(
            err.raw_os_error() == Some(libc::ECONNRESET),
            "os code",
            Some(libc::ECONNRESET),
            err.raw_os_error()
        );
        let unknown = err.recoverability() == Recoverability::Unknown;
        crate::assert_with_log!(unknown, "caller decides", true, unknown);
        crate::test_complete!("transport_error_keeps_os_code");
    }

    #[test]
    fn text_handle_failure_is_permanent() {
        init_test("text_handle_failure_is_permanent");
        let err = Error::text_handle(io::Error::from_raw_os_error(libc::EINVAL));
        let permanent = err.recoverability().is_permanent();
        crate::assert_with_log!(permanent, "permanent", true, permanent);
        crate::test_complete!("text_handle_failure_is_permanent");
    }

    #[test]
    fn display_includes_source() {
        init_test("display_includes_source");
        let err = Error::transport(io::Error::new(io::ErrorKind::BrokenPipe, "pipe gone"));
        let text = err.to_string();
        let ok = text.starts_with("transport failure") && text.contains("pipe gone");
        crate::assert_with_log!(ok, "display", "transport failure: pipe gone", text);
        crate::assert_with_log!(
            Error::would_block().to_string() == "operation would block",
            "bare display",
            "operation would block",
            Error::would_block().to_string()
        );
        crate::test_complete!("display_includes_source");
    }

    #[test]
    fn converts_into_io_error() {
        init_test("converts_into_io_error");
        let io_err: io::Error = Error::would_block().into();
        crate::assert_with_log!(
            io_err.kind() == io::ErrorKind::WouldBlock,
            "would block maps",
            io::ErrorKind::WouldBlock,
            io_err.kind()
        );
        let io_err: io::Error =
            Error::transport(io::Error::from_raw_os_error(libc::EPIPE)).into();
        crate::assert_with_log!(
            io_err.raw_os_error() == Some(libc::EPIPE),
            "source preserved",
            Some(libc::EPIPE),
            io_err.raw_os_error()
        );
        crate::test_complete!("converts_into_io_error");
    }
}
