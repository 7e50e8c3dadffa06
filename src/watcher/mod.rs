//! Readiness notification service interface.
//!
//! A [`Watcher`] multiplexes readiness of many descriptors and calls back into
//! their owners when a descriptor becomes readable, writable or reports an
//! exceptional condition. Streams hold an `Arc<dyn Watcher>` handed to them
//! at construction instead of reaching for a process-wide instance.
//!
//! # Key Types
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`Watcher`] | Register/deregister contract used by streams |
//! | [`Interest`] | Bit set of readable/writable/exceptional |
//! | [`WatchEvent`] | Single ready event kind passed to dispatch |
//! | [`Dispatch`] | Entry point invoked per ready event kind |
//! | [`PollWatcher`] | epoll/kqueue-backed implementation |
//! | [`LabWatcher`] | Deterministic in-memory implementation for tests |
//!
//! # Dispatch Contract
//!
//! For each ready event kind the watcher calls `dispatch(fd, event)`. A return
//! value of `true` keeps interest in that kind; `false` drops it, and once
//! every kind has been dropped the descriptor is no longer watched. Watchers
//! never hold internal locks while dispatching, so a dispatch may register or
//! deregister descriptors (including its own) without deadlocking.

pub mod interest;
pub mod lab;
pub mod poll;

pub use interest::Interest;
pub use lab::{LabWatcher, WatcherOp};
pub use poll::PollWatcher;

use std::io;
use std::os::fd::RawFd;
use std::sync::Arc;

/// A single readiness event kind delivered to a [`Dispatch`] entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchEvent {
    /// The descriptor is readable (data, or an orderly close, is pending).
    Read,
    /// The descriptor can accept more data.
    Write,
    /// The descriptor reported an exceptional condition.
    Except,
}

impl WatchEvent {
    /// The interest flag corresponding to this event kind.
    #[must_use]
    pub const fn interest(self) -> Interest {
        match self {
            Self::Read => Interest::READABLE,
            Self::Write => Interest::WRITABLE,
            Self::Except => Interest::EXCEPTIONAL,
        }
    }
}

/// Dispatch entry point bound to one registration.
///
/// Returns `true` to keep interest in the delivered event kind.
pub type Dispatch = Arc<dyn Fn(RawFd, WatchEvent) -> bool + Send + Sync>;

/// Readiness notification service.
///
/// # Thread Safety
///
/// Implementations are `Send + Sync` and are shared as `Arc<dyn Watcher>`.
/// A dispatch that is already executing when [`deregister`](Self::deregister)
/// returns may still complete; no dispatch starts afterwards.
pub trait Watcher: Send + Sync {
    /// Watches `fd` for `interest`, replacing any existing registration for it.
    ///
    /// # Errors
    ///
    /// - `io::ErrorKind::InvalidInput` when `interest` holds no watchable flag
    /// - platform errors from the underlying multiplexer
    fn register(&self, fd: RawFd, interest: Interest, dispatch: Dispatch) -> io::Result<()>;

    /// Stops watching `fd`. Removing an unknown descriptor is not an error.
    fn deregister(&self, fd: RawFd) -> io::Result<()>;

    /// Returns the number of watched descriptors.
    fn registration_count(&self) -> usize;

    /// Returns `true` if no descriptor is watched.
    fn is_empty(&self) -> bool {
        self.registration_count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::init_test_logging;

    #[test]
    fn event_kinds_map_to_interest() {
        init_test_logging();
        crate::test_phase!("event_kinds_map_to_interest");
        for (event, interest) in [
            (WatchEvent::Read, Interest::READABLE),
            (WatchEvent::Write, Interest::WRITABLE),
            (WatchEvent::Except, Interest::EXCEPTIONAL),
        ] {
            crate::assert_with_log!(event.interest() == interest, "mapping", interest, event);
        }
        crate::test_complete!("event_kinds_map_to_interest");
    }

    #[test]
    fn watchers_are_object_safe() {
        init_test_logging();
        crate::test_phase!("watchers_are_object_safe");
        let watcher: Arc<dyn Watcher> = Arc::new(LabWatcher::new());
        assert!(watcher.is_empty());
        crate::test_complete!("watchers_are_object_safe");
    }
}
