//! Deterministic lab watcher for testing.
//!
//! [`LabWatcher`] keeps registrations in memory and never touches the OS.
//! Test code drives it by firing readiness events by hand and inspects the
//! recorded history of register/deregister calls afterwards.
//!
//! # Example
//!
//! ```ignore
//! use fdstream::watcher::{LabWatcher, WatchEvent, Watcher};
//! use std::sync::Arc;
//!
//! let watcher = Arc::new(LabWatcher::new());
//! let stream = Stream::from_fd(fd, watcher.clone());
//! stream.on_read(Some(|_s: &Stream| true))?;
//!
//! // Deliver a readable edge; the stream's callback runs synchronously.
//! assert_eq!(watcher.fire(stream.as_raw_fd(), WatchEvent::Read), Some(true));
//! ```

use super::{Dispatch, Interest, WatchEvent, Watcher};
use crate::tracing_compat::trace;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::os::fd::RawFd;

/// A register/deregister call observed by the lab watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherOp {
    /// `register(fd, interest, ..)` was called.
    Register {
        /// Descriptor.
        fd: RawFd,
        /// Requested interest.
        interest: Interest,
    },
    /// `deregister(fd)` was called.
    Deregister {
        /// Descriptor.
        fd: RawFd,
        /// Whether a registration existed at the time of the call.
        was_registered: bool,
    },
}

struct Entry {
    interest: Interest,
    dispatch: Dispatch,
    /// Distinguishes a registration from one that replaced it mid-dispatch.
    generation: u64,
}

#[derive(Default)]
struct LabInner {
    entries: HashMap<RawFd, Entry>,
    history: Vec<WatcherOp>,
    replaced: HashMap<RawFd, usize>,
    next_generation: u64,
    dispatched: u64,
}

/// An in-memory watcher driven by [`fire`](LabWatcher::fire).
#[derive(Default)]
pub struct LabWatcher {
    inner: Mutex<LabInner>,
}

impl LabWatcher {
    /// Creates an empty lab watcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers one readiness event for `fd`.
    ///
    /// Read and write events are delivered only if the descriptor is watched
    /// for that kind; exceptional events are delivered to any registered
    /// descriptor. A `false` result removes the event kind from the
    /// registration (and the registration itself once nothing is left),
    /// unless the registration was replaced while dispatching.
    ///
    /// Returns the dispatch result, or `None` if nothing was dispatched.
    pub fn fire(&self, fd: RawFd, event: WatchEvent) -> Option<bool> {
        let (dispatch, generation) = {
            let mut inner = self.inner.lock();
            let entry = inner.entries.get(&fd)?;
            if event != WatchEvent::Except && !entry.interest.contains(event.interest()) {
                return None;
            }
            let found = (entry.dispatch.clone(), entry.generation);
            inner.dispatched += 1;
            found
        };

        let keep = dispatch(fd, event);
        trace!(fd, ?event, keep, "lab dispatch delivered");

        if !keep && event != WatchEvent::Except {
            let mut inner = self.inner.lock();
            let now_empty = match inner.entries.get_mut(&fd) {
                Some(entry) if entry.generation == generation => {
                    entry.interest = entry.interest.remove(event.interest());
                    entry.interest.is_empty()
                }
                _ => false,
            };
            if now_empty {
                inner.entries.remove(&fd);
            }
        }
        Some(keep)
    }

    /// Returns the current interest for `fd`, if registered.
    #[must_use]
    pub fn interest(&self, fd: RawFd) -> Option<Interest> {
        self.inner.lock().entries.get(&fd).map(|e| e.interest)
    }

    /// Returns true if `fd` is registered.
    #[must_use]
    pub fn is_registered(&self, fd: RawFd) -> bool {
        self.inner.lock().entries.contains_key(&fd)
    }

    /// Returns every register/deregister call seen so far, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<WatcherOp> {
        self.inner.lock().history.clone()
    }

    /// Forgets the recorded history.
    pub fn clear_history(&self) {
        self.inner.lock().history.clear();
    }

    /// Number of `register` calls for `fd` that found a live registration.
    #[must_use]
    pub fn replaced_registrations(&self, fd: RawFd) -> usize {
        self.inner.lock().replaced.get(&fd).copied().unwrap_or(0)
    }

    /// Total number of dispatch calls made.
    #[must_use]
    pub fn dispatch_count(&self) -> u64 {
        self.inner.lock().dispatched
    }
}

impl Watcher for LabWatcher {
    fn register(&self, fd: RawFd, interest: Interest, dispatch: Dispatch) -> io::Result<()> {
        if interest.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "registration needs at least one interest flag",
            ));
        }
        let mut inner = self.inner.lock();
        let generation = inner.next_generation;
        inner.next_generation += 1;
        let previous = inner.entries.insert(
            fd,
            Entry {
                interest,
                dispatch,
                generation,
            },
        );
        if previous.is_some() {
            *inner.replaced.entry(fd).or_insert(0) += 1;
        }
        inner.history.push(WatcherOp::Register { fd, interest });
        Ok(())
    }

    fn deregister(&self, fd: RawFd) -> io::Result<()> {
        let mut inner = self.inner.lock();
        let was_registered = inner.entries.remove(&fd).is_some();
        inner.history.push(WatcherOp::Deregister { fd, was_registered });
        Ok(())
    }

    fn registration_count(&self) -> usize {
        self.inner.lock().entries.len()
    }
}

impl std::fmt::Debug for LabWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("LabWatcher")
            .field("registration_count", &inner.entries.len())
            .field("history_len", &inner.history.len())
            .field("dispatched", &inner.dispatched)
            .finish_non_exhaustive()
    }
}
