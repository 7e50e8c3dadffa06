//! `polling`-backed watcher (epoll on Linux, kqueue on the BSDs and macOS).
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         PollWatcher                          │
//! │  ┌─────────────┐   ┌─────────────────────────────────────┐   │
//! │  │   Poller    │   │          registration map           │   │
//! │  │  (oneshot)  │   │ HashMap<RawFd, {interest, dispatch}>│   │
//! │  └──────┬──────┘   └──────────────────┬──────────────────┘   │
//! │         │ wait()                      │ snapshot (lock)      │
//! │         ▼                             ▼                      │
//! │   ready (fd, kinds) ──────────► dispatch(fd, kind) (no lock) │
//! │                                       │                      │
//! │                         re-arm kept kinds / delete (lock)    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Descriptors are armed in oneshot mode: after delivering an event the
//! poller stops reporting the descriptor until it is re-armed. This gives
//! every dispatch exclusive access to its descriptor and lets the watcher
//! re-arm exactly the kinds whose dispatch asked to be kept.
//!
//! # Safety
//!
//! `Poller::add` cannot check that a raw descriptor stays open while it is
//! registered. Streams uphold this by deregistering before they close their
//! descriptor; other callers must do the same.

use super::{Dispatch, Interest, WatchEvent, Watcher};
use crate::config::{ConfigError, WatcherConfig};
use crate::tracing_compat::{debug, trace};
use parking_lot::Mutex;
use polling::{Event as PollEvent, Events, Poller};
use std::collections::HashMap;
use std::io;
use std::num::NonZeroUsize;
use std::os::fd::{BorrowedFd, RawFd};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

struct Entry {
    interest: Interest,
    dispatch: Dispatch,
    generation: u64,
}

/// Readiness watcher backed by the `polling` crate.
pub struct PollWatcher {
    poller: Poller,
    config: WatcherConfig,
    entries: Mutex<HashMap<RawFd, Entry>>,
    events: Mutex<Events>,
    next_generation: AtomicU64,
}

impl PollWatcher {
    /// Creates a watcher with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS poller cannot be created (e.g. out of
    /// file descriptors).
    pub fn new() -> io::Result<Self> {
        Self::with_config(WatcherConfig::default())
    }

    /// Creates a watcher with the given configuration.
    pub fn with_config(config: WatcherConfig) -> io::Result<Self> {
        let capacity = NonZeroUsize::new(config.events_capacity).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, ConfigError::ZeroCapacity)
        })?;
        let poller = Poller::new()?;
        Ok(Self {
            poller,
            config,
            entries: Mutex::new(HashMap::new()),
            events: Mutex::new(Events::with_capacity(capacity)),
            next_generation: AtomicU64::new(0),
        })
    }

    /// Creates a watcher configured from `FDSTREAM_*` environment variables.
    pub fn from_env() -> io::Result<Self> {
        let config = WatcherConfig::from_env()
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
        Self::with_config(config)
    }

    /// Returns the active configuration.
    #[must_use]
    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    fn poll_event(fd: RawFd, interest: Interest) -> PollEvent {
        let key = fd as usize;
        match (interest.is_readable(), interest.is_writable()) {
            (true, true) => PollEvent::all(key),
            (true, false) => PollEvent::readable(key),
            (false, true) => PollEvent::writable(key),
            (false, false) => PollEvent::none(key),
        }
    }

    #[allow(unsafe_code)]
    fn borrow(fd: RawFd) -> BorrowedFd<'static> {
        // SAFETY: only called for descriptors present in the registration
        // map, which their owners keep open until deregistered.
        unsafe { BorrowedFd::borrow_raw(fd) }
    }

    /// Waits for readiness and dispatches every ready event kind.
    ///
    /// `timeout` of `None` uses the configured default. Returns the number
    /// of dispatch calls made; a wait interrupted by a signal counts as zero.
    pub fn poll_once(&self, timeout: Option<Duration>) -> io::Result<usize> {
        let timeout = timeout.or(self.config.poll_timeout);
        let ready: Vec<(RawFd, bool, bool)> = {
            let mut events = self.events.lock();
            events.clear();
            match self.poller.wait(&mut events, timeout) {
                Ok(_) => {}
                Err(err) if err.kind() == io::ErrorKind::Interrupted => return Ok(0),
                Err(err) => return Err(err),
            }
            events
                .iter()
                .map(|ev| (ev.key as RawFd, ev.readable, ev.writable))
                .collect()
        };
        trace!(ready = ready.len(), "poll wait returned");

        let mut dispatched = 0;
        let mut first_err = None;
        for (fd, readable, writable) in ready {
            if readable && self.deliver(fd, WatchEvent::Read) {
                dispatched += 1;
            }
            if writable && self.deliver(fd, WatchEvent::Write) {
                dispatched += 1;
            }
            // Oneshot: a descriptor skipped here would never report again.
            if let Err(err) = self.rearm(fd) {
                debug!(fd, %err, "re-arm failed");
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(dispatched), Err)
    }

    /// Polls until `done` returns true or `timeout` elapses.
    ///
    /// Returns whether `done` was satisfied.
    pub fn run_until<F>(&self, timeout: Duration, mut done: F) -> io::Result<bool>
    where
        F: FnMut() -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            if done() {
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            let step = self
                .config
                .poll_timeout
                .map_or(deadline - now, |t| t.min(deadline - now));
            self.poll_once(Some(step))?;
        }
    }

    /// Interrupts a blocking wait from any thread.
    pub fn wake(&self) -> io::Result<()> {
        self.poller.notify()
    }

    /// Runs one dispatch if `fd` is still watched for the event kind.
    fn deliver(&self, fd: RawFd, event: WatchEvent) -> bool {
        let (dispatch, generation) = {
            let entries = self.entries.lock();
            match entries.get(&fd) {
                Some(entry) if entry.interest.contains(event.interest()) => {
                    (entry.dispatch.clone(), entry.generation)
                }
                _ => return false,
            }
        };

        let keep = dispatch(fd, event);
        trace!(fd, ?event, keep, "dispatch delivered");

        if !keep {
            let mut entries = self.entries.lock();
            if let Some(entry) = entries.get_mut(&fd) {
                if entry.generation == generation {
                    entry.interest = entry.interest.remove(event.interest());
                }
            }
        }
        true
    }

    /// Re-arms whatever interest remains for `fd` after dispatching.
    fn rearm(&self, fd: RawFd) -> io::Result<()> {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get(&fd) else {
            return Ok(());
        };
        let interest = entry.interest;
        let result = if interest.is_readable() || interest.is_writable() {
            self.poller
                .modify(Self::borrow(fd), Self::poll_event(fd, interest))
        } else {
            entries.remove(&fd);
            debug!(fd, "no interest left, descriptor removed");
            self.poller.delete(Self::borrow(fd))
        };
        match result {
            Err(err) if is_stale(&err) => {
                entries.remove(&fd);
                Ok(())
            }
            other => other,
        }
    }
}

/// The descriptor vanished from the poller behind our back.
fn is_stale(err: &io::Error) -> bool {
    matches!(err.raw_os_error(), Some(libc::ENOENT | libc::EBADF))
}

impl Watcher for PollWatcher {
    #[allow(unsafe_code)]
    fn register(&self, fd: RawFd, interest: Interest, dispatch: Dispatch) -> io::Result<()> {
        if !interest.is_readable() && !interest.is_writable() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "registration needs readable or writable interest",
            ));
        }
        let event = Self::poll_event(fd, interest);
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        let mut entries = self.entries.lock();
        if entries.contains_key(&fd) {
            self.poller.modify(Self::borrow(fd), event)?;
        } else {
            // SAFETY: the caller keeps `fd` open until it deregisters it.
            unsafe { self.poller.add(fd, event)? };
        }
        entries.insert(
            fd,
            Entry {
                interest,
                dispatch,
                generation,
            },
        );
        debug!(fd, ?interest, "descriptor armed");
        Ok(())
    }

    fn deregister(&self, fd: RawFd) -> io::Result<()> {
        let mut entries = self.entries.lock();
        if entries.remove(&fd).is_none() {
            return Ok(());
        }
        debug!(fd, "descriptor removed");
        match self.poller.delete(Self::borrow(fd)) {
            Err(err) if !is_stale(&err) => Err(err),
            _ => Ok(()),
        }
    }

    fn registration_count(&self) -> usize {
        self.entries.lock().len()
    }
}

impl std::fmt::Debug for PollWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollWatcher")
            .field("registration_count", &self.entries.lock().len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
