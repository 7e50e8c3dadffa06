//! Callback-driven readiness facet.
//!
//! Each stream has one read slot and one write slot. Installing or clearing
//! either slot always follows the same sequence:
//!
//! ```text
//!   deregister (only if something is registered)
//!        │
//!   update the slot
//!        │
//!   mask = interest_mask(slots)
//!        │
//!   register(fd, mask) (only if mask is non-empty)
//! ```
//!
//! so the watcher holds at most one registration per stream and its interest
//! always equals the union of the active slots.
//!
//! A callback is taken out of its slot while it runs and its slot is marked
//! busy. A busy slot still counts toward the interest mask, which lets a
//! callback install or clear the *other* direction without losing its own
//! registration. Installing or clearing its *own* direction from inside the
//! callback overrides whatever the callback returns.

use super::{Shared, Stream};
use crate::tracing_compat::{debug, trace};
use crate::watcher::{Dispatch, Interest, WatchEvent};
use std::os::fd::RawFd;
use std::sync::{Arc, Weak};

/// A readiness callback. Returns `true` to stay installed.
pub type Callback = Box<dyn FnMut(&Stream) -> bool + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Read,
    Write,
}

impl Direction {
    fn from_event(event: WatchEvent) -> Option<Self> {
        match event {
            WatchEvent::Read => Some(Self::Read),
            WatchEvent::Write => Some(Self::Write),
            WatchEvent::Except => None,
        }
    }
}

#[derive(Default)]
struct Slot {
    callback: Option<Callback>,
    /// The callback is out of the slot, running.
    busy: bool,
    /// Bumped on every install/clear.
    generation: u64,
}

impl Slot {
    fn is_active(&self) -> bool {
        self.callback.is_some() || self.busy
    }

    fn replace(&mut self, callback: Option<Callback>) -> Option<Callback> {
        self.generation = self.generation.wrapping_add(1);
        std::mem::replace(&mut self.callback, callback)
    }
}

/// Per-stream callback slots plus the interest currently registered.
#[derive(Default)]
pub(crate) struct Slots {
    read: Slot,
    write: Slot,
    pub(crate) registered: Interest,
}

impl Slots {
    fn slot_mut(&mut self, direction: Direction) -> &mut Slot {
        match direction {
            Direction::Read => &mut self.read,
            Direction::Write => &mut self.write,
        }
    }

    /// Clears both slots, returning the callbacks so they drop unlocked.
    pub(crate) fn take_callbacks(&mut self) -> [Option<Callback>; 2] {
        [self.read.replace(None), self.write.replace(None)]
    }
}

/// Union of the event kinds whose slot is active.
pub(crate) fn interest_mask(slots: &Slots) -> Interest {
    let mut mask = Interest::NONE;
    if slots.read.is_active() {
        mask |= Interest::READABLE;
    }
    if slots.write.is_active() {
        mask |= Interest::WRITABLE;
    }
    mask
}

impl Shared {
    /// Registers the current mask, if non-empty.
    fn register(this: &Arc<Self>, slots: &mut Slots) -> crate::Result<()> {
        let mask = interest_mask(slots);
        if mask.is_empty() {
            return Ok(());
        }
        this.watcher
            .register(this.fd, mask, dispatcher(Arc::downgrade(this)))
            .map_err(crate::Error::watcher)?;
        slots.registered = mask;
        trace!(fd = this.fd, interest = ?mask, "registered");
        Ok(())
    }

    /// Replaces the registration with one matching the active slots.
    fn resync(this: &Arc<Self>, slots: &mut Slots) -> crate::Result<()> {
        let removed = this.deregister(slots);
        let added = Self::register(this, slots);
        removed.and(added)
    }
}

/// Builds the entry point the watcher invokes for this stream.
fn dispatcher(shared: Weak<Shared>) -> Dispatch {
    Arc::new(move |_fd: RawFd, event: WatchEvent| match shared.upgrade() {
        Some(shared) => Stream { shared }.dispatch(event),
        None => false,
    })
}

impl Stream {
    /// Installs (`Some`) or clears (`None`) the read-readiness callback.
    ///
    /// The callback runs on the watcher's dispatch thread each time the
    /// descriptor is readable, until it returns `false` or is replaced.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::Watcher`](crate::ErrorKind::Watcher) if the
    /// watcher rejects the change. The slot change is kept either way.
    pub fn on_read<F>(&self, callback: Option<F>) -> crate::Result<()>
    where
        F: FnMut(&Stream) -> bool + Send + 'static,
    {
        self.install(Direction::Read, callback.map(|f| Box::new(f) as Callback))
    }

    /// Installs (`Some`) or clears (`None`) the write-readiness callback.
    ///
    /// # Errors
    ///
    /// Same as [`on_read`](Self::on_read).
    pub fn on_write<F>(&self, callback: Option<F>) -> crate::Result<()>
    where
        F: FnMut(&Stream) -> bool + Send + 'static,
    {
        self.install(Direction::Write, callback.map(|f| Box::new(f) as Callback))
    }

    /// Clears the read callback. Shorthand for `on_read(None)`.
    ///
    /// # Errors
    ///
    /// Same as [`on_read`](Self::on_read).
    pub fn clear_read(&self) -> crate::Result<()> {
        self.install(Direction::Read, None)
    }

    /// Clears the write callback. Shorthand for `on_write(None)`.
    ///
    /// # Errors
    ///
    /// Same as [`on_read`](Self::on_read).
    pub fn clear_write(&self) -> crate::Result<()> {
        self.install(Direction::Write, None)
    }

    fn install(&self, direction: Direction, callback: Option<Callback>) -> crate::Result<()> {
        let (retired, result) = {
            let mut slots = self.shared.slots.lock();
            let removed = self.shared.deregister(&mut slots);
            let retired = slots.slot_mut(direction).replace(callback);
            let added = Shared::register(&self.shared, &mut slots);
            (retired, removed.and(added))
        };
        drop(retired);
        result
    }

    /// Handles one readiness event. Returns whether the slot stays installed.
    fn dispatch(&self, event: WatchEvent) -> bool {
        let Some(direction) = Direction::from_event(event) else {
            trace!(fd = self.shared.fd, "exceptional condition ignored");
            return false;
        };

        let (mut callback, generation) = {
            let mut slots = self.shared.slots.lock();
            let slot = slots.slot_mut(direction);
            if slot.busy {
                return true;
            }
            let Some(callback) = slot.callback.take() else {
                return false;
            };
            slot.busy = true;
            (callback, slot.generation)
        };

        let mut guard = DispatchGuard {
            stream: self,
            direction,
            completed: false,
        };
        let keep = callback(self);
        guard.completed = true;

        let mut retired = None;
        let kept = {
            let mut slots = self.shared.slots.lock();
            let slot = slots.slot_mut(direction);
            slot.busy = false;
            if slot.generation == generation && keep {
                slot.callback = Some(callback);
            } else {
                retired = Some(callback);
            }
            let kept = slot.callback.is_some();
            if !kept {
                if let Err(_err) = Shared::resync(&self.shared, &mut slots) {
                    debug!(
                        fd = self.shared.fd,
                        err = %_err,
                        "re-registration after dispatch failed"
                    );
                }
            }
            kept
        };
        drop(retired);
        trace!(fd = self.shared.fd, ?direction, kept, "dispatched");
        kept
    }
}

/// Releases a busy slot if its callback unwinds.
///
/// The panicking callback is dropped with the unwind, so the slot ends up
/// empty unless the callback installed a replacement before panicking.
struct DispatchGuard<'a> {
    stream: &'a Stream,
    direction: Direction,
    completed: bool,
}

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        let shared = &self.stream.shared;
        let mut slots = shared.slots.lock();
        slots.slot_mut(self.direction).busy = false;
        if let Err(_err) = Shared::resync(shared, &mut slots) {
            debug!(
                fd = shared.fd,
                err = %_err,
                "re-registration after callback panic failed"
            );
        }
        debug!(fd = shared.fd, direction = ?self.direction, "callback panicked, slot released");
    }
}
