//! Dual-mode byte stream over a connected descriptor.
//!
//! A [`Stream`] owns one already-connected descriptor (TCP socket, Unix
//! socket, or anything else that speaks `read`/`write`/`recv`/`send`) and
//! offers four facets over it:
//!
//! | Facet | Operations | Module |
//! |-------|------------|--------|
//! | Transfer | [`read`](Stream::read), [`write`](Stream::write), `read_all`, `write_all` | `transfer.rs` |
//! | Readiness | [`on_read`](Stream::on_read), [`on_write`](Stream::on_write) | `readiness.rs` |
//! | Formatted output | [`print`](Stream::print), [`stream_print!`](crate::stream_print), `flush` | `text.rs` |
//! | Lifecycle | [`from_fd`](Stream::from_fd), [`destroy`](Stream::destroy) | this module |
//!
//! Blocking and callback-driven use may be interleaved freely on the same
//! stream. Callbacks are invoked by the injected [`Watcher`].
//!
//! # Ownership
//!
//! ```text
//!   Stream ──Arc──► Shared ◄──Weak── dispatch entry (held by the watcher)
//!                     │
//!                     ├─ fd: RawFd          (used by transfer calls, no lock)
//!                     ├─ handle: Raw(OwnedFd) | Buffered(BufWriter<File>)
//!                     └─ slots: read/write callbacks + registered interest
//! ```
//!
//! The descriptor is closed when `Shared` drops: through the buffered handle
//! if formatted output was ever used, otherwise through the `OwnedFd`. Exactly
//! one of the two exists at any time, so the descriptor is closed once.
//!
//! # Example
//!
//! ```ignore
//! use fdstream::{Stream, watcher::PollWatcher};
//! use std::sync::Arc;
//!
//! let watcher = Arc::new(PollWatcher::new()?);
//! let stream = Stream::from_tcp(tcp, watcher.clone());
//! stream.write_all(b"hello\n", true)?;
//! stream.on_read(Some(|s: &Stream| {
//!     let mut buf = [0u8; 512];
//!     matches!(s.read(&mut buf, false), Ok(n) if n > 0)
//! }))?;
//! watcher.poll_once(None)?;
//! stream.destroy();
//! ```

mod readiness;
mod text;
mod transfer;

pub use readiness::Callback;
use readiness::Slots;

use crate::tracing_compat::{debug, trace};
use crate::watcher::{Interest, Watcher};
use parking_lot::Mutex;
use std::fmt;
use std::net::TcpStream;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::net::UnixStream;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use text::Handle;

/// A byte stream over one exclusively owned, connected descriptor.
///
/// `Stream` is `Send + Sync`; transfer calls take no lock, so a blocking read
/// on one thread never stalls callback registration or dispatch on another.
pub struct Stream {
    shared: Arc<Shared>,
}

struct Shared {
    /// Descriptor number, fixed for the stream's life.
    fd: RawFd,
    watcher: Arc<dyn Watcher>,
    /// Owns the descriptor. Only empty transiently, inside the handle lock.
    /// Held across buffered writes, so `print` and `flush` serialize on it.
    handle: Mutex<Option<Handle>>,
    /// Set once the buffered handle exists; readable without the handle lock.
    text_open: AtomicBool,
    slots: Mutex<Slots>,
}

impl Stream {
    /// Wraps an already-connected descriptor, taking ownership of it.
    ///
    /// The descriptor's state is not validated.
    #[must_use]
    pub fn from_fd(fd: OwnedFd, watcher: Arc<dyn Watcher>) -> Self {
        let raw = fd.as_raw_fd();
        trace!(fd = raw, "stream created");
        Self {
            shared: Arc::new(Shared {
                fd: raw,
                watcher,
                handle: Mutex::new(Some(Handle::Raw(fd))),
                text_open: AtomicBool::new(false),
                slots: Mutex::new(Slots::default()),
            }),
        }
    }

    /// Wraps a connected TCP stream.
    #[must_use]
    pub fn from_tcp(stream: TcpStream, watcher: Arc<dyn Watcher>) -> Self {
        Self::from_fd(OwnedFd::from(stream), watcher)
    }

    /// Wraps a connected Unix-domain stream.
    #[must_use]
    pub fn from_unix(stream: UnixStream, watcher: Arc<dyn Watcher>) -> Self {
        Self::from_fd(OwnedFd::from(stream), watcher)
    }

    /// The notification service this stream registers with.
    #[must_use]
    pub fn watcher(&self) -> &Arc<dyn Watcher> {
        &self.shared.watcher
    }

    /// Interest currently registered with the watcher on this stream's behalf.
    #[must_use]
    pub fn interest(&self) -> Interest {
        self.shared.slots.lock().registered
    }

    /// Deregisters from the watcher and releases the descriptor.
    ///
    /// Active callbacks are dropped. If a dispatch is running on another
    /// thread it completes first; the descriptor is closed when it returns.
    pub fn destroy(self) {
        let retired = {
            let mut slots = self.shared.slots.lock();
            if let Err(_err) = self.shared.deregister(&mut slots) {
                debug!(fd = self.shared.fd, err = %_err, "deregister on destroy failed");
            }
            slots.take_callbacks()
        };
        drop(retired);
        trace!(fd = self.shared.fd, "stream destroyed");
    }
}

impl Shared {
    /// Removes the watcher registration, if any.
    fn deregister(&self, slots: &mut Slots) -> crate::Result<()> {
        if slots.registered.is_empty() {
            return Ok(());
        }
        slots.registered = Interest::NONE;
        trace!(fd = self.fd, "deregistered");
        self.watcher
            .deregister(self.fd)
            .map_err(crate::Error::watcher)
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        if !self.slots.get_mut().registered.is_empty() {
            let _ = self.watcher.deregister(self.fd);
        }
        // The handle field drops next: BufWriter flushes and closes the
        // file, or OwnedFd closes the raw descriptor.
    }
}

impl AsRawFd for Stream {
    fn as_raw_fd(&self) -> RawFd {
        self.shared.fd
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("fd", &self.shared.fd)
            .field("interest", &self.interest())
            .field("text_handle", &self.has_text_handle())
            .finish_non_exhaustive()
    }
}
