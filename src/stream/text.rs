//! Formatted output through a lazily created buffered handle.
//!
//! The first [`print`](Stream::print) converts the stream's raw descriptor
//! into a buffered file handle. From then on the handle, not the raw
//! descriptor, owns the descriptor, and closing the stream closes it through
//! the handle (flushing pending text first).
//!
//! ```text
//!   Raw(OwnedFd) ──first print──► Buffered(BufWriter<File>)
//!        │                                │
//!      drop: close(fd)             drop: flush + close(fd)
//! ```
//!
//! The handle requires a descriptor opened for both reading and writing.
//! If that check fails the stream stays in the raw state and the transfer
//! facet keeps working.

use super::Stream;
use crate::error::{Error, Result};
use crate::tracing_compat::trace;
use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd};
use std::sync::atomic::Ordering;

/// Who owns the descriptor.
pub(super) enum Handle {
    Raw(OwnedFd),
    Buffered(BufWriter<File>),
}

impl Handle {
    fn is_buffered(&self) -> bool {
        matches!(self, Self::Buffered(_))
    }
}

/// Fails unless the descriptor is open for both reading and writing.
#[allow(unsafe_code)]
fn check_read_write(fd: BorrowedFd<'_>) -> io::Result<()> {
    // SAFETY: F_GETFL only reads descriptor flags; `fd` is borrowed and open.
    let flags = unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    if flags & libc::O_ACCMODE == libc::O_RDWR {
        Ok(())
    } else {
        Err(io::Error::from_raw_os_error(libc::EINVAL))
    }
}

/// Wraps the descriptor in a buffered handle unless that was done already.
fn open_text(handle: Handle) -> (Handle, io::Result<()>) {
    match handle {
        Handle::Raw(fd) => match check_read_write(fd.as_fd()) {
            Ok(()) => {
                trace!(fd = fd.as_raw_fd(), "text handle opened");
                (Handle::Buffered(BufWriter::new(File::from(fd))), Ok(()))
            }
            Err(err) => (Handle::Raw(fd), Err(err)),
        },
        buffered @ Handle::Buffered(_) => (buffered, Ok(())),
    }
}

fn missing_handle() -> Error {
    Error::text_handle(io::Error::from_raw_os_error(libc::EBADF))
}

impl Stream {
    /// Writes formatted text through the buffered handle, creating it on
    /// first use. Returns the number of bytes produced.
    ///
    /// Output is buffered; call [`flush`](Self::flush) to push it out, or
    /// let [`destroy`](Self::destroy) do so. Usually invoked through
    /// [`stream_print!`](crate::stream_print).
    ///
    /// When the buffer spills, the descriptor is written in blocking mode
    /// while the handle lock is held, so concurrent `print` and `flush`
    /// calls wait for each other.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::TextHandle`](crate::ErrorKind::TextHandle) if the handle
    /// cannot be created or the text cannot be written.
    pub fn print(&self, args: fmt::Arguments<'_>) -> Result<usize> {
        let text = fmt::format(args);
        self.with_text(|writer| writer.write_all(text.as_bytes()))?;
        Ok(text.len())
    }

    /// Pushes buffered text to the descriptor. A no-op before the first
    /// [`print`](Self::print).
    ///
    /// # Errors
    ///
    /// [`ErrorKind::TextHandle`](crate::ErrorKind::TextHandle) if the flush
    /// fails.
    pub fn flush(&self) -> Result<()> {
        let mut slot = self.shared.handle.lock();
        match slot.as_mut() {
            Some(Handle::Buffered(writer)) => writer.flush().map_err(Error::text_handle),
            Some(Handle::Raw(_)) => Ok(()),
            None => Err(missing_handle()),
        }
    }

    /// Whether the buffered text handle has been created.
    ///
    /// Does not wait for a `print` or `flush` in progress on another thread.
    #[must_use]
    pub fn has_text_handle(&self) -> bool {
        self.shared.text_open.load(Ordering::Acquire)
    }

    fn with_text<F>(&self, op: F) -> Result<()>
    where
        F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
    {
        let mut slot = self.shared.handle.lock();
        let (handle, opened) = open_text(slot.take().ok_or_else(missing_handle)?);
        let handle = slot.insert(handle);
        opened.map_err(Error::text_handle)?;
        self.shared
            .text_open
            .store(handle.is_buffered(), Ordering::Release);
        match handle {
            Handle::Buffered(writer) => op(writer).map_err(Error::text_handle),
            Handle::Raw(_) => Err(missing_handle()),
        }
    }
}

/// Writes formatted text to a [`Stream`](crate::Stream).
///
/// Expands to [`Stream::print`](crate::Stream::print) with
/// [`format_args!`] and returns its result.
///
/// ```ignore
/// let n = fdstream::stream_print!(stream, "{} items\n", count)?;
/// ```
#[macro_export]
macro_rules! stream_print {
    ($stream:expr, $($arg:tt)*) => {
        $stream.print(::core::format_args!($($arg)*))
    };
}
