//! Raw byte transfer.
//!
//! Every call takes a `block` flag:
//!
//! | `block` | read | write |
//! |---------|------|-------|
//! | `true`  | `read(2)`, waits per the descriptor's own mode | `write(2)` |
//! | `false` | `recv(2)` with `MSG_DONTWAIT` | `send(2)` with `MSG_DONTWAIT` (+ `MSG_NOSIGNAL` where available) |
//!
//! Interrupted calls are retried transparently. `EAGAIN` and `EWOULDBLOCK`
//! both surface as [`ErrorKind::WouldBlock`](crate::ErrorKind::WouldBlock),
//! whichever spelling the platform uses. A zero-length read means the peer
//! closed its end.

use super::Stream;
use crate::error::{Error, Result};
use crate::tracing_compat::trace;
use std::io;
use std::os::fd::RawFd;

#[cfg(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly"
))]
const SEND_FLAGS: libc::c_int = libc::MSG_DONTWAIT | libc::MSG_NOSIGNAL;

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly"
)))]
const SEND_FLAGS: libc::c_int = libc::MSG_DONTWAIT;

/// Maps a raw I/O failure onto the stream error space.
pub(crate) fn classify(err: io::Error) -> Error {
    match err.raw_os_error() {
        Some(code) if code == libc::EAGAIN || code == libc::EWOULDBLOCK => Error::would_block(),
        _ if err.kind() == io::ErrorKind::WouldBlock => Error::would_block(),
        _ => Error::transport(err),
    }
}

/// Runs `op` until it completes without `EINTR`.
fn retry_interrupted<F>(mut op: F) -> Result<usize>
where
    F: FnMut() -> io::Result<usize>,
{
    loop {
        match op() {
            Ok(n) => return Ok(n),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {
                trace!("transfer interrupted, retrying");
            }
            Err(err) => return Err(classify(err)),
        }
    }
}

fn cvt(ret: isize) -> io::Result<usize> {
    usize::try_from(ret).map_err(|_| io::Error::last_os_error())
}

#[allow(unsafe_code)]
fn sys_read(fd: RawFd, buf: &mut [u8], block: bool) -> io::Result<usize> {
    let ptr = buf.as_mut_ptr().cast::<libc::c_void>();
    // SAFETY: `ptr` is valid for `buf.len()` writable bytes for the duration
    // of the call; `fd` is owned by the calling stream and still open.
    let ret = unsafe {
        if block {
            libc::read(fd, ptr, buf.len())
        } else {
            libc::recv(fd, ptr, buf.len(), libc::MSG_DONTWAIT)
        }
    };
    cvt(ret)
}

#[allow(unsafe_code)]
fn sys_write(fd: RawFd, buf: &[u8], block: bool) -> io::Result<usize> {
    let ptr = buf.as_ptr().cast::<libc::c_void>();
    // SAFETY: `ptr` is valid for `buf.len()` readable bytes for the duration
    // of the call; `fd` is owned by the calling stream and still open.
    let ret = unsafe {
        if block {
            // May raise SIGPIPE on a closed peer; see `Stream::write`.
            libc::write(fd, ptr, buf.len())
        } else {
            libc::send(fd, ptr, buf.len(), SEND_FLAGS)
        }
    };
    cvt(ret)
}

impl Stream {
    /// Reads up to `buf.len()` bytes.
    ///
    /// Returns the number of bytes read; `0` means the peer closed its end
    /// (or `buf` is empty).
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::WouldBlock`](crate::ErrorKind::WouldBlock) when
    ///   `block` is `false` and nothing is pending
    /// - [`ErrorKind::Transport`](crate::ErrorKind::Transport) for any other
    ///   failure, with the OS error as source
    pub fn read(&self, buf: &mut [u8], block: bool) -> Result<usize> {
        let fd = self.shared.fd;
        let n = retry_interrupted(|| sys_read(fd, buf, block))?;
        trace!(fd, n, block, "read");
        Ok(n)
    }

    /// Writes up to `buf.len()` bytes, returning how many were accepted.
    ///
    /// Partial writes are possible in either mode.
    ///
    /// # Broken pipes
    ///
    /// The two modes differ when the peer has gone away. Non-blocking writes
    /// pass `MSG_NOSIGNAL` on platforms that have it and only report
    /// `EPIPE`. Blocking writes go through `write(2)`, which also raises
    /// `SIGPIPE`. Rust binaries ignore that signal at startup, but a host
    /// process that keeps the default disposition is terminated by it, so
    /// such hosts should ignore `SIGPIPE` before writing in blocking mode.
    ///
    /// # Errors
    ///
    /// Same as [`read`](Self::read).
    pub fn write(&self, buf: &[u8], block: bool) -> Result<usize> {
        let fd = self.shared.fd;
        let n = retry_interrupted(|| sys_write(fd, buf, block))?;
        trace!(fd, n, block, "write");
        Ok(n)
    }

    /// Fills `buf` completely.
    ///
    /// With `block == false`, a would-block before any byte arrives is
    /// returned as is; once some bytes have been read the remainder is
    /// awaited in blocking mode so no data is lost.
    ///
    /// # Errors
    ///
    /// - `Transport` with [`io::ErrorKind::UnexpectedEof`] if the peer closes
    ///   first
    /// - anything [`read`](Self::read) returns
    pub fn read_all(&self, buf: &mut [u8], block: bool) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.read(&mut buf[filled..], block || filled > 0)? {
                0 => {
                    return Err(Error::transport(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "peer closed before buffer was filled",
                    )))
                }
                n => filled += n,
            }
        }
        Ok(())
    }

    /// Writes all of `buf`.
    ///
    /// Would-block handling matches [`read_all`](Self::read_all). Broken
    /// pipes behave as described on [`write`](Self::write).
    ///
    /// # Errors
    ///
    /// - `Transport` with [`io::ErrorKind::WriteZero`] if the descriptor
    ///   stops accepting bytes
    /// - anything [`write`](Self::write) returns
    pub fn write_all(&self, buf: &[u8], block: bool) -> Result<()> {
        let mut written = 0;
        while written < buf.len() {
            match self.write(&buf[written..], block || written > 0)? {
                0 => {
                    return Err(Error::transport(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "descriptor accepted zero bytes",
                    )))
                }
                n => written += n,
            }
        }
        Ok(())
    }
}

impl io::Read for &Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Stream::read(self, buf, true).map_err(Into::into)
    }
}

impl io::Write for &Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Stream::write(self, buf, true).map_err(Into::into)
    }

    fn flush(&mut self) -> io::Result<()> {
        Stream::flush(self).map_err(Into::into)
    }
}

impl io::Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        io::Read::read(&mut &*self, buf)
    }
}

impl io::Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::Write::write(&mut &*self, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        io::Write::flush(&mut &*self)
    }
}
