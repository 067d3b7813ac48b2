//! File to socket transfers.
//!
//! See [`Socket::send_file`].
//!
//! The transfer is done by one of the `Transfer` backends:
//!  * `sendfile(2)` on Linux, Android, FreeBSD and Apple platforms,
//!  * a `pread(2)`/`send(2)` loop on other platforms, or when the OS can't
//!    use `sendfile(2)` for the file.

use std::fs::File;
use std::os::fd::{AsRawFd, RawFd};
use std::path::Path;

use crate::error::{Error, ErrorKind, Result};
use crate::option::SendTimeout;
use crate::poll::{poll, Events};
use crate::{man_link, Socket};

mod buffered;

#[cfg(any(target_os = "android", target_os = "linux"))]
mod linux;
#[cfg(any(target_os = "android", target_os = "linux"))]
use linux::Native;

#[cfg(any(
    target_os = "ios",
    target_os = "macos",
    target_os = "tvos",
    target_os = "visionos",
    target_os = "watchos",
))]
mod apple;
#[cfg(any(
    target_os = "ios",
    target_os = "macos",
    target_os = "tvos",
    target_os = "visionos",
    target_os = "watchos",
))]
use apple::Native;

#[cfg(target_os = "freebsd")]
mod freebsd;
#[cfg(target_os = "freebsd")]
use freebsd::Native;

use buffered::Buffered;

/// Largest number of bytes passed to a single [`Transfer::transfer`] call.
const MAX_CHUNK: usize = 1 << 30;

/// Way of transferring bytes from a file to a socket.
pub(crate) trait Transfer {
    /// Send at most `count` bytes of `file`, starting at `offset`, to
    /// `socket`.
    ///
    /// Returns the number of bytes sent, `0` means the end of the file was
    /// reached. Doesn't retry on errors.
    fn transfer(socket: RawFd, file: RawFd, offset: u64, count: usize) -> Result<usize>;
}

/// Transfer functions.
impl Socket {
    /// Send `count` bytes of the file at `path`, starting at `offset`.
    ///
    /// A `count` of zero means everything from `offset` to the end of the
    /// file. Sending stops early if the end of the file is reached, the number
    /// of bytes sent is returned.
    ///
    /// If the socket can't accept more bytes this waits for it to become
    /// writable, for at most the socket's send timeout.
    #[doc = man_link!(sendfile(2))]
    #[doc(alias = "sendfile")]
    pub fn send_file<P: AsRef<Path>>(&self, path: P, offset: u64, count: u64) -> Result<u64> {
        let fd = self.fd()?;
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        let total = match count {
            0 if offset >= size => return Ok(0),
            0 => size - offset,
            count => count,
        };

        let mut sent = 0;
        #[cfg(any(
            target_os = "android",
            target_os = "freebsd",
            target_os = "ios",
            target_os = "linux",
            target_os = "macos",
            target_os = "tvos",
            target_os = "visionos",
            target_os = "watchos",
        ))]
        match send_all::<Native>(self, fd, &file, offset, total, &mut sent) {
            Ok(()) => return Ok(sent),
            Err(ref err) if sent == 0 && is_unsupported(err) => {
                log::debug!("sendfile not supported for file, falling back to buffered transfer: {err}");
            }
            Err(err) => return Err(err),
        }
        send_all::<Buffered>(self, fd, &file, offset, total, &mut sent)?;
        Ok(sent)
    }
}

/// Send `total` bytes using `T`, keeping track of the bytes `sent`.
fn send_all<T: Transfer>(
    socket: &Socket,
    fd: RawFd,
    file: &File,
    offset: u64,
    total: u64,
    sent: &mut u64,
) -> Result<()> {
    while *sent < total {
        let count = usize::try_from(total - *sent).unwrap_or(usize::MAX).min(MAX_CHUNK);
        match T::transfer(fd, file.as_raw_fd(), offset + *sent, count) {
            Ok(0) => break,
            Ok(n) => *sent += n as u64,
            Err(ref err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(ref err) if err.kind() == ErrorKind::WouldBlock => wait_writable(socket)?,
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

/// Wait for `socket` to become writable, for at most the send timeout.
fn wait_writable(socket: &Socket) -> Result<()> {
    let timeout_ms = match socket.option::<SendTimeout>()? {
        Some(timeout) => i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX).max(1),
        None => -1,
    };
    let events = poll(socket, Events::WRITABLE, timeout_ms)?;
    if events.is_empty() {
        Err(Error::from_raw_os_error(libc::EAGAIN))
    } else {
        Ok(())
    }
}

/// Returns `true` if `err` means the native call can't be used for this
/// file/socket combination.
#[allow(dead_code)]
fn is_unsupported(err: &Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(libc::EINVAL | libc::ENOSYS | libc::EOPNOTSUPP | libc::ENOTSOCK)
    )
}
