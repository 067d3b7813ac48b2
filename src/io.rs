//! Sending and receiving data.
//!
//! Blocking versions, e.g. [`Socket::recv`], wait for the OS (up to the
//! socket's timeout), the `*_try` versions, e.g. [`Socket::recv_try`], never
//! wait.

use std::mem;
use std::net::Shutdown;

use crate::address::{Address, NativeAddr};
use crate::error::{Error, ErrorKind, Result};
use crate::nonblocking::TryResult;
use crate::unix::{iov_max, IoMutSlice, IoSlice};
use crate::{man_link, syscall, Socket};

/// Flags used for all sends, don't raise `SIGPIPE` on a closed connection.
///
/// On Apple platforms `SO_NOSIGPIPE` is set on creation instead.
#[cfg(any(
    target_os = "android",
    target_os = "dragonfly",
    target_os = "freebsd",
    target_os = "illumos",
    target_os = "linux",
    target_os = "netbsd",
    target_os = "openbsd",
))]
pub(crate) const SEND_FLAGS: libc::c_int = libc::MSG_NOSIGNAL;
#[cfg(not(any(
    target_os = "android",
    target_os = "dragonfly",
    target_os = "freebsd",
    target_os = "illumos",
    target_os = "linux",
    target_os = "netbsd",
    target_os = "openbsd",
)))]
pub(crate) const SEND_FLAGS: libc::c_int = 0;

/// Flag used by the `*_try` operations to not block, even if the socket is
/// in blocking mode.
#[cfg(any(
    target_os = "android",
    target_os = "dragonfly",
    target_os = "freebsd",
    target_os = "illumos",
    target_os = "ios",
    target_os = "linux",
    target_os = "macos",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "tvos",
    target_os = "visionos",
    target_os = "watchos",
))]
const DONT_WAIT: libc::c_int = libc::MSG_DONTWAIT;
#[cfg(not(any(
    target_os = "android",
    target_os = "dragonfly",
    target_os = "freebsd",
    target_os = "illumos",
    target_os = "ios",
    target_os = "linux",
    target_os = "macos",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "tvos",
    target_os = "visionos",
    target_os = "watchos",
)))]
const DONT_WAIT: libc::c_int = 0;

/// Blocking I/O operations.
impl Socket {
    /// Send all bytes in `buf`.
    ///
    /// Unlike the other send operations this keeps sending until all bytes are
    /// sent, retrying on interrupts. Returns the number of bytes sent, which is
    /// always `buf.len()`.
    ///
    /// If the OS accepts no bytes at all this returns an error of kind
    /// [`ErrorKind::WriteZero`].
    #[doc = man_link!(send(2))]
    pub fn send(&self, buf: &[u8]) -> Result<usize> {
        let fd = self.fd()?;
        let mut sent = 0;
        while sent < buf.len() {
            let remaining = &buf[sent..];
            match syscall!(send(fd, remaining.as_ptr().cast(), remaining.len(), SEND_FLAGS)) {
                Ok(0) => {
                    return Err(Error::new(
                        ErrorKind::WriteZero,
                        "failed to send whole buffer",
                    ))
                }
                Ok(n) => sent += n as usize,
                Err(ref err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(sent)
    }

    /// Receive at most `max` bytes.
    ///
    /// Makes a single call, so fewer bytes may be returned. An empty vector
    /// for a stream socket means the peer closed the connection.
    #[doc = man_link!(recv(2))]
    pub fn recv(&self, max: usize) -> Result<Vec<u8>> {
        self.recv_flags(max, 0)
    }

    /// Send `buf` to `address`, returning the number of bytes sent.
    ///
    /// Makes a single call, for datagram sockets the entire datagram is sent
    /// or an error is returned.
    #[doc = man_link!(sendto(2))]
    #[doc(alias = "sendto")]
    pub fn send_to(&self, buf: &[u8], address: &Address) -> Result<usize> {
        self.send_to_flags(buf, address, 0)
    }

    /// Receive at most `max` bytes, returning them along with the address of
    /// the sender.
    #[doc = man_link!(recvfrom(2))]
    #[doc(alias = "recvfrom")]
    pub fn recv_from(&self, max: usize) -> Result<(Vec<u8>, Address)> {
        self.recv_from_flags(max, 0)
    }

    /// Shut down the read, write, or both halves of the connection.
    #[doc = man_link!(shutdown(2))]
    pub fn shutdown(&self, how: Shutdown) -> Result<()> {
        let fd = self.fd()?;
        let how = match how {
            Shutdown::Read => libc::SHUT_RD,
            Shutdown::Write => libc::SHUT_WR,
            Shutdown::Both => libc::SHUT_RDWR,
        };
        syscall!(shutdown(fd, how)).map(|_| ())
    }

    /// Send all bytes in `bufs` in order, in a single call.
    ///
    /// Returns the number of bytes sent, which may be less than the total
    /// length of `bufs`. Fails with [`ErrorKind::InvalidArgument`] if more
    /// buffers than the OS supports (`IOV_MAX`) are passed.
    #[doc = man_link!(sendmsg(2))]
    #[doc(alias = "sendmsg")]
    #[doc(alias = "writev")]
    pub fn send_vectored(&self, bufs: &[&[u8]]) -> Result<usize> {
        let fd = self.fd()?;
        if bufs.len() > iov_max() {
            return Err(Error::invalid_argument("too many buffers"));
        }
        let mut iovecs: Vec<IoSlice<'_>> = bufs.iter().map(|buf| IoSlice::new(buf)).collect();
        log::trace!(buffers = iovecs.len(), bytes = iovecs.iter().map(IoSlice::len).sum::<usize>(); "sending vectored");
        // SAFETY: all zero is a valid `msghdr`.
        let mut msg: libc::msghdr = unsafe { mem::zeroed() };
        msg.msg_iov = iovecs.as_mut_ptr().cast();
        msg.msg_iovlen = iovecs.len() as _;
        let n = syscall!(sendmsg(fd, &msg, SEND_FLAGS))?;
        Ok(n as usize)
    }

    /// Receive into buffers of the sizes in `sizes`, in a single call.
    ///
    /// The received bytes fill the buffers from left to right, each buffer up
    /// to its size, so buffers after the last filled one are empty. An empty
    /// `sizes` returns an empty vector without calling the OS.
    #[doc = man_link!(recvmsg(2))]
    #[doc(alias = "recvmsg")]
    #[doc(alias = "readv")]
    pub fn recv_vectored(&self, sizes: &[usize]) -> Result<Vec<Vec<u8>>> {
        let fd = self.fd()?;
        if sizes.is_empty() {
            return Ok(Vec::new());
        }
        if sizes.len() > iov_max() {
            return Err(Error::invalid_argument("too many buffers"));
        }
        if sizes.iter().try_fold(0_usize, |total, size| total.checked_add(*size)).is_none() {
            return Err(Error::invalid_argument("total buffer size too large"));
        }
        let mut bufs = sizes.iter().map(|size| buffer(*size)).collect::<Result<Vec<_>>>()?;
        let n = {
            let mut iovecs: Vec<IoMutSlice<'_>> = bufs.iter_mut().map(IoMutSlice::new).collect();
            // SAFETY: all zero is a valid `msghdr`.
            let mut msg: libc::msghdr = unsafe { mem::zeroed() };
            msg.msg_iov = iovecs.as_mut_ptr().cast();
            msg.msg_iovlen = iovecs.len() as _;
            syscall!(recvmsg(fd, &mut msg, 0))? as usize
        };
        let mut remaining = n;
        for (buf, size) in bufs.iter_mut().zip(sizes) {
            let filled = remaining.min(*size);
            // SAFETY: the OS initialised the first `n` bytes, spread over the
            // buffers in order.
            unsafe { buf.set_len(filled) };
            remaining -= filled;
        }
        Ok(bufs)
    }

    /// Send out-of-band data, returning the number of bytes sent.
    #[doc(alias = "MSG_OOB")]
    pub fn send_oob(&self, buf: &[u8]) -> Result<usize> {
        let fd = self.fd()?;
        let n = syscall!(send(fd, buf.as_ptr().cast(), buf.len(), SEND_FLAGS | libc::MSG_OOB))?;
        Ok(n as usize)
    }

    /// Receive at most `max` bytes of out-of-band data.
    #[doc(alias = "MSG_OOB")]
    pub fn recv_oob(&self, max: usize) -> Result<Vec<u8>> {
        self.recv_flags(max, libc::MSG_OOB)
    }
}

/// Non-blocking I/O operations.
impl Socket {
    /// Attempt to send bytes from `buf`, without blocking.
    ///
    /// Makes a single attempt and returns the number of bytes the OS accepted,
    /// which may be less than `buf.len()`. Retrying is left to the caller.
    pub fn send_try(&self, buf: &[u8]) -> TryResult<usize> {
        self.send_flags(buf, DONT_WAIT).into()
    }

    /// Attempt to receive at most `max` bytes, without blocking.
    pub fn recv_try(&self, max: usize) -> TryResult<Vec<u8>> {
        self.recv_flags(max, DONT_WAIT).into()
    }

    /// Attempt to send `buf` to `address`, without blocking.
    pub fn send_to_try(&self, buf: &[u8], address: &Address) -> TryResult<usize> {
        self.send_to_flags(buf, address, DONT_WAIT).into()
    }

    /// Attempt to receive at most `max` bytes along with the address of the
    /// sender, without blocking.
    pub fn recv_from_try(&self, max: usize) -> TryResult<(Vec<u8>, Address)> {
        self.recv_from_flags(max, DONT_WAIT).into()
    }
}

/// Single call helpers.
impl Socket {
    fn send_flags(&self, buf: &[u8], flags: libc::c_int) -> Result<usize> {
        let fd = self.fd()?;
        let n = syscall!(send(fd, buf.as_ptr().cast(), buf.len(), SEND_FLAGS | flags))?;
        Ok(n as usize)
    }

    fn recv_flags(&self, max: usize, flags: libc::c_int) -> Result<Vec<u8>> {
        let fd = self.fd()?;
        let mut buf = buffer(max)?;
        let spare = buf.spare_capacity_mut();
        let n = syscall!(recv(fd, spare.as_mut_ptr().cast(), spare.len(), flags))?;
        // SAFETY: the OS initialised `n` bytes for us.
        unsafe { buf.set_len(n as usize) };
        Ok(buf)
    }

    fn send_to_flags(&self, buf: &[u8], address: &Address, flags: libc::c_int) -> Result<usize> {
        let fd = self.fd()?;
        let native = address.to_native()?;
        let (ptr, length) = native.as_ptr();
        let n = syscall!(sendto(
            fd,
            buf.as_ptr().cast(),
            buf.len(),
            SEND_FLAGS | flags,
            ptr,
            length
        ))?;
        Ok(n as usize)
    }

    fn recv_from_flags(&self, max: usize, flags: libc::c_int) -> Result<(Vec<u8>, Address)> {
        let fd = self.fd()?;
        let mut buf = buffer(max)?;
        let mut native = NativeAddr::empty();
        let spare = buf.spare_capacity_mut();
        let (ptr, length) = native.as_mut_ptr();
        let n = syscall!(recvfrom(fd, spare.as_mut_ptr().cast(), spare.len(), flags, ptr, length))?;
        // SAFETY: the OS initialised `n` bytes for us.
        unsafe { buf.set_len(n as usize) };
        Ok((buf, Address::from_native(&native)))
    }
}

/// Allocate an empty buffer for `size` bytes.
///
/// Fails with [`ErrorKind::InvalidArgument`] if the buffer can't be allocated.
pub(crate) fn buffer(size: usize) -> Result<Vec<u8>> {
    let mut buf: Vec<u8> = Vec::new();
    buf.try_reserve_exact(size)
        .map_err(|_| Error::invalid_argument("buffer size too large"))?;
    Ok(buf)
}
