//! Socket handle.
//!
//! See [`Socket`].

use std::mem::replace;
use std::os::fd::{AsRawFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};
use std::{fmt, ptr};

use crate::address::{Address, NativeAddr};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::nonblocking::TryResult;
use crate::poll::{poll, Events};
use crate::{man_link, new_flag, syscall};

/// An open socket.
///
/// `Socket` owns exactly one file descriptor. All operations on it are
/// methods, the implementations are split over the modules:
///  * creation, binding, listening, accepting and connecting in this module,
///  * sending and receiving in the [`io`] module,
///  * file to socket transfers in the [`sendfile`] module,
///  * socket options in the [`option`] module.
///
/// # Closing
///
/// The descriptor is closed by calling [`Socket::close`] or, if that was never
/// called, when the `Socket` is dropped. Closing is done at most once: after
/// `close` the `Socket` no longer holds a descriptor, dropping it is a no-op
/// and all other operations fail with [`ErrorKind::BadDescriptor`], without
/// making a system call.
///
/// # Concurrency
///
/// `Socket` does not synchronise operations. Sharing a socket between threads
/// is safe, but only one operation per direction should be in flight, e.g. one
/// thread receiving while another thread sends.
///
/// [`io`]: crate::io
/// [`sendfile`]: crate::sendfile
/// [`option`]: crate::option
/// [`ErrorKind::BadDescriptor`]: crate::ErrorKind::BadDescriptor
pub struct Socket {
    /// `-1` once closed.
    fd: RawFd,
}

new_flag!(
    /// Communication domain of a socket.
    pub struct Domain(libc::c_int) {
        /// Domain for IPv4 communication.
        IPV4 = libc::AF_INET,
        /// Domain for IPv6 communication.
        IPV6 = libc::AF_INET6,
        /// Domain for Unix socket communication.
        UNIX = libc::AF_UNIX,
    }

    /// Communication semantics of a socket.
    pub struct Type(libc::c_int) {
        /// Provides sequenced, reliable, two-way, connection-based byte
        /// streams.
        STREAM = libc::SOCK_STREAM,
        /// Supports datagrams (connectionless, unreliable messages of a fixed
        /// maximum length).
        DGRAM = libc::SOCK_DGRAM,
        /// Provides a sequenced, reliable, two-way connection-based data
        /// transmission path for datagrams of fixed maximum length.
        SEQPACKET = libc::SOCK_SEQPACKET,
        /// Provides raw network protocol access.
        RAW = libc::SOCK_RAW,
    }

    /// Protocol used when creating sockets.
    pub struct Protocol(libc::c_int) {
        /// Internet Control Message Protocol IPv4.
        ICMPV4 = libc::IPPROTO_ICMP,
        /// Internet Control Message Protocol IPv6.
        ICMPV6 = libc::IPPROTO_ICMPV6,
        /// Transmission Control Protocol.
        TCP = libc::IPPROTO_TCP,
        /// User Datagram Protocol.
        UDP = libc::IPPROTO_UDP,
    }
);

impl Socket {
    /// Create a new socket.
    ///
    /// Stream sockets are created with `SO_REUSEADDR` set and a send and
    /// receive timeout of [`DEFAULT_TIMEOUT`]. Use [`Socket::config`] to
    /// change these defaults.
    ///
    /// [`DEFAULT_TIMEOUT`]: crate::DEFAULT_TIMEOUT
    #[doc = man_link!(socket(2))]
    pub fn new(domain: Domain, r#type: Type, protocol: Option<Protocol>) -> Result<Socket> {
        Config::new(domain, r#type).with_protocol(protocol).build()
    }

    /// Configure a new socket.
    ///
    /// See [`Config`] for the options, call [`Config::build`] to create the
    /// socket.
    pub const fn config(domain: Domain, r#type: Type) -> Config {
        Config::new(domain, r#type)
    }

    /// Create a pair of connected sockets.
    ///
    /// For stream sockets both sockets get the same defaults as sockets
    /// created with [`Socket::new`].
    ///
    /// If anything fails after the sockets are created both are closed before
    /// the error is returned.
    #[doc = man_link!(socketpair(2))]
    pub fn pair(
        domain: Domain,
        r#type: Type,
        protocol: Option<Protocol>,
    ) -> Result<(Socket, Socket)> {
        let config = Config::new(domain, r#type).with_protocol(protocol);
        let mut fds: [RawFd; 2] = [-1, -1];
        let r#type = r#type.0 | creation_flags(&config);
        let protocol = protocol.map_or(0, |p| p.0);
        syscall!(socketpair(domain.0, r#type, protocol, fds.as_mut_ptr()))?;
        // SAFETY: the OS initialised both descriptors for us. From here on the
        // `Socket`s own them, which means they are closed on any error below.
        let (a, b) = unsafe { (Socket::from_raw_fd(fds[0]), Socket::from_raw_fd(fds[1])) };
        log::trace!("created socket pair: fds=[{}, {}]", fds[0], fds[1]);
        config.apply(&a)?;
        config.apply(&b)?;
        Ok((a, b))
    }

    /// Create a socket from a raw file descriptor.
    ///
    /// # Safety
    ///
    /// The caller must ensure that `fd` is a valid socket and that it's no
    /// longer used by anything other than the returned `Socket`.
    pub unsafe fn from_raw_fd(fd: RawFd) -> Socket {
        Socket { fd }
    }

    /// Returns the raw file descriptor, or an error if the socket is closed.
    pub(crate) fn fd(&self) -> Result<RawFd> {
        if self.fd < 0 {
            Err(Error::closed())
        } else {
            Ok(self.fd)
        }
    }

    /// Returns `true` if the socket is closed.
    pub const fn is_closed(&self) -> bool {
        self.fd < 0
    }

    /// Bind the socket to `address`.
    #[doc = man_link!(bind(2))]
    pub fn bind(&self, address: &Address) -> Result<()> {
        let fd = self.fd()?;
        let native = address.to_native()?;
        let (ptr, length) = native.as_ptr();
        syscall!(bind(fd, ptr, length)).map(|_| ())
    }

    /// Mark the socket as passive, i.e. ready to accept incoming connections
    /// using [`Socket::accept`].
    ///
    /// `backlog` is capped to the maximum value the OS accepts.
    #[doc = man_link!(listen(2))]
    pub fn listen(&self, backlog: u32) -> Result<()> {
        let fd = self.fd()?;
        let backlog = libc::c_int::try_from(backlog).unwrap_or(libc::c_int::MAX);
        syscall!(listen(fd, backlog)).map(|_| ())
    }

    /// Accept a new connection.
    ///
    /// Blocks until a connection is available. The accepted socket has the
    /// same type as the listener. Accepted stream sockets get a send and
    /// receive timeout of [`DEFAULT_TIMEOUT`].
    ///
    /// [`DEFAULT_TIMEOUT`]: crate::DEFAULT_TIMEOUT
    #[doc = man_link!(accept(2))]
    #[doc(alias = "accept4")]
    pub fn accept(&self) -> Result<Socket> {
        let fd = self.fd()?;
        let r#type = self.option::<crate::option::Type>()?;
        #[cfg(any(
            target_os = "android",
            target_os = "dragonfly",
            target_os = "freebsd",
            target_os = "illumos",
            target_os = "linux",
            target_os = "netbsd",
            target_os = "openbsd",
        ))]
        let socket = {
            let fd = syscall!(accept4(fd, ptr::null_mut(), ptr::null_mut(), libc::SOCK_CLOEXEC))?;
            // SAFETY: the OS initialised the descriptor for us.
            unsafe { Socket::from_raw_fd(fd) }
        };
        #[cfg(not(any(
            target_os = "android",
            target_os = "dragonfly",
            target_os = "freebsd",
            target_os = "illumos",
            target_os = "linux",
            target_os = "netbsd",
            target_os = "openbsd",
        )))]
        let socket = {
            let fd = syscall!(accept(fd, ptr::null_mut(), ptr::null_mut()))?;
            // SAFETY: the OS initialised the descriptor for us.
            unsafe { Socket::from_raw_fd(fd) }
        };
        log::trace!("accepted socket: fd={}", socket.fd);
        // On error `socket` is dropped, closing the accepted descriptor. This
        // also sets close-on-exec on platforms without `accept4(2)`.
        Config::new(Domain(libc::AF_UNSPEC), r#type)
            .with_reuse_address(false)
            .apply(&socket)?;
        Ok(socket)
    }

    /// Attempt to accept a new connection, without blocking.
    ///
    /// Returns [`TryResult::WouldBlock`] if no connection is pending.
    ///
    /// For sockets in blocking mode this first checks for a pending connection
    /// using [`poll`]. If another thread accepts that connection in between
    /// this waits for the next one, up to the receive timeout. Use
    /// [`Socket::set_nonblocking`] to avoid that.
    ///
    /// [`poll`]: crate::poll()
    pub fn accept_try(&self) -> TryResult<Socket> {
        match self.is_nonblocking() {
            Ok(true) => {}
            Ok(false) => match poll(self, Events::READABLE, 0) {
                Ok(events) if events.is_empty() => return TryResult::WouldBlock,
                Ok(_) => {}
                Err(err) => return TryResult::Err(err),
            },
            Err(err) => return TryResult::Err(err),
        }
        self.accept().into()
    }

    /// Connect the socket to `address`.
    ///
    /// Blocks until the connection is established or the send timeout
    /// expires.
    #[doc = man_link!(connect(2))]
    pub fn connect(&self, address: &Address) -> Result<()> {
        let fd = self.fd()?;
        let native = address.to_native()?;
        let (ptr, length) = native.as_ptr();
        syscall!(connect(fd, ptr, length)).map(|_| ())
    }

    /// Start connecting the socket to `address`, without blocking.
    ///
    /// A connection attempt that is still in progress returns
    /// [`TryResult::WouldBlock`]. Wait for the socket to become writable (see
    /// [`poll`]) and then check [`Socket::pending_error`] to determine if the
    /// connection succeeded.
    ///
    /// Sockets in blocking mode are switched to non-blocking mode for the
    /// call and switched back afterwards, the connection attempt continues in
    /// the background.
    ///
    /// [`poll`]: crate::poll()
    pub fn connect_try(&self, address: &Address) -> TryResult<()> {
        match self.is_nonblocking() {
            Ok(true) => self.connect(address).into(),
            Ok(false) => {
                if let Err(err) = self.set_nonblocking(true) {
                    return TryResult::Err(err);
                }
                let result = self.connect(address);
                if let Err(err) = self.set_nonblocking(false) {
                    return TryResult::Err(err);
                }
                result.into()
            }
            Err(err) => TryResult::Err(err),
        }
    }

    /// Returns the local address of the socket.
    ///
    /// See [`Address::from_native`] for addresses of unknown families.
    #[doc = man_link!(getsockname(2))]
    #[doc(alias = "getsockname")]
    pub fn local_address(&self) -> Result<Address> {
        let fd = self.fd()?;
        let mut native = NativeAddr::empty();
        let (ptr, length) = native.as_mut_ptr();
        syscall!(getsockname(fd, ptr, length))?;
        Ok(Address::from_native(&native))
    }

    /// Returns the address of the peer the socket is connected to.
    ///
    /// See [`Address::from_native`] for addresses of unknown families.
    #[doc = man_link!(getpeername(2))]
    #[doc(alias = "getpeername")]
    pub fn peer_address(&self) -> Result<Address> {
        let fd = self.fd()?;
        let mut native = NativeAddr::empty();
        let (ptr, length) = native.as_mut_ptr();
        syscall!(getpeername(fd, ptr, length))?;
        Ok(Address::from_native(&native))
    }

    /// Set the close-on-exec flag, used on platforms that can't set it on
    /// creation.
    #[allow(dead_code)]
    pub(crate) fn set_close_on_exec(&self) -> Result<()> {
        let fd = self.fd()?;
        let flags = syscall!(fcntl(fd, libc::F_GETFD))?;
        syscall!(fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC)).map(|_| ())
    }

    /// Close the socket.
    ///
    /// Closing an already closed socket does nothing and returns `Ok(())`.
    ///
    /// # Notes
    ///
    /// The descriptor is considered closed even if this returns an error, the
    /// close is never retried (retrying could close a descriptor reused by
    /// another thread).
    #[doc = man_link!(close(2))]
    pub fn close(&mut self) -> Result<()> {
        let fd = replace(&mut self.fd, -1);
        if fd < 0 {
            return Ok(());
        }
        log::trace!("closing socket: fd={fd}");
        syscall!(close(fd)).map(|_| ())
    }
}

/// Flags or'ed into the type when creating sockets.
pub(crate) fn creation_flags(config: &Config) -> libc::c_int {
    #[allow(unused_mut)]
    let mut flags = 0;
    #[cfg(any(
        target_os = "android",
        target_os = "dragonfly",
        target_os = "freebsd",
        target_os = "illumos",
        target_os = "linux",
        target_os = "netbsd",
        target_os = "openbsd",
    ))]
    {
        if config.close_on_exec {
            flags |= libc::SOCK_CLOEXEC;
        }
        if config.nonblocking {
            flags |= libc::SOCK_NONBLOCK;
        }
    }
    #[cfg(not(any(
        target_os = "android",
        target_os = "dragonfly",
        target_os = "freebsd",
        target_os = "illumos",
        target_os = "linux",
        target_os = "netbsd",
        target_os = "openbsd",
    )))]
    let _ = config;
    flags
}

impl AsRawFd for Socket {
    /// Returns `-1` if the socket is closed.
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl FromRawFd for Socket {
    unsafe fn from_raw_fd(fd: RawFd) -> Socket {
        unsafe { Socket::from_raw_fd(fd) }
    }
}

impl IntoRawFd for Socket {
    /// Returns `-1` if the socket is closed.
    fn into_raw_fd(mut self) -> RawFd {
        replace(&mut self.fd, -1)
    }
}

impl From<OwnedFd> for Socket {
    fn from(fd: OwnedFd) -> Socket {
        // SAFETY: `OwnedFd` ensures the descriptor is valid and owned.
        unsafe { Socket::from_raw_fd(fd.into_raw_fd()) }
    }
}

impl fmt::Debug for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socket").field("fd", &self.fd).finish()
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        if self.fd < 0 {
            return;
        }
        if let Err(err) = syscall!(close(self.fd)) {
            log::warn!("error closing sockit::Socket: {err}");
        }
    }
}
