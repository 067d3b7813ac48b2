//! [`Config`]uration module.

use std::time::Duration;

use crate::option::ReuseAddress;
use crate::socket::{creation_flags, Domain, Protocol, Socket, Type};
use crate::{syscall, Result, DEFAULT_TIMEOUT};

/// Configuration of a [`Socket`].
///
/// Created by calling [`Socket::config`].
#[derive(Debug, Clone)]
#[must_use = "no socket is created until `sockit::Config::build` is called"]
pub struct Config {
    pub(crate) domain: Domain,
    pub(crate) r#type: Type,
    pub(crate) protocol: Option<Protocol>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) reuse_address: bool,
    pub(crate) nonblocking: bool,
    pub(crate) close_on_exec: bool,
}

impl Config {
    /// Default configuration for a socket of `domain` and `type`.
    pub const fn new(domain: Domain, r#type: Type) -> Config {
        Config {
            domain,
            r#type,
            protocol: None,
            timeout: Some(DEFAULT_TIMEOUT),
            reuse_address: true,
            nonblocking: false,
            close_on_exec: true,
        }
    }

    /// Set the protocol, `None` lets the OS pick one for the domain and type.
    pub const fn with_protocol(mut self, protocol: Option<Protocol>) -> Config {
        self.protocol = protocol;
        self
    }

    /// Set the send and receive timeout of stream sockets.
    ///
    /// Defaults to [`DEFAULT_TIMEOUT`]. `None` means blocking operations may
    /// block forever. Ignored for other socket types.
    #[doc(alias = "SO_RCVTIMEO")]
    #[doc(alias = "SO_SNDTIMEO")]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Config {
        self.timeout = timeout;
        self
    }

    /// Set `SO_REUSEADDR` on stream sockets, defaults to `true`.
    ///
    /// Ignored for other socket types.
    #[doc(alias = "SO_REUSEADDR")]
    pub const fn with_reuse_address(mut self, reuse: bool) -> Config {
        self.reuse_address = reuse;
        self
    }

    /// Create the socket in non-blocking mode, defaults to `false`.
    ///
    /// Required for [`Socket::accept_try`] and [`Socket::connect_try`].
    #[doc(alias = "SOCK_NONBLOCK")]
    #[doc(alias = "O_NONBLOCK")]
    pub const fn nonblocking(mut self, nonblocking: bool) -> Config {
        self.nonblocking = nonblocking;
        self
    }

    /// Set the close-on-exec flag, defaults to `true`.
    #[doc(alias = "SOCK_CLOEXEC")]
    #[doc(alias = "FD_CLOEXEC")]
    pub const fn close_on_exec(mut self, close_on_exec: bool) -> Config {
        self.close_on_exec = close_on_exec;
        self
    }

    /// Create the socket.
    #[doc(alias = "socket")]
    pub fn build(self) -> Result<Socket> {
        let r#type = self.r#type.0 | creation_flags(&self);
        let protocol = self.protocol.map_or(0, |p| p.0);
        let fd = syscall!(socket(self.domain.0, r#type, protocol))?;
        // SAFETY: the OS initialised the descriptor for us. From here on the
        // `Socket` owns it, which means it's closed on any error below.
        let socket = unsafe { Socket::from_raw_fd(fd) };
        log::trace!(domain:? = self.domain, socket_type:? = self.r#type; "created socket: fd={fd}");
        self.apply(&socket)?;
        Ok(socket)
    }

    /// Apply everything that can't be passed to `socket(2)` directly.
    pub(crate) fn apply(&self, socket: &Socket) -> Result<()> {
        #[cfg(not(any(
            target_os = "android",
            target_os = "dragonfly",
            target_os = "freebsd",
            target_os = "illumos",
            target_os = "linux",
            target_os = "netbsd",
            target_os = "openbsd",
        )))]
        {
            if self.close_on_exec {
                socket.set_close_on_exec()?;
            }
            if self.nonblocking {
                socket.set_nonblocking(true)?;
            }
        }

        #[cfg(any(
            target_os = "ios",
            target_os = "macos",
            target_os = "tvos",
            target_os = "visionos",
            target_os = "watchos",
        ))]
        socket.set_option::<crate::option::NoSigPipe>(true)?;

        if self.r#type == Type::STREAM {
            if self.reuse_address {
                socket.set_option::<ReuseAddress>(true)?;
            }
            if let Some(timeout) = self.timeout {
                socket.set_option::<crate::option::ReceiveTimeout>(Some(timeout))?;
                socket.set_option::<crate::option::SendTimeout>(Some(timeout))?;
            }
        }
        Ok(())
    }
}
