//! Error taxonomy.
//!
//! Every fallible operation in this crate returns an [`Error`]. Errors coming
//! from the OS are classified into an [`ErrorKind`] using [`classify`], errors
//! in the input of the caller (e.g. a Unix path that is too long) are always
//! [`ErrorKind::InvalidArgument`].

use std::borrow::Cow;
use std::{fmt, io};

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Kind of [`Error`].
///
/// The set of kinds is closed, with the exception of [`ErrorKind::Unknown`]
/// which carries the raw error number for errors not listed here.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    /// Access to the resource was denied.
    #[doc(alias = "EACCES")]
    AccessDenied,
    /// The address is already in use.
    #[doc(alias = "EADDRINUSE")]
    AddressInUse,
    /// The address is not available on this host.
    #[doc(alias = "EADDRNOTAVAIL")]
    AddressUnavailable,
    /// The remote side refused the connection.
    #[doc(alias = "ECONNREFUSED")]
    ConnectionRefused,
    /// The connection was reset by the remote side.
    #[doc(alias = "ECONNRESET")]
    #[doc(alias = "EPIPE")]
    ConnectionReset,
    /// The connection was aborted.
    #[doc(alias = "ECONNABORTED")]
    ConnectionAborted,
    /// The network is unreachable.
    #[doc(alias = "ENETUNREACH")]
    #[doc(alias = "ENETDOWN")]
    NetworkUnreachable,
    /// The host is unreachable.
    #[doc(alias = "EHOSTUNREACH")]
    #[doc(alias = "EHOSTDOWN")]
    HostUnreachable,
    /// The operation timed out.
    #[doc(alias = "ETIMEDOUT")]
    TimedOut,
    /// The operation can't be completed without waiting.
    ///
    /// For sockets in blocking mode this is also returned when the receive
    /// or send timeout expires.
    #[doc(alias = "EAGAIN")]
    #[doc(alias = "EWOULDBLOCK")]
    #[doc(alias = "EINPROGRESS")]
    #[doc(alias = "EALREADY")]
    WouldBlock,
    /// The operation was interrupted by a signal.
    #[doc(alias = "EINTR")]
    Interrupted,
    /// An invalid argument was passed, either to the OS or to this crate.
    #[doc(alias = "EINVAL")]
    InvalidArgument,
    /// The socket is not connected.
    #[doc(alias = "ENOTCONN")]
    NotConnected,
    /// The socket is already connected.
    #[doc(alias = "EISCONN")]
    AlreadyConnected,
    /// The descriptor is not valid (or not a socket), or the socket is
    /// closed.
    #[doc(alias = "EBADF")]
    #[doc(alias = "ENOTSOCK")]
    BadDescriptor,
    /// The operation is not permitted.
    #[doc(alias = "EPERM")]
    PermissionDenied,
    /// The OS accepted zero bytes without reporting an error.
    ///
    /// A conforming stream socket never does this, it's reported as a
    /// transport anomaly by [`Socket::send`].
    ///
    /// [`Socket::send`]: crate::Socket::send
    WriteZero,
    /// Any other error, with the raw error number.
    Unknown(i32),
}

impl ErrorKind {
    /// Returns a short description of the kind.
    const fn as_str(self) -> &'static str {
        use ErrorKind::*;
        match self {
            AccessDenied => "access denied",
            AddressInUse => "address in use",
            AddressUnavailable => "address not available",
            ConnectionRefused => "connection refused",
            ConnectionReset => "connection reset",
            ConnectionAborted => "connection aborted",
            NetworkUnreachable => "network unreachable",
            HostUnreachable => "host unreachable",
            TimedOut => "timed out",
            WouldBlock => "operation would block",
            Interrupted => "operation interrupted",
            InvalidArgument => "invalid argument",
            NotConnected => "not connected",
            AlreadyConnected => "already connected",
            BadDescriptor => "bad descriptor",
            PermissionDenied => "permission denied",
            WriteZero => "zero bytes transferred",
            Unknown(_) => "unknown error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify the OS error number `errno`.
///
/// This is a pure function: the same `errno` always results in the same kind.
/// Error numbers not explicitly listed in [`ErrorKind`] result in
/// [`ErrorKind::Unknown`] carrying `errno`.
#[allow(unreachable_patterns)] // `EAGAIN == EWOULDBLOCK` on most platforms.
pub const fn classify(errno: i32) -> ErrorKind {
    match errno {
        libc::EACCES => ErrorKind::AccessDenied,
        libc::EADDRINUSE => ErrorKind::AddressInUse,
        libc::EADDRNOTAVAIL => ErrorKind::AddressUnavailable,
        libc::ECONNREFUSED => ErrorKind::ConnectionRefused,
        libc::ECONNRESET | libc::EPIPE => ErrorKind::ConnectionReset,
        libc::ECONNABORTED => ErrorKind::ConnectionAborted,
        libc::ENETUNREACH | libc::ENETDOWN => ErrorKind::NetworkUnreachable,
        libc::EHOSTUNREACH | libc::EHOSTDOWN => ErrorKind::HostUnreachable,
        libc::ETIMEDOUT => ErrorKind::TimedOut,
        libc::EAGAIN | libc::EWOULDBLOCK | libc::EINPROGRESS | libc::EALREADY => {
            ErrorKind::WouldBlock
        }
        libc::EINTR => ErrorKind::Interrupted,
        libc::EINVAL => ErrorKind::InvalidArgument,
        libc::ENOTCONN => ErrorKind::NotConnected,
        libc::EISCONN => ErrorKind::AlreadyConnected,
        libc::EBADF | libc::ENOTSOCK => ErrorKind::BadDescriptor,
        libc::EPERM => ErrorKind::PermissionDenied,
        errno => ErrorKind::Unknown(errno),
    }
}

/// Error returned by all operations.
///
/// See [`ErrorKind`] for the possible kinds of errors.
#[derive(Clone, Eq, PartialEq)]
pub struct Error {
    kind: ErrorKind,
    /// Raw OS error number, if any.
    errno: Option<i32>,
    /// Additional information for errors that don't come from the OS.
    detail: Option<Cow<'static, str>>,
}

impl Error {
    /// Create an error from the raw OS error number `errno`.
    pub const fn from_raw_os_error(errno: i32) -> Error {
        Error {
            kind: classify(errno),
            errno: Some(errno),
            detail: None,
        }
    }

    /// Create an error from the last OS error (`errno`).
    ///
    /// This must be called directly after the failing system call, see the
    /// `syscall!` macro.
    pub fn last_os_error() -> Error {
        match io::Error::last_os_error().raw_os_error() {
            Some(errno) => Error::from_raw_os_error(errno),
            None => Error::new(ErrorKind::Unknown(0), "missing OS error number"),
        }
    }

    /// Create an error that doesn't originate from the OS.
    pub fn new<D>(kind: ErrorKind, detail: D) -> Error
    where
        D: Into<Cow<'static, str>>,
    {
        Error {
            kind,
            errno: None,
            detail: Some(detail.into()),
        }
    }

    /// Create an [`ErrorKind::InvalidArgument`] error.
    pub(crate) const fn invalid_argument(detail: &'static str) -> Error {
        Error {
            kind: ErrorKind::InvalidArgument,
            errno: None,
            detail: Some(Cow::Borrowed(detail)),
        }
    }

    /// Error returned for operations on a closed [`Socket`].
    ///
    /// [`Socket`]: crate::Socket
    pub(crate) const fn closed() -> Error {
        Error {
            kind: ErrorKind::BadDescriptor,
            errno: None,
            detail: Some(Cow::Borrowed("socket is closed")),
        }
    }

    /// Returns the kind of error.
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the raw OS error number, if this error originated from the
    /// OS.
    pub const fn raw_os_error(&self) -> Option<i32> {
        self.errno
    }

    /// Returns `true` if the error indicates the operation would need to wait.
    pub const fn is_would_block(&self) -> bool {
        matches!(self.kind, ErrorKind::WouldBlock)
    }

    /// Returns a human readable message describing the error.
    ///
    /// For OS errors this is the description of the OS (`strerror(3)`).
    pub fn message(&self) -> String {
        match (&self.detail, self.errno) {
            (Some(detail), _) => detail.to_string(),
            (None, Some(errno)) => os_message(errno),
            (None, None) => self.kind.as_str().to_owned(),
        }
    }
}

/// Returns the OS description of `errno`, without the "(os error N)" suffix
/// std adds.
fn os_message(errno: i32) -> String {
    let mut msg = io::Error::from_raw_os_error(errno).to_string();
    if let Some(idx) = msg.rfind(" (os error ") {
        msg.truncate(idx);
    }
    msg
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("Error");
        d.field("kind", &self.kind);
        if let Some(errno) = self.errno {
            d.field("errno", &errno);
        }
        d.field("message", &self.message()).finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.errno {
            Some(errno) => write!(f, "{} (os error {errno})", self.message()),
            None => f.write_str(&self.message()),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        if let Some(errno) = err.raw_os_error() {
            return Error::from_raw_os_error(errno);
        }
        let kind = match err.kind() {
            io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            io::ErrorKind::ConnectionRefused => ErrorKind::ConnectionRefused,
            io::ErrorKind::ConnectionReset => ErrorKind::ConnectionReset,
            io::ErrorKind::ConnectionAborted => ErrorKind::ConnectionAborted,
            io::ErrorKind::NotConnected => ErrorKind::NotConnected,
            io::ErrorKind::AddrInUse => ErrorKind::AddressInUse,
            io::ErrorKind::AddrNotAvailable => ErrorKind::AddressUnavailable,
            io::ErrorKind::WouldBlock => ErrorKind::WouldBlock,
            io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => {
                ErrorKind::InvalidArgument
            }
            io::ErrorKind::TimedOut => ErrorKind::TimedOut,
            io::ErrorKind::WriteZero => ErrorKind::WriteZero,
            io::ErrorKind::Interrupted => ErrorKind::Interrupted,
            _ => ErrorKind::Unknown(0),
        };
        Error::new(kind, err.to_string())
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> io::Error {
        if let Some(errno) = err.errno {
            return io::Error::from_raw_os_error(errno);
        }
        let kind = match err.kind {
            ErrorKind::AccessDenied | ErrorKind::PermissionDenied => {
                io::ErrorKind::PermissionDenied
            }
            ErrorKind::AddressInUse => io::ErrorKind::AddrInUse,
            ErrorKind::AddressUnavailable => io::ErrorKind::AddrNotAvailable,
            ErrorKind::ConnectionRefused => io::ErrorKind::ConnectionRefused,
            ErrorKind::ConnectionReset => io::ErrorKind::ConnectionReset,
            ErrorKind::ConnectionAborted => io::ErrorKind::ConnectionAborted,
            ErrorKind::TimedOut => io::ErrorKind::TimedOut,
            ErrorKind::WouldBlock => io::ErrorKind::WouldBlock,
            ErrorKind::Interrupted => io::ErrorKind::Interrupted,
            ErrorKind::InvalidArgument | ErrorKind::BadDescriptor => {
                io::ErrorKind::InvalidInput
            }
            ErrorKind::NotConnected => io::ErrorKind::NotConnected,
            ErrorKind::WriteZero => io::ErrorKind::WriteZero,
            ErrorKind::NetworkUnreachable
            | ErrorKind::HostUnreachable
            | ErrorKind::AlreadyConnected
            | ErrorKind::Unknown(_) => io::ErrorKind::Other,
        };
        io::Error::new(kind, err.message())
    }
}
