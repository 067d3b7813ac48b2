//! Socket addresses.
//!
//! [`Address`] is the typed representation used in the API, [`NativeAddr`] is
//! the representation passed to and received from the OS. Use
//! [`Address::to_native`] and [`Address::from_native`] to convert between the
//! two.

use std::ffi::OsStr;
use std::mem::{self, offset_of, size_of};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::{fmt, ptr, slice};

use crate::error::{Error, Result};
use crate::socket::Domain;

/// Socket address.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum Address {
    /// IPv4 address and port.
    V4(SocketAddrV4),
    /// IPv6 address and port.
    V6(SocketAddrV6),
    /// Unix domain socket bound to a path on the file system.
    ///
    /// An empty path represents an unnamed socket, e.g. one created by
    /// [`Socket::pair`].
    ///
    /// [`Socket::pair`]: crate::Socket::pair
    Unix(PathBuf),
    /// Unix domain socket in the abstract namespace.
    ///
    /// Only supported on Android and Linux, converting it to a native address
    /// fails on other platforms.
    Abstract(Vec<u8>),
}

impl Address {
    /// Create an IPv4 address.
    pub const fn ipv4(ip: Ipv4Addr, port: u16) -> Address {
        Address::V4(SocketAddrV4::new(ip, port))
    }

    /// Create an IPv6 address.
    pub const fn ipv6(ip: Ipv6Addr, port: u16) -> Address {
        Address::V6(SocketAddrV6::new(ip, port, 0, 0))
    }

    /// Create an IPv6 address from raw `bytes`.
    ///
    /// Returns an [`InvalidArgument`] error if `bytes` is not exactly 16 bytes
    /// long.
    ///
    /// [`InvalidArgument`]: crate::ErrorKind::InvalidArgument
    pub fn ipv6_from_bytes(bytes: &[u8], port: u16) -> Result<Address> {
        match <[u8; 16]>::try_from(bytes) {
            Ok(octets) => Ok(Address::ipv6(Ipv6Addr::from(octets), port)),
            Err(_) => Err(Error::invalid_argument("IPv6 address must be 16 bytes")),
        }
    }

    /// Parse a literal IPv4 or IPv6 address, e.g. `127.0.0.1` or `::1`.
    ///
    /// This does **not** resolve host names.
    pub fn parse_ip(host: &str, port: u16) -> Result<Address> {
        match host.parse::<IpAddr>() {
            Ok(ip) => Ok(Address::from(SocketAddr::new(ip, port))),
            Err(_) => Err(Error::invalid_argument("invalid IP address")),
        }
    }

    /// Create a Unix domain socket address for `path`.
    pub fn unix<P: Into<PathBuf>>(path: P) -> Address {
        Address::Unix(path.into())
    }

    /// Create a Unix domain socket address in the abstract namespace.
    pub fn abstract_name<N: Into<Vec<u8>>>(name: N) -> Address {
        Address::Abstract(name.into())
    }

    /// Returns the domain (address family) of the address.
    pub const fn domain(&self) -> Domain {
        match self {
            Address::V4(_) => Domain::IPV4,
            Address::V6(_) => Domain::IPV6,
            Address::Unix(_) | Address::Abstract(_) => Domain::UNIX,
        }
    }

    /// Returns the path of a Unix domain socket bound to the file system.
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Address::Unix(path) => Some(path),
            _ => None,
        }
    }

    /// Convert the address into the native representation.
    ///
    /// # Errors
    ///
    /// Returns an [`InvalidArgument`] error if:
    ///  * the Unix path (or abstract name) is too long, i.e. equal to or
    ///    longer than [`UNIX_PATH_CAPACITY`],
    ///  * the Unix path contains a NUL byte,
    ///  * the address is in the abstract namespace and the platform doesn't
    ///    support it.
    ///
    /// [`InvalidArgument`]: crate::ErrorKind::InvalidArgument
    pub fn to_native(&self) -> Result<NativeAddr> {
        let mut native = NativeAddr::empty();
        match self {
            Address::V4(addr) => {
                // SAFETY: `sockaddr_storage` is large enough and suitably
                // aligned to hold a `sockaddr_in`.
                let sin = unsafe { native.cast_mut::<libc::sockaddr_in>() };
                sin.sin_family = libc::AF_INET as libc::sa_family_t;
                sin.sin_port = addr.port().to_be();
                sin.sin_addr = libc::in_addr {
                    s_addr: u32::from_ne_bytes(addr.ip().octets()),
                };
                #[cfg(any(
                    target_os = "dragonfly",
                    target_os = "freebsd",
                    target_os = "ios",
                    target_os = "macos",
                    target_os = "netbsd",
                    target_os = "openbsd",
                    target_os = "tvos",
                    target_os = "visionos",
                    target_os = "watchos",
                ))]
                {
                    sin.sin_len = size_of::<libc::sockaddr_in>() as u8;
                }
                native.length = size_of::<libc::sockaddr_in>() as libc::socklen_t;
            }
            Address::V6(addr) => {
                // SAFETY: see above.
                let sin6 = unsafe { native.cast_mut::<libc::sockaddr_in6>() };
                sin6.sin6_family = libc::AF_INET6 as libc::sa_family_t;
                sin6.sin6_port = addr.port().to_be();
                sin6.sin6_flowinfo = addr.flowinfo();
                sin6.sin6_addr = libc::in6_addr {
                    s6_addr: addr.ip().octets(),
                };
                sin6.sin6_scope_id = addr.scope_id();
                #[cfg(any(
                    target_os = "dragonfly",
                    target_os = "freebsd",
                    target_os = "ios",
                    target_os = "macos",
                    target_os = "netbsd",
                    target_os = "openbsd",
                    target_os = "tvos",
                    target_os = "visionos",
                    target_os = "watchos",
                ))]
                {
                    sin6.sin6_len = size_of::<libc::sockaddr_in6>() as u8;
                }
                native.length = size_of::<libc::sockaddr_in6>() as libc::socklen_t;
            }
            Address::Unix(path) => {
                let bytes = path.as_os_str().as_bytes();
                if bytes.len() >= UNIX_PATH_CAPACITY {
                    return Err(Error::invalid_argument("Unix socket path too long"));
                }
                if bytes.contains(&0) {
                    return Err(Error::invalid_argument(
                        "Unix socket path contains a NUL byte",
                    ));
                }
                // Unnamed sockets only have the family set.
                let length = if bytes.is_empty() {
                    SUN_PATH_OFFSET
                } else {
                    SUN_PATH_OFFSET + bytes.len() + 1
                };
                native.set_unix(0, bytes, length);
            }
            #[cfg(any(target_os = "android", target_os = "linux"))]
            Address::Abstract(name) => {
                // One byte is taken by the leading NUL byte.
                if name.len() >= UNIX_PATH_CAPACITY {
                    return Err(Error::invalid_argument("abstract socket name too long"));
                }
                native.set_unix(1, name, SUN_PATH_OFFSET + 1 + name.len());
            }
            #[cfg(not(any(target_os = "android", target_os = "linux")))]
            Address::Abstract(_) => {
                return Err(Error::invalid_argument(
                    "abstract Unix socket namespace not supported on this platform",
                ));
            }
        }
        Ok(native)
    }

    /// Convert the `native` representation into an `Address`.
    ///
    /// # Notes
    ///
    /// This never fails. Address families other than `AF_INET`, `AF_INET6` and
    /// `AF_UNIX` result in the unspecified IPv4 address `0.0.0.0:0`, so that
    /// callers asking for the local or peer address always get *an* address.
    /// Check [`NativeAddr::family`] if the difference matters.
    pub fn from_native(native: &NativeAddr) -> Address {
        match libc::c_int::from(native.family()) {
            libc::AF_INET => {
                // SAFETY: the family is `AF_INET`, so storage holds a
                // `sockaddr_in`.
                let sin = unsafe { native.cast::<libc::sockaddr_in>() };
                let ip = Ipv4Addr::from(sin.sin_addr.s_addr.to_ne_bytes());
                let port = u16::from_be(sin.sin_port);
                Address::V4(SocketAddrV4::new(ip, port))
            }
            libc::AF_INET6 => {
                // SAFETY: the family is `AF_INET6`, so storage holds a
                // `sockaddr_in6`.
                let sin6 = unsafe { native.cast::<libc::sockaddr_in6>() };
                let ip = Ipv6Addr::from(sin6.sin6_addr.s6_addr);
                let port = u16::from_be(sin6.sin6_port);
                Address::V6(SocketAddrV6::new(
                    ip,
                    port,
                    sin6.sin6_flowinfo,
                    sin6.sin6_scope_id,
                ))
            }
            libc::AF_UNIX => {
                let path = native.unix_path_bytes();
                #[cfg(any(target_os = "android", target_os = "linux"))]
                if let Some((&0, name)) = path.split_first() {
                    return Address::Abstract(name.to_vec());
                }
                // The path is NUL terminated, unless it uses the entire buffer.
                let len = path.iter().position(|b| *b == 0).unwrap_or(path.len());
                Address::Unix(PathBuf::from(OsStr::from_bytes(&path[..len])))
            }
            family => {
                log::debug!("unknown address family {family}, using 0.0.0.0:0 instead");
                Address::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0))
            }
        }
    }
}

impl From<SocketAddr> for Address {
    fn from(addr: SocketAddr) -> Address {
        match addr {
            SocketAddr::V4(addr) => Address::V4(addr),
            SocketAddr::V6(addr) => Address::V6(addr),
        }
    }
}

impl From<SocketAddrV4> for Address {
    fn from(addr: SocketAddrV4) -> Address {
        Address::V4(addr)
    }
}

impl From<SocketAddrV6> for Address {
    fn from(addr: SocketAddrV6) -> Address {
        Address::V6(addr)
    }
}

impl TryFrom<Address> for SocketAddr {
    type Error = Error;

    fn try_from(addr: Address) -> Result<SocketAddr> {
        match addr {
            Address::V4(addr) => Ok(SocketAddr::V4(addr)),
            Address::V6(addr) => Ok(SocketAddr::V6(addr)),
            Address::Unix(_) | Address::Abstract(_) => {
                Err(Error::invalid_argument("not an IP address"))
            }
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::V4(addr) => fmt::Display::fmt(addr, f),
            Address::V6(addr) => fmt::Display::fmt(addr, f),
            Address::Unix(path) if path.as_os_str().is_empty() => f.write_str("(unnamed)"),
            Address::Unix(path) => fmt::Display::fmt(&path.display(), f),
            Address::Abstract(name) => write!(f, "@{}", String::from_utf8_lossy(name)),
        }
    }
}

/// Size of `sockaddr_un.sun_path`.
///
/// Unix paths must be shorter than this (to leave room for the NUL byte).
pub const UNIX_PATH_CAPACITY: usize = {
    // SAFETY: all zeroes is a valid `sockaddr_un`.
    let addr: libc::sockaddr_un = unsafe { mem::zeroed() };
    addr.sun_path.len()
};

/// Offset of `sockaddr_un.sun_path`.
const SUN_PATH_OFFSET: usize = offset_of!(libc::sockaddr_un, sun_path);

/// Native socket address, as passed to and returned by the OS.
#[derive(Copy, Clone)]
pub struct NativeAddr {
    storage: libc::sockaddr_storage,
    length: libc::socklen_t,
}

impl NativeAddr {
    /// Zeroed address with the length set to the size of the storage, ready to
    /// be filled by calls such as `accept(2)` and `getsockname(2)`.
    pub(crate) fn empty() -> NativeAddr {
        NativeAddr {
            // SAFETY: all zeroes is a valid `sockaddr_storage`.
            storage: unsafe { mem::zeroed() },
            length: size_of::<libc::sockaddr_storage>() as libc::socklen_t,
        }
    }

    /// Create a native address from its raw bytes.
    ///
    /// Returns an [`InvalidArgument`] error if `bytes` is larger than
    /// `sockaddr_storage`.
    ///
    /// [`InvalidArgument`]: crate::ErrorKind::InvalidArgument
    pub fn from_bytes(bytes: &[u8]) -> Result<NativeAddr> {
        if bytes.len() > size_of::<libc::sockaddr_storage>() {
            return Err(Error::invalid_argument("native address too large"));
        }
        let mut native = NativeAddr::empty();
        // SAFETY: checked the length above and `sockaddr_storage` is valid for
        // any bit pattern.
        unsafe {
            ptr::copy_nonoverlapping(
                bytes.as_ptr(),
                ptr::addr_of_mut!(native.storage).cast::<u8>(),
                bytes.len(),
            );
        }
        native.length = bytes.len() as libc::socklen_t;
        Ok(native)
    }

    /// Returns the address family, e.g. `AF_INET`.
    pub const fn family(&self) -> libc::sa_family_t {
        self.storage.ss_family
    }

    /// Returns the length of the address in bytes.
    #[allow(clippy::len_without_is_empty)]
    pub const fn len(&self) -> usize {
        self.length as usize
    }

    /// Returns the raw bytes of the address.
    pub fn as_bytes(&self) -> &[u8] {
        let len = self.len().min(size_of::<libc::sockaddr_storage>());
        // SAFETY: `storage` is always fully initialised and `len` is within
        // its bounds.
        unsafe { slice::from_raw_parts(ptr::addr_of!(self.storage).cast(), len) }
    }

    /// Returns a pointer and length to pass to the OS.
    pub(crate) fn as_ptr(&self) -> (*const libc::sockaddr, libc::socklen_t) {
        (ptr::addr_of!(self.storage).cast(), self.length)
    }

    /// Returns a mutable pointer and length for the OS to write into.
    pub(crate) fn as_mut_ptr(&mut self) -> (*mut libc::sockaddr, &mut libc::socklen_t) {
        (ptr::addr_of_mut!(self.storage).cast(), &mut self.length)
    }

    /// # Safety
    ///
    /// Caller must ensure the family matches `T`.
    unsafe fn cast<T>(&self) -> &T {
        debug_assert!(size_of::<T>() <= size_of::<libc::sockaddr_storage>());
        unsafe { &*ptr::addr_of!(self.storage).cast::<T>() }
    }

    /// # Safety
    ///
    /// `T` must be one of the `sockaddr_*` types.
    unsafe fn cast_mut<T>(&mut self) -> &mut T {
        debug_assert!(size_of::<T>() <= size_of::<libc::sockaddr_storage>());
        unsafe { &mut *ptr::addr_of_mut!(self.storage).cast::<T>() }
    }

    /// Fill in a `sockaddr_un`, copying `bytes` into `sun_path` starting at
    /// `start`.
    fn set_unix(&mut self, start: usize, bytes: &[u8], length: usize) {
        // SAFETY: `sockaddr_storage` can hold a `sockaddr_un`.
        let sun = unsafe { self.cast_mut::<libc::sockaddr_un>() };
        sun.sun_family = libc::AF_UNIX as libc::sa_family_t;
        for (dst, src) in sun.sun_path[start..].iter_mut().zip(bytes) {
            *dst = *src as libc::c_char;
        }
        #[cfg(any(
            target_os = "dragonfly",
            target_os = "freebsd",
            target_os = "ios",
            target_os = "macos",
            target_os = "netbsd",
            target_os = "openbsd",
            target_os = "tvos",
            target_os = "visionos",
            target_os = "watchos",
        ))]
        {
            sun.sun_len = length as u8;
        }
        self.length = length as libc::socklen_t;
    }

    /// Returns the bytes of `sun_path` that are covered by the address
    /// length.
    fn unix_path_bytes(&self) -> &[u8] {
        let len = self
            .len()
            .saturating_sub(SUN_PATH_OFFSET)
            .min(UNIX_PATH_CAPACITY);
        // SAFETY: only called for `AF_UNIX` addresses.
        let sun = unsafe { self.cast::<libc::sockaddr_un>() };
        // SAFETY: `c_char` and `u8` have the same layout.
        unsafe { slice::from_raw_parts(sun.sun_path.as_ptr().cast(), len) }
    }
}

impl fmt::Debug for NativeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeAddr")
            .field("family", &self.family())
            .field("length", &self.length)
            .field("address", &Address::from_native(self))
            .finish()
    }
}
