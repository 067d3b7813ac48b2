//! Socket options.
//!
//! Options can be retrieved and set in three ways:
//!  * typed, using [`Socket::option`] and [`Socket::set_option`] with one of
//!    the option types in this module, e.g. [`ReuseAddress`],
//!  * as `u32`, using [`Socket::option_u32`] and [`Socket::set_option_u32`],
//!  * as raw bytes, using [`Socket::option_raw`] and
//!    [`Socket::set_option_raw`], for options of any other shape.

use std::mem::MaybeUninit;
use std::ptr;
use std::time::Duration;

use crate::error::Result;
use crate::{man_link, new_flag, syscall, Socket};

/// Largest raw option value returned by [`Socket::option_raw`].
const MAX_OPTION_SIZE: usize = 64 * 1024;

new_flag!(
    /// Level at which an option is defined.
    pub struct Level(libc::c_int) {
        /// Socket level, independent of the protocol.
        SOCKET = libc::SOL_SOCKET,
        /// Internet Protocol version 4.
        IPV4 = libc::IPPROTO_IP,
        /// Internet Protocol version 6.
        IPV6 = libc::IPPROTO_IPV6,
        /// Transmission Control Protocol.
        TCP = libc::IPPROTO_TCP,
        /// User Datagram Protocol.
        UDP = libc::IPPROTO_UDP,
    }
);

/// Trait that defines how get the value of a socket option.
///
/// See [`Socket::option`].
pub trait Get {
    /// Returned output.
    type Output: Sized;
    /// Type passed to the OS in the `getsockopt(2)` call.
    type Storage: Sized;

    /// Level to use, see [`Level`].
    const LEVEL: Level;
    /// Option to retrieve.
    const OPT: libc::c_int;

    /// Returns a mutable raw pointer and length to `storage`.
    ///
    /// Default implementation casts a the pointer to `storage` and returns the
    /// size of `Storage` as length.
    ///
    /// # Safety
    ///
    /// Only initialised bytes may be written to the pointer returned.
    unsafe fn as_mut_ptr(
        storage: &mut MaybeUninit<Self::Storage>,
    ) -> (*mut libc::c_void, libc::socklen_t) {
        (
            storage.as_mut_ptr().cast(),
            size_of::<Self::Storage>() as libc::socklen_t,
        )
    }

    /// Initialise the value from `storage`, to which at least `length` bytes
    /// have been written (by the kernel).
    ///
    /// # Safety
    ///
    /// Caller must ensure that at least `length` bytes have been written to
    /// `storage`.
    unsafe fn init(storage: MaybeUninit<Self::Storage>, length: libc::socklen_t) -> Self::Output;
}

/// Trait that defines how set the value of a socket option.
///
/// See [`Socket::set_option`].
pub trait Set {
    /// Value to set.
    type Value: Sized;
    /// Type passed to the OS in the `setsockopt(2)` call.
    type Storage: Sized;

    /// Level to use, see [`Level`].
    const LEVEL: Level;
    /// Option to set.
    const OPT: libc::c_int;

    /// Returns the value as storage for the OS to read.
    fn as_storage(value: Self::Value) -> Self::Storage;
}

/// Socket option functions.
impl Socket {
    /// Get the value of socket option `T`.
    #[doc = man_link!(getsockopt(2))]
    #[doc(alias = "getsockopt")]
    pub fn option<T: Get>(&self) -> Result<T::Output> {
        let fd = self.fd()?;
        let mut storage = MaybeUninit::<T::Storage>::uninit();
        // SAFETY: the OS only writes initialised bytes.
        let (ptr, mut length) = unsafe { T::as_mut_ptr(&mut storage) };
        syscall!(getsockopt(fd, T::LEVEL.0, T::OPT, ptr, &mut length))?;
        // SAFETY: the OS wrote `length` bytes.
        Ok(unsafe { T::init(storage, length) })
    }

    /// Set the value of socket option `T`.
    #[doc = man_link!(setsockopt(2))]
    #[doc(alias = "setsockopt")]
    pub fn set_option<T: Set>(&self, value: T::Value) -> Result<()> {
        let fd = self.fd()?;
        let storage = T::as_storage(value);
        syscall!(setsockopt(
            fd,
            T::LEVEL.0,
            T::OPT,
            ptr::from_ref(&storage).cast(),
            size_of::<T::Storage>() as libc::socklen_t,
        ))
        .map(|_| ())
    }

    /// Set option `name` at `level` to the raw bytes in `value`.
    ///
    /// The bytes must be in the layout the OS expects for the option.
    pub fn set_option_raw(&self, level: Level, name: libc::c_int, value: &[u8]) -> Result<()> {
        let fd = self.fd()?;
        let length = libc::socklen_t::try_from(value.len())
            .map_err(|_| crate::Error::invalid_argument("option value too large"))?;
        syscall!(setsockopt(fd, level.0, name, value.as_ptr().cast(), length)).map(|_| ())
    }

    /// Get at most `max` bytes of the raw value of option `name` at `level`.
    ///
    /// At most 64 KiB is returned, regardless of `max`.
    pub fn option_raw(&self, level: Level, name: libc::c_int, max: usize) -> Result<Vec<u8>> {
        let fd = self.fd()?;
        let max = max.min(MAX_OPTION_SIZE);
        let mut length = libc::socklen_t::try_from(max)
            .map_err(|_| crate::Error::invalid_argument("option value too large"))?;
        let mut buf: Vec<u8> = Vec::with_capacity(max);
        syscall!(getsockopt(fd, level.0, name, buf.as_mut_ptr().cast(), &mut length))?;
        // SAFETY: the OS initialised `length` bytes for us.
        unsafe { buf.set_len((length as usize).min(max)) };
        Ok(buf)
    }

    /// Set option `name` at `level` to the integer `value`.
    pub fn set_option_u32(&self, level: Level, name: libc::c_int, value: u32) -> Result<()> {
        self.set_option_raw(level, name, &value.to_ne_bytes())
    }

    /// Get the integer value of option `name` at `level`.
    ///
    /// Options smaller than four bytes, e.g. some single byte IP options, are
    /// zero extended.
    pub fn option_u32(&self, level: Level, name: libc::c_int) -> Result<u32> {
        let raw = self.option_raw(level, name, size_of::<u32>())?;
        match *raw.as_slice() {
            [byte] => Ok(u32::from(byte)),
            [a, b] => Ok(u32::from(u16::from_ne_bytes([a, b]))),
            [a, b, c, d] => Ok(u32::from_ne_bytes([a, b, c, d])),
            _ => Err(crate::Error::invalid_argument("option is not an integer")),
        }
    }

    /// Set the linger option, i.e. how many seconds a close waits for unsent
    /// data.
    #[doc(alias = "SO_LINGER")]
    pub fn set_linger(&self, enabled: bool, seconds: u32) -> Result<()> {
        self.set_option::<Linger>(enabled.then_some(seconds))
    }

    /// Returns the linger option as `(enabled, seconds)`.
    #[doc(alias = "SO_LINGER")]
    pub fn linger(&self) -> Result<(bool, u32)> {
        let linger = self.option::<Linger>()?;
        Ok((linger.is_some(), linger.unwrap_or(0)))
    }

    /// Set both the send and receive timeout to `seconds`, `0` disables the
    /// timeouts.
    ///
    /// Blocking operations that time out fail with [`ErrorKind::WouldBlock`].
    ///
    /// [`ErrorKind::WouldBlock`]: crate::ErrorKind::WouldBlock
    #[doc(alias = "SO_RCVTIMEO")]
    #[doc(alias = "SO_SNDTIMEO")]
    pub fn set_timeout(&self, seconds: u32) -> Result<()> {
        let timeout = (seconds != 0).then(|| Duration::from_secs(u64::from(seconds)));
        self.set_option::<ReceiveTimeout>(timeout)?;
        self.set_option::<SendTimeout>(timeout)
    }

    /// Put the socket in non-blocking mode, or back in blocking mode.
    ///
    /// Only the mode flag is changed.
    #[doc = man_link!(fcntl(2))]
    #[doc(alias = "O_NONBLOCK")]
    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        let fd = self.fd()?;
        let flags = syscall!(fcntl(fd, libc::F_GETFL))?;
        let new_flags = if nonblocking {
            flags | libc::O_NONBLOCK
        } else {
            flags & !libc::O_NONBLOCK
        };
        if new_flags != flags {
            syscall!(fcntl(fd, libc::F_SETFL, new_flags))?;
        }
        Ok(())
    }

    /// Returns `true` if the socket is in non-blocking mode.
    pub fn is_nonblocking(&self) -> Result<bool> {
        let fd = self.fd()?;
        let flags = syscall!(fcntl(fd, libc::F_GETFL))?;
        Ok(flags & libc::O_NONBLOCK != 0)
    }

    /// Get and clear the pending socket error.
    ///
    /// Used after a non-blocking connect ([`Socket::connect_try`]) reported
    /// the socket as writable to determine if the connection succeeded.
    #[doc(alias = "SO_ERROR")]
    #[doc(alias = "take_error")]
    pub fn pending_error(&self) -> Result<Option<crate::Error>> {
        self.option::<Error>()
    }
}

new_option! {
    /// Get and clear the pending socket error.
    #[doc(alias = "SO_ERROR")]
    pub Error {
        type Storage = libc::c_int;
        const LEVEL = Level::SOCKET;
        const OPT = libc::SO_ERROR;

        unsafe fn init(storage: MaybeUninit<Self::Storage>, length: libc::socklen_t) -> Option<crate::Error> {
            debug_assert!(length == size_of::<Self::Storage>() as libc::socklen_t);
            let errno = unsafe { storage.assume_init() };
            if errno == 0 {
                None
            } else {
                Some(crate::Error::from_raw_os_error(errno))
            }
        }
    }

    /// Enable sending of keep-alive messages on connection-oriented
    /// sockets.
    #[doc(alias = "SO_KEEPALIVE")]
    pub KeepAlive {
        type Storage = libc::c_int;
        const LEVEL = Level::SOCKET;
        const OPT = libc::SO_KEEPALIVE;

        unsafe fn init(storage: MaybeUninit<Self::Storage>, length: libc::socklen_t) -> bool {
            debug_assert!(length == size_of::<Self::Storage>() as libc::socklen_t);
            unsafe { storage.assume_init() >= 1 }
        }

        fn as_storage(value: bool) -> Self::Storage {
            value.into()
        }
    }

    /// Linger option, the number of seconds to linger if enabled.
    #[doc(alias = "SO_LINGER")]
    pub Linger {
        type Storage = libc::linger;
        const LEVEL = Level::SOCKET;
        const OPT = libc::SO_LINGER;

        unsafe fn init(storage: MaybeUninit<Self::Storage>, length: libc::socklen_t) -> Option<u32> {
            debug_assert!(length == size_of::<Self::Storage>() as libc::socklen_t);
            let linger = unsafe { storage.assume_init() };
            if linger.l_onoff > 0 {
                Some(linger.l_linger.max(0) as u32)
            } else {
                None
            }
        }

        fn as_storage(value: Option<u32>) -> Self::Storage {
            libc::linger {
                l_onoff: value.is_some().into(),
                l_linger: libc::c_int::try_from(value.unwrap_or(0)).unwrap_or(libc::c_int::MAX),
            }
        }
    }

    /// Allow reuse of local addresses.
    #[doc(alias = "SO_REUSEADDR")]
    pub ReuseAddress {
        type Storage = libc::c_int;
        const LEVEL = Level::SOCKET;
        const OPT = libc::SO_REUSEADDR;

        unsafe fn init(storage: MaybeUninit<Self::Storage>, length: libc::socklen_t) -> bool {
            debug_assert!(length == size_of::<Self::Storage>() as libc::socklen_t);
            unsafe { storage.assume_init() >= 1 }
        }

        fn as_storage(value: bool) -> Self::Storage {
            value.into()
        }
    }

    /// Type of the socket.
    #[doc(alias = "SO_TYPE")]
    pub Type {
        type Storage = libc::c_int;
        const LEVEL = Level::SOCKET;
        const OPT = libc::SO_TYPE;

        unsafe fn init(storage: MaybeUninit<Self::Storage>, length: libc::socklen_t) -> crate::Type {
            debug_assert!(length == size_of::<Self::Storage>() as libc::socklen_t);
            unsafe { crate::Type(storage.assume_init()) }
        }
    }

    /// Receive timeout, `None` means no timeout.
    #[doc(alias = "SO_RCVTIMEO")]
    pub ReceiveTimeout {
        type Storage = libc::timeval;
        const LEVEL = Level::SOCKET;
        const OPT = libc::SO_RCVTIMEO;

        unsafe fn init(storage: MaybeUninit<Self::Storage>, length: libc::socklen_t) -> Option<Duration> {
            debug_assert!(length == size_of::<Self::Storage>() as libc::socklen_t);
            from_timeval(unsafe { storage.assume_init() })
        }

        fn as_storage(value: Option<Duration>) -> Self::Storage {
            to_timeval(value)
        }
    }

    /// Send timeout, `None` means no timeout.
    #[doc(alias = "SO_SNDTIMEO")]
    pub SendTimeout {
        type Storage = libc::timeval;
        const LEVEL = Level::SOCKET;
        const OPT = libc::SO_SNDTIMEO;

        unsafe fn init(storage: MaybeUninit<Self::Storage>, length: libc::socklen_t) -> Option<Duration> {
            debug_assert!(length == size_of::<Self::Storage>() as libc::socklen_t);
            from_timeval(unsafe { storage.assume_init() })
        }

        fn as_storage(value: Option<Duration>) -> Self::Storage {
            to_timeval(value)
        }
    }

    /// Size of the receive buffer in bytes.
    ///
    /// The OS may adjust the value, e.g. Linux doubles it.
    #[doc(alias = "SO_RCVBUF")]
    pub ReceiveBuffer {
        type Storage = libc::c_int;
        const LEVEL = Level::SOCKET;
        const OPT = libc::SO_RCVBUF;

        unsafe fn init(storage: MaybeUninit<Self::Storage>, length: libc::socklen_t) -> u32 {
            debug_assert!(length == size_of::<Self::Storage>() as libc::socklen_t);
            unsafe { storage.assume_init().max(0) as u32 }
        }

        fn as_storage(value: u32) -> Self::Storage {
            libc::c_int::try_from(value).unwrap_or(libc::c_int::MAX)
        }
    }

    /// Size of the send buffer in bytes.
    ///
    /// The OS may adjust the value, e.g. Linux doubles it.
    #[doc(alias = "SO_SNDBUF")]
    pub SendBuffer {
        type Storage = libc::c_int;
        const LEVEL = Level::SOCKET;
        const OPT = libc::SO_SNDBUF;

        unsafe fn init(storage: MaybeUninit<Self::Storage>, length: libc::socklen_t) -> u32 {
            debug_assert!(length == size_of::<Self::Storage>() as libc::socklen_t);
            unsafe { storage.assume_init().max(0) as u32 }
        }

        fn as_storage(value: u32) -> Self::Storage {
            libc::c_int::try_from(value).unwrap_or(libc::c_int::MAX)
        }
    }

    /// Allow sending to broadcast addresses on datagram sockets.
    #[doc(alias = "SO_BROADCAST")]
    pub Broadcast {
        type Storage = libc::c_int;
        const LEVEL = Level::SOCKET;
        const OPT = libc::SO_BROADCAST;

        unsafe fn init(storage: MaybeUninit<Self::Storage>, length: libc::socklen_t) -> bool {
            debug_assert!(length == size_of::<Self::Storage>() as libc::socklen_t);
            unsafe { storage.assume_init() >= 1 }
        }

        fn as_storage(value: bool) -> Self::Storage {
            value.into()
        }
    }

    /// Disable Nagle's algorithm on TCP sockets.
    #[doc(alias = "TCP_NODELAY")]
    pub NoDelay {
        type Storage = libc::c_int;
        const LEVEL = Level::TCP;
        const OPT = libc::TCP_NODELAY;

        unsafe fn init(storage: MaybeUninit<Self::Storage>, length: libc::socklen_t) -> bool {
            debug_assert!(length == size_of::<Self::Storage>() as libc::socklen_t);
            unsafe { storage.assume_init() >= 1 }
        }

        fn as_storage(value: bool) -> Self::Storage {
            value.into()
        }
    }
}

#[cfg(not(any(target_os = "illumos", target_os = "solaris")))]
new_option! {
    /// Allow multiple sockets to be bound to an identical socket address.
    #[doc(alias = "SO_REUSEPORT")]
    pub ReusePort {
        type Storage = libc::c_int;
        const LEVEL = Level::SOCKET;
        const OPT = libc::SO_REUSEPORT;

        unsafe fn init(storage: MaybeUninit<Self::Storage>, length: libc::socklen_t) -> bool {
            debug_assert!(length == size_of::<Self::Storage>() as libc::socklen_t);
            unsafe { storage.assume_init() >= 1 }
        }

        fn as_storage(value: bool) -> Self::Storage {
            value.into()
        }
    }
}

#[cfg(any(
    target_os = "android",
    target_os = "freebsd",
    target_os = "linux",
    target_os = "netbsd"
))]
new_option! {
    /// Domain of the socket.
    #[doc(alias = "SO_DOMAIN")]
    pub Domain {
        type Storage = libc::c_int;
        const LEVEL = Level::SOCKET;
        const OPT = libc::SO_DOMAIN;

        unsafe fn init(storage: MaybeUninit<Self::Storage>, length: libc::socklen_t) -> crate::Domain {
            debug_assert!(length == size_of::<Self::Storage>() as libc::socklen_t);
            unsafe { crate::Domain(storage.assume_init()) }
        }
    }
}

#[cfg(any(
    target_os = "ios",
    target_os = "macos",
    target_os = "tvos",
    target_os = "visionos",
    target_os = "watchos",
))]
new_option! {
    /// Don't raise `SIGPIPE` when sending on a closed connection.
    #[doc(alias = "SO_NOSIGPIPE")]
    pub NoSigPipe {
        type Storage = libc::c_int;
        const LEVEL = Level::SOCKET;
        const OPT = libc::SO_NOSIGPIPE;

        unsafe fn init(storage: MaybeUninit<Self::Storage>, length: libc::socklen_t) -> bool {
            debug_assert!(length == size_of::<Self::Storage>() as libc::socklen_t);
            unsafe { storage.assume_init() >= 1 }
        }

        fn as_storage(value: bool) -> Self::Storage {
            value.into()
        }
    }
}

fn from_timeval(tv: libc::timeval) -> Option<Duration> {
    if tv.tv_sec == 0 && tv.tv_usec == 0 {
        None
    } else {
        let secs = tv.tv_sec.max(0) as u64;
        let nanos = (tv.tv_usec.max(0) as u32) * 1_000;
        Some(Duration::new(secs, nanos))
    }
}

fn to_timeval(timeout: Option<Duration>) -> libc::timeval {
    let Some(timeout) = timeout else {
        return libc::timeval { tv_sec: 0, tv_usec: 0 };
    };
    let tv_sec = libc::time_t::try_from(timeout.as_secs()).unwrap_or(libc::time_t::MAX);
    let mut tv_usec = timeout.subsec_micros() as libc::suseconds_t;
    if tv_sec == 0 && tv_usec == 0 && !timeout.is_zero() {
        // Don't round a tiny timeout down to no timeout at all.
        tv_usec = 1;
    }
    libc::timeval { tv_sec, tv_usec }
}

macro_rules! new_option {
    (
        $(
        $(#[$type_meta:meta])*
        $type_vis: vis $type_name: ident {
            type Storage = $storage: ty;
            const LEVEL = $level: expr;
            const OPT = $opt: expr;

            // option::Get implementation.
            $(
            unsafe fn init($init_storage: ident: MaybeUninit<Self::Storage>, $init_length: ident: libc::socklen_t) -> $output: ty $init: block
            )?

            // option::Set implementation.
            $(
            fn as_storage($as_storage_value: ident: $value: ty) -> Self::Storage $as_storage: block
            )?
        }
        )*
    ) => {
        $(
        $(#[$type_meta])*
        #[allow(missing_debug_implementations)]
        $type_vis enum $type_name {}

        $(
        impl Get for $type_name {
            type Output = $output;
            type Storage = $storage;

            const LEVEL: Level = $level;
            const OPT: libc::c_int = $opt;

            unsafe fn init($init_storage: MaybeUninit<Self::Storage>, $init_length: libc::socklen_t) -> Self::Output {
                $init
            }
        }
        )?

        $(
        impl Set for $type_name {
            type Value = $value;
            type Storage = $storage;

            const LEVEL: Level = $level;
            const OPT: libc::c_int = $opt;

            fn as_storage($as_storage_value: Self::Value) -> Self::Storage {
                $as_storage
            }
        }
        )?
        )*
    };
}

use new_option;
