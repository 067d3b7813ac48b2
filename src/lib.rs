//! The sockit crate is a structured interface over POSIX sockets.
//!
//! It covers stream, datagram and Unix domain sockets and normalises
//! addressing ([`Address`]), error reporting ([`Error`]), blocking and
//! non-blocking operations ([`TryResult`]), scatter/gather transfers, file to
//! socket transfers ([`Socket::send_file`]) and readiness based multiplexing
//! ([`poll_many`]).
//!
//! The main type is [`Socket`], which owns a single file descriptor. All
//! operations are methods on it. For callers that can't hold on to a Rust
//! value, e.g. a wrapping language runtime, the [`SocketTable`] hands out
//! generation checked [`Handle`]s instead.
//!
//! # Blocking and non-blocking operations
//!
//! Most operations come in two versions. The blocking version, e.g.
//! [`Socket::recv`], suspends the calling thread until the OS satisfies it or
//! the configured timeout elapses. The non-blocking version, e.g.
//! [`Socket::recv_try`], never suspends and returns [`TryResult::WouldBlock`]
//! when the OS would otherwise block.
//!
//! # Default timeout
//!
//! Stream sockets, including accepted ones, are created with a send and
//! receive timeout of [`DEFAULT_TIMEOUT`]. This can be changed using
//! [`Socket::set_timeout`] or [`Config::with_timeout`].
//!
//! # Examples
//!
//! ```no_run
//! # fn main() -> Result<(), sockit::Error> {
//! use sockit::{Address, Domain, Socket, Type};
//!
//! let socket = Socket::new(Domain::IPV4, Type::STREAM, None)?;
//! socket.connect(&Address::parse_ip("127.0.0.1", 8080)?)?;
//! socket.send(b"Hello, World!")?;
//! let response = socket.recv(1024)?;
//! println!("got {} bytes", response.len());
//! # Ok(())
//! # }
//! ```

#![cfg(unix)]
#![warn(
    anonymous_parameters,
    bare_trait_objects,
    missing_debug_implementations,
    missing_docs,
    rust_2018_idioms,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces
)]

use std::time::Duration;

/// Helper macro to execute a system call that returns an `io::Result`.
///
/// The error number is read directly after the call, before anything else
/// can overwrite it.
macro_rules! syscall {
    ($fn: ident ( $($arg: expr),* $(,)? ) ) => {{
        #[allow(unused_unsafe)]
        let res = unsafe { libc::$fn($( $arg, )*) };
        if res == -1 {
            Err($crate::Error::last_os_error())
        } else {
            Ok(res)
        }
    }};
}

/// Link to online manual.
macro_rules! man_link {
    ($syscall: tt ( $section: tt ) ) => {
        concat!(
            "\n\nAdditional documentation can be found in the ",
            "[`",
            stringify!($syscall),
            "(",
            stringify!($section),
            ")`]",
            "(https://man7.org/linux/man-pages/man",
            stringify!($section),
            "/",
            stringify!($syscall),
            ".",
            stringify!($section),
            ".html)",
            " manual.",
        )
    };
}

/// Create a new flag type, a newtype wrapper around an integer with named
/// constants.
macro_rules! new_flag {
    (
        $(
        $(#[$type_meta:meta])*
        pub struct $type_name: ident ( $type_repr: ty ) $(impl $bit_or: ident)? {
            $(
            $(#[$value_meta:meta])*
            $value_name: ident = $libc: ident :: $value_type: ident,
            )*
        }
        )+
    ) => {
        $(
        $(#[$type_meta])*
        #[derive(Copy, Clone, Eq, PartialEq, Hash)]
        pub struct $type_name(pub(crate) $type_repr);

        impl $type_name {
            $(
            $(#[$value_meta])*
            #[allow(trivial_numeric_casts, clippy::cast_sign_loss, clippy::cast_possible_wrap)]
            pub const $value_name: $type_name = $type_name($libc::$value_type as $type_repr);
            )*

            /// Create a new value from a raw, OS specific, value.
            pub const fn from_raw(value: $type_repr) -> $type_name {
                $type_name(value)
            }

            /// Returns the raw, OS specific, value.
            pub const fn as_raw(self) -> $type_repr {
                self.0
            }
        }

        $(
        new_flag!(impl $bit_or for $type_name);
        )?

        impl std::fmt::Debug for $type_name {
            #[allow(unreachable_patterns, unused_doc_comments)]
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match *self {
                    $(
                    $(#[$value_meta])*
                    $type_name::$value_name => f.write_str(stringify!($value_name)),
                    )*
                    value => std::fmt::Debug::fmt(&value.0, f),
                }
            }
        }
        )+
    };
    (impl BitOr for $type_name: ident) => {
        impl std::ops::BitOr for $type_name {
            type Output = Self;

            fn bitor(self, rhs: Self) -> Self::Output {
                $type_name(self.0 | rhs.0)
            }
        }
    };
}

pub(crate) use {man_link, new_flag, syscall};

mod bitmap;
mod unix;

pub mod address;
pub mod config;
pub mod error;
pub mod io;
pub mod nonblocking;
pub mod option;
pub mod poll;
pub mod sendfile;
pub mod socket;
pub mod table;

#[doc(no_inline)]
pub use address::Address;
#[doc(no_inline)]
pub use config::Config;
#[doc(no_inline)]
pub use error::{classify, Error, ErrorKind, Result};
#[doc(no_inline)]
pub use nonblocking::TryResult;
#[doc(no_inline)]
pub use poll::{poll, poll_many, Events, PollEntry, PollResult};
#[doc(no_inline)]
pub use socket::{Domain, Protocol, Socket, Type};
#[doc(no_inline)]
pub use std::net::Shutdown;
#[doc(no_inline)]
pub use table::{Handle, SocketTable};

/// Send and receive timeout applied to newly created and accepted stream
/// sockets.
///
/// Prevents the blocking operations from hanging indefinitely when the caller
/// never sets a timeout. Override it using [`Socket::set_timeout`] or
/// [`Config::with_timeout`].
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
