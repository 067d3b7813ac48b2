//! Test utilities.

#![allow(dead_code, unused_imports, unused_macros)] // Not all tests use all code here.

use std::any::Any;
use std::env::temp_dir;
use std::fs::{remove_file, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Once;
use std::{fmt, panic, process, thread};

use sockit::{Address, Domain, ErrorKind, Protocol, Socket, Type};

/// Initialise logging.
pub(crate) fn init() {
    static START: Once = Once::new();
    START.call_once(|| {
        std_logger::Config::logfmt().with_call_location(true).init();
    });
}

pub(crate) fn is_sync<T: Sync>() {}
pub(crate) fn is_send<T: Send>() {}

/// Lorem ipsum text used as file content in tests.
pub(crate) const LOREM_IPSUM: &[u8] = b"Lorem ipsum dolor sit amet, consectetur \
    adipiscing elit, sed do eiusmod tempor incididunt ut labore et dolore magna \
    aliqua. Ut enim ad minim veniam, quis nostrud exercitation ullamco laboris \
    nisi ut aliquip ex ea commodo consequat. Duis aute irure dolor in \
    reprehenderit in voluptate velit esse cillum dolore eu fugiat nulla \
    pariatur. Excepteur sint occaecat cupidatat non proident, sunt in culpa qui \
    officia deserunt mollit anim id est laborum.\n";

/// Returns a unique path in the temporary directory, prefixed with `name`.
pub(crate) fn tmp_path(name: &str) -> PathBuf {
    static N: AtomicUsize = AtomicUsize::new(0);
    let n = N.fetch_add(1, Ordering::Relaxed);
    temp_dir().join(format!("sockit_{name}_{}_{n}", process::id()))
}

/// Create a file in the temporary directory with `content`, the file is
/// removed once the returned value is dropped.
pub(crate) fn test_file(name: &str, content: &[u8]) -> (PathBuf, Defer<impl FnOnce()>) {
    let path = tmp_path(name);
    let mut file = File::create(&path).expect("failed to create test file");
    file.write_all(content).expect("failed to write test file");
    let p = path.clone();
    (path, defer(move || remove_test_file(&p)))
}

/// Defer execution of function `f`.
pub(crate) fn defer<F: FnOnce()>(f: F) -> Defer<F> {
    Defer { f: Some(f) }
}

pub(crate) struct Defer<F: FnOnce()> {
    f: Option<F>,
}

impl<F: FnOnce()> Drop for Defer<F> {
    fn drop(&mut self) {
        let f = self.f.take().unwrap();
        if thread::panicking() {
            if let Err(err) = panic::catch_unwind(panic::AssertUnwindSafe(f)) {
                let msg = panic_message(&*err);
                eprintln!("panic while already panicking: {msg}");
            }
        } else {
            f()
        }
    }
}

pub(crate) fn remove_test_file(path: &Path) {
    match remove_file(path) {
        Ok(()) => {}
        Err(ref err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => panic!("unexpected error removing test file: {err}"),
    }
}

fn panic_message<'a>(err: &'a (dyn Any + Send + 'static)) -> &'a str {
    match err.downcast_ref::<&str>() {
        Some(s) => s,
        None => match err.downcast_ref::<String>() {
            Some(s) => s,
            None => "<unknown>",
        },
    }
}

/// Expect `result` to contain an [`sockit::Error`] with `expected` error kind.
#[track_caller]
pub(crate) fn expect_error_kind<T: fmt::Debug>(result: sockit::Result<T>, expected: ErrorKind) {
    match result {
        Ok(value) => panic!("unexpected ok result, value: {value:?}"),
        Err(ref err) if err.kind() == expected => {}
        Err(err) => panic!("unexpected error result, error: {err:?}"),
    }
}

/// Expect `result` to contain an [`sockit::Error`] with `expected` error
/// number.
#[track_caller]
pub(crate) fn expect_errno<T>(result: sockit::Result<T>, expected: libc::c_int) {
    match result {
        Ok(_) => panic!("unexpected ok result"),
        Err(ref err) if err.raw_os_error() == Some(expected) => {}
        Err(err) => panic!("unexpected error result, error: {err:?}"),
    }
}

/// Address on the IPv4 loopback with a random port.
pub(crate) fn localhost_ipv4() -> Address {
    Address::parse_ip("127.0.0.1", 0).expect("invalid address")
}

/// Create an IPv4, TCP socket listening on the loopback interface. Returns the
/// socket and the address it's bound to.
pub(crate) fn tcp_listener() -> (Socket, Address) {
    init();
    let listener = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))
        .expect("failed to create socket");
    listener.bind(&localhost_ipv4()).expect("failed to bind socket");
    listener.listen(128).expect("failed to listen on socket");
    let address = listener.local_address().expect("failed to get local address");
    (listener, address)
}

/// Create a connected pair of IPv4, TCP sockets: `(client, server)`.
pub(crate) fn tcp_pair() -> (Socket, Socket) {
    let (listener, address) = tcp_listener();
    let client = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))
        .expect("failed to create socket");
    client.connect(&address).expect("failed to connect");
    let server = listener.accept().expect("failed to accept connection");
    (client, server)
}

/// Create an IPv4, UDP socket bound to the loopback interface. Returns the
/// socket and the address it's bound to.
pub(crate) fn udp_socket() -> (Socket, Address) {
    init();
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .expect("failed to create socket");
    socket.bind(&localhost_ipv4()).expect("failed to bind socket");
    let address = socket.local_address().expect("failed to get local address");
    (socket, address)
}

/// Create a connected pair of Unix stream sockets.
pub(crate) fn unix_pair() -> (Socket, Socket) {
    init();
    Socket::pair(Domain::UNIX, Type::STREAM, None).expect("failed to create socket pair")
}

/// Helper macro to execute a system call that returns an `io::Result`.
macro_rules! syscall {
    ($fn: ident ( $($arg: expr),* $(,)? ) ) => {{
        let res = unsafe { libc::$fn($( $arg, )*) };
        if res == -1 {
            Err(std::io::Error::last_os_error())
        } else {
            Ok(res)
        }
    }};
}

pub(crate) use syscall;

/// Returns `true` if `fd` is an open file descriptor.
pub(crate) fn is_open(fd: libc::c_int) -> bool {
    syscall!(fcntl(fd, libc::F_GETFD)).is_ok()
}
