use std::os::fd::AsRawFd;
use std::time::Duration;

use sockit::option::{ReceiveTimeout, ReuseAddress, SendTimeout};
use sockit::{Config, Domain, Protocol, Socket, Type};

use crate::util::{init, is_send, is_sync, syscall, tcp_listener};

#[test]
fn config_is_send_and_sync() {
    is_send::<Config>();
    is_sync::<Config>();
}

#[test]
fn config_defaults() {
    init();
    let socket = Socket::config(Domain::IPV4, Type::STREAM).build().unwrap();
    assert!(socket.option::<ReuseAddress>().unwrap());
    assert_eq!(
        socket.option::<ReceiveTimeout>().unwrap(),
        Some(sockit::DEFAULT_TIMEOUT)
    );
    assert!(!socket.is_nonblocking().unwrap());
}

#[test]
fn config_without_timeout() {
    init();
    let socket = Socket::config(Domain::IPV4, Type::STREAM)
        .with_timeout(None)
        .build()
        .unwrap();
    assert_eq!(socket.option::<ReceiveTimeout>().unwrap(), None);
    assert_eq!(socket.option::<SendTimeout>().unwrap(), None);
}

#[test]
fn config_custom_timeout() {
    init();
    let timeout = Duration::from_secs(2);
    let socket = Socket::config(Domain::IPV6, Type::STREAM)
        .with_timeout(Some(timeout))
        .build()
        .unwrap();
    assert_eq!(socket.option::<ReceiveTimeout>().unwrap(), Some(timeout));
    assert_eq!(socket.option::<SendTimeout>().unwrap(), Some(timeout));
}

#[test]
fn config_without_reuse_address() {
    init();
    let socket = Socket::config(Domain::IPV4, Type::STREAM)
        .with_reuse_address(false)
        .build()
        .unwrap();
    assert!(!socket.option::<ReuseAddress>().unwrap());
}

#[test]
fn config_datagram_ignores_stream_options() {
    init();
    let socket = Socket::config(Domain::IPV4, Type::DGRAM)
        .with_timeout(Some(Duration::from_secs(1)))
        .build()
        .unwrap();
    assert!(!socket.option::<ReuseAddress>().unwrap());
    assert_eq!(socket.option::<ReceiveTimeout>().unwrap(), None);
}

#[test]
fn config_nonblocking() {
    init();
    let socket = Socket::config(Domain::IPV4, Type::STREAM)
        .nonblocking(true)
        .build()
        .unwrap();
    assert!(socket.is_nonblocking().unwrap());
}

#[test]
fn config_nonblocking_connect_try() {
    let (listener, address) = tcp_listener();
    let socket = Socket::config(Domain::IPV4, Type::STREAM)
        .nonblocking(true)
        .build()
        .unwrap();
    // Loopback connections may complete immediately.
    let _ = socket.connect_try(&address);
    let _server = listener.accept().unwrap();
}

#[test]
fn config_close_on_exec() {
    init();
    let socket = Socket::config(Domain::UNIX, Type::STREAM).build().unwrap();
    let flags = syscall!(fcntl(socket.as_raw_fd(), libc::F_GETFD)).unwrap();
    assert!(flags & libc::FD_CLOEXEC != 0);

    let socket = Socket::config(Domain::UNIX, Type::STREAM)
        .close_on_exec(false)
        .build()
        .unwrap();
    let flags = syscall!(fcntl(socket.as_raw_fd(), libc::F_GETFD)).unwrap();
    assert!(flags & libc::FD_CLOEXEC == 0);
}

#[test]
fn config_with_protocol() {
    init();
    let socket = Socket::config(Domain::IPV4, Type::DGRAM)
        .with_protocol(Some(Protocol::UDP))
        .build()
        .unwrap();
    assert_eq!(socket.option::<sockit::option::Type>().unwrap(), Type::DGRAM);
}

#[test]
fn config_mismatched_protocol() {
    init();
    let result = Socket::config(Domain::IPV4, Type::DGRAM)
        .with_protocol(Some(Protocol::TCP))
        .build();
    let err = result.unwrap_err();
    assert_eq!(err.raw_os_error(), Some(libc::EPROTONOSUPPORT));
}

#[test]
fn config_debug() {
    let config = Socket::config(Domain::IPV4, Type::STREAM);
    let debug = format!("{config:?}");
    assert!(debug.contains("IPV4"), "{debug}");
    assert!(debug.contains("STREAM"), "{debug}");
}
