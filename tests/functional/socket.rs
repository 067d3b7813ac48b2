use std::os::fd::{AsRawFd, IntoRawFd};
use std::thread;
use std::time::{Duration, Instant};

use sockit::option::{ReceiveTimeout, ReuseAddress, SendTimeout};
use sockit::{Address, Domain, ErrorKind, Protocol, Socket, TryResult, Type, DEFAULT_TIMEOUT};

use crate::util::{
    defer, expect_error_kind, init, is_send, is_sync, localhost_ipv4, remove_test_file,
    tcp_listener, tcp_pair, tmp_path, unix_pair,
};

#[test]
fn socket_is_send_and_sync() {
    is_send::<Socket>();
    is_sync::<Socket>();
}

#[test]
fn stream_socket_defaults() {
    init();
    let socket = Socket::new(Domain::IPV4, Type::STREAM, None).unwrap();
    assert!(socket.option::<ReuseAddress>().unwrap());
    assert_eq!(socket.option::<ReceiveTimeout>().unwrap(), Some(DEFAULT_TIMEOUT));
    assert_eq!(socket.option::<SendTimeout>().unwrap(), Some(DEFAULT_TIMEOUT));
    assert!(!socket.is_nonblocking().unwrap());
}

#[test]
fn datagram_socket_has_no_timeout() {
    init();
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).unwrap();
    assert_eq!(socket.option::<ReceiveTimeout>().unwrap(), None);
    assert_eq!(socket.option::<SendTimeout>().unwrap(), None);
}

#[test]
fn socket_is_close_on_exec() {
    init();
    let socket = Socket::new(Domain::IPV4, Type::STREAM, None).unwrap();
    let flags = crate::util::syscall!(fcntl(socket.as_raw_fd(), libc::F_GETFD)).unwrap();
    assert!(flags & libc::FD_CLOEXEC != 0);
}

#[test]
fn create_invalid_domain() {
    init();
    let result = Socket::new(Domain::from_raw(-1), Type::STREAM, None);
    assert!(result.is_err());
}

#[test]
fn pair_stream_defaults() {
    let (a, b) = unix_pair();
    for socket in [&a, &b] {
        assert_eq!(socket.option::<ReceiveTimeout>().unwrap(), Some(DEFAULT_TIMEOUT));
        assert_eq!(socket.option::<SendTimeout>().unwrap(), Some(DEFAULT_TIMEOUT));
    }
}

#[test]
fn pair_is_connected() {
    let (a, b) = unix_pair();
    a.send(b"ping").unwrap();
    assert_eq!(b.recv(16).unwrap(), b"ping");
    b.send(b"pong").unwrap();
    assert_eq!(a.recv(16).unwrap(), b"pong");
}

#[test]
fn pair_datagram() {
    init();
    let (a, b) = Socket::pair(Domain::UNIX, Type::DGRAM, None).unwrap();
    a.send(b"one").unwrap();
    a.send(b"two").unwrap();
    assert_eq!(b.recv(16).unwrap(), b"one");
    assert_eq!(b.recv(16).unwrap(), b"two");
}

#[test]
fn bind_listen_accept_connect() {
    let (listener, address) = tcp_listener();
    assert!(matches!(address, Address::V4(addr) if addr.port() != 0));

    let client = Socket::new(Domain::IPV4, Type::STREAM, None).unwrap();
    client.connect(&address).unwrap();
    let server = listener.accept().unwrap();

    assert_eq!(client.peer_address().unwrap(), address);
    assert_eq!(server.local_address().unwrap(), address);
    assert_eq!(server.peer_address().unwrap(), client.local_address().unwrap());
}

#[test]
fn accepted_socket_gets_default_timeout() {
    let (listener, address) = tcp_listener();
    let client = Socket::config(Domain::IPV4, Type::STREAM)
        .with_timeout(None)
        .build()
        .unwrap();
    client.connect(&address).unwrap();
    let server = listener.accept().unwrap();
    assert_eq!(server.option::<ReceiveTimeout>().unwrap(), Some(DEFAULT_TIMEOUT));
    assert_eq!(server.option::<SendTimeout>().unwrap(), Some(DEFAULT_TIMEOUT));
    assert_eq!(client.option::<ReceiveTimeout>().unwrap(), None);
}

#[test]
fn bind_address_in_use() {
    let (_listener, address) = tcp_listener();
    let socket = Socket::config(Domain::IPV4, Type::STREAM)
        .with_reuse_address(false)
        .build()
        .unwrap();
    expect_error_kind(socket.bind(&address), ErrorKind::AddressInUse);
}

#[test]
fn connect_refused() {
    init();
    // Bind a socket, but don't listen on it, to get an unused port.
    let unused = Socket::new(Domain::IPV4, Type::STREAM, None).unwrap();
    unused.bind(&localhost_ipv4()).unwrap();
    let address = unused.local_address().unwrap();

    let socket = Socket::new(Domain::IPV4, Type::STREAM, None).unwrap();
    expect_error_kind(socket.connect(&address), ErrorKind::ConnectionRefused);
}

#[test]
fn accept_try_no_pending_connection() {
    let (listener, _) = tcp_listener();
    listener.set_nonblocking(true).unwrap();
    assert!(listener.accept_try().is_would_block());
}

#[test]
fn accept_try_pending_connection() {
    let (listener, address) = tcp_listener();
    listener.set_nonblocking(true).unwrap();
    let client = Socket::new(Domain::IPV4, Type::STREAM, None).unwrap();
    client.connect(&address).unwrap();

    let server = loop {
        match listener.accept_try() {
            TryResult::Ok(socket) => break socket,
            TryResult::WouldBlock => thread::sleep(Duration::from_millis(1)),
            TryResult::Err(err) => panic!("unexpected error accepting: {err}"),
        }
    };
    // Accepted sockets are in blocking mode.
    assert!(!server.is_nonblocking().unwrap());
    client.send(b"hello").unwrap();
    assert_eq!(server.recv(16).unwrap(), b"hello");
}

#[test]
fn accept_try_blocking_listener() {
    let (listener, address) = tcp_listener();
    assert!(!listener.is_nonblocking().unwrap());
    let start = Instant::now();
    assert!(listener.accept_try().is_would_block());
    assert!(start.elapsed() < Duration::from_millis(500));

    let client = Socket::new(Domain::IPV4, Type::STREAM, None).unwrap();
    client.connect(&address).unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    let server = loop {
        match listener.accept_try() {
            TryResult::Ok(socket) => break socket,
            TryResult::WouldBlock if Instant::now() < deadline => {
                thread::sleep(Duration::from_millis(1))
            }
            result => panic!("unexpected result: {result:?}"),
        }
    };
    assert!(!listener.is_nonblocking().unwrap());
    client.send(b"hello").unwrap();
    assert_eq!(server.recv(16).unwrap(), b"hello");
}

#[test]
fn connect_try_blocking_socket() {
    let (listener, address) = tcp_listener();
    let client = Socket::new(Domain::IPV4, Type::STREAM, None).unwrap();
    assert!(!client.is_nonblocking().unwrap());
    let start = Instant::now();
    match client.connect_try(&address) {
        TryResult::Ok(()) | TryResult::WouldBlock => {}
        TryResult::Err(err) => panic!("unexpected error connecting: {err}"),
    }
    assert!(start.elapsed() < Duration::from_millis(500));
    // Switched back to blocking mode.
    assert!(!client.is_nonblocking().unwrap());

    let events = sockit::poll(&client, sockit::Events::WRITABLE, 5000).unwrap();
    assert!(events.contains(sockit::Events::WRITABLE));
    assert_eq!(client.pending_error().unwrap(), None);
    let server = listener.accept().unwrap();
    client.send(b"hello").unwrap();
    assert_eq!(server.recv(16).unwrap(), b"hello");
}

#[test]
#[cfg(any(target_os = "android", target_os = "linux"))]
fn accept_keeps_listener_type() {
    init();
    let path = tmp_path("seqpacket");
    let _d = defer({
        let path = path.clone();
        move || remove_test_file(&path)
    });
    let address = Address::unix(path);
    let listener = Socket::new(Domain::UNIX, Type::SEQPACKET, None).unwrap();
    listener.bind(&address).unwrap();
    listener.listen(8).unwrap();
    let client = Socket::new(Domain::UNIX, Type::SEQPACKET, None).unwrap();
    client.connect(&address).unwrap();

    let server = listener.accept().unwrap();
    assert_eq!(server.option::<sockit::option::Type>().unwrap(), Type::SEQPACKET);
    // Only stream sockets get the default timeout.
    assert_eq!(server.option::<ReceiveTimeout>().unwrap(), None);
    client.send(b"packet").unwrap();
    assert_eq!(server.recv(16).unwrap(), b"packet");
}

#[test]
fn connect_try_in_progress_then_established() {
    let (listener, address) = tcp_listener();
    let client = Socket::config(Domain::IPV4, Type::STREAM)
        .nonblocking(true)
        .build()
        .unwrap();
    assert!(client.is_nonblocking().unwrap());

    match client.connect_try(&address) {
        TryResult::Ok(()) | TryResult::WouldBlock => {}
        TryResult::Err(err) => panic!("unexpected error connecting: {err}"),
    }
    let events = sockit::poll(&client, sockit::Events::WRITABLE, 5000).unwrap();
    assert!(events.contains(sockit::Events::WRITABLE));
    assert_eq!(client.pending_error().unwrap(), None);
    let _server = listener.accept().unwrap();
}

#[test]
fn connect_try_refused() {
    init();
    let unused = Socket::new(Domain::IPV4, Type::STREAM, None).unwrap();
    unused.bind(&localhost_ipv4()).unwrap();
    let address = unused.local_address().unwrap();

    let socket = Socket::config(Domain::IPV4, Type::STREAM)
        .nonblocking(true)
        .build()
        .unwrap();
    match socket.connect_try(&address) {
        TryResult::WouldBlock => {
            sockit::poll(&socket, sockit::Events::WRITABLE, 5000).unwrap();
            let err = socket.pending_error().unwrap().expect("expected an error");
            assert_eq!(err.kind(), ErrorKind::ConnectionRefused);
        }
        TryResult::Err(err) => assert_eq!(err.kind(), ErrorKind::ConnectionRefused),
        TryResult::Ok(()) => panic!("unexpected connection"),
    }
}

#[test]
fn close_is_idempotent() {
    let (mut a, b) = unix_pair();
    assert!(!a.is_closed());
    a.close().unwrap();
    assert!(a.is_closed());
    a.close().unwrap();
    a.close().unwrap();
    // The peer sees the connection being closed.
    assert_eq!(b.recv(16).unwrap(), b"");
}

#[test]
fn operations_on_closed_socket() {
    let (mut a, _b) = unix_pair();
    a.close().unwrap();
    assert_eq!(a.as_raw_fd(), -1);
    expect_error_kind(a.send(b"hello"), ErrorKind::BadDescriptor);
    expect_error_kind(a.recv(16), ErrorKind::BadDescriptor);
    expect_error_kind(a.local_address(), ErrorKind::BadDescriptor);
    expect_error_kind(a.listen(1), ErrorKind::BadDescriptor);
    expect_error_kind(a.option::<ReuseAddress>(), ErrorKind::BadDescriptor);
    expect_error_kind(a.set_timeout(1), ErrorKind::BadDescriptor);
    match a.recv_try(16) {
        TryResult::Err(err) => assert_eq!(err.kind(), ErrorKind::BadDescriptor),
        result => panic!("unexpected result: {result:?}"),
    }
}

#[test]
fn drop_closes_socket() {
    let (a, b) = unix_pair();
    drop(a);
    assert_eq!(b.recv(16).unwrap(), b"");
}

#[test]
fn into_raw_fd_transfers_ownership() {
    let (a, b) = unix_pair();
    let fd = a.into_raw_fd();
    assert!(fd >= 0);
    // SAFETY: we own `fd`.
    let a = unsafe { Socket::from_raw_fd(fd) };
    a.send(b"still open").unwrap();
    assert_eq!(b.recv(32).unwrap(), b"still open");
}

#[test]
fn socket_type_option() {
    let (a, _b) = unix_pair();
    assert_eq!(a.option::<sockit::option::Type>().unwrap(), Type::STREAM);
}

#[test]
fn flag_debug() {
    assert_eq!(format!("{:?}", Domain::IPV4), "IPV4");
    assert_eq!(format!("{:?}", Type::DGRAM), "DGRAM");
    assert_eq!(format!("{:?}", Protocol::TCP), "TCP");
    assert_eq!(format!("{:?}", Domain::from_raw(-1)), "-1");
}

#[test]
fn tcp_pair_is_connected() {
    let (client, server) = tcp_pair();
    client.send(b"hello").unwrap();
    assert_eq!(server.recv(16).unwrap(), b"hello");
}
