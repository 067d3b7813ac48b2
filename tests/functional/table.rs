use std::os::fd::AsRawFd;
use std::sync::Arc;
use std::thread;

use sockit::{Domain, ErrorKind, Handle, Socket, SocketTable, Type};

use crate::util::{expect_error_kind, expect_errno, init, is_open, is_send, is_sync, unix_pair};

fn new_socket() -> sockit::Result<Socket> {
    Socket::new(Domain::UNIX, Type::STREAM, None)
}

#[test]
fn table_is_send_and_sync() {
    is_send::<SocketTable>();
    is_sync::<SocketTable>();
    is_send::<Handle>();
    is_sync::<Handle>();
}

#[test]
fn insert_get() {
    let table = SocketTable::new(4);
    assert!(table.is_empty());
    let (a, b) = unix_pair();
    let fd = a.as_raw_fd();
    let ha = table.insert(a).unwrap();
    let hb = table.insert(b).unwrap();
    assert_ne!(ha, hb);
    assert_eq!(table.len(), 2);
    assert_eq!(table.capacity(), 4);

    let a = table.get(ha).unwrap();
    assert_eq!(a.as_raw_fd(), fd);
    let b = table.get(hb).unwrap();
    a.send(b"hello").unwrap();
    assert_eq!(b.recv(16).unwrap(), b"hello");
}

#[test]
fn create() {
    init();
    let table = SocketTable::new(1);
    let handle = table.create(new_socket).unwrap();
    assert!(!table.get(handle).unwrap().is_closed());
}

#[test]
fn create_error_doesnt_use_slot() {
    let table = SocketTable::new(1);
    let result = table.create(|| Socket::new(Domain::from_raw(-1), Type::STREAM, None));
    assert!(result.is_err());
    assert!(table.is_empty());
}

#[test]
fn close_makes_handle_stale() {
    let table = SocketTable::new(2);
    let (a, b) = unix_pair();
    let handle = table.insert(a).unwrap();
    table.close(handle).unwrap();
    // Peer sees the end of the stream.
    assert_eq!(b.recv(16).unwrap(), b"");
    assert!(table.is_empty());
    expect_error_kind(table.get(handle), ErrorKind::BadDescriptor);
}

#[test]
fn close_stale_handle_is_noop() {
    init();
    let table = SocketTable::new(2);
    let handle = table.create(new_socket).unwrap();
    table.close(handle).unwrap();
    table.close(handle).unwrap();
    // Out of bounds.
    table.close(Handle::from_raw(100)).unwrap();
}

#[test]
fn remove_transfers_ownership() {
    init();
    let table = SocketTable::new(2);
    let handle = table.create(new_socket).unwrap();
    let socket = table.remove(handle).unwrap();
    assert!(!socket.is_closed());
    assert!(is_open(socket.as_raw_fd()));
    expect_error_kind(table.remove(handle), ErrorKind::BadDescriptor);
    expect_error_kind(table.get(handle), ErrorKind::BadDescriptor);
}

#[test]
fn full_table() {
    init();
    let table = SocketTable::new(1);
    table.create(new_socket).unwrap();
    let (a, b) = unix_pair();
    expect_errno(table.insert(a), libc::EMFILE);
    assert_eq!(b.recv(16).unwrap(), b"");
    assert_eq!(table.len(), 1);
}

#[test]
fn zero_capacity() {
    init();
    let table = SocketTable::new(0);
    expect_errno(table.create(new_socket), libc::EMFILE);
    expect_error_kind(table.get(Handle::from_raw(0)), ErrorKind::BadDescriptor);
}

#[test]
fn reused_slot_gets_new_generation() {
    init();
    let table = SocketTable::new(1);
    let old = table.create(new_socket).unwrap();
    table.close(old).unwrap();
    let new = table.create(new_socket).unwrap();
    assert_eq!(old.index(), new.index());
    assert_ne!(old, new);
    expect_error_kind(table.get(old), ErrorKind::BadDescriptor);
    assert!(table.get(new).is_ok());
    // Closing the old handle doesn't touch the new socket.
    table.close(old).unwrap();
    assert!(table.get(new).is_ok());
}

#[test]
fn raw_handle() {
    init();
    let table = SocketTable::new(3);
    table.create(new_socket).unwrap();
    let handle = table.create(new_socket).unwrap();
    let raw = handle.to_raw();
    assert_eq!(raw & 0xFFFF_FFFF, u64::from(handle.index()));
    let handle2 = Handle::from_raw(raw);
    assert_eq!(handle, handle2);
    assert!(table.get(handle2).is_ok());
}

#[test]
fn socket_outlives_close() {
    let table = SocketTable::new(1);
    let (a, b) = unix_pair();
    let handle = table.insert(a).unwrap();
    let a = table.get(handle).unwrap();
    table.close(handle).unwrap();
    expect_error_kind(table.get(handle), ErrorKind::BadDescriptor);

    // Still usable using the `Arc`.
    a.send(b"still open").unwrap();
    assert_eq!(b.recv(16).unwrap(), b"still open");

    drop(a);
    assert_eq!(b.recv(16).unwrap(), b"");
}

#[test]
fn concurrent_use() {
    init();
    let table = Arc::new(SocketTable::new(64));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let table = table.clone();
            thread::spawn(move || {
                for _ in 0..100 {
                    let handle = table.create(new_socket).unwrap();
                    assert!(table.get(handle).is_ok());
                    table.close(handle).unwrap();
                    expect_error_kind(table.get(handle), ErrorKind::BadDescriptor);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert!(table.is_empty());
}

#[test]
fn table_debug() {
    let table = SocketTable::new(2);
    assert!(format!("{table:?}").starts_with("SocketTable"));
}
