//! Handle table.
//!
//! See [`SocketTable`].

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::bitmap::AtomicBitMap;
use crate::error::{Error, ErrorKind, Result};
use crate::Socket;

/// Table of sockets, addressed by [`Handle`]s.
///
/// For callers that can't hold on to a [`Socket`] directly, e.g. a wrapper
/// for another language. The table owns the sockets, callers only hold
/// `Handle`s, which are plain `Copy` values.
///
/// Each slot has a generation that is incremented when the socket in it is
/// removed. A `Handle` to a removed socket (a stale handle) can never reach a
/// socket inserted in the same slot later, even if the OS reused the
/// descriptor number: operations using it fail with
/// [`ErrorKind::BadDescriptor`].
///
/// Dropping the table closes all sockets still in it.
pub struct SocketTable {
    slots: Box<[Slot]>,
    used: AtomicBitMap,
}

struct Slot {
    generation: AtomicU32,
    socket: Mutex<Option<Arc<Socket>>>,
}

impl Slot {
    fn lock(&self) -> MutexGuard<'_, Option<Arc<Socket>>> {
        // A panic while holding the lock can't leave the `Option` in an
        // invalid state.
        self.socket.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Reference to a socket in a [`SocketTable`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Handle {
    index: u32,
    generation: u32,
}

impl Handle {
    /// Returns the handle as a single integer, e.g. to pass it across an FFI
    /// boundary.
    pub const fn to_raw(self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }

    /// Create a handle from a value returned by [`Handle::to_raw`].
    pub const fn from_raw(raw: u64) -> Handle {
        Handle {
            index: raw as u32,
            generation: (raw >> 32) as u32,
        }
    }

    /// Index of the slot in the table.
    pub const fn index(self) -> u32 {
        self.index
    }
}

impl SocketTable {
    /// Create a new table that can hold at most `capacity` sockets.
    pub fn new(capacity: u32) -> SocketTable {
        let slots = (0..capacity)
            .map(|_| Slot {
                generation: AtomicU32::new(0),
                socket: Mutex::new(None),
            })
            .collect();
        SocketTable {
            slots,
            used: AtomicBitMap::new(capacity as usize),
        }
    }

    /// Maximum number of sockets in the table.
    pub fn capacity(&self) -> usize {
        self.used.capacity()
    }

    /// Number of sockets currently in the table.
    pub fn len(&self) -> usize {
        self.used.used()
    }

    /// Returns `true` if the table contains no sockets.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add `socket` to the table.
    ///
    /// If the table is full this returns an `EMFILE` error and `socket` is
    /// closed.
    pub fn insert(&self, socket: Socket) -> Result<Handle> {
        let Some(index) = self.used.next_available() else {
            log::debug!("socket table full, closing socket");
            return Err(Error::from_raw_os_error(libc::EMFILE));
        };
        let slot = &self.slots[index];
        let mut guard = slot.lock();
        debug_assert!(guard.is_none());
        *guard = Some(Arc::new(socket));
        let generation = slot.generation.load(Ordering::Acquire);
        drop(guard);
        Ok(Handle {
            index: index as u32,
            generation,
        })
    }

    /// Create a new socket using `f` and add it to the table.
    pub fn create<F>(&self, f: F) -> Result<Handle>
    where
        F: FnOnce() -> Result<Socket>,
    {
        self.insert(f()?)
    }

    /// Get the socket `handle` refers to.
    ///
    /// The returned socket stays open as long as the `Arc` lives, even if the
    /// handle is closed in the meantime.
    pub fn get(&self, handle: Handle) -> Result<Arc<Socket>> {
        let slot = self.slot(handle)?;
        let guard = slot.lock();
        match &*guard {
            Some(socket) if slot.generation.load(Ordering::Acquire) == handle.generation => {
                Ok(socket.clone())
            }
            _ => Err(stale()),
        }
    }

    /// Remove the socket `handle` refers to from the table, without closing
    /// it, transferring ownership to the caller.
    pub fn remove(&self, handle: Handle) -> Result<Arc<Socket>> {
        let slot = self.slot(handle)?;
        let mut guard = slot.lock();
        if guard.is_none() || slot.generation.load(Ordering::Acquire) != handle.generation {
            return Err(stale());
        }
        let socket = guard.take();
        slot.generation.fetch_add(1, Ordering::AcqRel);
        drop(guard);
        self.used.make_available(handle.index as usize);
        socket.ok_or_else(stale)
    }

    /// Close the socket `handle` refers to.
    ///
    /// Closing a stale handle does nothing. If another thread still holds the
    /// socket (see [`SocketTable::get`]) it's closed once that reference is
    /// dropped, in which case errors closing it are only logged.
    pub fn close(&self, handle: Handle) -> Result<()> {
        let socket = match self.remove(handle) {
            Ok(socket) => socket,
            Err(ref err) if err.kind() == ErrorKind::BadDescriptor => return Ok(()),
            Err(err) => return Err(err),
        };
        match Arc::try_unwrap(socket) {
            Ok(mut socket) => socket.close(),
            // Closed by `Drop` when the last reference goes away.
            Err(_) => Ok(()),
        }
    }

    fn slot(&self, handle: Handle) -> Result<&Slot> {
        self.slots.get(handle.index as usize).ok_or_else(stale)
    }
}

fn stale() -> Error {
    Error::new(ErrorKind::BadDescriptor, "invalid socket handle")
}

impl fmt::Debug for SocketTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketTable")
            .field("capacity", &self.capacity())
            .field("used", &self.used)
            .finish()
    }
}
