//! Readiness multiplexing.
//!
//! Every call is a single, stateless, `poll(2)` call: nothing is registered
//! between calls.
//!
//! Timeouts are in milliseconds: a negative timeout waits forever, zero
//! checks readiness once and returns immediately, a positive timeout waits up
//! to that many milliseconds.

use std::ops::{BitOr, BitOrAssign};
use std::time::{Duration, Instant};
use std::{fmt, ptr};

use crate::error::{ErrorKind, Result};
use crate::{man_link, syscall, Socket};

/// Set of readiness events.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct Events(libc::c_short);

impl Events {
    /// No events.
    pub const EMPTY: Events = Events(0);
    /// Data can be read without blocking.
    #[doc(alias = "POLLIN")]
    pub const READABLE: Events = Events(libc::POLLIN);
    /// Data can be written without blocking.
    #[doc(alias = "POLLOUT")]
    pub const WRITABLE: Events = Events(libc::POLLOUT);
    /// An error condition, only reported, ignored when requested.
    ///
    /// Also reported for closed sockets.
    #[doc(alias = "POLLERR")]
    #[doc(alias = "POLLNVAL")]
    pub const ERROR: Events = Events(libc::POLLERR);
    /// The peer hung up, only reported, ignored when requested.
    #[doc(alias = "POLLHUP")]
    pub const HANGUP: Events = Events(libc::POLLHUP);

    /// Returns `true` if all events in `other` are in `self`.
    pub const fn contains(self, other: Events) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` if the set is empty.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Convert the events returned by the OS (`revents`).
    const fn from_revents(revents: libc::c_short) -> Events {
        let mut events = revents & (libc::POLLIN | libc::POLLOUT | libc::POLLERR | libc::POLLHUP);
        if revents & libc::POLLNVAL != 0 {
            events |= libc::POLLERR;
        }
        Events(events)
    }
}

impl BitOr for Events {
    type Output = Events;

    fn bitor(self, rhs: Events) -> Events {
        Events(self.0 | rhs.0)
    }
}

impl BitOrAssign for Events {
    fn bitor_assign(&mut self, rhs: Events) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for Events {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Events::READABLE, "READABLE"),
            (Events::WRITABLE, "WRITABLE"),
            (Events::ERROR, "ERROR"),
            (Events::HANGUP, "HANGUP"),
        ];
        f.debug_set()
            .entries(names.iter().filter(|(e, _)| self.contains(*e)).map(|(_, name)| name))
            .finish()
    }
}

/// Socket and the events to wait for, used by [`poll_many`].
#[derive(Copy, Clone, Debug)]
pub struct PollEntry<'s> {
    /// Socket to wait on.
    pub socket: &'s Socket,
    /// Events to wait for.
    pub events: Events,
}

impl<'s> PollEntry<'s> {
    /// Create a new entry.
    pub const fn new(socket: &'s Socket, events: Events) -> PollEntry<'s> {
        PollEntry { socket, events }
    }
}

/// Events observed on a socket, returned by [`poll_many`].
#[derive(Copy, Clone, Debug)]
pub struct PollResult<'s> {
    /// Index of the entry passed to [`poll_many`].
    pub index: usize,
    /// Socket of the entry.
    pub socket: &'s Socket,
    /// Observed events, never empty.
    pub events: Events,
}

/// Wait for `events` on a single `socket`.
///
/// Returns the observed events, which are empty if the timeout elapsed.
#[doc = man_link!(poll(2))]
pub fn poll(socket: &Socket, events: Events, timeout_ms: i32) -> Result<Events> {
    let fd = socket.fd()?;
    let mut pollfd = libc::pollfd {
        fd,
        events: events.0,
        revents: 0,
    };
    wait(ptr::from_mut(&mut pollfd), 1, timeout_ms)?;
    Ok(Events::from_revents(pollfd.revents))
}

/// Wait for events on all `entries` at once.
///
/// Returns only the entries for which events were observed, in the same order
/// as `entries`. The result is empty if `entries` is empty or if the timeout
/// elapsed before any event.
///
/// Closed sockets are reported with [`Events::ERROR`].
#[doc = man_link!(poll(2))]
pub fn poll_many<'s>(entries: &[PollEntry<'s>], timeout_ms: i32) -> Result<Vec<PollResult<'s>>> {
    if entries.is_empty() {
        return Ok(Vec::new());
    }
    let mut pollfds: Vec<libc::pollfd> = entries
        .iter()
        .map(|entry| libc::pollfd {
            // Negative descriptors are ignored by the OS.
            fd: entry.socket.fd().unwrap_or(-1),
            events: entry.events.0,
            revents: 0,
        })
        .collect();
    let nfds = libc::nfds_t::try_from(pollfds.len())
        .map_err(|_| crate::Error::invalid_argument("too many poll entries"))?;
    // Closed sockets are ready right away.
    let timeout_ms = if entries.iter().any(|entry| entry.socket.is_closed()) {
        0
    } else {
        timeout_ms
    };
    wait(pollfds.as_mut_ptr(), nfds, timeout_ms)?;

    let results = entries
        .iter()
        .zip(pollfds.iter())
        .enumerate()
        .filter_map(|(index, (entry, pollfd))| {
            let events = if entry.socket.is_closed() {
                Events::ERROR
            } else {
                Events::from_revents(pollfd.revents)
            };
            (!events.is_empty()).then_some(PollResult {
                index,
                socket: entry.socket,
                events,
            })
        })
        .collect();
    Ok(results)
}

/// Call `poll(2)`, restarting with the remaining time on interrupts.
///
/// Returns the number of descriptors with events.
fn wait(fds: *mut libc::pollfd, nfds: libc::nfds_t, timeout_ms: i32) -> Result<usize> {
    let deadline = u64::try_from(timeout_ms)
        .ok()
        .map(|ms| Instant::now() + Duration::from_millis(ms));
    let mut timeout = timeout_ms.max(-1);
    loop {
        log::trace!(nfds = nfds, timeout = timeout; "polling");
        match syscall!(poll(fds, nfds, timeout)) {
            Ok(n) => return Ok(n as usize),
            Err(ref err) if err.kind() == ErrorKind::Interrupted => {
                if let Some(deadline) = deadline {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() && timeout != 0 {
                        return Ok(0);
                    }
                    timeout = remaining_ms(remaining);
                }
            }
            Err(err) => return Err(err),
        }
    }
}

/// Milliseconds left in `remaining`, rounded up.
fn remaining_ms(remaining: Duration) -> i32 {
    let ms = remaining.as_micros().div_ceil(1_000);
    i32::try_from(ms).unwrap_or(i32::MAX)
}
