use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Fixed capacity atomic bitmap, used to track free slots in the
/// [`SocketTable`].
///
/// A set bit means the slot is in use.
///
/// [`SocketTable`]: crate::SocketTable
pub(crate) struct AtomicBitMap {
    data: Box<[AtomicUsize]>,
    capacity: usize,
}

impl AtomicBitMap {
    /// Create a new `AtomicBitMap` for exactly `capacity` slots.
    pub(crate) fn new(capacity: usize) -> AtomicBitMap {
        let size = capacity.div_ceil(usize::BITS as usize);
        let mut data = Vec::with_capacity(size);
        data.resize_with(size, || AtomicUsize::new(0));
        // Mark the bits past `capacity` in the last word as used so they're
        // never handed out.
        let tail = capacity % usize::BITS as usize;
        if tail != 0 {
            if let Some(last) = data.last_mut() {
                *last = AtomicUsize::new(usize::MAX << tail);
            }
        }
        AtomicBitMap {
            data: data.into_boxed_slice(),
            capacity,
        }
    }

    /// Returns the number of slots the bitmap manages.
    pub(crate) const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Claims and returns the index of an available slot, or `None` if all
    /// slots are in use.
    pub(crate) fn next_available(&self) -> Option<usize> {
        for (idx, data) in self.data.iter().enumerate() {
            let mut value = data.load(Ordering::Relaxed);
            let mut i = value.trailing_ones();
            while i < usize::BITS {
                // Attempt to set the bit, claiming the slot.
                value = data.fetch_or(1 << i, Ordering::AcqRel);
                // Another thread could have claimed the same slot, so check
                // the bit was unset in the previous state.
                if is_unset(value, i as usize) {
                    return Some((idx * usize::BITS as usize) + i as usize);
                }
                i += (value >> i).trailing_ones();
            }
        }
        None
    }

    /// Mark `index` as available.
    pub(crate) fn make_available(&self, index: usize) {
        debug_assert!(index < self.capacity);
        let idx = index / usize::BITS as usize;
        let n = index % usize::BITS as usize;
        let old_value = self.data[idx].fetch_and(!(1 << n), Ordering::AcqRel);
        debug_assert!(!is_unset(old_value, n));
    }

    /// Returns the number of slots in use.
    pub(crate) fn used(&self) -> usize {
        let total: usize = self
            .data
            .iter()
            .map(|data| data.load(Ordering::Relaxed).count_ones() as usize)
            .sum();
        // Don't count the bits past the capacity.
        total - (self.data.len() * usize::BITS as usize - self.capacity)
    }
}

/// Returns true if bit `n` is unset in `value`. `n` is zero indexed, i.e. must
/// be in the range 0..usize::BITS.
const fn is_unset(value: usize, n: usize) -> bool {
    ((value >> n) & 1) == 0
}

impl fmt::Debug for AtomicBitMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const WIDTH: usize = usize::BITS as usize;
        for data in self.data.iter() {
            let value = data.load(Ordering::Relaxed);
            write!(f, "{value:0WIDTH$b}")?;
        }
        Ok(())
    }
}

#[test]
fn exact_word() {
    claim_and_release(64)
}

#[test]
fn multiple_words() {
    claim_and_release(256)
}

#[test]
fn partial_word() {
    claim_and_release(10)
}

#[test]
fn partial_last_word() {
    claim_and_release(100)
}

#[test]
fn zero_capacity() {
    let map = AtomicBitMap::new(0);
    assert_eq!(map.capacity(), 0);
    assert_eq!(map.used(), 0);
    assert!(map.next_available().is_none());
}

#[cfg(test)]
fn claim_and_release(capacity: usize) {
    let map = AtomicBitMap::new(capacity);
    assert_eq!(map.capacity(), capacity);
    assert_eq!(map.used(), 0);

    // Claim all slots.
    for n in 0..capacity {
        assert_eq!(map.next_available(), Some(n));
    }
    assert_eq!(map.used(), capacity);
    // Never more than the capacity.
    assert_eq!(map.next_available(), None);

    // Releasing out of order.
    map.make_available(capacity - 1);
    map.make_available(0);
    assert_eq!(map.used(), capacity - 2);
    assert_eq!(map.next_available(), Some(0));
    assert_eq!(map.next_available(), Some(capacity - 1));
    assert_eq!(map.next_available(), None);

    for n in (0..capacity).rev() {
        map.make_available(n);
    }
    assert_eq!(map.used(), 0);
    assert_eq!(map.next_available(), Some(0));
}

#[test]
fn claim_and_release_concurrent() {
    use std::sync::{Arc, Barrier};
    use std::thread;

    const N: usize = 4;
    const M: usize = 1000;

    let bitmap = Arc::new(AtomicBitMap::new(N * M));
    let barrier = Arc::new(Barrier::new(N + 1));
    let handles = (0..N)
        .map(|i| {
            let bitmap = bitmap.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let mut indices = Vec::with_capacity(M);
                barrier.wait();

                if i % 2 == 0 {
                    for _ in 0..M {
                        let idx = bitmap.next_available().expect("failed to get index");
                        indices.push(idx);
                    }

                    for idx in indices {
                        bitmap.make_available(idx);
                    }
                } else {
                    for _ in 0..M {
                        let idx = bitmap.next_available().expect("failed to get index");
                        bitmap.make_available(idx);
                    }
                }
            })
        })
        .collect::<Vec<_>>();

    barrier.wait();
    handles
        .into_iter()
        .map(|handle| handle.join())
        .collect::<thread::Result<()>>()
        .unwrap();
    assert_eq!(bitmap.used(), 0);
}
