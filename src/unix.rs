//! `iovec` wrappers for the vectored I/O operations.

use std::marker::PhantomData;

/// Read only `iovec`, used by `sendmsg(2)`.
#[repr(transparent)] // Needed for I/O.
pub(crate) struct IoSlice<'b>(libc::iovec, PhantomData<&'b [u8]>);

impl<'b> IoSlice<'b> {
    pub(crate) fn new(buf: &'b [u8]) -> IoSlice<'b> {
        IoSlice(
            libc::iovec {
                iov_base: buf.as_ptr().cast_mut().cast(),
                iov_len: buf.len() as _,
            },
            PhantomData,
        )
    }

    pub(crate) const fn len(&self) -> usize {
        self.0.iov_len
    }
}

/// Mutable `iovec` over the spare capacity of a `Vec`, used by
/// `recvmsg(2)`.
#[repr(transparent)] // Needed for I/O.
pub(crate) struct IoMutSlice<'b>(libc::iovec, PhantomData<&'b mut Vec<u8>>);

impl<'b> IoMutSlice<'b> {
    /// Uses the spare capacity of `buf`, i.e. `buf.capacity() - buf.len()`
    /// bytes.
    pub(crate) fn new(buf: &'b mut Vec<u8>) -> IoMutSlice<'b> {
        let spare = buf.spare_capacity_mut();
        IoMutSlice(
            libc::iovec {
                iov_base: spare.as_mut_ptr().cast(),
                iov_len: spare.len() as _,
            },
            PhantomData,
        )
    }

    // NOTE: can't implement `as_bytes` as we don't know if the bytes are
    // initialised. `len` will have to do.
    pub(crate) const fn len(&self) -> usize {
        self.0.iov_len
    }
}

// SAFETY: `libc::iovec` is `!Sync`, but it's just a point to some bytes, so
// it's actually `Send` and `Sync`.
unsafe impl Send for IoSlice<'_> {}
unsafe impl Sync for IoSlice<'_> {}
unsafe impl Send for IoMutSlice<'_> {}
unsafe impl Sync for IoMutSlice<'_> {}

/// Maximum number of buffers that can be passed in a single call.
pub(crate) fn iov_max() -> usize {
    // SAFETY: always safe to call.
    match unsafe { libc::sysconf(libc::_SC_IOV_MAX) } {
        n if n > 0 => n as usize,
        // POSIX minimum (`_XOPEN_IOV_MAX`).
        _ => 16,
    }
}
