use std::os::fd::RawFd;

use crate::error::{Error, Result};
use crate::io::SEND_FLAGS;
use crate::sendfile::Transfer;
use crate::syscall;

/// Size of the intermediate buffer.
const BUF_SIZE: usize = 64 * 1024;

/// Reads a chunk of the file into a buffer and sends it, for platforms (or
/// files) without `sendfile(2)` support.
pub(crate) enum Buffered {}

impl Transfer for Buffered {
    fn transfer(socket: RawFd, file: RawFd, offset: u64, count: usize) -> Result<usize> {
        let offset = libc::off_t::try_from(offset)
            .map_err(|_| Error::invalid_argument("file offset too large"))?;
        let mut buf: Vec<u8> = Vec::with_capacity(count.min(BUF_SIZE));
        let spare = buf.spare_capacity_mut();
        let n = syscall!(pread(file, spare.as_mut_ptr().cast(), spare.len(), offset))?;
        if n == 0 {
            return Ok(0);
        }
        // SAFETY: the OS initialised `n` bytes for us.
        unsafe { buf.set_len(n as usize) };
        // Anything not sent is read again on the next call.
        let n = syscall!(send(socket, buf.as_ptr().cast(), buf.len(), SEND_FLAGS))?;
        Ok(n as usize)
    }
}
