use std::os::fd::RawFd;
use std::ptr;

use crate::error::{Error, ErrorKind, Result};
use crate::sendfile::Transfer;

/// `sendfile(2)`, copying in the kernel.
pub(crate) enum Native {}

impl Transfer for Native {
    fn transfer(socket: RawFd, file: RawFd, offset: u64, count: usize) -> Result<usize> {
        let offset = libc::off_t::try_from(offset)
            .map_err(|_| Error::invalid_argument("file offset too large"))?;
        let mut sent: libc::off_t = 0;
        // NOTE: not using `syscall!` as `sent` is also set on error.
        // SAFETY: `sent` is valid for writes, no headers or trailers.
        let res = unsafe {
            libc::sendfile(file, socket, offset, count, ptr::null_mut(), &mut sent, 0)
        };
        if res == -1 {
            let err = Error::last_os_error();
            // Partially sent before being interrupted or blocking.
            if sent > 0 && matches!(err.kind(), ErrorKind::Interrupted | ErrorKind::WouldBlock) {
                return Ok(sent as usize);
            }
            return Err(err);
        }
        Ok(sent as usize)
    }
}
