use std::os::fd::RawFd;

use crate::error::{Error, Result};
use crate::sendfile::Transfer;
use crate::syscall;

/// `sendfile(2)`, copying in the kernel.
pub(crate) enum Native {}

impl Transfer for Native {
    fn transfer(socket: RawFd, file: RawFd, offset: u64, count: usize) -> Result<usize> {
        let mut offset = libc::off_t::try_from(offset)
            .map_err(|_| Error::invalid_argument("file offset too large"))?;
        let n = syscall!(sendfile(socket, file, &mut offset, count))?;
        Ok(n as usize)
    }
}
