//! Result of non-blocking operations.
//!
//! See [`TryResult`].

use crate::error::{Error, Result};

/// Result of a non-blocking (`*_try`) operation.
///
/// Separates "the operation would need to wait", which is expected and
/// frequent in event loops, from actual errors.
#[derive(Debug, Eq, PartialEq)]
#[must_use = "this `TryResult` may be an error or may not have completed"]
pub enum TryResult<T> {
    /// The operation completed.
    Ok(T),
    /// The operation could not complete without waiting.
    ///
    /// Only returned for `EAGAIN`/`EWOULDBLOCK`, `EINPROGRESS` and
    /// `EALREADY`.
    WouldBlock,
    /// The operation failed.
    Err(Error),
}

impl<T> TryResult<T> {
    /// Returns `true` if the result is [`TryResult::Ok`].
    pub const fn is_ok(&self) -> bool {
        matches!(self, TryResult::Ok(_))
    }

    /// Returns `true` if the result is [`TryResult::WouldBlock`].
    pub const fn is_would_block(&self) -> bool {
        matches!(self, TryResult::WouldBlock)
    }

    /// Returns `true` if the result is [`TryResult::Err`].
    pub const fn is_err(&self) -> bool {
        matches!(self, TryResult::Err(_))
    }

    /// Maps the value of [`TryResult::Ok`] using `f`.
    pub fn map<U, F>(self, f: F) -> TryResult<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            TryResult::Ok(value) => TryResult::Ok(f(value)),
            TryResult::WouldBlock => TryResult::WouldBlock,
            TryResult::Err(err) => TryResult::Err(err),
        }
    }

    /// Returns the value, if the operation completed.
    pub fn ok(self) -> Option<T> {
        match self {
            TryResult::Ok(value) => Some(value),
            TryResult::WouldBlock | TryResult::Err(_) => None,
        }
    }

    /// Convert into a regular [`Result`], where `None` means the operation
    /// would block.
    pub fn into_result(self) -> Result<Option<T>> {
        match self {
            TryResult::Ok(value) => Ok(Some(value)),
            TryResult::WouldBlock => Ok(None),
            TryResult::Err(err) => Err(err),
        }
    }
}

impl<T> From<Result<T>> for TryResult<T> {
    fn from(result: Result<T>) -> TryResult<T> {
        match result {
            Ok(value) => TryResult::Ok(value),
            Err(ref err) if err.is_would_block() => TryResult::WouldBlock,
            Err(err) => TryResult::Err(err),
        }
    }
}
