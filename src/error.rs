//! Crate-wide error type.
//!
//! Mirrors `dberr_t` from the external interface contract: every failure
//! kind the core can produce is a distinct variant so callers can `match`
//! on it instead of inspecting a message string.

use std::fmt;

use backtrace::Backtrace;

/// Every way a core operation can fail.
#[derive(Debug)]
pub enum DbError {
    /// The buffer pool has no free frame and the replacer found no victim.
    OutOfMemory,
    /// A disk read or write failed.
    Io(String),
    /// The disk manager has exhausted its extent capacity.
    DiskFull,
    /// A page, table, index, or key was not found.
    NotFound(String),
    /// A duplicate key, an already-existing index/table, or a unique violation.
    Conflict(String),
    /// A lock request was refused and the caller's transaction must abort.
    LockAbort(AbortReason),
    /// A magic number did not match on deserialize, or a size invariant was violated.
    Corruption(String),
}

/// Sub-reasons for a `LockAbort`, matching the four abort triggers in §4.8.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    LockOnShrinking,
    LockSharedOnReadUncommitted,
    UpgradeConflict,
    Deadlock,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            AbortReason::LockOnShrinking => "transaction is in the shrinking phase",
            AbortReason::LockSharedOnReadUncommitted => {
                "shared locks are not taken under read-uncommitted isolation"
            }
            AbortReason::UpgradeConflict => "another upgrade is already in flight for this row",
            AbortReason::Deadlock => "transaction was chosen as a deadlock victim",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DbError::OutOfMemory => write!(f, "buffer pool is out of frames"),
            DbError::Io(msg) => write!(f, "io error: {}", msg),
            DbError::DiskFull => write!(f, "database file has reached its extent capacity"),
            DbError::NotFound(what) => write!(f, "not found: {}", what),
            DbError::Conflict(what) => write!(f, "conflict: {}", what),
            DbError::LockAbort(reason) => write!(f, "transaction aborted: {}", reason),
            DbError::Corruption(what) => write!(f, "corruption: {}", what),
        }
    }
}

impl std::error::Error for DbError {}

impl DbError {
    pub fn not_found(what: impl Into<String>) -> Self {
        DbError::NotFound(what.into())
    }

    pub fn conflict(what: impl Into<String>) -> Self {
        DbError::Conflict(what.into())
    }

    pub fn corruption(what: impl Into<String>) -> Self {
        DbError::Corruption(what.into())
    }

    pub fn io(what: impl Into<String>) -> Self {
        DbError::Io(what.into())
    }

    /// Captures and logs a backtrace at the point of failure, the way the
    /// teacher's `SmallError::show_backtrace` does for fatal conditions.
    pub fn show_backtrace(&self) {
        let bt = Backtrace::new();
        log::error!("{}\n{:?}", self, bt);
    }
}
