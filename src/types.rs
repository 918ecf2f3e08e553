use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::DbError;

pub type DbResult<T> = Result<T, DbError>;
pub type SmallResult = Result<(), DbError>;

/// A handy shortcut to replace the `RwLock` write/read().unwrap() pattern.
pub trait HandyRwLock<T> {
    fn wl(&self) -> RwLockWriteGuard<'_, T>;
    fn rl(&self) -> RwLockReadGuard<'_, T>;
}

impl<T> HandyRwLock<T> for RwLock<T> {
    fn wl(&self) -> RwLockWriteGuard<'_, T> {
        self.write().unwrap()
    }

    fn rl(&self) -> RwLockReadGuard<'_, T> {
        self.read().unwrap()
    }
}
