//! Poison-tolerant lock access for the page cache.
//!
//! A panic while a guard is held must not take the cache down with it; the
//! inner state is recovered and the event is logged.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

pub(crate) fn read_guard<'a, T>(lock: &'a RwLock<T>, op: &'static str) -> RwLockReadGuard<'a, T> {
    lock.read()
        .unwrap_or_else(|poisoned| recover(poisoned, op, "rwlock.read"))
}

pub(crate) fn write_guard<'a, T>(
    lock: &'a RwLock<T>,
    op: &'static str,
) -> RwLockWriteGuard<'a, T> {
    lock.write()
        .unwrap_or_else(|poisoned| recover(poisoned, op, "rwlock.write"))
}

fn recover<G>(poisoned: PoisonError<G>, op: &'static str, lock_kind: &'static str) -> G {
    warn!(
        target = "inkwell::cache::lock",
        op,
        lock_kind,
        result = "poisoned_recovered",
        "Recovered from poisoned cache lock"
    );
    poisoned.into_inner()
}
