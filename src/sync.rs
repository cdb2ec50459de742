//! Lock helpers shared by the threaded parts of the engine.

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Locks a mutex, recovering the guard if a previous holder panicked.
///
/// Every critical section in this crate leaves its data consistent
/// before doing anything that could unwind, so the poisoned value is
/// still usable.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
