use core::{
    cell::UnsafeCell,
    sync::atomic::AtomicBool,
    sync::atomic::Ordering::*,
    ops::{Deref, DerefMut},
    time::Duration,
    };

use crate::clock::{Clock, poll_until};
use crate::error::{Error, Result};


/// spin lock acquired by polling, with a bound on the time spent trying
pub struct BusyMutex<T> {
    value: UnsafeCell<T>,
    locked: AtomicBool,
}
// SAFETY: the value is only reachable through a guard, and only one guard exists at a time
unsafe impl<T: Send> Sync for BusyMutex<T> {}

impl<T> BusyMutex<T> {
    pub const fn new(value: T) -> Self {
        Self {
            value: UnsafeCell::new(value),
            locked: AtomicBool::new(false),
        }
    }
    pub fn try_lock(&self) -> Option<BusyMutexGuard<'_, T>> {
        BusyMutexGuard::try_new(self)
    }
    /// busy wait until lock is acquired or `bound` expires, in which case `timeout` is returned
    pub fn lock_within<C: Clock + ?Sized>(&self, clock: &C, bound: Duration, timeout: Error) -> Result<BusyMutexGuard<'_, T>> {
        poll_until(clock, bound, timeout, || Ok(BusyMutexGuard::try_new(self)))
    }
    pub fn is_locked(&self) -> bool {
        self.locked.load(Relaxed)
    }
    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}
impl<T: Default> Default for BusyMutex<T> {
    fn default() -> Self {Self::new(T::default())}
}
impl<T> From<T> for BusyMutex<T> {
    fn from(value: T) -> Self {Self::new(value)}
}

pub struct BusyMutexGuard<'m, T> {
    mutex: &'m BusyMutex<T>,
}
impl<'m, T> BusyMutexGuard<'m, T> {
    fn try_new(mutex: &'m BusyMutex<T>) -> Option<Self> {
        if mutex.locked.compare_exchange(false, true, Acquire, Relaxed).is_ok()
            {Some(Self {mutex})}
        else
            {None}
    }
}
impl<T> Deref for BusyMutexGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // SAFETY: the guard owns the lock
        unsafe {& *self.mutex.value.get()}
    }
}
impl<T> DerefMut for BusyMutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard owns the lock
        unsafe {&mut *self.mutex.value.get()}
    }
}
impl<T> Drop for BusyMutexGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.locked.store(false, Release);
    }
}
