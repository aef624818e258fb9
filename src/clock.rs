/*!
    monotonic millisecond time base for every bounded wait

    waits are busy-poll loops: the caller keeps the cpu until the condition holds or the bound expires. Nothing here yields to a scheduler beyond [Clock::relax].
*/

use core::time::Duration;
use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering::*},
        },
    time::Instant,
    };

use crate::error::{Error, Result};


/// source of monotonic milliseconds
pub trait Clock {
    /// current time in milliseconds, from an arbitrary origin
    fn now_ms(&self) -> u64;
    /// milliseconds elapsed since a previous reading of [Self::now_ms]
    fn elapsed_ms(&self, since: u64) -> u64 {
        self.now_ms().saturating_sub(since)
    }
    /// called between two polls of a wait loop
    fn relax(&self) {
        core::hint::spin_loop();
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_ms(&self) -> u64 {(**self).now_ms()}
    fn elapsed_ms(&self, since: u64) -> u64 {(**self).elapsed_ms(since)}
    fn relax(&self) {(**self).relax()}
}
impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now_ms(&self) -> u64 {(**self).now_ms()}
    fn elapsed_ms(&self, since: u64) -> u64 {(**self).elapsed_ms(since)}
    fn relax(&self) {(**self).relax()}
}


/// wall clock of the host
#[derive(Clone, Debug)]
pub struct SystemClock {
    origin: Instant,
}
impl SystemClock {
    pub fn new() -> Self {
        Self {origin: Instant::now()}
    }
}
impl Default for SystemClock {
    fn default() -> Self {Self::new()}
}
impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
    fn relax(&self) {
        // nothing else to do, leave resources to the kernel
        std::thread::yield_now();
    }
}


/**
    deterministic clock advancing by a fixed step at every reading

    a wait loop bounded by `n` milliseconds therefore gives up after about `n / step` polls, whatever the speed of the machine running it
*/
#[derive(Debug)]
pub struct StepClock {
    now: AtomicU64,
    step: u64,
}
impl StepClock {
    pub fn new(step_ms: u64) -> Self {
        Self {now: AtomicU64::new(0), step: step_ms}
    }
    /// move time forward without reading it
    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Relaxed);
    }
    /// current time without advancing it
    pub fn peek(&self) -> u64 {
        self.now.load(Relaxed)
    }
}
impl Clock for StepClock {
    fn now_ms(&self) -> u64 {
        self.now.fetch_add(self.step, Relaxed)
    }
}


/// convert a bound to milliseconds, saturating
pub fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/**
    busy-poll until `poll` produces a value or `bound` expires

    the condition is always evaluated before the clock, so the wait never gives up before the bound is reached. On expiry `timeout` is returned. Errors raised by `poll` end the wait immediately.
*/
pub fn poll_until<C, T>(
    clock: &C,
    bound: Duration,
    timeout: Error,
    mut poll: impl FnMut() -> Result<Option<T>>,
) -> Result<T>
where C: Clock + ?Sized
{
    let bound = millis(bound);
    let start = clock.now_ms();
    loop {
        if let Some(value) = poll()?
            {return Ok(value)}
        if clock.elapsed_ms(start) >= bound
            {return Err(timeout)}
        clock.relax();
    }
}
