//! Deadlines, cancellation and the clock every polling loop sleeps on.
//!
//! All blocking in this crate happens in `poll_until`: it checks a condition,
//! sleeps a small increment through the [`Clock`], and gives up when the
//! [`Deadline`] passes or the [`CancelToken`] fires. Swapping the clock for a
//! [`ManualClock`] makes the loops deterministic in tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::Error;

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// A clock that only moves when somebody sleeps on it.
///
/// Each `sleep` advances virtual time by the full duration but yields the
/// real thread for at most `real_slice`, so background threads (the receive
/// loop) still make progress while a 2 s SDO timeout elapses in a few
/// milliseconds of wall time.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
    real_slice: Duration,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::with_real_slice(Duration::from_millis(1))
    }

    pub fn with_real_slice(real_slice: Duration) -> Self {
        ManualClock { now: Mutex::new(Instant::now()), real_slice }
    }

    pub fn advance(&self, duration: Duration) {
        *self.now.lock() += duration;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
        std::thread::sleep(duration.min(self.real_slice));
    }
}

/// Shared flag an external shutdown sequence flips to abort in-progress waits.
#[derive(Debug, Default, Clone)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Re-arms the token, e.g. before a supervisor reconnects.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A monotonic point in time on a given clock, plus the cancel token that can
/// cut the wait short.
#[derive(Clone)]
pub struct Deadline {
    clock: Arc<dyn Clock>,
    at: Instant,
    timeout: Duration,
    cancel: CancelToken,
}

impl Deadline {
    pub fn after(clock: Arc<dyn Clock>, timeout: Duration, cancel: CancelToken) -> Self {
        let at = clock.now() + timeout;
        Deadline { clock, at, timeout, cancel }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_expired(&self) -> bool {
        self.clock.now() >= self.at
    }

    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(self.clock.now())
    }

    /// A deadline `timeout` from now that never ends after this one.
    pub fn within(&self, timeout: Duration) -> Deadline {
        Deadline::after(self.clock.clone(), timeout.min(self.remaining()), self.cancel.clone())
    }

    /// `Cancelled` or `Timeout` if the wait has to stop now.
    pub fn check(&self) -> Result<(), Error> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if self.is_expired() {
            return Err(Error::Timeout(self.timeout));
        }
        Ok(())
    }

    /// Sleeps `step` (clipped to what is left), then re-checks.
    pub fn sleep(&self, step: Duration) -> Result<(), Error> {
        self.check()?;
        self.clock.sleep(step.min(self.remaining()).max(Duration::from_micros(1)));
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    /// Calls `probe` every `interval` until it yields a value, the deadline
    /// passes or the wait is cancelled. The probe runs at least once.
    pub fn poll_until<T, P>(&self, interval: Duration, mut probe: P) -> Result<T, Error>
    where
        P: FnMut() -> Result<Option<T>, Error>,
    {
        loop {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if let Some(value) = probe()? {
                return Ok(value);
            }
            self.check()?;
            self.sleep(interval)?;
        }
    }
}

/// Sleeps for `duration` on `clock`, waking early with `Cancelled`.
pub fn pause(clock: &Arc<dyn Clock>, cancel: &CancelToken, duration: Duration) -> Result<(), Error> {
    let deadline = Deadline::after(clock.clone(), duration, cancel.clone());
    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if deadline.is_expired() {
            return Ok(());
        }
        clock.sleep(deadline.remaining().min(Duration::from_millis(10)));
    }
}
