//! Timeout-bounded polling against slow external systems.
//!
//! The supervisor and the notarization authority only report state
//! asynchronously, so every transition is confirmed by probing until the
//! desired state shows up, the schedule's timeout elapses, or the caller
//! cancels.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Longest single sleep between cancellation checks.
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Interval and overall bound for one polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollSchedule {
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

/// Caller-owned cancellation signal, optionally bounded by an absolute
/// deadline. Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that also counts as cancelled once `deadline` has passed.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Some(deadline),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
            || self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Sleep for `duration`, waking early on cancellation.
    ///
    /// Returns `false` if the token fired before the full duration elapsed.
    pub fn sleep(&self, duration: Duration) -> bool {
        let until = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= until {
                return true;
            }
            thread::sleep((until - now).min(SLEEP_SLICE));
        }
    }
}

/// Result of a polling loop that did not fail outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Ready(T),
    TimedOut { attempts: u32, elapsed: Duration },
    Cancelled { attempts: u32 },
}

/// Probe until `probe` yields `Some`, the schedule times out, or `cancel`
/// fires. The first probe runs immediately; `probe` receives the 1-based
/// attempt number. A probe error stops the loop and is returned as is.
pub fn poll_until<T, E>(
    schedule: PollSchedule,
    cancel: &CancelToken,
    mut probe: impl FnMut(u32) -> Result<Option<T>, E>,
) -> Result<PollOutcome<T>, E> {
    let started = Instant::now();
    let mut attempts = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Ok(PollOutcome::Cancelled { attempts });
        }

        attempts += 1;
        if let Some(value) = probe(attempts)? {
            return Ok(PollOutcome::Ready(value));
        }

        let elapsed = started.elapsed();
        if elapsed >= schedule.timeout {
            return Ok(PollOutcome::TimedOut { attempts, elapsed });
        }

        let remaining = schedule.timeout - elapsed;
        if !cancel.sleep(schedule.interval.min(remaining)) {
            return Ok(PollOutcome::Cancelled { attempts });
        }
    }
}
