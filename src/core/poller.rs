//! Timeout Poller: a bounded busy-wait.
//!
//! The loop spins without sleeping. Device budgets are often a millisecond or
//! less, and a sleep-based backoff would overshoot them.

use std::hint;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Result of one bounded poll.
#[derive(Debug, Clone, PartialEq)]
pub struct PollOutcome<T> {
    /// First non-empty predicate result, if any arrived within budget.
    pub result: Option<T>,
    /// Time from poll start to success, or to giving up.
    pub elapsed: Duration,
    pub cancelled: bool,
}

impl<T> PollOutcome<T> {
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1000.0
    }

    pub fn is_timeout(&self) -> bool {
        self.result.is_none() && !self.cancelled
    }
}

/// Shared flag that stops a cancellable poll early.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn reset(&self) {
        self.flag.store(false, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TimeoutPoller;

impl TimeoutPoller {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate `predicate(arg)` until it yields `Some` or `budget` elapses.
    ///
    /// The predicate runs at least once, so a reply already buffered is seen
    /// even with a zero budget.
    pub fn poll<A, T, F>(&self, predicate: F, arg: &mut A, budget: Duration) -> PollOutcome<T>
    where
        F: FnMut(&mut A) -> Option<T>,
    {
        self.run(predicate, arg, budget, None)
    }

    /// Same as [`poll`](Self::poll) but also returns as soon as `cancel` is set.
    pub fn poll_cancellable<A, T, F>(
        &self,
        predicate: F,
        arg: &mut A,
        budget: Duration,
        cancel: &CancelToken,
    ) -> PollOutcome<T>
    where
        F: FnMut(&mut A) -> Option<T>,
    {
        self.run(predicate, arg, budget, Some(cancel))
    }

    fn run<A, T, F>(
        &self,
        mut predicate: F,
        arg: &mut A,
        budget: Duration,
        cancel: Option<&CancelToken>,
    ) -> PollOutcome<T>
    where
        F: FnMut(&mut A) -> Option<T>,
    {
        let start = Instant::now();
        loop {
            if cancel.is_some_and(CancelToken::is_cancelled) {
                return PollOutcome {
                    result: None,
                    elapsed: start.elapsed(),
                    cancelled: true,
                };
            }
            if let Some(r) = predicate(arg) {
                return PollOutcome {
                    result: Some(r),
                    elapsed: start.elapsed(),
                    cancelled: false,
                };
            }
            let elapsed = start.elapsed();
            if elapsed >= budget {
                return PollOutcome {
                    result: None,
                    elapsed,
                    cancelled: false,
                };
            }
            hint::spin_loop();
        }
    }

    /// Spin for `duration` and return the time actually spent.
    pub fn spin_for(&self, duration: Duration) -> Duration {
        let start = Instant::now();
        while start.elapsed() < duration {
            hint::spin_loop();
        }
        start.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_predicate_times_out_near_budget() {
        let poller = TimeoutPoller::new();
        let budget = Duration::from_millis(15);
        let mut calls = 0u32;
        let out: PollOutcome<()> = poller.poll(
            |n: &mut u32| {
                *n += 1;
                None
            },
            &mut calls,
            budget,
        );

        assert!(out.is_timeout());
        assert!(out.elapsed >= budget);
        assert!(out.elapsed < budget + Duration::from_millis(50));
        assert!(calls > 1);
    }

    #[test]
    fn returns_early_result_with_its_elapsed_time() {
        let poller = TimeoutPoller::new();
        let ready_after = Duration::from_millis(5);
        let start = Instant::now();
        let mut unit = ();
        let out = poller.poll(
            |_: &mut ()| (start.elapsed() >= ready_after).then_some(42),
            &mut unit,
            Duration::from_millis(200),
        );

        assert_eq!(out.result, Some(42));
        // The poll clock starts a little after `start`.
        assert!(out.elapsed + Duration::from_millis(1) >= ready_after);
        assert!(out.elapsed < Duration::from_millis(100));
    }

    #[test]
    fn zero_budget_still_evaluates_once() {
        let poller = TimeoutPoller::new();
        let mut unit = ();
        let out = poller.poll(|_: &mut ()| Some("ready"), &mut unit, Duration::ZERO);
        assert_eq!(out.result, Some("ready"));
    }

    #[test]
    fn cancelled_poll_returns_before_budget() {
        let poller = TimeoutPoller::new();
        let token = CancelToken::new();
        let mut calls = 0u32;
        let out: PollOutcome<()> = poller.poll_cancellable(
            |n: &mut u32| {
                *n += 1;
                if *n == 3 {
                    token.cancel();
                }
                None
            },
            &mut calls,
            Duration::from_secs(5),
            &token,
        );

        assert!(out.cancelled);
        assert!(!out.is_timeout());
        assert!(out.elapsed < Duration::from_secs(1));
        assert_eq!(calls, 3);
    }

    #[test]
    fn spin_for_waits_at_least_duration() {
        let spent = TimeoutPoller::new().spin_for(Duration::from_millis(3));
        assert!(spent >= Duration::from_millis(3));
    }
}
