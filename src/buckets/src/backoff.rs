// Copyright 2026 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The backoff engine used between bucket setup attempts.
//!
//! Retry strategies should avoid immediately retrying a request, as the
//! storage backend may need time to recover. [Backoff] walks an
//! [ExponentialBackoff] schedule: each call to [Backoff::backoff] waits for the
//! current delay and then grows the delay for the next call, up to the
//! maximum. If a maximum number of attempts is configured, the engine reports
//! [BackoffSignal::Exhausted] instead of waiting once the budget is spent.
//!
//! # Example
//! ```
//! # use vmapi_buckets::backoff::*;
//! # use vmapi_buckets::exponential_backoff::ExponentialBackoffBuilder;
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let schedule = ExponentialBackoffBuilder::new()
//!     .with_initial_delay(Duration::from_millis(1))
//!     .with_maximum_delay(Duration::from_millis(4))
//!     .build()?;
//! let mut backoff = Backoff::new(schedule).with_max_attempts(2);
//! // The first attempt already ran and failed, one retry is left.
//! assert!(matches!(backoff.backoff().await, BackoffSignal::Ready(_)));
//! assert!(matches!(backoff.backoff().await, BackoffSignal::Exhausted { attempts: 2 }));
//! # Ok::<(), vmapi_buckets::exponential_backoff::Error>(())
//! # });
//! ```
//!
//! [ExponentialBackoff]: crate::exponential_backoff::ExponentialBackoff

use crate::exponential_backoff::ExponentialBackoff;
use crate::sleep::{Sleep, TokioSleep};
use std::sync::Arc;
use std::time::Duration;

/// Reports a scheduled retry.
///
/// This is an observability event, for logging and metrics. It does not
/// control the retry loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub struct BackoffEvent {
    /// The retry number, starting at 1 for the first retry.
    pub attempt: u32,
    /// How long the engine waits before the retry.
    pub delay: Duration,
}

impl BackoffEvent {
    pub fn new(attempt: u32, delay: Duration) -> Self {
        Self { attempt, delay }
    }
}

/// The outcome of [Backoff::backoff].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackoffSignal {
    /// The delay has elapsed, make the next attempt.
    Ready(BackoffEvent),
    /// The attempt budget is spent, stop the loop.
    Exhausted {
        /// The total number of attempts allowed, and made.
        attempts: u32,
    },
}

/// A callback receiving each [BackoffEvent].
pub type BackoffListener = Arc<dyn Fn(&BackoffEvent) + Send + Sync>;

/// Walks an exponential schedule with an optional attempt budget.
///
/// The engine counts *retries*. The first attempt of a loop never waits, so
/// with `max_attempts = N` the engine grants `N - 1` retries and reports
/// [BackoffSignal::Exhausted] when asked for retry number `N`.
pub struct Backoff {
    schedule: ExponentialBackoff,
    max_attempts: Option<u32>,
    retries: u32,
    sleep: Arc<dyn Sleep>,
    listener: Option<BackoffListener>,
}

impl Backoff {
    /// Creates an engine with no attempt budget, sleeping with the Tokio timer.
    pub fn new(schedule: ExponentialBackoff) -> Self {
        Self {
            schedule,
            max_attempts: None,
            retries: 0,
            sleep: Arc::new(TokioSleep),
            listener: None,
        }
    }

    /// Limits the total number of attempts, including the first one.
    ///
    /// A value of zero is treated as one: the first attempt always runs.
    pub fn with_max_attempts(mut self, v: u32) -> Self {
        self.max_attempts = Some(std::cmp::max(v, 1));
        self
    }

    /// Sets or clears the attempt budget.
    pub fn set_max_attempts(mut self, v: Option<u32>) -> Self {
        self.max_attempts = v.map(|v| std::cmp::max(v, 1));
        self
    }

    /// Replaces the timer.
    pub fn with_sleep<S: Sleep + 'static>(self, v: S) -> Self {
        self.with_shared_sleep(Arc::new(v))
    }

    /// Replaces the timer with a shared implementation.
    pub fn with_shared_sleep(mut self, v: Arc<dyn Sleep>) -> Self {
        self.sleep = v;
        self
    }

    /// Receives a [BackoffEvent] each time a retry is scheduled.
    pub fn with_listener<F>(mut self, f: F) -> Self
    where
        F: Fn(&BackoffEvent) + Send + Sync + 'static,
    {
        self.listener = Some(Arc::new(f));
        self
    }

    /// Schedules the next retry.
    ///
    /// Reports the retry number and delay, then waits for the delay. Returns
    /// [BackoffSignal::Exhausted] immediately, without waiting, if the attempt
    /// budget is spent.
    pub async fn backoff(&mut self) -> BackoffSignal {
        let signal = self.next();
        if let BackoffSignal::Ready(event) = &signal {
            tracing::debug!(
                attempt = event.attempt,
                delay_ms = event.delay.as_millis() as u64,
                "scheduling bucket setup retry"
            );
            if let Some(listener) = &self.listener {
                listener(event);
            }
            self.sleep.sleep(event.delay).await;
        }
        signal
    }

    /// Advances the engine without waiting.
    pub(crate) fn next(&mut self) -> BackoffSignal {
        if let Some(max) = self.max_attempts.filter(|_| self.is_exhausted()) {
            return BackoffSignal::Exhausted { attempts: max };
        }
        self.retries = self.retries.saturating_add(1);
        let delay = self.schedule.delay(self.retries);
        BackoffSignal::Ready(BackoffEvent::new(self.retries, delay))
    }

    /// Returns true if the next call to [backoff][Backoff::backoff] would
    /// report [BackoffSignal::Exhausted].
    pub fn is_exhausted(&self) -> bool {
        // The first attempt is not a retry, it is counted here.
        self.max_attempts
            .is_some_and(|max| self.retries.saturating_add(1) >= max)
    }

    /// Returns the engine to its initial state.
    pub fn reset(&mut self) {
        self.retries = 0;
    }

    /// The number of retries scheduled since the last reset.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// The delay the next call to [backoff][Backoff::backoff] would wait for.
    pub fn current_delay(&self) -> Duration {
        self.schedule.delay(self.retries.saturating_add(1))
    }

    /// The attempt budget, if any.
    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }
}

impl std::fmt::Debug for Backoff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backoff")
            .field("schedule", &self.schedule)
            .field("max_attempts", &self.max_attempts)
            .field("retries", &self.retries)
            .field("sleep", &self.sleep)
            .field("listener", &self.listener.as_ref().map(|_| "Fn(&BackoffEvent)"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exponential_backoff::ExponentialBackoffBuilder;
    use std::sync::Mutex;
    use tokio::time::Instant;

    fn schedule() -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_delay(Duration::from_millis(10))
            .with_maximum_delay(Duration::from_millis(40))
            .build()
            .expect("hard-coded values are valid")
    }

    mockall::mock! {
        #[derive(Debug)]
        Sleep {}
        #[async_trait::async_trait]
        impl Sleep for Sleep {
            async fn sleep(&self, delay: Duration);
        }
    }

    #[test]
    fn unbounded_never_exhausts() {
        let mut backoff = Backoff::new(schedule());
        let delays = (0..100)
            .map(|_| match backoff.next() {
                BackoffSignal::Ready(e) => e.delay,
                BackoffSignal::Exhausted { .. } => panic!("unexpected exhaustion"),
            })
            .collect::<Vec<_>>();
        assert_eq!(delays[0], Duration::from_millis(10));
        assert_eq!(delays[1], Duration::from_millis(20));
        assert_eq!(delays[2], Duration::from_millis(40));
        assert!(delays[3..].iter().all(|d| *d == Duration::from_millis(40)));
        assert_eq!(backoff.retries(), 100);
    }

    #[test]
    fn attempts_start_at_one() {
        let mut backoff = Backoff::new(schedule());
        assert_eq!(
            backoff.next(),
            BackoffSignal::Ready(BackoffEvent::new(1, Duration::from_millis(10)))
        );
        assert_eq!(
            backoff.next(),
            BackoffSignal::Ready(BackoffEvent::new(2, Duration::from_millis(20)))
        );
    }

    #[test_case::test_case(1, 0; "single attempt")]
    #[test_case::test_case(2, 1; "one retry")]
    #[test_case::test_case(5, 4; "four retries")]
    fn budget(max_attempts: u32, want_retries: u32) {
        let mut backoff = Backoff::new(schedule()).with_max_attempts(max_attempts);
        for _ in 0..want_retries {
            assert!(!backoff.is_exhausted(), "{backoff:?}");
            assert!(matches!(backoff.next(), BackoffSignal::Ready(_)));
        }
        assert!(backoff.is_exhausted(), "{backoff:?}");
        assert_eq!(
            backoff.next(),
            BackoffSignal::Exhausted {
                attempts: max_attempts
            }
        );
        // Exhaustion is sticky.
        assert_eq!(
            backoff.next(),
            BackoffSignal::Exhausted {
                attempts: max_attempts
            }
        );
        assert_eq!(backoff.retries(), want_retries);
    }

    #[test]
    fn zero_budget_behaves_as_one() {
        let mut backoff = Backoff::new(schedule()).with_max_attempts(0);
        assert_eq!(backoff.max_attempts(), Some(1));
        assert_eq!(backoff.next(), BackoffSignal::Exhausted { attempts: 1 });

        let backoff = Backoff::new(schedule()).set_max_attempts(Some(0));
        assert_eq!(backoff.max_attempts(), Some(1));
        let backoff = backoff.set_max_attempts(None);
        assert_eq!(backoff.max_attempts(), None);
    }

    #[test]
    fn reset() {
        let mut backoff = Backoff::new(schedule()).with_max_attempts(3);
        assert!(matches!(backoff.next(), BackoffSignal::Ready(_)));
        assert!(matches!(backoff.next(), BackoffSignal::Ready(_)));
        assert_eq!(backoff.current_delay(), Duration::from_millis(40));
        assert!(matches!(backoff.next(), BackoffSignal::Exhausted { .. }));

        backoff.reset();
        assert_eq!(backoff.retries(), 0);
        assert_eq!(backoff.current_delay(), Duration::from_millis(10));
        assert_eq!(
            backoff.next(),
            BackoffSignal::Ready(BackoffEvent::new(1, Duration::from_millis(10)))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_waits_and_reports() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let captured = events.clone();
        let mut backoff = Backoff::new(schedule())
            .with_listener(move |e| captured.lock().expect("test lock").push(*e));

        let start = Instant::now();
        let signal = backoff.backoff().await;
        assert_eq!(
            signal,
            BackoffSignal::Ready(BackoffEvent::new(1, Duration::from_millis(10)))
        );
        assert_eq!(start.elapsed(), Duration::from_millis(10));

        let _ = backoff.backoff().await;
        assert_eq!(start.elapsed(), Duration::from_millis(30));

        let got = events.lock().expect("test lock").clone();
        assert_eq!(
            got,
            vec![
                BackoffEvent::new(1, Duration::from_millis(10)),
                BackoffEvent::new(2, Duration::from_millis(20)),
            ]
        );
    }

    #[tokio::test]
    async fn backoff_uses_injected_sleep() {
        let mut seq = mockall::Sequence::new();
        let mut sleep = MockSleep::new();
        for d in [10, 20, 40, 40] {
            sleep
                .expect_sleep()
                .once()
                .in_sequence(&mut seq)
                .withf(move |got| got == &Duration::from_millis(d))
                .return_const(());
        }
        let mut backoff = Backoff::new(schedule()).with_sleep(sleep);
        for _ in 0..4 {
            assert!(matches!(backoff.backoff().await, BackoffSignal::Ready(_)));
        }
    }

    #[tokio::test]
    async fn exhausted_does_not_sleep_or_report() {
        let sleep = MockSleep::new();
        let events = Arc::new(Mutex::new(0_u32));
        let captured = events.clone();
        let mut backoff = Backoff::new(schedule())
            .with_max_attempts(1)
            .with_sleep(sleep)
            .with_listener(move |_| *captured.lock().expect("test lock") += 1);
        assert_eq!(
            backoff.backoff().await,
            BackoffSignal::Exhausted { attempts: 1 }
        );
        assert_eq!(*events.lock().expect("test lock"), 0);
    }

    #[test]
    fn debug() {
        let backoff = Backoff::new(schedule()).with_listener(|_| {});
        let got = format!("{backoff:?}");
        assert!(got.contains("retries: 0"), "{got}");
        assert!(got.contains("Fn(&BackoffEvent)"), "{got}");
    }
}
