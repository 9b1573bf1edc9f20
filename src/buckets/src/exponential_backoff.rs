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

//! Truncated exponential backoff schedules.
//!
//! This module computes the delay before each retry of the bucket setup. The
//! delays grow by a constant factor and are capped at a maximum. There is no
//! jitter: a single process sets up its buckets, and the schedule must be
//! non-decreasing.
//!
//! The stateful engine that walks this schedule lives in [crate::backoff].

use std::time::Duration;

/// The default delay before the first retry.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(10);

/// The default cap on the delay between retries.
pub const DEFAULT_MAXIMUM_DELAY: Duration = Duration::from_millis(5000);

/// The default growth factor between consecutive delays.
pub const DEFAULT_SCALING: f64 = 2.0;

/// The error type for exponential backoff creation.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("the scaling value ({0}) should be >= 1.0")]
    InvalidScalingFactor(f64),
    #[error("the initial delay ({0:?}) should be greater than zero")]
    InvalidInitialDelay(Duration),
}

/// Builds [ExponentialBackoff] schedules.
#[derive(Clone, Debug)]
pub struct ExponentialBackoffBuilder {
    initial_delay: Duration,
    maximum_delay: Duration,
    scaling: f64,
}

impl ExponentialBackoffBuilder {
    /// Creates a builder with the default parameters.
    ///
    /// # Example
    /// ```
    /// # use vmapi_buckets::exponential_backoff::Error;
    /// # use vmapi_buckets::exponential_backoff::ExponentialBackoffBuilder;
    /// use std::time::Duration;
    ///
    /// let schedule = ExponentialBackoffBuilder::new()
    ///         .with_initial_delay(Duration::from_millis(100))
    ///         .with_maximum_delay(Duration::from_secs(5))
    ///         .with_scaling(4.0)
    ///         .build()?;
    /// # Ok::<(), Error>(())
    /// ```
    pub fn new() -> Self {
        Self {
            initial_delay: DEFAULT_INITIAL_DELAY,
            maximum_delay: DEFAULT_MAXIMUM_DELAY,
            scaling: DEFAULT_SCALING,
        }
    }

    /// Change the initial delay.
    pub fn with_initial_delay<V: Into<Duration>>(mut self, v: V) -> Self {
        self.initial_delay = v.into();
        self
    }

    /// Change the maximum delay.
    pub fn with_maximum_delay<V: Into<Duration>>(mut self, v: V) -> Self {
        self.maximum_delay = v.into();
        self
    }

    /// Change the scaling factor.
    pub fn with_scaling<V: Into<f64>>(mut self, v: V) -> Self {
        self.scaling = v.into();
        self
    }

    /// Creates a new exponential backoff schedule.
    ///
    /// An initial delay larger than the maximum delay is clamped to the
    /// maximum.
    ///
    /// # Example
    /// ```
    /// # use vmapi_buckets::exponential_backoff::Error;
    /// # use vmapi_buckets::exponential_backoff::ExponentialBackoffBuilder;
    /// use std::time::Duration;
    /// let schedule = ExponentialBackoffBuilder::new()
    ///     .with_initial_delay(Duration::from_secs(5))
    ///     .with_maximum_delay(Duration::from_secs(50))
    ///     .with_scaling(2.0)
    ///     .build()?;
    /// assert_eq!(schedule.delay(1), Duration::from_secs(5));
    /// assert_eq!(schedule.delay(2), Duration::from_secs(10));
    /// assert_eq!(schedule.delay(10), Duration::from_secs(50));
    /// # Ok::<(), Error>(())
    /// ```
    pub fn build(self) -> Result<ExponentialBackoff, Error> {
        if self.scaling.is_nan() || self.scaling < 1.0 {
            return Err(Error::InvalidScalingFactor(self.scaling));
        }
        if self.initial_delay.is_zero() {
            return Err(Error::InvalidInitialDelay(self.initial_delay));
        }
        Ok(ExponentialBackoff {
            initial_delay: std::cmp::min(self.initial_delay, self.maximum_delay),
            maximum_delay: self.maximum_delay,
            scaling: self.scaling,
        })
    }
}

impl Default for ExponentialBackoffBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Implements truncated exponential backoff.
#[derive(Clone, Debug, PartialEq)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    maximum_delay: Duration,
    scaling: f64,
}

impl ExponentialBackoff {
    /// The delay before retry number `attempt_count`, starting at 1.
    ///
    /// The first retry waits for the initial delay, each following retry
    /// waits `scaling` times longer, up to the maximum delay.
    pub fn delay(&self, attempt_count: u32) -> Duration {
        // Retry numbers start at 1, a zero is treated as the first retry.
        let exp = attempt_count.saturating_sub(1).min(i32::MAX as u32) as i32;
        let scaling = self.scaling.powi(exp);
        if scaling >= self.maximum_delay.div_duration_f64(self.initial_delay) {
            self.maximum_delay
        } else {
            // .mul_f64() cannot assert because (1) we guarantee scaling >= 1.0,
            // and (2) we just checked that
            //     self.initial_delay * scaling < maximum_delay.
            self.initial_delay.mul_f64(scaling)
        }
    }

    /// The delay before the first retry.
    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    /// The cap on any delay.
    pub fn maximum_delay(&self) -> Duration {
        self.maximum_delay
    }

    /// The growth factor between consecutive delays.
    pub fn scaling(&self) -> f64 {
        self.scaling
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            initial_delay: DEFAULT_INITIAL_DELAY,
            maximum_delay: DEFAULT_MAXIMUM_DELAY,
            scaling: DEFAULT_SCALING,
        }
    }
}
