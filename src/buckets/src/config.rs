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

//! Configuration for the bucket setup.
//!
//! The VM API service configuration carries the setup parameters under the
//! `bucketsSetup` key:
//!
//! ```json
//! { "bucketsSetup": { "maxAttempts": 10, "initialDelayMs": 10, "maxDelayMs": 5000 } }
//! ```
//!
//! All fields are optional. Without `maxAttempts` the setup retries until it
//! succeeds or fails permanently.

use crate::backoff::Backoff;
use crate::exponential_backoff::{self, ExponentialBackoffBuilder};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The key holding [SetupConfig] in the service configuration.
pub const SERVICE_CONFIG_KEY: &str = "bucketsSetup";

/// The error type for configuration loading.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("cannot parse the bucket setup configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid backoff configuration: {0}")]
    Backoff(#[from] exponential_backoff::Error),
}

/// Parameters of the bucket setup retry loop.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SetupConfig {
    /// The maximum number of attempts, including the first one. Unbounded
    /// when not set. Zero behaves like one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    /// The delay before the first retry, in milliseconds.
    pub initial_delay_ms: u64,
    /// The ceiling for any retry delay, in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for SetupConfig {
    fn default() -> Self {
        Self {
            max_attempts: None,
            initial_delay_ms: exponential_backoff::DEFAULT_INITIAL_DELAY.as_millis() as u64,
            max_delay_ms: exponential_backoff::DEFAULT_MAXIMUM_DELAY.as_millis() as u64,
        }
    }
}

impl SetupConfig {
    /// Parses the configuration from a JSON object.
    ///
    /// # Example
    /// ```
    /// # use vmapi_buckets::config::*;
    /// let config = SetupConfig::from_json(r#"{"maxAttempts": 3}"#)?;
    /// assert_eq!(config.max_attempts, Some(3));
    /// assert_eq!(config.initial_delay_ms, 10);
    /// # Ok::<(), Error>(())
    /// ```
    pub fn from_json(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }

    /// Parses the configuration from a JSON value.
    pub fn from_value(value: serde_json::Value) -> Result<Self, Error> {
        Ok(serde_json::from_value(value)?)
    }

    /// Extracts the configuration from the full service configuration.
    ///
    /// Returns the defaults if the service configuration has no
    /// `bucketsSetup` key.
    pub fn from_service_config(service: &serde_json::Value) -> Result<Self, Error> {
        match service.get(SERVICE_CONFIG_KEY) {
            None | Some(serde_json::Value::Null) => Ok(Self::default()),
            Some(v) => Self::from_value(v.clone()),
        }
    }

    /// Builds the retry schedule and attempt budget described by this
    /// configuration.
    ///
    /// Delays double on each retry.
    pub fn backoff(&self) -> Result<Backoff, Error> {
        let schedule = ExponentialBackoffBuilder::new()
            .with_initial_delay(Duration::from_millis(self.initial_delay_ms))
            .with_maximum_delay(Duration::from_millis(self.max_delay_ms))
            .with_scaling(exponential_backoff::DEFAULT_SCALING)
            .build()?;
        Ok(Backoff::new(schedule).set_max_attempts(self.max_attempts))
    }
}
