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

//! The timer used between attempts.
//!
//! The setup loop never calls `tokio::time::sleep()` directly, it waits on a
//! [Sleep] implementation. The default, [TokioSleep], uses the Tokio timer,
//! which tests can pause and advance with `#[tokio::test(start_paused = true)]`.
//! Tests that need to observe each requested delay can provide their own
//! implementation.

use std::time::Duration;

/// Waits for a given amount of time.
#[async_trait::async_trait]
pub trait Sleep: std::fmt::Debug + Send + Sync {
    /// Returns after `delay` has elapsed.
    async fn sleep(&self, delay: Duration);
}

/// Sleeps using the Tokio timer.
#[derive(Clone, Debug, Default)]
pub struct TokioSleep;

#[async_trait::async_trait]
impl Sleep for TokioSleep {
    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await
    }
}
