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

use crate::Result;
use crate::backoff::{Backoff, BackoffSignal};
use crate::error::Error;
use crate::retry_result::RetryResult;
use crate::schema::Schema;
use crate::storage::StorageAdapter;
use tokio_util::sync::CancellationToken;

/// Applies `schema` until it succeeds, fails permanently, or runs out of
/// attempts.
///
/// Attempts are strictly sequential: the next attempt starts only after the
/// previous one returned and the backoff delay elapsed. The first attempt
/// starts immediately.
///
/// `cancel` is checked before each attempt and while waiting for the backoff
/// delay. An attempt in progress is never interrupted.
///
/// Returns the number of attempts on success.
pub(crate) async fn setup_loop<A>(
    adapter: &A,
    schema: &Schema,
    backoff: &mut Backoff,
    cancel: &CancellationToken,
) -> Result<u32>
where
    A: StorageAdapter + ?Sized,
{
    let mut attempt = 0_u32;
    loop {
        if cancel.is_cancelled() {
            tracing::error!(attempts = attempt, "bucket setup cancelled");
            return Err(Error::cancelled(attempt));
        }
        attempt = attempt.saturating_add(1);
        tracing::debug!(attempt, buckets = schema.len(), "applying bucket schema");
        let error = match adapter.apply_schema(schema).await {
            Ok(()) => {
                tracing::info!(attempt, "bucket setup complete");
                backoff.reset();
                return Ok(attempt);
            }
            Err(e) => e,
        };
        match RetryResult::on_error(adapter, backoff, error) {
            RetryResult::Permanent(e) => {
                tracing::error!(attempt, error = %e, "bucket setup failed with a permanent error");
                backoff.reset();
                return Err(Error::permanent(attempt, e));
            }
            RetryResult::Exhausted(e) => {
                tracing::error!(
                    attempt,
                    error = %e,
                    "bucket setup giving up, retry budget exhausted"
                );
                return Err(Error::exhausted(attempt, e));
            }
            RetryResult::Continue(e) => {
                tracing::warn!(
                    attempt,
                    delay_ms = backoff.current_delay().as_millis() as u64,
                    error = %e,
                    "bucket setup attempt failed, will retry"
                );
                let signal = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    s = backoff.backoff() => Some(s),
                };
                match signal {
                    Some(BackoffSignal::Ready(_)) => {}
                    Some(BackoffSignal::Exhausted { .. }) => {
                        tracing::error!(
                            attempt,
                            error = %e,
                            "bucket setup giving up, retry budget exhausted"
                        );
                        return Err(Error::exhausted(attempt, e));
                    }
                    None => {
                        tracing::error!(attempts = attempt, "bucket setup cancelled");
                        return Err(Error::cancelled(attempt));
                    }
                }
            }
        }
    }
}
