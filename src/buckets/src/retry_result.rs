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

//! Retry loop control types.

use crate::backoff::Backoff;
use crate::classify::{ErrorClass, classify};
use crate::storage::{StorageAdapter, StorageError};

/// The decision taken after a failed attempt.
#[derive(Debug)]
pub enum RetryResult {
    /// The error is non-retryable, stop the loop.
    Permanent(StorageError),

    /// The error is retryable, but the attempt budget is spent.
    Exhausted(StorageError),

    /// The error was retryable, continue the loop.
    Continue(StorageError),
}

impl RetryResult {
    /// Decides what to do after `error`, without changing `backoff`.
    pub fn on_error<A>(adapter: &A, backoff: &Backoff, error: StorageError) -> Self
    where
        A: StorageAdapter + ?Sized,
    {
        match classify(adapter, &error) {
            ErrorClass::Permanent => Self::Permanent(error),
            ErrorClass::Transient if backoff.is_exhausted() => Self::Exhausted(error),
            ErrorClass::Transient => Self::Continue(error),
        }
    }
}
