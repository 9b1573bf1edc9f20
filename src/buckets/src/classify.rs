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

//! Classifies storage errors as transient or permanent.
//!
//! There are no built-in rules: the decision is delegated to
//! [StorageAdapter::is_transient_error]. If the adapter cannot make a
//! decision, because it does not recognize the error or because it panics,
//! the error is classified as permanent. An unknown condition stops the setup
//! instead of retrying forever.

use crate::storage::{StorageAdapter, StorageError};
use std::panic::AssertUnwindSafe;

/// The classification of a storage error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// The error is expected to go away on retry.
    Transient,
    /// The error will not go away on retry.
    Permanent,
}

impl ErrorClass {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient)
    }

    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent)
    }
}

/// Classifies `error` using `adapter`, failing closed.
pub fn classify<A>(adapter: &A, error: &StorageError) -> ErrorClass
where
    A: StorageAdapter + ?Sized,
{
    match std::panic::catch_unwind(AssertUnwindSafe(|| adapter.is_transient_error(error))) {
        Ok(Some(true)) => ErrorClass::Transient,
        Ok(Some(false)) => ErrorClass::Permanent,
        Ok(None) => {
            tracing::warn!(
                error = %error,
                "storage adapter cannot classify the error, treating it as permanent"
            );
            ErrorClass::Permanent
        }
        Err(_) => {
            tracing::warn!(
                error = %error,
                "storage adapter panicked while classifying the error, treating it as permanent"
            );
            ErrorClass::Permanent
        }
    }
}
