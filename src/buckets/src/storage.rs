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

//! The contract between bucket setup and a storage backend.
//!
//! The setup loop knows nothing about the backend. It calls
//! [StorageAdapter::apply_schema] until it succeeds, and asks
//! [StorageAdapter::is_transient_error] whether each failure is worth retrying.
//! Only the adapter knows which of its errors represent connectivity problems,
//! timeouts or overload, and which represent a bucket configuration the
//! backend will never accept.

use crate::error::BoxError;
use crate::schema::Schema;

/// The error type returned by storage adapters.
pub type StorageError = BoxError;

/// Applies a [Schema] to a storage backend.
///
/// # Example
/// ```
/// # use vmapi_buckets::schema::Schema;
/// # use vmapi_buckets::storage::*;
/// #[derive(Debug)]
/// struct AlwaysReady;
///
/// #[async_trait::async_trait]
/// impl StorageAdapter for AlwaysReady {
///     async fn apply_schema(&self, _schema: &Schema) -> Result<(), StorageError> {
///         Ok(())
///     }
///     fn is_transient_error(&self, _error: &StorageError) -> Option<bool> {
///         Some(false)
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait StorageAdapter: std::fmt::Debug + Send + Sync {
    /// Creates or updates the buckets described by `schema`.
    ///
    /// Implementations must be idempotent: the setup loop calls this function
    /// again with the same schema after a transient failure, and the previous
    /// call may have partially succeeded.
    async fn apply_schema(&self, schema: &Schema) -> Result<(), StorageError>;

    /// Classifies an error returned by [apply_schema][Self::apply_schema].
    ///
    /// Returns `Some(true)` if the error is transient and the call should be
    /// retried, `Some(false)` if the error is permanent, and `None` if the
    /// adapter does not recognize the error. Unrecognized errors are treated as
    /// permanent.
    ///
    /// This function must not block.
    fn is_transient_error(&self, error: &StorageError) -> Option<bool>;
}
