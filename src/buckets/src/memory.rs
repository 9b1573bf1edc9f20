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

//! An in-memory storage backend.
//!
//! [MemoryStorage] keeps buckets in a map, and can be scripted to fail the
//! next calls with transient or permanent errors. It is used by the service in
//! standalone mode, and by tests of the setup sequence.
//!
//! Applying a schema follows the usual bucket rules: a missing bucket is
//! created, a bucket with an older version is updated, and a bucket with the
//! same or a newer version is left alone.

use crate::schema::{BucketSpec, IndexType, Schema};
use crate::storage::{StorageAdapter, StorageError};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// The errors returned by [MemoryStorage].
#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum MemoryStorageError {
    #[error("storage backend unavailable")]
    Unavailable,
    #[error("storage request timed out")]
    Timeout,
    #[error("storage backend overloaded")]
    Overloaded,
    #[error("invalid bucket configuration: {0}")]
    InvalidBucketConfig(String),
}

impl MemoryStorageError {
    /// Returns true if retrying the request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unavailable | Self::Timeout | Self::Overloaded => true,
            Self::InvalidBucketConfig(_) => false,
        }
    }
}

/// A change applied to a bucket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BucketChange {
    Created { name: String, version: u32 },
    Updated { name: String, from: u32, to: u32 },
    Unchanged { name: String, version: u32 },
}

/// An in-memory [StorageAdapter].
///
/// Clones share the same buckets and fault script.
///
/// # Example
/// ```
/// # use vmapi_buckets::memory::*;
/// # use vmapi_buckets::schema::Schema;
/// # use vmapi_buckets::storage::StorageAdapter;
/// # tokio_test::block_on(async {
/// let storage = MemoryStorage::new();
/// storage.fail_next(2, MemoryStorageError::Unavailable);
/// let schema = Schema::vmapi_default();
/// assert!(storage.apply_schema(&schema).await.is_err());
/// assert!(storage.apply_schema(&schema).await.is_err());
/// assert!(storage.apply_schema(&schema).await.is_ok());
/// assert_eq!(storage.calls(), 3);
/// # });
/// ```
#[derive(Clone, Debug, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    buckets: BTreeMap<String, BucketSpec>,
    faults: VecDeque<MemoryStorageError>,
    changes: Vec<BucketChange>,
    latency: Duration,
    calls: u32,
    in_flight: u32,
    max_in_flight: u32,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes each call to [apply_schema][StorageAdapter::apply_schema] take
    /// `v` before it completes.
    pub fn with_latency(self, v: Duration) -> Self {
        self.lock().latency = v;
        self
    }

    /// Fails the next `count` calls with `error`.
    ///
    /// Faults are queued after any faults already scripted.
    pub fn fail_next(&self, count: usize, error: MemoryStorageError) {
        let mut inner = self.lock();
        inner
            .faults
            .extend(std::iter::repeat_n(error, count));
    }

    /// Number of calls to [apply_schema][StorageAdapter::apply_schema].
    pub fn calls(&self) -> u32 {
        self.lock().calls
    }

    /// The largest number of calls ever in progress at the same time.
    pub fn max_concurrent_calls(&self) -> u32 {
        self.lock().max_in_flight
    }

    /// Returns the bucket named `name`, if it exists.
    pub fn bucket(&self, name: &str) -> Option<BucketSpec> {
        self.lock().buckets.get(name).cloned()
    }

    /// The names of all the buckets, in order.
    pub fn bucket_names(&self) -> Vec<String> {
        self.lock().buckets.keys().cloned().collect()
    }

    /// All the changes applied so far, in order.
    pub fn changes(&self) -> Vec<BucketChange> {
        self.lock().changes.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enter(&self) -> (InFlight<'_>, Duration, Option<MemoryStorageError>) {
        let mut inner = self.lock();
        inner.calls += 1;
        inner.in_flight += 1;
        inner.max_in_flight = std::cmp::max(inner.max_in_flight, inner.in_flight);
        let fault = inner.faults.pop_front();
        (InFlight(self), inner.latency, fault)
    }

    fn apply(&self, schema: &Schema) -> Result<(), MemoryStorageError> {
        check(schema)?;
        let mut inner = self.lock();
        for (_, spec) in schema.buckets() {
            let name = spec.name().to_string();
            let change = match inner.buckets.get(&name).map(BucketSpec::version) {
                None => BucketChange::Created {
                    name: name.clone(),
                    version: spec.version(),
                },
                Some(from) if from < spec.version() => BucketChange::Updated {
                    name: name.clone(),
                    from,
                    to: spec.version(),
                },
                Some(version) => BucketChange::Unchanged {
                    name: name.clone(),
                    version,
                },
            };
            tracing::debug!(bucket = %name, change = ?change, "applying bucket");
            if !matches!(change, BucketChange::Unchanged { .. }) {
                inner.buckets.insert(name, spec.clone());
            }
            inner.changes.push(change);
        }
        Ok(())
    }
}

/// Rejects schemas that no backend would accept.
fn check(schema: &Schema) -> Result<(), MemoryStorageError> {
    schema
        .validate()
        .map_err(|e| MemoryStorageError::InvalidBucketConfig(e.to_string()))?;
    for (_, spec) in schema.buckets() {
        let unique_array = spec.index().iter().find(|(_, i)| {
            i.unique() && matches!(i.kind(), IndexType::StringArray | IndexType::NumberArray)
        });
        if let Some((field, _)) = unique_array {
            return Err(MemoryStorageError::InvalidBucketConfig(format!(
                "bucket `{}` cannot have a unique index on array field `{field}`",
                spec.name()
            )));
        }
    }
    Ok(())
}

struct InFlight<'a>(&'a MemoryStorage);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut inner = self.0.lock();
        inner.in_flight = inner.in_flight.saturating_sub(1);
    }
}

#[async_trait::async_trait]
impl StorageAdapter for MemoryStorage {
    async fn apply_schema(&self, schema: &Schema) -> Result<(), StorageError> {
        let (_in_flight, latency, fault) = self.enter();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if let Some(e) = fault {
            return Err(e.into());
        }
        self.apply(schema)?;
        Ok(())
    }

    fn is_transient_error(&self, error: &StorageError) -> Option<bool> {
        error
            .downcast_ref::<MemoryStorageError>()
            .map(MemoryStorageError::is_transient)
    }
}
