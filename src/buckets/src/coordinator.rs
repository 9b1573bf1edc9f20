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

//! Sequences a dependent step after the bucket setup.
//!
//! Some startup work, such as data migrations, needs the buckets to exist. The
//! [InitCoordinator] runs that work once the setup completes, and never runs
//! it if the setup fails.

use crate::Result;
use crate::error::{BoxError, Error};
use crate::initializer::BucketInitializer;
use crate::schema::Schema;
use crate::storage::StorageAdapter;
use std::sync::Arc;

/// Runs the bucket setup, then a dependent step.
///
/// # Example
/// ```
/// # use std::sync::Arc;
/// # use vmapi_buckets::coordinator::InitCoordinator;
/// # use vmapi_buckets::config::SetupConfig;
/// # use vmapi_buckets::initializer::BucketInitializer;
/// # use vmapi_buckets::memory::MemoryStorage;
/// # use vmapi_buckets::schema::Schema;
/// # tokio_test::block_on(async {
/// let storage = MemoryStorage::new();
/// let initializer = BucketInitializer::from_config(&SetupConfig::default())?;
/// let coordinator = InitCoordinator::new(initializer, Arc::new(storage.clone()), Schema::vmapi_default());
/// let migrated = coordinator
///     .run(async || {
///         // Migrations can rely on the buckets.
///         assert!(storage.bucket("vmapi_vms").is_some());
///         Ok::<_, std::io::Error>(42)
///     })
///     .await?;
/// assert_eq!(migrated, 42);
/// # Ok::<(), anyhow::Error>(()) });
/// ```
#[derive(Debug)]
pub struct InitCoordinator {
    initializer: BucketInitializer,
    adapter: Arc<dyn StorageAdapter>,
    schema: Arc<Schema>,
}

impl InitCoordinator {
    pub fn new<S>(
        initializer: BucketInitializer,
        adapter: Arc<dyn StorageAdapter>,
        schema: S,
    ) -> Self
    where
        S: Into<Arc<Schema>>,
    {
        Self {
            initializer,
            adapter,
            schema: schema.into(),
        }
    }

    /// The initializer, for example to subscribe to its state.
    pub fn initializer(&self) -> &BucketInitializer {
        &self.initializer
    }

    /// Runs the setup, and then `dependent` if the setup succeeds.
    ///
    /// `dependent` runs at most once, and only after every bucket is ready.
    /// Setup errors are returned as-is. Errors from `dependent` are reported
    /// as [dependent][Error::is_dependent] errors.
    pub async fn run<F, T, E>(mut self, dependent: F) -> Result<T>
    where
        F: AsyncFnOnce() -> std::result::Result<T, E>,
        E: Into<BoxError>,
    {
        self.initializer
            .start(self.adapter.clone(), self.schema.clone())?;
        self.initializer.wait().await?;
        tracing::info!("buckets ready, running the dependent step");
        dependent().await.map_err(|e| {
            let e = Error::dependent(e);
            tracing::error!(error = %e, "dependent step failed");
            e
        })
    }
}
