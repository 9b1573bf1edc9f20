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

//! Storage bucket setup for the VM API service.
//!
//! Before the VM API can serve requests its storage buckets (and their
//! indexes) must exist. The storage backend is often unavailable while the
//! service boots, so the setup is retried with a bounded exponential backoff
//! until it succeeds, fails with an error that retrying cannot fix, or runs
//! out of attempts.
//!
//! The main types are:
//! - [BucketInitializer][initializer::BucketInitializer]: runs the setup as a
//!   background task and publishes its outcome to any number of listeners.
//! - [InitCoordinator][coordinator::InitCoordinator]: sequences a dependent
//!   step, such as data migrations, after a successful setup.
//! - [StorageAdapter][storage::StorageAdapter]: the contract a storage backend
//!   implements to be used by the initializer.
//! - [Backoff][backoff::Backoff]: the retry schedule and attempt budget.
//!
//! # Example
//! ```
//! use std::sync::Arc;
//! use vmapi_buckets::config::SetupConfig;
//! use vmapi_buckets::initializer::BucketInitializer;
//! use vmapi_buckets::memory::MemoryStorage;
//! use vmapi_buckets::schema::Schema;
//!
//! # tokio_test::block_on(async {
//! let config = SetupConfig::from_json(r#"{"maxAttempts": 5}"#)?;
//! let storage = MemoryStorage::new();
//! let mut initializer = BucketInitializer::from_config(&config)?;
//! initializer.start(Arc::new(storage.clone()), Schema::vmapi_default())?;
//! initializer.wait().await?;
//! assert!(storage.bucket("vmapi_vms").is_some());
//! # Ok::<(), anyhow::Error>(()) });
//! ```

pub mod backoff;
pub mod classify;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod exponential_backoff;
pub mod initializer;
pub mod memory;
pub mod retry_result;
pub mod schema;
mod setup_loop;
pub mod sleep;
pub mod storage;

/// The result type for bucket setup operations.
pub type Result<T> = std::result::Result<T, crate::error::Error>;
