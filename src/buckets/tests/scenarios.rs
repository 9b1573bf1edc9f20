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

//! End to end startup sequences: configuration, initializer, coordinator and
//! the in-memory storage backend, driven by a virtual clock.

#[cfg(test)]
mod test {
    use serde_json::json;
    use std::error::Error as _;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use vmapi_buckets::backoff::BackoffEvent;
    use vmapi_buckets::config::SetupConfig;
    use vmapi_buckets::coordinator::InitCoordinator;
    use vmapi_buckets::error::BoxError;
    use vmapi_buckets::initializer::BucketInitializer;
    use vmapi_buckets::memory::{MemoryStorage, MemoryStorageError};
    use vmapi_buckets::schema::Schema;
    use vmapi_test_utils::tracing::enable_tracing;

    type Result<T> = anyhow::Result<T>;
    type Events = Arc<Mutex<Vec<BackoffEvent>>>;

    fn initializer(service_config: serde_json::Value) -> Result<(BucketInitializer, Events)> {
        let config = SetupConfig::from_service_config(&service_config)?;
        let events = Events::default();
        let captured = events.clone();
        let initializer = BucketInitializer::from_config(&config)?
            .with_backoff_listener(move |e| captured.lock().unwrap().push(*e));
        Ok((initializer, events))
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_then_success() -> Result<()> {
        let _guard = enable_tracing();
        let storage = MemoryStorage::new();
        storage.fail_next(1, MemoryStorageError::Unavailable);
        storage.fail_next(1, MemoryStorageError::Timeout);
        let (mut initializer, events) = initializer(json!({}))?;

        initializer.start(Arc::new(storage.clone()), Schema::vmapi_default())?;
        initializer.wait().await?;

        assert_eq!(storage.calls(), 3);
        assert!(initializer.state().is_done());
        let delays: Vec<_> = events.lock().unwrap().iter().map(|e| e.delay).collect();
        assert_eq!(
            delays,
            vec![Duration::from_millis(10), Duration::from_millis(20)]
        );
        assert!(storage.bucket("vmapi_vms").is_some());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn always_transient_with_ceiling() -> Result<()> {
        let _guard = enable_tracing();
        let storage = MemoryStorage::new();
        storage.fail_next(100, MemoryStorageError::Overloaded);
        let (mut initializer, events) =
            initializer(json!({"bucketsSetup": {"maxAttempts": 2}}))?;

        initializer.start(Arc::new(storage.clone()), Schema::vmapi_default())?;
        let err = initializer.wait().await.expect_err("retries are exhausted");

        assert_eq!(storage.calls(), 2);
        assert!(err.is_exhausted(), "{err:?}");
        assert!(!err.is_permanent(), "{err:?}");
        assert_eq!(err.attempts(), 2);
        let source = err
            .source()
            .and_then(|e| e.downcast_ref::<MemoryStorageError>());
        assert_eq!(source, Some(&MemoryStorageError::Overloaded));
        assert_eq!(events.lock().unwrap().len(), 1);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_on_first_call() -> Result<()> {
        let _guard = enable_tracing();
        let storage = MemoryStorage::new();
        storage.fail_next(
            1,
            MemoryStorageError::InvalidBucketConfig("unsupported index type".into()),
        );
        let (mut initializer, events) = initializer(json!({}))?;
        let start = tokio::time::Instant::now();

        initializer.start(Arc::new(storage.clone()), Schema::vmapi_default())?;
        let err = initializer.wait().await.expect_err("permanent failure");

        assert_eq!(storage.calls(), 1);
        assert!(err.is_permanent(), "{err:?}");
        assert!(!err.is_exhausted(), "{err:?}");
        assert!(err.to_string().contains("unsupported index type"), "{err}");
        assert!(events.lock().unwrap().is_empty());
        assert_eq!(start.elapsed(), Duration::ZERO);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_schema_is_permanent() -> Result<()> {
        let _guard = enable_tracing();
        let storage = MemoryStorage::new();
        let schema = Schema::from_value(json!({
            "vm_role_tags": {
                "name": "vmapi_vm_role_tags",
                "schema": { "index": { "role_tags": { "type": "[string]", "unique": true } } }
            }
        }))?;
        let (mut initializer, _events) = initializer(json!({}))?;
        initializer.start(Arc::new(storage.clone()), schema)?;
        let err = initializer.wait().await.expect_err("permanent failure");
        assert!(err.is_permanent(), "{err:?}");
        assert!(storage.bucket_names().is_empty());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn dependent_waits_for_buckets() -> Result<()> {
        let _guard = enable_tracing();
        let storage = MemoryStorage::new();
        storage.fail_next(2, MemoryStorageError::Unavailable);
        let (initializer, _events) = initializer(json!({}))?;
        let coordinator = InitCoordinator::new(
            initializer,
            Arc::new(storage.clone()),
            Schema::vmapi_default(),
        );
        let invocations = AtomicU32::new(0);
        let calls_seen = coordinator
            .run(async || {
                invocations.fetch_add(1, Ordering::SeqCst);
                Ok::<_, BoxError>(storage.calls())
            })
            .await?;
        assert_eq!(invocations.load(Ordering::SeqCst), 1);
        assert_eq!(calls_seen, 3);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn dependent_skipped_on_error() -> Result<()> {
        let _guard = enable_tracing();
        let storage = MemoryStorage::new();
        storage.fail_next(10, MemoryStorageError::Unavailable);
        let (initializer, _events) = initializer(json!({"bucketsSetup": {"maxAttempts": 3}}))?;
        let coordinator = InitCoordinator::new(
            initializer,
            Arc::new(storage.clone()),
            Schema::vmapi_default(),
        );
        let invocations = AtomicU32::new(0);
        let err = coordinator
            .run(async || {
                invocations.fetch_add(1, Ordering::SeqCst);
                Ok::<_, BoxError>(())
            })
            .await
            .expect_err("setup fails");
        assert!(err.is_exhausted(), "{err:?}");
        assert_eq!(invocations.load(Ordering::SeqCst), 0);
        assert_eq!(storage.calls(), 3);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn restart_reuses_existing_buckets() -> Result<()> {
        let _guard = enable_tracing();
        let storage = MemoryStorage::new();
        for _ in 0..2 {
            let (mut initializer, _events) = initializer(json!({}))?;
            initializer.start(Arc::new(storage.clone()), Schema::vmapi_default())?;
            initializer.wait().await?;
        }
        let created = storage
            .changes()
            .into_iter()
            .filter(|c| matches!(c, vmapi_buckets::memory::BucketChange::Created { .. }))
            .count();
        assert_eq!(created, 4);
        assert_eq!(storage.changes().len(), 8);
        Ok(())
    }
}
