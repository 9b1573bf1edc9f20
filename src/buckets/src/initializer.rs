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

//! Runs the bucket setup in the background.
//!
//! A [BucketInitializer] owns one attempt sequence. [start] spawns a task that
//! applies the schema, retrying transient failures with backoff, and publishes
//! the outcome on a [watch] channel. Any number of listeners can
//! [subscribe][BucketInitializer::subscribe] or [wait][BucketInitializer::wait]
//! for the outcome, before or after it is known.
//!
//! The task publishes exactly one terminal state: [InitState::Done] or
//! [InitState::Failed]. If the task stops without an outcome, for example
//! because the storage adapter panicked or the runtime shut down, the
//! initializer reports an [aborted][Error::is_aborted] error.
//!
//! [start]: BucketInitializer::start
//! [watch]: tokio::sync::watch

use crate::Result;
use crate::backoff::{Backoff, BackoffEvent};
use crate::config::{self, SetupConfig};
use crate::error::Error;
use crate::schema::Schema;
use crate::setup_loop::setup_loop;
use crate::sleep::Sleep;
use crate::storage::StorageAdapter;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// The state of a [BucketInitializer].
#[derive(Clone, Debug)]
pub enum InitState {
    /// The initializer was not started.
    Idle,
    /// The setup task is applying the schema, or waiting to retry.
    Running,
    /// All the buckets are ready.
    Done {
        /// The number of attempts made, including the successful one.
        attempts: u32,
    },
    /// The setup failed, and will not be retried.
    Failed(Error),
}

impl InitState {
    /// Returns true for [Done][InitState::Done] and
    /// [Failed][InitState::Failed].
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Failed(_))
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// The number of attempts made, once the outcome is known.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Self::Done { attempts } => Some(*attempts),
            Self::Failed(e) => Some(e.attempts()),
            Self::Idle | Self::Running => None,
        }
    }
}

/// Creates the storage buckets, retrying transient failures.
///
/// # Example
/// ```
/// # use std::sync::Arc;
/// # use vmapi_buckets::config::SetupConfig;
/// # use vmapi_buckets::initializer::*;
/// # use vmapi_buckets::memory::{MemoryStorage, MemoryStorageError};
/// # use vmapi_buckets::schema::Schema;
/// # tokio_test::block_on(async {
/// let storage = MemoryStorage::new();
/// storage.fail_next(1, MemoryStorageError::Unavailable);
/// let mut initializer = BucketInitializer::from_config(&SetupConfig::default())?
///     .with_backoff_listener(|e| println!("retry {} in {:?}", e.attempt, e.delay));
/// initializer.start(Arc::new(storage.clone()), Schema::vmapi_default())?;
/// initializer.wait().await?;
/// assert_eq!(storage.calls(), 2);
/// # Ok::<(), anyhow::Error>(()) });
/// ```
#[derive(Debug)]
pub struct BucketInitializer {
    backoff: Option<Backoff>,
    sender: Option<watch::Sender<InitState>>,
    receiver: watch::Receiver<InitState>,
    cancel: CancellationToken,
    span: tracing::Span,
}

impl BucketInitializer {
    /// Creates an idle initializer using `backoff` between attempts.
    pub fn new(backoff: Backoff) -> Self {
        let (sender, receiver) = watch::channel(InitState::Idle);
        Self {
            backoff: Some(backoff),
            sender: Some(sender),
            receiver,
            cancel: CancellationToken::new(),
            span: tracing::info_span!("bucket_setup"),
        }
    }

    /// Creates an idle initializer from the service configuration.
    pub fn from_config(config: &SetupConfig) -> std::result::Result<Self, config::Error> {
        Ok(Self::new(config.backoff()?))
    }

    /// Stops the setup when `token` is cancelled.
    ///
    /// Cancellation takes effect before the next attempt, or while waiting
    /// to retry. An attempt in progress always completes.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Runs the setup task inside `span`.
    ///
    /// By default the task runs in an `INFO` span named `bucket_setup`.
    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.span = span;
        self
    }

    /// Calls `f` each time a retry is scheduled.
    pub fn with_backoff_listener<F>(mut self, f: F) -> Self
    where
        F: Fn(&BackoffEvent) + Send + Sync + 'static,
    {
        self.backoff = self.backoff.map(|b| b.with_listener(f));
        self
    }

    /// Replaces the timer used between attempts.
    pub fn with_sleep<S: Sleep + 'static>(mut self, v: S) -> Self {
        self.backoff = self.backoff.map(|b| b.with_sleep(v));
        self
    }

    /// Starts the setup task.
    ///
    /// Returns immediately, the outcome is reported via [wait][Self::wait] and
    /// [subscribe][Self::subscribe]. Fails if the initializer was already
    /// started. Must be called from within a Tokio runtime.
    pub fn start<S>(&mut self, adapter: Arc<dyn StorageAdapter>, schema: S) -> Result<()>
    where
        S: Into<Arc<Schema>>,
    {
        let (Some(mut backoff), Some(sender)) = (self.backoff.take(), self.sender.take()) else {
            return Err(Error::already_started());
        };
        let schema = schema.into();
        let cancel = self.cancel.clone();
        sender.send_replace(InitState::Running);
        let reporter = Reporter(sender);
        let task = async move {
            tracing::info!(buckets = schema.len(), "starting bucket setup");
            let result = setup_loop(adapter.as_ref(), &schema, &mut backoff, &cancel).await;
            reporter.finish(result);
        };
        tokio::spawn(task.instrument(self.span.clone()));
        Ok(())
    }

    /// The current state.
    pub fn state(&self) -> InitState {
        self.receiver.borrow().clone()
    }

    /// The number of attempts made against the storage backend, once the
    /// outcome is known.
    pub fn attempts(&self) -> Option<u32> {
        self.receiver.borrow().attempts()
    }

    /// Returns a receiver for state changes.
    ///
    /// The receiver sees the current state immediately, so subscribing after
    /// the outcome is known still observes it.
    pub fn subscribe(&self) -> watch::Receiver<InitState> {
        self.receiver.clone()
    }

    /// Waits for the outcome of the setup.
    ///
    /// Returns immediately if the outcome is already known. Waits forever if
    /// the initializer is never started.
    pub async fn wait(&self) -> Result<()> {
        wait_for(self.subscribe()).await
    }

    /// Requests cancellation of the setup.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

/// Waits until `receiver` observes a terminal state.
pub async fn wait_for(mut receiver: watch::Receiver<InitState>) -> Result<()> {
    let state = receiver
        .wait_for(InitState::is_terminal)
        .await
        .map(|s| InitState::clone(&s));
    match state {
        Ok(InitState::Done { .. }) => Ok(()),
        Ok(InitState::Failed(e)) => Err(e),
        Ok(s) => Err(Error::aborted(format!("unexpected state {s:?}"))),
        Err(e) => Err(Error::aborted(e)),
    }
}

/// Publishes the terminal state exactly once.
struct Reporter(watch::Sender<InitState>);

impl Reporter {
    fn finish(self, result: Result<u32>) {
        let state = match result {
            Ok(attempts) => InitState::Done { attempts },
            Err(e) => InitState::Failed(e),
        };
        self.publish(state);
    }

    fn publish(&self, state: InitState) {
        self.0.send_if_modified(|current| {
            if current.is_terminal() {
                return false;
            }
            *current = state;
            true
        });
    }
}

impl Drop for Reporter {
    fn drop(&mut self) {
        if !self.0.borrow().is_terminal() {
            tracing::error!("bucket setup task stopped without an outcome");
            self.publish(InitState::Failed(Error::aborted(
                "the setup task stopped before completing",
            )));
        }
    }
}
