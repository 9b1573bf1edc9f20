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

use std::error::Error as StdError;
use std::sync::Arc;

/// A boxed error, used to carry causes of any type.
pub type BoxError = Box<dyn StdError + Send + Sync>;

type SharedError = Arc<dyn StdError + Send + Sync>;

/// The error reported when bucket setup does not complete.
///
/// Bucket setup fails for a small number of reasons: the storage backend
/// rejected the schema, the backend kept failing with transient errors until
/// the retry budget ran out, the setup was cancelled, or the setup was used
/// incorrectly. The coordinator may also report that the step depending on
/// the buckets failed.
///
/// Most applications just log the error and abort their startup. The
/// predicates on this type let the bootstrap code explain *why* setup failed,
/// and the [source][std::error::Error::source] holds the underlying cause.
///
/// The error is cheap to clone: every listener waiting on the same setup
/// receives a copy of the same error.
///
/// # Example
/// ```
/// use vmapi_buckets::error::Error;
/// fn report(e: &Error) {
///     if e.is_exhausted() {
///         println!("storage never became available after {} attempts: {e}", e.attempts());
///     } else if e.is_permanent() {
///         println!("storage rejected the bucket configuration: {e}");
///     } else {
///         println!("bucket setup did not complete: {e}");
///     }
/// }
/// ```
#[derive(Clone, Debug)]
pub struct Error {
    kind: ErrorKind,
    attempts: u32,
    source: Option<SharedError>,
}

impl Error {
    /// Creates an error representing a permanent rejection from the backend.
    ///
    /// # Example
    /// ```
    /// use std::error::Error as _;
    /// use vmapi_buckets::error::Error;
    /// let error = Error::permanent(1, "invalid index type");
    /// assert!(error.is_permanent());
    /// assert!(error.source().is_some());
    /// ```
    pub fn permanent<T: Into<BoxError>>(attempts: u32, source: T) -> Self {
        Self {
            kind: ErrorKind::Permanent,
            attempts,
            source: Some(Arc::from(source.into())),
        }
    }

    /// The storage backend rejected the schema and retrying cannot help.
    ///
    /// Errors the storage adapter cannot classify are also reported this way.
    ///
    /// # Troubleshooting
    ///
    /// The most common cause is a bucket configuration the backend considers
    /// structurally invalid, for example an unsupported index type. Inspect
    /// the [source][std::error::Error::source] for the backend's message.
    pub fn is_permanent(&self) -> bool {
        matches!(self.kind, ErrorKind::Permanent)
    }

    /// Creates an error representing an exhausted retry budget.
    ///
    /// The `source` is the last transient error returned by the backend.
    ///
    /// # Example
    /// ```
    /// use std::error::Error as _;
    /// use vmapi_buckets::error::Error;
    /// let error = Error::exhausted(5, "connection refused");
    /// assert!(error.is_exhausted());
    /// assert_eq!(error.attempts(), 5);
    /// assert!(error.source().is_some());
    /// ```
    pub fn exhausted<T: Into<BoxError>>(attempts: u32, source: T) -> Self {
        Self {
            kind: ErrorKind::Exhausted,
            attempts,
            source: Some(Arc::from(source.into())),
        }
    }

    /// The backend kept failing with transient errors until the configured
    /// maximum number of attempts was reached.
    ///
    /// # Troubleshooting
    ///
    /// The storage backend was unreachable or overloaded for longer than the
    /// retry budget allows. Either fix the backend, or raise `maxAttempts` (or
    /// leave it unset to retry indefinitely).
    pub fn is_exhausted(&self) -> bool {
        matches!(self.kind, ErrorKind::Exhausted)
    }

    /// Creates an error representing a cancelled setup.
    pub fn cancelled(attempts: u32) -> Self {
        Self {
            kind: ErrorKind::Cancelled,
            attempts,
            source: None,
        }
    }

    /// The setup was cancelled before it completed.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.kind, ErrorKind::Cancelled)
    }

    /// Creates an error representing a second call to `start()`.
    pub fn already_started() -> Self {
        Self {
            kind: ErrorKind::AlreadyStarted,
            attempts: 0,
            source: None,
        }
    }

    /// The initializer was started more than once.
    ///
    /// Initializers run a single attempt sequence. Create a new initializer to
    /// run a new sequence.
    pub fn is_already_started(&self) -> bool {
        matches!(self.kind, ErrorKind::AlreadyStarted)
    }

    /// Creates an error representing a failure in the step that runs after the
    /// buckets are ready.
    pub fn dependent<T: Into<BoxError>>(source: T) -> Self {
        Self {
            kind: ErrorKind::Dependent,
            attempts: 0,
            source: Some(Arc::from(source.into())),
        }
    }

    /// The buckets were set up, but the dependent step (for example, data
    /// migrations) failed.
    pub fn is_dependent(&self) -> bool {
        matches!(self.kind, ErrorKind::Dependent)
    }

    /// Creates an error representing a setup task that stopped without
    /// reporting an outcome.
    pub(crate) fn aborted<T: Into<BoxError>>(source: T) -> Self {
        Self {
            kind: ErrorKind::Aborted,
            attempts: 0,
            source: Some(Arc::from(source.into())),
        }
    }

    /// The setup task stopped without reporting an outcome, typically because
    /// it panicked or the runtime shut down.
    pub fn is_aborted(&self) -> bool {
        matches!(self.kind, ErrorKind::Aborted)
    }

    /// The number of attempts made against the storage backend.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.kind, &self.source) {
            (ErrorKind::Permanent, Some(e)) => write!(
                f,
                "bucket setup failed permanently on attempt {}: {e}",
                self.attempts
            ),
            (ErrorKind::Exhausted, Some(e)) => write!(
                f,
                "bucket setup retries exhausted after {} {}, last error: {e}",
                self.attempts,
                plural_attempts(self.attempts)
            ),
            (ErrorKind::Cancelled, _) => write!(
                f,
                "bucket setup cancelled after {} {}",
                self.attempts,
                plural_attempts(self.attempts)
            ),
            (ErrorKind::AlreadyStarted, _) => {
                write!(f, "bucket setup was already started on this initializer")
            }
            (ErrorKind::Dependent, Some(e)) => {
                write!(f, "buckets are ready, but the dependent step failed: {e}")
            }
            (ErrorKind::Aborted, Some(e)) => {
                write!(f, "bucket setup stopped without an outcome: {e}")
            }
            (_, None) => unreachable!("no constructor allows this"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &dyn std::error::Error)
    }
}

fn plural_attempts(n: u32) -> &'static str {
    if n == 1 { "attempt" } else { "attempts" }
}

/// The type of error held by an [Error] instance.
#[derive(Clone, Debug)]
enum ErrorKind {
    Permanent,
    Exhausted,
    Cancelled,
    AlreadyStarted,
    Dependent,
    Aborted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permanent() {
        let e = Error::permanent(1, "bad index");
        assert!(e.is_permanent(), "{e:?}");
        assert!(!e.is_exhausted(), "{e:?}");
        assert!(!e.is_cancelled(), "{e:?}");
        assert_eq!(e.attempts(), 1);
        let got = e.to_string();
        assert!(got.contains("permanently"), "{got}");
        assert!(got.contains("bad index"), "{got}");
        assert!(e.source().is_some(), "{e:?}");
    }

    #[test]
    fn exhausted() {
        let e = Error::exhausted(3, "connection refused");
        assert!(e.is_exhausted(), "{e:?}");
        assert!(!e.is_permanent(), "{e:?}");
        assert_eq!(e.attempts(), 3);
        let got = e.to_string();
        assert!(got.contains("exhausted after 3 attempts"), "{got}");
        assert!(got.contains("connection refused"), "{got}");
        let source = e.source().map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("connection refused"));
    }

    #[test]
    fn permanent_and_exhausted_messages_differ() {
        let p = Error::permanent(2, "boom").to_string();
        let x = Error::exhausted(2, "boom").to_string();
        assert_ne!(p, x);
    }

    #[test]
    fn single_attempt_messages() {
        let got = Error::exhausted(1, "unavailable").to_string();
        assert!(got.contains("after 1 attempt,"), "{got}");
        let got = Error::cancelled(1).to_string();
        assert!(got.ends_with("after 1 attempt"), "{got}");
        let got = Error::cancelled(0).to_string();
        assert!(got.ends_with("after 0 attempts"), "{got}");
    }

    #[test]
    fn cancelled() {
        let e = Error::cancelled(4);
        assert!(e.is_cancelled(), "{e:?}");
        assert_eq!(e.attempts(), 4);
        assert!(e.source().is_none(), "{e:?}");
        assert!(e.to_string().contains("cancelled"), "{e}");
    }

    #[test]
    fn already_started() {
        let e = Error::already_started();
        assert!(e.is_already_started(), "{e:?}");
        assert_eq!(e.attempts(), 0);
        assert!(e.source().is_none(), "{e:?}");
    }

    #[test]
    fn dependent() {
        let e = Error::dependent("migration 003 failed");
        assert!(e.is_dependent(), "{e:?}");
        assert!(e.to_string().contains("migration 003 failed"), "{e}");
    }

    #[test]
    fn aborted() {
        let e = Error::aborted("task panicked");
        assert!(e.is_aborted(), "{e:?}");
        assert!(e.source().is_some(), "{e:?}");
    }

    #[test]
    fn clone_shares_source() {
        let e = Error::exhausted(2, "unavailable");
        let c = e.clone();
        assert!(c.is_exhausted(), "{c:?}");
        assert_eq!(c.to_string(), e.to_string());
        let (a, b) = (e.source.as_ref(), c.source.as_ref());
        assert!(matches!((a, b), (Some(a), Some(b)) if Arc::ptr_eq(a, b)));
    }

    #[test]
    fn is_send_and_sync() {
        static_assertions::assert_impl_all!(Error: Clone, Send, Sync, std::error::Error);
    }
}
