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

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;

#[cfg(feature = "log-integration-tests")]
const DEFAULT_DIRECTIVES: &str = "warn,vmapi_buckets=debug";
#[cfg(not(feature = "log-integration-tests"))]
const DEFAULT_DIRECTIVES: &str = "warn";

/// Prints the logs of the current thread to the test output.
///
/// `RUST_LOG` overrides the filter. Without it, only warnings and errors are
/// printed, unless the `log-integration-tests` feature is enabled, which also
/// prints the `vmapi_buckets` debug logs.
///
/// Tests using the current thread runtime also print the logs of spawned
/// tasks.
pub fn enable_tracing() -> ::tracing::subscriber::DefaultGuard {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));
    let subscriber = tracing_subscriber::registry().with(filter).with(
        tracing_subscriber::fmt::layer()
            .with_test_writer()
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE),
    );
    tracing::subscriber::set_default(subscriber)
}
