// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # Request Logger
//!
//! A per-unit-of-work logging context. A [`context::LoggingContext`] collects
//! log events, exceptions and ad-hoc file attachments while one HTTP request,
//! console run or job executes, then ships them as a single payload to a
//! remote intake endpoint.
//!
//! ## Lifecycle
//!
//! ```text
//!   ┌─────────┐   emit / log_as_file   ┌──────────────┐
//!   │  Fresh  │ ─────────────────────> │ Accumulating │
//!   └─────────┘                        └──────┬───────┘
//!        ^                                    │ flush / flush_async
//!        │            reset                   v
//!        └─────────────────────────────  ┌──────────┐
//!                                        │ Flushing │
//!                                        └──────────┘
//! ```
//!
//! The same context is reused across units of work: every flush resets the
//! buffers and starts a new generation, whether or not delivery succeeded.
//!
//! ## Modules
//!
//! - [`context`]: the stateful accumulator and its lifecycle
//! - [`exceptions`]: generation-scoped exception deduplication
//! - [`attachments`]: temporary-file backed attachments
//! - [`transport`]: JSON / multipart body construction and delivery
//! - [`payload`]: the wire model
//! - [`provider`]: request/response metadata supplied by the host
//! - [`sink`]: adapter used by logging front ends
//! - [`config`] and [`error`]: configuration and error taxonomy

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod attachments;
pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod exceptions;
pub mod host;
pub mod payload;
pub mod provider;
pub mod sink;
pub mod transport;

pub use config::{ApiKey, SinkConfig};
pub use context::{LoggingContext, PendingBatch};
pub use error::{ConfigError, TransportError};
pub use event::{LogEvent, LogLevel};
pub use provider::{ConsoleRequestInfo, RequestInfoProvider};
pub use sink::ContextSink;

/// Runs a fallible best-effort step, discarding its failure.
///
/// Used wherever a side channel (attachment files, enrichment hooks, final
/// flushes) must never fail the primary operation. The failure is reported
/// on the crate's own `tracing` channel only.
pub(crate) fn best_effort<T, E: std::fmt::Display>(what: &str, result: Result<T, E>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::debug!("REQUEST_LOGGER | {what} failed, ignoring: {e}");
            None
        }
    }
}
