// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Adapter between a logging front end and a [`LoggingContext`].
//!
//! Front ends push events through [`ContextSink::emit`] and close the sink
//! when the host shuts down. Closing makes a final best-effort delivery: a
//! failure is reported on this crate's own `tracing` channel and never
//! reaches the host.

use crate::context::LoggingContext;
use crate::event::LogEvent;
use tracing::error;

pub struct ContextSink {
    context: LoggingContext,
}

impl ContextSink {
    #[must_use]
    pub fn new(context: LoggingContext) -> Self {
        Self { context }
    }

    pub fn emit(&mut self, event: impl Into<Option<LogEvent>>) {
        self.context.emit(event);
    }

    #[must_use]
    pub fn context(&self) -> &LoggingContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut LoggingContext {
        &mut self.context
    }

    /// Delivers pending logs with a blocking call, then disposes the context.
    pub fn close(mut self) {
        if let Err(e) = self.context.flush() {
            error!("REQUEST_LOGGER | Failed to flush request log on close: {e}");
        }
        self.context.dispose();
    }

    /// Delivers pending logs without blocking the executor, then disposes the
    /// context.
    pub async fn close_async(mut self) {
        if let Err(e) = self.context.flush_async().await {
            error!("REQUEST_LOGGER | Failed to flush request log on close: {e}");
        }
        self.context.dispose();
    }
}
