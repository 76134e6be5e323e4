// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The per-unit-of-work logging context.
//!
//! A [`LoggingContext`] is created once per logical scope and reused for
//! every unit of work that scope runs. Each unit of work drives one cycle:
//!
//! 1. **Accumulate**: [`LoggingContext::emit`] and
//!    [`LoggingContext::log_as_file`] append to the current generation.
//! 2. **Snapshot**: [`LoggingContext::take_batch`] moves the buffers out into
//!    a [`PendingBatch`] and resets the context in the same step.
//! 3. **Deliver**: the batch is sent; its attachments are deleted once the
//!    send returns, whatever its outcome.
//!
//! [`LoggingContext::flush`] and [`LoggingContext::flush_async`] run steps
//! 2 and 3 together.
//!
//! # Generations
//!
//! Every reset starts a new generation with a fresh id, a fresh start time
//! and a fresh exception recorder, so nothing recorded for one unit of work
//! (in particular exception identities) leaks into the next.
//!
//! # Concurrency
//!
//! The context is single-writer: mutation takes `&mut self`. Hosts that share
//! one context between tasks wrap it in a mutex, call `take_batch` under the
//! lock and send the batch after releasing it. Events emitted after the
//! snapshot belong to the next generation.

use crate::attachments::{sanitize_file_name, Attachment};
use crate::best_effort;
use crate::config::{ApiKey, SinkConfig};
use crate::error::{ConfigError, TransportError};
use crate::event::{ErrorRef, LogEvent};
use crate::exceptions::ExceptionRecorder;
use crate::host::{default_integration_client, machine_name, IntegrationClient};
use crate::payload::{
    ExceptionEntry, HttpPropertiesPayload, LogEntry, RequestLogPayload, RequestPropertiesPayload,
    ResponsePropertiesPayload, UserPayload,
};
use crate::provider::RequestInfoProvider;
use crate::transport::{RequestBody, Transport};
use chrono::{DateTime, Utc};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;
use uuid::Uuid;

pub struct LoggingContext {
    id: Uuid,
    generation: u64,
    started_at: DateTime<Utc>,
    started: Instant,
    logs: Vec<LogEntry>,
    exceptions: ExceptionRecorder,
    attachments: Vec<Attachment>,
    api_key: ApiKey,
    config: SinkConfig,
    integration_client: IntegrationClient,
    provider: Arc<dyn RequestInfoProvider>,
    transport: Arc<Transport>,
}

impl LoggingContext {
    /// Builds a context ready for its first unit of work.
    ///
    /// The network client is created here and reused by every flush.
    pub fn new(
        api_key: ApiKey,
        config: SinkConfig,
        provider: Arc<dyn RequestInfoProvider>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let transport = Transport::new(&api_key, config.client_timeout)?;

        Ok(Self {
            id: Uuid::new_v4(),
            generation: 0,
            started_at: Utc::now(),
            started: Instant::now(),
            logs: Vec::new(),
            exceptions: ExceptionRecorder::new(),
            attachments: Vec::new(),
            api_key,
            config,
            integration_client: default_integration_client().clone(),
            provider,
            transport: Arc::new(transport),
        })
    }

    /// Overrides the integration identity attached to every payload.
    #[must_use]
    pub fn with_integration_client(mut self, integration_client: IntegrationClient) -> Self {
        self.integration_client = integration_client;
        self
    }

    /// Appends a log event to the current generation.
    ///
    /// When the event carries an error, every not-yet-seen node of its graph
    /// is recorded and rendered after the message, followed by the text of
    /// the enrichment hook if one is configured.
    pub fn emit(&mut self, event: impl Into<Option<LogEvent>>) {
        let Some(event) = event.into() else {
            return;
        };

        let offset = self.elapsed_millis();
        let message = match &event.error {
            Some(error) => self.render_with_error(&event.message, error),
            None => event.message,
        };

        self.logs.push(LogEntry {
            log_level: event.level,
            message,
            milliseconds_since_request_started: offset,
        });
    }

    /// Attaches `contents` as a named file to the current generation.
    ///
    /// Empty content is ignored. Failing to create the backing file drops
    /// the attachment silently.
    pub fn log_as_file(&mut self, contents: &str, file_name: Option<&str>) {
        if contents.is_empty() {
            return;
        }

        let display_name = sanitize_file_name(file_name);
        if let Some(attachment) =
            best_effort("logging attachment", Attachment::create(contents, display_name))
        {
            self.attachments.push(attachment);
        }
    }

    /// Moves the current generation out into a batch and resets the context.
    ///
    /// Request and response metadata are read from the provider here, once.
    pub fn take_batch(&mut self) -> PendingBatch {
        let logs = std::mem::take(&mut self.logs);
        let exceptions = std::mem::take(&mut self.exceptions).into_entries();
        let attachments = std::mem::take(&mut self.attachments);
        let payload = self.build_payload(logs, exceptions);

        self.reset();

        PendingBatch {
            payload,
            attachments,
        }
    }

    /// Snapshots, resets and delivers with a blocking call.
    ///
    /// The context is reset even when delivery fails; the error is returned
    /// for the caller to surface or ignore. Inside an async runtime the call
    /// still works but parks the runtime thread until the intake answers;
    /// prefer [`LoggingContext::flush_async`] there.
    pub fn flush(&mut self) -> Result<(), TransportError> {
        let batch = self.take_batch();
        batch.send_blocking(&self.transport)
    }

    /// Snapshots, resets and delivers without blocking the executor.
    pub async fn flush_async(&mut self) -> Result<(), TransportError> {
        let batch = self.take_batch();
        batch.send(&self.transport).await
    }

    /// Releases every attachment and the network client.
    ///
    /// Pending logs are not delivered; flush first to keep them.
    pub fn dispose(self) {
        debug!(
            "REQUEST_LOGGER | Disposing context {} with {} pending attachments",
            self.id,
            self.attachments.len()
        );
        drop(self);
    }

    fn reset(&mut self) {
        self.attachments.clear();
        self.id = Uuid::new_v4();
        self.generation += 1;
        self.started_at = Utc::now();
        self.started = Instant::now();
        self.logs = Vec::new();
        self.exceptions = ExceptionRecorder::new();
    }

    fn elapsed_millis(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    fn render_with_error(&mut self, message: &str, error: &ErrorRef) -> String {
        let mut text = String::with_capacity(message.len() + 128);
        text.push_str(message);
        text.push('\n');
        self.exceptions.record(error, &mut text);

        if let Some(details) = self.exception_details(error) {
            text.push('\n');
            text.push_str(&details);
            text.push('\n');
        }
        text
    }

    fn exception_details(&self, error: &ErrorRef) -> Option<String> {
        let hook = self.config.append_exception_details.as_ref()?;
        let details = catch_unwind(AssertUnwindSafe(|| hook(error.error().as_ref())))
            .map_err(|_| "hook panicked");
        best_effort("appending exception details", details)
            .flatten()
            .filter(|details| !details.trim().is_empty())
    }

    fn build_payload(
        &self,
        logs: Vec<LogEntry>,
        exceptions: Vec<ExceptionEntry>,
    ) -> RequestLogPayload {
        let request = self.provider.request_properties();
        let response = self.provider.response_properties();

        RequestLogPayload {
            started_at: self.started_at,
            organization_id: self.api_key.organization_id().to_string(),
            application_id: self.api_key.application_id().to_string(),
            duration_in_milliseconds: self.elapsed_millis(),
            integration_client: self.integration_client.to_payload(),
            machine_name: machine_name(),
            user: self
                .provider
                .authenticated_user()
                .map(|user| UserPayload { name: user.name }),
            http_properties: HttpPropertiesPayload {
                absolute_uri: request.absolute_uri.to_string(),
                method: request.method,
                remote_address: request.remote_address,
                request: RequestPropertiesPayload {
                    headers: request.headers,
                    form_data: request.form_data,
                    claims: request.claims,
                    cookies: request.cookies,
                    input_stream: request.request_body,
                },
                response: ResponsePropertiesPayload {
                    status_code: response.status_code,
                    content_length: response.content_length.unwrap_or(0),
                    headers: response.headers,
                },
            },
            logs,
            exceptions,
            keywords: self.provider.keywords(),
        }
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn logs(&self) -> &[LogEntry] {
        &self.logs
    }

    #[must_use]
    pub fn exceptions(&self) -> &[ExceptionEntry] {
        self.exceptions.entries()
    }

    #[must_use]
    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    #[must_use]
    pub fn api_key(&self) -> &ApiKey {
        &self.api_key
    }

    /// Shared handle to the network client, for sending batches taken under
    /// a lock.
    ///
    /// The handle keeps the client alive: after [`LoggingContext::dispose`]
    /// the client is released only once the last returned clone is dropped.
    #[must_use]
    pub fn transport(&self) -> Arc<Transport> {
        Arc::clone(&self.transport)
    }
}

/// One generation's worth of logs, detached from its context.
///
/// Owns the generation's attachments: their files are deleted when the
/// batch is sent or dropped.
#[derive(Debug)]
pub struct PendingBatch {
    payload: RequestLogPayload,
    attachments: Vec<Attachment>,
}

impl PendingBatch {
    #[must_use]
    pub fn payload(&self) -> &RequestLogPayload {
        &self.payload
    }

    #[must_use]
    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    pub fn body(&self) -> Result<RequestBody, TransportError> {
        RequestBody::build(&self.payload, &self.attachments)
    }

    pub async fn send(self, transport: &Transport) -> Result<(), TransportError> {
        let body = self.body()?;
        transport.send(body).await
    }

    pub fn send_blocking(self, transport: &Transport) -> Result<(), TransportError> {
        let body = self.body()?;
        transport.send_blocking(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::LogLevel;
    use crate::provider::{ConsoleRequestInfo, ResponseProperties};
    use proptest::prelude::*;
    use std::fmt;
    use std::io;
    use std::time::Duration;

    #[derive(Debug)]
    struct Chain {
        name: &'static str,
        source: Option<Box<Chain>>,
    }

    impl fmt::Display for Chain {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{} failed", self.name)
        }
    }

    impl std::error::Error for Chain {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            self.source
                .as_deref()
                .map(|s| s as &(dyn std::error::Error + 'static))
        }
    }

    fn three_level_error() -> ErrorRef {
        ErrorRef::new(Chain {
            name: "E",
            source: Some(Box::new(Chain {
                name: "I1",
                source: Some(Box::new(Chain {
                    name: "I2",
                    source: None,
                })),
            })),
        })
    }

    fn context_with(config: SinkConfig) -> LoggingContext {
        let api_key = ApiKey::new("org", "app", "http://127.0.0.1:1").unwrap();
        let provider = Arc::new(ConsoleRequestInfo::new("http://application/tests"));
        LoggingContext::new(api_key, config, provider).unwrap()
    }

    fn context() -> LoggingContext {
        context_with(SinkConfig {
            client_timeout: Duration::from_millis(500),
            ..Default::default()
        })
    }

    #[test]
    fn test_new_rejects_zero_timeout() {
        let api_key = ApiKey::new("org", "app", "http://127.0.0.1:1").unwrap();
        let provider = Arc::new(ConsoleRequestInfo::new("tests"));
        let result = LoggingContext::new(
            api_key,
            SinkConfig {
                client_timeout: Duration::ZERO,
                ..Default::default()
            },
            provider,
        );
        assert!(matches!(result, Err(ConfigError::InvalidTimeout)));
    }

    #[test]
    fn test_emit_none_is_noop() {
        let mut ctx = context();
        ctx.emit(None);
        assert!(ctx.logs().is_empty());
    }

    #[test]
    fn test_emit_plain_message() {
        let mut ctx = context();
        ctx.emit(LogEvent::info("started"));
        ctx.emit(LogEvent::new(LogLevel::Debug, "working"));

        let messages: Vec<&str> = ctx.logs().iter().map(|l| l.message.as_str()).collect();
        assert_eq!(messages, vec!["started", "working"]);
        assert_eq!(ctx.logs()[1].log_level, LogLevel::Debug);
        assert!(ctx.exceptions().is_empty());
    }

    #[test]
    fn test_emit_error_records_chain_once() {
        let mut ctx = context();
        let error = three_level_error();

        ctx.emit(LogEvent::error("request failed").with_error_ref(error.clone()));
        ctx.emit(LogEvent::error("request failed again").with_error_ref(error));

        let messages: Vec<&str> = ctx
            .exceptions()
            .iter()
            .map(|e| e.exception_message.as_str())
            .collect();
        assert_eq!(messages, vec!["E failed", "I1 failed", "I2 failed"]);

        assert!(ctx.logs()[0].message.starts_with("request failed\n"));
        assert!(ctx.logs()[0].message.contains("Base Exception:"));
        assert_eq!(ctx.logs()[1].message, "request failed again\n");
    }

    #[test]
    fn test_dedup_is_scoped_to_generation() {
        let mut ctx = context();
        let error = ErrorRef::new(io::Error::new(io::ErrorKind::Other, "boom"));

        ctx.emit(LogEvent::error("first").with_error_ref(error.clone()));
        assert_eq!(ctx.exceptions().len(), 1);

        let batch = ctx.take_batch();
        assert_eq!(batch.payload().exceptions.len(), 1);

        ctx.emit(LogEvent::error("second").with_error_ref(error));
        assert_eq!(ctx.exceptions().len(), 1);
    }

    #[test]
    fn test_exception_details_hook_appends_text() {
        let config = SinkConfig::default().with_exception_details(|error| {
            error
                .to_string()
                .contains("boom")
                .then(|| "check the fuse".to_string())
        });
        let mut ctx = context_with(config);

        ctx.emit(LogEvent::error("failed").with_error(io::Error::new(io::ErrorKind::Other, "boom")));
        ctx.emit(LogEvent::error("failed").with_error(io::Error::new(io::ErrorKind::Other, "quiet")));

        assert!(ctx.logs()[0].message.ends_with("\ncheck the fuse\n"));
        assert!(!ctx.logs()[1].message.contains("check the fuse"));
    }

    #[test]
    fn test_panicking_hook_is_swallowed() {
        let config = SinkConfig::default().with_exception_details(|_| panic!("hook bug"));
        let mut ctx = context_with(config);

        ctx.emit(LogEvent::error("failed").with_error(io::Error::new(io::ErrorKind::Other, "boom")));

        assert_eq!(ctx.logs().len(), 1);
        assert_eq!(ctx.exceptions().len(), 1);
    }

    #[test]
    fn test_log_as_file_empty_is_noop() {
        let mut ctx = context();
        ctx.log_as_file("", Some("empty.txt"));
        ctx.log_as_file("", None);
        assert!(ctx.attachments().is_empty());
    }

    #[test]
    fn test_log_as_file_sanitizes_name() {
        let mut ctx = context();
        ctx.log_as_file("data", Some("bad/name*.txt"));
        ctx.log_as_file("data", None);

        assert_eq!(ctx.attachments()[0].display_name(), "badname.txt");
        assert_eq!(ctx.attachments()[1].display_name(), "File");
        assert_eq!(ctx.attachments()[0].size(), 4);
    }

    #[test]
    fn test_take_batch_resets_context() {
        let mut ctx = context();
        let id = ctx.id();
        let started_at = ctx.started_at();

        ctx.emit(LogEvent::info("hello"));
        ctx.emit(LogEvent::error("bad").with_error(io::Error::new(io::ErrorKind::Other, "boom")));
        ctx.log_as_file("payload", Some("body.json"));

        let batch = ctx.take_batch();

        assert_eq!(batch.payload().logs.len(), 2);
        assert_eq!(batch.payload().exceptions.len(), 1);
        assert_eq!(batch.attachments().len(), 1);
        assert_eq!(batch.payload().organization_id, "org");
        assert_eq!(
            batch.payload().http_properties.absolute_uri,
            "http://application/tests"
        );

        assert!(ctx.logs().is_empty());
        assert!(ctx.exceptions().is_empty());
        assert!(ctx.attachments().is_empty());
        assert_ne!(ctx.id(), id);
        assert_eq!(ctx.generation(), 1);
        assert!(ctx.started_at() >= started_at);
    }

    #[test]
    fn test_dropping_batch_deletes_attachments() {
        let mut ctx = context();
        ctx.log_as_file("payload", Some("body.json"));
        let path = ctx.attachments()[0].path().to_path_buf();

        let batch = ctx.take_batch();
        assert!(path.exists());
        drop(batch);
        assert!(!path.exists());
    }

    #[test]
    fn test_payload_reads_provider_once_per_batch() {
        let provider = Arc::new(ConsoleRequestInfo::new("jobs/import"));
        let api_key = ApiKey::new("org", "app", "http://127.0.0.1:1").unwrap();
        let mut ctx = LoggingContext::new(api_key, SinkConfig::default(), provider.clone()).unwrap();

        provider.set_response_properties(ResponseProperties::new(500));
        provider.add_keyword("import");
        let batch = ctx.take_batch();

        assert_eq!(batch.payload().http_properties.response.status_code, 500);
        assert_eq!(batch.payload().keywords, vec!["import".to_string()]);
        assert_eq!(
            batch.payload().http_properties.absolute_uri,
            "http://application/jobs/import"
        );
    }

    #[test]
    fn test_integration_client_override() {
        let mut ctx =
            context().with_integration_client(IntegrationClient::new("my-host", "2.0.0"));
        let batch = ctx.take_batch();
        assert_eq!(batch.payload().integration_client.name, "my-host");
        assert_eq!(batch.payload().integration_client.version, "2.0.0");
    }

    #[test]
    fn test_flush_failure_still_resets() {
        let mut ctx = context();
        ctx.emit(LogEvent::info("hello"));
        ctx.log_as_file("payload", Some("body.json"));
        let path = ctx.attachments()[0].path().to_path_buf();

        let result = ctx.flush();

        assert!(result.is_err());
        assert!(ctx.logs().is_empty());
        assert!(ctx.attachments().is_empty());
        assert_eq!(ctx.generation(), 1);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_flush_async_failure_still_resets() {
        let mut ctx = context();
        ctx.emit(LogEvent::info("hello"));

        let result = ctx.flush_async().await;

        assert!(matches!(result, Err(TransportError::Request(_))));
        assert!(ctx.logs().is_empty());
        assert_eq!(ctx.generation(), 1);
    }

    #[test]
    fn test_flush_inside_runtime_returns_error_and_resets() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let mut ctx = context();
        ctx.emit(LogEvent::info("hello"));
        ctx.log_as_file("payload", Some("body.json"));
        let path = ctx.attachments()[0].path().to_path_buf();

        let result = runtime.block_on(async { ctx.flush() });

        assert!(matches!(result, Err(TransportError::Request(_))));
        assert!(ctx.logs().is_empty());
        assert!(ctx.attachments().is_empty());
        assert_eq!(ctx.generation(), 1);
        assert!(!path.exists());
    }

    #[test]
    fn test_transport_handle_outlives_dispose() {
        let ctx = context();
        let transport = ctx.transport();
        assert_eq!(Arc::strong_count(&transport), 2);

        ctx.dispose();

        assert_eq!(Arc::strong_count(&transport), 1);
        assert_eq!(transport.url().as_str(), "http://127.0.0.1:1/request-logs");
    }

    #[test]
    fn test_dispose_deletes_attachments() {
        let mut ctx = context();
        ctx.log_as_file("payload", Some("body.json"));
        let path = ctx.attachments()[0].path().to_path_buf();

        ctx.dispose();
        assert!(!path.exists());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn logs_preserve_order_and_offsets(messages in prop::collection::vec("[a-z]{1,8}", 0..20)) {
            let mut ctx = context();
            for message in &messages {
                ctx.emit(LogEvent::info(message.clone()));
            }

            let logged: Vec<String> = ctx.logs().iter().map(|l| l.message.clone()).collect();
            prop_assert_eq!(logged, messages);
            prop_assert!(ctx
                .logs()
                .windows(2)
                .all(|w| w[0].milliseconds_since_request_started <= w[1].milliseconds_since_request_started));
        }
    }
}
