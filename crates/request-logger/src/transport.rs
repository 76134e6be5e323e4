// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delivery of a flushed batch to the intake.
//!
//! The outbound body is built once by [`RequestBody::build`], independent of
//! how it is sent: a single JSON entity when the batch has no attachments, a
//! multipart form otherwise. [`Transport::send`] and
//! [`Transport::send_blocking`] only differ in how the network call
//! suspends.
//!
//! ```text
//!   RequestLogPayload + attachments
//!                │
//!                v
//!        ┌──────────────┐
//!        │ RequestBody  │  Json | Multipart { RequestLog, Files* }
//!        └──────┬───────┘
//!          ┌────┴─────┐
//!          v          v
//!     async POST   blocking POST
//! ```

use crate::attachments::Attachment;
use crate::config::ApiKey;
use crate::error::{ConfigError, TransportError};
use crate::payload::RequestLogPayload;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Url;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;

pub const REQUEST_LOGS_PATH: &str = "request-logs";
pub const REQUEST_LOG_PART: &str = "RequestLog";
pub const FILES_PART: &str = "Files";
const JSON_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    pub file_name: String,
    pub contents: Vec<u8>,
}

/// Body of one flush, shared by both delivery variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    Json(Vec<u8>),
    Multipart { json: Vec<u8>, files: Vec<FilePart> },
}

impl RequestBody {
    /// Serializes `payload` and reads every attachment still on disk.
    ///
    /// Attachments whose file vanished are skipped.
    pub fn build(
        payload: &RequestLogPayload,
        attachments: &[Attachment],
    ) -> Result<Self, TransportError> {
        let json = serde_json::to_vec(payload)?;
        if attachments.is_empty() {
            return Ok(Self::Json(json));
        }

        let files = attachments
            .iter()
            .filter_map(|attachment| {
                attachment.read().map(|contents| FilePart {
                    file_name: attachment.display_name().to_string(),
                    contents,
                })
            })
            .collect();

        Ok(Self::Multipart { json, files })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Json(json) => json.len(),
            Self::Multipart { json, files } => {
                json.len() + files.iter().map(|f| f.contents.len()).sum::<usize>()
            }
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn into_form(self) -> Result<Option<reqwest::multipart::Form>, reqwest::Error> {
        use reqwest::multipart::{Form, Part};

        let Self::Multipart { json, files } = self else {
            return Ok(None);
        };

        let mut form = Form::new().part(
            REQUEST_LOG_PART,
            Part::bytes(json).mime_str(JSON_CONTENT_TYPE)?,
        );
        for file in files {
            form = form.part(FILES_PART, Part::bytes(file.contents).file_name(file.file_name));
        }
        Ok(Some(form))
    }

    fn into_blocking_form(
        self,
    ) -> Result<Option<reqwest::blocking::multipart::Form>, reqwest::Error> {
        use reqwest::blocking::multipart::{Form, Part};

        let Self::Multipart { json, files } = self else {
            return Ok(None);
        };

        let mut form = Form::new().part(
            REQUEST_LOG_PART,
            Part::bytes(json).mime_str(JSON_CONTENT_TYPE)?,
        );
        for file in files {
            form = form.part(FILES_PART, Part::bytes(file.contents).file_name(file.file_name));
        }
        Ok(Some(form))
    }
}

/// Network handle owned by a context for its whole lifetime.
///
/// The async client is built up front; the blocking client starts its
/// worker thread on the first blocking send. Both are released when the
/// transport is dropped. Blocking sends issued from inside an async runtime
/// run on a scoped worker thread.
#[derive(Debug)]
pub struct Transport {
    url: Url,
    headers: HeaderMap,
    timeout: Duration,
    client: reqwest::Client,
    blocking_client: OnceLock<reqwest::blocking::Client>,
}

impl Transport {
    pub fn new(api_key: &ApiKey, timeout: Duration) -> Result<Self, ConfigError> {
        let url = request_logs_url(api_key.endpoint())?;

        let mut headers = HeaderMap::new();
        if let Some(bearer) = api_key.bearer() {
            let mut value = HeaderValue::from_str(&format!("Bearer {bearer}"))
                .map_err(|_| ConfigError::InvalidApiKey)?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers.clone())
            .build()?;

        Ok(Self {
            url,
            headers,
            timeout,
            client,
            blocking_client: OnceLock::new(),
        })
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub async fn send(&self, body: RequestBody) -> Result<(), TransportError> {
        let size = body.len();
        let request = self.client.post(self.url.clone());
        let request = match body {
            RequestBody::Json(json) => request.header(CONTENT_TYPE, JSON_CONTENT_TYPE).body(json),
            multipart => match multipart.into_form()? {
                Some(form) => request.multipart(form),
                None => request,
            },
        };

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            debug!("REQUEST_LOGGER | Sent request log ({size} bytes): {status}");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(TransportError::Status { status, body })
    }

    /// Sends `body` and waits for the response on the calling thread.
    ///
    /// Inside an async runtime the blocking client cannot run on the
    /// runtime's thread, so the request moves to a scoped worker thread and
    /// the caller waits for it there.
    pub fn send_blocking(&self, body: RequestBody) -> Result<(), TransportError> {
        if tokio::runtime::Handle::try_current().is_err() {
            return self.send_blocking_here(body);
        }

        debug!("REQUEST_LOGGER | Blocking send inside an async runtime, using a worker thread");
        std::thread::scope(|scope| {
            scope
                .spawn(|| self.send_blocking_here(body))
                .join()
                .unwrap_or_else(|_| {
                    Err(TransportError::Runtime(
                        "blocking send worker panicked".to_string(),
                    ))
                })
        })
    }

    fn send_blocking_here(&self, body: RequestBody) -> Result<(), TransportError> {
        let size = body.len();
        let client = self.blocking_client()?;
        let request = client.post(self.url.clone());
        let request = match body {
            RequestBody::Json(json) => request.header(CONTENT_TYPE, JSON_CONTENT_TYPE).body(json),
            multipart => match multipart.into_blocking_form()? {
                Some(form) => request.multipart(form),
                None => request,
            },
        };

        let response = request.send()?;
        let status = response.status();
        if status.is_success() {
            debug!("REQUEST_LOGGER | Sent request log ({size} bytes): {status}");
            return Ok(());
        }

        let body = response.text().unwrap_or_default();
        Err(TransportError::Status { status, body })
    }

    fn blocking_client(&self) -> Result<&reqwest::blocking::Client, TransportError> {
        if let Some(client) = self.blocking_client.get() {
            return Ok(client);
        }

        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .default_headers(self.headers.clone())
            .build()
            .map_err(|e| TransportError::Runtime(e.to_string()))?;

        Ok(self.blocking_client.get_or_init(|| client))
    }
}

fn request_logs_url(endpoint: &Url) -> Result<Url, ConfigError> {
    let mut base = endpoint.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(REQUEST_LOGS_PATH)
        .map_err(|_| ConfigError::InvalidEndpoint(endpoint.to_string()))
}
