// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Request and response metadata supplied by the host.
//!
//! The context does not accumulate HTTP metadata itself: it asks its
//! [`RequestInfoProvider`] once per flush. Web integrations implement the
//! trait on top of their framework's request scope; [`ConsoleRequestInfo`]
//! covers console runs and jobs.

use reqwest::Url;
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

pub const DEFAULT_APPLICATION_URI: &str = "http://application/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestProperties {
    pub absolute_uri: Url,
    pub method: String,
    pub remote_address: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub form_data: BTreeMap<String, String>,
    pub claims: BTreeMap<String, String>,
    pub cookies: BTreeMap<String, String>,
    pub request_body: Option<String>,
}

impl RequestProperties {
    pub fn new(absolute_uri: Url, method: impl Into<String>) -> Self {
        Self {
            absolute_uri,
            method: method.into(),
            remote_address: None,
            headers: BTreeMap::new(),
            form_data: BTreeMap::new(),
            claims: BTreeMap::new(),
            cookies: BTreeMap::new(),
            request_body: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseProperties {
    pub status_code: u16,
    pub content_length: Option<u64>,
    pub headers: BTreeMap<String, String>,
}

impl ResponseProperties {
    #[must_use]
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            content_length: None,
            headers: BTreeMap::new(),
        }
    }
}

impl Default for ResponseProperties {
    fn default() -> Self {
        Self::new(200)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub name: String,
}

/// Collaborator read once per flush.
pub trait RequestInfoProvider: Send + Sync {
    fn request_properties(&self) -> RequestProperties;

    fn response_properties(&self) -> ResponseProperties;

    fn authenticated_user(&self) -> Option<AuthenticatedUser> {
        None
    }

    fn keywords(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Resolves the URI a non-web unit of work is reported under.
///
/// Absolute URIs are kept, relative ones are joined onto
/// [`DEFAULT_APPLICATION_URI`], and blank or unparsable input falls back to
/// [`DEFAULT_APPLICATION_URI`] itself.
#[must_use]
pub fn resolve_context_uri(url: &str) -> Url {
    #[allow(clippy::expect_used)]
    let base = Url::parse(DEFAULT_APPLICATION_URI).expect("default application uri is valid");

    let url = url.trim();
    if url.is_empty() {
        return base;
    }

    match Url::parse(url) {
        Ok(absolute) => absolute,
        Err(_) => base.join(url).unwrap_or(base),
    }
}

/// Request metadata of a console run or background job.
#[derive(Debug)]
pub struct ConsoleRequestInfo {
    uri: Url,
    method: String,
    response: Mutex<ResponseProperties>,
    user: Mutex<Option<AuthenticatedUser>>,
    keywords: Mutex<Vec<String>>,
}

impl ConsoleRequestInfo {
    pub fn new(url: &str) -> Self {
        Self {
            uri: resolve_context_uri(url),
            method: "GET".to_string(),
            response: Mutex::new(ResponseProperties::default()),
            user: Mutex::new(None),
            keywords: Mutex::new(Vec::new()),
        }
    }

    /// Reports the outcome of the unit of work, e.g. `500` after a failure.
    pub fn set_response_properties(&self, response: ResponseProperties) {
        *self.response.lock().unwrap_or_else(PoisonError::into_inner) = response;
    }

    pub fn set_authenticated_user(&self, user: Option<AuthenticatedUser>) {
        *self.user.lock().unwrap_or_else(PoisonError::into_inner) = user;
    }

    pub fn add_keyword(&self, keyword: impl Into<String>) {
        self.keywords
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(keyword.into());
    }
}

impl RequestInfoProvider for ConsoleRequestInfo {
    fn request_properties(&self) -> RequestProperties {
        RequestProperties::new(self.uri.clone(), self.method.clone())
    }

    fn response_properties(&self) -> ResponseProperties {
        self.response
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn authenticated_user(&self) -> Option<AuthenticatedUser> {
        self.user
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn keywords(&self) -> Vec<String> {
        self.keywords
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn content_type(headers: &BTreeMap<String, String>) -> Option<String> {
    headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
        .map(|(_, value)| value.trim().to_lowercase())
        .filter(|value| !value.is_empty())
}

/// Whether a body with these headers may be captured, given the list of
/// content types a web integration is configured to read.
#[must_use]
pub fn content_type_allowed(headers: &BTreeMap<String, String>, allowed: &[&str]) -> bool {
    match content_type(headers) {
        Some(content_type) => allowed.iter().any(|a| content_type.contains(a)),
        None => false,
    }
}

/// File name used when a response body is logged as an attachment.
#[must_use]
pub fn response_file_name(headers: &BTreeMap<String, String>) -> &'static str {
    let content_type = content_type(headers).unwrap_or_default();

    if content_type.contains("/json") {
        "Response.json"
    } else if content_type.contains("/xml") {
        "Response.xml"
    } else if content_type.contains("/html") {
        "Response.html"
    } else {
        "Response.txt"
    }
}
