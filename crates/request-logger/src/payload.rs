// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Wire model of one request log.
//!
//! A [`RequestLogPayload`] is assembled from a context snapshot at flush
//! time and serialized as the JSON part of the outbound request.

use crate::event::LogLevel;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// One emitted log message, offset from the start of the unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub log_level: LogLevel,
    pub message: String,
    pub milliseconds_since_request_started: u64,
}

/// One distinct error node seen by a context generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionEntry {
    pub exception_type: String,
    pub exception_message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationClientPayload {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPayload {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPropertiesPayload {
    pub headers: BTreeMap<String, String>,
    pub form_data: BTreeMap<String, String>,
    pub claims: BTreeMap<String, String>,
    pub cookies: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_stream: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponsePropertiesPayload {
    pub status_code: u16,
    pub content_length: u64,
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpPropertiesPayload {
    pub absolute_uri: String,
    pub method: String,
    pub remote_address: Option<String>,
    pub request: RequestPropertiesPayload,
    pub response: ResponsePropertiesPayload,
}

/// The JSON document sent for every flush.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestLogPayload {
    pub started_at: DateTime<Utc>,
    pub organization_id: String,
    pub application_id: String,
    pub duration_in_milliseconds: u64,
    pub integration_client: IntegrationClientPayload,
    pub machine_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserPayload>,
    pub http_properties: HttpPropertiesPayload,
    pub logs: Vec<LogEntry>,
    pub exceptions: Vec<ExceptionEntry>,
    pub keywords: Vec<String>,
}
