// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use reqwest::StatusCode;

/// Errors raised while configuring a logging context.
///
/// These are programmer errors and are reported when the configuration is
/// built, never later while logging.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Organization id is required")]
    MissingOrganizationId,

    #[error("Application id is required")]
    MissingApplicationId,

    #[error("Intake endpoint is required")]
    MissingEndpoint,

    #[error("Intake endpoint must be an absolute URI: {0}")]
    InvalidEndpoint(String),

    #[error("API key contains characters not allowed in an HTTP header")]
    InvalidApiKey,

    #[error("Client timeout must be greater than 0")]
    InvalidTimeout,

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Errors raised while delivering a flushed batch.
///
/// The context has always been reset by the time one of these is returned.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to serialize request log: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to send request log: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{status}: intake rejected request log: {body}")]
    Status { status: StatusCode, body: String },

    #[error("Failed to start blocking HTTP client: {0}")]
    Runtime(String),
}
