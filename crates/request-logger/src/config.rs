// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::error::ConfigError;
use reqwest::Url;
use std::env;
use std::error::Error;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

pub const ORGANIZATION_ID_ENV: &str = "LOGBEE_ORGANIZATION_ID";
pub const APPLICATION_ID_ENV: &str = "LOGBEE_APPLICATION_ID";
pub const ENDPOINT_ENV: &str = "LOGBEE_ENDPOINT";
pub const API_KEY_ENV: &str = "LOGBEE_API_KEY";
pub const CLIENT_TIMEOUT_ENV: &str = "LOGBEE_CLIENT_TIMEOUT_SECS";

pub const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Hook invoked once per emitted error to append custom diagnostic text.
pub type ExceptionDetailsFn =
    Arc<dyn Fn(&(dyn Error + 'static)) -> Option<String> + Send + Sync>;

/// Credentials and destination of the intake.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey {
    organization_id: String,
    application_id: String,
    endpoint: Url,
    bearer: Option<String>,
}

impl ApiKey {
    /// Validates the identifiers and endpoint.
    ///
    /// Blank identifiers and endpoints that are not absolute URIs are
    /// rejected here so that misconfiguration never reaches a flush.
    pub fn new(
        organization_id: &str,
        application_id: &str,
        endpoint: &str,
    ) -> Result<Self, ConfigError> {
        if organization_id.trim().is_empty() {
            return Err(ConfigError::MissingOrganizationId);
        }
        if application_id.trim().is_empty() {
            return Err(ConfigError::MissingApplicationId);
        }
        if endpoint.trim().is_empty() {
            return Err(ConfigError::MissingEndpoint);
        }

        let endpoint = match Url::parse(endpoint.trim()) {
            Ok(url) if !url.cannot_be_a_base() => url,
            _ => return Err(ConfigError::InvalidEndpoint(endpoint.to_string())),
        };

        Ok(Self {
            organization_id: organization_id.trim().to_string(),
            application_id: application_id.trim().to_string(),
            endpoint,
            bearer: None,
        })
    }

    /// Adds the bearer credential sent in the `Authorization` header.
    #[must_use]
    pub fn with_bearer(mut self, key: &str) -> Self {
        let key = key.trim();
        self.bearer = (!key.is_empty()).then(|| key.to_string());
        self
    }

    /// Reads `LOGBEE_ORGANIZATION_ID`, `LOGBEE_APPLICATION_ID`,
    /// `LOGBEE_ENDPOINT` and the optional `LOGBEE_API_KEY`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let organization_id = lookup(ORGANIZATION_ID_ENV).unwrap_or_default();
        let application_id = lookup(APPLICATION_ID_ENV).unwrap_or_default();
        let endpoint = lookup(ENDPOINT_ENV).unwrap_or_default();

        let api_key = Self::new(&organization_id, &application_id, &endpoint)?;
        Ok(match lookup(API_KEY_ENV) {
            Some(bearer) => api_key.with_bearer(&bearer),
            None => api_key,
        })
    }

    #[must_use]
    pub fn organization_id(&self) -> &str {
        &self.organization_id
    }

    #[must_use]
    pub fn application_id(&self) -> &str {
        &self.application_id
    }

    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    #[must_use]
    pub fn bearer(&self) -> Option<&str> {
        self.bearer.as_deref()
    }
}

impl Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKey")
            .field("organization_id", &self.organization_id)
            .field("application_id", &self.application_id)
            .field("endpoint", &self.endpoint.as_str())
            .field("bearer", &self.bearer.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Behaviour of the context that is not part of the credentials.
#[derive(Clone)]
pub struct SinkConfig {
    /// Upper bound for one delivery, connection included.
    pub client_timeout: Duration,
    /// Optional enrichment hook for emitted errors.
    pub append_exception_details: Option<ExceptionDetailsFn>,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            client_timeout: DEFAULT_CLIENT_TIMEOUT,
            append_exception_details: None,
        }
    }
}

impl SinkConfig {
    /// Reads the optional `LOGBEE_CLIENT_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let client_timeout = match lookup(CLIENT_TIMEOUT_ENV) {
            Some(secs) => secs
                .trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| ConfigError::InvalidTimeout)?,
            None => DEFAULT_CLIENT_TIMEOUT,
        };

        let config = Self {
            client_timeout,
            ..Default::default()
        };
        config.validate()?;
        Ok(config)
    }

    #[must_use]
    pub fn with_exception_details<F>(mut self, hook: F) -> Self
    where
        F: Fn(&(dyn Error + 'static)) -> Option<String> + Send + Sync + 'static,
    {
        self.append_exception_details = Some(Arc::new(hook));
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.client_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout);
        }
        Ok(())
    }
}

impl Debug for SinkConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkConfig")
            .field("client_timeout", &self.client_timeout)
            .field(
                "append_exception_details",
                &self.append_exception_details.is_some(),
            )
            .finish()
    }
}
