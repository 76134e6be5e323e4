// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Host and integration identity attached to every payload.

use crate::payload::IntegrationClientPayload;
use std::env;
use std::sync::LazyLock;
use tracing::debug;

/// Name and version of the integration shipping the logs.
///
/// Constant for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrationClient {
    pub name: String,
    pub version: String,
}

impl IntegrationClient {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    #[must_use]
    pub fn to_payload(&self) -> IntegrationClientPayload {
        IntegrationClientPayload {
            name: self.name.clone(),
            version: self.version.clone(),
        }
    }
}

static DEFAULT_INTEGRATION_CLIENT: LazyLock<IntegrationClient> = LazyLock::new(|| {
    IntegrationClient::new(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
});

/// This crate's own identity.
#[must_use]
pub fn default_integration_client() -> &'static IntegrationClient {
    &DEFAULT_INTEGRATION_CLIENT
}

/// Name of the machine running the unit of work.
///
/// Tries `COMPUTERNAME`, then `HOSTNAME`, then the system hostname.
#[must_use]
pub fn machine_name() -> Option<String> {
    for var in ["COMPUTERNAME", "HOSTNAME"] {
        if let Ok(name) = env::var(var) {
            if !name.trim().is_empty() {
                return Some(name);
            }
        }
    }

    match nix::unistd::gethostname() {
        Ok(name) => name.into_string().ok().filter(|name| !name.is_empty()),
        Err(e) => {
            debug!("REQUEST_LOGGER | Failed to get system hostname: {e}");
            None
        }
    }
}
