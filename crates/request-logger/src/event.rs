// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use serde::Serialize;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

pub type SharedError = Arc<dyn Error + Send + Sync + 'static>;

/// Severity of a log event as reported to the intake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum LogLevel {
    Trace,
    Debug,
    Information,
    Warning,
    Error,
    Critical,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Trace => "Trace",
            LogLevel::Debug => "Debug",
            LogLevel::Information => "Information",
            LogLevel::Warning => "Warning",
            LogLevel::Error => "Error",
            LogLevel::Critical => "Critical",
        };
        f.write_str(name)
    }
}

impl From<tracing::Level> for LogLevel {
    fn from(level: tracing::Level) -> Self {
        if level == tracing::Level::ERROR {
            LogLevel::Error
        } else if level == tracing::Level::WARN {
            LogLevel::Warning
        } else if level == tracing::Level::INFO {
            LogLevel::Information
        } else if level == tracing::Level::DEBUG {
            LogLevel::Debug
        } else {
            LogLevel::Trace
        }
    }
}

/// A shared error plus the name of its concrete type.
///
/// Cloning keeps the identity of the underlying error, so emitting a clone
/// twice within one generation reports the error once.
#[derive(Clone)]
pub struct ErrorRef {
    error: SharedError,
    type_name: String,
}

impl ErrorRef {
    pub fn new<E>(error: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self {
            error: Arc::new(error),
            type_name: std::any::type_name::<E>().to_string(),
        }
    }

    /// Wraps an already shared error. Its type name is recovered from the
    /// `Debug` output because the concrete type is erased.
    pub fn from_shared(error: SharedError) -> Self {
        let type_name = debug_type_label(error.as_ref());
        Self { error, type_name }
    }

    #[must_use]
    pub fn error(&self) -> &SharedError {
        &self.error
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }
}

impl fmt::Debug for ErrorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorRef")
            .field("type_name", &self.type_name)
            .field("error", &self.error.to_string())
            .finish()
    }
}

/// Leading identifier of a value's `Debug` representation, e.g. `Custom`
/// for `Custom { kind: NotFound, .. }`.
///
/// Derived `Debug` prints enum variants without their type, so an enum error
/// is labelled by its variant (`Custom` or `Os` for `std::io::Error`,
/// `Timeout` for `StoreError::Timeout(..)`). Struct errors are labelled by
/// their type name.
pub(crate) fn debug_type_label(error: &(dyn Error + 'static)) -> String {
    let debug = format!("{error:?}");
    let label: String = debug
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == ':')
        .collect();
    if label.is_empty() {
        "Error".to_string()
    } else {
        label
    }
}

/// A structured log event pushed into a context.
#[derive(Debug, Clone)]
pub struct LogEvent {
    pub level: LogLevel,
    pub message: String,
    pub error: Option<ErrorRef>,
}

impl LogEvent {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            error: None,
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Information, message)
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, message)
    }

    #[must_use]
    pub fn with_error<E>(self, error: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        self.with_error_ref(ErrorRef::new(error))
    }

    #[must_use]
    pub fn with_error_ref(mut self, error: ErrorRef) -> Self {
        self.error = Some(error);
        self
    }
}
