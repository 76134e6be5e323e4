// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::{env, fmt, sync::Arc};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use request_logger::{
    provider::ResponseProperties, ApiKey, ConsoleRequestInfo, ContextSink, LogEvent,
    LoggingContext, SinkConfig,
};

const CONTEXT_URI: &str = "http://application/request-logger-console";

#[derive(Debug)]
struct JobError {
    step: &'static str,
    source: std::io::Error,
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job step '{}' failed", self.step)
    }
}

impl std::error::Error for JobError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

#[tokio::main]
pub async fn main() {
    let log_level = env::var("LOGBEE_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let env_filter = format!("h2=off,hyper=off,rustls=off,{}", log_level);
    let filter = match EnvFilter::try_new(env_filter) {
        Ok(filter) => filter,
        Err(e) => {
            eprintln!("could not parse log level in configuration: {e}");
            return;
        }
    };
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(false)
        .without_time()
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to set tracing subscriber: {e}");
        return;
    }

    let api_key = match ApiKey::from_env() {
        Ok(api_key) => api_key,
        Err(e) => {
            error!("Invalid intake configuration: {e}");
            return;
        }
    };
    let config = match SinkConfig::from_env() {
        Ok(config) => config.with_exception_details(|error| {
            error
                .downcast_ref::<JobError>()
                .map(|job| format!("Check the input of step '{}'", job.step))
        }),
        Err(e) => {
            error!("Invalid sink configuration: {e}");
            return;
        }
    };

    let request_info = Arc::new(ConsoleRequestInfo::new(CONTEXT_URI));
    let context = match LoggingContext::new(api_key, config, request_info.clone()) {
        Ok(context) => context,
        Err(e) => {
            error!("Failed to create logging context: {e}");
            return;
        }
    };
    debug!("Starting request logger console job");

    let mut sink = ContextSink::new(context);
    if let Err(e) = run_job(&mut sink) {
        sink.emit(LogEvent::error("Unhandled exception").with_error(e));
        request_info.set_response_properties(ResponseProperties::new(500));
    }

    info!("Job finished, shipping request log");
    sink.close_async().await;
}

fn run_job(sink: &mut ContextSink) -> Result<(), JobError> {
    sink.emit(LogEvent::info("Reading job input"));

    let input_path = env::var("LOGBEE_JOB_INPUT").unwrap_or_else(|_| "job-input.json".to_string());
    let input = std::fs::read_to_string(&input_path).map_err(|source| JobError {
        step: "read input",
        source,
    })?;
    sink.context_mut().log_as_file(&input, Some("job-input.json"));

    sink.emit(LogEvent::info(format!(
        "Processed {} bytes from {input_path}",
        input.len()
    )));
    Ok(())
}
