use axum::response::Response;
use thiserror::Error;

use crate::{config::LoadError, infra::error::InfraError};

/// Diagnostic detail attached to error responses and consumed by the
/// response-logging middleware. Never rendered to clients.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_message(source: &'static str, message: impl Into<String>) -> Self {
        Self {
            source,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

/// Failures that abort the process: startup, listener binding and
/// administrative commands. Request handling never produces one.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] LoadError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}

#[cfg(test)]
mod tests {
    use axum::{http::StatusCode, response::IntoResponse};

    use super::*;

    #[test]
    fn report_travels_as_response_extension() {
        let mut response = StatusCode::BAD_REQUEST.into_response();
        ErrorReport::from_message("tests", "invalid_body: EOF while parsing").attach(&mut response);

        let report = response
            .extensions()
            .get::<ErrorReport>()
            .expect("report attached");
        assert_eq!(report.source, "tests");
        assert_eq!(report.messages, vec!["invalid_body: EOF while parsing"]);
    }

    #[test]
    fn infra_errors_convert_transparently() {
        let err: AppError = InfraError::telemetry("subscriber already set").into();
        assert_eq!(
            err.to_string(),
            "telemetry initialization failed: subscriber already set"
        );
    }
}
