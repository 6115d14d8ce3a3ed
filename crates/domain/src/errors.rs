//! Assessment error taxonomy with RFC 9457 problem+json responses.

use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// RFC 9457 problem details body.
#[derive(Debug, Serialize)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub problem_type: &'static str,
    pub title: &'static str,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Failures the assessment engine can surface, with HTTP mappings.
#[derive(Debug, thiserror::Error)]
pub enum AssessmentError {
    /// Session lookup failed, or a session has no pending response (404)
    #[error("Assessment session not found: {0}")]
    SessionNotFound(String),

    /// Assignment lookup failed (404)
    #[error("Assigned assessment not found: {0}")]
    AssignmentNotFound(String),

    /// Item lookup failed (404)
    #[error("Assessment item not found: {0}")]
    ItemNotFound(String),

    /// Template or config row absent (404)
    #[error("Assessment configuration not found: {0}")]
    ConfigurationNotFound(String),

    /// The selector found nothing to present at session start (404)
    #[error("No suitable questions available: {0}")]
    NoEligibleItems(String),

    /// Operation inappropriate for the current session state (400)
    #[error("Invalid session state: {0}")]
    InvalidState(String),

    /// The session already reached a terminal status (400)
    #[error("Assessment terminated: {0}")]
    Terminated(String),

    /// Malformed or incomplete response payload (400)
    #[error("Invalid response data: {0}")]
    InvalidInput(String),

    /// Lost an optimistic-concurrency race; safe to retry (503)
    #[error("Concurrent modification of session {0}")]
    Conflict(String),

    /// Underlying store failure; safe to retry (503)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Anything uncategorized (500)
    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl AssessmentError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AssessmentError::SessionNotFound(_)
            | AssessmentError::AssignmentNotFound(_)
            | AssessmentError::ItemNotFound(_)
            | AssessmentError::ConfigurationNotFound(_)
            | AssessmentError::NoEligibleItems(_) => StatusCode::NOT_FOUND,
            AssessmentError::InvalidState(_)
            | AssessmentError::Terminated(_)
            | AssessmentError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AssessmentError::Conflict(_) | AssessmentError::Storage(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AssessmentError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Problem type slug per RFC 9457.
    pub fn problem_type(&self) -> &'static str {
        match self {
            AssessmentError::SessionNotFound(_) => "session-not-found",
            AssessmentError::AssignmentNotFound(_) => "assigned-assessment-not-found",
            AssessmentError::ItemNotFound(_) | AssessmentError::NoEligibleItems(_) => {
                "item-not-found"
            }
            AssessmentError::ConfigurationNotFound(_) => "assessment-configuration-not-found",
            AssessmentError::InvalidState(_) => "invalid-session-state",
            AssessmentError::Terminated(_) => "assessment-terminated",
            AssessmentError::InvalidInput(_) => "invalid-response",
            AssessmentError::Conflict(_)
            | AssessmentError::Storage(_)
            | AssessmentError::Internal(_) => "internal-server-error",
        }
    }

    /// Human-readable problem title.
    pub fn title(&self) -> &'static str {
        match self {
            AssessmentError::SessionNotFound(_) => "Session not found",
            AssessmentError::AssignmentNotFound(_) => "Assigned assessment not found",
            AssessmentError::ItemNotFound(_) => "Assessment item not found",
            AssessmentError::NoEligibleItems(_) => "Assessment item not found",
            AssessmentError::ConfigurationNotFound(_) => "Assessment configuration not found",
            AssessmentError::InvalidState(_) => "Invalid session state",
            AssessmentError::Terminated(_) => "Assessment terminated",
            AssessmentError::InvalidInput(_) => "Invalid response data",
            AssessmentError::Conflict(_) | AssessmentError::Storage(_) => "Temporary failure",
            AssessmentError::Internal(_) => "Internal server error",
        }
    }

    /// Create an invalid-input error from validator errors
    pub fn from_validation_errors(errors: validator::ValidationErrors) -> Self {
        let messages: Vec<String> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |error| {
                    format!(
                        "{}: {}",
                        field,
                        error
                            .message
                            .as_ref()
                            .unwrap_or(&std::borrow::Cow::Borrowed("validation failed"))
                    )
                })
            })
            .collect();

        if messages.is_empty() {
            AssessmentError::InvalidInput("invalid request".to_string())
        } else {
            AssessmentError::InvalidInput(messages.join("; "))
        }
    }

    fn detail(&self) -> Option<String> {
        match self {
            // Internal details stay opaque; no stack traces on the wire.
            AssessmentError::Internal(_) => None,
            AssessmentError::Storage(_) => Some("temporary failure, please retry".to_string()),
            AssessmentError::Conflict(_) => {
                Some("the session was modified concurrently, please retry".to_string())
            }
            other => Some(other.to_string()),
        }
    }
}

impl IntoResponse for AssessmentError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if matches!(
            self,
            AssessmentError::Internal(_) | AssessmentError::Storage(_)
        ) {
            tracing::error!("Internal error: {}", self);
        }

        let body = ProblemDetails {
            problem_type: self.problem_type(),
            title: self.title(),
            status: status.as_u16(),
            detail: self.detail(),
        };

        (
            status,
            [(header::CONTENT_TYPE, "application/problem+json")],
            Json(body),
        )
            .into_response()
    }
}

impl From<sqlx::Error> for AssessmentError {
    fn from(err: sqlx::Error) -> Self {
        AssessmentError::Storage(err.to_string())
    }
}
