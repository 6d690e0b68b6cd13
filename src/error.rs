//! Unified error handling
//!
//! `AgentError` is the process-level error taxonomy; its `exit_code` is what
//! the process reports to the external supervisor. `ApiError` implements
//! `IntoResponse` for the status API.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::path::PathBuf;

use crate::infra::command::CommandError;

/// Fatal agent errors
#[derive(Debug)]
pub enum AgentError {
    /// Required input artifact absent; the job is never invoked
    MissingInput(PathBuf),
    /// A required dependency never became ready within its attempt budget
    DependencyTimeout { service: String, attempts: u32 },
    /// The external job exited non-zero; the code is propagated verbatim
    JobFailure { exit_code: i32 },
    /// The job process itself could not be run
    JobSpawn(CommandError),
    /// A required host tool is absent
    PrerequisiteMissing(String),
    /// The deployment pipeline failed at the named stage
    DeployFailed { stage: String },
}

impl AgentError {
    /// Process exit code for this error
    ///
    /// Job failures propagate their exit code unchanged; everything else
    /// maps to the generic failure code 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            AgentError::JobFailure { exit_code } if *exit_code != 0 => *exit_code,
            _ => 1,
        }
    }
}

impl std::fmt::Display for AgentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentError::MissingInput(path) => {
                write!(f, "Input artifact not found: {}", path.display())
            }
            AgentError::DependencyTimeout { service, attempts } => {
                write!(f, "{} not ready after {} attempts", service, attempts)
            }
            AgentError::JobFailure { exit_code } => {
                write!(f, "ETL job failed with exit code {}", exit_code)
            }
            AgentError::JobSpawn(e) => write!(f, "Failed to run ETL job: {}", e),
            AgentError::PrerequisiteMissing(tool) => {
                write!(f, "Required tool not found: {}", tool)
            }
            AgentError::DeployFailed { stage } => {
                write!(f, "Deployment failed at stage: {}", stage)
            }
        }
    }
}

impl std::error::Error for AgentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AgentError::JobSpawn(e) => Some(e),
            _ => None,
        }
    }
}

/// API error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Unified API error type
#[derive(Debug)]
pub enum ApiError {
    /// 401 - invalid or missing API key
    Unauthorized,
    /// 404 - resource not found
    NotFound(String),
    /// 409 - conflict (e.g. a run is already in progress)
    Conflict(String),
    /// 500 - internal error
    Internal(String),
}

impl ApiError {
    pub fn unauthorized() -> Self {
        Self::Unauthorized
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound(resource.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Invalid or missing API key".to_string(),
            ),
            ApiError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                "not_found",
                format!("{} not found", resource),
            ),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
        };

        let body = ErrorResponse {
            error: error_type.to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Unauthorized => write!(f, "Unauthorized"),
            ApiError::NotFound(r) => write!(f, "Not found: {}", r),
            ApiError::Conflict(m) => write!(f, "Conflict: {}", m),
            ApiError::Internal(m) => write!(f, "Internal error: {}", m),
        }
    }
}

impl std::error::Error for ApiError {}

/// Convenience alias
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_failure_exit_code_propagates_verbatim() {
        let err = AgentError::JobFailure { exit_code: 7 };
        assert_eq!(err.exit_code(), 7);

        let err = AgentError::JobFailure { exit_code: 2 };
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_other_errors_exit_one() {
        assert_eq!(AgentError::MissingInput(PathBuf::from("x")).exit_code(), 1);
        assert_eq!(
            AgentError::DependencyTimeout {
                service: "postgres".into(),
                attempts: 30
            }
            .exit_code(),
            1
        );
        assert_eq!(
            AgentError::PrerequisiteMissing("docker".into()).exit_code(),
            1
        );
    }

    #[test]
    fn test_display_messages() {
        let err = AgentError::DependencyTimeout {
            service: "postgres".into(),
            attempts: 30,
        };
        assert_eq!(err.to_string(), "postgres not ready after 30 attempts");
    }
}
