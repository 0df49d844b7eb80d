use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use domain::services::LedgerError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Vec<ValidationDetail>>,
}

#[derive(Debug, Serialize)]
pub struct ValidationDetail {
    pub field: String,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone()),
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, "validation_error", msg.clone()),
            ApiError::Internal(msg) => {
                // The cause goes to the log, never to the client.
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".into(),
                )
            }
        };

        let body = ErrorBody {
            error: error_code.into(),
            message,
            details: None,
        };

        (status, Json(body)).into_response()
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NotFound => ApiError::NotFound("Import job not found".into()),
            LedgerError::InvalidTransition { from, to } => ApiError::Conflict(format!(
                "Import job is already {}, cannot move to {}",
                from, to
            )),
            LedgerError::Backend(msg) => ApiError::Internal(format!("Ledger error: {}", msg)),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut details = Vec::new();
        for (field, problems) in errors.field_errors() {
            for problem in problems {
                details.push(ValidationDetail {
                    field: field.to_string(),
                    message: problem
                        .message
                        .clone()
                        .map(|m| m.to_string())
                        .unwrap_or_default(),
                });
            }
        }

        let message = match details.as_slice() {
            [only] => only.message.clone(),
            _ => format!("Request failed validation with {} problems", details.len()),
        };

        ApiError::Validation(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use domain::models::ImportJobStatus;

    #[test]
    fn test_status_code_per_variant() {
        let cases = [
            (
                ApiError::Unauthorized("clinic header missing".into()),
                StatusCode::UNAUTHORIZED,
            ),
            (
                ApiError::NotFound("no such job".into()),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::Conflict("job already finished".into()),
                StatusCode::CONFLICT,
            ),
            (
                ApiError::Validation("species column missing".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::Internal("pool exhausted".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }

    #[tokio::test]
    async fn test_error_body_shape() {
        let response = ApiError::NotFound("Import job not found".to_string()).into_response();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(body["error"], "not_found");
        assert_eq!(body["message"], "Import job not found");
        assert!(body.get("details").is_none());
    }

    #[tokio::test]
    async fn test_internal_cause_is_not_leaked() {
        let response =
            ApiError::Internal("connection refused at 10.0.0.3:5432".to_string()).into_response();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(body["error"], "internal_error");
        assert!(!body["message"]
            .as_str()
            .unwrap_or_default()
            .contains("10.0.0.3"));
    }

    #[test]
    fn test_display_formats() {
        assert_eq!(
            ApiError::Validation("diagnosisDate is unreadable".to_string()).to_string(),
            "Validation error: diagnosisDate is unreadable"
        );
        assert_eq!(
            ApiError::Conflict("already cancelled".to_string()).to_string(),
            "Conflict: already cancelled"
        );
    }

    #[test]
    fn test_from_ledger_not_found() {
        let error: ApiError = LedgerError::NotFound.into();
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_from_ledger_invalid_transition() {
        let error: ApiError = LedgerError::InvalidTransition {
            from: ImportJobStatus::Completed,
            to: ImportJobStatus::Failed,
        }
        .into();
        match &error {
            ApiError::Conflict(msg) => assert!(msg.contains("completed")),
            other => panic!("Expected Conflict, got {:?}", other),
        }
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_validation_detail() {
        let detail = ValidationDetail {
            field: "fileName".to_string(),
            message: "File name must not be empty".to_string(),
        };
        assert_eq!(detail.field, "fileName");
        assert_eq!(detail.message, "File name must not be empty");
    }
}
