use axum::{http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;
use serde_json::json;
use tracing::{error, warn};

/// Error categories surfaced by every API handler. Each category maps to a
/// fixed HTTP status and is rendered as the uniform error envelope.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Authentication failed: {0}")]
    Authentication(String),
    #[error("Not authorized: {0}")]
    Authorization(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Too many requests")]
    RateLimit,
    #[error("Database error: {0}")]
    Database(String),
    #[error("File upload rejected: {0}")]
    FileUpload(String),
    #[error("External service error: {0}")]
    ExternalService(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Authentication(_) => "authentication",
            Self::Authorization(_) => "authorization",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::RateLimit => "rate_limit",
            Self::Database(_) => "database",
            Self::FileUpload(_) => "file_upload",
            Self::ExternalService(_) => "external_service",
            Self::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::FileUpload(_) => StatusCode::BAD_REQUEST,
            Self::Authentication(_) => StatusCode::UNAUTHORIZED,
            Self::Authorization(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::RateLimit => StatusCode::TOO_MANY_REQUESTS,
            Self::ExternalService(_) => StatusCode::BAD_GATEWAY,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Shorthand for the ubiquitous "could not get a pooled connection" case.
    pub fn pool(e: impl std::fmt::Display) -> Self {
        Self::Database(format!("connection pool: {e}"))
    }
}

impl From<diesel::result::Error> for ApiError {
    fn from(e: diesel::result::Error) -> Self {
        match e {
            diesel::result::Error::NotFound => Self::NotFound("record".into()),
            other => Self::Database(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error_type = self.error_type(), "{self}");
        } else {
            warn!(error_type = self.error_type(), "{self}");
        }
        let body = json!({
            "success": false,
            "error": {
                "error_type": self.error_type(),
                "message": self.to_string(),
                "timestamp": Utc::now().to_rfc3339(),
            },
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::Validation("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::Authentication("x".into()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ApiError::Authorization("x".into()).status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::Conflict("x".into()).status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::RateLimit.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(ApiError::FileUpload("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::ExternalService("x".into()).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::Database("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_diesel_not_found_maps_to_404() {
        let err: ApiError = diesel::result::Error::NotFound.into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.error_type(), "not_found");
    }

    #[test]
    fn test_error_type_names() {
        assert_eq!(ApiError::RateLimit.error_type(), "rate_limit");
        assert_eq!(ApiError::FileUpload("big".into()).error_type(), "file_upload");
        assert_eq!(
            ApiError::ExternalService("s3".into()).error_type(),
            "external_service"
        );
    }
}
