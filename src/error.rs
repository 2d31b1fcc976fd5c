//! Error handler for roster.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::ValidationErrors;

use crate::crypto::CryptoError;
use crate::store::StoreError;

pub type Result<T> = std::result::Result<T, ServerError>;

/// Enum representing server-side errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("missing or invalid token")]
    Unauthenticated,

    #[error("token expired")]
    Expired,

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("validation error occurred")]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Axum(#[from] JsonRejection),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("internal server error, {details}")]
    Internal {
        details: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl ServerError {
    pub fn internal(
        details: &str,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Internal {
            details: details.to_owned(),
            source: Some(Box::new(source)),
        }
    }
}

impl From<StoreError> for ServerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => Self::NotFound(err.to_string()),
            // duplicates are reported like any other invalid input.
            StoreError::Conflict { .. } => Self::BadRequest(err.to_string()),
            StoreError::Timeout => Self::internal("store timed out", err),
            StoreError::Database(_) => Self::internal("store failed", err),
        }
    }
}

impl From<CryptoError> for ServerError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::Mismatch => {
                Self::BadRequest("current password is incorrect".into())
            },
            CryptoError::Argon2(_) => Self::internal("hashing failed", err),
        }
    }
}

/// Body of every API response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ResponseBody<T> {
    pub code: u16,
    pub status: bool,
    pub message: String,
    pub data: Option<T>,
}

impl<T> ResponseBody<T> {
    /// Successful response carrying `data`.
    pub fn success(code: StatusCode, message: &str, data: T) -> Self {
        Self {
            code: code.as_u16(),
            status: true,
            message: message.to_owned(),
            data: Some(data),
        }
    }
}

impl<T: Serialize> IntoResponse for ResponseBody<T> {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

/// Detail of a rejected field.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

fn parse_validation_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    let mut errors = errors
        .field_errors()
        .iter()
        .flat_map(|(field, issues)| {
            issues.iter().map(move |issue| FieldError {
                field: field.to_string(),
                message: issue
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| issue.code.to_string()),
            })
        })
        .collect::<Vec<_>>();
    errors.sort_by(|a, b| a.field.cmp(&b.field));
    errors
}

fn failure<T: Serialize>(
    code: StatusCode,
    message: String,
    data: Option<T>,
) -> Response {
    ResponseBody {
        code: code.as_u16(),
        status: false,
        message,
        data,
    }
    .into_response()
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let message = self.to_string();

        match self {
            ServerError::Unauthenticated | ServerError::Expired => {
                failure::<()>(StatusCode::UNAUTHORIZED, message, None)
            },
            ServerError::Forbidden(_) => {
                failure::<()>(StatusCode::FORBIDDEN, message, None)
            },
            ServerError::Validation(errors) => failure(
                StatusCode::BAD_REQUEST,
                message,
                Some(parse_validation_errors(&errors)),
            ),
            ServerError::Axum(rejection) => {
                failure::<()>(rejection.status(), rejection.body_text(), None)
            },
            ServerError::BadRequest(_) => {
                failure::<()>(StatusCode::BAD_REQUEST, message, None)
            },
            ServerError::NotFound(_) => {
                failure::<()>(StatusCode::NOT_FOUND, message, None)
            },
            ServerError::Internal { details, source } => {
                tracing::error!(error = ?source, %details, "server returned 500 status");

                failure::<()>(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".into(),
                    None,
                )
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;
    use validator::ValidationError;

    use super::*;
    use crate::event::EntityKind;
    use crate::store::Field;

    async fn body(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_store_errors() {
        let response = ServerError::from(StoreError::Conflict {
            field: Field::Username,
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body(response).await,
            serde_json::json!({
                "code": 400,
                "status": false,
                "message": "username already registered",
                "data": null
            })
        );

        let response = ServerError::from(StoreError::NotFound {
            kind: EntityKind::User,
            id: "u1".into(),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = ServerError::from(StoreError::Timeout).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body(response).await["message"], "internal server error");
    }

    #[tokio::test]
    async fn test_validation_errors() {
        let mut errors = ValidationErrors::new();
        errors.add(
            "phone",
            ValidationError::new("phone")
                .with_message("phone must be 10 to 13 digits".into()),
        );

        let response = ServerError::from(errors).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body(response).await["data"],
            serde_json::json!([
                { "field": "phone", "message": "phone must be 10 to 13 digits" }
            ])
        );
    }

    #[tokio::test]
    async fn test_expired_message() {
        let response = ServerError::Expired.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body(response).await["message"], "token expired");
    }
}
