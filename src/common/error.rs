use std::collections::{BTreeMap, HashMap};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{json, Value};
use thiserror::Error;

use crate::common::response::ApiResponse;

/// Message attached to a dynamic field that the organization requires but was not sent.
pub const FIELD_REQUIRED: &str = "required field missing";
/// Message attached to a submitted key the organization never declared.
pub const FIELD_UNKNOWN: &str = "unknown field";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation failed")]
    ValidationError(#[from] validator::ValidationErrors),

    // Per-key problems with the dynamic registration fields.
    #[error("Validation failed for registration fields")]
    FieldValidation(BTreeMap<String, String>),

    // Per-key problems with ordinary payload fields, checked outside the derive.
    #[error("Validation failed")]
    InvalidFields(BTreeMap<String, String>),

    // Payload problems that are not tied to a derive-validated struct.
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Authentication credentials were not provided")]
    Unauthenticated,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("{0} not found")]
    NotFound(&'static str),

    // The operation is not valid for the record's current lifecycle state.
    #[error("{0}")]
    InvalidState(String),

    #[error("Database error")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Internal server error")]
    InternalServerError(#[from] anyhow::Error),

    #[error("Bcrypt error: {0}")]
    BcryptError(#[from] bcrypt::BcryptError),

    #[error("JWT error: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_)
            | AppError::FieldValidation(_)
            | AppError::InvalidFields(_)
            | AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Unauthenticated | AppError::InvalidCredentials | AppError::InvalidToken => {
                StatusCode::UNAUTHORIZED
            }
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidState(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::DatabaseError(_)
            | AppError::InternalServerError(_)
            | AppError::BcryptError(_)
            | AppError::JwtError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Structured detail for the `errors` member of the envelope.
    fn details(&self) -> Option<Value> {
        match self {
            AppError::ValidationError(errors) => {
                let mut details = HashMap::new();
                for (field, field_errors) in errors.field_errors() {
                    let messages: Vec<String> = field_errors
                        .iter()
                        .map(|e| {
                            e.message
                                .as_ref()
                                .map(|m| m.to_string())
                                .unwrap_or_else(|| e.code.to_string())
                        })
                        .collect();
                    details.insert(field.to_string(), messages);
                }
                Some(json!(details))
            }
            AppError::FieldValidation(fields) => Some(json!({ "fields": fields })),
            // Same shape as derive failures: every key maps to a list of messages.
            AppError::InvalidFields(fields) => {
                let details: BTreeMap<&String, [&String; 1]> =
                    fields.iter().map(|(key, message)| (key, [message])).collect();
                Some(json!(details))
            }
            AppError::InvalidInput(msg) => Some(json!({ "detail": msg })),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            // Details stay in the logs, never in the response.
            tracing::error!("Internal server error: {:?}", self);
            "An unexpected error occurred.".to_string()
        } else {
            self.to_string()
        };

        ApiResponse::<()>::failure(status, message, self.details()).into_response()
    }
}

/// Translates a unique violation into `Conflict`, leaving every other error untouched.
pub fn map_unique_violation(e: sqlx::Error, conflict: impl FnOnce(&str) -> String) -> AppError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            let constraint = db_err.constraint().unwrap_or_default();
            return AppError::Conflict(conflict(constraint));
        }
    }
    e.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn taxonomy_maps_to_http_status() {
        assert_eq!(AppError::Conflict("x".into()).status_code(), StatusCode::CONFLICT);
        assert_eq!(AppError::Forbidden("x".into()).status_code(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::Unauthenticated.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::NotFound("Membership").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::InvalidState("x".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::FieldValidation(BTreeMap::new()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[tokio::test]
    async fn field_validation_renders_per_key_detail() {
        let mut fields = BTreeMap::new();
        fields.insert("national_id".to_string(), FIELD_REQUIRED.to_string());
        fields.insert("nickname".to_string(), FIELD_UNKNOWN.to_string());

        let response = AppError::FieldValidation(fields).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["data"], Value::Null);
        assert_eq!(body["errors"]["fields"]["national_id"], FIELD_REQUIRED);
        assert_eq!(body["errors"]["fields"]["nickname"], FIELD_UNKNOWN);
    }

    #[tokio::test]
    async fn payload_field_errors_are_not_nested_under_fields() {
        let fields = BTreeMap::from([("amount".to_string(), "must be greater than zero".to_string())]);

        let response = AppError::InvalidFields(fields).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["message"], "Validation failed");
        assert_eq!(body["errors"]["amount"][0], "must be greater than zero");
        assert_eq!(body["errors"]["fields"], Value::Null);
    }

    #[tokio::test]
    async fn internal_errors_hide_details() {
        let response = AppError::InternalServerError(anyhow::anyhow!("pool exploded")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert_eq!(body["message"], "An unexpected error occurred.");
        assert_eq!(body["errors"], Value::Null);
    }

    #[tokio::test]
    async fn not_found_names_the_entity() {
        let body = body_json(AppError::NotFound("Loan").into_response()).await;
        assert_eq!(body["message"], "Loan not found");
    }
}
