use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::error;

use concourse_types::error::ChatError;

/// Axum-facing wrapper so handlers can `?` both domain and storage errors.
pub struct ApiError(pub ChatError);

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        Self(err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self(ChatError::Storage(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            ChatError::DuplicateName(_) => (StatusCode::CONFLICT, self.0.to_string()),
            ChatError::InvalidName
            | ChatError::EmptyContent
            | ChatError::InvalidAttachment
            | ChatError::InvalidReply
            | ChatError::InvalidParticipants => {
                (StatusCode::UNPROCESSABLE_ENTITY, self.0.to_string())
            }
            ChatError::PermissionDenied => (StatusCode::FORBIDDEN, self.0.to_string()),
            ChatError::NotFound(_) => (StatusCode::NOT_FOUND, self.0.to_string()),
            ChatError::Storage(err) => {
                error!("storage failure: {:#}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, Json(body)).into_response()
    }
}
