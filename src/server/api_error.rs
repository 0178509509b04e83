use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use tracing::error;

use crate::lifecycle::LifecycleError;

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for LifecycleError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            LifecycleError::NotFound | LifecycleError::NotLiked | LifecycleError::NotFollowing => {
                StatusCode::NOT_FOUND
            }
            LifecycleError::NotOwner | LifecycleError::ItemExpired => StatusCode::FORBIDDEN,
            LifecycleError::NotExpired
            | LifecycleError::Validation(_)
            | LifecycleError::HandleTaken => StatusCode::BAD_REQUEST,
            LifecycleError::AlreadyLiked | LifecycleError::AlreadyFollowing => StatusCode::CONFLICT,
            LifecycleError::Internal(err) => {
                error!("Internal error: {:#}", err);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let message = match &self {
            // Internal details stay in the logs.
            LifecycleError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };
        let body = ErrorBody {
            code: self.code(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

/// Error wrapper for the like and comment write paths: an expired vlog
/// responds 404 instead of the 403 reads get, with the `ITEM_EXPIRED` code
/// intact so clients can still tell why.
pub struct ExpiredAsMissing(pub LifecycleError);

impl IntoResponse for ExpiredAsMissing {
    fn into_response(self) -> axum::response::Response {
        match self.0 {
            LifecycleError::ItemExpired => {
                let body = ErrorBody {
                    code: LifecycleError::ItemExpired.code(),
                    message: LifecycleError::ItemExpired.to_string(),
                };
                (StatusCode::NOT_FOUND, Json(body)).into_response()
            }
            other => other.into_response(),
        }
    }
}
