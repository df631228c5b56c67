//! Mapping of service errors and rejections onto JSON error responses

use std::convert::Infallible;

use serde_json::json;
use sonos_dashboard::{GroupFormationError, ServiceError};
use warp::http::StatusCode;
use warp::{Rejection, Reply};

/// A failure that reaches the HTTP client as `{"error": message}`
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    /// Extra structured context, e.g. a partially formed group
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl warp::reject::Reject for ApiError {}

impl From<ServiceError> for ApiError {
    fn from(error: ServiceError) -> Self {
        let status = if error.is_not_found() {
            StatusCode::NOT_FOUND
        } else if error.is_invalid_input() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };

        let details = match &error {
            ServiceError::GroupFormation(GroupFormationError::JoinFailed { formation, .. }) => {
                serde_json::to_value(formation.as_ref()).ok()
            }
            _ => None,
        };

        Self {
            status,
            message: error.to_string(),
            details,
        }
    }
}

/// Turn every rejection into a JSON error body
pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, message, details) = if let Some(api) = err.find::<ApiError>() {
        (api.status, api.message.clone(), api.details.clone())
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found".to_string(), None)
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, format!("Invalid request body: {}", e), None)
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string(), None)
    } else {
        tracing::error!("Unhandled rejection: {:?}", err);
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string(), None)
    };

    if status.is_server_error() {
        tracing::error!("Request failed: {}", message);
    }

    let body = match details {
        Some(details) => json!({ "error": message, "details": details }),
        None => json!({ "error": message }),
    };

    Ok(warp::reply::with_status(warp::reply::json(&body), status))
}
