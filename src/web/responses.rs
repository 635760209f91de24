//! Standardized API response types and error mapping

use axum::Json;
use axum::body::Body;
use axum::http::{Response, StatusCode, header};
use axum::response::IntoResponse;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, warn};

use crate::errors::VodError;
use crate::proxy::range;

/// Envelope for the JSON management API.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            timestamp: Utc::now(),
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> axum::response::Response {
        Json(self).into_response()
    }
}

fn status_for(error: &VodError) -> StatusCode {
    match error {
        VodError::ProfileLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
        VodError::NoProfileAvailable | VodError::LockContended { .. } => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        VodError::UpstreamUnreachable { .. }
        | VodError::UpstreamStatus { .. }
        | VodError::Http(_) => StatusCode::BAD_GATEWAY,
        VodError::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
        VodError::ContentNotFound { .. } => StatusCode::NOT_FOUND,
        VodError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
        VodError::Store(_) | VodError::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for VodError {
    fn into_response(self) -> axum::response::Response {
        let status = status_for(&self);
        if status.is_server_error() {
            error!(%status, "Request failed: {}", self);
        } else {
            warn!(%status, "Request rejected: {}", self);
        }

        // RFC 9110 requires 416 to carry the current length
        if let VodError::RangeNotSatisfiable { length } = &self {
            let response = Response::builder()
                .status(status)
                .header(
                    header::CONTENT_RANGE,
                    range::unsatisfiable_content_range(*length),
                )
                .body(Body::empty());
            match response {
                Ok(response) => return response.into_response(),
                Err(e) => error!("Failed to build 416 response: {}", e),
            }
        }

        (status, Json(ApiResponse::<()>::error(self.to_string()))).into_response()
    }
}
