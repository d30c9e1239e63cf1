pub mod events;
pub mod status;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use evcal_core::CalendarError;
use serde::Serialize;
use tokio::task::JoinError;

/// JSON body returned for a failed calendar request.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: &'static str,
}

/// A failed request, already classified for the client.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    kind: &'static str,
    source: anyhow::Error,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<CalendarError> for AppError {
    fn from(err: CalendarError) -> Self {
        let (status, kind) = match &err {
            CalendarError::InvalidDate(_) => (StatusCode::BAD_REQUEST, "invalid_date"),
            e if e.is_invalid_geo() => (StatusCode::BAD_REQUEST, "invalid_geo"),
            CalendarError::Store(_) | CalendarError::Io(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable")
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        AppError {
            status,
            kind,
            source: err.into(),
        }
    }
}

impl From<JoinError> for AppError {
    fn from(err: JoinError) -> Self {
        AppError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            kind: "query_aborted",
            source: err.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status().is_server_error() {
            tracing::error!(error = %self.source, kind = self.kind, "calendar query failed");
        } else {
            tracing::debug!(error = %self.source, kind = self.kind, "rejected calendar query");
        }
        let body = Json(ErrorResponse {
            error: self.source.to_string(),
            kind: self.kind,
        });
        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;
    use serde_json::Value;

    use super::*;

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_bad_input_is_a_client_error() {
        let err = AppError::from(CalendarError::InvalidDate("2026-13-01".to_string()));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["kind"], "invalid_date");
        assert!(json["error"].as_str().unwrap().contains("2026-13-01"));

        let geo = AppError::from(CalendarError::InvalidLatitude(120.0));
        assert_eq!(geo.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_store_failure_is_unavailable() {
        let response = AppError::from(CalendarError::Store("locked".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_json(response).await["kind"], "store_unavailable");

        let config = AppError::from(CalendarError::Config("bad".to_string()));
        assert_eq!(config.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
