use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use querysieve_core::{
    map_to_response, response, ApiException, ApiResponse, FilterError, StoreError,
};
use serde_json::{json, Map};
use thiserror::Error;
use tracing::warn;

/// Everything a handler can fail with.
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Filter(#[from] FilterError),
    #[error(transparent)]
    Api(#[from] ApiException),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        Self::Filter(FilterError::Store(err))
    }
}

impl AppError {
    /// Conversion failures become field errors on the offending parameter;
    /// structured failures go through the mapper; anything else is a
    /// generic 500.
    pub fn to_api_response(&self) -> ApiResponse {
        let mapped = match self {
            Self::Filter(FilterError::Conversion(err)) => {
                Some(ApiResponse::from(&ApiException::from_conversion(err)))
            }
            Self::Filter(err) => map_to_response(err),
            Self::Api(exc) => map_to_response(exc),
        };
        mapped.unwrap_or_else(|| {
            warn!(error = %self, "unhandled error");
            let mut body = Map::new();
            body.insert("message".into(), json!("internal server error"));
            response::internal_server_error(body)
        })
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        reply(self.to_api_response())
    }
}

/// Writes a transport-neutral response.
pub fn reply(resp: ApiResponse) -> Response {
    let status = StatusCode::from_u16(resp.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(resp.body)).into_response()
}
