//! Transport-neutral responses and the failure -> response mapper.

use crate::errors::{ApiException, Extra, FilterError};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::error::Error as StdError;

/// Status code plus JSON body, ready to be written by the transport.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse {
    pub status: u16,
    pub body: JsonValue,
}

impl ApiResponse {
    pub fn new(status: u16, body: JsonValue) -> Self {
        Self { status, body }
    }
}

impl From<&ApiException> for ApiResponse {
    fn from(exc: &ApiException) -> Self {
        Self::new(exc.status(), exc.render())
    }
}

/// `200 {"detail": "success", ...extra}`.
pub fn success(extra: Extra) -> ApiResponse {
    success_with("success", extra)
}

pub fn success_with(detail: &str, extra: Extra) -> ApiResponse {
    let mut body = extra;
    body.insert("detail".into(), JsonValue::String(detail.to_string()));
    ApiResponse::new(200, JsonValue::Object(body))
}

pub fn bad_request(data: Extra) -> ApiResponse {
    ApiResponse::new(400, JsonValue::Object(data))
}

pub fn forbidden(data: Extra) -> ApiResponse {
    ApiResponse::new(403, JsonValue::Object(data))
}

pub fn internal_server_error(data: Extra) -> ApiResponse {
    ApiResponse::new(500, JsonValue::Object(data))
}

/// Renders a recognized structured failure.
///
/// Looks at `err` and then its `source()` chain for an [`ApiException`],
/// either bare or inside [`FilterError::Api`]. Returns `None` for anything
/// else so the caller can hand it to its generic handler.
pub fn map_to_response(err: &(dyn StdError + 'static)) -> Option<ApiResponse> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(exc) = recognize(e) {
            return Some(exc.into());
        }
        current = e.source();
    }
    None
}

fn recognize<'e>(err: &'e (dyn StdError + 'static)) -> Option<&'e ApiException> {
    if let Some(exc) = err.downcast_ref::<ApiException>() {
        return Some(exc);
    }
    match err.downcast_ref::<FilterError>() {
        Some(FilterError::Api(exc)) => Some(exc),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ConversionError, StoreError};
    use crate::model::Constraints;
    use serde_json::json;

    #[test]
    fn maps_not_found() {
        let mut filters = Constraints::new();
        filters.insert("id".into(), json!(5));
        let exc = ApiException::not_found("User", filters);
        let resp = map_to_response(&exc).unwrap();
        assert_eq!(resp.status, 404);
        assert_eq!(resp.body["model"], "User");
    }

    #[test]
    fn maps_wrapped_in_filter_error() {
        let err = FilterError::from(ApiException::forbidden("nope"));
        let resp = map_to_response(&err).unwrap();
        assert_eq!(resp, ApiResponse::new(403, json!({"message": "nope"})));
    }

    #[test]
    fn unrecognized_is_not_handled() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        assert!(map_to_response(&io).is_none());

        let store = FilterError::from(StoreError::new("bad field"));
        assert!(map_to_response(&store).is_none());

        let conversion = FilterError::from(ConversionError {
            message: "nope".into(),
            value: "x".into(),
            function: "int".into(),
            field: "age".into(),
            default: None,
        });
        assert!(map_to_response(&conversion).is_none());
    }

    #[test]
    fn finds_exception_behind_context() {
        let err = anyhow::Error::new(ApiException::bad_request("bad page")).context("listing users");
        let dyn_err: &(dyn StdError + 'static) = err.as_ref();
        let resp = map_to_response(dyn_err).unwrap();
        assert_eq!(resp.status, 400);
        assert_eq!(resp.body["message"], "bad page");
    }

    #[test]
    fn success_shape() {
        let mut extra = Extra::new();
        extra.insert("id".into(), json!("u1"));
        let resp = success(extra);
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, json!({"detail": "success", "id": "u1"}));
    }

    #[test]
    fn plain_helpers() {
        let mut data = Extra::new();
        data.insert("reason".into(), json!("x"));
        assert_eq!(bad_request(data.clone()).status, 400);
        assert_eq!(forbidden(data.clone()).status, 403);
        assert_eq!(internal_server_error(data).status, 500);
    }
}
