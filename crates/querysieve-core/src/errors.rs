use crate::model::Constraints;
use crate::util::plain;
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

/// Additional key/values merged into a rendered error body.
pub type Extra = Map<String, JsonValue>;

/// Failures that carry their own transport status and body shape.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiException {
    #[error("{}", not_found_message(.kind, .filters))]
    NotFound {
        kind: String,
        filters: Constraints,
        extra: Extra,
    },
    #[error("{message}")]
    Forbidden { message: String, extra: Extra },
    #[error("{message}")]
    BadRequest { message: String, extra: Extra },
    #[error("{message}")]
    AlreadyExists { message: String, extra: Extra },
    #[error("{field}: {message}")]
    Field {
        field: String,
        message: String,
        extra: Extra,
    },
    #[error("{message}")]
    Structure { message: String, extra: Extra },
}

pub const ALREADY_EXISTS_MESSAGE: &str = "data already exists";

impl ApiException {
    pub fn not_found(kind: impl Into<String>, filters: Constraints) -> Self {
        Self::NotFound {
            kind: kind.into(),
            filters,
            extra: Extra::new(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
            extra: Extra::new(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
            extra: Extra::new(),
        }
    }

    pub fn already_exists() -> Self {
        Self::AlreadyExists {
            message: ALREADY_EXISTS_MESSAGE.to_string(),
            extra: Extra::new(),
        }
    }

    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Field {
            field: field.into(),
            message: message.into(),
            extra: Extra::new(),
        }
    }

    pub fn structure(message: impl Into<String>) -> Self {
        Self::Structure {
            message: message.into(),
            extra: Extra::new(),
        }
    }

    /// Translate a query-function failure into a field error on the
    /// parameter that could not be converted.
    pub fn from_conversion(err: &ConversionError) -> Self {
        Self::field(err.field.clone(), err.message.clone())
            .with_extra("value", JsonValue::String(err.value.clone()))
    }

    /// Replaces the message. `NotFound` derives its message from the
    /// filters and ignores this.
    pub fn with_message(mut self, new: impl Into<String>) -> Self {
        match &mut self {
            Self::NotFound { .. } => {}
            Self::Forbidden { message, .. }
            | Self::BadRequest { message, .. }
            | Self::AlreadyExists { message, .. }
            | Self::Field { message, .. }
            | Self::Structure { message, .. } => *message = new.into(),
        }
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.extra_mut().insert(key.into(), value.into());
        self
    }

    fn extra_mut(&mut self) -> &mut Extra {
        match self {
            Self::NotFound { extra, .. }
            | Self::Forbidden { extra, .. }
            | Self::BadRequest { extra, .. }
            | Self::AlreadyExists { extra, .. }
            | Self::Field { extra, .. }
            | Self::Structure { extra, .. } => extra,
        }
    }

    pub fn extra(&self) -> &Extra {
        match self {
            Self::NotFound { extra, .. }
            | Self::Forbidden { extra, .. }
            | Self::BadRequest { extra, .. }
            | Self::AlreadyExists { extra, .. }
            | Self::Field { extra, .. }
            | Self::Structure { extra, .. } => extra,
        }
    }

    /// HTTP status code for this failure.
    pub fn status(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::Forbidden { .. } => 403,
            Self::BadRequest { .. } | Self::AlreadyExists { .. } | Self::Field { .. } => 400,
            Self::Structure { .. } => 500,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::NotFound { kind, filters, .. } => not_found_message(kind, filters),
            Self::Forbidden { message, .. }
            | Self::BadRequest { message, .. }
            | Self::AlreadyExists { message, .. }
            | Self::Field { message, .. }
            | Self::Structure { message, .. } => message.clone(),
        }
    }

    /// JSON body for the response. Always has a `message` key; the
    /// variant-specific keys win over any `extra` entry of the same name.
    pub fn render(&self) -> JsonValue {
        let mut body = self.extra().clone();
        body.insert("message".into(), JsonValue::String(self.message()));
        match self {
            Self::NotFound { kind, filters, .. } => {
                body.insert("model".into(), JsonValue::String(kind.clone()));
                let snapshot: Map<String, JsonValue> = filters
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                body.insert("filters".into(), JsonValue::Object(snapshot));
            }
            Self::Field { field, .. } => {
                body.insert("field".into(), JsonValue::String(field.clone()));
            }
            _ => {}
        }
        JsonValue::Object(body)
    }
}

fn not_found_message(kind: &str, filters: &Constraints) -> String {
    let condition = filters
        .iter()
        .map(|(k, v)| format!("{}={}", k, plain(v)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("can not find {} model about '{}' condition", kind, condition)
}

/// A query function could not convert a raw parameter value.
///
/// Not an HTTP failure by itself: the caller decides whether it becomes a
/// bad request (see [`ApiException::from_conversion`]) or falls back to
/// `default`.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("cannot convert {field}={value:?} with {function}: {message}")]
pub struct ConversionError {
    pub message: String,
    pub value: String,
    pub function: String,
    pub field: String,
    pub default: Option<JsonValue>,
}

/// Opaque failure raised by the store while executing a query.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("store error: {0}")]
pub struct StoreError(pub String);

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Everything the filter engine can fail with.
#[derive(Error, Debug)]
pub enum FilterError {
    #[error(transparent)]
    Api(#[from] ApiException),
    #[error(transparent)]
    Conversion(#[from] ConversionError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, FilterError>;
