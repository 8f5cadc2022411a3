use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use ulid::Ulid;

/// A stored JSON object. `body["id"]` always mirrors `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "JsonValue", try_from = "JsonValue")]
pub struct Record {
    pub id: String,
    pub body: JsonValue,
}

impl Record {
    /// Builds a record from a JSON object, taking its `id` (string or
    /// number) or assigning a fresh ULID.
    pub fn from_body(body: JsonValue) -> Result<Self, String> {
        let JsonValue::Object(mut fields) = body else {
            return Err("record body must be a JSON object".into());
        };
        let id = match fields.get("id") {
            Some(JsonValue::String(s)) if !s.is_empty() => s.clone(),
            Some(JsonValue::Number(n)) => n.to_string(),
            None | Some(JsonValue::Null) => Ulid::new().to_string(),
            Some(other) => return Err(format!("unsupported id {}", other)),
        };
        fields.insert("id".into(), JsonValue::String(id.clone()));
        Ok(Self {
            id,
            body: JsonValue::Object(fields),
        })
    }

    pub fn fields(&self) -> Option<&Map<String, JsonValue>> {
        self.body.as_object()
    }
}

impl From<Record> for JsonValue {
    fn from(r: Record) -> Self {
        r.body
    }
}

impl TryFrom<JsonValue> for Record {
    type Error = String;

    fn try_from(body: JsonValue) -> Result<Self, Self::Error> {
        Self::from_body(body)
    }
}
