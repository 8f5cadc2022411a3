//! Query functions: value transformers picked by a token inside a request key.
//!
//! A filter-map key such as `age_lowest__int` reads the `age_lowest`
//! parameter and converts it with the function registered under `__int`.

use crate::errors::ConversionError;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

type Transform = dyn Fn(&str) -> Result<JsonValue, String> + Send + Sync;

/// A named, pure `raw string -> value` conversion.
#[derive(Clone)]
pub struct QueryFunction {
    name: String,
    transform: Arc<Transform>,
    default: Option<JsonValue>,
}

impl QueryFunction {
    pub fn new<F>(name: impl Into<String>, transform: F) -> Self
    where
        F: Fn(&str) -> Result<JsonValue, String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            transform: Arc::new(transform),
            default: None,
        }
    }

    /// Fallback value reported alongside a conversion failure.
    pub fn with_default(mut self, default: JsonValue) -> Self {
        self.default = Some(default);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default_value(&self) -> Option<&JsonValue> {
        self.default.as_ref()
    }

    /// Converts `raw`, read from the parameter `field`.
    pub fn apply(&self, field: &str, raw: &str) -> Result<JsonValue, ConversionError> {
        (self.transform)(raw).map_err(|message| ConversionError {
            message,
            value: raw.to_string(),
            function: self.name.clone(),
            field: field.to_string(),
            default: self.default.clone(),
        })
    }
}

impl fmt::Debug for QueryFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryFunction")
            .field("name", &self.name)
            .field("default", &self.default)
            .finish()
    }
}

/// Token -> function table. Lookup order is registration order.
#[derive(Debug, Clone, Default)]
pub struct QueryFunctionRegistry {
    entries: Vec<(String, QueryFunction)>,
}

static GLOBAL: Lazy<QueryFunctionRegistry> = Lazy::new(QueryFunctionRegistry::builtin);

impl QueryFunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry of the built-in functions, built on first use.
    pub fn global() -> &'static QueryFunctionRegistry {
        &GLOBAL
    }

    /// Appends `function` under `token`. Empty tokens would match every key
    /// and are ignored.
    pub fn register(mut self, token: impl Into<String>, function: QueryFunction) -> Self {
        let token = token.into();
        if token.is_empty() {
            debug!(function = function.name(), "ignoring query function with empty token");
            return self;
        }
        self.entries.push((token, function));
        self
    }

    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(t, _)| t.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Finds the first registered token occurring anywhere in `key`.
    ///
    /// On a hit, returns `key` with the token removed together with its
    /// function; otherwise `key` unchanged and `None`.
    pub fn resolve<'r>(&'r self, key: &str) -> (String, Option<&'r QueryFunction>) {
        for (token, function) in &self.entries {
            if key.contains(token.as_str()) {
                let stripped = key.replace(token.as_str(), "");
                debug!(key, token = token.as_str(), stripped = stripped.as_str(), "resolved query function");
                return (stripped, Some(function));
            }
        }
        (key.to_string(), None)
    }

    /// `__datetime`, `__date`, `__int`, `__float`, `__bool`, `__list`.
    ///
    /// `__datetime` is registered before `__date`, which is a substring of it.
    pub fn builtin() -> Self {
        Self::new()
            .register("__datetime", QueryFunction::new("datetime", to_datetime))
            .register("__date", QueryFunction::new("date", to_date))
            .register("__int", QueryFunction::new("int", to_int))
            .register("__float", QueryFunction::new("float", to_float))
            .register("__bool", QueryFunction::new("bool", to_bool))
            .register("__list", QueryFunction::new("list", to_list))
    }
}

fn to_int(raw: &str) -> Result<JsonValue, String> {
    raw.trim()
        .parse::<i64>()
        .map(JsonValue::from)
        .map_err(|e| e.to_string())
}

fn to_float(raw: &str) -> Result<JsonValue, String> {
    let f = raw.trim().parse::<f64>().map_err(|e| e.to_string())?;
    serde_json::Number::from_f64(f)
        .map(JsonValue::Number)
        .ok_or_else(|| format!("{} is not a finite number", raw))
}

fn to_bool(raw: &str) -> Result<JsonValue, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(JsonValue::Bool(true)),
        "false" | "0" | "no" | "off" => Ok(JsonValue::Bool(false)),
        other => Err(format!("'{}' is not a boolean", other)),
    }
}

fn to_date(raw: &str) -> Result<JsonValue, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map(|d| JsonValue::String(d.format("%Y-%m-%d").to_string()))
        .map_err(|e| e.to_string())
}

fn to_datetime(raw: &str) -> Result<JsonValue, String> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|dt| {
            JsonValue::String(
                dt.with_timezone(&Utc)
                    .to_rfc3339_opts(SecondsFormat::AutoSi, true),
            )
        })
        .map_err(|e| e.to_string())
}

fn to_list(raw: &str) -> Result<JsonValue, String> {
    Ok(JsonValue::Array(
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| JsonValue::String(s.to_string()))
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolve_strips_token() {
        let reg = QueryFunctionRegistry::builtin();
        let (key, f) = reg.resolve("age_lowest__int");
        assert_eq!(key, "age_lowest");
        assert_eq!(f.map(QueryFunction::name), Some("int"));
    }

    #[test]
    fn resolve_without_token_returns_key() {
        let reg = QueryFunctionRegistry::builtin();
        let (key, f) = reg.resolve("name");
        assert_eq!(key, "name");
        assert!(f.is_none());
    }

    #[test]
    fn first_registered_token_wins() {
        let reg = QueryFunctionRegistry::builtin();
        let (key, f) = reg.resolve("created__datetime");
        assert_eq!(key, "created");
        assert_eq!(f.map(QueryFunction::name), Some("datetime"));

        let reg = QueryFunctionRegistry::new()
            .register("__date", QueryFunction::new("date", to_date))
            .register("__datetime", QueryFunction::new("datetime", to_datetime));
        let (key, f) = reg.resolve("created__datetime");
        assert_eq!(key, "createdtime");
        assert_eq!(f.map(QueryFunction::name), Some("date"));
    }

    #[test]
    fn token_matches_anywhere() {
        let reg = QueryFunctionRegistry::builtin();
        let (key, f) = reg.resolve("__intage");
        assert_eq!(key, "age");
        assert!(f.is_some());
    }

    #[test]
    fn resolution_is_deterministic() {
        let reg = QueryFunctionRegistry::global();
        let first = reg.resolve("tags__list");
        for _ in 0..10 {
            let again = reg.resolve("tags__list");
            assert_eq!(again.0, first.0);
            assert_eq!(again.1.map(QueryFunction::name), first.1.map(QueryFunction::name));
        }
    }

    #[test]
    fn empty_token_is_ignored() {
        let reg = QueryFunctionRegistry::new().register("", QueryFunction::new("int", to_int));
        assert!(reg.is_empty());
    }

    #[test]
    fn conversion_failure_carries_context() {
        let f = QueryFunction::new("int", to_int).with_default(json!(0));
        let err = f.apply("age", "abc").unwrap_err();
        assert_eq!(err.value, "abc");
        assert_eq!(err.function, "int");
        assert_eq!(err.field, "age");
        assert_eq!(err.default, Some(json!(0)));
    }

    #[test]
    fn builtin_conversions() {
        assert_eq!(to_int(" 20 ").unwrap(), json!(20));
        assert_eq!(to_float("1.5").unwrap(), json!(1.5));
        assert_eq!(to_bool("Yes").unwrap(), json!(true));
        assert_eq!(to_bool("0").unwrap(), json!(false));
        assert!(to_bool("maybe").is_err());
        assert_eq!(to_date("2024-02-29").unwrap(), json!("2024-02-29"));
        assert!(to_date("2023-02-29").is_err());
        assert_eq!(
            to_datetime("2024-01-01T10:00:00+02:00").unwrap(),
            json!("2024-01-01T08:00:00Z")
        );
        assert_eq!(to_list("a, b,,c").unwrap(), json!(["a", "b", "c"]));
    }

    #[test]
    fn global_is_shared_across_threads() {
        let start = Arc::new(std::sync::Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let start = Arc::clone(&start);
                std::thread::spawn(move || {
                    start.wait();
                    let reg = QueryFunctionRegistry::global();
                    let (key, f) = reg.resolve("x__int");
                    (
                        reg as *const QueryFunctionRegistry as usize,
                        key,
                        f.map(|f| f.name().to_string()),
                    )
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let first = &results[0];
        assert_eq!(first.1, "x");
        assert_eq!(first.2.as_deref(), Some("int"));
        assert!(results.iter().all(|r| r == first));
        assert_eq!(
            first.0,
            QueryFunctionRegistry::global() as *const QueryFunctionRegistry as usize
        );
    }
}
