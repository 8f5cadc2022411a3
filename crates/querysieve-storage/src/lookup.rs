//! Field-path evaluation: `a__b__lookup` against JSON records.

use querysieve_core::{Predicate, StoreError};
use serde_json::Value as JsonValue;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Exact,
    IExact,
    Contains,
    IContains,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    StartsWith,
    IStartsWith,
    EndsWith,
    IEndsWith,
    IsNull,
}

impl Lookup {
    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "exact" => Self::Exact,
            "iexact" => Self::IExact,
            "contains" => Self::Contains,
            "icontains" => Self::IContains,
            "gt" => Self::Gt,
            "gte" => Self::Gte,
            "lt" => Self::Lt,
            "lte" => Self::Lte,
            "in" => Self::In,
            "startswith" => Self::StartsWith,
            "istartswith" => Self::IStartsWith,
            "endswith" => Self::EndsWith,
            "iendswith" => Self::IEndsWith,
            "isnull" => Self::IsNull,
            _ => return None,
        })
    }
}

/// A parsed field path: nested field segments plus the trailing lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath<'p> {
    pub segments: Vec<&'p str>,
    pub lookup: Lookup,
}

impl<'p> FieldPath<'p> {
    pub fn parse(path: &'p str) -> Result<Self, StoreError> {
        let mut segments: Vec<&str> = path.split("__").collect();
        let lookup = match segments.last().and_then(|s| Lookup::parse(s)) {
            Some(l) if segments.len() > 1 => {
                segments.pop();
                l
            }
            _ => Lookup::Exact,
        };
        if segments.iter().any(|s| s.is_empty()) {
            return Err(StoreError::new(format!("invalid field path '{}'", path)));
        }
        Ok(Self { segments, lookup })
    }

    pub fn root(&self) -> &str {
        self.segments[0]
    }

    /// Every value the path reaches; arrays met before the last segment fan
    /// out, as a join would.
    pub fn values<'r>(&self, body: &'r JsonValue) -> Vec<&'r JsonValue> {
        let mut current = vec![body];
        for (i, seg) in self.segments.iter().enumerate() {
            let mut next = Vec::new();
            for v in current {
                let v = match v {
                    JsonValue::Array(items) if i > 0 => {
                        next.extend(items.iter().filter_map(|item| item.get(*seg)));
                        continue;
                    }
                    other => other,
                };
                if let Some(found) = v.get(*seg) {
                    next.push(found);
                }
            }
            current = next;
        }
        current
    }
}

/// Does the predicate hold for `body`?
pub fn matches(body: &JsonValue, predicate: &Predicate) -> Result<bool, StoreError> {
    let path = FieldPath::parse(&predicate.path)?;
    let values = path.values(body);

    if path.lookup == Lookup::IsNull {
        let want_null = as_bool(&predicate.value).ok_or_else(|| {
            StoreError::new(format!("isnull expects a boolean for '{}'", predicate.path))
        })?;
        let is_null = values.iter().all(|v| v.is_null());
        return Ok(is_null == want_null);
    }

    for field in values {
        if test(path.lookup, field, &predicate.value, &predicate.path)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn test(lookup: Lookup, field: &JsonValue, param: &JsonValue, path: &str) -> Result<bool, StoreError> {
    let param = coerce(param, field);
    Ok(match lookup {
        Lookup::Exact => loosely_equal(field, &param),
        Lookup::IExact => match (field.as_str(), param.as_str()) {
            (Some(f), Some(p)) => f.to_lowercase() == p.to_lowercase(),
            _ => loosely_equal(field, &param),
        },
        Lookup::Contains => contains(field, &param, false),
        Lookup::IContains => contains(field, &param, true),
        Lookup::Gt => compare(field, &param) == Some(Ordering::Greater),
        Lookup::Gte => matches!(compare(field, &param), Some(Ordering::Greater | Ordering::Equal)),
        Lookup::Lt => compare(field, &param) == Some(Ordering::Less),
        Lookup::Lte => matches!(compare(field, &param), Some(Ordering::Less | Ordering::Equal)),
        Lookup::In => {
            let candidates: Vec<JsonValue> = match &param {
                JsonValue::Array(items) => items.clone(),
                JsonValue::String(s) => s
                    .split(',')
                    .map(|p| JsonValue::String(p.trim().to_string()))
                    .collect(),
                _ => return Err(StoreError::new(format!("in expects a list for '{}'", path))),
            };
            candidates
                .iter()
                .any(|c| loosely_equal(field, &coerce(c, field)))
        }
        Lookup::StartsWith => str_test(field, &param, false, |f, p| f.starts_with(p)),
        Lookup::IStartsWith => str_test(field, &param, true, |f, p| f.starts_with(p)),
        Lookup::EndsWith => str_test(field, &param, false, |f, p| f.ends_with(p)),
        Lookup::IEndsWith => str_test(field, &param, true, |f, p| f.ends_with(p)),
        // evaluated over all reached values in `matches`
        Lookup::IsNull => false,
    })
}

/// Read `param` as the field's type when that is possible.
fn coerce(param: &JsonValue, field: &JsonValue) -> JsonValue {
    match (param, field) {
        (JsonValue::String(s), JsonValue::Number(_)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(JsonValue::Number)
            .unwrap_or_else(|| param.clone()),
        // numbers compare with string fields by their string form
        (JsonValue::Number(n), JsonValue::String(_)) => JsonValue::String(n.to_string()),
        (JsonValue::String(_), JsonValue::Bool(_)) => {
            as_bool(param).map(JsonValue::Bool).unwrap_or_else(|| param.clone())
        }
        _ => param.clone(),
    }
}

fn as_bool(v: &JsonValue) -> Option<bool> {
    match v {
        JsonValue::Bool(b) => Some(*b),
        JsonValue::String(s) => match s.to_ascii_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        JsonValue::Number(n) => n.as_i64().map(|i| i != 0),
        _ => None,
    }
}

fn loosely_equal(a: &JsonValue, b: &JsonValue) -> bool {
    match (a, b) {
        (JsonValue::Number(x), JsonValue::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn contains(field: &JsonValue, param: &JsonValue, fold: bool) -> bool {
    match field {
        JsonValue::Array(items) => items.iter().any(|item| match (item, param) {
            (JsonValue::String(i), JsonValue::String(p)) if fold => i.to_lowercase() == p.to_lowercase(),
            _ => loosely_equal(item, &coerce(param, item)),
        }),
        _ => str_test(field, param, fold, |f, p| f.contains(p)),
    }
}

fn str_test(field: &JsonValue, param: &JsonValue, fold: bool, f: impl Fn(&str, &str) -> bool) -> bool {
    let (Some(field), Some(param)) = (field.as_str(), param.as_str()) else {
        return false;
    };
    if fold {
        f(&field.to_lowercase(), &param.to_lowercase())
    } else {
        f(field, param)
    }
}

/// Ordering between two comparable values: numbers, strings or booleans.
pub fn compare(a: &JsonValue, b: &JsonValue) -> Option<Ordering> {
    match (a, b) {
        (JsonValue::Number(x), JsonValue::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (JsonValue::String(x), JsonValue::String(y)) => Some(x.cmp(y)),
        (JsonValue::Bool(x), JsonValue::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Total order used for sorting: missing/null first, then by type, then
/// by value.
pub fn sort_cmp(a: Option<&JsonValue>, b: Option<&JsonValue>) -> Ordering {
    fn rank(v: Option<&JsonValue>) -> u8 {
        match v {
            None | Some(JsonValue::Null) => 0,
            Some(JsonValue::Bool(_)) => 1,
            Some(JsonValue::Number(_)) => 2,
            Some(JsonValue::String(_)) => 3,
            Some(JsonValue::Array(_)) => 4,
            Some(JsonValue::Object(_)) => 5,
        }
    }
    match (a, b) {
        (Some(x), Some(y)) => compare(x, y).unwrap_or_else(|| rank(a).cmp(&rank(b))),
        _ => rank(a).cmp(&rank(b)),
    }
}
