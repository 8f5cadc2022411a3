use crate::errors::{ApiException, Result};
use crate::model::Constraints;
use crate::query::Query;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::cmp::Ordering;
use std::collections::BTreeMap;

pub fn get_object_or_none<Q: Query>(query: &Q, constraints: &Constraints) -> Result<Option<Q::Record>> {
    Ok(query.filter(&[], constraints).first()?)
}

pub fn get_object_or_404<Q: Query>(query: &Q, constraints: &Constraints) -> Result<Q::Record> {
    get_object_or_none(query, constraints)?
        .ok_or_else(|| ApiException::not_found(query.kind(), constraints.clone()).into())
}

/// Evaluates `a <op> b` for `==`, `!=`, `<`, `<=`, `>`, `>=`.
///
/// Ordering is defined between two numbers or two strings; any other
/// pairing, and any unknown operator, is false.
pub fn compare(a: &JsonValue, op: &str, b: &JsonValue) -> bool {
    match op {
        "==" => a == b,
        "!=" => a != b,
        "<" => partial_cmp(a, b) == Some(Ordering::Less),
        "<=" => matches!(partial_cmp(a, b), Some(Ordering::Less | Ordering::Equal)),
        ">" => partial_cmp(a, b) == Some(Ordering::Greater),
        ">=" => matches!(partial_cmp(a, b), Some(Ordering::Greater | Ordering::Equal)),
        _ => false,
    }
}

fn partial_cmp(a: &JsonValue, b: &JsonValue) -> Option<Ordering> {
    match (a, b) {
        (JsonValue::Number(x), JsonValue::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (JsonValue::String(x), JsonValue::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// `(operator, operand)` pairs that the current status must satisfy.
pub type Conditions = Vec<(String, JsonValue)>;

/// Allowed status transitions, per status family:
/// family -> target status -> conditions on the current status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusConditions(BTreeMap<String, BTreeMap<String, Conditions>>);

impl StatusConditions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rule(
        mut self,
        family: impl Into<String>,
        change_to: impl Into<String>,
        conditions: Conditions,
    ) -> Self {
        self.0
            .entry(family.into())
            .or_default()
            .insert(change_to.into(), conditions);
        self
    }

    /// True when every condition for `family`/`change_to` holds for
    /// `current`. Unknown families or targets are never allowed.
    pub fn can_transition(&self, family: &str, change_to: &str, current: &JsonValue) -> bool {
        let Some(conditions) = self.0.get(family).and_then(|f| f.get(change_to)) else {
            return false;
        };
        conditions
            .iter()
            .all(|(op, target)| compare(current, op, target))
    }
}

pub const UNKNOWN_LABEL: &str = "unknown";

/// Readable names of status values, per status family.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusLabels(BTreeMap<String, BTreeMap<String, String>>);

impl StatusLabels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn label(
        mut self,
        family: impl Into<String>,
        status: impl Into<String>,
        readable: impl Into<String>,
    ) -> Self {
        self.0
            .entry(family.into())
            .or_default()
            .insert(status.into(), readable.into());
        self
    }

    pub fn readable(&self, family: &str, status: &str) -> &str {
        self.0
            .get(family)
            .and_then(|f| f.get(status))
            .map(String::as_str)
            .unwrap_or(UNKNOWN_LABEL)
    }
}
