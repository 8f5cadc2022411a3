use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// `path == value`, where `path` may end in a store lookup suffix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    pub path: String,
    pub value: JsonValue,
}

impl Predicate {
    pub fn new(path: impl Into<String>, value: JsonValue) -> Self {
        Self {
            path: path.into(),
            value,
        }
    }
}

/// OR-combination of predicates. A group with no predicates matches
/// every record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredicateGroup {
    any_of: Vec<Predicate>,
}

impl PredicateGroup {
    /// The group matching everything.
    pub fn identity() -> Self {
        Self::default()
    }

    /// One `path == value` predicate per path, OR-ed together.
    pub fn any_of<S: AsRef<str>>(value: &JsonValue, paths: &[S]) -> Self {
        Self {
            any_of: paths
                .iter()
                .map(|p| Predicate::new(p.as_ref(), value.clone()))
                .collect(),
        }
    }

    pub fn or(mut self, predicate: Predicate) -> Self {
        self.any_of.push(predicate);
        self
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.any_of
    }

    pub fn is_identity(&self) -> bool {
        self.any_of.is_empty()
    }

    /// Evaluates the group with a per-predicate test supplied by the store.
    /// Stops at the first matching predicate or the first error.
    pub fn try_matches<E>(
        &self,
        mut test: impl FnMut(&Predicate) -> Result<bool, E>,
    ) -> Result<bool, E> {
        if self.is_identity() {
            return Ok(true);
        }
        for p in &self.any_of {
            if test(p)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Shorthand for [`PredicateGroup::any_of`].
pub fn gen_or_group<S: AsRef<str>>(value: &JsonValue, paths: &[S]) -> PredicateGroup {
    PredicateGroup::any_of(value, paths)
}
