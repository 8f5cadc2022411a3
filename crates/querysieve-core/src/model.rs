use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Equality constraints, field path -> value.
pub type Constraints = BTreeMap<String, JsonValue>;

/// Decoded request query parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterBag(HashMap<String, String>);

impl ParameterBag {
    pub fn new(params: HashMap<String, String>) -> Self {
        Self(params)
    }

    /// Raw value, including empty strings.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Value only when it is present and non-empty.
    pub fn provided(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.is_empty())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ParameterBag {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// What a request key filters on: one field path, or any of several.
///
/// In JSON a string is `Single` and an array is `AnyOf`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterTarget {
    Single(String),
    AnyOf(Vec<String>),
}

impl From<&str> for FilterTarget {
    fn from(path: &str) -> Self {
        Self::Single(path.to_string())
    }
}

impl From<String> for FilterTarget {
    fn from(path: String) -> Self {
        Self::Single(path)
    }
}

impl<S: Into<String>> From<Vec<S>> for FilterTarget {
    fn from(paths: Vec<S>) -> Self {
        Self::AnyOf(paths.into_iter().map(Into::into).collect())
    }
}

impl<S: Into<String>, const N: usize> From<[S; N]> for FilterTarget {
    fn from(paths: [S; N]) -> Self {
        Self::AnyOf(paths.into_iter().map(Into::into).collect())
    }
}

/// Ordered list of request key -> target entries, applied in insertion order.
///
/// Keys are unique: re-inserting a key replaces its target and keeps its
/// original position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterMap(Vec<(String, FilterTarget)>);

impl FilterMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(mut self, key: impl Into<String>, target: impl Into<FilterTarget>) -> Self {
        self.insert(key.into(), target.into());
        self
    }

    fn insert(&mut self, key: String, target: FilterTarget) {
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = target,
            None => self.0.push((key, target)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FilterTarget)> {
        self.0.iter().map(|(k, t)| (k.as_str(), t))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, T: Into<FilterTarget>> FromIterator<(K, T)> for FilterMap {
    fn from_iter<I: IntoIterator<Item = (K, T)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (k, t) in iter {
            map.insert(k.into(), t.into());
        }
        map
    }
}

// (De)serialized as a JSON object, keeping document order.
impl Serialize for FilterMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, t) in &self.0 {
            map.serialize_entry(k, t)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for FilterMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FilterMapVisitor;

        impl<'de> Visitor<'de> for FilterMapVisitor {
            type Value = FilterMap;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object of request key to field path(s)")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<FilterMap, A::Error> {
                let mut out = FilterMap(Vec::with_capacity(map.size_hint().unwrap_or(0)));
                while let Some((k, t)) = map.next_entry::<String, FilterTarget>()? {
                    out.insert(k, t);
                }
                Ok(out)
            }
        }

        deserializer.deserialize_map(FilterMapVisitor)
    }
}

/// Search type label -> target searched with the keyword.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchMap(BTreeMap<String, FilterTarget>);

impl SearchMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(mut self, search_type: impl Into<String>, target: impl Into<FilterTarget>) -> Self {
        self.0.insert(search_type.into(), target.into());
        self
    }

    pub fn get(&self, search_type: &str) -> Option<&FilterTarget> {
        self.0.get(search_type)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, T: Into<FilterTarget>> FromIterator<(K, T)> for SearchMap {
    fn from_iter<I: IntoIterator<Item = (K, T)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, t)| (k.into(), t.into()))
                .collect(),
        )
    }
}
