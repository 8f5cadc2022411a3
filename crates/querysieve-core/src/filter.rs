//! Request parameters -> query refinement.
//!
//! ```ignore
//! let query = QueryFilter::new(store.query("users")?, &params)
//!     .filter_map(&filter_map)?
//!     .search(&search_map)
//!     .ordering()
//!     .into_query();
//! ```

use crate::errors::{ApiException, Result};
use crate::functions::QueryFunctionRegistry;
use crate::model::{Constraints, FilterMap, FilterTarget, ParameterBag, SearchMap};
use crate::predicate::PredicateGroup;
use crate::query::Query;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::debug;

/// Names of the reserved request parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterKeys {
    pub ordering: String,
    pub search_keyword: String,
    pub search_type: String,
    pub default_search_type: String,
}

impl Default for FilterKeys {
    fn default() -> Self {
        Self {
            ordering: "ordering".into(),
            search_keyword: "search_keyword".into(),
            search_type: "search_type".into(),
            default_search_type: "all".into(),
        }
    }
}

/// Fluent filter engine over a [`Query`].
#[derive(Debug, Clone)]
pub struct QueryFilter<'a, Q: Query> {
    query: Q,
    params: &'a ParameterBag,
    registry: &'a QueryFunctionRegistry,
    keys: FilterKeys,
}

impl<'a, Q: Query> QueryFilter<'a, Q> {
    /// Engine using the process-wide built-in query functions.
    pub fn new(query: Q, params: &'a ParameterBag) -> Self {
        Self::with_registry(query, params, QueryFunctionRegistry::global())
    }

    pub fn with_registry(
        query: Q,
        params: &'a ParameterBag,
        registry: &'a QueryFunctionRegistry,
    ) -> Self {
        Self {
            query,
            params,
            registry,
            keys: FilterKeys::default(),
        }
    }

    pub fn with_keys(mut self, keys: FilterKeys) -> Self {
        self.keys = keys;
        self
    }

    pub fn query(&self) -> &Q {
        &self.query
    }

    pub fn into_query(self) -> Q {
        self.query
    }

    /// Applies every filter-map entry whose parameter is provided.
    ///
    /// `Single` targets become equality constraints (a later entry for the
    /// same target replaces an earlier one); `AnyOf` targets become OR
    /// groups that are AND-ed together. The result is always deduplicated.
    pub fn filter_map(mut self, filter_map: &FilterMap) -> Result<Self> {
        let mut groups = Vec::new();
        let mut equality = Constraints::new();

        for (map_key, target) in filter_map.iter() {
            let (lookup_key, function) = self.registry.resolve(map_key);
            let Some(raw) = self.params.provided(&lookup_key) else {
                debug!(key = lookup_key.as_str(), "parameter not provided, skipping");
                continue;
            };
            let value = match function {
                Some(f) => f.apply(&lookup_key, raw)?,
                None => JsonValue::String(raw.to_string()),
            };
            match target {
                FilterTarget::AnyOf(paths) => groups.push(PredicateGroup::any_of(&value, paths)),
                FilterTarget::Single(path) => {
                    if let Some(previous) = equality.insert(path.clone(), value) {
                        debug!(path = path.as_str(), %previous, "equality constraint replaced");
                    }
                }
            }
        }

        debug!(groups = groups.len(), constraints = equality.len(), "filter map applied");
        self.query = self.query.filter(&groups, &equality).distinct();
        Ok(self)
    }

    /// Free-text search over the target selected by the search-type
    /// parameter. No-op without a keyword or a matching target.
    pub fn search(mut self, search_map: &SearchMap) -> Self {
        let Some(keyword) = self.params.provided(&self.keys.search_keyword) else {
            return self;
        };
        let search_type = self
            .params
            .provided(&self.keys.search_type)
            .unwrap_or(&self.keys.default_search_type);
        let Some(target) = search_map.get(search_type) else {
            debug!(search_type, "no search target for type");
            return self;
        };

        let keyword = JsonValue::String(keyword.to_string());
        self.query = match target {
            FilterTarget::AnyOf(paths) => self
                .query
                .filter(&[PredicateGroup::any_of(&keyword, paths)], &Constraints::new()),
            FilterTarget::Single(path) => {
                let mut equality = Constraints::new();
                equality.insert(path.clone(), keyword);
                self.query.filter(&[], &equality)
            }
        };
        self
    }

    /// Adds equality constraints unconditionally.
    pub fn extra(mut self, constraints: &Constraints) -> Self {
        if !constraints.is_empty() {
            self.query = self.query.filter(&[], constraints);
        }
        self
    }

    /// Orders by the comma-separated paths of the ordering parameter.
    pub fn ordering(mut self) -> Self {
        let Some(raw) = self.params.provided(&self.keys.ordering) else {
            return self;
        };
        let paths: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(String::from)
            .collect();
        if !paths.is_empty() {
            self.query = self.query.order(&paths);
        }
        self
    }

    /// First record matching `constraints`.
    ///
    /// With `raise_not_found`, a miss is `ApiException::NotFound` carrying
    /// the record kind and `constraints`; otherwise `Ok(None)`.
    pub fn get(&self, raise_not_found: bool, constraints: &Constraints) -> Result<Option<Q::Record>> {
        let record = self.query.filter(&[], constraints).first()?;
        if record.is_none() && raise_not_found {
            return Err(ApiException::not_found(self.query.kind(), constraints.clone()).into());
        }
        Ok(record)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::errors::{FilterError, StoreError};
    use serde_json::json;

    /// Records what the engine asked of it.
    #[derive(Debug, Clone, Default, PartialEq)]
    pub(crate) struct Recorder {
        pub ops: Vec<Op>,
        pub rows: Vec<JsonValue>,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum Op {
        Filter(Vec<PredicateGroup>, Constraints),
        Order(Vec<String>),
        Distinct,
    }

    impl Query for Recorder {
        type Record = JsonValue;

        fn kind(&self) -> &str {
            "User"
        }

        fn filter(&self, groups: &[PredicateGroup], equality: &Constraints) -> Self {
            let mut next = self.clone();
            next.ops.push(Op::Filter(groups.to_vec(), equality.clone()));
            next
        }

        fn order(&self, paths: &[String]) -> Self {
            let mut next = self.clone();
            next.ops.push(Op::Order(paths.to_vec()));
            next
        }

        fn distinct(&self) -> Self {
            let mut next = self.clone();
            next.ops.push(Op::Distinct);
            next
        }

        fn first(&self) -> std::result::Result<Option<JsonValue>, StoreError> {
            Ok(self.rows.first().cloned())
        }
    }

    fn params(pairs: &[(&str, &str)]) -> ParameterBag {
        pairs.iter().copied().collect()
    }

    fn constraints(pairs: &[(&str, JsonValue)]) -> Constraints {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn filter_map_builds_equality_and_distinct() {
        let p = params(&[("name", "Jo"), ("age_lowest", "20")]);
        let map = FilterMap::new()
            .entry("name", "name__contains")
            .entry("age_lowest__int", "age__gte");
        let q = QueryFilter::new(Recorder::default(), &p)
            .filter_map(&map)
            .unwrap()
            .into_query();
        assert_eq!(
            q.ops,
            vec![
                Op::Filter(
                    vec![],
                    constraints(&[("name__contains", json!("Jo")), ("age__gte", json!(20))])
                ),
                Op::Distinct,
            ]
        );
    }

    #[test]
    fn absent_and_empty_parameters_are_skipped() {
        let p = params(&[("name", "")]);
        let map = FilterMap::new()
            .entry("name", "name")
            .entry("email", ["email", "backup_email"]);
        let q = QueryFilter::new(Recorder::default(), &p)
            .filter_map(&map)
            .unwrap()
            .into_query();
        assert_eq!(q.ops, vec![Op::Filter(vec![], Constraints::new()), Op::Distinct]);
    }

    #[test]
    fn sequence_target_becomes_or_group() {
        let p = params(&[("who", "jo")]);
        let map = FilterMap::new()
            .entry("who", ["first_name", "last_name"])
            .entry("who", ["nickname"]);
        let q = QueryFilter::new(Recorder::default(), &p)
            .filter_map(&map)
            .unwrap()
            .into_query();
        let expected = vec![
            PredicateGroup::any_of(&json!("jo"), &["first_name", "last_name"]),
            PredicateGroup::any_of(&json!("jo"), &["nickname"]),
        ];
        assert_eq!(q.ops[0], Op::Filter(expected, Constraints::new()));
    }

    #[test]
    fn last_entry_wins_for_same_target() {
        let p = params(&[("a", "1"), ("b", "2")]);
        let map = FilterMap::new().entry("a", "field").entry("b", "field");
        let q = QueryFilter::new(Recorder::default(), &p)
            .filter_map(&map)
            .unwrap()
            .into_query();
        assert_eq!(
            q.ops[0],
            Op::Filter(vec![], constraints(&[("field", json!("2"))]))
        );
    }

    #[test]
    fn conversion_failure_propagates() {
        let p = params(&[("age", "old")]);
        let map = FilterMap::new().entry("age__int", "age");
        let err = QueryFilter::new(Recorder::default(), &p)
            .filter_map(&map)
            .unwrap_err();
        match err {
            FilterError::Conversion(c) => {
                assert_eq!(c.value, "old");
                assert_eq!(c.field, "age");
                assert_eq!(c.function, "int");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn custom_registry_is_used() {
        let registry = QueryFunctionRegistry::new().register(
            "__upper",
            crate::functions::QueryFunction::new("upper", |raw| Ok(json!(raw.to_uppercase()))),
        );
        let p = params(&[("code", "ab")]);
        let map = FilterMap::new().entry("code__upper", "code");
        let q = QueryFilter::with_registry(Recorder::default(), &p, &registry)
            .filter_map(&map)
            .unwrap()
            .into_query();
        assert_eq!(q.ops[0], Op::Filter(vec![], constraints(&[("code", json!("AB"))])));
    }

    #[test]
    fn search_over_sequence_target() {
        let p = params(&[("search_keyword", "hello"), ("search_type", "all")]);
        let map = SearchMap::new().entry("all", ["title", "body"]);
        let q = QueryFilter::new(Recorder::default(), &p).search(&map).into_query();
        assert_eq!(
            q.ops,
            vec![Op::Filter(
                vec![PredicateGroup::any_of(&json!("hello"), &["title", "body"])],
                Constraints::new()
            )]
        );
    }

    #[test]
    fn search_defaults_to_all_and_supports_single_target() {
        let p = params(&[("search_keyword", "hello")]);
        let map = SearchMap::new().entry("all", "title__icontains");
        let q = QueryFilter::new(Recorder::default(), &p).search(&map).into_query();
        assert_eq!(
            q.ops,
            vec![Op::Filter(vec![], constraints(&[("title__icontains", json!("hello"))]))]
        );
    }

    #[test]
    fn search_without_keyword_or_target_is_noop() {
        let map = SearchMap::new().entry("all", ["title"]);
        let p = params(&[("search_type", "all")]);
        let q = QueryFilter::new(Recorder::default(), &p).search(&map).into_query();
        assert!(q.ops.is_empty());

        let p = params(&[("search_keyword", "x"), ("search_type", "body")]);
        let q = QueryFilter::new(Recorder::default(), &p).search(&map).into_query();
        assert!(q.ops.is_empty());
    }

    #[test]
    fn custom_keys() {
        let keys = FilterKeys {
            ordering: "sort".into(),
            search_keyword: "q".into(),
            ..FilterKeys::default()
        };
        let p = params(&[("q", "hi"), ("sort", "-id")]);
        let map = SearchMap::new().entry("all", "title");
        let q = QueryFilter::new(Recorder::default(), &p)
            .with_keys(keys)
            .search(&map)
            .ordering()
            .into_query();
        assert_eq!(
            q.ops,
            vec![
                Op::Filter(vec![], constraints(&[("title", json!("hi"))])),
                Op::Order(vec!["-id".into()]),
            ]
        );
    }

    #[test]
    fn ordering_splits_paths() {
        let p = params(&[("ordering", "name,-created_at")]);
        let q = QueryFilter::new(Recorder::default(), &p).ordering().into_query();
        assert_eq!(q.ops, vec![Op::Order(vec!["name".into(), "-created_at".into()])]);

        let p = params(&[]);
        let q = QueryFilter::new(Recorder::default(), &p).ordering().into_query();
        assert!(q.ops.is_empty());
    }

    #[test]
    fn extra_adds_constraints() {
        let p = params(&[]);
        let c = constraints(&[("owner", json!("u1"))]);
        let q = QueryFilter::new(Recorder::default(), &p).extra(&c).into_query();
        assert_eq!(q.ops, vec![Op::Filter(vec![], c)]);
    }

    #[test]
    fn get_raises_not_found_with_constraints() {
        let p = params(&[]);
        let c = constraints(&[("id", json!(5))]);
        let f = QueryFilter::new(Recorder::default(), &p);
        match f.get(true, &c) {
            Err(FilterError::Api(ApiException::NotFound { kind, filters, .. })) => {
                assert_eq!(kind, "User");
                assert_eq!(filters, c);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(f.get(false, &c).unwrap(), None);
    }

    #[test]
    fn get_returns_first_record() {
        let p = params(&[]);
        let rec = Recorder {
            rows: vec![json!({"id": 1}), json!({"id": 2})],
            ..Recorder::default()
        };
        let got = QueryFilter::new(rec, &p).get(true, &Constraints::new()).unwrap();
        assert_eq!(got, Some(json!({"id": 1})));
    }
}
