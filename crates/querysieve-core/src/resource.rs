//! Declarative endpoint description: which parameters filter what, how path
//! parameters map to fields, and whether queries are scoped to an owner.

use crate::errors::{ApiException, Result};
use crate::filter::{FilterKeys, QueryFilter};
use crate::functions::QueryFunctionRegistry;
use crate::model::{Constraints, FilterMap, ParameterBag, SearchMap};
use crate::query::Query;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Resource {
    pub filter_map: FilterMap,
    pub search_map: SearchMap,
    /// Path parameter name -> field path.
    pub lookup_map: BTreeMap<String, String>,
    pub extra: Constraints,
    /// Field holding the owning principal; when set, every query is
    /// restricted to records of the requesting principal.
    pub owner_field: Option<String>,
    pub keys: FilterKeys,
}

impl Resource {
    /// Equality constraints for the path parameters named in `lookup_map`.
    pub fn lookup_constraints(&self, path_params: &BTreeMap<String, String>) -> Constraints {
        self.lookup_map
            .iter()
            .filter_map(|(param, field)| {
                path_params
                    .get(param)
                    .map(|v| (field.clone(), JsonValue::String(v.clone())))
            })
            .collect()
    }

    /// The path parameter naming a single object, when the lookup map has
    /// exactly one entry.
    pub fn lookup_param(&self) -> Option<&str> {
        match self.lookup_map.len() {
            1 => self.lookup_map.keys().next().map(String::as_str),
            _ => None,
        }
    }

    fn scoped<Q: Query>(&self, query: Q, principal: Option<&str>) -> Result<Q> {
        let Some(field) = &self.owner_field else {
            return Ok(query);
        };
        let principal = principal.ok_or_else(|| {
            ApiException::forbidden("authentication required").with_extra("model", query.kind())
        })?;
        let mut owner = Constraints::new();
        owner.insert(field.clone(), JsonValue::String(principal.to_string()));
        Ok(query.filter(&[], &owner))
    }

    fn constraints(&self, path_params: &BTreeMap<String, String>) -> Constraints {
        let mut constraints = self.extra.clone();
        constraints.extend(self.lookup_constraints(path_params));
        constraints
    }

    /// The list query: owner scope, filter map, extra and lookup
    /// constraints, search, ordering.
    pub fn filtered<Q: Query>(
        &self,
        query: Q,
        params: &ParameterBag,
        path_params: &BTreeMap<String, String>,
        principal: Option<&str>,
        registry: &QueryFunctionRegistry,
    ) -> Result<Q> {
        let query = self.scoped(query, principal)?;
        let filter = QueryFilter::with_registry(query, params, registry)
            .with_keys(self.keys.clone())
            .filter_map(&self.filter_map)?
            .extra(&self.constraints(path_params))
            .search(&self.search_map)
            .ordering();
        Ok(filter.into_query())
    }

    /// The detail lookup: owner scope, extra and lookup constraints, then
    /// the first match or `NotFound`. Every `lookup_map` parameter must be
    /// present in `path_params`.
    pub fn object<Q: Query>(
        &self,
        query: Q,
        params: &ParameterBag,
        path_params: &BTreeMap<String, String>,
        principal: Option<&str>,
        registry: &QueryFunctionRegistry,
    ) -> Result<Q::Record> {
        if let Some(missing) = self.lookup_map.keys().find(|k| !path_params.contains_key(*k)) {
            return Err(ApiException::bad_request(format!(
                "missing lookup parameter '{}'",
                missing
            ))
            .with_extra("model", query.kind())
            .into());
        }
        let query = self.scoped(query, principal)?;
        let filter = QueryFilter::with_registry(query, params, registry).with_keys(self.keys.clone());
        filter
            .get(true, &self.constraints(path_params))?
            .ok_or_else(|| ApiException::structure("lookup returned no record").into())
    }
}
