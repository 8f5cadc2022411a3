use crate::metrics::Metrics;
use querysieve_core::{ApiException, Constraints, QueryFunctionRegistry};
use querysieve_storage::{InMemoryStore, ResourceSeed, Seed};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Lookup parameter of resources that declare none.
pub const ID_PARAM: &str = "id";

#[derive(Clone)]
pub struct AppState {
    pub store: InMemoryStore,
    pub resources: Arc<BTreeMap<String, ResourceSeed>>,
    pub registry: Arc<QueryFunctionRegistry>,
    pub metrics: Metrics,
}

impl AppState {
    /// Resources without a lookup map are looked up by `id`. The detail
    /// route has one path segment, so a resource may map at most one
    /// lookup parameter.
    pub fn new(
        store: InMemoryStore,
        mut resources: BTreeMap<String, ResourceSeed>,
    ) -> anyhow::Result<Self> {
        for (name, seed) in resources.iter_mut() {
            let lookup = &mut seed.resource.lookup_map;
            if lookup.is_empty() {
                lookup.insert(ID_PARAM.to_string(), "id".to_string());
            }
            if lookup.len() > 1 {
                anyhow::bail!(
                    "resource '{}' maps {} lookup parameters; the detail route takes one",
                    name,
                    lookup.len()
                );
            }
        }
        Ok(Self {
            store,
            resources: Arc::new(resources),
            registry: Arc::new(QueryFunctionRegistry::builtin()),
            metrics: Metrics::new()?,
        })
    }

    /// Fresh store populated from `seed`.
    pub fn from_seed(seed: &Seed) -> anyhow::Result<Self> {
        let store = InMemoryStore::new();
        seed.apply(&store)?;
        info!(
            kinds = store.kinds().len(),
            resources = seed.resources.len(),
            "store seeded"
        );
        Self::new(store, seed.resources.clone())
    }

    pub fn with_registry(mut self, registry: QueryFunctionRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub fn resource(&self, name: &str) -> Result<&ResourceSeed, ApiException> {
        self.resources.get(name).ok_or_else(|| {
            let mut filters = Constraints::new();
            filters.insert("name".into(), json!(name));
            ApiException::not_found("Resource", filters)
        })
    }
}
