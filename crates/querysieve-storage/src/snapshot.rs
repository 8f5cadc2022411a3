//! Seed files: collections with their records, plus the resources served
//! over them.
//!
//! ```json
//! {
//!   "collections": {
//!     "User": {"fields": ["name", "age"], "records": [{"id": 1, "name": "Jo", "age": 30}]}
//!   },
//!   "resources": {
//!     "users": {"kind": "User", "filter_map": {"name": "name__icontains"}}
//!   }
//! }
//! ```

use crate::mem::InMemoryStore;
use querysieve_core::{Resource, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid seed: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("resource '{resource}' refers to unknown kind '{kind}'")]
    UnknownKind { resource: String, kind: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionSeed {
    pub fields: Vec<String>,
    pub records: Vec<JsonValue>,
}

/// A resource bound to the record kind it queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSeed {
    pub kind: String,
    #[serde(flatten)]
    pub resource: Resource,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Seed {
    pub collections: BTreeMap<String, CollectionSeed>,
    pub resources: BTreeMap<String, ResourceSeed>,
}

impl Seed {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SnapshotError> {
        let fh = File::open(path.as_ref())?;
        let seed: Seed = serde_json::from_reader(BufReader::new(fh))?;
        info!(
            path = %path.as_ref().display(),
            collections = seed.collections.len(),
            resources = seed.resources.len(),
            "seed loaded"
        );
        Ok(seed)
    }

    /// Defines every collection in `store` and inserts its records. Fails
    /// on the first rejected record or on a resource naming a kind that is
    /// neither seeded nor already present.
    pub fn apply(&self, store: &InMemoryStore) -> Result<(), SnapshotError> {
        for (kind, coll) in &self.collections {
            store.define(kind, coll.fields.clone());
            for body in &coll.records {
                store.insert(kind, body.clone())?;
            }
        }
        let known = store.kinds();
        for (name, res) in &self.resources {
            if !known.contains(&res.kind) {
                return Err(SnapshotError::UnknownKind {
                    resource: name.clone(),
                    kind: res.kind.clone(),
                });
            }
        }
        Ok(())
    }

    /// Current contents of `store`, with the given resources.
    pub fn export(store: &InMemoryStore, resources: BTreeMap<String, ResourceSeed>) -> Self {
        let collections = store
            .kinds()
            .into_iter()
            .filter_map(|kind| {
                let coll = store.collection(&kind)?;
                let seed = CollectionSeed {
                    fields: coll.fields.clone(),
                    records: coll.records.iter().map(|r| r.body.clone()).collect(),
                };
                Some((kind, seed))
            })
            .collect();
        Self {
            collections,
            resources,
        }
    }

    pub fn write(&self, path: impl AsRef<Path>) -> Result<(), SnapshotError> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path.as_ref(), serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }
}
