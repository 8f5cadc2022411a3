use crate::lookup::{self, FieldPath};
use crate::record::Record;
use parking_lot::RwLock;
use querysieve_core::{Constraints, Predicate, PredicateGroup, Query, StoreError};
use serde_json::Value as JsonValue;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Records of one kind. `fields` lists the allowed top-level fields; an
/// empty list accepts any field.
#[derive(Debug, Clone, Default)]
pub struct Collection {
    pub kind: String,
    pub fields: Vec<String>,
    pub records: Vec<Record>,
}

impl Collection {
    fn check_field(&self, path: &FieldPath<'_>, raw: &str) -> Result<(), StoreError> {
        let root = path.root();
        if self.fields.is_empty() || root == "id" || self.fields.iter().any(|f| f == root) {
            return Ok(());
        }
        Err(StoreError::new(format!(
            "cannot resolve keyword '{}' into field of {}; choices are: {}",
            raw,
            self.kind,
            self.fields.join(", ")
        )))
    }
}

#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Default)]
struct Inner {
    collections: HashMap<String, Arc<Collection>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares `kind` with its field names. Existing records are kept.
    pub fn define(&self, kind: &str, fields: Vec<String>) {
        let mut inner = self.inner.write();
        let entry = inner
            .collections
            .entry(kind.to_string())
            .or_insert_with(|| {
                Arc::new(Collection {
                    kind: kind.to_string(),
                    ..Collection::default()
                })
            });
        Arc::make_mut(entry).fields = fields;
    }

    /// Adds a record. Running queries keep seeing the snapshot they were
    /// created from.
    pub fn insert(&self, kind: &str, body: JsonValue) -> Result<Record, StoreError> {
        let record = Record::from_body(body).map_err(StoreError::new)?;
        let mut inner = self.inner.write();
        let collection = inner
            .collections
            .entry(kind.to_string())
            .or_insert_with(|| {
                Arc::new(Collection {
                    kind: kind.to_string(),
                    ..Collection::default()
                })
            });
        if collection.records.iter().any(|r| r.id == record.id) {
            return Err(StoreError::new(format!(
                "{} with id '{}' already exists",
                kind, record.id
            )));
        }
        Arc::make_mut(collection).records.push(record.clone());
        debug!(kind, id = record.id.as_str(), "record inserted");
        Ok(record)
    }

    /// Base query over every record of `kind`.
    pub fn query(&self, kind: &str) -> Result<MemQuery, StoreError> {
        let inner = self.inner.read();
        let collection = inner
            .collections
            .get(kind)
            .cloned()
            .ok_or_else(|| StoreError::new(format!("unknown record kind '{}'", kind)))?;
        Ok(MemQuery {
            collection,
            ops: Vec::new(),
        })
    }

    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.inner.read().collections.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    pub fn collection(&self, kind: &str) -> Option<Arc<Collection>> {
        self.inner.read().collections.get(kind).cloned()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Op {
    Filter(Vec<PredicateGroup>, Constraints),
    Order(Vec<String>),
    Distinct,
}

/// Lazy query over a collection snapshot. Operations are recorded and
/// evaluated on execution.
#[derive(Debug, Clone)]
pub struct MemQuery {
    collection: Arc<Collection>,
    ops: Vec<Op>,
}

impl MemQuery {
    fn with(&self, op: Op) -> Self {
        let mut next = self.clone();
        next.ops.push(op);
        next
    }

    /// Executes the query.
    pub fn all(&self) -> Result<Vec<Record>, StoreError> {
        let coll = &self.collection;
        let mut rows: Vec<&Record> = coll.records.iter().collect();
        let mut ordering: Option<&[String]> = None;
        let mut distinct = false;

        for op in &self.ops {
            match op {
                Op::Filter(groups, equality) => {
                    let predicates: Vec<Predicate> = equality
                        .iter()
                        .map(|(path, value)| Predicate::new(path.clone(), value.clone()))
                        .collect();
                    for p in predicates
                        .iter()
                        .chain(groups.iter().flat_map(|g| g.predicates()))
                    {
                        coll.check_field(&FieldPath::parse(&p.path)?, &p.path)?;
                    }
                    let mut kept = Vec::with_capacity(rows.len());
                    for r in rows {
                        if keep(r, &predicates, groups)? {
                            kept.push(r);
                        }
                    }
                    rows = kept;
                }
                // a later ordering replaces an earlier one
                Op::Order(paths) => ordering = Some(paths.as_slice()),
                Op::Distinct => distinct = true,
            }
        }

        if distinct {
            let mut seen = HashSet::new();
            rows.retain(|r| seen.insert(r.id.as_str()));
        }
        if let Some(paths) = ordering {
            sort(&mut rows, coll, paths)?;
        }
        Ok(rows.into_iter().cloned().collect())
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        Ok(self.all()?.len())
    }
}

fn keep(record: &Record, equality: &[Predicate], groups: &[PredicateGroup]) -> Result<bool, StoreError> {
    for p in equality {
        if !lookup::matches(&record.body, p)? {
            return Ok(false);
        }
    }
    for g in groups {
        if !g.try_matches(|p| lookup::matches(&record.body, p))? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn sort(rows: &mut [&Record], coll: &Collection, paths: &[String]) -> Result<(), StoreError> {
    let mut keys = Vec::with_capacity(paths.len());
    for raw in paths {
        let (descending, path) = match raw.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, raw.as_str()),
        };
        let parsed = FieldPath::parse(path)?;
        coll.check_field(&parsed, path)?;
        keys.push((descending, parsed));
    }
    rows.sort_by(|a, b| {
        for (descending, path) in &keys {
            let av = path.values(&a.body).into_iter().next();
            let bv = path.values(&b.body).into_iter().next();
            let ord = lookup::sort_cmp(av, bv);
            let ord = if *descending { ord.reverse() } else { ord };
            if ord.is_ne() {
                return ord;
            }
        }
        std::cmp::Ordering::Equal
    });
    Ok(())
}

impl Query for MemQuery {
    type Record = Record;

    fn kind(&self) -> &str {
        &self.collection.kind
    }

    fn filter(&self, groups: &[PredicateGroup], equality: &Constraints) -> Self {
        self.with(Op::Filter(groups.to_vec(), equality.clone()))
    }

    fn order(&self, paths: &[String]) -> Self {
        self.with(Op::Order(paths.to_vec()))
    }

    fn distinct(&self) -> Self {
        self.with(Op::Distinct)
    }

    fn first(&self) -> Result<Option<Record>, StoreError> {
        Ok(self.all()?.into_iter().next())
    }
}
