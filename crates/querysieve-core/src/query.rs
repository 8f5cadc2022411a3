use crate::errors::StoreError;
use crate::model::Constraints;
use crate::predicate::PredicateGroup;

/// A composable, not-yet-executed request against a store.
///
/// Handles are values: every transformation returns a new handle and leaves
/// `self` untouched, so a base query can be shared between requests.
pub trait Query: Clone {
    type Record;

    /// Human-readable name of the record kind this query returns.
    fn kind(&self) -> &str;

    /// Keeps records matching every group and every equality constraint.
    fn filter(&self, groups: &[PredicateGroup], equality: &Constraints) -> Self;

    /// Orders by the given paths; a leading `-` means descending.
    fn order(&self, paths: &[String]) -> Self;

    fn distinct(&self) -> Self;

    /// Executes the query and returns its first record.
    fn first(&self) -> Result<Option<Self::Record>, StoreError>;
}
