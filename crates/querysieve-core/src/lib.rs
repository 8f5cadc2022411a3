//! Translate request parameters into store predicates, and structured
//! failures into HTTP responses.

pub mod errors;
pub mod filter;
pub mod functions;
pub mod model;
pub mod predicate;
pub mod query;
pub mod resource;
pub mod response;
pub mod shortcuts;
pub mod util;

pub use errors::*;
pub use filter::{FilterKeys, QueryFilter};
pub use functions::{QueryFunction, QueryFunctionRegistry};
pub use model::*;
pub use predicate::{gen_or_group, Predicate, PredicateGroup};
pub use query::Query;
pub use resource::Resource;
pub use response::{map_to_response, success, ApiResponse};
