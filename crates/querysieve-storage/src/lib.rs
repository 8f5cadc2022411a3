pub mod lookup;
pub mod mem;
pub mod record;
pub mod snapshot;

pub use mem::{Collection, InMemoryStore, MemQuery};
pub use record::Record;
pub use snapshot::{ResourceSeed, Seed, SnapshotError};
