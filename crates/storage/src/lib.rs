mod error;
mod memory;
mod record;
mod traits;

pub mod conformance;

pub use error::StorageError;
pub use memory::InMemoryJobStore;
pub use record::{JobRecord, NewJob, StoredDocument};
pub use traits::JobStore;
