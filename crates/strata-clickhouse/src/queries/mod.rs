//! Concrete query wrappers, one per query shape.

pub mod events;
pub mod metadata;
pub mod storage;

pub use events::{EventQuery, EventRecord, DEFAULT_EVENT_LIMIT};
pub use metadata::{MetaRecord, MetaValue, MetadataQuery};
pub use storage::{StorageSize, StorageSizeQuery, COMPRESSED_BYTES, UNCOMPRESSED_BYTES};
