pub mod memory;
pub mod traits;

pub use memory::{InMemoryFileRecordStore, InMemorySegmentStore};
pub use traits::{FileRecordFilter, FileRecordStore, SegmentStore};
