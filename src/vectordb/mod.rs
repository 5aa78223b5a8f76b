mod index;
mod store;

pub use index::{l2_normalize, FlatIndex};
pub use store::{
    ChunkRecord, CleanupSummary, CompactReport, FileHashRecord, IndexedFile, ScoredChunk,
    StoreStats, VectorStore,
};
