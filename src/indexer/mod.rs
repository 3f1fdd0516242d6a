// Indexer module
// Collection lifecycle, chunk normalization, indexing, removal and ingestion fan-out

pub mod chunk;
pub mod collections;
pub mod document;
pub mod ingest;
pub mod locks;
pub mod maintenance;

pub use chunk::{Chunk, ChunkRecord, DEFAULT_CATEGORY, MetadataPolicy};
pub use collections::{
    CollectionManager, CollectionState, EnsureOutcome, validate_collection_name,
};
pub use document::{DocumentIndexer, IndexReport, InsertedRow, RejectedRow};
pub use ingest::{
    ARTIFACTS_COLLECTION, CollectionOutcome, CollectionTarget, IngestReport, IngestRequest,
    IngestionService,
};
pub use locks::{FileLockGuard, FileLocks};
pub use maintenance::{IndexMaintenance, RemovalReport};
