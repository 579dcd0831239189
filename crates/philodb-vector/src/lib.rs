//! philodb-vector
//!
//! Lance-backed persistence and the distributed ingestion pipeline: per-worker
//! embedding of static partitions, ordinal-ordered merge, exact inner-product
//! index and grouped retrieval.

pub mod schema;
pub mod table;
pub mod writer;
pub mod reader;
pub mod worker;
pub mod coordinator;
pub mod merge;
pub mod index_build;
pub mod search;

pub use coordinator::{require_all_completed, run_worker, run_workers, PartSummary, WorkerOutcome};
pub use index_build::{load_index, persist_index, FlatIpIndex, Neighbor};
pub use merge::{load_corpus, merge_outputs, merge_parts_dir, persist_corpus};
pub use search::{RetrievalEngine, SchoolCard, SchoolSelection, ScoredPassage, SearchParams};
pub use worker::{embed_partition, load_part, persist_part, IngestContext, WorkerOutput};
