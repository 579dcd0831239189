//! philodb-analysis
//!
//! School-level aggregation of a corpus (mean vectors, similarity matrices,
//! Ward clustering) and the distributed thematic batch over a fixed topic list.

pub mod bundle;
pub mod cluster;
pub mod groups;
pub mod matrix;
pub mod thematic;

pub use bundle::{analyze_corpus, build_bundle, AnalysisBundle, CorpusAnalysis, CrossSimilarity};
pub use groups::SchoolVectors;
pub use thematic::{merge_partials, run_thematic, ThematicContext, ThematicHit, ThematicMap};
