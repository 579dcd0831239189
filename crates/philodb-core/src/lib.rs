//! philodb-core
//!
//! Domain types, errors, configuration and the pure building blocks (partitioning,
//! vector math) shared by the embedding, vector and analysis crates.

pub mod config;
pub mod data_processor;
pub mod error;
pub mod partition;
pub mod similarity;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
