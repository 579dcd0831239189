//! Domain types used by the ingestion, retrieval and analysis pipelines.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const UNKNOWN: &str = "Unknown";

/// One sentence of a source work.
///
/// Passages carry no id of their own: a passage is identified by its position
/// in the corpus-wide ordered sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Passage {
    pub text: String,
    pub school: String,
    pub title: String,
    pub author: String,
}

impl Passage {
    pub fn new(text: impl Into<String>, school: impl Into<String>, title: impl Into<String>, author: impl Into<String>) -> Self {
        Self { text: text.into(), school: school.into(), title: title.into(), author: author.into() }
    }
}

/// Passages paired index-for-index with fixed-dimension embeddings.
///
/// The constructor is the only way in, so `passages.len() == embeddings.len()`
/// and every vector having length `dim` hold for every value of this type.
#[derive(Debug, Clone, PartialEq)]
pub struct Corpus {
    dim: usize,
    passages: Vec<Passage>,
    embeddings: Vec<Vec<f32>>,
}

impl Corpus {
    pub fn new(dim: usize, passages: Vec<Passage>, embeddings: Vec<Vec<f32>>) -> Result<Self> {
        if passages.len() != embeddings.len() {
            return Err(Error::IndexAlignment(format!(
                "{} passages but {} embeddings",
                passages.len(),
                embeddings.len()
            )));
        }
        if let Some((i, v)) = embeddings.iter().enumerate().find(|(_, v)| v.len() != dim) {
            return Err(Error::IndexAlignment(format!(
                "embedding {} has dimension {}, expected {}",
                i,
                v.len(),
                dim
            )));
        }
        Ok(Self { dim, passages, embeddings })
    }

    pub fn dim(&self) -> usize { self.dim }
    pub fn len(&self) -> usize { self.passages.len() }
    pub fn is_empty(&self) -> bool { self.passages.is_empty() }
    pub fn passages(&self) -> &[Passage] { &self.passages }
    pub fn embeddings(&self) -> &[Vec<f32>] { &self.embeddings }
    pub fn passage(&self, i: usize) -> Option<&Passage> { self.passages.get(i) }
    pub fn embedding(&self, i: usize) -> Option<&[f32]> { self.embeddings.get(i).map(Vec::as_slice) }

    pub fn iter(&self) -> impl Iterator<Item = (&Passage, &[f32])> {
        self.passages.iter().zip(self.embeddings.iter().map(Vec::as_slice))
    }

    pub fn into_parts(self) -> (Vec<Passage>, Vec<Vec<f32>>) {
        (self.passages, self.embeddings)
    }

    /// Corpus indices per school, schools in alphabetical order.
    pub fn school_groups(&self) -> BTreeMap<String, Vec<usize>> {
        let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (i, p) in self.passages.iter().enumerate() {
            groups.entry(p.school.clone()).or_default().push(i);
        }
        groups
    }

    /// Content hash over every passage and vector in corpus order.
    ///
    /// Two corpora with equal fingerprints have identical ordering, metadata and
    /// vector bytes; an index records the fingerprint of the corpus it was built from.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&(self.dim as u64).to_le_bytes());
        hasher.update(&(self.len() as u64).to_le_bytes());
        for (p, v) in self.iter() {
            for field in [&p.text, &p.school, &p.title, &p.author] {
                hasher.update(&(field.len() as u64).to_le_bytes());
                hasher.update(field.as_bytes());
            }
            for x in v { hasher.update(&x.to_le_bytes()); }
        }
        hasher.finalize().to_hex().to_string()
    }
}
