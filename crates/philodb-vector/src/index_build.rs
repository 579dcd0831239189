//! Index Builder: exact inner-product search over the merged corpus.
//!
//! Vectors are L2-normalized at build time, so the inner product of a normalized
//! query with a row is its cosine similarity. Row `i` of the index is passage `i`
//! of the corpus it was built from.

use anyhow::Result;
use chrono::Utc;
use rayon::prelude::*;
use std::cmp::Ordering;
use std::path::Path;
use tracing::{info, warn};

use philodb_core::error::Error;
use philodb_core::similarity::{dot, l2_normalize};
use philodb_core::types::Corpus;

use crate::reader::read_vectors;
use crate::schema::VECTORS_TABLE;
use crate::table::{commit_staging, meta_value, open_db, read_meta, staging_dir, write_meta};
use crate::writer::write_vectors;

const SCORE_CHUNK: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub index: usize,
    pub score: f32,
}

/// Descending score, ties by ascending index.
fn rank(a: &Neighbor, b: &Neighbor) -> Ordering {
    b.score.total_cmp(&a.score).then(a.index.cmp(&b.index))
}

#[derive(Debug, Clone)]
pub struct FlatIpIndex {
    dim: usize,
    data: Vec<f32>,
    len: usize,
    corpus_fingerprint: String,
}

impl FlatIpIndex {
    pub fn build(corpus: &Corpus) -> Self {
        let dim = corpus.dim();
        let mut data = Vec::with_capacity(dim * corpus.len());
        let mut zero_rows = 0usize;
        for v in corpus.embeddings() {
            let start = data.len();
            data.extend_from_slice(v);
            if !l2_normalize(&mut data[start..]) { zero_rows += 1; }
        }
        if zero_rows > 0 {
            warn!(zero_rows, "corpus contains zero vectors; they score 0 against every query");
        }
        info!(rows = corpus.len(), dim, "built flat inner-product index");
        Self { dim, data, len: corpus.len(), corpus_fingerprint: corpus.fingerprint() }
    }

    pub fn dim(&self) -> usize { self.dim }
    pub fn len(&self) -> usize { self.len }
    pub fn is_empty(&self) -> bool { self.len == 0 }
    pub fn corpus_fingerprint(&self) -> &str { &self.corpus_fingerprint }

    pub fn row(&self, i: usize) -> Option<&[f32]> {
        (i < self.len).then(|| &self.data[i * self.dim..(i + 1) * self.dim])
    }

    /// Top `min(k, len)` rows by inner product with `query`.
    pub fn search(&self, query: &[f32], k: usize) -> philodb_core::Result<Vec<Neighbor>> {
        if query.len() != self.dim {
            return Err(Error::InvalidArgument(format!(
                "query has dimension {}, index expects {}",
                query.len(), self.dim
            )));
        }
        let k = k.min(self.len);
        if k == 0 || self.dim == 0 { return Ok(Vec::new()); }
        let mut scored: Vec<Neighbor> = self
            .data
            .par_chunks(self.dim * SCORE_CHUNK)
            .enumerate()
            .flat_map_iter(|(chunk_no, block)| {
                let base = chunk_no * SCORE_CHUNK;
                block
                    .chunks_exact(self.dim)
                    .enumerate()
                    .map(move |(i, row)| Neighbor { index: base + i, score: dot(query, row) })
            })
            .collect();
        if k < scored.len() {
            scored.select_nth_unstable_by(k - 1, rank);
            scored.truncate(k);
        }
        scored.sort_by(rank);
        Ok(scored)
    }

    /// The index must have been built from exactly this corpus.
    pub fn check_alignment(&self, corpus: &Corpus) -> philodb_core::Result<()> {
        if self.len != corpus.len() || self.dim != corpus.dim() {
            return Err(Error::IndexAlignment(format!(
                "index has {} rows of dim {}, corpus has {} of dim {}",
                self.len, self.dim, corpus.len(), corpus.dim()
            )));
        }
        if self.corpus_fingerprint != corpus.fingerprint() {
            return Err(Error::IndexAlignment("index was built from a different corpus".to_string()));
        }
        Ok(())
    }

    /// Self-query the first `sample` non-zero rows; each must be its own nearest
    /// neighbour up to exact duplicates.
    pub fn validate(&self, sample: usize) -> philodb_core::Result<usize> {
        let mut checked = 0;
        for i in 0..self.len.min(sample) {
            let Some(row) = self.row(i) else { break };
            let self_score = dot(row, row);
            if self_score == 0.0 { continue; }
            let top = self.search(row, 1)?;
            match top.first() {
                Some(n) if n.index == i || n.score <= self_score + 1e-5 => {}
                _ => {
                    return Err(Error::IndexAlignment(format!("row {i} is not its own nearest neighbour")));
                }
            }
            checked += 1;
        }
        Ok(checked)
    }
}

pub async fn persist_index(index_dir: &Path, index: &FlatIpIndex) -> Result<()> {
    let staging = staging_dir(index_dir)?;
    {
        let conn = open_db(&staging).await?;
        let rows: Vec<Vec<f32>> = index.data.chunks(index.dim.max(1)).take(index.len).map(<[f32]>::to_vec).collect();
        write_vectors(&conn, VECTORS_TABLE, index.dim, &rows).await?;
        write_meta(&conn, &[
            ("metric", "dot".to_string()),
            ("dim", index.dim.to_string()),
            ("n_items", index.len.to_string()),
            ("corpus_fingerprint", index.corpus_fingerprint.clone()),
            ("built_at", Utc::now().to_rfc3339()),
        ]).await?;
    }
    commit_staging(&staging, index_dir)?;
    info!(rows = index.len, path = %index_dir.display(), "index persisted");
    Ok(())
}

pub async fn load_index(index_dir: &Path) -> Result<FlatIpIndex> {
    if !index_dir.exists() {
        return Err(Error::NotFound(format!("index {}", index_dir.display())).into());
    }
    let conn = open_db(index_dir).await?;
    let meta = read_meta(&conn).await?;
    let metric: String = meta_value(&meta, "metric")?;
    if metric != "dot" {
        return Err(Error::InvalidConfig(format!("unsupported index metric '{metric}'")).into());
    }
    let dim: usize = meta_value(&meta, "dim")?;
    let n_items: usize = meta_value(&meta, "n_items")?;
    let corpus_fingerprint: String = meta_value(&meta, "corpus_fingerprint")?;
    let rows = read_vectors(&conn, VECTORS_TABLE, dim).await?;
    if rows.len() != n_items {
        return Err(Error::IndexAlignment(format!(
            "index {} holds {} rows, meta says {}",
            index_dir.display(), rows.len(), n_items
        )).into());
    }
    let data: Vec<f32> = rows.into_iter().flatten().collect();
    Ok(FlatIpIndex { dim, data, len: n_items, corpus_fingerprint })
}
