//! Merger: concatenate worker parts by ordinal into the global corpus.

use anyhow::Result;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

use philodb_core::error::Error;
use philodb_core::partition::partition;
use philodb_core::types::Corpus;

use crate::reader::read_passages;
use crate::schema::PASSAGES_TABLE;
use crate::table::{commit_staging, meta_value, open_db, read_meta, staging_dir, write_meta};
use crate::worker::{load_part, parse_part_ordinal, WorkerOutput};
use crate::writer::write_passages;

/// Merge worker outputs into one corpus ordered by ordinal.
///
/// The result is independent of the order `outputs` arrive in. All outputs must
/// agree on `n_workers`, `n_items`, `dim` and run id, and together cover every
/// ordinal.
pub fn merge_outputs(mut outputs: Vec<WorkerOutput>) -> philodb_core::Result<Corpus> {
    let first = outputs.first().ok_or_else(|| Error::NotFound("no worker outputs to merge".to_string()))?;
    let (n_workers, n_items, dim) = (first.n_workers, first.n_items, first.dim);
    let run_id = first.run_id.clone();

    for out in &outputs {
        if out.n_workers != n_workers || out.n_items != n_items || out.dim != dim {
            return Err(Error::PartitionMismatch(format!(
                "part {} was produced for {} workers / {} items / dim {}, expected {} / {} / {}",
                out.ordinal, out.n_workers, out.n_items, out.dim, n_workers, n_items, dim
            )));
        }
        if out.run_id != run_id {
            return Err(Error::PartitionMismatch(format!(
                "part {} belongs to run {}, expected run {}",
                out.ordinal, out.run_id, run_id
            )));
        }
        if out.ordinal >= n_workers {
            return Err(Error::PartitionMismatch(format!(
                "part ordinal {} out of range for {} workers",
                out.ordinal, n_workers
            )));
        }
        let expected = partition(n_items, n_workers, out.ordinal)?;
        if out.partition != expected {
            return Err(Error::PartitionMismatch(format!(
                "part {} covers [{}, {}) but owns [{}, {})",
                out.ordinal, out.partition.start, out.partition.end, expected.start, expected.end
            )));
        }
        if out.passages.len() != expected.len() || out.embeddings.len() != expected.len() {
            return Err(Error::IndexAlignment(format!(
                "part {} holds {} passages and {} vectors for {} items",
                out.ordinal, out.passages.len(), out.embeddings.len(), expected.len()
            )));
        }
    }

    outputs.sort_by_key(|o| o.ordinal);
    if let Some(pair) = outputs.windows(2).find(|w| w[0].ordinal == w[1].ordinal) {
        return Err(Error::PartitionMismatch(format!("part {} present more than once", pair[0].ordinal)));
    }
    let present: Vec<usize> = outputs.iter().map(|o| o.ordinal).collect();
    let missing: Vec<usize> = (0..n_workers).filter(|i| present.binary_search(i).is_err()).collect();
    if !missing.is_empty() {
        return Err(Error::IncompleteMerge { expected: n_workers, missing });
    }

    let mut passages = Vec::with_capacity(n_items);
    let mut embeddings = Vec::with_capacity(n_items);
    for out in outputs {
        passages.extend(out.passages);
        embeddings.extend(out.embeddings);
    }
    Corpus::new(dim, passages, embeddings)
}

/// Committed `part-NNNN` directories directly under `parts_dir`.
pub fn discover_parts(parts_dir: &Path) -> Result<Vec<(usize, PathBuf)>> {
    if !parts_dir.exists() {
        return Err(Error::NotFound(format!("parts directory {}", parts_dir.display())).into());
    }
    let mut found = Vec::new();
    for entry in WalkDir::new(parts_dir).min_depth(1).max_depth(1) {
        let entry = entry?;
        if !entry.file_type().is_dir() { continue; }
        let name = entry.file_name().to_string_lossy();
        match parse_part_ordinal(&name) {
            Some(ordinal) => found.push((ordinal, entry.path().to_path_buf())),
            None if name.ends_with(".tmp") => warn!(path = %entry.path().display(), "ignoring unfinished part"),
            None => {}
        }
    }
    found.sort();
    Ok(found)
}

/// Load every committed part in `parts_dir` and merge them.
///
/// With `expected_workers` set, parts produced for a different worker count are
/// rejected even if they are self-consistent.
pub async fn merge_parts_dir(parts_dir: &Path, expected_workers: Option<usize>) -> Result<Corpus> {
    let found = discover_parts(parts_dir)?;
    let mut outputs = Vec::with_capacity(found.len());
    for (ordinal, path) in &found {
        let out = load_part(path).await?;
        if out.ordinal != *ordinal {
            return Err(Error::PartitionMismatch(format!(
                "{} records ordinal {}",
                path.display(), out.ordinal
            )).into());
        }
        if let Some(w) = expected_workers {
            if out.n_workers != w {
                return Err(Error::PartitionMismatch(format!(
                    "part {} was produced for {} workers, expected {}",
                    ordinal, out.n_workers, w
                )).into());
            }
        }
        outputs.push(out);
    }
    if outputs.is_empty() {
        if let Some(w) = expected_workers {
            return Err(Error::IncompleteMerge { expected: w, missing: (0..w).collect() }.into());
        }
    }
    let corpus = merge_outputs(outputs)?;
    info!(items = corpus.len(), dim = corpus.dim(), parts = found.len(), "merged parts");
    Ok(corpus)
}

pub async fn persist_corpus(corpus_dir: &Path, corpus: &Corpus, n_workers: usize) -> Result<()> {
    let staging = staging_dir(corpus_dir)?;
    {
        let conn = open_db(&staging).await?;
        write_passages(&conn, PASSAGES_TABLE, corpus.dim(), 0, corpus.passages(), corpus.embeddings()).await?;
        write_meta(&conn, &[
            ("n_items", corpus.len().to_string()),
            ("dim", corpus.dim().to_string()),
            ("n_workers", n_workers.to_string()),
            ("fingerprint", corpus.fingerprint()),
        ]).await?;
    }
    commit_staging(&staging, corpus_dir)?;
    info!(items = corpus.len(), path = %corpus_dir.display(), "corpus persisted");
    Ok(())
}

pub async fn load_corpus(corpus_dir: &Path) -> Result<Corpus> {
    if !corpus_dir.exists() {
        return Err(Error::NotFound(format!("corpus {}", corpus_dir.display())).into());
    }
    let conn = open_db(corpus_dir).await?;
    let meta: BTreeMap<String, String> = read_meta(&conn).await?;
    let dim: usize = meta_value(&meta, "dim")?;
    let n_items: usize = meta_value(&meta, "n_items")?;
    let (passages, embeddings) = read_passages(&conn, PASSAGES_TABLE, dim, 0).await?;
    if passages.len() != n_items {
        return Err(Error::IndexAlignment(format!(
            "corpus {} holds {} rows, meta says {}",
            corpus_dir.display(), passages.len(), n_items
        )).into());
    }
    let corpus = Corpus::new(dim, passages, embeddings)?;
    if let Some(expected) = meta.get("fingerprint") {
        if *expected != corpus.fingerprint() {
            return Err(Error::IndexAlignment(format!("corpus {} fingerprint mismatch", corpus_dir.display())).into());
        }
    }
    Ok(corpus)
}
