//! Worker Executor: embeds one static partition and persists it as a part.
//!
//! A worker either produces its complete part or nothing: vectors are computed
//! in memory first, the part is written into a staging directory, and only a
//! fully written part is renamed to `part-<ordinal>`.
//!
//! Every part records the run id of the ingest that produced it. Parts only
//! merge with parts carrying the same run id.

use anyhow::Result;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use philodb_core::error::Error;
use philodb_core::partition::{partition, Partition};
use philodb_core::traits::{as_passage, Embedder};
use philodb_core::types::Passage;

use crate::reader::read_passages;
use crate::schema::PART_TABLE;
use crate::table::{commit_staging, meta_value, open_db, read_meta, staging_dir, write_meta};
use crate::writer::write_passages;

/// Immutable snapshot every worker receives at start.
pub struct IngestContext {
    pub passages: Arc<[Passage]>,
    pub n_workers: usize,
    pub batch_size: usize,
    pub embedder: Arc<dyn Embedder>,
    pub run_id: String,
    progress: MultiProgress,
}

impl IngestContext {
    pub fn new(passages: Vec<Passage>, n_workers: usize, batch_size: usize, embedder: Arc<dyn Embedder>) -> Self {
        let id = run_id(&passages, n_workers, embedder.dim());
        Self {
            passages: passages.into(),
            n_workers,
            batch_size: batch_size.max(1),
            embedder,
            run_id: id,
            progress: MultiProgress::new(),
        }
    }

    pub fn n_items(&self) -> usize { self.passages.len() }
}

/// Hash of the input passages, worker count and vector dimension.
///
/// Separate `--worker` processes over the same input derive the same id.
pub fn run_id(passages: &[Passage], n_workers: usize, dim: usize) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&(n_workers as u64).to_le_bytes());
    hasher.update(&(dim as u64).to_le_bytes());
    hasher.update(&(passages.len() as u64).to_le_bytes());
    for p in passages {
        for field in [&p.text, &p.school, &p.title, &p.author] {
            hasher.update(&(field.len() as u64).to_le_bytes());
            hasher.update(field.as_bytes());
        }
    }
    hasher.finalize().to_hex().to_string()
}

/// One worker's local result, tagged with its ordinal.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerOutput {
    pub ordinal: usize,
    pub n_workers: usize,
    pub n_items: usize,
    pub run_id: String,
    pub partition: Partition,
    pub dim: usize,
    pub passages: Vec<Passage>,
    pub embeddings: Vec<Vec<f32>>,
}

pub fn part_dir_name(ordinal: usize) -> String {
    format!("part-{ordinal:04}")
}

pub fn parse_part_ordinal(name: &str) -> Option<usize> {
    let digits = name.strip_prefix("part-")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) { return None; }
    digits.parse().ok()
}

/// Remove `part-<ordinal>` and its staging directory, if present.
pub fn remove_part(parts_dir: &Path, ordinal: usize) -> std::io::Result<()> {
    let final_dir = parts_dir.join(part_dir_name(ordinal));
    let staging = parts_dir.join(format!("{}.tmp", part_dir_name(ordinal)));
    for dir in [final_dir, staging] {
        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
            debug!(ordinal, path = %dir.display(), "removed previous part");
        }
    }
    Ok(())
}

/// Remove every part and unfinished part left in `parts_dir` by earlier runs.
pub fn clear_parts(parts_dir: &Path) -> Result<usize> {
    if !parts_dir.exists() { return Ok(0); }
    let mut removed = 0;
    for entry in WalkDir::new(parts_dir).min_depth(1).max_depth(1) {
        let entry = entry?;
        if !entry.file_type().is_dir() { continue; }
        let name = entry.file_name().to_string_lossy();
        let base = name.strip_suffix(".tmp").unwrap_or(name.as_ref());
        if parse_part_ordinal(base).is_some() {
            std::fs::remove_dir_all(entry.path())?;
            removed += 1;
        }
    }
    if removed > 0 { warn!(removed, path = %parts_dir.display(), "cleared parts from a previous run"); }
    Ok(removed)
}

fn progress_bar(multi: &MultiProgress, len: usize, ordinal: usize) -> ProgressBar {
    let pb = multi.add(ProgressBar::new(len as u64));
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} passages ({percent}%) {msg}")
        .map(|s| s.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb.set_message(format!("worker {ordinal}"));
    pb
}

/// Embed the partition owned by `ordinal`, in input order.
pub fn embed_partition(ctx: &IngestContext, ordinal: usize) -> philodb_core::Result<WorkerOutput> {
    let part = partition(ctx.n_items(), ctx.n_workers, ordinal)?;
    let passages = ctx.passages[part.range()].to_vec();
    let dim = ctx.embedder.dim();
    info!(ordinal, start = part.start, end = part.end, "worker starting");
    let pb = progress_bar(&ctx.progress, passages.len(), ordinal);
    let mut embeddings = Vec::with_capacity(passages.len());
    for batch in passages.chunks(ctx.batch_size) {
        let texts: Vec<String> = batch.iter().map(|p| as_passage(&p.text)).collect();
        let vectors = ctx.embedder.encode_checked(&texts, true)?;
        embeddings.extend(vectors);
        pb.inc(batch.len() as u64);
        debug!(ordinal, done = embeddings.len(), "embedded batch");
    }
    pb.finish_and_clear();
    Ok(WorkerOutput {
        ordinal,
        n_workers: ctx.n_workers,
        n_items: ctx.n_items(),
        run_id: ctx.run_id.clone(),
        partition: part,
        dim,
        passages,
        embeddings,
    })
}

/// Persist a worker output under `parts_dir/part-<ordinal>`.
pub async fn persist_part(parts_dir: &Path, out: &WorkerOutput) -> Result<PathBuf> {
    let final_dir = parts_dir.join(part_dir_name(out.ordinal));
    let staging = staging_dir(&final_dir)?;
    {
        let conn = open_db(&staging).await?;
        write_passages(&conn, PART_TABLE, out.dim, out.partition.start, &out.passages, &out.embeddings).await?;
        write_meta(&conn, &[
            ("ordinal", out.ordinal.to_string()),
            ("n_workers", out.n_workers.to_string()),
            ("n_items", out.n_items.to_string()),
            ("run_id", out.run_id.clone()),
            ("start", out.partition.start.to_string()),
            ("end", out.partition.end.to_string()),
            ("dim", out.dim.to_string()),
        ]).await?;
    }
    commit_staging(&staging, &final_dir)?;
    info!(ordinal = out.ordinal, rows = out.passages.len(), path = %final_dir.display(), "part persisted");
    Ok(final_dir)
}

pub async fn load_part(path: &Path) -> Result<WorkerOutput> {
    let conn = open_db(path).await?;
    let meta = read_meta(&conn).await?;
    let ordinal: usize = meta_value(&meta, "ordinal")?;
    let n_workers: usize = meta_value(&meta, "n_workers")?;
    let n_items: usize = meta_value(&meta, "n_items")?;
    let run_id: String = meta_value(&meta, "run_id")?;
    let start: usize = meta_value(&meta, "start")?;
    let end: usize = meta_value(&meta, "end")?;
    let dim: usize = meta_value(&meta, "dim")?;
    let (passages, embeddings) = read_passages(&conn, PART_TABLE, dim, start).await?;
    if passages.len() != end.saturating_sub(start) {
        return Err(Error::IndexAlignment(format!(
            "part {} holds {} rows for range [{}, {})",
            ordinal, passages.len(), start, end
        )).into());
    }
    Ok(WorkerOutput { ordinal, n_workers, n_items, run_id, partition: Partition { start, end }, dim, passages, embeddings })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_names_round_trip() {
        assert_eq!(part_dir_name(3), "part-0003");
        assert_eq!(parse_part_ordinal("part-0003"), Some(3));
        assert_eq!(parse_part_ordinal("part-12345"), Some(12345));
        assert_eq!(parse_part_ordinal("part-0003.tmp"), None);
        assert_eq!(parse_part_ordinal("corpus"), None);
    }

    #[test]
    fn run_id_tracks_input_and_worker_count() {
        let a = vec![Passage::new("Justice is fairness.", "stoicism", "Meditations", "Marcus Aurelius")];
        let mut b = a.clone();
        b[0].text = "Justice is order.".to_string();
        assert_eq!(run_id(&a, 2, 8), run_id(&a.clone(), 2, 8));
        assert_ne!(run_id(&a, 2, 8), run_id(&b, 2, 8));
        assert_ne!(run_id(&a, 2, 8), run_id(&a, 3, 8));
        assert_ne!(run_id(&a, 2, 8), run_id(&a, 2, 16));
    }

    #[test]
    fn concurrent_workers_share_one_progress_group() {
        let passages: Vec<Passage> = (0..9).map(|i| Passage::new(format!("passage {i}"), "s", "t", "a")).collect();
        let embedder: Arc<dyn Embedder> = Arc::new(philodb_embed::FakeEmbedder::new(8));
        let ctx = IngestContext::new(passages, 3, 2, embedder);
        let outputs: Vec<WorkerOutput> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..3).map(|i| {
                let ctx = &ctx;
                scope.spawn(move || embed_partition(ctx, i).unwrap())
            }).collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        let ranges: Vec<Partition> = outputs.iter().map(|o| o.partition).collect();
        assert_eq!(ranges, vec![Partition { start: 0, end: 3 }, Partition { start: 3, end: 6 }, Partition { start: 6, end: 9 }]);
        assert!(outputs.iter().all(|o| o.run_id == ctx.run_id && o.embeddings.len() == 3));
    }

    #[test]
    fn clear_parts_keeps_other_artifacts() {
        let tmp = tempfile::tempdir().unwrap();
        for name in ["part-0000", "part-0001.tmp", "corpus"] {
            std::fs::create_dir_all(tmp.path().join(name)).unwrap();
        }
        assert_eq!(clear_parts(tmp.path()).unwrap(), 2);
        assert!(!tmp.path().join("part-0000").exists());
        assert!(!tmp.path().join("part-0001.tmp").exists());
        assert!(tmp.path().join("corpus").exists());
        assert_eq!(clear_parts(&tmp.path().join("missing")).unwrap(), 0);
    }
}
