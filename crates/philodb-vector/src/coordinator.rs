//! Runs the W workers of one ingest concurrently and collects their outcomes.
//!
//! Workers share nothing mutable: each gets the same `IngestContext` snapshot
//! and reports a `WorkerOutcome`. The merge must not start unless every worker
//! completed.

use anyhow::{anyhow, Result};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

use philodb_core::error::Error;
use philodb_core::partition::Partition;

use crate::worker::{clear_parts, embed_partition, persist_part, remove_part, IngestContext};

#[derive(Debug, Clone, PartialEq)]
pub struct PartSummary {
    pub ordinal: usize,
    pub partition: Partition,
    pub path: PathBuf,
    pub rows: usize,
}

#[derive(Debug)]
pub enum WorkerOutcome {
    Completed(PartSummary),
    Failed { ordinal: usize, error: Error },
}

impl WorkerOutcome {
    pub fn ordinal(&self) -> usize {
        match self {
            WorkerOutcome::Completed(s) => s.ordinal,
            WorkerOutcome::Failed { ordinal, .. } => *ordinal,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, WorkerOutcome::Completed(_))
    }
}

fn storage_error(e: anyhow::Error) -> Error {
    match e.downcast::<Error>() {
        Ok(inner) => inner,
        Err(other) => Error::Storage(format!("{other:#}")),
    }
}

/// Embed and persist a single worker's partition.
///
/// Any part this ordinal left behind is removed before embedding starts, so a
/// failed worker never leaves an older part in its place. Persistence runs on a
/// runtime owned by this worker so the call can be made from any thread,
/// including a separate process started with `--worker`.
pub fn run_worker(ctx: &IngestContext, parts_dir: &Path, ordinal: usize) -> WorkerOutcome {
    if let Err(e) = remove_part(parts_dir, ordinal) {
        return WorkerOutcome::Failed { ordinal, error: Error::from(e) };
    }
    let output = match embed_partition(ctx, ordinal) {
        Ok(out) => out,
        Err(error) => return WorkerOutcome::Failed { ordinal, error },
    };
    let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => return WorkerOutcome::Failed { ordinal, error: Error::from(e) },
    };
    match rt.block_on(persist_part(parts_dir, &output)) {
        Ok(path) => WorkerOutcome::Completed(PartSummary {
            ordinal,
            partition: output.partition,
            path,
            rows: output.passages.len(),
        }),
        Err(e) => WorkerOutcome::Failed { ordinal, error: storage_error(e) },
    }
}

/// Run all `ctx.n_workers` workers on a dedicated pool, one thread each.
///
/// Parts from earlier runs are cleared first. Outcomes are returned in ordinal
/// order regardless of completion order.
pub fn run_workers(ctx: Arc<IngestContext>, parts_dir: &Path) -> Result<Vec<WorkerOutcome>> {
    if ctx.n_workers == 0 {
        return Err(Error::InvalidArgument("n_workers must be at least 1".to_string()).into());
    }
    clear_parts(parts_dir)?;
    std::fs::create_dir_all(parts_dir)?;
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(ctx.n_workers)
        .thread_name(|i| format!("philodb-worker-{i}"))
        .build()
        .map_err(|e| anyhow!("failed to build worker pool: {e}"))?;
    info!(workers = ctx.n_workers, items = ctx.n_items(), run_id = %ctx.run_id, "starting workers");
    let outcomes: Vec<WorkerOutcome> = pool.install(|| {
        (0..ctx.n_workers)
            .into_par_iter()
            .map(|ordinal| run_worker(&ctx, parts_dir, ordinal))
            .collect()
    });
    let completed = outcomes.iter().filter(|o| o.is_completed()).count();
    info!(completed, failed = outcomes.len() - completed, "workers finished");
    Ok(outcomes)
}

/// Every worker must have completed; otherwise report the first failure.
pub fn require_all_completed(outcomes: Vec<WorkerOutcome>) -> philodb_core::Result<Vec<PartSummary>> {
    let mut summaries = Vec::with_capacity(outcomes.len());
    let mut first_failure = None;
    for outcome in outcomes {
        match outcome {
            WorkerOutcome::Completed(s) => summaries.push(s),
            WorkerOutcome::Failed { ordinal, error: err } => {
                error!(ordinal, error = %err, "worker failed");
                if first_failure.is_none() { first_failure = Some(err); }
            }
        }
    }
    match first_failure {
        Some(err) => Err(err),
        None => Ok(summaries),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_failure_wins() {
        let outcomes = vec![
            WorkerOutcome::Completed(PartSummary {
                ordinal: 0,
                partition: Partition { start: 0, end: 2 },
                path: PathBuf::from("part-0000"),
                rows: 2,
            }),
            WorkerOutcome::Failed { ordinal: 1, error: Error::EmbeddingClientFailure("boom".into()) },
            WorkerOutcome::Failed { ordinal: 2, error: Error::Storage("disk".into()) },
        ];
        let err = require_all_completed(outcomes).unwrap_err();
        assert!(matches!(err, Error::EmbeddingClientFailure(_)));
    }
}
