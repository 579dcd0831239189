//! Thematic Batch Runner.
//!
//! Topics are split across a fixed pool with the same contiguous partitioning
//! used for corpus items. Each worker embeds its topics and, for every named
//! corpus and every school in it, keeps the `top_n` most similar passages by
//! brute-force cosine similarity. Partial maps are merged by topic key.

use anyhow::anyhow;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use philodb_core::error::{Error, Result};
use philodb_core::partition::split_work;
use philodb_core::similarity::cosine;
use philodb_core::traits::{as_query, Embedder};
use philodb_core::types::Corpus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThematicHit {
    pub similarity: f32,
    pub text: String,
}

/// school -> hits, best first
pub type SchoolHits = BTreeMap<String, Vec<ThematicHit>>;
/// corpus name -> per-school hits
pub type TopicResult = BTreeMap<String, SchoolHits>;
/// topic -> per-corpus results
pub type ThematicMap = BTreeMap<String, TopicResult>;

struct NamedCorpus {
    name: String,
    corpus: Arc<Corpus>,
    groups: BTreeMap<String, Vec<usize>>,
}

/// Read-only inputs shared by every thematic worker.
pub struct ThematicContext {
    corpora: Vec<NamedCorpus>,
    embedder: Arc<dyn Embedder>,
    top_n: usize,
}

impl ThematicContext {
    pub fn new(corpora: Vec<(String, Arc<Corpus>)>, embedder: Arc<dyn Embedder>, top_n: usize) -> Result<Self> {
        if top_n == 0 {
            return Err(Error::InvalidArgument("top_n must be at least 1".to_string()));
        }
        let mut seen = BTreeSet::new();
        let mut named = Vec::with_capacity(corpora.len());
        for (name, corpus) in corpora {
            if !seen.insert(name.clone()) {
                return Err(Error::InvalidConfig(format!("corpus '{name}' listed twice")));
            }
            if corpus.dim() != embedder.dim() {
                return Err(Error::InvalidConfig(format!(
                    "corpus '{}' has dimension {}, embedder produces {}",
                    name, corpus.dim(), embedder.dim()
                )));
            }
            let groups = corpus.school_groups();
            named.push(NamedCorpus { name, corpus, groups });
        }
        Ok(Self { corpora: named, embedder, top_n })
    }
}

/// The `n` members of `idxs` most similar to `query`, ties by corpus order.
pub fn top_n_for_school(query: &[f32], corpus: &Corpus, idxs: &[usize], n: usize) -> Vec<ThematicHit> {
    let mut scored: Vec<(f32, usize)> = idxs
        .iter()
        .filter_map(|&i| corpus.embedding(i).map(|v| (cosine(query, v), i)))
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
    scored
        .into_iter()
        .take(n)
        .filter_map(|(similarity, i)| corpus.passage(i).map(|p| ThematicHit { similarity, text: p.text.clone() }))
        .collect()
}

pub fn run_topic(ctx: &ThematicContext, topic: &str) -> Result<TopicResult> {
    let mut vectors = ctx.embedder.encode_checked(&[as_query(topic)], true)?;
    let query = vectors.pop().ok_or_else(|| Error::EmbeddingClientFailure("no vector for topic".to_string()))?;
    let mut result = TopicResult::new();
    for nc in &ctx.corpora {
        let hits: SchoolHits = nc
            .groups
            .iter()
            .map(|(school, idxs)| (school.clone(), top_n_for_school(&query, &nc.corpus, idxs, ctx.top_n)))
            .collect();
        result.insert(nc.name.clone(), hits);
    }
    Ok(result)
}

/// Process the topics owned by `ordinal`, logging per-topic timing and an
/// estimate of the time left for this worker.
pub fn run_worker(ctx: &ThematicContext, topics: &[String], ordinal: usize, n_workers: usize) -> Result<ThematicMap> {
    let mine = split_work(topics, n_workers, ordinal)?;
    let mut partial = ThematicMap::new();
    let mut elapsed_total = 0f64;
    for (done, topic) in mine.iter().enumerate() {
        let started = Instant::now();
        let result = run_topic(ctx, topic)?;
        partial.insert(topic.clone(), result);
        let secs = started.elapsed().as_secs_f64();
        elapsed_total += secs;
        let avg = elapsed_total / (done + 1) as f64;
        let remaining_min = (mine.len() - done - 1) as f64 * avg / 60.0;
        info!(
            worker = ordinal,
            topic = %topic,
            done = done + 1,
            total = mine.len(),
            secs,
            avg_secs = avg,
            remaining_min,
            "finished topic"
        );
    }
    Ok(partial)
}

/// Union of per-worker maps. Topic keys must not repeat across partials.
pub fn merge_partials(partials: Vec<ThematicMap>) -> Result<ThematicMap> {
    let mut merged = ThematicMap::new();
    for partial in partials {
        for (topic, result) in partial {
            if merged.contains_key(&topic) {
                return Err(Error::PartitionMismatch(format!("topic '{topic}' produced by more than one worker")));
            }
            merged.insert(topic, result);
        }
    }
    Ok(merged)
}

/// Run the whole topic list on `n_workers` threads and gather the results.
pub fn run_thematic(ctx: Arc<ThematicContext>, topics: &[String], n_workers: usize) -> anyhow::Result<ThematicMap> {
    let unique: BTreeSet<&String> = topics.iter().collect();
    if unique.len() != topics.len() {
        return Err(Error::InvalidArgument("topic list contains duplicates".to_string()).into());
    }
    if n_workers == 0 {
        return Err(Error::InvalidArgument("n_workers must be at least 1".to_string()).into());
    }
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(n_workers)
        .thread_name(|i| format!("philodb-thematic-{i}"))
        .build()
        .map_err(|e| anyhow!("failed to build thematic pool: {e}"))?;
    info!(topics = topics.len(), workers = n_workers, "starting thematic analysis");
    let partials: Vec<Result<ThematicMap>> = pool.install(|| {
        (0..n_workers)
            .into_par_iter()
            .map(|ordinal| run_worker(&ctx, topics, ordinal, n_workers))
            .collect()
    });
    let partials = partials.into_iter().collect::<Result<Vec<_>>>()?;
    Ok(merge_partials(partials)?)
}
