//! Retrieval Engine: global top-k over the flat index, then per-school capping.

use anyhow::Result;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use philodb_core::config::SearchConfig;
use philodb_core::error::Error;
use philodb_core::similarity::l2_normalize;
use philodb_core::traits::{as_query, Embedder};
use philodb_core::types::{Corpus, Passage};

use crate::index_build::{load_index, FlatIpIndex, Neighbor};
use crate::merge::load_corpus;

#[derive(Debug, Clone, PartialEq)]
pub struct SearchParams {
    pub candidate_k: usize,
    /// Inclusive: a candidate needs `score >= similarity_floor`.
    pub similarity_floor: f32,
    pub per_school_cap: usize,
    pub widen_candidates: bool,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self::from(&SearchConfig::default())
    }
}

impl From<&SearchConfig> for SearchParams {
    fn from(c: &SearchConfig) -> Self {
        Self {
            candidate_k: c.candidate_k,
            similarity_floor: c.similarity_floor,
            per_school_cap: c.per_school_cap,
            widen_candidates: c.widen_candidates,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredPassage {
    pub score: f32,
    pub index: usize,
    pub passage: Passage,
}

/// All hits of one school, best first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchoolCard {
    pub school: String,
    pub best_score: f32,
    pub hits: Vec<ScoredPassage>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchoolSelection {
    All,
    Only(BTreeSet<String>),
}

impl SchoolSelection {
    pub fn only<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SchoolSelection::Only(names.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, school: &str) -> bool {
        match self {
            SchoolSelection::All => true,
            SchoolSelection::Only(set) => set.contains(school),
        }
    }
}

/// Walk candidates best-first, keeping at most `cap` hits per school with
/// `score >= floor`. Candidates must already be in rank order.
pub fn bucket_candidates(
    candidates: &[Neighbor],
    corpus: &Corpus,
    floor: f32,
    cap: usize,
) -> philodb_core::Result<BTreeMap<String, Vec<ScoredPassage>>> {
    let mut buckets: BTreeMap<String, Vec<ScoredPassage>> = BTreeMap::new();
    for n in candidates {
        if n.score < floor { continue; }
        let passage = corpus.passage(n.index).ok_or_else(|| {
            Error::IndexAlignment(format!("index returned row {} for a corpus of {}", n.index, corpus.len()))
        })?;
        let bucket = buckets.entry(passage.school.clone()).or_default();
        if bucket.len() < cap {
            bucket.push(ScoredPassage { score: n.score, index: n.index, passage: passage.clone() });
        }
    }
    Ok(buckets)
}

/// Keep selected schools and order them by best score, then by name.
pub fn order_cards(buckets: BTreeMap<String, Vec<ScoredPassage>>, selection: &SchoolSelection) -> Vec<SchoolCard> {
    let mut cards: Vec<SchoolCard> = buckets
        .into_iter()
        .filter(|(school, hits)| !hits.is_empty() && selection.contains(school))
        .map(|(school, hits)| SchoolCard { best_score: hits[0].score, school, hits })
        .collect();
    cards.sort_by(|a, b| b.best_score.total_cmp(&a.best_score).then_with(|| a.school.cmp(&b.school)));
    cards
}

/// Read-only query engine over a corpus and the index built from it.
///
/// Safe to share between threads; nothing is mutated after construction.
pub struct RetrievalEngine {
    corpus: Arc<Corpus>,
    index: Arc<FlatIpIndex>,
    embedder: Arc<dyn Embedder>,
    school_sizes: BTreeMap<String, usize>,
    params: SearchParams,
}

impl RetrievalEngine {
    pub fn new(corpus: Arc<Corpus>, index: Arc<FlatIpIndex>, embedder: Arc<dyn Embedder>, params: SearchParams) -> philodb_core::Result<Self> {
        index.check_alignment(&corpus)?;
        if embedder.dim() != index.dim() {
            return Err(Error::InvalidConfig(format!(
                "embedder produces dimension {}, index holds {}",
                embedder.dim(), index.dim()
            )));
        }
        let school_sizes = corpus.school_groups().into_iter().map(|(s, ix)| (s, ix.len())).collect();
        Ok(Self { corpus, index, embedder, school_sizes, params })
    }

    /// Load the persisted corpus and index and check they belong together.
    pub async fn open(corpus_dir: &Path, index_dir: &Path, embedder: Arc<dyn Embedder>, params: SearchParams) -> Result<Self> {
        let corpus = load_corpus(corpus_dir).await?;
        let index = load_index(index_dir).await?;
        Ok(Self::new(Arc::new(corpus), Arc::new(index), embedder, params)?)
    }

    pub fn corpus(&self) -> &Corpus { &self.corpus }
    pub fn params(&self) -> &SearchParams { &self.params }

    /// School names present in the corpus, alphabetical.
    pub fn schools(&self) -> impl Iterator<Item = &str> {
        self.school_sizes.keys().map(String::as_str)
    }

    pub fn search(&self, query: &str, selection: &SchoolSelection) -> philodb_core::Result<Vec<SchoolCard>> {
        self.search_with(query, &self.params, selection)
    }

    pub fn search_with(&self, query: &str, params: &SearchParams, selection: &SchoolSelection) -> philodb_core::Result<Vec<SchoolCard>> {
        let mut vectors = self.embedder.encode_checked(&[as_query(query)], true)?;
        let mut q = vectors.pop().ok_or_else(|| Error::EmbeddingClientFailure("no vector for query".to_string()))?;
        l2_normalize(&mut q);
        self.search_vector(&q, params, selection)
    }

    /// Grouped search for an already embedded, normalized query.
    pub fn search_vector(&self, query: &[f32], params: &SearchParams, selection: &SchoolSelection) -> philodb_core::Result<Vec<SchoolCard>> {
        if params.candidate_k == 0 || params.per_school_cap == 0 {
            return Err(Error::InvalidArgument("candidate_k and per_school_cap must be at least 1".to_string()));
        }
        let n = self.index.len();
        let mut k = params.candidate_k.min(n);
        loop {
            let candidates = self.index.search(query, k)?;
            let buckets = bucket_candidates(&candidates, &self.corpus, params.similarity_floor, params.per_school_cap)?;
            if !params.widen_candidates || k >= n || !self.needs_more(&candidates, &buckets, params, selection) {
                debug!(k, candidates = candidates.len(), schools = buckets.len(), "grouped search");
                return Ok(order_cards(buckets, selection));
            }
            k = k.saturating_mul(2).min(n);
            debug!(k, "widening candidate set");
        }
    }

    /// More candidates can only help while the weakest one still clears the
    /// floor and some selected school could hold more hits than it has.
    fn needs_more(
        &self,
        candidates: &[Neighbor],
        buckets: &BTreeMap<String, Vec<ScoredPassage>>,
        params: &SearchParams,
        selection: &SchoolSelection,
    ) -> bool {
        let Some(last) = candidates.last() else { return false };
        if last.score < params.similarity_floor {
            return false;
        }
        self.school_sizes.iter().any(|(school, &size)| {
            let have = buckets.get(school).map_or(0, Vec::len);
            selection.contains(school) && have < params.per_school_cap.min(size)
        })
    }
}
