//! The analysis bundle: everything the reporting side needs in one JSON file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use philodb_core::types::Corpus;

use crate::cluster::{ward_linkage, LinkageRow};
use crate::groups::SchoolVectors;
use crate::matrix::{cross_similarity, self_similarity};
use crate::thematic::ThematicMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusAnalysis {
    pub name: String,
    /// Alphabetical; indexes the matrix rows and linkage leaves.
    pub schools: Vec<String>,
    pub self_similarity: Vec<Vec<f32>>,
    pub ward_linkage: Vec<LinkageRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossSimilarity {
    pub rows: String,
    pub cols: String,
    pub matrix: Vec<Vec<f32>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisBundle {
    pub topics: Vec<String>,
    pub corpora: Vec<CorpusAnalysis>,
    pub cross: Vec<CrossSimilarity>,
    pub unified: Option<CorpusAnalysis>,
    pub thematic: ThematicMap,
}

pub fn analyze_corpus(name: &str, corpus: &Corpus) -> (CorpusAnalysis, SchoolVectors) {
    let groups = SchoolVectors::from_corpus(corpus);
    let analysis = CorpusAnalysis {
        name: name.to_string(),
        schools: groups.names.clone(),
        self_similarity: self_similarity(&groups),
        ward_linkage: ward_linkage(&groups.vectors),
    };
    info!(corpus = name, schools = groups.len(), "analyzed school vectors");
    (analysis, groups)
}

/// Per-corpus matrices and linkages, a cross matrix for every pair of corpora
/// in listed order, and the thematic map.
pub fn build_bundle(
    corpora: &[(String, Arc<Corpus>)],
    unified: Option<(String, Arc<Corpus>)>,
    topics: Vec<String>,
    thematic: ThematicMap,
) -> AnalysisBundle {
    let analyzed: Vec<(CorpusAnalysis, SchoolVectors)> =
        corpora.iter().map(|(name, corpus)| analyze_corpus(name, corpus)).collect();
    let mut cross = Vec::new();
    for (i, (a, ga)) in analyzed.iter().enumerate() {
        for (b, gb) in &analyzed[i + 1..] {
            cross.push(CrossSimilarity { rows: a.name.clone(), cols: b.name.clone(), matrix: cross_similarity(ga, gb) });
        }
    }
    let unified = unified.map(|(name, corpus)| analyze_corpus(&name, &corpus).0);
    AnalysisBundle {
        topics,
        corpora: analyzed.into_iter().map(|(a, _)| a).collect(),
        cross,
        unified,
        thematic,
    }
}

impl AnalysisBundle {
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        info!(path = %path.display(), topics = self.thematic.len(), "analysis bundle saved");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    pub fn corpus(&self, name: &str) -> Option<&CorpusAnalysis> {
        self.corpora.iter().find(|c| c.name == name)
    }
}
