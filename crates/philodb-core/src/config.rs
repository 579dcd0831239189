//! Configuration loader and path helpers.
//!
//! Uses Figment to merge compiled defaults + `config.toml` + `config.<env>.toml`
//! + `APP_*` env vars (nested keys separated by `__`, e.g.
//! `APP_SEARCH__PER_SCHOOL_CAP=3`). Configured paths expand `~` and `${VAR}`.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

use crate::error::{Error, Result};

/// Thematic questions compared against every school of every corpus.
pub const DEFAULT_TOPICS: &[&str] = &[
    "What is justice?",
    "What is virtue?",
    "What is truth?",
    "What is wisdom?",
    "How do we deal with suffering?",
    "What is happiness?",
    "What is our duty?",
    "What does it mean to be free?",
    "What is compassion?",
    "What is evil?",
    "How should we face death?",
    "What is the meaning of life?",
    "How should we handle relationships?",
    "What is friendship?",
    "What is love?",
    "How do we find our identity?",
    "How should we approach mental health?",
    "What is the impact of technology on life?",
    "How does social media affect us?",
    "What should we do about climate change?",
    "How should we address inequality?",
    "How should we respond to racism?",
    "What is gender?",
    "What is the meaning of work?",
    "How do we find purpose?",
    "How do we deal with anxiety?",
    "How do we build self-esteem?",
    "How do we overcome addiction?",
    "How do we prevent violence?",
    "What is forgiveness?",
    "What is good leadership?",
    "What is community?",
    "What is privacy?",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data: DataConfig,
    pub workers: WorkerConfig,
    pub search: SearchConfig,
    pub embedding: EmbeddingConfig,
    pub analysis: AnalysisConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub input: String,
    pub parts_dir: String,
    pub corpus_dir: String,
    pub index_dir: String,
    pub bundle_path: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            input: "data/philosophy.jsonl".to_string(),
            parts_dir: "data/parts".to_string(),
            corpus_dir: "data/corpus".to_string(),
            index_dir: "data/index".to_string(),
            bundle_path: "data/deep_analysis.json".to_string(),
        }
    }
}

impl DataConfig {
    pub fn input_path(&self) -> PathBuf { expand_path(&self.input) }
    pub fn parts_path(&self) -> PathBuf { expand_path(&self.parts_dir) }
    pub fn corpus_path(&self) -> PathBuf { expand_path(&self.corpus_dir) }
    pub fn index_path(&self) -> PathBuf { expand_path(&self.index_dir) }
    pub fn bundle_file(&self) -> PathBuf { expand_path(&self.bundle_path) }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Fixed pool size W, decided once at startup.
    pub count: usize,
    /// Texts per embedding call inside one worker.
    pub batch_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        let count = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        Self { count, batch_size: 64 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Global top-k fetched before per-school capping.
    pub candidate_k: usize,
    /// Minimum inner product (inclusive) for a candidate to be shown.
    pub similarity_floor: f32,
    pub per_school_cap: usize,
    /// Grow k until every selected school is either full or provably exhausted.
    pub widen_candidates: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { candidate_k: 5000, similarity_floor: 0.2, per_school_cap: 2, widen_candidates: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model_dir: Option<String>,
    pub max_len: usize,
    pub use_fake: bool,
    pub fake_dim: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self { model_dir: None, max_len: 512, use_fake: false, fake_dim: 1024 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedCorpusConfig {
    pub name: String,
    pub corpus_dir: String,
}

impl NamedCorpusConfig {
    pub fn path(&self) -> PathBuf { expand_path(&self.corpus_dir) }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Corpora compared school-by-school; the thematic run uses all of them.
    pub corpora: Vec<NamedCorpusConfig>,
    /// Optional combined corpus that is only clustered.
    pub unified: Option<NamedCorpusConfig>,
    pub topics: Vec<String>,
    pub top_n: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            corpora: vec![
                NamedCorpusConfig { name: "philosophy".to_string(), corpus_dir: "data/corpus".to_string() },
                NamedCorpusConfig { name: "religion".to_string(), corpus_dir: "data/religion_corpus".to_string() },
            ],
            unified: None,
            topics: DEFAULT_TOPICS.iter().map(|t| (*t).to_string()).collect(),
            top_n: 5,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(Error::InvalidConfig(msg.to_string()));
        if self.workers.count == 0 { return fail("workers.count must be at least 1"); }
        if self.workers.batch_size == 0 { return fail("workers.batch_size must be at least 1"); }
        if self.search.candidate_k == 0 { return fail("search.candidate_k must be at least 1"); }
        if self.search.per_school_cap == 0 { return fail("search.per_school_cap must be at least 1"); }
        if !self.search.similarity_floor.is_finite() { return fail("search.similarity_floor must be finite"); }
        if self.analysis.top_n == 0 { return fail("analysis.top_n must be at least 1"); }
        if self.embedding.use_fake && self.embedding.fake_dim == 0 { return fail("embedding.fake_dim must be at least 1"); }
        Ok(())
    }
}

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        Self::load_for_env(&env_name)
    }

    pub fn load_for_env(env_name: &str) -> anyhow::Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default())).merge(Toml::file("config.toml"));
        match env_name {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.validate_for_env(env_name)?;
        Ok(config)
    }

    pub fn from_figment(figment: Figment) -> Self {
        Self { figment }
    }

    pub fn settings(&self) -> anyhow::Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to extract settings: {}", e))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate_for_env(&self, env: &str) -> anyhow::Result<()> {
        let settings = self.settings()?;
        if matches!(env, "prod" | "production") && settings.embedding.use_fake {
            return Err(Error::InvalidConfig("fake embeddings are not allowed in production".to_string()).into());
        }
        Ok(())
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}
