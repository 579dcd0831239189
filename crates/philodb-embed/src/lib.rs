//! philodb-embed
//!
//! Embedding Client implementations behind `philodb_core::traits::Embedder`:
//! a local XLM-RoBERTa encoder (multilingual-e5 weights) running on candle, and
//! a deterministic hashing `FakeEmbedder` for tests and development.

use anyhow::{Result, anyhow};
use std::path::{Path, PathBuf};
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::{XLMRobertaModel, Config as XLMRobertaConfig};
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use philodb_core::config::{expand_path, EmbeddingConfig};
pub use philodb_core::traits::Embedder;

pub mod device;
pub mod pool;
pub mod tokenize;

pub use pool::{l2_normalize_rows, masked_mean, masked_mean_l2};

pub struct EmbeddingModel { model: XLMRobertaModel, tokenizer: Tokenizer, device: Device, dim: usize, max_len: usize }

impl EmbeddingModel {
    pub fn new(model_dir: &Path, max_len: usize) -> Result<Self> {
        let device = device::select_device();
        info!(model_dir = %model_dir.display(), "loading embedding model");
        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;
        let config_path = model_dir.join("config.json");
        let config: XLMRobertaConfig = serde_json::from_str(&std::fs::read_to_string(&config_path)?)?;
        let dim = serde_json::from_str::<serde_json::Value>(&std::fs::read_to_string(&config_path)?)?
            .get("hidden_size")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| anyhow!("config.json has no hidden_size"))? as usize;
        let vb = load_weights(model_dir, DType::F32, &device)?;
        let model = XLMRobertaModel::new(&config, vb)?;
        info!(dim, max_len, "embedding model loaded");
        Ok(Self { model, tokenizer, device, dim, max_len })
    }

    fn encode_batch(&self, texts: &[String], normalize: bool) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() { return Ok(Vec::new()); }
        let start = Instant::now();
        let (input_ids, attention_mask) = tokenize::tokenize_batch(&self.tokenizer, texts, self.max_len, &self.device)?;
        let token_type_ids = input_ids.zeros_like()?;
        let hidden = self.model.forward(&input_ids, &attention_mask, &token_type_ids, None, None, None)?;
        let pooled = if normalize { masked_mean_l2(&hidden, &attention_mask)? } else { masked_mean(&hidden, &attention_mask)? };
        let out: Vec<Vec<f32>> = pooled.to_device(&Device::Cpu)?.to_dtype(DType::F32)?.to_vec2()?;
        let elapsed = start.elapsed();
        debug!(batch = texts.len(), ms = elapsed.as_millis() as u64, "encoded batch");
        if elapsed.as_secs() > 30 { warn!(batch = texts.len(), "slow embedding batch"); }
        Ok(out)
    }
}

/// Weights from `model.safetensors`, falling back to `pytorch_model.bin`.
///
/// The safetensors file is read into memory rather than mapped.
pub fn load_weights(model_dir: &Path, dtype: DType, device: &Device) -> Result<VarBuilder<'static>> {
    let safetensors = model_dir.join("model.safetensors");
    if safetensors.exists() {
        debug!("loading safetensors weights");
        return Ok(VarBuilder::from_buffered_safetensors(std::fs::read(&safetensors)?, dtype, device)?);
    }
    let pytorch = model_dir.join("pytorch_model.bin");
    if !pytorch.exists() {
        return Err(anyhow!("no model.safetensors or pytorch_model.bin in {}", model_dir.display()));
    }
    debug!("loading pytorch weights");
    let weights = candle_core::pickle::read_all(&pytorch)?;
    let weights_map: std::collections::HashMap<String, Tensor> = weights.into_iter().collect();
    Ok(VarBuilder::from_tensors(weights_map, dtype, device))
}

impl Embedder for EmbeddingModel {
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { self.max_len }
    fn encode(&self, texts: &[String], normalize: bool) -> Result<Vec<Vec<f32>>> { self.encode_batch(texts, normalize) }
}

/// Deterministic token-hashing embedder. Same text, same vector, on every run.
pub struct FakeEmbedder { dim: usize }

impl FakeEmbedder { pub fn new(dim: usize) -> Self { Self { dim } } }

impl FakeEmbedder {
    fn embed_one(&self, text: &str, normalize: bool) -> Vec<f32> {
        use std::hash::{Hash, Hasher}; use twox_hash::XxHash64;
        let mut v = vec![0f32; self.dim];
        for (i, token) in text.split_whitespace().enumerate() {
            let token = token.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase();
            if token.is_empty() { continue; }
            let mut hasher = XxHash64::with_seed(0); token.hash(&mut hasher); let h = hasher.finish();
            let idx = (h as usize) % self.dim; let val = (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            v[idx] += val + (i as f32 % 3.0) * 0.01;
        }
        if normalize {
            let norm = (v.iter().map(|x| x * x).sum::<f32>()).sqrt().max(1e-6); for x in &mut v { *x /= norm; }
        }
        v
    }
}

impl Embedder for FakeEmbedder {
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { usize::MAX }
    fn encode(&self, texts: &[String], normalize: bool) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t, normalize)).collect())
    }
}

fn use_fake_from_env() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS").ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false)
}

pub fn embedder_from_config(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>> {
    if config.use_fake || use_fake_from_env() {
        info!(dim = config.fake_dim, "using FakeEmbedder");
        return Ok(Box::new(FakeEmbedder::new(config.fake_dim)));
    }
    let model_dir = resolve_model_dir(config.model_dir.as_deref())?;
    Ok(Box::new(EmbeddingModel::new(&model_dir, config.max_len)?))
}

fn resolve_model_dir(configured: Option<&str>) -> Result<PathBuf> {
    if let Some(dir) = configured { let p = expand_path(dir); if p.exists() { return Ok(p); } warn!(dir, "configured model_dir does not exist"); }
    if let Ok(dir) = std::env::var("APP_MODEL_DIR") { let p = PathBuf::from(&dir); if p.exists() { info!(dir = %p.display(), "using APP_MODEL_DIR"); return Ok(p); } }
    if let Ok(dir) = std::env::var("MODEL_DIR") { let p = PathBuf::from(&dir); if p.exists() { info!(dir = %p.display(), "using MODEL_DIR"); return Ok(p); } }
    let root = Path::new("../models/multilingual-e5-large"); if root.exists() { return Ok(root.to_path_buf()); }
    let local = Path::new("models/multilingual-e5-large"); if local.exists() { return Ok(local.to_path_buf()); }
    Err(anyhow!("Could not locate multilingual-e5-large model directory"))
}
