#![allow(dead_code)]

use anyhow::{bail, Result};
use philodb_core::traits::Embedder;
use philodb_core::types::Passage;

/// Bag-of-words embedder over a fixed vocabulary; unknown words are ignored.
pub struct KeywordEmbedder {
    vocab: Vec<&'static str>,
}

impl KeywordEmbedder {
    pub fn new(vocab: &[&'static str]) -> Self {
        Self { vocab: vocab.to_vec() }
    }
}

impl Embedder for KeywordEmbedder {
    fn dim(&self) -> usize { self.vocab.len() }
    fn max_len(&self) -> usize { 512 }
    fn encode(&self, texts: &[String], normalize: bool) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0f32; self.vocab.len()];
                for word in t.split_whitespace() {
                    let word = word.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase();
                    if let Some(i) = self.vocab.iter().position(|w| *w == word) { v[i] += 1.0; }
                }
                if normalize { philodb_core::similarity::l2_normalize(&mut v); }
                v
            })
            .collect())
    }
}

/// Fails any batch that contains the word "poison".
pub struct PoisonedEmbedder(pub KeywordEmbedder);

impl Embedder for PoisonedEmbedder {
    fn dim(&self) -> usize { self.0.dim() }
    fn max_len(&self) -> usize { 512 }
    fn encode(&self, texts: &[String], normalize: bool) -> Result<Vec<Vec<f32>>> {
        if texts.iter().any(|t| t.contains("poison")) { bail!("model crashed"); }
        self.0.encode(texts, normalize)
    }
}

pub const VOCAB: &[&str] = &[
    "justice", "love", "fairness", "order", "patient", "giving", "is", "virtue", "god", "reason", "poison",
];

pub fn seven_passages() -> Vec<Passage> {
    vec![
        Passage::new("Justice is fairness.", "stoicism", "Meditations", "Marcus Aurelius"),
        Passage::new("Justice is order.", "stoicism", "Enchiridion", "Epictetus"),
        Passage::new("Virtue is reason.", "stoicism", "Letters", "Seneca"),
        Passage::new("Love is patient.", "christian", "Corinthians", "Paul"),
        Passage::new("Love is giving.", "christian", "Confessions", "Augustine"),
        Passage::new("God is love.", "christian", "John", "John"),
        Passage::new("Reason is order.", "rationalism", "Ethics", "Spinoza"),
    ]
}
