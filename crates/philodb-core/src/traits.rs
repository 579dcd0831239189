use crate::error::{Error, Result};

/// Prefix applied to corpus passages before embedding (e5-style asymmetric models).
pub const PASSAGE_PREFIX: &str = "passage: ";
/// Prefix applied to user questions and thematic topics before embedding.
pub const QUERY_PREFIX: &str = "query: ";

pub fn as_passage(text: &str) -> String {
    format!("{PASSAGE_PREFIX}{text}")
}

pub fn as_query(text: &str) -> String {
    format!("{QUERY_PREFIX}{text}")
}

/// Black-box text encoder with a fixed output dimensionality.
///
/// Implementations must be deterministic for a given batch so that index and
/// query vectors stay comparable between runs.
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn encode(&self, texts: &[String], normalize: bool) -> anyhow::Result<Vec<Vec<f32>>>;

    /// `encode` plus shape checks; any failure is an `EmbeddingClientFailure`.
    fn encode_checked(&self, texts: &[String], normalize: bool) -> Result<Vec<Vec<f32>>> {
        let out = self
            .encode(texts, normalize)
            .map_err(|e| Error::EmbeddingClientFailure(format!("{e:#}")))?;
        if out.len() != texts.len() {
            return Err(Error::EmbeddingClientFailure(format!(
                "embedder returned {} vectors for {} inputs",
                out.len(),
                texts.len()
            )));
        }
        let dim = self.dim();
        if let Some((i, v)) = out.iter().enumerate().find(|(_, v)| v.len() != dim) {
            return Err(Error::EmbeddingClientFailure(format!(
                "vector {} has dimension {}, expected {}",
                i,
                v.len(),
                dim
            )));
        }
        if out.iter().flatten().any(|x| !x.is_finite()) {
            return Err(Error::EmbeddingClientFailure("embedder returned non-finite values".to_string()));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Broken;
    impl Embedder for Broken {
        fn dim(&self) -> usize { 3 }
        fn max_len(&self) -> usize { 8 }
        fn encode(&self, texts: &[String], _normalize: bool) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.0; 2]).collect())
        }
    }

    #[test]
    fn wrong_dimension_is_a_client_failure() {
        let err = Broken.encode_checked(&["x".to_string()], true).unwrap_err();
        assert!(matches!(err, Error::EmbeddingClientFailure(_)));
    }

    #[test]
    fn prefixes() {
        assert_eq!(as_query("What is justice?"), "query: What is justice?");
        assert_eq!(as_passage(""), "passage: ");
    }
}
