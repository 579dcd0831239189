use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::types::{Passage, UNKNOWN};

/// One line of the ingestion file. `sentence_str` is accepted for `text`.
#[derive(Debug, Deserialize)]
struct RawPassage {
    #[serde(alias = "sentence_str")]
    text: String,
    #[serde(default)]
    school: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    author: Option<String>,
}

impl From<RawPassage> for Passage {
    fn from(raw: RawPassage) -> Self {
        let or_unknown = |v: Option<String>| v.filter(|s| !s.trim().is_empty()).unwrap_or_else(|| UNKNOWN.to_string());
        Passage { text: raw.text, school: or_unknown(raw.school), title: or_unknown(raw.title), author: or_unknown(raw.author) }
    }
}

/// Loads passages from a JSON Lines file, keeping file order as corpus order.
#[derive(Default)]
pub struct DataProcessor {
    limit: Option<usize>,
}

impl DataProcessor {
    pub fn new() -> Self { Self::default() }

    pub fn with_limit(limit: usize) -> Self { Self { limit: Some(limit) } }

    pub fn process_file(&self, path: &Path) -> Result<Vec<Passage>> {
        let content = self.read_file_content(path)?;
        let passages = self.parse_lines(&content)?;
        info!(path = %path.display(), passages = passages.len(), "loaded passages");
        Ok(passages)
    }

    pub fn parse_lines(&self, content: &str) -> Result<Vec<Passage>> {
        let mut passages = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            if self.limit.is_some_and(|lim| passages.len() >= lim) {
                debug!(limit = ?self.limit, "passage limit reached");
                break;
            }
            let line = line.trim();
            if line.is_empty() { continue; }
            let raw: RawPassage = serde_json::from_str(line)
                .map_err(|e| Error::InvalidArgument(format!("line {}: {}", line_no + 1, e)))?;
            passages.push(raw.into());
        }
        Ok(passages)
    }

    fn read_file_content(&self, path: &Path) -> Result<String> {
        if !path.exists() {
            return Err(Error::NotFound(format!("passage file {}", path.display())));
        }
        match fs::read_to_string(path) {
            Ok(content) => Ok(content),
            Err(_) => Ok(String::from_utf8_lossy(&fs::read(path)?).to_string()),
        }
    }
}
