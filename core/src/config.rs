//! Engine configuration: lexical/embedding parameters and scoring weights.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Relative contribution of each ranking signal.
///
/// Weights are not required to sum to one and no range is enforced, but every
/// weight must be a finite number.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Weights {
    pub semantic: f32,
    pub lexical: f32,
    pub rating: f32,
    pub segment: f32,
}

impl Weights {
    /// Blend used by the interactive finder.
    pub const BALANCED: Weights =
        Weights { semantic: 0.35, lexical: 0.25, rating: 0.20, segment: 0.20 };
    /// Blend used by the command-line simulation: text signals dominate.
    pub const TEXT_HEAVY: Weights =
        Weights { semantic: 0.4, lexical: 0.4, rating: 0.2, segment: 0.1 };

    pub fn new(semantic: f32, lexical: f32, rating: f32, segment: f32) -> Self {
        Self { semantic, lexical, rating, segment }
    }

    pub fn validate(&self) -> Result<()> {
        let all = [
            ("semantic", self.semantic),
            ("lexical", self.lexical),
            ("rating", self.rating),
            ("segment", self.segment),
        ];
        for (name, w) in all {
            if !w.is_finite() {
                return Err(Error::config(format!("weight `{name}` must be finite, got {w}")));
            }
        }
        Ok(())
    }
}

impl Default for Weights {
    fn default() -> Self { Self::BALANCED }
}

/// How segment keywords are turned into an affinity score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMode {
    /// Fraction of the segment's keywords found in the venue text.
    #[default]
    Fractional,
    /// 1 when any keyword is found, 0 otherwise.
    Binary,
}

impl std::str::FromStr for ScoringMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fractional" => Ok(ScoringMode::Fractional),
            "binary" => Ok(ScoringMode::Binary),
            other => Err(Error::config(format!("unknown scoring mode `{other}`"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LexicalConfig {
    /// Upper bound on vocabulary size.
    pub max_features: usize,
    /// Longest n-gram considered (1 = unigrams only).
    pub ngram_max: usize,
}

impl Default for LexicalConfig {
    fn default() -> Self { Self { max_features: 5000, ngram_max: 2 } }
}

/// Which model turns text into dense vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingBackend {
    /// Feature hashing; no model files, always available.
    #[default]
    Hash,
    /// Multilingual MiniLM-L12 paraphrase model through ONNX (`fastembed` feature).
    Fastembed,
}

impl std::str::FromStr for EmbeddingBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hash" => Ok(EmbeddingBackend::Hash),
            "fastembed" => Ok(EmbeddingBackend::Fastembed),
            other => Err(Error::config(format!("unknown embedding backend `{other}`"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackend,
    /// Output width of the hash backend; model backends have a fixed width.
    pub dimension: usize,
    /// Where model backends cache downloaded weights.
    pub cache_dir: Option<PathBuf>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self { backend: EmbeddingBackend::Hash, dimension: 384, cache_dir: None }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub lexical: LexicalConfig,
    pub embedding: EmbeddingConfig,
    pub weights: Weights,
    pub scoring_mode: ScoringMode,
    pub top_k: TopK,
}

/// Default result count, kept as a newtype so serde can default it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopK(pub usize);

impl Default for TopK {
    fn default() -> Self { TopK(5) }
}

impl EngineConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let cfg: EngineConfig = serde_json::from_str(&text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        self.weights.validate()?;
        if self.lexical.max_features == 0 {
            return Err(Error::config("lexical.max_features must be positive"));
        }
        if self.lexical.ngram_max == 0 {
            return Err(Error::config("lexical.ngram_max must be positive"));
        }
        if self.embedding.dimension == 0 {
            return Err(Error::config("embedding.dimension must be positive"));
        }
        if self.top_k.0 == 0 {
            return Err(Error::config("top_k must be positive"));
        }
        Ok(())
    }
}
