//! Dense text embeddings.
//!
//! The recommender only depends on the [`Embedder`] trait, so any sentence model can back
//! it as long as the same instance is used when the index is built and when it is queried.

use crate::config::{EmbeddingBackend, EmbeddingConfig};
use crate::error::Result;
use std::sync::Arc;

/// A deterministic text → vector function of fixed dimension.
pub trait Embedder: Send + Sync {
    /// Stable identifier recorded in persisted indexes.
    fn id(&self) -> &str;
    fn dimension(&self) -> usize;
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

/// Instantiate the embedder selected by `cfg`.
pub fn from_config(cfg: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match cfg.backend {
        EmbeddingBackend::Hash => Ok(Arc::new(HashEmbedder::new(cfg.dimension))),
        #[cfg(feature = "fastembed")]
        EmbeddingBackend::Fastembed => Ok(Arc::new(FastEmbedder::new(cfg.cache_dir.clone())?)),
        #[cfg(not(feature = "fastembed"))]
        EmbeddingBackend::Fastembed => Err(crate::error::Error::config(
            "embedding backend `fastembed` needs kopi-core built with the `fastembed` feature",
        )),
    }
}

/// Feature-hashing embedder over word tokens and character trigrams.
///
/// Trigrams make inflected or misspelled forms land near each other, which plain term
/// matching cannot do. Output is L2-normalised; empty text embeds to the zero vector.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
    id: String,
}

const WORD_WEIGHT: f32 = 1.0;
const TRIGRAM_WEIGHT: f32 = 0.5;

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension: dimension.max(1), id: format!("fnv-hash-{}", dimension.max(1)) }
    }

    fn add(&self, acc: &mut [f32], feature: &[u8], weight: f32) {
        let h = fnv1a(feature);
        let slot = (h % self.dimension as u64) as usize;
        let sign = if (h >> 63) & 1 == 0 { 1.0 } else { -1.0 };
        acc[slot] += sign * weight;
    }

    fn hash(&self, text: &str) -> Vec<f32> {
        let mut acc = vec![0.0f32; self.dimension];
        let lowered = text.to_lowercase();
        for word in lowered.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            self.add(&mut acc, word.as_bytes(), WORD_WEIGHT);
            let padded: Vec<char> = format!("<{word}>").chars().collect();
            for tri in padded.windows(3) {
                let s: String = tri.iter().collect();
                self.add(&mut acc, s.as_bytes(), TRIGRAM_WEIGHT);
            }
        }
        let norm = l2_norm(&acc);
        if norm > 0.0 {
            for x in acc.iter_mut() { *x /= norm; }
        }
        acc
    }
}

impl Default for HashEmbedder {
    fn default() -> Self { Self::new(384) }
}

impl Embedder for HashEmbedder {
    fn id(&self) -> &str { &self.id }

    fn dimension(&self) -> usize { self.dimension }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.hash(text))
    }
}

#[cfg(feature = "fastembed")]
pub use self::fastembed_backend::FastEmbedder;

#[cfg(feature = "fastembed")]
mod fastembed_backend {
    use super::Embedder;
    use crate::error::{Error, Result};
    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
    use parking_lot::Mutex;
    use std::path::PathBuf;

    const MODEL_ID: &str = "fastembed-paraphrase-multilingual-minilm-l12-v2";
    const MODEL_DIMENSION: usize = 384;

    /// Multilingual MiniLM-L12 paraphrase model, run locally through ONNX.
    ///
    /// Weights are downloaded on first use into `cache_dir` (or fastembed's default cache).
    pub struct FastEmbedder {
        model: Mutex<TextEmbedding>,
    }

    impl FastEmbedder {
        pub fn new(cache_dir: Option<PathBuf>) -> Result<Self> {
            let mut options = InitOptions::new(EmbeddingModel::ParaphraseMLMiniLML12V2)
                .with_show_download_progress(false);
            if let Some(dir) = cache_dir {
                options = options.with_cache_dir(dir);
            }
            let model = TextEmbedding::try_new(options)
                .map_err(|e| Error::embedding(format!("failed to load model: {e}")))?;
            tracing::info!(model = MODEL_ID, "loaded sentence embedding model");
            Ok(Self { model: Mutex::new(model) })
        }
    }

    impl Embedder for FastEmbedder {
        fn id(&self) -> &str { MODEL_ID }

        fn dimension(&self) -> usize { MODEL_DIMENSION }

        fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.embed_batch(&[text])?
                .pop()
                .ok_or_else(|| Error::embedding("model returned no vector"))
        }

        fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            if texts.is_empty() {
                return Ok(Vec::new());
            }
            let out = self
                .model
                .lock()
                .embed(texts.to_vec(), None)
                .map_err(|e| Error::embedding(e.to_string()))?;
            if let Some(bad) = out.iter().find(|v| v.len() != MODEL_DIMENSION) {
                return Err(Error::embedding(format!(
                    "model returned {} dims, expected {MODEL_DIMENSION}",
                    bad.len()
                )));
            }
            Ok(out)
        }
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        h ^= u64::from(*b);
        h = h.wrapping_mul(0x0000_0100_0000_01b3);
    }
    h
}

pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Cosine similarity; zero when either vector has zero length.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "vectors must have same dimension");
    let denom = l2_norm(a) * l2_norm(b);
    if denom == 0.0 {
        return 0.0;
    }
    a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>() / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_and_unit_length() {
        let e = HashEmbedder::new(64);
        let a = e.embed("wifi kencang tenang").unwrap();
        assert_eq!(a, e.embed("wifi kencang tenang").unwrap());
        assert_eq!(a.len(), 64);
        assert!((l2_norm(&a) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn empty_text_is_zero_and_scores_zero() {
        let e = HashEmbedder::default();
        let z = e.embed("   ").unwrap();
        assert!(z.iter().all(|x| *x == 0.0));
        assert_eq!(cosine_similarity(&z, &e.embed("kopi").unwrap()), 0.0);
    }

    #[test]
    fn related_text_is_closer_than_unrelated() {
        let e = HashEmbedder::default();
        let q = e.embed("wifi tenang").unwrap();
        let near = cosine_similarity(&q, &e.embed("wifi kencang tenang").unwrap());
        let far = cosine_similarity(&q, &e.embed("kopi susu enak").unwrap());
        assert!(near > far);
    }

    #[test]
    fn config_selects_the_backend() {
        let cfg = EmbeddingConfig { dimension: 32, ..Default::default() };
        let e = from_config(&cfg).unwrap();
        assert_eq!(e.id(), "fnv-hash-32");
        assert_eq!(e.embed_batch(&["kopi", "wifi"]).unwrap().len(), 2);
    }

    #[cfg(not(feature = "fastembed"))]
    #[test]
    fn model_backend_without_feature_is_a_config_error() {
        let cfg = EmbeddingConfig { backend: EmbeddingBackend::Fastembed, ..Default::default() };
        assert!(from_config(&cfg).err().unwrap().is_config());
    }
}
