//! Coffee-shop recommendation core.
//!
//! Reviews are cleaned and aggregated per venue, indexed lexically (TF-IDF) and
//! semantically (dense embeddings), then ranked per query by a weighted blend of text
//! similarity, normalised rating and customer-segment keyword affinity.

pub mod classify;
pub mod config;
pub mod dataset;
pub mod embed;
pub mod error;
pub mod index;
pub mod lexical;
pub mod persist;
pub mod recommend;
pub mod segment;
pub mod stem;
pub mod tokenizer;
pub mod venue;

pub use config::{EmbeddingBackend, EngineConfig, ScoringMode, Weights};
#[cfg(feature = "fastembed")]
pub use embed::FastEmbedder;
pub use embed::{Embedder, HashEmbedder};
pub use error::{Error, Result};
pub use index::{CorpusBuilder, CorpusIndex};
pub use recommend::{recommend, Query, Recommendation, RecommendContext, Signals};
pub use segment::SegmentKeywords;
pub use tokenizer::{Preprocessor, TextCleaner};
pub use venue::{ReviewRecord, Venue};
