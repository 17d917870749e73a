//! The corpus index: venue table plus lexical and semantic indexes, row-aligned.

use crate::config::EngineConfig;
use crate::embed::Embedder;
use crate::error::{Error, Result};
use crate::lexical::{SparseVector, TfidfModel};
use crate::tokenizer::Preprocessor;
use crate::venue::{aggregate_reviews, ReviewRecord, Venue};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Immutable after build. Row `i` of every artifact describes `venues[i]`; the fields are
/// private so the only way to read them is through aligned [`Row`]s.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusIndex {
    venues: Vec<Venue>,
    lexical_model: TfidfModel,
    lexical_matrix: Vec<SparseVector>,
    embeddings: Vec<Vec<f32>>,
    embedder_id: String,
    dimension: usize,
}

/// One venue together with its lexical and semantic rows.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    pub position: usize,
    pub venue: &'a Venue,
    pub lexical: &'a SparseVector,
    pub embedding: &'a [f32],
}

impl CorpusIndex {
    /// Assemble an index from its parts, rejecting any misalignment.
    pub fn from_parts(
        venues: Vec<Venue>,
        lexical_model: TfidfModel,
        lexical_matrix: Vec<SparseVector>,
        embeddings: Vec<Vec<f32>>,
        embedder_id: impl Into<String>,
        dimension: usize,
    ) -> Result<Self> {
        let index = Self {
            venues,
            lexical_model,
            lexical_matrix,
            embeddings,
            embedder_id: embedder_id.into(),
            dimension,
        };
        index.validate()?;
        Ok(index)
    }

    /// Checks row alignment and that every stored number is usable for scoring;
    /// deserialized indexes go through this too.
    pub fn validate(&self) -> Result<()> {
        if self.venues.is_empty() {
            return Err(Error::data("corpus has no venues"));
        }
        let n = self.venues.len();
        if self.lexical_matrix.len() != n || self.embeddings.len() != n {
            return Err(Error::data(format!(
                "index rows misaligned: {} venues, {} lexical rows, {} embeddings",
                self.venues.len(),
                self.lexical_matrix.len(),
                self.embeddings.len()
            )));
        }
        if let Some(bad) = self.embeddings.iter().position(|e| e.len() != self.dimension) {
            return Err(Error::data(format!(
                "embedding {bad} has dimension {}, expected {}",
                self.embeddings[bad].len(),
                self.dimension
            )));
        }
        if let Some(v) = self.venues.iter().find(|v| !v.rating.is_finite()) {
            let msg = format!("venue `{}` has non-finite rating {}", v.name, v.rating);
            return Err(Error::data(msg));
        }
        if let Some(bad) = self.embeddings.iter().position(|e| e.iter().any(|x| !x.is_finite())) {
            return Err(Error::data(format!("embedding {bad} has non-finite components")));
        }
        self.lexical_model.validate()?;
        for row in &self.lexical_matrix {
            self.lexical_model.check_row(row)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize { self.venues.len() }

    pub fn is_empty(&self) -> bool { self.venues.is_empty() }

    pub fn venues(&self) -> &[Venue] { &self.venues }

    pub fn lexical_model(&self) -> &TfidfModel { &self.lexical_model }

    pub fn embedder_id(&self) -> &str { &self.embedder_id }

    pub fn dimension(&self) -> usize { self.dimension }

    pub fn row(&self, i: usize) -> Option<Row<'_>> {
        Some(Row {
            position: i,
            venue: self.venues.get(i)?,
            lexical: self.lexical_matrix.get(i)?,
            embedding: self.embeddings.get(i)?.as_slice(),
        })
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> + '_ {
        (0..self.venues.len()).filter_map(move |i| self.row(i))
    }

    pub fn find(&self, name: &str) -> Option<&Venue> {
        self.venues.iter().find(|v| v.name == name)
    }

    /// Fails when the index was built by a different embedding model.
    pub fn check_embedder(&self, embedder: &dyn Embedder) -> Result<()> {
        if embedder.id() != self.embedder_id || embedder.dimension() != self.dimension {
            return Err(Error::config(format!(
                "index built with embedder `{}` ({} dims), got `{}` ({} dims)",
                self.embedder_id,
                self.dimension,
                embedder.id(),
                embedder.dimension()
            )));
        }
        Ok(())
    }
}

/// Builds a [`CorpusIndex`] from raw reviews.
pub struct CorpusBuilder<'a> {
    preprocessor: &'a dyn Preprocessor,
    embedder: &'a dyn Embedder,
    config: EngineConfig,
}

impl<'a> CorpusBuilder<'a> {
    pub fn new(preprocessor: &'a dyn Preprocessor, embedder: &'a dyn Embedder) -> Self {
        Self { preprocessor, embedder, config: EngineConfig::default() }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build<I>(&self, records: I) -> Result<CorpusIndex>
    where
        I: IntoIterator<Item = ReviewRecord>,
    {
        let venues = aggregate_reviews(records, self.preprocessor);
        self.index_venues(venues)
    }

    /// Index venues whose text is already aggregated and cleaned.
    pub fn index_venues(&self, venues: Vec<Venue>) -> Result<CorpusIndex> {
        if venues.is_empty() {
            return Err(Error::data(
                "no venues left after dropping rows without name or review text",
            ));
        }
        let mut seen: HashMap<&str, usize> = HashMap::new();
        for (i, v) in venues.iter().enumerate() {
            if let Some(prev) = seen.insert(v.name.as_str(), i) {
                return Err(Error::data(format!(
                    "venue `{}` appears at rows {prev} and {i}",
                    v.name
                )));
            }
        }

        let docs: Vec<&str> = venues.iter().map(|v| v.aggregated_text.as_str()).collect();
        let (lexical_model, lexical_matrix) =
            TfidfModel::fit_transform(&docs, &self.config.lexical);
        let embeddings = self.embedder.embed_batch(&docs)?;
        tracing::info!(
            venues = venues.len(),
            vocabulary = lexical_model.vocabulary_size(),
            embedder = self.embedder.id(),
            "built corpus index"
        );
        CorpusIndex::from_parts(
            venues,
            lexical_model,
            lexical_matrix,
            embeddings,
            self.embedder.id(),
            self.embedder.dimension(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::HashEmbedder;
    use crate::tokenizer::IdentityPreprocessor;

    #[test]
    fn empty_input_is_a_data_error() {
        let e = HashEmbedder::new(16);
        let builder = CorpusBuilder::new(&IdentityPreprocessor, &e);
        let rows = vec![ReviewRecord { name: Some("A".into()), ..Default::default() }];
        assert!(matches!(builder.build(rows), Err(Error::Data(_))));
        assert!(matches!(builder.index_venues(vec![]), Err(Error::Data(_))));
    }

    #[test]
    fn rows_stay_aligned_with_venues() {
        let e = HashEmbedder::new(32);
        let venues = vec![Venue::new("A", "wifi tenang", 4.0), Venue::new("B", "kopi susu", 3.0)];
        let idx = CorpusBuilder::new(&IdentityPreprocessor, &e).index_venues(venues).unwrap();
        for row in idx.rows() {
            assert_eq!(row.embedding, e.embed(&row.venue.aggregated_text).unwrap().as_slice());
            assert_eq!(*row.lexical, idx.lexical_model().transform(&row.venue.aggregated_text));
        }
        assert!(idx.check_embedder(&e).is_ok());
        assert!(idx.check_embedder(&HashEmbedder::new(8)).unwrap_err().is_config());
    }

    #[test]
    fn misaligned_parts_are_rejected() {
        let (model, rows) = TfidfModel::fit_transform(&["a b"], &Default::default());
        let venues = vec![Venue::new("A", "ab cd", 1.0)];
        let err = CorpusIndex::from_parts(venues, model, rows, vec![], "x", 4).unwrap_err();
        assert!(matches!(err, Error::Data(_)));
    }

    #[test]
    fn non_finite_ratings_are_rejected() {
        let e = HashEmbedder::new(16);
        let builder = CorpusBuilder::new(&IdentityPreprocessor, &e);
        for bad in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
            let venues =
                vec![Venue::new("good", "wifi tenang", 5.0), Venue::new("bad", "zzz", bad)];
            assert!(matches!(builder.index_venues(venues), Err(Error::Data(_))));
        }
    }

    #[test]
    fn inconsistent_lexical_model_is_rejected() {
        let venues = vec![Venue::new("A", "wifi", 4.0)];
        let mut vocabulary = HashMap::new();
        vocabulary.insert("wifi".to_string(), 5);
        let model = TfidfModel { vocabulary, idf: vec![], ngram_max: 1 };
        let rows = vec![SparseVector::default()];
        let err = CorpusIndex::from_parts(venues.clone(), model, rows, vec![vec![0.0; 4]], "x", 4);
        assert!(matches!(err, Err(Error::Data(_))));

        // a row pointing past the vocabulary
        let (model, _) = TfidfModel::fit_transform(&["wifi"], &Default::default());
        let rows = vec![SparseVector { entries: vec![(7, 1.0)] }];
        let err = CorpusIndex::from_parts(venues, model, rows, vec![vec![0.0; 4]], "x", 4);
        assert!(matches!(err, Err(Error::Data(_))));
    }
}
