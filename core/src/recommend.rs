//! Hybrid recommender: fuses semantic, lexical, rating and segment signals into a ranking.

use crate::config::{ScoringMode, Weights};
use crate::embed::{cosine_similarity, Embedder};
use crate::error::{Error, Result};
use crate::index::{CorpusIndex, Row};
use crate::segment::{affinity, SegmentKeywords, EPSILON};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Everything a query needs, built once and shared read-only between requests.
#[derive(Clone)]
pub struct RecommendContext {
    pub index: Arc<CorpusIndex>,
    pub embedder: Arc<dyn Embedder>,
    pub segments: Arc<SegmentKeywords>,
}

impl RecommendContext {
    pub fn new(
        index: CorpusIndex,
        embedder: Arc<dyn Embedder>,
        segments: SegmentKeywords,
    ) -> Result<Self> {
        index.check_embedder(embedder.as_ref())?;
        Ok(Self { index: Arc::new(index), embedder, segments: Arc::new(segments) })
    }

    pub fn recommend(&self, query: &Query) -> Result<Vec<Recommendation>> {
        recommend(self, query)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    pub segment: Option<String>,
    pub location: Option<String>,
    pub weights: Weights,
    pub top_k: usize,
    pub mode: ScoringMode,
}

impl Default for Query {
    fn default() -> Self {
        Self {
            text: String::new(),
            segment: None,
            location: None,
            weights: Weights::default(),
            top_k: 5,
            mode: ScoringMode::default(),
        }
    }
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), ..Self::default() }
    }

    pub fn segment(mut self, segment: impl Into<String>) -> Self {
        self.segment = Some(segment.into());
        self
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn weights(mut self, weights: Weights) -> Self {
        self.weights = weights;
        self
    }

    pub fn top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn mode(mut self, mode: ScoringMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(Error::config("top_k must be positive"));
        }
        self.weights.validate()
    }

    fn location_filter(&self) -> Option<String> {
        self.location
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_lowercase)
    }
}

/// The four per-venue signals before weighting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Signals {
    pub semantic: f32,
    pub lexical: f32,
    pub rating: f32,
    pub segment: f32,
}

impl Signals {
    pub fn combine(&self, w: &Weights) -> f32 {
        w.semantic * self.semantic
            + w.lexical * self.lexical
            + w.rating * self.rating
            + w.segment * self.segment
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub name: String,
    pub area: Option<String>,
    pub address: Option<String>,
    pub rating: f32,
    pub score: f32,
    pub signals: Signals,
}

/// Rank venues for `query`.
///
/// A location filter that matches nothing and an unknown segment are ordinary outcomes:
/// the first yields an empty list, the second a zero segment signal.
pub fn recommend(ctx: &RecommendContext, query: &Query) -> Result<Vec<Recommendation>> {
    query.validate()?;
    let index = ctx.index.as_ref();
    if index.is_empty() {
        return Err(Error::data("corpus index is empty"));
    }

    let rows: Vec<Row<'_>> = match query.location_filter() {
        Some(filter) => index.rows().filter(|r| r.venue.area_matches(&filter)).collect(),
        None => index.rows().collect(),
    };
    if rows.is_empty() {
        tracing::debug!(location = ?query.location, "location filter matched no venues");
        return Ok(Vec::new());
    }

    let signals = score_rows(ctx, &rows, query)?;
    let mut scored: Vec<(Row<'_>, Signals, f32)> = rows
        .into_iter()
        .zip(signals)
        .map(|(row, s)| {
            let score = s.combine(&query.weights);
            (row, s, score)
        })
        .collect();
    // stable: equal scores keep table order
    scored.sort_by(|a, b| b.2.total_cmp(&a.2));
    scored.truncate(query.top_k);

    Ok(scored
        .into_iter()
        .map(|(row, signals, score)| Recommendation {
            name: row.venue.name.clone(),
            area: row.venue.area.clone(),
            address: row.venue.address.clone(),
            rating: row.venue.rating,
            score,
            signals,
        })
        .collect())
}

/// Per-row signals, in the same order as `rows`.
pub fn score_rows(
    ctx: &RecommendContext,
    rows: &[Row<'_>],
    query: &Query,
) -> Result<Vec<Signals>> {
    let text = query.text.trim();
    let (semantic, lexical) = if text.is_empty() {
        (vec![0.0; rows.len()], vec![0.0; rows.len()])
    } else {
        let q_emb = ctx.embedder.embed(text)?;
        let q_lex = ctx.index.lexical_model().transform(text);
        (
            rows.iter().map(|r| cosine_similarity(&q_emb, r.embedding)).collect(),
            rows.iter().map(|r| q_lex.cosine(r.lexical)).collect(),
        )
    };
    let ratings = normalize_ratings(rows.iter().map(|r| r.venue.rating));
    let keywords = ctx.segments.keywords(query.segment.as_deref());

    Ok(rows
        .iter()
        .enumerate()
        .map(|(i, r)| Signals {
            semantic: semantic[i],
            lexical: lexical[i],
            rating: ratings[i],
            segment: affinity(&r.venue.aggregated_text, keywords, query.mode),
        })
        .collect())
}

/// Min-max normalise over the given set: `(r - min) / (max - min + ε)`.
pub fn normalize_ratings<I: IntoIterator<Item = f32>>(ratings: I) -> Vec<f32> {
    let ratings: Vec<f32> = ratings.into_iter().collect();
    let min = ratings.iter().copied().fold(f32::INFINITY, f32::min);
    let max = ratings.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    ratings.iter().map(|r| (r - min) / (max - min + EPSILON)).collect()
}
