//! TF-IDF weighting over unigrams and bigrams with a bounded vocabulary.

use crate::config::LexicalConfig;
use crate::error::{Error, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type TermId = u32;

lazy_static! {
    static ref TOKEN_RE: Regex = Regex::new(r"(?u)\b\w\w+\b").expect("valid regex");
}

/// Sparse weight vector, entries sorted by term id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    pub entries: Vec<(TermId, f32)>,
}

impl SparseVector {
    /// Build from unsorted `(term, weight)` pairs and L2-normalise.
    pub fn normalized(mut entries: Vec<(TermId, f32)>) -> Self {
        entries.sort_by_key(|(t, _)| *t);
        let norm = entries.iter().map(|(_, w)| w * w).sum::<f32>().sqrt();
        if norm > 0.0 {
            for (_, w) in entries.iter_mut() { *w /= norm; }
        }
        Self { entries }
    }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn dot(&self, other: &SparseVector) -> f32 {
        let (mut i, mut j, mut acc) = (0, 0, 0.0f32);
        while i < self.entries.len() && j < other.entries.len() {
            let (ta, wa) = self.entries[i];
            let (tb, wb) = other.entries[j];
            match ta.cmp(&tb) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    acc += wa * wb;
                    i += 1;
                    j += 1;
                }
            }
        }
        acc
    }

    pub fn norm(&self) -> f32 {
        self.entries.iter().map(|(_, w)| w * w).sum::<f32>().sqrt()
    }

    /// Cosine similarity; zero when either side is the zero vector.
    pub fn cosine(&self, other: &SparseVector) -> f32 {
        let denom = self.norm() * other.norm();
        if denom == 0.0 { 0.0 } else { self.dot(other) / denom }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TfidfModel {
    pub vocabulary: HashMap<String, TermId>,
    pub idf: Vec<f32>,
    pub ngram_max: usize,
}

/// Lowercased word tokens followed by every n-gram up to `ngram_max`.
pub fn analyze(text: &str, ngram_max: usize) -> Vec<String> {
    let lowered = text.to_lowercase();
    let words: Vec<&str> = TOKEN_RE.find_iter(&lowered).map(|m| m.as_str()).collect();
    let mut out: Vec<String> = words.iter().map(|w| w.to_string()).collect();
    for n in 2..=ngram_max.max(1) {
        out.extend(words.windows(n).map(|w| w.join(" ")));
    }
    out
}

fn term_counts(text: &str, ngram_max: usize) -> HashMap<String, u32> {
    let mut counts = HashMap::new();
    for term in analyze(text, ngram_max) {
        *counts.entry(term).or_insert(0) += 1;
    }
    counts
}

impl TfidfModel {
    /// Fit on `documents` and return the model with one weight row per document.
    ///
    /// The vocabulary keeps the `max_features` most frequent terms across the corpus (ties
    /// by term order); ids are assigned in lexicographic order. idf is smoothed:
    /// `ln((1 + n) / (1 + df)) + 1`.
    pub fn fit_transform<S: AsRef<str>>(
        documents: &[S],
        cfg: &LexicalConfig,
    ) -> (Self, Vec<SparseVector>) {
        let per_doc: Vec<HashMap<String, u32>> =
            documents.iter().map(|d| term_counts(d.as_ref(), cfg.ngram_max)).collect();

        let mut corpus_tf: HashMap<&str, (u64, u32)> = HashMap::new();
        for counts in &per_doc {
            for (term, c) in counts {
                let e = corpus_tf.entry(term.as_str()).or_insert((0, 0));
                e.0 += u64::from(*c);
                e.1 += 1;
            }
        }

        let mut ranked: Vec<(&str, u64, u32)> =
            corpus_tf.into_iter().map(|(t, (tf, df))| (t, tf, df)).collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.truncate(cfg.max_features);
        ranked.sort_by(|a, b| a.0.cmp(b.0));

        let n = documents.len() as f32;
        let mut vocabulary = HashMap::with_capacity(ranked.len());
        let mut idf = Vec::with_capacity(ranked.len());
        for (tid, (term, _, df)) in ranked.into_iter().enumerate() {
            vocabulary.insert(term.to_string(), tid as TermId);
            idf.push(((1.0 + n) / (1.0 + df as f32)).ln() + 1.0);
        }

        let model = TfidfModel { vocabulary, idf, ngram_max: cfg.ngram_max };
        let rows = per_doc.iter().map(|counts| model.weigh(counts)).collect();
        tracing::debug!(
            terms = model.vocabulary.len(),
            docs = documents.len(),
            "fitted tf-idf model"
        );
        (model, rows)
    }

    fn weigh(&self, counts: &HashMap<String, u32>) -> SparseVector {
        let entries = counts
            .iter()
            .filter_map(|(term, c)| {
                let tid = *self.vocabulary.get(term)?;
                let idf = self.idf.get(tid as usize)?;
                Some((tid, *c as f32 * idf))
            })
            .collect();
        SparseVector::normalized(entries)
    }

    /// Project new text into the fitted space; unknown terms are ignored.
    pub fn transform(&self, text: &str) -> SparseVector {
        self.weigh(&term_counts(text, self.ngram_max))
    }

    pub fn vocabulary_size(&self) -> usize { self.vocabulary.len() }

    /// Every vocabulary id must address exactly one finite idf weight.
    pub fn validate(&self) -> Result<()> {
        if self.idf.len() != self.vocabulary.len() {
            return Err(Error::data(format!(
                "lexical model has {} terms but {} idf weights",
                self.vocabulary.len(),
                self.idf.len()
            )));
        }
        let mut used = vec![false; self.idf.len()];
        for (term, &tid) in &self.vocabulary {
            match used.get_mut(tid as usize) {
                Some(slot) if !*slot => *slot = true,
                Some(_) => return Err(Error::data(format!("term id {tid} is assigned twice"))),
                None => {
                    return Err(Error::data(format!("term `{term}` has out-of-range id {tid}")))
                }
            }
        }
        if let Some(bad) = self.idf.iter().position(|w| !w.is_finite()) {
            return Err(Error::data(format!("idf weight {bad} is not finite")));
        }
        Ok(())
    }

    /// Checks that a weight row only refers to terms of this model.
    pub fn check_row(&self, row: &SparseVector) -> Result<()> {
        for &(tid, w) in &row.entries {
            if tid as usize >= self.idf.len() {
                return Err(Error::data(format!("lexical row refers to unknown term id {tid}")));
            }
            if !w.is_finite() {
                return Err(Error::data(format!("lexical weight for term {tid} is not finite")));
            }
        }
        Ok(())
    }
}
