use crate::tokenizer::Preprocessor;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One raw review row as read from the dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub name: Option<String>,
    pub review_text: Option<String>,
    pub rating: Option<f32>,
    pub area: Option<String>,
    pub address: Option<String>,
}

/// An establishment with all of its cleaned reviews joined into one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Venue {
    pub name: String,
    pub aggregated_text: String,
    pub rating: f32,
    pub area: Option<String>,
    pub address: Option<String>,
}

impl Venue {
    pub fn new(name: impl Into<String>, aggregated_text: impl Into<String>, rating: f32) -> Self {
        Self {
            name: name.into(),
            aggregated_text: aggregated_text.into(),
            rating,
            area: None,
            address: None,
        }
    }

    pub fn with_area(mut self, area: impl Into<String>) -> Self {
        self.area = Some(area.into());
        self
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Case-insensitive substring match on `area`; a missing area never matches.
    pub fn area_matches(&self, filter_lower: &str) -> bool {
        self.area.as_deref().is_some_and(|a| a.to_lowercase().contains(filter_lower))
    }
}

struct Accumulator {
    texts: Vec<String>,
    rating_sum: f32,
    rating_count: u32,
    area: Option<String>,
    address: Option<String>,
}

fn present(field: Option<String>) -> Option<String> {
    field.filter(|s| !s.trim().is_empty())
}

/// Group review rows into venues, ordered by name.
///
/// The name order is the venue table order, so it also breaks ranking ties.
/// Rows without a name or without review text are dropped. Text is cleaned before it is
/// joined. Ratings are averaged over the rows that carry one; area and address keep the
/// first non-empty value seen.
pub fn aggregate_reviews<I>(records: I, preprocessor: &dyn Preprocessor) -> Vec<Venue>
where
    I: IntoIterator<Item = ReviewRecord>,
{
    let mut groups: BTreeMap<String, Accumulator> = BTreeMap::new();
    let mut dropped = 0usize;

    for rec in records {
        let (Some(name), Some(text)) = (present(rec.name), present(rec.review_text)) else {
            dropped += 1;
            continue;
        };
        let name = name.trim().to_string();
        let acc = groups.entry(name).or_insert_with(|| Accumulator {
            texts: Vec::new(),
            rating_sum: 0.0,
            rating_count: 0,
            area: None,
            address: None,
        });
        acc.texts.push(preprocessor.preprocess(&text));
        if let Some(r) = rec.rating.filter(|r| r.is_finite()) {
            acc.rating_sum += r;
            acc.rating_count += 1;
        }
        if acc.area.is_none() {
            acc.area = present(rec.area);
        }
        if acc.address.is_none() {
            acc.address = present(rec.address);
        }
    }
    if dropped > 0 {
        tracing::debug!(dropped, "dropped review rows missing name or text");
    }

    groups
        .into_iter()
        .map(|(name, acc)| {
            let rating = if acc.rating_count > 0 {
                acc.rating_sum / acc.rating_count as f32
            } else {
                0.0
            };
            Venue {
                name,
                aggregated_text: acc.texts.join(" "),
                rating,
                area: acc.area,
                address: acc.address,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::IdentityPreprocessor;

    fn rec(
        name: Option<&str>,
        text: Option<&str>,
        rating: Option<f32>,
        area: Option<&str>,
    ) -> ReviewRecord {
        ReviewRecord {
            name: name.map(String::from),
            review_text: text.map(String::from),
            rating,
            area: area.map(String::from),
            address: None,
        }
    }

    #[test]
    fn groups_by_name_in_name_order() {
        let rows = vec![
            rec(Some("B"), Some("kopi"), Some(3.0), None),
            rec(Some("A"), Some("wifi"), Some(4.0), Some("Tugu")),
            rec(Some("B"), Some("susu"), Some(5.0), Some("Malioboro")),
            rec(None, Some("orphan"), Some(1.0), None),
            rec(Some("C"), None, Some(1.0), None),
            rec(Some("A"), Some("  "), Some(1.0), None),
        ];
        let venues = aggregate_reviews(rows, &IdentityPreprocessor);
        assert_eq!(venues.len(), 2);
        assert_eq!(venues[0].name, "A");
        assert_eq!(venues[0].rating, 4.0);
        assert_eq!(venues[0].area.as_deref(), Some("Tugu"));
        assert_eq!(venues[1].name, "B");
        assert_eq!(venues[1].aggregated_text, "kopi susu");
        assert_eq!(venues[1].rating, 4.0);
        assert_eq!(venues[1].area.as_deref(), Some("Malioboro"));
    }

    #[test]
    fn area_match_is_case_insensitive_and_null_safe() {
        let v = Venue::new("A", "", 1.0).with_area("Tugu Jogja");
        assert!(v.area_matches("tugu"));
        assert!(!v.area_matches("gejayan"));
        assert!(!Venue::new("B", "", 1.0).area_matches("tugu"));
    }
}
