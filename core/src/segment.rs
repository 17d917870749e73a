//! Segment keyword table and keyword affinity.

use crate::config::ScoringMode;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Guards the fractional affinity denominator.
pub const EPSILON: f32 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentEntry {
    pub name: String,
    pub keywords: Vec<String>,
}

/// Named customer segments, each with an ordered keyword list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentKeywords {
    segments: Vec<SegmentEntry>,
}

fn entry(name: &str, keywords: &[&str]) -> SegmentEntry {
    SegmentEntry {
        name: name.to_string(),
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
    }
}

impl Default for SegmentKeywords {
    fn default() -> Self {
        Self {
            segments: vec![
                entry(
                    "Instagrammable & Aesthetic",
                    &[
                        "estetik", "foto", "instagramable", "bagus", "view", "cantik", "interior",
                        "desain", "aesthetic",
                    ],
                ),
                entry(
                    "Casual Coffee Drinker (Lokal)",
                    &["kopi susu", "enak", "mantap", "kursi kayu", "lokal", "rasa", "kopi"],
                ),
                entry(
                    "Premium Coffee Enthusiast",
                    &[
                        "latte", "cappuccino", "espresso", "premium", "barista", "specialty",
                        "sofa", "relax",
                    ],
                ),
                entry(
                    "Productive Work / Study",
                    &[
                        "wifi", "nugas", "kerja", "colokan", "laptop", "tenang", "kondusif",
                        "meja luas",
                    ],
                ),
            ],
        }
    }
}

impl SegmentKeywords {
    pub fn new(segments: Vec<SegmentEntry>) -> Result<Self> {
        let mut seen = std::collections::HashSet::new();
        for s in &segments {
            if !seen.insert(s.name.as_str()) {
                return Err(Error::config(format!("duplicate segment `{}`", s.name)));
            }
        }
        Ok(Self { segments })
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let segments: Vec<SegmentEntry> = serde_json::from_str(&text)?;
        Self::new(segments)
    }

    /// Keywords for `segment`; unknown or absent segments have none.
    pub fn keywords(&self, segment: Option<&str>) -> &[String] {
        segment
            .and_then(|name| self.segments.iter().find(|s| s.name == name))
            .map(|s| s.keywords.as_slice())
            .unwrap_or(&[])
    }

    pub fn contains(&self, segment: &str) -> bool {
        self.segments.iter().any(|s| s.name == segment)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SegmentEntry> {
        self.segments.iter()
    }
}

/// How well `text` matches a keyword set, in `[0, 1]`.
///
/// Keywords are matched as plain substrings of the cleaned venue text.
pub fn affinity(text: &str, keywords: &[String], mode: ScoringMode) -> f32 {
    if keywords.is_empty() {
        return 0.0;
    }
    match mode {
        ScoringMode::Fractional => {
            let hits = keywords.iter().filter(|k| text.contains(k.as_str())).count();
            hits as f32 / (keywords.len() as f32 + EPSILON)
        }
        ScoringMode::Binary => {
            if keywords.iter().any(|k| text.contains(k.as_str())) { 1.0 } else { 0.0 }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORK: &str = "Productive Work / Study";

    #[test]
    fn fractional_counts_matches() {
        let table = SegmentKeywords::default();
        let kw = table.keywords(Some(WORK));
        assert_eq!(kw.len(), 8);
        let three = affinity("wifi kencang tenang laptop", kw, ScoringMode::Fractional);
        let one = affinity("wifi saja", kw, ScoringMode::Fractional);
        assert!((three - 3.0 / 8.0).abs() < 1e-6);
        assert!(three > one);
        assert_eq!(affinity("kopi susu", kw, ScoringMode::Fractional), 0.0);
    }

    #[test]
    fn all_keywords_score_about_one() {
        let table = SegmentKeywords::default();
        let kw = table.keywords(Some(WORK));
        let text = kw.join(" ");
        let a = affinity(&text, kw, ScoringMode::Fractional);
        assert!(a <= 1.0 && (a - 1.0).abs() < 1e-6);
        assert_eq!(affinity(&text, kw, ScoringMode::Binary), 1.0);
    }

    #[test]
    fn unknown_segment_has_no_keywords() {
        let table = SegmentKeywords::default();
        assert!(table.keywords(Some("Unicorn Lovers")).is_empty());
        assert!(table.keywords(None).is_empty());
        let none = table.keywords(Some("Unicorn Lovers"));
        assert_eq!(affinity("wifi", none, ScoringMode::Binary), 0.0);
    }

    #[test]
    fn duplicate_names_rejected() {
        let dup = vec![entry("a", &["x"]), entry("a", &["y"])];
        assert!(SegmentKeywords::new(dup).is_err());
    }
}
