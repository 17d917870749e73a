//! Customer segmentation: categorical answers → K-Modes cluster → named segment.
//!
//! Only prediction lives here. The model, category table and segment names are artifacts
//! produced elsewhere and loaded from JSON.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

pub const MODEL_FILE: &str = "kmodes_model.json";
pub const CATEGORIES_FILE: &str = "category_mappings.json";
pub const SEGMENTS_FILE: &str = "segments.json";

/// Canonical spelling for a questionnaire answer.
///
/// Trims, lowercases, turns `-` into spaces, collapses whitespace and title-cases, except
/// for a few answers whose deployed labels are spelled differently.
pub fn normalize_category(text: &str) -> String {
    let lowered = text.trim().to_lowercase().replace('-', " ");
    let collapsed = lowered.split_whitespace().collect::<Vec<_>>().join(" ");
    match collapsed.as_str() {
        "konten / foto foto" => "Konten / Foto - foto".to_string(),
        _ => title_case(&collapsed),
    }
}

fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if c.is_alphabetic() && !prev_alpha {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        prev_alpha = c.is_alphabetic();
    }
    out
}

/// Serialized form of a [`CategoryField`]: code → label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawField {
    pub name: String,
    pub codes: BTreeMap<u32, String>,
}

/// One categorical question with a total, bidirectional label ↔ code mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryField {
    name: String,
    labels: Vec<String>,
    codes: HashMap<String, u32>,
}

impl CategoryField {
    pub fn new<S: Into<String>>(
        name: impl Into<String>,
        labels: impl IntoIterator<Item = S>,
    ) -> Result<Self> {
        let codes = labels.into_iter().enumerate().map(|(i, l)| (i as u32, l.into())).collect();
        Self::try_from(RawField { name: name.into(), codes })
    }

    pub fn name(&self) -> &str { &self.name }

    pub fn labels(&self) -> &[String] { &self.labels }

    pub fn label(&self, code: u32) -> Option<&str> {
        self.labels.get(code as usize).map(String::as_str)
    }

    /// Exact label first, then the normalised spelling.
    pub fn code(&self, label: &str) -> Option<u32> {
        if let Some(c) = self.codes.get(label) {
            return Some(*c);
        }
        let wanted = normalize_category(label);
        self.labels.iter().position(|l| normalize_category(l) == wanted).map(|i| i as u32)
    }
}

impl TryFrom<RawField> for CategoryField {
    type Error = Error;

    fn try_from(raw: RawField) -> Result<Self> {
        let name = raw.name;
        if raw.codes.is_empty() {
            return Err(Error::config(format!("category `{name}` has no labels")));
        }
        let mut labels = Vec::with_capacity(raw.codes.len());
        let mut codes = HashMap::with_capacity(raw.codes.len());
        for (expected, (code, label)) in raw.codes.into_iter().enumerate() {
            let problem = if code as usize != expected {
                Some(format!("code {expected} has no label"))
            } else if label.trim().is_empty() {
                Some(format!("code {code} has an empty label"))
            } else if codes.insert(label.clone(), code).is_some() {
                Some(format!("label `{label}` maps to several codes"))
            } else {
                None
            };
            if let Some(problem) = problem {
                return Err(Error::config(format!("category `{name}`: {problem}")));
            }
            labels.push(label);
        }
        Ok(Self { name, labels, codes })
    }
}

impl From<CategoryField> for RawField {
    fn from(f: CategoryField) -> Self {
        let codes = f.labels.into_iter().enumerate().map(|(i, l)| (i as u32, l)).collect();
        RawField { name: f.name, codes }
    }
}

/// Categorical fields in the feature order the clustering model was fitted with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<RawField>", into = "Vec<RawField>")]
pub struct CategoryTable {
    fields: Vec<CategoryField>,
}

impl TryFrom<Vec<RawField>> for CategoryTable {
    type Error = Error;

    fn try_from(raw: Vec<RawField>) -> Result<Self> {
        let fields = raw.into_iter().map(CategoryField::try_from).collect::<Result<Vec<_>>>()?;
        Self::new(fields)
    }
}

impl From<CategoryTable> for Vec<RawField> {
    fn from(t: CategoryTable) -> Self {
        t.fields.into_iter().map(RawField::from).collect()
    }
}

impl CategoryTable {
    pub fn new(fields: Vec<CategoryField>) -> Result<Self> {
        if fields.is_empty() {
            return Err(Error::config("category table has no fields"));
        }
        for (i, f) in fields.iter().enumerate() {
            if fields[..i].iter().any(|g| g.name == f.name) {
                return Err(Error::config(format!("duplicate category field `{}`", f.name)));
            }
        }
        Ok(Self { fields })
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn fields(&self) -> &[CategoryField] { &self.fields }

    pub fn len(&self) -> usize { self.fields.len() }

    pub fn is_empty(&self) -> bool { self.fields.is_empty() }

    /// Encode labelled answers into codes, in field order.
    pub fn encode(&self, answers: &HashMap<String, String>) -> Result<Vec<u32>> {
        self.fields
            .iter()
            .map(|f| {
                let label = answers
                    .get(&f.name)
                    .ok_or_else(|| Error::config(format!("missing answer for `{}`", f.name)))?;
                f.code(label).ok_or_else(|| {
                    Error::config(format!("`{label}` is not an option for `{}`", f.name))
                })
            })
            .collect()
    }
}

/// Fitted K-Modes centroids; each centroid holds one category code per field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KModesModel {
    pub centroids: Vec<Vec<u32>>,
}

impl KModesModel {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn n_features(&self) -> usize {
        self.centroids.first().map_or(0, Vec::len)
    }

    /// Nearest centroid by Hamming distance; ties go to the lowest cluster id.
    pub fn predict(&self, codes: &[u32]) -> Result<usize> {
        if self.centroids.is_empty() {
            return Err(Error::config("clustering model has no centroids"));
        }
        if codes.len() != self.n_features() {
            return Err(Error::config(format!(
                "expected {} features, got {}",
                self.n_features(),
                codes.len()
            )));
        }
        let mut best = (0usize, usize::MAX);
        for (cluster, centroid) in self.centroids.iter().enumerate() {
            let d = centroid.iter().zip(codes).filter(|(a, b)| a != b).count();
            if d < best.1 {
                best = (cluster, d);
            }
        }
        Ok(best.0)
    }

    fn validate(&self, categories: &CategoryTable) -> Result<()> {
        for (cluster, centroid) in self.centroids.iter().enumerate() {
            if centroid.len() != categories.len() {
                return Err(Error::config(format!(
                    "centroid {cluster} has {} features, category table has {}",
                    centroid.len(),
                    categories.len()
                )));
            }
            for (code, field) in centroid.iter().zip(categories.fields()) {
                if field.label(*code).is_none() {
                    return Err(Error::config(format!(
                        "centroid {cluster}: code {code} unknown for `{}`",
                        field.name
                    )));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentInfo {
    pub cluster: usize,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Static cluster id → segment table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentMap {
    entries: Vec<SegmentInfo>,
}

impl Default for SegmentMap {
    fn default() -> Self {
        let info = |cluster, name: &str, description: &str| SegmentInfo {
            cluster,
            name: name.into(),
            description: description.into(),
        };
        Self {
            entries: vec![
                info(
                    0,
                    "Instagrammable & Aesthetic",
                    "Prefers coffee shops with a striking, photogenic interior.",
                ),
                info(
                    1,
                    "Casual Coffee Drinker (Lokal)",
                    "Enjoys a relaxed atmosphere and approachable local coffee.",
                ),
                info(
                    2,
                    "Premium Coffee Enthusiast",
                    "Puts bean quality and the tasting experience first.",
                ),
                info(
                    3,
                    "Productive Work / Study",
                    "Needs a comfortable place to focus on work or study.",
                ),
            ],
        }
    }
}

impl SegmentMap {
    pub fn new(entries: Vec<SegmentInfo>) -> Self { Self { entries } }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn get(&self, cluster: usize) -> Option<&SegmentInfo> {
        self.entries.iter().find(|e| e.cluster == cluster)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub cluster: usize,
    pub segment: String,
    pub description: String,
}

/// Categorical profile classifier.
#[derive(Debug, Clone)]
pub struct Segmenter {
    categories: CategoryTable,
    model: KModesModel,
    segments: SegmentMap,
}

impl Segmenter {
    pub fn new(
        categories: CategoryTable,
        model: KModesModel,
        segments: SegmentMap,
    ) -> Result<Self> {
        model.validate(&categories)?;
        for cluster in 0..model.centroids.len() {
            if segments.get(cluster).is_none() {
                return Err(Error::config(format!("no segment named for cluster {cluster}")));
            }
        }
        Ok(Self { categories, model, segments })
    }

    /// Load the artifacts from `dir`; `segments.json` is optional.
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let categories = CategoryTable::from_json_file(dir.join(CATEGORIES_FILE))?;
        let model = KModesModel::from_json_file(dir.join(MODEL_FILE))?;
        let seg_path = dir.join(SEGMENTS_FILE);
        let segments = if seg_path.exists() {
            SegmentMap::from_json_file(seg_path)?
        } else {
            SegmentMap::default()
        };
        tracing::info!(
            fields = categories.len(),
            clusters = model.centroids.len(),
            "loaded segmentation artifacts"
        );
        Self::new(categories, model, segments)
    }

    pub fn categories(&self) -> &CategoryTable { &self.categories }

    pub fn predict_cluster(&self, codes: &[u32]) -> Result<usize> {
        self.model.predict(codes)
    }

    pub fn classify(&self, answers: &HashMap<String, String>) -> Result<Classification> {
        let codes = self.categories.encode(answers)?;
        let cluster = self.predict_cluster(&codes)?;
        let info = self
            .segments
            .get(cluster)
            .ok_or_else(|| Error::config(format!("no segment for cluster {cluster}")))?;
        Ok(Classification {
            cluster,
            segment: info.name.clone(),
            description: info.description.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> CategoryTable {
        CategoryTable::new(vec![
            CategoryField::new("purpose", ["Konten / Foto - foto", "Nongkrong", "Nugas / Kerja"])
                .unwrap(),
            CategoryField::new("drink", ["Kopi Susu", "Manual Brew"]).unwrap(),
        ])
        .unwrap()
    }

    #[test]
    fn normalizes_answers() {
        assert_eq!(normalize_category("  kopi   susu "), "Kopi Susu");
        assert_eq!(normalize_category("Konten / Foto-Foto"), "Konten / Foto - foto");
        assert_eq!(normalize_category("nugas / kerja"), "Nugas / Kerja");
    }

    #[test]
    fn category_field_round_trips_label_and_code() {
        let t = table();
        for f in t.fields() {
            for (i, l) in f.labels().iter().enumerate() {
                assert_eq!(f.code(l), Some(i as u32));
                assert_eq!(f.label(i as u32), Some(l.as_str()));
            }
        }
        assert_eq!(t.fields()[1].code("kopi susu"), Some(0));
    }

    #[test]
    fn incomplete_mapping_is_rejected() {
        let json = r#"[{"name": "drink", "codes": {"0": "Kopi", "2": "Teh"}}]"#;
        let gap: Vec<RawField> = serde_json::from_str(json).unwrap();
        assert!(CategoryTable::try_from(gap).is_err());
        assert!(CategoryField::new("drink", ["Kopi", "Kopi"]).is_err());
    }

    #[test]
    fn json_round_trip_preserves_field_order() {
        let t = table();
        let json = serde_json::to_string(&t).unwrap();
        let back: CategoryTable = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn predicts_nearest_centroid_with_low_id_tie_break() {
        let m = KModesModel { centroids: vec![vec![0, 0], vec![2, 1], vec![2, 0]] };
        assert_eq!(m.predict(&[2, 1]).unwrap(), 1);
        assert_eq!(m.predict(&[1, 1]).unwrap(), 1);
        assert_eq!(m.predict(&[1, 0]).unwrap(), 0);
        assert!(m.predict(&[1]).unwrap_err().is_config());
    }

    #[test]
    fn classifies_answers_into_named_segment() {
        let model = KModesModel { centroids: vec![vec![0, 0], vec![1, 0], vec![0, 1], vec![2, 1]] };
        let seg = Segmenter::new(table(), model, SegmentMap::default()).unwrap();
        let answers: HashMap<String, String> = [
            ("purpose".to_string(), "nugas / kerja".to_string()),
            ("drink".to_string(), "Manual Brew".to_string()),
        ]
        .into();
        let c = seg.classify(&answers).unwrap();
        assert_eq!(c.cluster, 3);
        assert_eq!(c.segment, "Productive Work / Study");

        let bad: HashMap<String, String> =
            [("purpose".to_string(), "Nongkrong".to_string())].into();
        assert!(seg.classify(&bad).unwrap_err().is_config());
    }
}
