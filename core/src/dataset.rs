//! Loading the raw review dataset: `;`-delimited text with a header row.

use crate::error::{Error, Result};
use crate::venue::ReviewRecord;
use std::io::Read;
use std::path::Path;

const REQUIRED: [&str; 5] = ["name", "review_text", "rating", "area", "address"];

struct Columns {
    name: usize,
    review_text: usize,
    rating: usize,
    area: usize,
    address: usize,
}

impl Columns {
    fn locate(headers: &csv::StringRecord) -> Result<Self> {
        let find = |col: &str| {
            headers.iter().position(|h| h.trim() == col).ok_or_else(|| {
                let have: Vec<&str> = headers.iter().collect();
                Error::data(format!("missing column `{col}` (have: {have:?})"))
            })
        };
        Ok(Self {
            name: find(REQUIRED[0])?,
            review_text: find(REQUIRED[1])?,
            rating: find(REQUIRED[2])?,
            area: find(REQUIRED[3])?,
            address: find(REQUIRED[4])?,
        })
    }
}

fn cell(row: &csv::StringRecord, idx: usize) -> Option<String> {
    row.get(idx).map(str::trim).filter(|s| !s.is_empty()).map(String::from)
}

/// Accepts `4.5` as well as the comma-decimal `4,5`.
pub fn parse_rating(raw: &str) -> Option<f32> {
    raw.trim().replace(',', ".").parse::<f32>().ok().filter(|r| r.is_finite())
}

pub fn read_reviews<R: Read>(reader: R) -> Result<Vec<ReviewRecord>> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b';')
        .quote(b'"')
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);
    let cols = Columns::locate(rdr.headers()?)?;

    let mut out = Vec::new();
    let mut skipped = 0usize;
    for (line, row) in rdr.records().enumerate() {
        let row = match row {
            Ok(r) => r,
            Err(e) => {
                skipped += 1;
                tracing::warn!(line = line + 2, error = %e, "skipping malformed review row");
                continue;
            }
        };
        out.push(ReviewRecord {
            name: cell(&row, cols.name),
            review_text: cell(&row, cols.review_text),
            rating: row.get(cols.rating).and_then(parse_rating),
            area: cell(&row, cols.area),
            address: cell(&row, cols.address),
        });
    }
    tracing::info!(rows = out.len(), skipped, "read review rows");
    Ok(out)
}

pub fn load_reviews<P: AsRef<Path>>(path: P) -> Result<Vec<ReviewRecord>> {
    let file = std::fs::File::open(path.as_ref())?;
    read_reviews(std::io::BufReader::new(file))
}
