use crate::error::{Error, Result};
use crate::index::CorpusIndex;
use serde::{Deserialize, Serialize};
use std::fs::{create_dir_all, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaFile {
    pub num_venues: usize,
    pub vocabulary_size: usize,
    pub embedder_id: String,
    pub dimension: usize,
    pub created_at: String,
    pub version: u32,
}

impl MetaFile {
    pub fn describe(index: &CorpusIndex, created_at: impl Into<String>) -> Self {
        Self {
            num_venues: index.len(),
            vocabulary_size: index.lexical_model().vocabulary_size(),
            embedder_id: index.embedder_id().to_string(),
            dimension: index.dimension(),
            created_at: created_at.into(),
            version: FORMAT_VERSION,
        }
    }
}

pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    fn index(&self) -> PathBuf { self.root.join("index.bin") }
    fn meta(&self) -> PathBuf { self.root.join("meta.json") }

    pub fn exists(&self) -> bool { self.meta().is_file() && self.index().is_file() }
}

/// Write the index as one bincode blob plus a human-readable `meta.json`.
pub fn save_index(paths: &IndexPaths, index: &CorpusIndex, meta: &MetaFile) -> Result<()> {
    create_dir_all(&paths.root)?;
    let mut w = BufWriter::new(File::create(paths.index())?);
    bincode::serialize_into(&mut w, index)?;
    w.flush()?;
    save_meta(paths, meta)
}

pub fn load_index(paths: &IndexPaths) -> Result<(CorpusIndex, MetaFile)> {
    let meta = load_meta(paths)?;
    if meta.version != FORMAT_VERSION {
        return Err(Error::data(format!(
            "index format version {} is not supported (expected {FORMAT_VERSION})",
            meta.version
        )));
    }
    let index: CorpusIndex =
        bincode::deserialize_from(BufReader::new(File::open(paths.index())?))?;
    index.validate()?;
    if index.len() != meta.num_venues {
        return Err(Error::data(format!(
            "index holds {} venues, meta.json says {}",
            index.len(),
            meta.num_venues
        )));
    }
    Ok((index, meta))
}

pub fn save_meta(paths: &IndexPaths, meta: &MetaFile) -> Result<()> {
    create_dir_all(&paths.root)?;
    let mut f = File::create(paths.meta())?;
    let json = serde_json::to_string_pretty(meta)?;
    f.write_all(json.as_bytes())?;
    Ok(())
}

pub fn load_meta(paths: &IndexPaths) -> Result<MetaFile> {
    let mut f = File::open(paths.meta())?;
    let mut buf = String::new();
    f.read_to_string(&mut buf)?;
    let meta: MetaFile = serde_json::from_str(&buf)?;
    Ok(meta)
}

/// Load a persisted index into a query context, checking it was built by `embedder`.
pub fn load_context(
    paths: &IndexPaths,
    embedder: std::sync::Arc<dyn crate::embed::Embedder>,
    segments: crate::segment::SegmentKeywords,
) -> Result<crate::recommend::RecommendContext> {
    let (index, meta) = load_index(paths)?;
    tracing::info!(venues = meta.num_venues, created_at = %meta.created_at, "loaded corpus index");
    crate::recommend::RecommendContext::new(index, embedder, segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::HashEmbedder;
    use crate::index::CorpusBuilder;
    use crate::tokenizer::IdentityPreprocessor;
    use crate::venue::Venue;

    #[test]
    fn saved_index_loads_back_identically() {
        let dir = tempfile::tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        let e = HashEmbedder::new(16);
        let venues = vec![
            Venue::new("A", "wifi tenang", 4.5).with_area("Tugu"),
            Venue::new("B", "kopi susu", 3.0),
        ];
        let index = CorpusBuilder::new(&IdentityPreprocessor, &e).index_venues(venues).unwrap();
        let meta = MetaFile::describe(&index, "2024-01-01T00:00:00Z");
        save_index(&paths, &index, &meta).unwrap();
        assert!(paths.exists());

        let (loaded, loaded_meta) = load_index(&paths).unwrap();
        assert_eq!(loaded_meta, meta);
        assert_eq!(loaded.venues(), index.venues());
        assert_eq!(loaded.row(0).unwrap().embedding, index.row(0).unwrap().embedding);
    }

    #[test]
    fn missing_index_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(load_index(&IndexPaths::new(dir.path())), Err(Error::Io(_))));
    }
}
