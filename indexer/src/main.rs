use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use kopi_core::classify::Segmenter;
use kopi_core::dataset::load_reviews;
use kopi_core::persist::{load_context, load_index, save_index, IndexPaths, MetaFile};
use kopi_core::embed::from_config;
use kopi_core::{
    CorpusBuilder, EmbeddingBackend, EngineConfig, Query, ReviewRecord, ScoringMode,
    SegmentKeywords, TextCleaner,
};
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "kopi-indexer")]
#[command(about = "Build and query the coffee-shop recommendation index", long_about = None)]
struct Cli {
    /// Engine configuration (JSON); missing fields take defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Override embedding.backend: hash | fastembed
    #[arg(long, global = true)]
    embedder: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index from a review CSV file or a directory of them
    Build {
        /// Input path (file or directory)
        #[arg(long)]
        input: String,
        /// Output index directory
        #[arg(long)]
        output: String,
        /// Override lexical.max_features
        #[arg(long)]
        max_features: Option<usize>,
        /// Override embedding.dimension
        #[arg(long)]
        dimension: Option<usize>,
    },
    /// Print index metadata and the first venues
    Inspect {
        #[arg(long)]
        index: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Rank venues for a free-text need
    Query {
        #[arg(long)]
        index: String,
        #[arg(long, default_value = "")]
        q: String,
        #[arg(long)]
        segment: Option<String>,
        #[arg(long)]
        location: Option<String>,
        #[arg(long)]
        k: Option<usize>,
        /// fractional | binary
        #[arg(long)]
        mode: Option<String>,
        /// Segment keyword table (JSON) replacing the built-in one
        #[arg(long)]
        segments: Option<PathBuf>,
    },
    /// Assign a questionnaire profile to a customer segment
    Classify {
        /// Directory holding kmodes_model.json and category_mappings.json
        #[arg(long)]
        models: String,
        /// One answer per field, as "field=label"
        #[arg(long = "answer", value_parser = parse_answer)]
        answers: Vec<(String, String)>,
    },
}

fn parse_answer(raw: &str) -> std::result::Result<(String, String), String> {
    let (field, label) =
        raw.split_once('=').ok_or_else(|| format!("expected field=label, got `{raw}`"))?;
    Ok((field.trim().to_string(), label.trim().to_string()))
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_json_file(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(backend) = &cli.embedder {
        config.embedding.backend = backend.parse::<EmbeddingBackend>()?;
    }

    match cli.command {
        Commands::Build { input, output, max_features, dimension } => {
            let mut config = config;
            if let Some(m) = max_features { config.lexical.max_features = m; }
            if let Some(d) = dimension { config.embedding.dimension = d; }
            config.validate()?;
            build_index(&input, &output, config)
        }
        Commands::Inspect { index, limit } => inspect(&index, limit),
        Commands::Query { index, q, segment, location, k, mode, segments } => {
            let mut query = Query::new(q)
                .weights(config.weights)
                .top_k(k.unwrap_or(config.top_k.0))
                .mode(config.scoring_mode);
            if let Some(s) = segment { query = query.segment(s); }
            if let Some(l) = location { query = query.location(l); }
            if let Some(m) = mode { query = query.mode(m.parse::<ScoringMode>()?); }
            run_query(&index, &config, &query, segments.as_deref())
        }
        Commands::Classify { models, answers } => classify(&models, answers),
    }
}

fn collect_inputs(input_path: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input_path.is_dir() {
        let entries = WalkDir::new(input_path).sort_by_file_name().into_iter();
        for entry in entries.filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() && p.extension().and_then(|s| s.to_str()) == Some("csv") {
                files.push(p.to_path_buf());
            }
        }
    } else if input_path.is_file() {
        files.push(input_path.to_path_buf());
    }
    files
}

fn build_index(input: &str, output: &str, config: EngineConfig) -> Result<()> {
    let files = collect_inputs(Path::new(input));
    if files.is_empty() {
        bail!("no review files found at {input}");
    }
    let mut records: Vec<ReviewRecord> = Vec::new();
    for file in &files {
        let rows = load_reviews(file).with_context(|| format!("reading {}", file.display()))?;
        tracing::info!(file = %file.display(), rows = rows.len(), "loaded reviews");
        records.extend(rows);
    }

    let cleaner = TextCleaner::new();
    let embedder = from_config(&config.embedding)?;
    let index =
        CorpusBuilder::new(&cleaner, embedder.as_ref()).with_config(config).build(records)?;

    let out_paths = IndexPaths::new(output);
    let created_at = time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default();
    let meta = MetaFile::describe(&index, created_at);
    save_index(&out_paths, &index, &meta)?;

    tracing::info!(
        output,
        venues = meta.num_venues,
        vocabulary = meta.vocabulary_size,
        embedder = %meta.embedder_id,
        "index build complete"
    );
    Ok(())
}

fn inspect(index: &str, limit: usize) -> Result<()> {
    let (index, meta) = load_index(&IndexPaths::new(index))?;
    println!("{}", serde_json::to_string_pretty(&meta)?);
    for v in index.venues().iter().take(limit) {
        println!(
            "{:<40} {:>4.2}  {:<20} {} words",
            v.name,
            v.rating,
            v.area.as_deref().unwrap_or("-"),
            v.aggregated_text.split_whitespace().count()
        );
    }
    Ok(())
}

fn run_query(
    index: &str,
    config: &EngineConfig,
    query: &Query,
    segments: Option<&Path>,
) -> Result<()> {
    let segments = match segments {
        Some(p) => SegmentKeywords::from_json_file(p)?,
        None => SegmentKeywords::default(),
    };
    let embedder = from_config(&config.embedding)?;
    let ctx = load_context(&IndexPaths::new(index), embedder, segments)?;
    let results = ctx.recommend(query)?;
    if results.is_empty() {
        println!("no coffee shop matches");
        return Ok(());
    }
    for (rank, r) in results.iter().enumerate() {
        println!(
            "#{:<2} {:<40} {:.4}  rating {:.2}  {}",
            rank + 1,
            r.name,
            r.score,
            r.rating,
            r.area.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

fn classify(models: &str, answers: Vec<(String, String)>) -> Result<()> {
    let segmenter = Segmenter::load(models)?;
    if answers.is_empty() {
        for field in segmenter.categories().fields() {
            println!("{}", field.name());
            for (code, label) in field.labels().iter().enumerate() {
                println!("  {code}. {label}");
            }
        }
        return Ok(());
    }
    let answers: HashMap<String, String> = answers.into_iter().collect();
    let c = segmenter.classify(&answers)?;
    println!("{}", serde_json::to_string_pretty(&c)?);
    Ok(())
}
