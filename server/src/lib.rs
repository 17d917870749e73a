use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use kopi_core::classify::{Classification, Segmenter};
use kopi_core::dataset::load_reviews;
use kopi_core::persist::{load_context, save_index, IndexPaths, MetaFile};
use kopi_core::embed::from_config;
use kopi_core::{
    CorpusBuilder, EngineConfig, Recommendation, RecommendContext, ScoringMode, SegmentKeywords,
    TextCleaner,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Where the recommender's artifacts come from.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    /// Persisted index directory; loaded when present, written after a dataset build.
    pub index_dir: Option<PathBuf>,
    /// Review CSV used when no persisted index exists.
    pub dataset: Option<PathBuf>,
    /// Directory with the segmentation artifacts.
    pub models_dir: Option<PathBuf>,
    pub segments: SegmentKeywords,
    pub engine: EngineConfig,
}

/// Outcome of the one build attempt; a failure is kept so it is not retried per request.
type BuildResult = std::result::Result<Arc<RecommendContext>, Arc<kopi_core::Error>>;

/// Builds the recommendation context at most once per process.
pub struct ContextCache {
    settings: Settings,
    slot: Mutex<Option<BuildResult>>,
}

impl ContextCache {
    pub fn new(settings: Settings) -> Self {
        Self { settings, slot: Mutex::new(None) }
    }

    /// The cached context, building it on first use. Concurrent callers wait on the lock
    /// instead of building twice, and a failed build keeps failing until restart.
    pub fn get(&self) -> BuildResult {
        let mut slot = self.slot.lock();
        if let Some(built) = slot.as_ref() {
            return built.clone();
        }
        let built = match load_or_build(&self.settings) {
            Ok(ctx) => Ok(Arc::new(ctx)),
            Err(e) => {
                tracing::error!(error = %e, "building the recommendation context failed");
                Err(Arc::new(e))
            }
        };
        *slot = Some(built.clone());
        built
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.slot.lock().as_ref(), Some(Ok(_)))
    }
}

fn load_or_build(settings: &Settings) -> kopi_core::Result<RecommendContext> {
    let embedder = from_config(&settings.engine.embedding)?;
    if let Some(dir) = &settings.index_dir {
        let paths = IndexPaths::new(dir);
        if paths.exists() {
            return load_context(&paths, embedder, settings.segments.clone());
        }
    }
    let Some(dataset) = &settings.dataset else {
        return Err(kopi_core::Error::data(
            "no persisted index found and no dataset configured",
        ));
    };
    let records = load_reviews(dataset)?;
    let cleaner = TextCleaner::new();
    let index = CorpusBuilder::new(&cleaner, embedder.as_ref())
        .with_config(settings.engine.clone())
        .build(records)?;
    if let Some(dir) = &settings.index_dir {
        let created_at = time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_default();
        let meta = MetaFile::describe(&index, created_at);
        save_index(&IndexPaths::new(dir), &index, &meta)?;
        tracing::info!(dir = %dir.display(), "persisted freshly built index");
    }
    RecommendContext::new(index, embedder, settings.segments.clone())
}

#[derive(Deserialize)]
pub struct RecommendParams {
    #[serde(default)]
    pub q: String,
    pub segment: Option<String>,
    pub location: Option<String>,
    pub k: Option<usize>,
    pub mode: Option<String>,
}

#[derive(Serialize)]
pub struct RecommendResponse {
    pub query: String,
    pub segment: Option<String>,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<Recommendation>,
}

#[derive(Deserialize)]
pub struct SegmentRequest {
    pub answers: HashMap<String, String>,
}

#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<ContextCache>,
    pub segmenter: Option<Arc<Segmenter>>,
    pub segments: Arc<SegmentKeywords>,
    pub engine: EngineConfig,
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn api_error(status: StatusCode, msg: impl std::fmt::Display) -> ApiError {
    (status, Json(serde_json::json!({ "error": msg.to_string() })))
}

/// Errors from handling a request; config errors there come from query parameters.
fn core_error(err: kopi_core::Error) -> ApiError {
    let status = if err.is_config() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    api_error(status, err)
}

pub fn build_app(settings: Settings) -> Result<Router> {
    settings.engine.validate()?;
    let segmenter = match &settings.models_dir {
        Some(dir) => Some(Arc::new(Segmenter::load(dir)?)),
        None => None,
    };
    let app_state = AppState {
        segments: Arc::new(settings.segments.clone()),
        engine: settings.engine.clone(),
        cache: Arc::new(ContextCache::new(settings)),
        segmenter,
    };

    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new()
                    .allow_origin(AllowOrigin::list(origins))
                    .allow_methods(Any)
                    .allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/recommend", get(recommend_handler))
        .route("/venue/:name", get(venue_handler))
        .route("/segments", get(segments_handler))
        .route("/categories", get(categories_handler))
        .route("/segment", post(segment_handler))
        .with_state(app_state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());
    Ok(app)
}

/// Fetch the context off the async runtime; the first call may build the whole index.
/// Any build failure, including an index/embedder mismatch, is a server fault.
async fn context(state: &AppState) -> Result<Arc<RecommendContext>, ApiError> {
    let cache = Arc::clone(&state.cache);
    tokio::task::spawn_blocking(move || cache.get())
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e))?
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e))
}

pub async fn recommend_handler(
    State(state): State<AppState>,
    Query(params): Query<RecommendParams>,
) -> Result<Json<RecommendResponse>, ApiError> {
    let start = std::time::Instant::now();
    let mode = match params.mode.as_deref() {
        Some(m) => m.parse::<ScoringMode>().map_err(core_error)?,
        None => state.engine.scoring_mode,
    };
    let query = kopi_core::Query {
        text: params.q.clone(),
        segment: params.segment.clone().filter(|s| !s.trim().is_empty()),
        location: params.location,
        weights: state.engine.weights,
        top_k: params.k.unwrap_or(state.engine.top_k.0),
        mode,
    };
    query.validate().map_err(core_error)?;
    let ctx = context(&state).await?;
    let results = ctx.recommend(&query).map_err(core_error)?;
    tracing::debug!(q = %params.q, hits = results.len(), "recommend");

    let elapsed = start.elapsed();
    Ok(Json(RecommendResponse {
        query: params.q,
        segment: query.segment,
        took_s: elapsed.as_secs_f64(),
        total_hits: results.len(),
        results,
    }))
}

pub async fn venue_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let ctx = context(&state).await?;
    match ctx.index.find(&name) {
        Some(v) => Ok(Json(serde_json::json!({
            "name": v.name,
            "area": v.area,
            "address": v.address,
            "rating": v.rating,
        }))),
        None => Err(api_error(StatusCode::NOT_FOUND, format!("no venue named `{name}`"))),
    }
}

pub async fn segments_handler(
    State(state): State<AppState>,
) -> Json<BTreeMap<String, Vec<String>>> {
    Json(state.segments.iter().map(|s| (s.name.clone(), s.keywords.clone())).collect())
}

fn segmenter(state: &AppState) -> Result<&Segmenter, ApiError> {
    state
        .segmenter
        .as_deref()
        .ok_or_else(|| api_error(StatusCode::SERVICE_UNAVAILABLE, "segmentation models not loaded"))
}

pub async fn categories_handler(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let seg = segmenter(&state)?;
    let fields: Vec<serde_json::Value> = seg
        .categories()
        .fields()
        .iter()
        .map(|f| serde_json::json!({ "field": f.name(), "options": f.labels() }))
        .collect();
    Ok(Json(serde_json::Value::Array(fields)))
}

pub async fn segment_handler(
    State(state): State<AppState>,
    Json(req): Json<SegmentRequest>,
) -> Result<Json<Classification>, ApiError> {
    let seg = segmenter(&state)?;
    let c = seg.classify(&req.answers).map_err(core_error)?;
    tracing::debug!(cluster = c.cluster, segment = %c.segment, "classified profile");
    Ok(Json(c))
}
