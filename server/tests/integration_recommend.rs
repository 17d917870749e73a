use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use kopi_core::classify::{
    CategoryField, CategoryTable, KModesModel, CATEGORIES_FILE, MODEL_FILE,
};
use kopi_core::persist::{save_index, IndexPaths, MetaFile};
use kopi_core::tokenizer::IdentityPreprocessor;
use kopi_core::{CorpusBuilder, EngineConfig, HashEmbedder, SegmentKeywords, Venue, Weights};
use serde_json::Value;
use server::{build_app, Settings};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;
use tower::ServiceExt;

fn build_tiny_index(dir: &Path) {
    let embedder = HashEmbedder::default();
    let venues = vec![
        Venue::new("A", "wifi kencang tenang", 4.5)
            .with_area("Tugu")
            .with_address("Jl. Mangkubumi"),
        Venue::new("B", "kopi susu enak", 3.0).with_area("Malioboro"),
        Venue::new("C", "", 5.0).with_area("Tugu"),
    ];
    let index = CorpusBuilder::new(&IdentityPreprocessor, &embedder).index_venues(venues).unwrap();
    let meta = MetaFile::describe(&index, "2024-01-01T00:00:00Z");
    save_index(&IndexPaths::new(dir), &index, &meta).unwrap();
}

fn write_models(dir: &Path) {
    let table = CategoryTable::new(vec![
        CategoryField::new("purpose", ["Konten / Foto - foto", "Nongkrong", "Nugas / Kerja"])
            .unwrap(),
        CategoryField::new("seat", ["Kursi Kayu", "Sofa"]).unwrap(),
    ])
    .unwrap();
    let model = KModesModel { centroids: vec![vec![0, 1], vec![1, 0], vec![1, 1], vec![2, 0]] };
    fs::write(dir.join(CATEGORIES_FILE), serde_json::to_string(&table).unwrap()).unwrap();
    fs::write(dir.join(MODEL_FILE), serde_json::to_string(&model).unwrap()).unwrap();
}

fn text_heavy() -> EngineConfig {
    EngineConfig { weights: Weights::TEXT_HEAVY, ..EngineConfig::default() }
}

fn with_index(dir: PathBuf) -> Settings {
    Settings { index_dir: Some(dir), ..Settings::default() }
}

async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(Value::Null)
    };
    (status, json)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    call(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

fn result_names(json: &Value) -> Vec<String> {
    json["results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["name"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn recommend_ranks_filtered_venues() {
    let dir = tempdir().unwrap();
    build_tiny_index(dir.path());
    let settings = Settings { engine: text_heavy(), ..with_index(dir.path().to_path_buf()) };
    let app = build_app(settings).unwrap();

    let uri = "/recommend?q=wifi%20tenang&segment=Productive%20Work%20%2F%20Study\
               &location=Tugu&k=5";
    let (status, json) = get(&app, uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result_names(&json), vec!["A", "C"]);
    assert_eq!(json["total_hits"].as_u64(), Some(2));
    assert_eq!(json["results"][0]["address"].as_str(), Some("Jl. Mangkubumi"));
    let score = |i: usize| json["results"][i]["score"].as_f64().unwrap();
    assert!(score(0) > score(1));
}

#[tokio::test]
async fn no_match_and_bad_parameters() {
    let dir = tempdir().unwrap();
    build_tiny_index(dir.path());
    let app = build_app(with_index(dir.path().to_path_buf())).unwrap();

    let (status, json) = get(&app, "/recommend?q=kopi&location=Nonexistent").await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["results"].as_array().unwrap().is_empty());

    let (status, json) = get(&app, "/recommend?q=kopi&k=0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("top_k"));

    let (status, _) = get(&app, "/recommend?q=kopi&mode=sideways").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn venue_lookup() {
    let dir = tempdir().unwrap();
    build_tiny_index(dir.path());
    let app = build_app(with_index(dir.path().to_path_buf())).unwrap();

    let (status, json) = get(&app, "/venue/B").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["area"].as_str(), Some("Malioboro"));
    let (status, _) = get(&app, "/venue/Z").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn missing_corpus_is_a_server_error() {
    let dir = tempdir().unwrap();
    let app = build_app(with_index(dir.path().join("absent"))).unwrap();
    let (status, json) = get(&app, "/recommend?q=kopi").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(json["error"].as_str().unwrap().contains("data error"));
}

#[tokio::test]
async fn failed_build_is_not_retried() {
    let dir = tempdir().unwrap();
    let csv = dir.path().join("reviews.csv");
    let app = build_app(Settings {
        index_dir: Some(dir.path().join("index")),
        dataset: Some(csv.clone()),
        ..Settings::default()
    })
    .unwrap();

    let (status, _) = get(&app, "/recommend?q=kopi").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    // the dataset appearing later does not revive the process
    fs::write(&csv, "name;review_text;rating;area;address
Kopi;enak;4;Tugu;
").unwrap();
    let (status, json) = get(&app, "/recommend?q=kopi").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(json["error"].as_str().unwrap().contains("I/O error"));
    let (status, _) = get(&app, "/venue/Kopi").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn embedder_mismatch_is_a_server_error() {
    let dir = tempdir().unwrap();
    build_tiny_index(dir.path());
    let mut engine = EngineConfig::default();
    engine.embedding.dimension = 16;
    let app = build_app(Settings { engine, ..with_index(dir.path().to_path_buf()) }).unwrap();

    let (status, json) = get(&app, "/recommend?q=kopi").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(json["error"].as_str().unwrap().contains("embedder"));
}

#[tokio::test]
async fn builds_from_dataset_once_and_persists() {
    let dir = tempdir().unwrap();
    let csv = dir.path().join("reviews.csv");
    fs::write(
        &csv,
        "name;review_text;rating;area;address\n\
         Kopi Kerja;Wifi kencang dan tenang buat nugas;4,5;Gejayan;Jl. Kaliurang\n\
         Sudut Manis;Kopi susu gula aren enak;4;Jakal;\n",
    )
    .unwrap();
    let index_dir = dir.path().join("index");
    let app = build_app(Settings {
        index_dir: Some(index_dir.clone()),
        dataset: Some(csv),
        ..Settings::default()
    })
    .unwrap();

    let (status, json) = get(&app, "/recommend?q=wifi%20tenang&k=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result_names(&json), vec!["Kopi Kerja"]);
    assert!(IndexPaths::new(&index_dir).exists());

    let (status, json) = get(&app, "/venue/Sudut%20Manis").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["area"].as_str(), Some("Jakal"));
}

#[tokio::test]
async fn segments_and_classification() {
    let dir = tempdir().unwrap();
    build_tiny_index(dir.path());
    let models = tempdir().unwrap();
    write_models(models.path());
    let app = build_app(Settings {
        index_dir: Some(dir.path().to_path_buf()),
        models_dir: Some(models.path().to_path_buf()),
        segments: SegmentKeywords::default(),
        ..Settings::default()
    })
    .unwrap();

    let (status, json) = get(&app, "/segments").await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["Productive Work / Study"].as_array().unwrap().iter().any(|k| k == "wifi"));

    let (status, json) = get(&app, "/categories").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json[0]["field"].as_str(), Some("purpose"));
    assert_eq!(json[1]["options"][1].as_str(), Some("Sofa"));

    let body =
        serde_json::json!({ "answers": { "purpose": "nugas / kerja", "seat": "Kursi Kayu" } });
    let req = Request::post("/segment")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let (status, json) = call(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["cluster"].as_u64(), Some(3));
    assert_eq!(json["segment"].as_str(), Some("Productive Work / Study"));

    let body = serde_json::json!({ "answers": { "purpose": "Nongkrong", "seat": "Lesehan" } });
    let req = Request::post("/segment")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let (status, _) = call(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn segmentation_without_models_is_unavailable() {
    let dir = tempdir().unwrap();
    build_tiny_index(dir.path());
    let app = build_app(with_index(dir.path().to_path_buf())).unwrap();
    let (status, _) = get(&app, "/categories").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}
