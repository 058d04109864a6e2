//! Paperlens server — HTTP API for PDF upload, text extraction, and
//! AI-powered document analysis.
//!
//! Thin axum server wrapping the paperlens library: uploads go through
//! the PDF extractor into the temp-file store, analysis reads the
//! stored text and runs it through the DeepSeek client, cleanup drops
//! the per-upload artifacts.
//!
//! Usage:
//!   DEEPSEEK_API_KEY=sk-... PAPERLENS_BIND=127.0.0.1:3000 paperlens-server
//!
//! Or with args:
//!   paperlens-server --uploads /tmp/paperlens --bind 0.0.0.0:3000

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use paperlens::analyzer::{Analyzer, DeepSeekAnalyzer};
use paperlens::store::UploadStore;
use paperlens::{pdf, Error};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;

const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
const DEFAULT_SKIP_FIRST: usize = 1;
const DEFAULT_SKIP_LAST: usize = 0;

// ============================================================================
// AppState
// ============================================================================

#[derive(Clone)]
struct AppState {
    store: Arc<UploadStore>,
    analyzer: Arc<dyn Analyzer>,
    start_time: Instant,
}

// ============================================================================
// Error type
// ============================================================================

struct AppError(StatusCode, String);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.0, Json(serde_json::json!({"error": self.1}))).into_response()
    }
}

impl From<Error> for AppError {
    fn from(e: Error) -> Self {
        let status = match &e {
            Error::InvalidUpload(_) => StatusCode::BAD_REQUEST,
            Error::Extraction(_) => StatusCode::BAD_REQUEST,
            Error::Storage(_) if e.is_not_found() => StatusCode::NOT_FOUND,
            Error::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Analysis(_) => StatusCode::BAD_GATEWAY,
        };
        AppError(status, e.to_string())
    }
}

fn not_found(msg: impl Into<String>) -> AppError {
    AppError(StatusCode::NOT_FOUND, msg.into())
}

fn bad_request(msg: impl Into<String>) -> AppError {
    AppError(StatusCode::BAD_REQUEST, msg.into())
}

// ============================================================================
// Request / Response types
// ============================================================================

#[derive(Serialize)]
struct UploadResponse {
    success: bool,
    #[serde(rename = "fileId")]
    file_id: String,
    #[serde(rename = "textLength")]
    text_length: usize,
    #[serde(rename = "wordCount")]
    word_count: usize,
}

#[derive(Deserialize)]
struct AnalyzeRequest {
    #[serde(rename = "fileId")]
    file_id: Option<String>,
}

#[derive(Serialize)]
struct AnalyzeResponse {
    success: bool,
    results: BTreeMap<String, String>,
}

#[derive(Deserialize, Default)]
struct CleanupRequest {
    #[serde(rename = "fileId", default)]
    file_id: Option<String>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    uptime_secs: u64,
}

// ============================================================================
// Handlers
// ============================================================================

// POST /upload — multipart: file (PDF), skipFirstPages, skipLastPages
async fn upload_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut skip_first = DEFAULT_SKIP_FIRST;
    let mut skip_last = DEFAULT_SKIP_LAST;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("Invalid multipart body: {}", e)))?
    {
        let name = field.name().map(|s| s.to_string());
        match name.as_deref() {
            Some("file") => {
                // MIME check comes first: a non-PDF upload is rejected
                // before anything touches the filesystem.
                let content_type = field.content_type().map(|s| s.to_string());
                if content_type.as_deref() != Some("application/pdf") {
                    return Err(bad_request(format!(
                        "Only PDF files are allowed (got {})",
                        content_type.as_deref().unwrap_or("no content type")
                    )));
                }
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(format!("Failed to read file: {}", e)))?;
                file_bytes = Some(bytes.to_vec());
            }
            Some("skipFirstPages") => {
                if let Ok(text) = field.text().await {
                    if let Ok(n) = text.trim().parse::<usize>() {
                        skip_first = n;
                    }
                }
            }
            Some("skipLastPages") => {
                if let Ok(text) = field.text().await {
                    if let Ok(n) = text.trim().parse::<usize>() {
                        skip_last = n;
                    }
                }
            }
            _ => {}
        }
    }

    let file_bytes = file_bytes.ok_or_else(|| bad_request("No file uploaded"))?;

    let file_id = UploadStore::generate_file_id();
    println!(
        "[POST /upload] {} ({} bytes, skip first: {}, last: {})",
        file_id,
        file_bytes.len(),
        skip_first,
        skip_last
    );

    let pdf_path = state.store.save_upload(&file_id, &file_bytes).await?;

    // lopdf parsing is CPU-bound; keep it off the async workers.
    let extracted = tokio::task::spawn_blocking(move || {
        pdf::process_pdf(&pdf_path, skip_first, skip_last)
    })
    .await
    .map_err(|e| AppError(StatusCode::INTERNAL_SERVER_ERROR, format!("Extraction task failed: {}", e)))?;

    let extracted = match extracted {
        Ok(e) => e,
        Err(e) => {
            // The extractor already consumed the PDF; this only catches
            // a file left behind by an earlier failure.
            state.store.discard_upload(&file_id).await;
            return Err(e.into());
        }
    };

    // The source PDF is already gone at this point, even though the
    // upload as a whole is about to fail.
    if extracted.text.is_empty() {
        return Err(Error::Extraction(
            "extracted text is empty; the PDF may contain only images or be copy-protected".to_string(),
        )
        .into());
    }

    if let Err(e) = state.store.save_text(&file_id, &extracted.text).await {
        state.store.discard_upload(&file_id).await;
        return Err(e.into());
    }

    // Character count, not bytes: the two differ on any non-ASCII text
    let text_length = extracted.text.chars().count();
    println!(
        "[POST /upload] {} extracted: {} chars, {} words",
        file_id, text_length, extracted.word_count
    );

    Ok(Json(UploadResponse {
        success: true,
        file_id,
        text_length,
        word_count: extracted.word_count,
    }))
}

// POST /analyze — JSON {fileId}
async fn analyze_handler(
    State(state): State<AppState>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>, AppError> {
    let file_id = req
        .file_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| bad_request("File id not specified"))?;

    let text = match state.store.load_text(&file_id).await {
        Ok(text) => text,
        Err(e) if e.is_not_found() => {
            return Err(not_found(format!("File '{}' not found", file_id)));
        }
        Err(e) => return Err(e.into()),
    };

    println!("[POST /analyze] {} ({} chars)", file_id, text.len());

    if text.trim().is_empty() {
        return Err(bad_request("No text to analyze"));
    }

    let results = state.analyzer.analyze(&text).await?;

    println!("[POST /analyze] {} done ({} steps)", file_id, results.len());

    Ok(Json(AnalyzeResponse { success: true, results }))
}

// DELETE /cleanup — JSON {fileId?}, body optional
//
// Parsed by hand rather than with the Json extractor: the client may
// send no body at all (full reset), which the extractor would reject
// with a content-type error instead of our {"error": ...} shape.
async fn cleanup_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<serde_json::Value>, AppError> {
    let req: CleanupRequest = if body.is_empty() {
        CleanupRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| bad_request(format!("Invalid JSON: {}", e)))?
    };

    match req.file_id {
        Some(file_id) if !file_id.is_empty() => {
            state.store.delete(&file_id).await?;
            println!("[DELETE /cleanup] Removed files for {}", file_id);
        }
        _ => {
            state.store.clear().await?;
            println!("[DELETE /cleanup] Cleared upload directory");
        }
    }
    Ok(Json(serde_json::json!({"success": true})))
}

// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

// ============================================================================
// Router
// ============================================================================

fn router(state: AppState) -> Router {
    Router::new()
        .route("/upload", post(upload_handler))
        .route("/analyze", post(analyze_handler))
        .route("/cleanup", delete(cleanup_handler))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    // Parse simple args (no clap to keep binary small)
    let args: Vec<String> = std::env::args().collect();
    let mut uploads_arg: Option<&str> = None;
    let mut bind_arg: Option<&str> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--uploads" if i + 1 < args.len() => {
                uploads_arg = Some(&args[i + 1]);
                i += 2;
            }
            "--bind" if i + 1 < args.len() => {
                bind_arg = Some(&args[i + 1]);
                i += 2;
            }
            "--help" | "-h" => {
                println!("paperlens-server — PDF analysis HTTP API");
                println!();
                println!("Usage: paperlens-server [--uploads DIR] [--bind ADDR:PORT]");
                println!();
                println!("Environment variables:");
                println!("  PAPERLENS_UPLOADS  Upload directory (default: uploads)");
                println!("  PAPERLENS_BIND     Bind address (default: 127.0.0.1:3000)");
                println!("  DEEPSEEK_API_KEY   API key for the analysis backend");
                println!("  DEEPSEEK_API_URL   API base URL (default: https://api.deepseek.com)");
                println!("  DEEPSEEK_MODEL     Model name (default: deepseek-chat)");
                std::process::exit(0);
            }
            _ => {
                i += 1;
            }
        }
    }

    let bind_addr = bind_arg
        .map(|s| s.to_string())
        .or_else(|| std::env::var("PAPERLENS_BIND").ok())
        .unwrap_or_else(|| "127.0.0.1:3000".to_string());

    let uploads_dir = uploads_arg
        .map(|s| s.to_string())
        .or_else(|| std::env::var("PAPERLENS_UPLOADS").ok())
        .unwrap_or_else(|| "uploads".to_string());

    let api_key = std::env::var("DEEPSEEK_API_KEY").unwrap_or_default();
    if api_key.is_empty() {
        eprintln!("[Server] Warning: DEEPSEEK_API_KEY not set — /analyze will fail");
    }
    let api_url = std::env::var("DEEPSEEK_API_URL")
        .unwrap_or_else(|_| "https://api.deepseek.com".to_string());
    let model = std::env::var("DEEPSEEK_MODEL").unwrap_or_else(|_| "deepseek-chat".to_string());

    println!("[Server] Upload directory: {}", uploads_dir);
    println!("[Server] Binding to: {}", bind_addr);
    println!("[Server] Analysis model: {}", model);

    let store = match UploadStore::new(&uploads_dir) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            eprintln!("[Server] Failed to open upload directory: {}", e);
            std::process::exit(1);
        }
    };

    let analyzer: Arc<dyn Analyzer> = Arc::new(DeepSeekAnalyzer::new(api_key, api_url, model));

    let state = AppState {
        store,
        analyzer,
        start_time: Instant::now(),
    };

    let app = router(state);

    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("[Server] Failed to bind to {}: {}", bind_addr, e);
            std::process::exit(1);
        }
    };

    println!("[Server] Listening on {}", bind_addr);
    if let Err(e) = axum::serve(listener, app).await {
        eprintln!("[Server] Server error: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};
    use std::path::Path;

    struct StubAnalyzer;

    #[async_trait]
    impl Analyzer for StubAnalyzer {
        async fn analyze(&self, text: &str) -> paperlens::Result<BTreeMap<String, String>> {
            if text.trim().is_empty() {
                return Err(Error::Analysis("no text to analyze".to_string()));
            }
            Ok(BTreeMap::from([("step1".to_string(), "stubbed".to_string())]))
        }
    }

    /// Serve the real router on an ephemeral port, backed by `dir`.
    async fn spawn_server(dir: &Path) -> String {
        let state = AppState {
            store: Arc::new(UploadStore::new(dir).unwrap()),
            analyzer: Arc::new(StubAnalyzer),
            start_time: Instant::now(),
        };
        let app = router(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    /// Hand-rolled multipart body with a single `file` part, so the
    /// part's content type is exactly what each test needs.
    fn multipart_file(content_type: &str, data: &[u8]) -> (String, Vec<u8>) {
        let boundary = "----paperlens-test";
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"doc.pdf\"\r\nContent-Type: {}\r\n\r\n",
                boundary, content_type
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
        (
            format!("multipart/form-data; boundary={}", boundary),
            body,
        )
    }

    /// A real in-memory PDF with one line of text per page.
    fn build_pdf(page_texts: &[&str]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for text in page_texts {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 24.into()]),
                    Operation::new("Td", vec![72.into(), 720.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id = doc.add_object(Stream::new(
                dictionary! {},
                content.encode().unwrap(),
            ));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    fn files_in(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[tokio::test]
    async fn non_pdf_upload_is_rejected_before_storage() {
        let dir = tempfile::tempdir().unwrap();
        let base = spawn_server(dir.path()).await;

        let (content_type, body) = multipart_file("text/plain", b"plain text, not a pdf");
        let resp = reqwest::Client::new()
            .post(format!("{}/upload", base))
            .header("Content-Type", content_type)
            .body(body)
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status().as_u16(), 400);
        let json: serde_json::Value = resp.json().await.unwrap();
        assert!(json["error"].as_str().unwrap().contains("PDF"));
        assert_eq!(files_in(dir.path()), 0, "nothing may be written for a rejected upload");
    }

    #[tokio::test]
    async fn corrupt_pdf_upload_fails_and_leaves_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let base = spawn_server(dir.path()).await;

        let (content_type, body) = multipart_file("application/pdf", b"claims to be a pdf");
        let resp = reqwest::Client::new()
            .post(format!("{}/upload", base))
            .header("Content-Type", content_type)
            .body(body)
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status().as_u16(), 400);
        let json: serde_json::Value = resp.json().await.unwrap();
        assert!(json["error"].is_string());
        assert_eq!(files_in(dir.path()), 0, "failed upload must not leave temp files");
    }

    #[tokio::test]
    async fn upload_reports_character_count_and_keeps_only_the_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let base = spawn_server(dir.path()).await;

        // Default skip of one leading page drops the intro
        let pdf = build_pdf(&["Intro page", "Body text here"]);
        let (content_type, body) = multipart_file("application/pdf", &pdf);
        let resp = reqwest::Client::new()
            .post(format!("{}/upload", base))
            .header("Content-Type", content_type)
            .body(body)
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status().as_u16(), 200);
        let json: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["wordCount"], 3);
        assert_eq!(
            json["textLength"].as_u64().unwrap() as usize,
            "Body text here".chars().count()
        );

        let file_id = json["fileId"].as_str().unwrap();
        assert!(dir.path().join(format!("{}.txt", file_id)).exists());
        assert!(!dir.path().join(file_id).exists(), "source PDF must be consumed");
    }

    #[tokio::test]
    async fn analyze_unknown_file_is_json_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let base = spawn_server(dir.path()).await;

        let resp = reqwest::Client::new()
            .post(format!("{}/analyze", base))
            .json(&serde_json::json!({"fileId": "missing.pdf"}))
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status().as_u16(), 404);
        let json: serde_json::Value = resp.json().await.unwrap();
        assert!(json["error"].as_str().unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn analyze_returns_step_results_for_stored_text() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("known.pdf.txt"), "hello world").unwrap();
        let base = spawn_server(dir.path()).await;

        let resp = reqwest::Client::new()
            .post(format!("{}/analyze", base))
            .json(&serde_json::json!({"fileId": "known.pdf"}))
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status().as_u16(), 200);
        let json: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["results"]["step1"], "stubbed");
    }

    #[tokio::test]
    async fn cleanup_without_body_clears_the_store() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.pdf"), b"%PDF-1.5").unwrap();
        std::fs::write(dir.path().join("a.pdf.txt"), "text").unwrap();
        let base = spawn_server(dir.path()).await;

        let resp = reqwest::Client::new()
            .delete(format!("{}/cleanup", base))
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status().as_u16(), 200);
        let json: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(files_in(dir.path()), 0);
    }

    #[tokio::test]
    async fn cleanup_with_file_id_removes_only_that_record() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("gone.pdf.txt"), "one").unwrap();
        std::fs::write(dir.path().join("kept.pdf.txt"), "two").unwrap();
        let base = spawn_server(dir.path()).await;

        let resp = reqwest::Client::new()
            .delete(format!("{}/cleanup", base))
            .json(&serde_json::json!({"fileId": "gone.pdf"}))
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status().as_u16(), 200);
        assert!(!dir.path().join("gone.pdf.txt").exists());
        assert!(dir.path().join("kept.pdf.txt").exists());
    }
}
