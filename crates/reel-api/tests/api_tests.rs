//! Router-level tests driven with `tower::ServiceExt::oneshot`.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use reel_api::{create_router, ApiConfig, AppState};
use reel_media::{MediaResult, ToolOutput, ToolRunner};
use reel_pipeline::{Composer, PipelineConfig};
use reel_storage::{ArtifactStore, StorageResult};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "reel-test-boundary";

/// Reports a five second clip without audio and renders every stage.
struct FakeRunner;

#[async_trait]
impl ToolRunner for FakeRunner {
    async fn run(&self, program: &str, args: &[String]) -> MediaResult<ToolOutput> {
        let stdout = if program.ends_with("ffprobe") {
            if args.iter().any(|a| a == "format=duration") {
                "5.000000\n"
            } else {
                ""
            }
        } else {
            let target = PathBuf::from(args.last().unwrap());
            tokio::fs::write(&target, b"rendered").await.unwrap();
            ""
        };

        Ok(ToolOutput {
            exit_code: Some(0),
            success: true,
            stdout: stdout.to_string(),
            stderr: String::new(),
        })
    }
}

#[derive(Default)]
struct FakeStore {
    uploads: Mutex<Vec<String>>,
}

#[async_trait]
impl ArtifactStore for FakeStore {
    async fn upload_artifact(&self, path: &Path, folder: &str, _chunk_size: usize) -> StorageResult<String> {
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        self.uploads.lock().unwrap().push(name.clone());
        Ok(format!("https://cdn.test/{}/{}", folder, name))
    }

    async fn check_connectivity(&self) -> StorageResult<()> {
        Ok(())
    }
}

struct TestApp {
    work_dir: TempDir,
    store: Arc<FakeStore>,
    router: Router,
}

fn app_with(api: ApiConfig, tool_bin: Option<&str>) -> TestApp {
    let work_dir = tempfile::tempdir().unwrap();
    let mut pipeline = PipelineConfig {
        work_dir: work_dir.path().to_path_buf(),
        ..Default::default()
    };
    if let Some(bin) = tool_bin {
        pipeline.ffmpeg_bin = bin.to_string();
        pipeline.ffprobe_bin = bin.to_string();
    }

    let store = Arc::new(FakeStore::default());
    let composer = Composer::new(pipeline, Arc::new(FakeRunner), store.clone()).unwrap();
    let router = create_router(AppState::from_parts(api, composer), None);

    TestApp {
        work_dir: work_dir,
        store,
        router,
    }
}

fn app() -> TestApp {
    app_with(
        ApiConfig {
            rate_limit_rps: 1000,
            ..Default::default()
        },
        None,
    )
}

fn json_request(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/ugc/process-video")
        .header("content-type", "application/json")
        .header("x-forwarded-for", "203.0.113.10")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health() {
    let app = app();
    let response = app
        .router
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_missing_video_is_bad_request() {
    let app = app();
    let response = app.router.oneshot(json_request(json!({"hookText": "hi"}))).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["status"], "error");
    assert_eq!(body["message"], "No video source provided");
}

#[tokio::test]
async fn test_unsupported_url_scheme_is_bad_request() {
    let app = app();
    let response = app
        .router
        .oneshot(json_request(json!({"videoUrl": "file:///etc/passwd"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["status"], "error");
}

#[tokio::test]
async fn test_unreachable_source_is_bad_gateway() {
    let app = app();
    let response = app
        .router
        .oneshot(json_request(json!({"cloudinaryVideoUrl": "http://127.0.0.1:1/base.mp4"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(json_body(response).await["status"], "error");
}

#[tokio::test]
async fn test_multipart_upload_succeeds() {
    let app = app();

    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"uploadedVideo\"; filename=\"clip.mp4\"\r\nContent-Type: video/mp4\r\n\r\n",
            b = BOUNDARY
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"not-really-a-video");
    body.extend_from_slice(
        format!(
            "\r\n--{b}\r\nContent-Disposition: form-data; name=\"hookText\"\r\n\r\nThis changed everything\r\n--{b}\r\nContent-Disposition: form-data; name=\"hookPosition\"\r\n\r\ntop\r\n--{b}--\r\n",
            b = BOUNDARY
        )
        .as_bytes(),
    );

    let request = Request::builder()
        .method("POST")
        .uri("/api/ugc/process-video")
        .header("content-type", format!("multipart/form-data; boundary={}", BOUNDARY))
        .body(Body::from(body))
        .unwrap();

    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["status"], "success");
    let url = body["videoUrl"].as_str().unwrap();
    assert!(url.starts_with("https://cdn.test/ugc/"));
    assert_eq!(app.store.uploads.lock().unwrap().len(), 1);

    let leftovers = std::fs::read_dir(app.work_dir.path()).unwrap().count();
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn test_security_headers_and_request_id() {
    let app = app();
    let response = app
        .router
        .oneshot(
            Request::get("/health")
                .header("X-Request-ID", "req-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let headers = response.headers();
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["x-frame-options"], "DENY");
    assert_eq!(headers["x-request-id"], "req-123");
}

#[tokio::test]
async fn test_request_id_is_generated() {
    let app = app();
    let response = app
        .router
        .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let id = response.headers()["x-request-id"].to_str().unwrap();
    assert_eq!(id.len(), 36);
}

#[tokio::test]
async fn test_ready_reports_missing_tools() {
    let app = app_with(ApiConfig::default(), Some("no-such-transcoder-bin"));
    let response = app
        .router
        .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = json_body(response).await;
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["checks"]["tools"]["status"], "error");
    assert_eq!(body["checks"]["storage"]["status"], "ok");
}

#[tokio::test]
async fn test_ready_when_tools_resolve() {
    let app = app_with(ApiConfig::default(), Some("sh"));
    let response = app
        .router
        .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "ready");
}

#[tokio::test]
async fn test_rate_limit() {
    let app = app_with(
        ApiConfig {
            rate_limit_rps: 1,
            ..Default::default()
        },
        None,
    );

    let first = app.router.clone().oneshot(json_request(json!({}))).await.unwrap();
    assert_eq!(first.status(), StatusCode::BAD_REQUEST);

    let second = app.router.clone().oneshot(json_request(json!({}))).await.unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(second.headers()["retry-after"], "1");
    assert_eq!(json_body(second).await["status"], "error");
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let app = app();
    let response = app
        .router
        .oneshot(Request::get("/api/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
