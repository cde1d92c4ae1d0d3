use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use image::{GenericImageView, ImageFormat, Rgb, RgbImage};
use ndarray::{Array4, ArrayView4};
use serde_json::Value;
use tower::ServiceExt;

use birefnet_server::mocks::{FailingSegmentationModel, MockSegmentationModel};
use birefnet_server::server::{self, AppState, ServerOptions};
use birefnet_server::{BackgroundRemover, Device, SegmentationModel};
use birefnet_server::Result as BgResult;

const BOUNDARY: &str = "----birefnet-test-boundary";

fn app_with(
    model: Arc<dyn SegmentationModel>,
    max_dimension: u32,
    max_upload_bytes: usize,
) -> Router {
    let remover = BackgroundRemover::new(model, max_dimension);
    let options = ServerOptions {
        max_upload_bytes,
        ..ServerOptions::default()
    };
    server::router(AppState::new(remover, 2), &options)
}

fn app() -> Router {
    app_with(Arc::new(MockSegmentationModel::new(32)), 4096, 1024 * 1024)
}

fn png_bytes(image: &RgbImage) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png).unwrap();
    buffer.into_inner()
}

fn multipart_body(field: &str, content_type: Option<&str>, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"{field}\"; filename=\"upload\"\r\n")
            .as_bytes(),
    );
    if let Some(content_type) = content_type {
        body.extend_from_slice(format!("Content-Type: {content_type}\r\n").as_bytes());
    }
    body.extend_from_slice(b"\r\n");
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn upload_request(field: &str, content_type: Option<&str>, bytes: &[u8]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/remove-bg")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(field, content_type, bytes)))
        .unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_remove_bg_returns_png_with_same_dimensions() {
    let input = RgbImage::from_fn(40, 24, |x, y| Rgb([(x * 6) as u8, (y * 10) as u8, 90]));
    let response = app()
        .oneshot(upload_request("image", Some("image/png"), &png_bytes(&input)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    let elapsed = response.headers()[server::PROCESSING_TIME_HEADER]
        .to_str()
        .unwrap()
        .parse::<u64>();
    assert!(elapsed.is_ok());

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let output = image::load_from_memory_with_format(&bytes, ImageFormat::Png).unwrap();
    assert_eq!(output.dimensions(), (40, 24));
    assert!(output.color().has_alpha());
}

#[tokio::test]
async fn test_remove_bg_rejects_non_image_content_type() {
    // 中身は正しいPNGだが、宣言されたContent-Typeで判定される
    let input = png_bytes(&RgbImage::new(8, 8));
    let response = app()
        .oneshot(upload_request("image", Some("text/plain"), &input))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["detail"], "File must be an image");
}

#[tokio::test]
async fn test_remove_bg_rejects_missing_content_type() {
    let response = app()
        .oneshot(upload_request("image", None, b"whatever"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["detail"], "File must be an image");
}

#[tokio::test]
async fn test_remove_bg_requires_image_field() {
    let response = app()
        .oneshot(upload_request("file", Some("image/png"), b"whatever"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["detail"], "No image provided");
}

#[tokio::test]
async fn test_remove_bg_corrupt_image_is_server_error() {
    let mut truncated = png_bytes(&RgbImage::new(16, 16));
    truncated.truncate(20);
    let response = app()
        .oneshot(upload_request("image", Some("image/png"), &truncated))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let detail = json_body(response).await["detail"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(detail.contains("Background removal failed"));
}

#[tokio::test]
async fn test_remove_bg_inference_failure_is_sanitized() {
    let app = app_with(Arc::new(FailingSegmentationModel), 4096, 1024 * 1024);
    let input = png_bytes(&RgbImage::new(8, 8));
    let response = app
        .oneshot(upload_request("image", Some("image/png"), &input))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert_eq!(body["detail"], "Background removal failed: inference error");
    assert!(!body["detail"].as_str().unwrap().contains("memory"));
}

#[tokio::test]
async fn test_remove_bg_rejects_oversized_dimensions() {
    let app = app_with(Arc::new(MockSegmentationModel::new(16)), 32, 1024 * 1024);
    let input = png_bytes(&RgbImage::new(64, 16));
    let response = app
        .oneshot(upload_request("image", Some("image/png"), &input))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(json_body(response).await["detail"], "Image exceeds maximum size");
}

#[tokio::test]
async fn test_remove_bg_rejects_oversized_upload() {
    let app = app_with(Arc::new(MockSegmentationModel::new(16)), 4096, 512);
    let response = app
        .oneshot(upload_request("image", Some("image/png"), &vec![0u8; 4096]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_health_reports_model_and_device() {
    let response = app()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["model"], "BiRefNet (SOTA 2024)");
    assert_eq!(body["device"], "cpu");
}

#[tokio::test]
async fn test_health_reports_selected_device() {
    let model = MockSegmentationModel::new(16).with_device(Device::Cuda);
    let response = app_with(Arc::new(model), 4096, 1024)
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let device = json_body(response).await["device"].clone();
    assert_eq!(device, "cuda");
    assert!(["cpu", "cuda", "mps"].contains(&device.as_str().unwrap()));
}

#[tokio::test]
async fn test_cors_allows_local_origin_and_exposes_timing_header() {
    let input = png_bytes(&RgbImage::new(8, 8));
    let mut request = upload_request("image", Some("image/png"), &input);
    request
        .headers_mut()
        .insert(header::ORIGIN, "http://localhost:3000".parse().unwrap());

    let response = app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(
        headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "http://localhost:3000"
    );
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
    assert!(headers[header::ACCESS_CONTROL_EXPOSE_HEADERS]
        .to_str()
        .unwrap()
        .to_ascii_lowercase()
        .contains("x-processing-time-ms"));
}

#[tokio::test]
async fn test_cors_ignores_unknown_origin() {
    let request = Request::get("/health")
        .header(header::ORIGIN, "https://evil.example")
        .body(Body::empty())
        .unwrap();

    let response = app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .is_none());
}

#[tokio::test]
async fn test_cors_preflight_mirrors_method() {
    let request = Request::builder()
        .method("OPTIONS")
        .uri("/remove-bg")
        .header(header::ORIGIN, "http://127.0.0.1:3000")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "x-custom")
        .body(Body::empty())
        .unwrap();

    let response = app().oneshot(request).await.unwrap();

    assert!(response.status().is_success());
    let headers = response.headers();
    assert_eq!(
        headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "http://127.0.0.1:3000"
    );
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_METHODS], "POST");
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_HEADERS], "x-custom");
}

/// 同時に実行中の推論数を記録するモック
#[derive(Default)]
struct CountingModel {
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl SegmentationModel for CountingModel {
    fn image_size(&self) -> u32 {
        8
    }

    fn device(&self) -> Device {
        Device::Cpu
    }

    fn predict(&self, tensor: ArrayView4<f32>) -> BgResult<Array4<f32>> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(50));
        self.active.fetch_sub(1, Ordering::SeqCst);

        let (batch, _, height, width) = tensor.dim();
        Ok(Array4::zeros((batch, 1, height, width)))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_inference_admission_is_bounded() {
    let model = Arc::new(CountingModel::default());
    let remover = BackgroundRemover::new(model.clone(), 4096);
    let app = server::router(AppState::new(remover, 1), &ServerOptions::default());
    let input = png_bytes(&RgbImage::new(8, 8));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let app = app.clone();
            let request = upload_request("image", Some("image/png"), &input);
            tokio::spawn(async move { app.oneshot(request).await.unwrap().status() })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap(), StatusCode::OK);
    }
    assert_eq!(model.peak.load(Ordering::SeqCst), 1);
    assert_eq!(model.active.load(Ordering::SeqCst), 0);
}
