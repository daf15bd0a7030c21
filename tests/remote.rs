//! Integration tests against a mock compression endpoint.
//!
//! Every test starts its own `wiremock` server, so they run offline and in
//! parallel. Run with:
//!   cargo test --test remote

use edgequake_compress::prompts::DEFAULT_CONTEXT;
use edgequake_compress::{
    probe, CompressionConfig, CompressionRequest, Compressor, ConnectionStatus, StageError,
    Strategy,
};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use serde_json::json;
use std::io::{self, Cursor};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::fmt::MakeWriter;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const API_PATH: &str = "/compress/raw/";
const API_KEY: &str = "sd-test-key";

// ── Helpers ──────────────────────────────────────────────────────────────────

fn config_for(server: &MockServer) -> CompressionConfig {
    CompressionConfig::builder()
        .api_key(API_KEY)
        .endpoint(format!("{}{}", server.uri(), API_PATH))
        .build()
        .expect("valid config")
}

async fn respond_with(server: &MockServer, template: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path(API_PATH))
        .respond_with(template)
        .mount(server)
        .await;
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 7 % 256) as u8, (y * 3 % 256) as u8, 200])
    }));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .expect("encode png");
    buf
}

async fn requests_received(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .map(|r| r.len())
        .unwrap_or_default()
}

/// Log sink that keeps everything written to it.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

// ── Image path ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn image_base64_output_is_decoded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(API_PATH))
        .and(header("x-api-key", API_KEY))
        .and(body_partial_json(json!({
            "context": DEFAULT_CONTEXT,
            "scaledown": { "rate": "auto" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "output": "aGVsbG8=" })))
        .expect(1)
        .mount(&server)
        .await;

    let compressor = Compressor::new(config_for(&server)).unwrap();
    let original = png(64, 64);
    let result = compressor
        .compress(&CompressionRequest::new(original.clone(), "image/png"))
        .await
        .unwrap();

    assert_eq!(result.payload.as_bytes(), Some(&b"hello"[..]));
    assert_eq!(result.compressed_size, 5);
    assert_eq!(result.original_size, original.len());
    assert_eq!(result.strategy, Strategy::Remote);
    assert!(result.fallbacks.is_empty());
}

#[tokio::test]
async fn image_prompt_is_base64_of_input() {
    let server = MockServer::start().await;
    let original = png(8, 8);
    let expected_prompt = {
        use base64::Engine as _;
        base64::engine::general_purpose::STANDARD.encode(&original)
    };
    Mock::given(method("POST"))
        .and(path(API_PATH))
        .and(body_partial_json(json!({ "prompt": expected_prompt })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": "d29ybGQ=" })))
        .expect(1)
        .mount(&server)
        .await;

    let result = Compressor::new(config_for(&server))
        .unwrap()
        .compress(&CompressionRequest::new(original, "image/png"))
        .await
        .unwrap();
    assert_eq!(result.payload.as_bytes(), Some(&b"world"[..]));
}

#[tokio::test]
async fn field_priority_ignores_json_order() {
    let server = MockServer::start().await;
    respond_with(
        &server,
        ResponseTemplate::new(200).set_body_raw(
            r#"{"compressedFile":"d29ybGQ=","output":"aGVsbG8="}"#,
            "application/json",
        ),
    )
    .await;

    let result = Compressor::new(config_for(&server))
        .unwrap()
        .compress(&CompressionRequest::new(png(4, 4), "image/png"))
        .await
        .unwrap();
    assert_eq!(result.payload.as_bytes(), Some(&b"hello"[..]));
}

#[tokio::test]
async fn nested_compressed_file_is_decoded() {
    let server = MockServer::start().await;
    respond_with(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({
            "result": { "compressedFile": "aGVsbG8=", "format": "webp" }
        })),
    )
    .await;

    let result = Compressor::new(config_for(&server))
        .unwrap()
        .compress(&CompressionRequest::new(png(4, 4), "image/png"))
        .await
        .unwrap();
    assert_eq!(result.payload.as_bytes(), Some(&b"hello"[..]));
    assert_eq!(result.strategy, Strategy::Remote);
}

#[tokio::test]
async fn server_error_falls_back_to_local_reencode() {
    let server = MockServer::start().await;
    respond_with(&server, ResponseTemplate::new(500).set_body_string("upstream exploded")).await;

    let original = png(2400, 600);
    let result = Compressor::new(config_for(&server))
        .unwrap()
        .compress(&CompressionRequest::new(original.clone(), "image/png"))
        .await
        .unwrap();

    assert_eq!(result.strategy, Strategy::Local);
    let data = result.payload.as_bytes().unwrap();
    assert_eq!(image::guess_format(data).unwrap(), ImageFormat::Jpeg);
    let decoded = image::load_from_memory(data).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (1200, 300));
    match result.fallbacks.as_slice() {
        [StageError::Delegation {
            status: Some(500),
            timed_out: false,
            ..
        }] => {}
        other => panic!("unexpected fallbacks: {other:?}"),
    }
}

#[tokio::test]
async fn textual_answer_for_image_falls_back() {
    let server = MockServer::start().await;
    respond_with(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({ "reply": "I cannot process images." })),
    )
    .await;

    let result = Compressor::new(config_for(&server))
        .unwrap()
        .compress(&CompressionRequest::new(png(32, 32), "image/jpeg"))
        .await
        .unwrap();
    assert_eq!(result.strategy, Strategy::Local);
    assert!(matches!(
        result.fallbacks.as_slice(),
        [StageError::NoUsableCandidate { .. }]
    ));
}

#[tokio::test]
async fn remote_and_codec_failure_returns_identity() {
    let server = MockServer::start().await;
    respond_with(&server, ResponseTemplate::new(503)).await;

    let garbage = b"\x00\x01\x02 definitely not a picture".to_vec();
    let result = Compressor::new(config_for(&server))
        .unwrap()
        .compress(&CompressionRequest::new(garbage.clone(), "image/png"))
        .await
        .unwrap();

    assert_eq!(result.payload.as_bytes(), Some(&garbage[..]));
    assert_eq!(result.original_size, garbage.len());
    assert_eq!(result.compressed_size, garbage.len());
    assert_eq!(result.ratio, 0);
    assert_eq!(result.strategy, Strategy::Identity);
    assert!(matches!(
        result.fallbacks.as_slice(),
        [
            StageError::Delegation { status: Some(503), .. },
            StageError::CodecUnavailable { .. }
        ]
    ));
}

// ── Document path ────────────────────────────────────────────────────────────

#[tokio::test]
async fn document_timeout_falls_back_to_sections() {
    let server = MockServer::start().await;
    respond_with(
        &server,
        ResponseTemplate::new(200)
            .set_body_json(json!({ "summary": "too late" }))
            .set_delay(Duration::from_secs(3)),
    )
    .await;

    let config = CompressionConfig::builder()
        .api_key(API_KEY)
        .endpoint(format!("{}{}", server.uri(), API_PATH))
        .request_timeout_secs(1)
        .build()
        .unwrap();

    let text = "Tenant handbook\nRULES:\nNo pets";
    let result = Compressor::new(config)
        .unwrap()
        .compress(&CompressionRequest::new(text, "application/pdf"))
        .await
        .unwrap();

    let summary = result.payload.as_summary().unwrap();
    assert!(summary.contains("Introduction"));
    assert_eq!(summary.get("Introduction"), Some("Tenant handbook"));
    assert_eq!(summary.get("RULES"), Some("No pets"));
    assert_eq!(result.strategy, Strategy::Local);
    assert!(matches!(
        result.fallbacks.as_slice(),
        [StageError::Delegation { timed_out: true, .. }]
    ));
}

#[tokio::test]
async fn document_text_answer_becomes_summary_field() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(API_PATH))
        .and(body_partial_json(json!({ "prompt": "INTRODUCTION\nHello world" })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "output": "A short greeting." })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let result = Compressor::new(config_for(&server))
        .unwrap()
        .compress(&CompressionRequest::new(
            "INTRODUCTION\nHello world",
            "application/pdf",
        ))
        .await
        .unwrap();

    let summary = result.payload.as_summary().unwrap();
    assert_eq!(summary.get("summary"), Some("A short greeting."));
    assert_eq!(result.compressed_size, summary.to_json().unwrap().len());
    assert_eq!(result.page_count, Some(1));
    assert_eq!(
        result.extracted_text.as_deref(),
        Some("INTRODUCTION\nHello world")
    );
    assert_eq!(result.strategy, Strategy::Remote);
}

#[tokio::test]
async fn document_object_answer_is_the_summary() {
    let server = MockServer::start().await;
    respond_with(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({
            "summary": { "Parties": "Landlord and tenant", "Term": 12 }
        })),
    )
    .await;

    let result = Compressor::new(config_for(&server))
        .unwrap()
        .compress(&CompressionRequest::new("LEASE\nbody", "application/pdf"))
        .await
        .unwrap();

    let summary = result.payload.as_summary().unwrap();
    assert_eq!(summary.get("Parties"), Some("Landlord and tenant"));
    assert_eq!(summary.get("Term"), Some("12"));
}

#[tokio::test]
async fn document_plain_text_body_is_used() {
    let server = MockServer::start().await;
    respond_with(
        &server,
        ResponseTemplate::new(200).set_body_string("Plain text summary, not JSON."),
    )
    .await;

    let result = Compressor::new(config_for(&server))
        .unwrap()
        .compress(&CompressionRequest::new("SOMETHING\nbody", "application/pdf"))
        .await
        .unwrap();
    assert_eq!(
        result.payload.as_summary().unwrap().get("summary"),
        Some("Plain text summary, not JSON.")
    );
}

#[tokio::test]
async fn document_prompt_is_capped() {
    let server = MockServer::start().await;
    respond_with(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({ "summary": "ok" })),
    )
    .await;

    let text = "a".repeat(25_000);
    let result = Compressor::new(config_for(&server))
        .unwrap()
        .compress(&CompressionRequest::new(text, "application/pdf"))
        .await
        .unwrap();
    assert_eq!(result.strategy, Strategy::Remote);
    assert_eq!(result.page_count, Some(9));

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["prompt"].as_str().unwrap().len(), 20_000);
}

// ── Generic text path ────────────────────────────────────────────────────────

#[tokio::test]
async fn text_is_never_delegated() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "output": "x" })))
        .expect(0)
        .mount(&server)
        .await;

    let result = Compressor::new(config_for(&server))
        .unwrap()
        .compress(&CompressionRequest::new("just some notes", "text/plain"))
        .await
        .unwrap();
    assert_eq!(result.strategy, Strategy::Excerpt);
    assert_eq!(requests_received(&server).await, 0);
}

// ── Context compression ──────────────────────────────────────────────────────

#[tokio::test]
async fn context_compression_reads_results_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(API_PATH))
        .and(body_partial_json(json!({
            "context": "Rent is due on the first of each month.",
            "prompt": "When is rent due?"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": {
                "compressed_prompt": "Rent due 1st monthly. When rent due?",
                "original_prompt_tokens": 18,
                "compressed_prompt_tokens": 9
            }
        })))
        .mount(&server)
        .await;

    let c = Compressor::new(config_for(&server))
        .unwrap()
        .compress_context("Rent is due on the first of each month.", "When is rent due?")
        .await;

    assert!(c.delegated);
    assert_eq!(c.text, "Rent due 1st monthly. When rent due?");
    assert_eq!((c.original_tokens, c.compressed_tokens), (18, 9));
}

#[tokio::test]
async fn context_compression_falls_back_to_concatenation() {
    let server = MockServer::start().await;
    respond_with(&server, ResponseTemplate::new(502)).await;

    let c = Compressor::new(config_for(&server))
        .unwrap()
        .compress_context("ctx", "question")
        .await;
    assert!(!c.delegated);
    assert_eq!(c.text, "ctx\n\nquestion");
    assert!(matches!(
        c.fallbacks.as_slice(),
        [StageError::Delegation { status: Some(502), .. }]
    ));
}

// ── Health probe ─────────────────────────────────────────────────────────────

async fn probe_with_status(code: u16) -> ConnectionStatus {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(API_PATH))
        .and(body_partial_json(json!({ "context": "test", "prompt": "ping" })))
        .respond_with(ResponseTemplate::new(code))
        .mount(&server)
        .await;
    probe(&config_for(&server)).await
}

#[tokio::test]
async fn probe_classifies_statuses() {
    assert_eq!(probe_with_status(200).await, ConnectionStatus::Connected);
    assert_eq!(probe_with_status(403).await, ConnectionStatus::InvalidCredential);
    assert_eq!(probe_with_status(404).await, ConnectionStatus::WrongEndpoint);
    assert!(matches!(
        probe_with_status(500).await,
        ConnectionStatus::Unreachable { status: Some(500), .. }
    ));
}

#[tokio::test]
async fn rejected_key_disables_delegation() {
    let server = MockServer::start().await;
    respond_with(&server, ResponseTemplate::new(403)).await;

    let compressor = Compressor::connect(config_for(&server)).await.unwrap();
    assert_eq!(compressor.status(), Some(&ConnectionStatus::InvalidCredential));
    assert!(!compressor.delegation_enabled());

    let result = compressor
        .compress(&CompressionRequest::new(png(16, 16), "image/png"))
        .await
        .unwrap();
    assert_eq!(result.strategy, Strategy::Local);
    assert!(result.fallbacks.is_empty());
    // Only the probe reached the server.
    assert_eq!(requests_received(&server).await, 1);
}

#[tokio::test]
async fn transient_probe_failure_keeps_delegation() {
    let server = MockServer::start().await;
    respond_with(&server, ResponseTemplate::new(500)).await;

    let compressor = Compressor::connect(config_for(&server)).await.unwrap();
    assert!(compressor.delegation_enabled());
    assert!(matches!(
        compressor.status(),
        Some(ConnectionStatus::Unreachable { .. })
    ));
}

// ── Diagnostics ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn first_response_is_logged_once_per_client() {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_max_level(tracing::Level::INFO)
        .with_ansi(false)
        .finish();
    // The test runtime is single-threaded, so the thread-local default
    // covers every poll of the requests below.
    let _guard = tracing::subscriber::set_default(subscriber);

    let server = MockServer::start().await;
    respond_with(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({ "output": "aGVsbG8=" })),
    )
    .await;

    let compressor = Compressor::new(config_for(&server)).unwrap();
    for _ in 0..3 {
        let result = compressor
            .compress(&CompressionRequest::new(png(8, 8), "image/png"))
            .await
            .unwrap();
        assert_eq!(result.strategy, Strategy::Remote);
    }
    assert_eq!(requests_received(&server).await, 3);
    assert_eq!(logs.contents().matches("First remote response").count(), 1);

    // A fresh client has its own guard.
    let other = Compressor::new(config_for(&server)).unwrap();
    other
        .compress(&CompressionRequest::new(png(8, 8), "image/png"))
        .await
        .unwrap();
    assert_eq!(logs.contents().matches("First remote response").count(), 2);
}
