//! Tests for reality-adapters: wire shapes, response narrowing, and HTTP adapters
//! against a local mock server

use axum::body::Bytes;
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::{extract::State, Router};
use reality_adapters::*;
use reality_core::RegisterKind;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

// ===========================================================================
// Mock server
// ===========================================================================

#[derive(Clone, Debug)]
struct Captured {
    path: String,
    query: Option<String>,
    headers: HeaderMap,
    body: Value,
}

#[derive(Clone)]
struct MockState {
    status: StatusCode,
    reply: Value,
    captured: Arc<Mutex<Vec<Captured>>>,
}

async fn record(
    State(state): State<MockState>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let body = serde_json::from_slice(&body).unwrap_or(Value::Null);
    state.captured.lock().unwrap().push(Captured {
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        headers,
        body,
    });
    (state.status, axum::Json(state.reply.clone()))
}

/// Serve `reply` with `status` for every request; returns the base URL and the capture log.
async fn mock_server(status: StatusCode, reply: Value) -> (String, Arc<Mutex<Vec<Captured>>>) {
    let captured = Arc::new(Mutex::new(Vec::new()));
    let state = MockState {
        status,
        reply,
        captured: captured.clone(),
    };
    let app = Router::new().fallback(record).with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), captured)
}

async fn image_server() -> String {
    let app = Router::new().fallback(|| async {
        ([(header::CONTENT_TYPE, "image/png; charset=binary")], vec![1u8, 2, 3])
    });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn text_reply(text: &str) -> Value {
    json!({ "candidates": [{ "content": { "parts": [{ "text": text }] } }] })
}

// ===========================================================================
// Wire shapes
// ===========================================================================

#[test]
fn segment_response_prefers_image_url() {
    let parsed: SegmentResponse = serde_json::from_value(json!({
        "image": { "url": "https://fal.media/mask.png" },
        "masks": [{ "url": "https://fal.media/other.png" }],
        "scores": [0.91, 0.4],
        "boxes": [[10.0, 20.0, 30.0, 40.0]]
    }))
    .unwrap();
    let mask = parsed.into_mask().unwrap();
    assert_eq!(mask.url, "https://fal.media/mask.png");
    assert_eq!(mask.score, Some(0.91));
    assert_eq!(mask.bbox, Some([10.0, 20.0, 30.0, 40.0]));
}

#[test]
fn segment_response_falls_back_to_masks() {
    let parsed: SegmentResponse =
        serde_json::from_value(json!({ "masks": [{ "url": "m0.png" }] })).unwrap();
    assert_eq!(parsed.into_mask().unwrap().url, "m0.png");
}

#[test]
fn segment_response_without_mask_is_missing_field() {
    let parsed: SegmentResponse = serde_json::from_value(json!({})).unwrap();
    assert!(matches!(parsed.into_mask(), Err(AdapterError::MissingField(_))));
}

#[test]
fn segment_request_direct_flags() {
    let body = serde_json::to_value(SegmentRequest::simple("u", "cup").with_masks(4)).unwrap();
    assert_eq!(
        body,
        json!({
            "image_url": "u",
            "prompt": "cup",
            "return_multiple_masks": true,
            "max_masks": 4,
            "include_boxes": true,
            "include_scores": true
        })
    );
    let simple = serde_json::to_value(SegmentRequest::simple("u", "cup")).unwrap();
    assert_eq!(simple, json!({ "image_url": "u", "prompt": "cup" }));
}

#[test]
fn generate_request_serializes_snake_case() {
    let image = EncodedImage {
        mime_type: "image/png".into(),
        data: "AAAA".into(),
    };
    let req =
        GenerateContentRequest::new(vec![Part::text("edit"), Part::image(&image)]).image_response();
    let body = serde_json::to_value(&req).unwrap();
    assert_eq!(body["contents"][0]["role"], "user");
    assert_eq!(body["contents"][0]["parts"][0]["text"], "edit");
    assert_eq!(body["contents"][0]["parts"][1]["inline_data"]["mime_type"], "image/png");
    assert_eq!(
        body["generation_config"]["response_modalities"],
        json!(["TEXT", "IMAGE"])
    );
    assert!(body.get("model").is_none());
}

#[test]
fn generate_response_accepts_camel_case_inline_data() {
    let resp: GenerateContentResponse = serde_json::from_value(json!({
        "candidates": [{ "content": { "parts": [
            { "text": "here you go" },
            { "inlineData": { "mimeType": "image/png", "data": "QUJD" } }
        ] } }]
    }))
    .unwrap();
    let img = resp.first_inline_image().unwrap();
    assert_eq!(img.mime_type, "image/png");
    assert_eq!(img.to_data_url(), "data:image/png;base64,QUJD");
    assert_eq!(resp.first_text(), Some("here you go"));
}

#[test]
fn generate_response_empty_candidates() {
    let resp: GenerateContentResponse = serde_json::from_value(json!({})).unwrap();
    assert!(resp.first_text().is_none());
    assert!(resp.first_inline_image().is_none());
}

#[test]
fn compiler_response_parses_fenced_json() {
    let text = "```json\n{\"thought\":\"find the cup\",\"program\":{\"registers\":[{\"id\":\"img\",\"type\":\"image\",\"value\":\"u\",\"title\":\"Photo\"}],\"ops\":[{\"id\":\"s\",\"type\":\"segmentation\",\"input\":[\"img\"],\"output\":[\"cup\"],\"params\":{\"prompt\":\"cup\"}}]}}\n```";
    let compiled = CompilerResponse::parse(text).unwrap().into_compiled().unwrap();
    assert_eq!(compiled.thought, "find the cup");
    assert_eq!(compiled.delta.registers.len(), 1);
    assert_eq!(compiled.delta.registers[0].kind, RegisterKind::Image);
    assert_eq!(compiled.delta.ops[0].kind, "segmentation");
    assert_eq!(compiled.delta.ops[0].output, vec!["cup".to_string()]);
}

#[test]
fn compiler_response_requires_thought_and_program() {
    let missing_thought =
        CompilerResponse::parse(r#"{"program":{"registers":[],"ops":[]}}"#).unwrap();
    assert!(matches!(
        missing_thought.into_compiled(),
        Err(AdapterError::MissingField(f)) if f == "thought"
    ));
    let missing_program = CompilerResponse::parse(r#"{"thought":"hmm"}"#).unwrap();
    assert!(matches!(
        missing_program.into_compiled(),
        Err(AdapterError::MissingField(f)) if f == "program"
    ));
    assert!(matches!(
        CompilerResponse::parse("not json"),
        Err(AdapterError::InvalidResponse(_))
    ));
}

#[test]
fn compiler_response_ignores_register_layout_hints() {
    // Canvas layout is the client's concern; a partial position must not reject the program
    let text = r#"{"thought":"find the cup","program":{"registers":[
        {"id":"img","type":"image","title":"Photo","position":{"x":500}}
    ],"ops":[]}}"#;
    let compiled = CompilerResponse::parse(text)
        .unwrap()
        .into_compiled()
        .unwrap();
    assert_eq!(compiled.delta.registers.len(), 1);
    assert_eq!(compiled.delta.registers[0].id, "img");
    assert_eq!(compiled.delta.registers[0].title.as_deref(), Some("Photo"));
}

// ===========================================================================
// Config
// ===========================================================================

#[test]
fn adapter_config_defaults() {
    let fal = FalConfig::default();
    assert_eq!(fal.endpoint, "https://fal.run/fal-ai/sam-3/image");
    assert_eq!(fal.max_masks, 4);
    let gemini = GeminiConfig::default();
    assert_eq!(gemini.compile_model, "gemini-3-pro-preview");
    assert_eq!(gemini.analyze_model, "gemini-1.5-flash");
    assert!(gemini.api_base.starts_with("https://generativelanguage.googleapis.com"));
}

// ===========================================================================
// Fal segmenter
// ===========================================================================

#[tokio::test]
async fn fal_direct_sends_key_and_flags() {
    let (base, captured) = mock_server(
        StatusCode::OK,
        json!({ "image": { "url": "https://fal.media/cup.png" }, "scores": [0.8] }),
    )
    .await;
    let config = FalConfig {
        endpoint: format!("{}/fal-ai/sam-3/image", base),
        ..Default::default()
    };
    let fal = FalSegmenter::new("secret", &config).unwrap();
    let mask = fal.segment("https://img/desk.png", "cup").await.unwrap();
    assert_eq!(mask.url, "https://fal.media/cup.png");
    assert_eq!(mask.score, Some(0.8));

    let reqs = captured.lock().unwrap();
    assert_eq!(reqs.len(), 1);
    assert_eq!(reqs[0].path, "/fal-ai/sam-3/image");
    assert_eq!(reqs[0].headers.get("authorization").unwrap(), "Key secret");
    assert_eq!(reqs[0].body["max_masks"], 4);
    assert_eq!(reqs[0].body["prompt"], "cup");
}

#[tokio::test]
async fn fal_proxy_sends_bare_body() {
    let (base, captured) =
        mock_server(StatusCode::OK, json!({ "image": { "url": "m.png" } })).await;
    let fal = FalSegmenter::via_proxy(format!("{}/", base), &FalConfig::default()).unwrap();
    fal.segment("https://img/desk.png", "lamp").await.unwrap();

    let reqs = captured.lock().unwrap();
    assert_eq!(reqs[0].path, "/fal/proxy");
    assert!(reqs[0].headers.get("authorization").is_none());
    assert_eq!(reqs[0].body, json!({ "image_url": "https://img/desk.png", "prompt": "lamp" }));
}

#[tokio::test]
async fn fal_status_mapping() {
    let (base, _) = mock_server(StatusCode::UNAUTHORIZED, json!({ "error": "bad key" })).await;
    let fal = FalSegmenter::via_proxy(&base, &FalConfig::default()).unwrap();
    assert!(matches!(fal.segment("u", "p").await, Err(AdapterError::AuthFailed(_))));

    let (base, _) =
        mock_server(StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": "boom" })).await;
    let fal = FalSegmenter::via_proxy(&base, &FalConfig::default()).unwrap();
    match fal.segment("u", "p").await {
        Err(AdapterError::RequestFailed(msg)) => assert!(msg.contains("500")),
        other => panic!("Expected RequestFailed, got {:?}", other),
    }
}

#[tokio::test]
async fn fal_success_without_mask_is_missing_field() {
    let (base, _) = mock_server(StatusCode::OK, json!({ "request_id": "queued" })).await;
    let fal = FalSegmenter::via_proxy(&base, &FalConfig::default()).unwrap();
    assert!(matches!(fal.segment("u", "p").await, Err(AdapterError::MissingField(_))));
}

// ===========================================================================
// Gemini client
// ===========================================================================

#[tokio::test]
async fn gemini_direct_uses_model_path_and_key_header() {
    let (base, captured) = mock_server(StatusCode::OK, text_reply("Two cups on a desk.")).await;
    let config = GeminiConfig {
        api_base: base,
        ..Default::default()
    };
    let gemini = GeminiClient::new("gkey", config).unwrap();
    let text = gemini.analyze("Analyze these objects: Cup: image").await.unwrap();
    assert_eq!(text.as_deref(), Some("Two cups on a desk."));

    let reqs = captured.lock().unwrap();
    assert_eq!(reqs[0].path, "/models/gemini-1.5-flash:generateContent");
    assert_eq!(reqs[0].headers.get("x-goog-api-key").unwrap(), "gkey");
    assert!(reqs[0].body.get("model").is_none());
}

#[tokio::test]
async fn gemini_proxy_puts_model_in_body() {
    let (base, captured) = mock_server(StatusCode::OK, text_reply("ok")).await;
    let gemini = GeminiClient::via_proxy(&base, GeminiConfig::default()).unwrap();
    gemini.analyze("hello").await.unwrap();

    let reqs = captured.lock().unwrap();
    assert_eq!(reqs[0].path, "/gemini/proxy");
    assert_eq!(reqs[0].body["model"], "gemini-1.5-flash");
}

#[tokio::test]
async fn gemini_analyze_without_text_is_none() {
    let (base, _) = mock_server(StatusCode::OK, json!({ "candidates": [] })).await;
    let gemini = GeminiClient::via_proxy(&base, GeminiConfig::default()).unwrap();
    assert_eq!(gemini.analyze("hello").await.unwrap(), None);
}

#[tokio::test]
async fn gemini_stylize_returns_inline_image() {
    let reply = json!({ "candidates": [{ "content": { "parts": [
        { "inline_data": { "mime_type": "image/png", "data": "UE5H" } }
    ] } }] });
    let (base, captured) = mock_server(StatusCode::OK, reply).await;
    let gemini = GeminiClient::via_proxy(&base, GeminiConfig::default()).unwrap();
    let image = EncodedImage {
        mime_type: "image/jpeg".into(),
        data: "AAAA".into(),
    };
    let out = gemini.stylize("Edit this image: Red cup", &image).await.unwrap();
    assert_eq!(out.data, "UE5H");

    let reqs = captured.lock().unwrap();
    assert_eq!(reqs[0].body["model"], "gemini-3-pro-image-preview");
    assert_eq!(reqs[0].body["contents"][0]["parts"][1]["inline_data"]["data"], "AAAA");
    assert_eq!(
        reqs[0].body["generation_config"]["response_modalities"],
        json!(["TEXT", "IMAGE"])
    );
}

#[tokio::test]
async fn gemini_stylize_without_image_errors() {
    let (base, _) = mock_server(StatusCode::OK, text_reply("I cannot edit that.")).await;
    let gemini = GeminiClient::via_proxy(&base, GeminiConfig::default()).unwrap();
    let image = EncodedImage {
        mime_type: "image/jpeg".into(),
        data: "AAAA".into(),
    };
    assert!(matches!(
        gemini.stylize("p", &image).await,
        Err(AdapterError::MissingField(_))
    ));
}

#[tokio::test]
async fn gemini_compile_sends_instruction_and_parses_program() {
    let program = json!({
        "thought": "The user wants the cup red.",
        "program": {
            "registers": [
                { "id": "img", "type": "image", "value": "https://img/desk.png", "title": "Desk" },
                { "id": "cup", "type": "image", "title": "Cup" }
            ],
            "ops": [
                {
                    "id": "seg", "type": "segmentation", "input": ["img"], "output": ["cup"],
                    "params": { "prompt": "cup" }
                },
                {
                    "id": "paint", "type": "style", "input": ["cup"], "output": [],
                    "params": { "color": "red" }
                }
            ]
        }
    });
    let fenced = format!("```json\n{}\n```", program);
    let (base, captured) = mock_server(StatusCode::OK, text_reply(&fenced)).await;
    let gemini = GeminiClient::via_proxy(&base, GeminiConfig::default()).unwrap();
    let compiled = gemini.compile("https://img/desk.png", "make the cup red").await.unwrap();
    assert_eq!(compiled.thought, "The user wants the cup red.");
    assert_eq!(compiled.delta.registers.len(), 2);
    assert_eq!(compiled.delta.ops.len(), 2);

    let reqs = captured.lock().unwrap();
    let parts = &reqs[0].body["contents"][0]["parts"];
    assert_eq!(parts[0]["text"], prompt::COMPILER_INSTRUCTION);
    assert_eq!(parts[1]["text"], "User Intent: make the cup red");
    assert_eq!(parts[2]["text"], "Image URL: https://img/desk.png");
    assert_eq!(
        reqs[0].body["generation_config"]["response_mime_type"],
        "application/json"
    );
    assert_eq!(reqs[0].body["model"], "gemini-3-pro-preview");
}

#[tokio::test]
async fn gemini_compile_empty_reply_is_error() {
    let (base, _) = mock_server(StatusCode::OK, json!({ "candidates": [] })).await;
    let gemini = GeminiClient::via_proxy(&base, GeminiConfig::default()).unwrap();
    assert!(gemini.compile("u", "i").await.is_err());
}

#[tokio::test]
async fn gemini_rate_limit_maps() {
    let (base, _) = mock_server(StatusCode::TOO_MANY_REQUESTS, json!({})).await;
    let gemini = GeminiClient::via_proxy(&base, GeminiConfig::default()).unwrap();
    assert!(matches!(gemini.analyze("x").await, Err(AdapterError::RateLimited(_))));
}

// ===========================================================================
// Image encoder
// ===========================================================================

#[tokio::test]
async fn encoder_decodes_data_url_without_network() {
    let encoder = HttpImageEncoder::new(5).unwrap();
    let img = encoder.encode("data:image/webp;base64,UklGRg==").await.unwrap();
    assert_eq!(img.mime_type, "image/webp");
    assert_eq!(img.data, "UklGRg==");
}

#[tokio::test]
async fn encoder_fetches_http_and_uses_content_type() {
    let base = image_server().await;
    let encoder = HttpImageEncoder::new(5).unwrap();
    let img = encoder.encode(&format!("{}/desk.png", base)).await.unwrap();
    assert_eq!(img.mime_type, "image/png");
    assert_eq!(img.data, "AQID");
}

#[tokio::test]
async fn encoder_routes_through_proxy() {
    let (base, captured) = mock_server(StatusCode::OK, json!({})).await;
    let encoder = HttpImageEncoder::new(5).unwrap().with_proxy(&base);
    let img = encoder.encode("https://cdn.example/desk.png").await.unwrap();
    // JSON reply carries no image content type
    assert_eq!(img.mime_type, "image/jpeg");

    let reqs = captured.lock().unwrap();
    assert_eq!(reqs[0].path, "/proxy-image");
    assert!(reqs[0].query.as_deref().unwrap().contains("cdn.example"));
}

#[tokio::test]
async fn encoder_reads_local_file() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("desk.png");
    std::fs::write(&path, [1u8, 2, 3]).unwrap();
    let encoder = HttpImageEncoder::new(5).unwrap();
    let img = encoder.encode(path.to_str().unwrap()).await.unwrap();
    assert_eq!(img.mime_type, "image/png");
    assert_eq!(img.data, "AQID");

    let url = format!("file://{}", path.display());
    assert_eq!(encoder.encode(&url).await.unwrap().data, "AQID");
}

#[tokio::test]
async fn encoder_missing_file_is_encoding_error() {
    let encoder = HttpImageEncoder::new(5).unwrap();
    assert!(matches!(
        encoder.encode("/definitely/not/here.png").await,
        Err(AdapterError::Encoding(_))
    ));
}
