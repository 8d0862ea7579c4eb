//! HTTP adapter tests against a local mock server
//!
//! Exercises the wire behavior of the Sheets source, the publishers and the
//! OpenAI generator: request shapes, envelope unwrapping and error mapping.

use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use smmaker::config::{FusionBrainConfig, OpenAiConfig, SheetsConfig, TelegramConfig, VkConfig};
use smmaker::generator::{ContentGenerator, FusionBrainGenerator, OpenAiGenerator};
use smmaker::models::{GenerationParams, RunSummary, WorkItemStatus};
use smmaker::publisher::{ChannelPublisher, TelegramPublisher, VkPublisher};
use smmaker::source::{ClaimError, ContentSource, SheetsSource};

fn sheets_config(server: &MockServer) -> SheetsConfig {
    SheetsConfig {
        api_base: server.uri(),
        spreadsheet_id: "sheet1".to_string(),
        worksheet: "posts".to_string(),
        token: "token".to_string(),
    }
}

// ============================================================================
// Sheets source
// ============================================================================

#[tokio::test]
async fn test_sheets_claim_transitions_first_pending_row() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/spreadsheets/sheet1/values/posts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "values": [
                ["idea", "status", "prompt_key", "channels"],
                ["already done", "published", "", ""],
                ["write about rust", "pending", "weekly", "vk"],
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    // re-read of the status cell before the transition
    Mock::given(method("GET"))
        .and(path("/spreadsheets/sheet1/values/posts!B3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "values": [["pending"]]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/spreadsheets/sheet1/values/posts!B3"))
        .and(query_param("valueInputOption", "RAW"))
        .and(body_partial_json(json!({ "values": [["processing"]] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let source = SheetsSource::new(sheets_config(&server)).unwrap();
    let item = source.claim_next_pending().await.unwrap();

    assert_eq!(item.row, 3);
    assert_eq!(item.idea, "write about rust");
    assert_eq!(item.prompt_key.as_deref(), Some("weekly"));
    assert_eq!(item.channels, Some(vec!["vk".to_string()]));
}

#[tokio::test]
async fn test_sheets_claim_continues_past_row_claimed_elsewhere() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/spreadsheets/sheet1/values/posts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "values": [
                ["idea", "status"],
                ["write about rust", "pending"],
                ["write about async", "pending"],
            ]
        })))
        .mount(&server)
        .await;

    // another process grabbed row 2 between fetch and re-read
    Mock::given(method("GET"))
        .and(path("/spreadsheets/sheet1/values/posts!B2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "values": [["processing"]]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/spreadsheets/sheet1/values/posts!B3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "values": [["pending"]]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/spreadsheets/sheet1/values/posts!B3"))
        .and(body_partial_json(json!({ "values": [["processing"]] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let source = SheetsSource::new(sheets_config(&server)).unwrap();
    let item = source.claim_next_pending().await.unwrap();

    assert_eq!(item.row, 3);
    assert_eq!(item.idea, "write about async");
}

#[tokio::test]
async fn test_sheets_claim_no_pending_when_every_row_claimed_elsewhere() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/spreadsheets/sheet1/values/posts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "values": [
                ["idea", "status"],
                ["write about rust", "pending"],
            ]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/spreadsheets/sheet1/values/posts!B2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "values": [["processing"]]
        })))
        .mount(&server)
        .await;

    let source = SheetsSource::new(sheets_config(&server)).unwrap();
    let err = source.claim_next_pending().await.unwrap_err();
    assert!(matches!(err, ClaimError::NoPending));
}

#[tokio::test]
async fn test_sheets_claim_no_pending_rows() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/spreadsheets/sheet1/values/posts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "values": [
                ["idea", "status"],
                ["done", "published"],
            ]
        })))
        .mount(&server)
        .await;

    let source = SheetsSource::new(sheets_config(&server)).unwrap();
    assert!(matches!(
        source.claim_next_pending().await.unwrap_err(),
        ClaimError::NoPending
    ));
}

#[tokio::test]
async fn test_sheets_claim_unreachable_source() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/spreadsheets/sheet1/values/posts"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let source = SheetsSource::new(sheets_config(&server)).unwrap();
    assert!(matches!(
        source.claim_next_pending().await.unwrap_err(),
        ClaimError::Source { .. }
    ));
}

#[tokio::test]
async fn test_sheets_finalize_batches_known_columns() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/spreadsheets/sheet1/values/posts!1:1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            // no "scheduled" column: that field is skipped with a warning
            "values": [["idea", "status", "url", "ai", "model", "notes"]]
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/spreadsheets/sheet1/values:batchUpdate"))
        .and(body_partial_json(json!({ "valueInputOption": "RAW" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let source = SheetsSource::new(sheets_config(&server)).unwrap();
    let summary = RunSummary {
        status: WorkItemStatus::Published,
        completed_at: chrono::Utc::now(),
        url: Some("vk_-1_42".to_string()),
        generator: "openai".to_string(),
        model: "gpt-4o".to_string(),
        notes: "tokens=100,cost=0.01".to_string(),
    };
    source.finalize(3, &summary).await.unwrap();
}

// ============================================================================
// Telegram publisher
// ============================================================================

fn telegram_config(server: &MockServer) -> TelegramConfig {
    TelegramConfig {
        enabled: true,
        token: "token".to_string(),
        chat_id: "@chan".to_string(),
        api_base: server.uri(),
    }
}

#[tokio::test]
async fn test_telegram_publish_sanitizes_and_builds_url() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/bottoken/getChat"))
        .and(query_param("chat_id", "@chan"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": { "username": "chan" }
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/bottoken/sendMessage"))
        .and(body_partial_json(json!({
            "chat_id": "@chan",
            "text": "*bold* post",
            "parse_mode": "Markdown",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": { "message_id": 77 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let publisher = TelegramPublisher::new(telegram_config(&server)).unwrap();
    let url = publisher.publish("**bold** post", None).await.unwrap();
    assert_eq!(url, "https://t.me/chan/77");
}

#[tokio::test]
async fn test_telegram_publish_requires_public_username() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/bottoken/getChat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": {}
        })))
        .mount(&server)
        .await;

    let publisher = TelegramPublisher::new(telegram_config(&server)).unwrap();
    let err = publisher.publish("text", None).await.unwrap_err();
    assert!(err.reason.contains("username"));
}

#[tokio::test]
async fn test_telegram_api_error_is_reported() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/bottoken/getChat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": false,
            "description": "Unauthorized"
        })))
        .mount(&server)
        .await;

    let publisher = TelegramPublisher::new(telegram_config(&server)).unwrap();
    let err = publisher.publish("text", None).await.unwrap_err();
    assert_eq!(err.channel, "telegram");
    assert!(err.reason.contains("Unauthorized"));
}

// ============================================================================
// VK publisher
// ============================================================================

fn vk_config(server: &MockServer) -> VkConfig {
    VkConfig {
        enabled: true,
        token: "token".to_string(),
        owner_id: -123,
        api_base: server.uri(),
    }
}

#[tokio::test]
async fn test_vk_text_only_post() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/wall.post"))
        .and(query_param("access_token", "token"))
        .and(query_param("v", "5.131"))
        .and(query_param("owner_id", "-123"))
        .and(query_param("from_group", "1"))
        .and(query_param("message", "hello wall"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": { "post_id": 42 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let publisher = VkPublisher::new(vk_config(&server)).unwrap();
    let post_id = publisher.publish("hello wall", None).await.unwrap();
    assert_eq!(post_id, "-123_42");
}

#[tokio::test]
async fn test_vk_api_error_envelope() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/wall.post"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": { "error_code": 214, "error_msg": "Access to adding post denied" }
        })))
        .mount(&server)
        .await;

    let publisher = VkPublisher::new(vk_config(&server)).unwrap();
    let err = publisher.publish("hello", None).await.unwrap_err();
    assert_eq!(err.channel, "vk");
    assert!(err.reason.contains("214"));
    assert!(err.reason.contains("denied"));
}

// ============================================================================
// FusionBrain generator
// ============================================================================

fn fusionbrain_config(server: &MockServer) -> FusionBrainConfig {
    FusionBrainConfig {
        api_base: server.uri(),
        api_key: "key".to_string(),
        secret_key: "secret".to_string(),
    }
}

#[tokio::test]
async fn test_fusionbrain_image_generation_base64_result() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/key/api/v1/pipelines"))
        .and(wiremock::matchers::header("X-Key", "Key key"))
        .and(wiremock::matchers::header("X-Secret", "Secret secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "pipe-1" },
            { "id": "pipe-2" }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/key/api/v1/pipeline/run"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "uuid": "task-7"
        })))
        .expect(1)
        .mount(&server)
        .await;

    // "aGVsbG8=" decodes to "hello"
    Mock::given(method("GET"))
        .and(path("/key/api/v1/pipeline/status/task-7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "DONE",
            "result": { "files": ["data:image/png;base64,aGVsbG8="] }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let generator = FusionBrainGenerator::new(fusionbrain_config(&server)).unwrap();
    let image = generator.generate_image("a sunrise", "any").await.unwrap();
    assert_eq!(&image[..], b"hello");
}

#[tokio::test]
async fn test_fusionbrain_image_generation_url_result() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/key/api/v1/pipelines"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": "pipe-1" }])))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/key/api/v1/pipeline/run"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "uuid": "task-8" })))
        .mount(&server)
        .await;

    let file_url = format!("{}/generated/task-8.jpg", server.uri());
    Mock::given(method("GET"))
        .and(path("/key/api/v1/pipeline/status/task-8"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "DONE",
            "result": { "files": [file_url] }
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/generated/task-8.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"jpeg-bytes".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let generator = FusionBrainGenerator::new(fusionbrain_config(&server)).unwrap();
    let image = generator.generate_image("a sunset", "any").await.unwrap();
    assert_eq!(&image[..], b"jpeg-bytes");
}

#[tokio::test]
async fn test_fusionbrain_failed_task_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/key/api/v1/pipelines"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": "pipe-1" }])))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/key/api/v1/pipeline/run"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "uuid": "task-9" })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/key/api/v1/pipeline/status/task-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "FAIL" })))
        .mount(&server)
        .await;

    let generator = FusionBrainGenerator::new(fusionbrain_config(&server)).unwrap();
    let err = generator.generate_image("a storm", "any").await.unwrap_err();
    assert!(err.to_string().contains("task failed"));
}

// ============================================================================
// OpenAI generator
// ============================================================================

#[tokio::test]
async fn test_openai_text_generation() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({
            "model": "gpt-4o",
            "messages": [{ "role": "user", "content": "write a post" }],
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "content": "a fine post" } }],
            "usage": { "total_tokens": 123 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let generator = OpenAiGenerator::new(OpenAiConfig {
        api_base: server.uri(),
        api_key: "key".to_string(),
        model: "gpt-4o".to_string(),
        temperature: 0.7,
    })
    .unwrap();

    let result = generator
        .generate_text(
            "write a post",
            &GenerationParams {
                model: "gpt-4o".to_string(),
                temperature: 0.7,
            },
        )
        .await
        .unwrap();

    assert_eq!(result.text, "a fine post");
    assert_eq!(result.tokens, 123);
    assert!(result.cost > 0.0);
}

#[tokio::test]
async fn test_openai_empty_completion_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": []
        })))
        .mount(&server)
        .await;

    let generator = OpenAiGenerator::new(OpenAiConfig {
        api_base: server.uri(),
        api_key: "key".to_string(),
        model: "gpt-4o".to_string(),
        temperature: 0.7,
    })
    .unwrap();

    let err = generator
        .generate_text(
            "prompt",
            &GenerationParams {
                model: "gpt-4o".to_string(),
                temperature: 0.7,
            },
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("empty completion"));
}
