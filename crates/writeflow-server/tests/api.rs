use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use futures::stream;
use serde_json::{Value, json};
use tower::ServiceExt;
use writeflow_ai_harness::{
    Credential, GeneratedImage, GenerationRequest, GenerationResult, Harness, ImageRequest,
    ProviderAdapter, ProviderError, ProviderEvent, ProviderId, ProviderStreamHandle, TokenUsage,
};
use tokio::sync::Notify;
use writeflow_core::collaborators::{
    InMemoryRecorder, MemoryCredentialStore, MemoryRecord, RunRecorder, StaticWorkflowStore,
    UsageRecord,
};
use writeflow_core::{OrchestratorSettings, PipelineError, RunComplete};
use writeflow_server::{AppState, build_app};

const PNG: [u8; 4] = [0x89, b'P', b'N', b'G'];

const USAGE: TokenUsage = TokenUsage {
    input_tokens: 12,
    cached_input_tokens: 0,
    output_tokens: 8,
    total_tokens: 20,
};

/// Vendor double answering every call with the same text.
struct FakeVendor {
    id: &'static str,
    reply: &'static str,
    fail_status: Option<u16>,
    model_lists: AtomicUsize,
}

impl FakeVendor {
    fn new(id: &'static str, reply: &'static str) -> Arc<Self> {
        Arc::new(Self {
            id,
            reply,
            fail_status: None,
            model_lists: AtomicUsize::new(0),
        })
    }

    fn failing(id: &'static str, status: u16) -> Arc<Self> {
        Arc::new(Self {
            id,
            reply: "",
            fail_status: Some(status),
            model_lists: AtomicUsize::new(0),
        })
    }

    fn check(&self) -> Result<(), ProviderError> {
        match self.fail_status {
            Some(status) => Err(ProviderError::provider(
                self.id,
                format!("{} rejected the request", self.id),
                Some(status),
            )),
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for FakeVendor {
    fn id(&self) -> ProviderId {
        ProviderId::new(self.id)
    }

    async fn generate(&self, _req: &GenerationRequest) -> Result<GenerationResult, ProviderError> {
        self.check()?;
        Ok(GenerationResult {
            text: self.reply.to_string(),
            usage: USAGE,
            finish_reason: Some("stop".into()),
        })
    }

    async fn start_stream(
        &self,
        _req: &GenerationRequest,
    ) -> Result<ProviderStreamHandle, ProviderError> {
        self.check()?;
        let mut events: Vec<Result<ProviderEvent, ProviderError>> = self
            .reply
            .split_inclusive(' ')
            .map(|word| Ok(ProviderEvent::TextDelta { text: word.to_string() }))
            .collect();
        events.push(Ok(ProviderEvent::Completed {
            text: None,
            usage: USAGE,
            finish_reason: Some("stop".into()),
        }));
        Ok(ProviderStreamHandle::new(Box::pin(stream::iter(events))))
    }

    async fn list_models(&self, _credential: &Credential) -> Result<Vec<String>, ProviderError> {
        self.model_lists.fetch_add(1, Ordering::SeqCst);
        Ok(vec!["gpt-4o".into(), "gpt-4o-mini".into(), "dall-e-3".into()])
    }

    async fn generate_image(&self, _req: &ImageRequest) -> Result<GeneratedImage, ProviderError> {
        self.check()?;
        Ok(GeneratedImage {
            bytes: PNG.to_vec(),
            mime_type: "image/png".into(),
            revised_prompt: None,
        })
    }
}

/// Recorder whose usage write stalls until long after the client is gone.
struct SlowRecorder {
    inner: InMemoryRecorder,
    usage_started: Notify,
}

#[async_trait::async_trait]
impl RunRecorder for SlowRecorder {
    async fn save_history(&self, run: &RunComplete) -> Result<(), PipelineError> {
        self.inner.save_history(run).await
    }

    async fn save_usage(&self, usage: &UsageRecord) -> Result<(), PipelineError> {
        self.usage_started.notify_one();
        tokio::time::sleep(Duration::from_millis(100)).await;
        self.inner.save_usage(usage).await
    }

    async fn save_memory(&self, memory: &MemoryRecord) -> Result<(), PipelineError> {
        self.inner.save_memory(memory).await
    }
}

fn app(
    vendor: Arc<FakeVendor>,
    credentials: MemoryCredentialStore,
    workflows: StaticWorkflowStore,
) -> Router {
    app_with_recorder(vendor, credentials, workflows, Arc::new(InMemoryRecorder::new()))
}

fn app_with_recorder(
    vendor: Arc<FakeVendor>,
    credentials: MemoryCredentialStore,
    workflows: StaticWorkflowStore,
    recorder: Arc<dyn RunRecorder>,
) -> Router {
    let harness = Harness::builder()
        .register_provider(vendor)
        .build()
        .expect("harness");
    let state = AppState::new(
        harness,
        credentials,
        workflows,
        recorder,
        OrchestratorSettings::default(),
        Duration::from_secs(600),
    );
    build_app(Arc::new(state))
}

fn openai_app(vendor: Arc<FakeVendor>) -> Router {
    app(
        vendor,
        MemoryCredentialStore::new().with_key("openai", "sk-test"),
        StaticWorkflowStore::default(),
    )
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> Response {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            request = request.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    app.clone()
        .oneshot(request.body(body).expect("request"))
        .await
        .expect("response")
}

async fn body_bytes(response: Response) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body")
        .to_vec()
}

async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).expect("json body")
}

/// Reads a finished SSE body into `(event, data)` pairs.
async fn events(response: Response) -> Vec<(String, Value)> {
    let body = String::from_utf8(body_bytes(response).await).expect("utf8");
    body.split("\n\n")
        .filter(|block| !block.trim().is_empty())
        .map(|block| {
            let mut lines = block.lines();
            let name = lines
                .next()
                .and_then(|l| l.strip_prefix("event: "))
                .expect("event line");
            let data = lines
                .next()
                .and_then(|l| l.strip_prefix("data: "))
                .expect("data line");
            (
                name.to_string(),
                serde_json::from_str::<Value>(data).expect("event data"),
            )
        })
        .collect()
}

fn names(events: &[(String, Value)]) -> Vec<&str> {
    events.iter().map(|(name, _)| name.as_str()).collect()
}

fn streamed_text(events: &[(String, Value)]) -> String {
    events
        .iter()
        .filter(|(name, _)| name == "token")
        .filter_map(|(_, data)| data["chunk"].as_str())
        .collect()
}

fn blog_request() -> Value {
    json!({ "input": { "contentType": "blog", "topic": "Rust ownership", "tone": "friendly" } })
}

#[tokio::test]
async fn generate_streams_a_single_stage_run() {
    let app = openai_app(FakeVendor::new("openai", "Ownership keeps memory safe."));
    let response = send(&app, "POST", "/api/generate", Some(blog_request())).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/event-stream"
    );
    let events = events(response).await;
    let names = names(&events);
    assert_eq!(names.first(), Some(&"stage-start"));
    assert_eq!(&names[names.len() - 2..], ["stage-complete", "run-complete"]);
    assert_eq!(streamed_text(&events), "Ownership keeps memory safe.");

    let start = &events[0].1;
    assert_eq!(start["stageIndex"], 0);
    assert_eq!(start["totalStages"], 1);
    let complete = &events[events.len() - 1].1;
    assert_eq!(complete["output"]["content"], "Ownership keeps memory safe.");
    assert_eq!(complete["output"]["provider"], "openai");
    assert_eq!(complete["output"]["model"], "gpt-4o-mini");
    assert!(complete["output"].get("agentPipeline").is_none());
    assert_eq!(complete["input"]["topic"], "Rust ownership");
}

#[tokio::test]
async fn missing_credential_is_a_json_error_before_streaming() {
    let app = app(
        FakeVendor::new("openai", "unused"),
        MemoryCredentialStore::new(),
        StaticWorkflowStore::default(),
    );
    let response = send(&app, "POST", "/api/generate", Some(blog_request())).await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/json"
    );
    let body = body_json(response).await;
    assert_eq!(body["class"], "configuration");
    assert!(body["message"].as_str().is_some_and(|m| !m.is_empty()));
    assert!(body.get("detail").is_none());
}

#[tokio::test]
async fn unknown_workflow_and_blank_topic_are_rejected() {
    let app = openai_app(FakeVendor::new("openai", "unused"));

    let mut request = blog_request();
    request["workflowId"] = json!("does-not-exist");
    let response = send(&app, "POST", "/api/generate", Some(request)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let blank = json!({ "input": { "contentType": "blog", "topic": "  " } });
    let response = send(&app, "POST", "/api/generate", Some(blank)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn vendor_failure_after_stream_opens_is_one_error_event() {
    let app = openai_app(FakeVendor::failing("openai", 429));
    let response = send(&app, "POST", "/api/generate", Some(blog_request())).await;

    assert_eq!(response.status(), StatusCode::OK);
    let events = events(response).await;
    assert_eq!(names(&events), ["stage-start", "error"]);
    assert_eq!(events[1].1["class"], "retry-later");
}

#[tokio::test]
async fn sync_generate_returns_the_run_complete_payload() {
    let app = openai_app(FakeVendor::new("openai", "A short answer."));
    let response = send(&app, "POST", "/api/generate/sync", Some(blog_request())).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["output"]["content"], "A short answer.");
    assert_eq!(body["output"]["tokenUsage"]["totalTokens"], 20);
    assert!(body["id"].as_str().is_some());
}

#[tokio::test]
async fn sync_client_disconnect_does_not_cut_persistence_short() {
    let recorder = Arc::new(SlowRecorder {
        inner: InMemoryRecorder::new(),
        usage_started: Notify::new(),
    });
    let app = app_with_recorder(
        FakeVendor::new("openai", "A short answer."),
        MemoryCredentialStore::new().with_key("openai", "sk-test"),
        StaticWorkflowStore::default(),
        recorder.clone(),
    );
    let request = Request::builder()
        .method("POST")
        .uri("/api/generate/sync")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(blog_request().to_string()))
        .expect("request");

    // The client hangs up while usage is being written.
    tokio::select! {
        _ = app.clone().oneshot(request) => panic!("response arrived before usage was saved"),
        _ = recorder.usage_started.notified() => {}
    }

    let saved = async {
        while recorder.inner.memories().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(2), saved)
        .await
        .expect("run persisted after the disconnect");
    assert_eq!(recorder.inner.history().len(), 1);
    assert_eq!(recorder.inner.usage().len(), 1);
    assert_eq!(recorder.inner.memories().len(), 1);
}

#[tokio::test]
async fn code_requests_run_as_a_code_stage() {
    let app = openai_app(FakeVendor::new("openai", "fn main() {}"));
    let request = json!({ "prompt": "An empty program", "language": "rust" });
    let response = send(&app, "POST", "/api/code", Some(request)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let events = events(response).await;
    assert_eq!(events[0].1["stageShape"], "code");
    assert_eq!(streamed_text(&events), "fn main() {}");
    let (name, complete) = &events[events.len() - 1];
    assert_eq!(name, "run-complete");
    assert_eq!(complete["output"]["provider"], "openai");
}

#[tokio::test]
async fn chat_streams_between_chat_start_and_chat_complete() {
    let app = openai_app(FakeVendor::new("openai", "Happy to help."));
    let request = json!({ "content": "Can you help?" });
    let response = send(&app, "POST", "/api/chat", Some(request)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let events = events(response).await;
    let names = names(&events);
    assert_eq!(names.first(), Some(&"chat-start"));
    assert_eq!(names.last(), Some(&"chat-complete"));
    assert_eq!(events[0].1["provider"], "openai");
    assert_eq!(streamed_text(&events), "Happy to help.");
    assert_eq!(events[events.len() - 1].1["content"], "Happy to help.");

    let blank = send(&app, "POST", "/api/chat", Some(json!({ "content": "" }))).await;
    assert_eq!(blank.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn credential_updates_refresh_the_model_catalog() {
    let vendor = FakeVendor::new("openai", "unused");
    let app = app(
        vendor.clone(),
        MemoryCredentialStore::new(),
        StaticWorkflowStore::default(),
    );

    let listed = body_json(send(&app, "GET", "/api/models", None).await).await;
    assert_eq!(listed["providers"], json!([]));

    let put = send(
        &app,
        "PUT",
        "/api/credentials/openai",
        Some(json!({ "apiKey": "sk-one" })),
    )
    .await;
    assert_eq!(put.status(), StatusCode::NO_CONTENT);

    let listed = body_json(send(&app, "GET", "/api/models", None).await).await;
    assert_eq!(listed["providers"][0]["provider"], "openai");
    assert_eq!(
        listed["providers"][0]["models"],
        json!(["dall-e-3", "gpt-4o", "gpt-4o-mini"])
    );
    send(&app, "GET", "/api/models", None).await;
    assert_eq!(vendor.model_lists.load(Ordering::SeqCst), 1);

    send(
        &app,
        "PUT",
        "/api/credentials/openai",
        Some(json!({ "apiKey": "sk-two" })),
    )
    .await;
    send(&app, "GET", "/api/models", None).await;
    assert_eq!(vendor.model_lists.load(Ordering::SeqCst), 2);

    send(
        &app,
        "PUT",
        "/api/credentials/openai",
        Some(json!({ "apiKey": "" })),
    )
    .await;
    let listed = body_json(send(&app, "GET", "/api/models", None).await).await;
    assert_eq!(listed["providers"], json!([]));
}

#[tokio::test]
async fn credentials_for_unregistered_vendors_are_rejected() {
    let app = openai_app(FakeVendor::new("openai", "unused"));
    let response = send(
        &app,
        "PUT",
        "/api/credentials/acme",
        Some(json!({ "apiKey": "sk" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn image_stage_output_is_served_from_the_blob_route() {
    let workflows = StaticWorkflowStore::from_json(
        r#"[{
            "id": "illustrated",
            "name": "Illustrated post",
            "stages": [
                { "agent": { "id": "writer", "name": "Writer", "icon": "✍️" }, "shape": "text" },
                { "agent": { "id": "illustrator", "name": "Illustrator", "icon": "🎨" }, "shape": "image" }
            ]
        }]"#,
    )
    .expect("workflows");
    let app = app(
        FakeVendor::new("openai", "a lighthouse at dusk"),
        MemoryCredentialStore::new().with_key("openai", "sk-test"),
        workflows,
    );

    let mut request = blog_request();
    request["workflowId"] = json!("illustrated");
    let body = body_json(send(&app, "POST", "/api/generate/sync", Some(request)).await).await;
    assert_eq!(body["workflowName"], "Illustrated post");
    assert_eq!(body["output"]["agentPipeline"].as_array().map(Vec::len), Some(2));
    assert_eq!(body["output"]["model"], "dall-e-3");

    let content = body["output"]["content"].as_str().expect("content");
    let start = content.find("](").expect("markdown link") + 2;
    let end = start + content[start..].find(')').expect("link end");
    let url = &content[start..end];
    assert!(url.starts_with("/api/blobs/"));

    let image = send(&app, "GET", url, None).await;
    assert_eq!(image.status(), StatusCode::OK);
    assert_eq!(image.headers()[header::CONTENT_TYPE], "image/png");
    assert_eq!(body_bytes(image).await, PNG);

    let missing = send(&app, "GET", "/api/blobs/nothing.png", None).await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_answers_ok() {
    let app = openai_app(FakeVendor::new("openai", "unused"));
    let response = send(&app, "GET", "/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"ok");
}
