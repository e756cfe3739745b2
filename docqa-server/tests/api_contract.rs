use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use docqa_rag::{
    EmbeddingProvider, FALLBACK_ANSWER, GenerationProvider, InMemoryDocumentStore, PromptPayload,
    RagError, RetrievalOrchestrator,
};
use docqa_server::{AppState, app_router, protocol::AskResponse};
use reqwest::multipart::{Form, Part};
use serde_json::{Value, json};

const VOCAB: [&str; 5] = ["vacation", "days", "paid", "refund", "france"];
const HANDBOOK: &str = "Employees are entitled to 15 days of paid vacation per year.";

struct KeywordEmbedder;

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    async fn embed(&self, text: &str) -> docqa_rag::Result<Vec<f32>> {
        let lower = text.to_lowercase();
        Ok(VOCAB.iter().map(|word| if lower.contains(word) { 1.0 } else { -1.0 }).collect())
    }

    fn dimensions(&self) -> usize {
        VOCAB.len()
    }

    fn name(&self) -> &str {
        "keyword"
    }
}

#[derive(Default)]
struct FixedGenerator {
    down: AtomicBool,
}

#[async_trait]
impl GenerationProvider for FixedGenerator {
    async fn generate(&self, _payload: &PromptPayload) -> docqa_rag::Result<String> {
        if self.down.load(Ordering::SeqCst) {
            return Err(RagError::GenerationUnavailable {
                provider: "fixed".into(),
                message: "503 Service Unavailable".into(),
            });
        }
        Ok(json!({
            "answer": "You get 15 days of paid vacation per year.",
            "sources": [{"documentName": "handbook.txt", "snippet": "15 days of paid vacation"}]
        })
        .to_string())
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

struct TestServer {
    base: String,
    client: reqwest::Client,
    generator: Arc<FixedGenerator>,
    handle: tokio::task::JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn spawn_server() -> TestServer {
    let generator = Arc::new(FixedGenerator::default());
    let orchestrator = RetrievalOrchestrator::builder()
        .embedding_provider(Arc::new(KeywordEmbedder))
        .generation_provider(generator.clone())
        .store(Arc::new(InMemoryDocumentStore::new()))
        .build()
        .expect("orchestrator");
    let app = app_router(AppState::new(Arc::new(orchestrator)));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind test listener");
    let addr = listener.local_addr().expect("listener addr");
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server run");
    });

    TestServer {
        base: format!("http://{}", addr),
        client: reqwest::Client::new(),
        generator,
        handle,
    }
}

impl TestServer {
    async fn upload(&self, name: &str, bytes: Vec<u8>) -> reqwest::Response {
        let form = Form::new().part("file", Part::bytes(bytes).file_name(name.to_string()));
        self.client
            .post(format!("{}/api/documents/upload", self.base))
            .multipart(form)
            .send()
            .await
            .expect("upload response")
    }

    async fn ask(&self, question: &str) -> reqwest::Response {
        self.client
            .post(format!("{}/api/ask", self.base))
            .json(&json!({ "question": question }))
            .send()
            .await
            .expect("ask response")
    }
}

#[tokio::test]
async fn root_describes_the_api() {
    let server = spawn_server().await;
    let body: Value = server
        .client
        .get(format!("{}/api/", server.base))
        .send()
        .await
        .expect("root response")
        .json()
        .await
        .expect("root json");
    assert_eq!(body["message"], "Private Knowledge Q&A API");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn upload_ask_and_delete_round_trip() {
    let server = spawn_server().await;

    let upload = server.upload("handbook.txt", HANDBOOK.as_bytes().to_vec()).await;
    assert_eq!(upload.status(), 200);
    let uploaded: Value = upload.json().await.expect("upload json");
    assert_eq!(uploaded["name"], "handbook.txt");
    assert_eq!(uploaded["chunk_count"], 1);
    let id = uploaded["id"].as_str().expect("id field").to_string();

    let listed: Value = server
        .client
        .get(format!("{}/api/documents", server.base))
        .send()
        .await
        .expect("list response")
        .json()
        .await
        .expect("list json");
    assert_eq!(listed["count"], 1);
    assert_eq!(listed["documents"][0]["id"], id.as_str());
    assert!(listed["documents"][0].get("text").is_none());

    let document: Value = server
        .client
        .get(format!("{}/api/documents/{}", server.base, id))
        .send()
        .await
        .expect("get response")
        .json()
        .await
        .expect("document json");
    assert_eq!(document["text"], HANDBOOK);

    let ask = server.ask("How many vacation days do I get?").await;
    assert_eq!(ask.status(), 200);
    let answer: AskResponse = ask.json().await.expect("ask json");
    assert!(answer.answer.contains("15 days"));
    assert_eq!(answer.sources.len(), 1);
    assert_eq!(answer.sources[0].document_id.as_deref(), Some(id.as_str()));
    assert_eq!(answer.sources[0].chunk_index, Some(0));
    assert_eq!(answer.confidence.to_string(), "high");

    let deleted: Value = server
        .client
        .delete(format!("{}/api/documents/{}", server.base, id))
        .send()
        .await
        .expect("delete response")
        .json()
        .await
        .expect("delete json");
    assert_eq!(deleted["deleted"], true);
    assert_eq!(deleted["deleted_chunks"], 1);

    let missing = server
        .client
        .get(format!("{}/api/documents/{}", server.base, id))
        .send()
        .await
        .expect("get response");
    assert_eq!(missing.status(), 404);
    let body: Value = missing.json().await.expect("error json");
    assert_eq!(body["error"], "document_not_found");
}

#[tokio::test]
async fn ask_without_documents_is_not_found() {
    let server = spawn_server().await;

    let response = server.ask("How many vacation days do I get?").await;
    assert_eq!(response.status(), 404);
    let body: Value = response.json().await.expect("error json");
    assert_eq!(body["error"], "no_corpus");
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn blank_question_is_a_bad_request() {
    let server = spawn_server().await;
    server.upload("handbook.txt", HANDBOOK.as_bytes().to_vec()).await;

    let response = server.ask("   ").await;
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.expect("error json");
    assert_eq!(body["error"], "empty_question");
}

#[tokio::test]
async fn unrelated_question_gets_the_fallback_answer() {
    let server = spawn_server().await;
    server.upload("handbook.txt", HANDBOOK.as_bytes().to_vec()).await;

    let response = server.ask("What is the capital of France?").await;
    assert_eq!(response.status(), 200);
    let answer: AskResponse = response.json().await.expect("ask json");
    assert_eq!(answer.answer, FALLBACK_ANSWER);
    assert!(answer.sources.is_empty());
    assert_eq!(answer.confidence.to_string(), "low");
    assert_eq!(answer.confidence_score, 0.0);
}

#[tokio::test]
async fn generator_outage_is_service_unavailable() {
    let server = spawn_server().await;
    server.upload("handbook.txt", HANDBOOK.as_bytes().to_vec()).await;
    server.generator.down.store(true, Ordering::SeqCst);

    let response = server.ask("How many vacation days do I get?").await;
    assert_eq!(response.status(), 503);
    let body: Value = response.json().await.expect("error json");
    assert_eq!(body["error"], "generation_unavailable");
}

#[tokio::test]
async fn rejects_blank_and_binary_uploads() {
    let server = spawn_server().await;

    let blank = server.upload("empty.txt", b"  \n ".to_vec()).await;
    assert_eq!(blank.status(), 400);
    let body: Value = blank.json().await.expect("error json");
    assert_eq!(body["error"], "empty_document");

    let binary = server.upload("image.png", vec![0xff, 0xfe, 0x00, 0x89]).await;
    assert_eq!(binary.status(), 400);
    let body: Value = binary.json().await.expect("error json");
    assert_eq!(body["error"], "invalid_request");
}

#[tokio::test]
async fn health_reports_counts() {
    let server = spawn_server().await;
    server.upload("handbook.txt", HANDBOOK.as_bytes().to_vec()).await;

    let body: Value = server
        .client
        .get(format!("{}/api/health", server.base))
        .send()
        .await
        .expect("health response")
        .json()
        .await
        .expect("health json");
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], "connected");
    assert_eq!(body["llm"], "connected");
    assert_eq!(body["documents_count"], 1);
    assert_eq!(body["chunks_count"], 1);
}
