//! HTTP boundary tests: real router on an ephemeral port, fake providers.

use std::fs;
use std::sync::Arc;

use serde_json::{json, Value};
use tempfile::TempDir;

use file_finder::config::Config;
use file_finder::embedding::{EmbedError, Embedder, EmbedderRegistry};
use file_finder::engine::Engine;
use file_finder::llm::{LanguageModel, LlmError, Prompt};
use file_finder::models::LlmTarget;
use file_finder::server;

/// Embeds text as counts of marker words, in the order given.
struct MarkerEmbedder {
    name: &'static str,
    markers: [&'static str; 2],
}

const MARKERS: MarkerEmbedder = MarkerEmbedder {
    name: "markers",
    markers: ["apple", "rocket"],
};

const REVERSED_MARKERS: MarkerEmbedder = MarkerEmbedder {
    name: "markers-reversed",
    markers: ["rocket", "apple"],
};

impl Embedder for MarkerEmbedder {
    fn model_name(&self) -> &str {
        self.name
    }

    fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(texts
            .iter()
            .map(|t| {
                self.markers
                    .iter()
                    .map(|m| t.matches(m).count() as f32)
                    .collect()
            })
            .collect())
    }
}

/// Answers with the model name; only "llama3.1:8b" is served.
struct NamedModel;

impl LanguageModel for NamedModel {
    fn generate(&self, prompt: &Prompt, target: &LlmTarget) -> Result<String, LlmError> {
        Ok(format!("{} says: {}", target.model, prompt.user.len()))
    }

    fn test_connection(&self, target: &LlmTarget) -> Result<(), LlmError> {
        if target.model == "llama3.1:8b" {
            Ok(())
        } else {
            Err(LlmError::ModelNotFound(target.model.clone()))
        }
    }
}

async fn spawn_server() -> String {
    let embedders = EmbedderRegistry::new(
        Arc::new(MARKERS),
        Box::new(|model: &str| match model {
            "markers-reversed" => Ok(Arc::new(REVERSED_MARKERS) as Arc<dyn Embedder>),
            other => anyhow::bail!("unknown model {}", other),
        }),
    );
    let engine = Arc::new(Engine::with_embedders(
        &Config::minimal(),
        embedders,
        Arc::new(NamedModel),
    ));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, server::router(engine)).await.unwrap();
    });
    format!("http://{}", addr)
}

fn corpus() -> TempDir {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("a.txt"), "apple pie").unwrap();
    fs::write(tmp.path().join("b.txt"), "rocket engine").unwrap();
    tmp
}

async fn post(base: &str, route: &str, body: Value) -> (u16, Value) {
    let response = reqwest::Client::new()
        .post(format!("{}{}", base, route))
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = response.status().as_u16();
    (status, response.json().await.unwrap())
}

async fn get(base: &str, route: &str) -> Value {
    reqwest::get(format!("{}{}", base, route))
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn health_reports_version() {
    let base = spawn_server().await;
    let body = get(&base, "/health").await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test(flavor = "multi_thread")]
async fn search_before_initialize_is_not_ready() {
    let base = spawn_server().await;
    assert_eq!(get(&base, "/status").await["state"], "uninitialized");

    let (status, body) = post(&base, "/search", json!({ "query": "apple" })).await;
    assert_eq!(status, 409);
    assert_eq!(body["error"]["code"], "not_ready");
}

#[tokio::test(flavor = "multi_thread")]
async fn initialize_then_search() {
    let base = spawn_server().await;
    let tmp = corpus();

    let (status, body) = post(
        &base,
        "/initialize",
        json!({ "root_dir": tmp.path() }),
    )
    .await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["state"], "ready");
    assert_eq!(body["document_count"], 2);
    assert_eq!(body["build_id"], 1);

    let (status, body) = post(
        &base,
        "/search",
        json!({ "query": "apple", "num_results": 5 }),
    )
    .await;
    assert_eq!(status, 200);
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["rank"], 1);
    assert!(results[0]["document"]["path"]
        .as_str()
        .unwrap()
        .ends_with("a.txt"));
    assert_eq!(results[0]["document"]["kind"], "file");
    assert!(results[0]["score"].as_f64().unwrap() > results[1]["score"].as_f64().unwrap());
}

#[tokio::test(flavor = "multi_thread")]
async fn bad_inputs_map_to_400() {
    let base = spawn_server().await;

    let (status, body) = post(
        &base,
        "/initialize",
        json!({ "root_dir": "/definitely/not/a/dir" }),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "invalid_root");

    let tmp = corpus();
    post(&base, "/initialize", json!({ "root_dir": tmp.path() })).await;
    let (status, body) = post(
        &base,
        "/search",
        json!({ "query": "apple", "num_results": 0 }),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "bad_request");

    let (status, body) = post(&base, "/summarize", json!({})).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test(flavor = "multi_thread")]
async fn summarize_and_chat_share_one_route() {
    let base = spawn_server().await;
    let tmp = corpus();

    let (status, body) = post(
        &base,
        "/summarize",
        json!({ "message": "hello", "ollama_model": "mistral" }),
    )
    .await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["summary"], "mistral says: 5");

    let (status, body) = post(
        &base,
        "/summarize",
        json!({ "file_path": tmp.path().join("a.txt") }),
    )
    .await;
    assert_eq!(status, 200, "{}", body);
    assert!(body["summary"].as_str().unwrap().starts_with("llama3.1:8b says:"));

    let (status, body) = post(
        &base,
        "/summarize",
        json!({ "file_path": tmp.path().join("missing.txt") }),
    )
    .await;
    assert_eq!(status, 422);
    assert_eq!(body["error"]["code"], "extraction_failed");
}

#[tokio::test(flavor = "multi_thread")]
async fn initialize_records_llm_settings_and_can_verify_them() {
    let base = spawn_server().await;
    let tmp = corpus();

    // The model is checked unless the caller opts out.
    let (status, body) = post(
        &base,
        "/initialize",
        json!({ "root_dir": tmp.path(), "ollama_model": "phi3" }),
    )
    .await;
    assert_eq!(status, 502);
    assert_eq!(body["error"]["code"], "llm_unavailable");
    assert_eq!(get(&base, "/status").await["state"], "uninitialized");

    let (status, _) = post(
        &base,
        "/initialize",
        json!({ "root_dir": tmp.path(), "ollama_model": "qwen2", "verify_llm": false }),
    )
    .await;
    assert_eq!(status, 200);
    let (_, body) = post(&base, "/summarize", json!({ "message": "hi" })).await;
    assert_eq!(body["summary"], "qwen2 says: 2");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_connection_route() {
    let base = spawn_server().await;

    let (status, body) = post(&base, "/test-connection", json!({})).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "success");

    let (status, body) = post(&base, "/test-connection", json!({ "model": "phi3" })).await;
    assert_eq!(status, 502);
    assert_eq!(body["error"]["code"], "llm_unavailable");
}

#[tokio::test(flavor = "multi_thread")]
async fn ai_summary_flag_also_skips_the_llm_check() {
    let base = spawn_server().await;
    let tmp = corpus();

    let (status, body) = post(
        &base,
        "/initialize",
        json!({ "root_dir": tmp.path(), "ollama_model": "phi3", "enable_ai_summary": false }),
    )
    .await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["state"], "ready");
}

#[tokio::test(flavor = "multi_thread")]
async fn initialize_can_pick_the_embedding_model() {
    let base = spawn_server().await;
    let tmp = corpus();

    let body = get(&base, "/sentence-models").await;
    assert_eq!(body["default"], "markers");
    let models = body["models"].as_array().unwrap();
    assert!(models.iter().any(|m| m == "all-minilm-l6-v2"), "{}", body);

    let (status, body) = post(
        &base,
        "/initialize",
        json!({ "root_dir": tmp.path(), "sentence_model": "markers-reversed" }),
    )
    .await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["embedding_model"], "markers-reversed");

    // The query must be embedded by the same model as the index, or the
    // swapped axes would rank b.txt first.
    let (status, body) = post(
        &base,
        "/search",
        json!({ "query": "apple", "num_results": 1 }),
    )
    .await;
    assert_eq!(status, 200);
    assert!(body["results"][0]["document"]["path"]
        .as_str()
        .unwrap()
        .ends_with("a.txt"));

    let (status, body) = post(
        &base,
        "/initialize",
        json!({ "root_dir": tmp.path(), "sentence_model": "no-such-model" }),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "bad_request");
    let status = get(&base, "/status").await;
    assert_eq!(status["state"], "ready");
    assert_eq!(status["embedding_model"], "markers-reversed");

    let (status, body) = post(&base, "/initialize", json!({ "root_dir": tmp.path() })).await;
    assert_eq!(status, 200);
    assert_eq!(body["embedding_model"], "markers");
}
