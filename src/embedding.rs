//! Embedding adapter and provider implementations.
//!
//! Defines the [`Embedder`] trait and concrete implementations:
//! - **[`DisabledProvider`]**: returns errors; used when embeddings are not configured.
//! - **[`OllamaProvider`]**: calls a local Ollama instance's `/api/embed` endpoint.
//! - **[`LocalProvider`]**: runs a fastembed model in-process; no network calls after model download.
//!
//! An embedder is a pure function of (pinned model, text): the same input
//! yields the same vector for the lifetime of the process. Calls are never
//! retried here; a failure is fatal to the build that issued it.
//!
//! # Provider Selection
//!
//! ```rust,no_run
//! # use file_finder::config::EmbeddingConfig;
//! # use file_finder::embedding::create_provider;
//! let mut config = EmbeddingConfig::default();
//! config.provider = "disabled".to_string();
//! let provider = create_provider(&config).unwrap();
//! assert_eq!(provider.model_name(), "disabled");
//! ```

use anyhow::bail;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::EmbeddingConfig;

/// Model names the local provider accepts, matched case-insensitively.
pub const LOCAL_MODEL_NAMES: [&str; 5] = [
    "all-minilm-l6-v2",
    "all-minilm-l12-v2",
    "bge-small-en-v1.5",
    "bge-base-en-v1.5",
    "nomic-embed-text-v1.5",
];

#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    #[error("embedding provider is disabled")]
    Disabled,
    #[error("failed to load model: {0}")]
    ModelLoad(String),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("embedding service unreachable: {0}")]
    Transport(String),
    #[error("expected {expected} embeddings, got {got}")]
    Shape { expected: usize, got: usize },
}

/// Turns text into fixed-dimension vectors.
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"all-minilm-l6-v2"`).
    fn model_name(&self) -> &str;

    /// Embeds `texts`, returning one vector per input in input order.
    fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;

    /// Embeds a single text.
    fn encode(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        self.encode_batch(&[text.to_string()])?
            .into_iter()
            .next()
            .ok_or(EmbedError::Shape {
                expected: 1,
                got: 0,
            })
    }
}

/// Embeds `texts` in batches of `batch_size`, preserving order.
///
/// Fails with [`EmbedError::Shape`] if any batch comes back with the wrong
/// number of vectors.
pub fn encode_all(
    embedder: &dyn Embedder,
    texts: &[String],
    batch_size: usize,
) -> Result<Vec<Vec<f32>>, EmbedError> {
    let mut vectors = Vec::with_capacity(texts.len());
    for batch in texts.chunks(batch_size.max(1)) {
        let out = embedder.encode_batch(batch)?;
        if out.len() != batch.len() {
            return Err(EmbedError::Shape {
                expected: batch.len(),
                got: out.len(),
            });
        }
        vectors.extend(out);
    }
    Ok(vectors)
}

// ============ Disabled Provider ============

/// A no-op provider that always fails.
///
/// Used when `embedding.provider = "disabled"`; any build fails with
/// `ModelUnavailable`.
pub struct DisabledProvider;

impl Embedder for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }

    fn encode_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Err(EmbedError::Disabled)
    }
}

// ============ Ollama Provider ============

/// Embedding provider using a local Ollama instance.
///
/// Calls `POST /api/embed` on the configured URL (default: `http://localhost:11434`).
/// Requires an embedding model to be pulled (e.g. `ollama pull nomic-embed-text`).
pub struct OllamaProvider {
    model: String,
    url: String,
    timeout: Duration,
}

impl OllamaProvider {
    pub fn new(model: impl Into<String>, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            model: model.into(),
            url: url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }
}

impl Embedder for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| EmbedError::Transport(e.to_string()))?;

        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let response = client
            .post(format!("{}/api/embed", self.url))
            .json(&body)
            .send()
            .map_err(|e| {
                EmbedError::Transport(format!("is Ollama running at {}? {}", self.url, e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().unwrap_or_default();
            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(EmbedError::ModelLoad(format!(
                    "model '{}' not found: {}",
                    self.model, body_text
                )));
            }
            return Err(EmbedError::Inference(format!(
                "Ollama API error {}: {}",
                status, body_text
            )));
        }

        let json: serde_json::Value = response
            .json()
            .map_err(|e| EmbedError::Inference(e.to_string()))?;
        parse_ollama_response(&json)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, EmbedError> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| EmbedError::Inference("response is missing embeddings array".into()))?;

    embeddings
        .iter()
        .map(|embedding| {
            embedding
                .as_array()
                .map(|values| {
                    values
                        .iter()
                        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                        .collect()
                })
                .ok_or_else(|| EmbedError::Inference("embedding is not an array".into()))
        })
        .collect()
}

// ============ Local Provider (fastembed) ============

/// In-process embedding provider backed by fastembed.
///
/// The model is loaded lazily on first use, downloaded from Hugging Face if
/// not cached. A load failure is reported on every call until one succeeds.
#[cfg(feature = "local-embeddings")]
pub struct LocalProvider {
    model_name: String,
    batch_size: usize,
    model: parking_lot::Mutex<Option<fastembed::TextEmbedding>>,
}

#[cfg(feature = "local-embeddings")]
impl LocalProvider {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| "all-minilm-l6-v2".to_string());
        // Reject unknown names at startup rather than at first build.
        config_to_fastembed_model(&model_name)?;
        Ok(Self {
            model_name,
            batch_size: config.batch_size,
            model: parking_lot::Mutex::new(None),
        })
    }
}

#[cfg(feature = "local-embeddings")]
impl Embedder for LocalProvider {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut guard = self.model.lock();
        if guard.is_none() {
            let variant = config_to_fastembed_model(&self.model_name)
                .map_err(|e| EmbedError::ModelLoad(e.to_string()))?;
            tracing::info!(model = %self.model_name, "loading local embedding model");
            let loaded = fastembed::TextEmbedding::try_new(
                fastembed::InitOptions::new(variant).with_show_download_progress(false),
            )
            .map_err(|e| EmbedError::ModelLoad(e.to_string()))?;
            *guard = Some(loaded);
        }
        let model = guard
            .as_mut()
            .ok_or_else(|| EmbedError::ModelLoad("model not loaded".into()))?;
        model
            .embed(texts.to_vec(), Some(self.batch_size))
            .map_err(|e| EmbedError::Inference(e.to_string()))
    }
}

#[cfg(feature = "local-embeddings")]
fn config_to_fastembed_model(name: &str) -> anyhow::Result<fastembed::EmbeddingModel> {
    match name.to_ascii_lowercase().as_str() {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "all-minilm-l12-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML12V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        _ => bail!(
            "Unknown local embedding model: '{}'. Supported models: {}",
            name,
            LOCAL_MODEL_NAMES.join(", ")
        ),
    }
}

/// Create the appropriate [`Embedder`] based on configuration.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledProvider`] |
/// | `"ollama"` | [`OllamaProvider`] |
/// | `"local"` | `LocalProvider` (requires the `local-embeddings` feature) |
pub fn create_provider(config: &EmbeddingConfig) -> anyhow::Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledProvider)),
        "ollama" => {
            let model = config
                .model
                .clone()
                .ok_or_else(|| anyhow::anyhow!("embedding.model required for Ollama provider"))?;
            let url = config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string());
            Ok(Arc::new(OllamaProvider::new(
                model,
                url,
                Duration::from_secs(config.timeout_secs),
            )))
        }
        #[cfg(feature = "local-embeddings")]
        "local" => Ok(Arc::new(LocalProvider::new(config)?)),
        #[cfg(not(feature = "local-embeddings"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

// ============ Registry ============

/// Builds a provider for a named model.
pub type ProviderFactory = dyn Fn(&str) -> anyhow::Result<Arc<dyn Embedder>> + Send + Sync;

/// Embedders keyed by model name.
///
/// Each build may pick its own model. Providers other than the default are
/// created on first request and reused afterwards, so a model is loaded at
/// most once per process.
pub struct EmbedderRegistry {
    default: Arc<dyn Embedder>,
    factory: Box<ProviderFactory>,
    cache: Mutex<HashMap<String, Arc<dyn Embedder>>>,
}

impl EmbedderRegistry {
    pub fn new(default: Arc<dyn Embedder>, factory: Box<ProviderFactory>) -> Self {
        Self {
            default,
            factory,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Registry whose named models come from [`create_provider`] with
    /// `embedding.model` replaced.
    pub fn for_config(default: Arc<dyn Embedder>, config: &EmbeddingConfig) -> Self {
        let config = config.clone();
        Self::new(
            default,
            Box::new(move |model: &str| {
                create_provider(&EmbeddingConfig {
                    model: Some(model.to_string()),
                    ..config.clone()
                })
            }),
        )
    }

    pub fn default_embedder(&self) -> &Arc<dyn Embedder> {
        &self.default
    }

    /// Provider for `model`, creating it on first use.
    pub fn get(&self, model: &str) -> anyhow::Result<Arc<dyn Embedder>> {
        if model.eq_ignore_ascii_case(self.default.model_name()) {
            return Ok(Arc::clone(&self.default));
        }
        let key = model.to_ascii_lowercase();
        if let Some(embedder) = self.cache.lock().get(&key) {
            return Ok(Arc::clone(embedder));
        }
        let built = (self.factory)(model)?;
        info!(model, "embedding provider created");
        let mut cache = self.cache.lock();
        Ok(Arc::clone(cache.entry(key).or_insert(built)))
    }
}
