//! Shared engine context.
//!
//! [`Engine`] is the single object the boundary layers (HTTP server, CLI)
//! hold. It is `Send + Sync` and meant to be shared behind an `Arc`; every
//! operation is a synchronous call that returns a typed [`Result`].

use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::assistant::Assistant;
use crate::config::Config;
use crate::embedding::{self, Embedder, EmbedderRegistry};
use crate::error::{EngineError, Result};
use crate::llm::{LanguageModel, OllamaClient};
use crate::manager::IndexManager;
use crate::models::{IndexStatus, LlmTarget, SearchResult};
use crate::search;

pub struct Engine {
    manager: IndexManager,
    embedders: EmbedderRegistry,
    assistant: Assistant,
    /// Server and model used when a request does not name its own.
    llm_target: RwLock<LlmTarget>,
}

impl Engine {
    /// Engine with `embedder` as the default; other models named at
    /// initialization come from the `[embedding]` provider.
    pub fn new(config: &Config, embedder: Arc<dyn Embedder>, llm: Arc<dyn LanguageModel>) -> Self {
        let embedders = EmbedderRegistry::for_config(embedder, &config.embedding);
        Self::with_embedders(config, embedders, llm)
    }

    pub fn with_embedders(
        config: &Config,
        embedders: EmbedderRegistry,
        llm: Arc<dyn LanguageModel>,
    ) -> Self {
        Self {
            manager: IndexManager::new(
                Arc::clone(embedders.default_embedder()),
                config.index.clone(),
                config.embedding.batch_size,
            ),
            embedders,
            assistant: Assistant::new(llm, &config.llm, config.index.max_file_bytes),
            llm_target: RwLock::new(LlmTarget::new(&config.llm.url, &config.llm.model)),
        }
    }

    /// Builds an engine with the providers named in `config`.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let embedder = embedding::create_provider(&config.embedding)?;
        let llm = Arc::new(OllamaClient::new(Duration::from_secs(config.llm.timeout_secs)));
        Ok(Self::new(config, embedder, llm))
    }

    pub fn status(&self) -> IndexStatus {
        self.manager.status()
    }

    pub fn initialize(&self, root: &Path) -> Result<IndexStatus> {
        self.initialize_with_model(root, None)
    }

    /// Builds the index for `root` with the named embedding model, or the
    /// default model when `model` is `None`.
    ///
    /// An unknown model name fails with [`EngineError::InvalidArgument`]
    /// before any build is claimed.
    pub fn initialize_with_model(&self, root: &Path, model: Option<&str>) -> Result<IndexStatus> {
        let Some(name) = model else {
            return self.manager.initialize(root);
        };
        let embedder = self.embedders.get(name).map_err(|e| {
            EngineError::invalid_argument(format!("embedding model '{}': {:#}", name, e))
        })?;
        self.manager.initialize_with(root, embedder)
    }

    /// Name of the model used when initialization does not pick one.
    pub fn default_embedding_model(&self) -> &str {
        self.embedders.default_embedder().model_name()
    }

    pub fn search(&self, query: &str, num_results: i64) -> Result<Vec<SearchResult>> {
        search::search(&self.manager, query, num_results)
    }

    /// Summarizes `file_path`, resolving relative paths against the root of
    /// the published snapshot.
    pub fn summarize(&self, file_path: &Path, target: &LlmTarget) -> Result<String> {
        let snapshot = self.manager.snapshot_for_read().ok();
        self.assistant
            .summarize(file_path, snapshot.as_ref().map(|s| s.root()), target)
    }

    pub fn chat(&self, message: &str, target: &LlmTarget) -> Result<String> {
        self.assistant.chat(message, target)
    }

    pub fn test_connection(&self, target: &LlmTarget) -> Result<()> {
        self.assistant.llm().test_connection(target)?;
        Ok(())
    }

    /// Current default LLM target with any per-request overrides applied.
    pub fn llm_target(&self, url: Option<&str>, model: Option<&str>) -> LlmTarget {
        let current = self.llm_target.read();
        LlmTarget::new(
            url.unwrap_or(current.server_url.as_str()),
            model.unwrap_or(current.model.as_str()),
        )
    }

    /// Replaces the default LLM target for later requests.
    pub fn set_llm_target(&self, target: LlmTarget) {
        *self.llm_target.write() = target;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EmbedError;
    use crate::error::EngineError;
    use crate::llm::{LlmError, Prompt};
    use crate::models::IndexState;
    use std::fs;
    use tempfile::TempDir;

    struct ConstEmbedder;

    impl Embedder for ConstEmbedder {
        fn model_name(&self) -> &str {
            "const"
        }

        fn encode_batch(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, EmbedError> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    /// Echoes the target model so tests can see which target was used.
    struct EchoModel;

    impl LanguageModel for EchoModel {
        fn generate(&self, _prompt: &Prompt, target: &LlmTarget) -> std::result::Result<String, LlmError> {
            Ok(format!("{} at {}", target.model, target.server_url))
        }

        fn test_connection(&self, target: &LlmTarget) -> std::result::Result<(), LlmError> {
            if target.model == "missing" {
                Err(LlmError::ModelNotFound(target.model.clone()))
            } else {
                Ok(())
            }
        }
    }

    /// Fails every call, standing in for a model whose weights are gone.
    struct BrokenEmbedder;

    impl Embedder for BrokenEmbedder {
        fn model_name(&self) -> &str {
            "broken"
        }

        fn encode_batch(&self, _texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, EmbedError> {
            Err(EmbedError::ModelLoad("weights missing".into()))
        }
    }

    fn engine() -> Engine {
        Engine::new(&Config::minimal(), Arc::new(ConstEmbedder), Arc::new(EchoModel))
    }

    /// Knows "broken" besides the default; every other name is unknown.
    fn engine_with_models() -> Engine {
        let embedders = EmbedderRegistry::new(
            Arc::new(ConstEmbedder),
            Box::new(|model: &str| match model {
                "broken" => Ok(Arc::new(BrokenEmbedder) as Arc<dyn Embedder>),
                other => anyhow::bail!("no model named {}", other),
            }),
        );
        Engine::with_embedders(&Config::minimal(), embedders, Arc::new(EchoModel))
    }

    #[test]
    fn overrides_fall_back_to_defaults() {
        let e = engine();
        let t = e.llm_target(None, Some("mistral"));
        assert_eq!(t.server_url, "http://localhost:11434");
        assert_eq!(t.model, "mistral");

        e.set_llm_target(LlmTarget::new("http://gpu:11434", "qwen2"));
        let t = e.llm_target(None, None);
        assert_eq!(t, LlmTarget::new("http://gpu:11434", "qwen2"));
    }

    #[test]
    fn chat_and_summarize_work_without_an_index() {
        let e = engine();
        assert_eq!(e.status().state, IndexState::Uninitialized);
        let target = e.llm_target(None, None);
        assert!(e.chat("hello", &target).unwrap().starts_with("llama3.1:8b"));

        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("a.txt");
        fs::write(&file, "apple pie recipe").unwrap();
        assert!(e.summarize(&file, &target).is_ok());
        assert!(matches!(e.search("apple", 5), Err(EngineError::NotReady)));
    }

    #[test]
    fn summarize_resolves_relative_paths_against_active_root() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("docs")).unwrap();
        fs::write(tmp.path().join("docs/readme.md"), "hello world").unwrap();
        let e = engine();
        e.initialize(tmp.path()).unwrap();
        let target = e.llm_target(None, None);
        assert!(e.summarize(Path::new("docs/readme.md"), &target).is_ok());
    }

    #[test]
    fn failed_build_stops_resolving_against_its_root() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.txt"), "apple pie recipe").unwrap();
        let e = engine_with_models();
        let target = e.llm_target(None, None);

        e.initialize(tmp.path()).unwrap();
        assert!(e.summarize(Path::new("a.txt"), &target).is_ok());

        let err = e.initialize_with_model(tmp.path(), Some("broken")).unwrap_err();
        assert!(matches!(err, EngineError::ModelUnavailable(_)));
        let status = e.status();
        assert_eq!(status.state, IndexState::Failed);
        assert!(status.root.is_none());
        assert!(matches!(
            e.summarize(Path::new("a.txt"), &target),
            Err(EngineError::Extraction { .. })
        ));
    }

    #[test]
    fn unknown_embedding_model_is_rejected_before_building() {
        let tmp = TempDir::new().unwrap();
        let e = engine_with_models();
        e.initialize(tmp.path()).unwrap();

        let err = e.initialize_with_model(tmp.path(), Some("nope")).unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(ref m) if m.contains("nope")));
        let status = e.status();
        assert_eq!(status.state, IndexState::Ready);
        assert_eq!(status.build_id, 1);
        assert_eq!(status.embedding_model.as_deref(), Some("const"));
        assert_eq!(e.default_embedding_model(), "const");
    }

    #[test]
    fn test_connection_reports_missing_model() {
        let e = engine();
        let ok = e.llm_target(None, None);
        assert!(e.test_connection(&ok).is_ok());
        let missing = e.llm_target(None, Some("missing"));
        let err = e.test_connection(&missing).unwrap_err();
        assert!(matches!(
            err,
            EngineError::LlmUnavailable(LlmError::ModelNotFound(_))
        ));
    }
}
