//! File summarization and free-form chat.
//!
//! Both paths go straight to the language model. `summarize` re-reads the
//! file through the [`ContentExtractor`] on every call rather than reusing
//! the indexed description, and any extraction failure is returned as-is.
//! `chat` sends the message under a fixed preamble; no corpus context is
//! added.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::LlmConfig;
use crate::error::{EngineError, Result};
use crate::extract::{self, ContentExtractor, ExtractError, Extracted};
use crate::llm::{LanguageModel, LlmError, Prompt};
use crate::models::{EntryKind, LlmTarget};

const CHAT_PREAMBLE: &str = "You are a helpful assistant for a local file search tool. \
Answer clearly and concisely.";

pub struct Assistant {
    llm: Arc<dyn LanguageModel>,
    extractor: ContentExtractor,
    max_words: usize,
}

impl Assistant {
    pub fn new(llm: Arc<dyn LanguageModel>, config: &LlmConfig, max_file_bytes: u64) -> Self {
        Self {
            llm,
            extractor: ContentExtractor::new(config.summary_input_chars, max_file_bytes),
            max_words: config.summary_max_words,
        }
    }

    pub fn llm(&self) -> &Arc<dyn LanguageModel> {
        &self.llm
    }

    /// Summarizes one file.
    ///
    /// A relative `file_path` is resolved against `active_root` when given.
    pub fn summarize(
        &self,
        file_path: &Path,
        active_root: Option<&Path>,
        target: &LlmTarget,
    ) -> Result<String> {
        let path = resolve(file_path, active_root);
        if path.is_dir() {
            return Err(EngineError::invalid_argument(format!(
                "{} is not a file",
                path.display()
            )));
        }

        let text = match self.extractor.extract(&path, EntryKind::File) {
            Ok(Extracted::Text(text)) => text,
            Ok(Extracted::Unsupported(reason)) => {
                return Err(EngineError::Extraction {
                    path,
                    source: ExtractError::Unsupported(reason),
                })
            }
            Err(source) => return Err(EngineError::Extraction { path, source }),
        };

        let prompt = Prompt::user(summary_instruction(&path, &text, self.max_words));
        info!(path = %path.display(), model = %target.model, chars = text.chars().count(), "summarizing file");
        let summary = self.complete(&prompt, target)?;
        Ok(truncate_words(&summary, self.max_words))
    }

    /// Sends `message` to the model under the chat preamble.
    pub fn chat(&self, message: &str, target: &LlmTarget) -> Result<String> {
        if message.trim().is_empty() {
            return Err(EngineError::invalid_argument("message must not be empty"));
        }
        debug!(model = %target.model, "chat request");
        let prompt = Prompt::user(message).with_system(CHAT_PREAMBLE);
        self.complete(&prompt, target)
    }

    fn complete(&self, prompt: &Prompt, target: &LlmTarget) -> Result<String> {
        let text = self.llm.generate(prompt, target)?;
        let text = text.trim();
        if text.is_empty() {
            return Err(LlmError::InvalidResponse("model returned an empty response".into()).into());
        }
        Ok(text.to_string())
    }
}

fn resolve(file_path: &Path, active_root: Option<&Path>) -> PathBuf {
    match active_root {
        Some(root) if file_path.is_relative() => root.join(file_path),
        _ => file_path.to_path_buf(),
    }
}

fn summary_instruction(path: &Path, text: &str, max_words: usize) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    format!(
        "Please provide a concise summary of this {label} named '{name}'.\n\
         IMPORTANT: Your response must be {max_words} words or less.\n\n\
         {text}\n\n\
         Focus on the main content and key points. Keep your summary under {max_words} words.",
        label = summary_label(path),
    )
}

/// Document type named in the summary prompt.
fn summary_label(path: &Path) -> &'static str {
    match extract::type_label(path) {
        "text file" => "file",
        label => label,
    }
}

/// Keeps the first `max_words` words, marking the cut with `...`.
fn truncate_words(text: &str, max_words: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max_words {
        return text.to_string();
    }
    format!("{}...", words[..max_words].join(" "))
}
