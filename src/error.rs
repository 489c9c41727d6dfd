//! Engine error taxonomy.
//!
//! Component errors ([`ExtractError`], [`EmbedError`], [`IndexError`],
//! [`LlmError`]) live next to the component that raises them. The engine
//! folds them into [`EngineError`], which is what the boundary layer sees.

use std::path::PathBuf;

use crate::embedding::EmbedError;
use crate::extract::ExtractError;
use crate::llm::LlmError;
use crate::vector_index::IndexError;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The requested root does not exist or is not a directory.
    #[error("invalid root directory {path}: {reason}")]
    InvalidRoot { path: PathBuf, reason: String },

    /// Another build holds the `Building` claim.
    #[error("another initialization is in progress; retry once it finishes")]
    BuildInProgress,

    /// No published index is available to read.
    #[error("index is not ready; initialize a root directory first")]
    NotReady,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("embedding model unavailable: {0}")]
    ModelUnavailable(#[from] EmbedError),

    #[error("language model unavailable: {0}")]
    LlmUnavailable(#[from] LlmError),

    #[error("extraction failed for {path}: {source}")]
    Extraction {
        path: PathBuf,
        #[source]
        source: ExtractError,
    },

    #[error("index error: {0}")]
    Index(#[from] IndexError),
}

impl EngineError {
    pub fn invalid_root(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        EngineError::InvalidRoot {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        EngineError::InvalidArgument(message.into())
    }

    /// Stable machine-readable code for the boundary layer.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::InvalidRoot { .. } => "invalid_root",
            EngineError::BuildInProgress => "build_in_progress",
            EngineError::NotReady => "not_ready",
            EngineError::InvalidArgument(_) => "bad_request",
            EngineError::ModelUnavailable(_) => "model_unavailable",
            EngineError::LlmUnavailable(_) => "llm_unavailable",
            EngineError::Extraction { .. } => "extraction_failed",
            EngineError::Index(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_distinct_per_variant() {
        let errors = [
            EngineError::invalid_root("/nope", "does not exist"),
            EngineError::BuildInProgress,
            EngineError::NotReady,
            EngineError::invalid_argument("num_results must be > 0"),
            EngineError::ModelUnavailable(EmbedError::Disabled),
            EngineError::LlmUnavailable(LlmError::Timeout("http://x".into())),
            EngineError::Extraction {
                path: "/a.pdf".into(),
                source: ExtractError::Pdf("bad xref".into()),
            },
            EngineError::Index(IndexError::DimensionMismatch {
                expected: 384,
                got: 768,
            }),
        ];
        let mut codes: Vec<&str> = errors.iter().map(|e| e.code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
        assert_eq!(errors[7].code(), "internal");
    }

    #[test]
    fn extraction_message_names_path() {
        let err = EngineError::Extraction {
            path: "/docs/broken.pdf".into(),
            source: ExtractError::Pdf("bad xref".into()),
        };
        let msg = err.to_string();
        assert!(msg.contains("/docs/broken.pdf"));
        assert!(msg.contains("bad xref"));
    }
}
