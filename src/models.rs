//! Core data models shared by the indexing and retrieval pipeline.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

/// Whether a corpus entry is a file or a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

/// One indexed file or directory.
///
/// Identity is `path`. The record's position in a snapshot's document list
/// is the join key to its embedding.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentRecord {
    pub path: PathBuf,
    pub kind: EntryKind,
    pub description: String,
    /// Size in bytes; zero for directories.
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

/// A ranked hit returned by a search. Not stored.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub document: DocumentRecord,
    /// `1 / (1 + distance)`, always in `(0, 1]`.
    pub score: f64,
    /// 1-based position in the result list.
    pub rank: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexState {
    Uninitialized,
    Building,
    Ready,
    Failed,
}

impl std::fmt::Display for IndexState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            IndexState::Uninitialized => "uninitialized",
            IndexState::Building => "building",
            IndexState::Ready => "ready",
            IndexState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Published view of the index lifecycle, as returned by `status()`.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStatus {
    pub state: IndexState,
    pub root: Option<PathBuf>,
    pub build_id: u64,
    /// Embedding model of the published snapshot.
    pub embedding_model: Option<String>,
    pub document_count: usize,
    pub skipped_count: usize,
    pub last_error: Option<String>,
}

/// Server URL and model name for one language-model call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LlmTarget {
    pub server_url: String,
    pub model: String,
}

impl LlmTarget {
    pub fn new(server_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            model: model.into(),
        }
    }
}
