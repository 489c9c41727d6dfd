//! Index lifecycle manager.
//!
//! Owns the published [`Snapshot`] and the `Uninitialized → Building →
//! Ready | Failed` state machine. One lock guards both, and it is held only
//! to claim `Building`, to publish a finished snapshot, or to record a
//! failure. The walk, extraction, embedding, and index build run unlocked,
//! so `status()` and reads of the previously published snapshot stay
//! responsive during a rebuild.
//!
//! A snapshot is immutable once published. Readers clone the `Arc` and keep
//! using it even if a newer build replaces it. Each snapshot carries the
//! embedder that produced its vectors, so queries are always encoded by the
//! same model as the documents they are compared against.

use parking_lot::Mutex;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

use crate::config::IndexConfig;
use crate::corpus;
use crate::embedding::{self, Embedder};
use crate::error::{EngineError, Result};
use crate::models::{DocumentRecord, IndexState, IndexStatus};
use crate::vector_index::{IndexError, VectorIndex};

/// An internally consistent (documents, vectors) pair produced by one build.
pub struct Snapshot {
    build_id: u64,
    root: PathBuf,
    embedder: Arc<dyn Embedder>,
    documents: Vec<DocumentRecord>,
    index: VectorIndex,
    skipped: usize,
}

impl Snapshot {
    /// Pairs `documents` with `index`; their lengths must agree.
    pub fn new(
        build_id: u64,
        root: PathBuf,
        embedder: Arc<dyn Embedder>,
        documents: Vec<DocumentRecord>,
        index: VectorIndex,
        skipped: usize,
    ) -> std::result::Result<Self, IndexError> {
        if index.len() != documents.len() {
            return Err(IndexError::CountMismatch {
                vectors: index.len(),
                documents: documents.len(),
            });
        }
        Ok(Self {
            build_id,
            root,
            embedder,
            documents,
            index,
            skipped,
        })
    }

    pub fn build_id(&self) -> u64 {
        self.build_id
    }

    /// Directory this snapshot was built from.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub fn documents(&self) -> &[DocumentRecord] {
        &self.documents
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("build_id", &self.build_id)
            .field("root", &self.root)
            .field("model", &self.embedder.model_name())
            .field("documents", &self.documents.len())
            .field("skipped", &self.skipped)
            .finish_non_exhaustive()
    }
}

/// Everything behind the publish lock.
struct Published {
    state: IndexState,
    root: Option<PathBuf>,
    build_counter: u64,
    last_error: Option<String>,
    snapshot: Option<Arc<Snapshot>>,
}

impl Published {
    fn status(&self) -> IndexStatus {
        let snapshot = self.snapshot.as_deref();
        IndexStatus {
            state: self.state,
            root: self.root.clone(),
            build_id: self.build_counter,
            embedding_model: snapshot.map(|s| s.embedder.model_name().to_string()),
            document_count: snapshot.map(Snapshot::len).unwrap_or(0),
            skipped_count: snapshot.map(|s| s.skipped).unwrap_or(0),
            last_error: self.last_error.clone(),
        }
    }
}

pub struct IndexManager {
    /// Used by builds that do not bring their own embedder.
    embedder: Arc<dyn Embedder>,
    config: IndexConfig,
    batch_size: usize,
    published: Mutex<Published>,
}

impl IndexManager {
    pub fn new(embedder: Arc<dyn Embedder>, config: IndexConfig, batch_size: usize) -> Self {
        Self {
            embedder,
            config,
            batch_size,
            published: Mutex::new(Published {
                state: IndexState::Uninitialized,
                root: None,
                build_counter: 0,
                last_error: None,
                snapshot: None,
            }),
        }
    }

    /// Runs a full build over `root` with the default embedder.
    pub fn initialize(&self, root: &Path) -> Result<IndexStatus> {
        self.initialize_with(root, Arc::clone(&self.embedder))
    }

    /// Runs a full build over `root`, embedding with `embedder`, and publishes it.
    ///
    /// Fails fast with [`EngineError::BuildInProgress`] if another build holds
    /// the claim, and with [`EngineError::InvalidRoot`] (leaving the state
    /// untouched) if `root` is not a directory. Any failure after the claim
    /// leaves the manager `Failed` with no snapshot and no root.
    ///
    /// The returned status is the one this build published, even if another
    /// build has been claimed since.
    pub fn initialize_with(&self, root: &Path, embedder: Arc<dyn Embedder>) -> Result<IndexStatus> {
        let root = corpus::validate_root(root)?;
        let claim = self.claim(&root)?;
        info!(
            build_id = claim.build_id,
            root = %root.display(),
            model = embedder.model_name(),
            "index build started"
        );

        let started = Instant::now();
        match self.run_build(&root, claim.build_id, embedder) {
            Ok(snapshot) => {
                info!(
                    build_id = claim.build_id,
                    documents = snapshot.len(),
                    skipped = snapshot.skipped,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "index build published"
                );
                Ok(claim.publish(snapshot))
            }
            Err(e) => {
                error!(build_id = claim.build_id, error = %e, "index build failed");
                claim.fail(e.to_string());
                Err(e)
            }
        }
    }

    /// Last published state. Never waits on an in-progress build.
    pub fn status(&self) -> IndexStatus {
        self.published.lock().status()
    }

    /// Current snapshot for reading.
    ///
    /// While a rebuild is running the previously published snapshot is still
    /// served. Fails with [`EngineError::NotReady`] when nothing is published.
    pub fn snapshot_for_read(&self) -> Result<Arc<Snapshot>> {
        let published = self.published.lock();
        match published.state {
            IndexState::Ready | IndexState::Building => {
                published.snapshot.clone().ok_or(EngineError::NotReady)
            }
            IndexState::Uninitialized | IndexState::Failed => Err(EngineError::NotReady),
        }
    }

    fn claim(&self, root: &Path) -> Result<BuildClaim<'_>> {
        let mut published = self.published.lock();
        if published.state == IndexState::Building {
            return Err(EngineError::BuildInProgress);
        }
        published.state = IndexState::Building;
        published.root = Some(root.to_path_buf());
        published.last_error = None;
        published.build_counter += 1;
        Ok(BuildClaim {
            manager: self,
            build_id: published.build_counter,
            settled: false,
        })
    }

    fn run_build(&self, root: &Path, build_id: u64, embedder: Arc<dyn Embedder>) -> Result<Snapshot> {
        let corpus = corpus::build_corpus(root, &self.config)?;
        info!(
            build_id,
            documents = corpus.documents.len(),
            skipped = corpus.skipped.len(),
            "walk finished"
        );

        let descriptions: Vec<String> = corpus
            .documents
            .iter()
            .map(|d| d.description.clone())
            .collect();
        let vectors = embedding::encode_all(embedder.as_ref(), &descriptions, self.batch_size)?;
        let index = VectorIndex::from_vectors(&vectors)?;

        Ok(Snapshot::new(
            build_id,
            corpus.root,
            embedder,
            corpus.documents,
            index,
            corpus.skipped.len(),
        )?)
    }
}

/// Exclusive right to publish one build.
///
/// Dropping an unsettled claim (e.g. while unwinding from a panic in the
/// build phase) records `Failed`, so the manager never stays `Building`.
struct BuildClaim<'a> {
    manager: &'a IndexManager,
    build_id: u64,
    settled: bool,
}

impl BuildClaim<'_> {
    fn publish(mut self, snapshot: Snapshot) -> IndexStatus {
        let mut published = self.manager.published.lock();
        published.root = Some(snapshot.root.clone());
        published.snapshot = Some(Arc::new(snapshot));
        published.state = IndexState::Ready;
        published.last_error = None;
        self.settled = true;
        published.status()
    }

    fn fail(mut self, message: String) {
        self.record_failure(message);
        self.settled = true;
    }

    fn record_failure(&self, message: String) {
        let mut published = self.manager.published.lock();
        published.snapshot = None;
        published.root = None;
        published.state = IndexState::Failed;
        published.last_error = Some(message);
    }
}

impl Drop for BuildClaim<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.record_failure(format!("build {} aborted", self.build_id));
        }
    }
}
