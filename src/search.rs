//! Retrieval and ranking over the published snapshot.

use tracing::debug;

use crate::error::{EngineError, Result};
use crate::manager::IndexManager;
use crate::models::SearchResult;
use crate::vector_index::relevance_score;

/// Returns up to `num_results` documents nearest to `query`, best first.
///
/// `num_results` larger than the corpus is clamped. Equal scores keep corpus
/// order. An empty corpus yields an empty list.
pub fn search(manager: &IndexManager, query: &str, num_results: i64) -> Result<Vec<SearchResult>> {
    if num_results <= 0 {
        return Err(EngineError::invalid_argument(format!(
            "num_results must be positive, got {}",
            num_results
        )));
    }
    if query.trim().is_empty() {
        return Err(EngineError::invalid_argument("query must not be empty"));
    }

    let snapshot = manager.snapshot_for_read()?;
    if snapshot.is_empty() {
        return Ok(Vec::new());
    }

    let k = usize::try_from(num_results)
        .unwrap_or(usize::MAX)
        .min(snapshot.len());
    let query_vector = snapshot.embedder().encode(query)?;
    let hits = snapshot.index().search(&query_vector, k)?;

    let documents = snapshot.documents();
    let mut scored: Vec<(usize, f64)> = hits
        .into_iter()
        .map(|(position, distance)| (position, relevance_score(distance)))
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

    let results: Vec<SearchResult> = scored
        .into_iter()
        .enumerate()
        .filter_map(|(i, (position, score))| {
            documents.get(position).map(|document| SearchResult {
                document: document.clone(),
                score,
                rank: i + 1,
            })
        })
        .collect();

    debug!(
        build_id = snapshot.build_id(),
        requested = num_results,
        returned = results.len(),
        "search complete"
    );
    Ok(results)
}
