//! Corpus builder: walks a root directory into [`DocumentRecord`]s.
//!
//! Hidden entries (names starting with `.`) are pruned along with their
//! subtrees, as are paths matching `index.exclude_globs`. Entries that fail
//! with an OS error or fail extraction are recorded in [`Corpus::skipped`]
//! and the walk continues. Children are visited in file-name order, so the
//! output is deterministic for an unchanged tree.

use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::config::IndexConfig;
use crate::error::EngineError;
use crate::extract::{self, ContentExtractor, Extracted};
use crate::models::{DocumentRecord, EntryKind};

const HIDDEN_PREFIX: char = '.';
const PROGRESS_EVERY: usize = 1000;

/// An entry left out of the corpus, with the reason.
#[derive(Debug, Clone)]
pub struct SkippedEntry {
    pub path: PathBuf,
    pub reason: String,
}

/// Output of one walk.
#[derive(Debug, Clone)]
pub struct Corpus {
    /// Canonical root that was walked.
    pub root: PathBuf,
    pub documents: Vec<DocumentRecord>,
    pub skipped: Vec<SkippedEntry>,
}

/// Checks that `root` exists and is a directory, returning its canonical form.
pub fn validate_root(root: &Path) -> Result<PathBuf, EngineError> {
    let canonical = root
        .canonicalize()
        .map_err(|e| EngineError::invalid_root(root, e.to_string()))?;
    if !canonical.is_dir() {
        return Err(EngineError::invalid_root(root, "not a directory"));
    }
    Ok(canonical)
}

/// Walks `root` and describes every visible file and directory beneath it.
pub fn build_corpus(root: &Path, config: &IndexConfig) -> Result<Corpus, EngineError> {
    let root = validate_root(root)?;
    let excludes = build_globset(&config.exclude_globs)
        .map_err(|e| EngineError::invalid_argument(format!("exclude_globs: {}", e)))?;
    let extractor = ContentExtractor::new(config.snippet_chars, config.max_file_bytes);

    let mut documents = Vec::new();
    let mut skipped = Vec::new();

    let walker = WalkDir::new(&root)
        .min_depth(1)
        .follow_links(config.follow_symlinks)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_hidden(e) && !is_excluded(e, &root, &excludes));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.clone());
                warn!(path = %path.display(), error = %e, "skipping inaccessible entry");
                skipped.push(SkippedEntry {
                    path,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        let kind = if entry.file_type().is_dir() {
            EntryKind::Directory
        } else if entry.file_type().is_file() {
            EntryKind::File
        } else {
            debug!(path = %entry.path().display(), "skipping non-regular entry");
            continue;
        };

        match describe_entry(&entry, kind, &root, &extractor, config.description_chars) {
            Ok(record) => documents.push(record),
            Err(reason) => {
                warn!(path = %entry.path().display(), %reason, "skipping entry");
                skipped.push(SkippedEntry {
                    path: entry.path().to_path_buf(),
                    reason,
                });
            }
        }

        let seen = documents.len() + skipped.len();
        if seen % PROGRESS_EVERY == 0 {
            debug!(seen, "walk progress");
        }
    }

    Ok(Corpus {
        root,
        documents,
        skipped,
    })
}

fn describe_entry(
    entry: &DirEntry,
    kind: EntryKind,
    root: &Path,
    extractor: &ContentExtractor,
    max_chars: usize,
) -> Result<DocumentRecord, String> {
    let path = entry.path();
    let metadata = entry.metadata().map_err(|e| e.to_string())?;
    let modified = metadata.modified().ok().map(DateTime::<Utc>::from);
    let relative = relative_display(path, root);

    let extracted = extractor.extract(path, kind).map_err(|e| e.to_string())?;
    let description = match (kind, &extracted) {
        (EntryKind::Directory, listing) if listing.as_str().is_empty() => {
            format!("Directory: {} (empty)", relative)
        }
        (EntryKind::Directory, listing) => {
            format!("Directory: {} containing {}", relative, listing.as_str())
        }
        (EntryKind::File, Extracted::Unsupported(generic)) => {
            format!("File: {} ({})", relative, generic)
        }
        (EntryKind::File, Extracted::Text(text)) => {
            let label = extract::type_label(path);
            let snippet = collapse_whitespace(text);
            if snippet.is_empty() {
                format!("File: {} ({})", relative, label)
            } else {
                format!("File: {} ({}). {}", relative, label, snippet)
            }
        }
    };

    Ok(DocumentRecord {
        path: path.to_path_buf(),
        kind,
        description: extract::truncate_chars(&description, max_chars).to_string(),
        size: if kind == EntryKind::File { metadata.len() } else { 0 },
        modified,
    })
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with(HIDDEN_PREFIX))
        .unwrap_or(false)
}

fn is_excluded(entry: &DirEntry, root: &Path, excludes: &GlobSet) -> bool {
    !excludes.is_empty() && excludes.is_match(relative_display(entry.path(), root))
}

fn relative_display(path: &Path, root: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, globset::Error> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    builder.build()
}
