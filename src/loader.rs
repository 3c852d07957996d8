//! Corpus loading.
//!
//! A [`CorpusLoader`] turns a source of documents into [`DocumentUnit`]s.
//! The built-in [`DirectoryLoader`] walks a directory, filters files with
//! include/exclude globs, extracts each file once, and produces one unit per
//! non-empty extracted text element. Files that cannot be extracted are
//! skipped with a warning and recorded in the [`ExtractionReport`]; only a
//! missing or unreadable root directory fails the load.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::config::CorpusConfig;
use crate::error::IngestionError;
use crate::extract::{extract_file, ExtractionReport};
use crate::models::DocumentUnit;

/// Everything produced by one corpus load.
#[derive(Debug, Clone, Default)]
pub struct LoadedCorpus {
    pub units: Vec<DocumentUnit>,
    pub report: ExtractionReport,
}

/// A source of documents for index builds.
///
/// Implement this to feed the pipeline from something other than a local
/// directory.
#[async_trait]
pub trait CorpusLoader: Send + Sync {
    /// Short description used in log lines.
    fn describe(&self) -> String;

    /// Load every document unit in the corpus.
    async fn load(&self) -> Result<LoadedCorpus, IngestionError>;

    /// A fingerprint of the corpus, stored with a persisted index to detect
    /// staleness. `None` disables the check.
    async fn fingerprint(&self) -> Result<Option<String>, IngestionError> {
        Ok(None)
    }
}

/// Loads documents from a local directory tree.
#[derive(Debug, Clone)]
pub struct DirectoryLoader {
    root: PathBuf,
    include_globs: Vec<String>,
    exclude_globs: Vec<String>,
    follow_symlinks: bool,
}

impl DirectoryLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::from_config(&CorpusConfig {
            dir: root.into(),
            ..CorpusConfig::default()
        })
    }

    pub fn from_config(config: &CorpusConfig) -> Self {
        Self {
            root: config.dir.clone(),
            include_globs: config.include_globs.clone(),
            exclude_globs: config.exclude_globs.clone(),
            follow_symlinks: config.follow_symlinks,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// List the files selected by the glob filters, sorted by relative path.
    pub fn list_files(&self) -> Result<Vec<PathBuf>, IngestionError> {
        Ok(self.walk()?.files)
    }

    /// Walk the corpus. Entries below the root that cannot be read are
    /// returned alongside the selected files instead of failing the walk.
    fn walk(&self) -> Result<Walk, IngestionError> {
        if !self.root.is_dir() {
            return Err(IngestionError::MissingDirectory(self.root.clone()));
        }

        let include_set = build_globset(&self.include_globs)?;
        let mut excludes = vec![
            "**/.git/**".to_string(),
            "**/target/**".to_string(),
            "**/node_modules/**".to_string(),
        ];
        excludes.extend(self.exclude_globs.iter().cloned());
        let exclude_set = build_globset(&excludes)?;

        let mut walk = Walk::default();
        for entry in WalkDir::new(&self.root).follow_links(self.follow_symlinks) {
            let entry = match entry {
                Ok(entry) => entry,
                // The root itself failing means the corpus is unreadable.
                Err(e) if e.depth() == 0 => {
                    return Err(IngestionError::Unreadable {
                        path: self.root.clone(),
                        source: e,
                    })
                }
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| self.root.clone());
                    let relative = path.strip_prefix(&self.root).unwrap_or(&path);
                    let rel_str = relative.to_string_lossy();
                    // A directory may hide selected files; a file only counts if selected.
                    let selected = path.is_dir() || include_set.is_match(rel_str.as_ref());
                    if exclude_set.is_match(rel_str.as_ref()) || !selected {
                        continue;
                    }
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable corpus entry");
                    walk.unreadable.push((path, e.to_string()));
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = entry.path().strip_prefix(&self.root).unwrap_or(entry.path());
            let rel_str = relative.to_string_lossy();
            if exclude_set.is_match(rel_str.as_ref()) || !include_set.is_match(rel_str.as_ref()) {
                continue;
            }
            walk.files.push(entry.into_path());
        }

        walk.files.sort();
        Ok(walk)
    }
}

#[derive(Debug, Default)]
struct Walk {
    files: Vec<PathBuf>,
    unreadable: Vec<(PathBuf, String)>,
}

#[async_trait]
impl CorpusLoader for DirectoryLoader {
    fn describe(&self) -> String {
        format!("directory {}", self.root.display())
    }

    async fn load(&self) -> Result<LoadedCorpus, IngestionError> {
        let loader = self.clone();
        // Extraction is blocking file and parser work.
        match tokio::task::spawn_blocking(move || loader.load_blocking()).await {
            Ok(result) => result,
            Err(join_err) => std::panic::resume_unwind(join_err.into_panic()),
        }
    }

    async fn fingerprint(&self) -> Result<Option<String>, IngestionError> {
        let files = self.list_files()?;
        let mut hasher = Sha256::new();
        for path in &files {
            let relative = path.strip_prefix(&self.root).unwrap_or(path);
            hasher.update(relative.to_string_lossy().as_bytes());
            if let Ok(meta) = std::fs::metadata(path) {
                hasher.update(meta.len().to_le_bytes());
                let modified = meta
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                    .map(|d| d.as_secs())
                    .unwrap_or_default();
                hasher.update(modified.to_le_bytes());
            }
        }
        Ok(Some(format!("{:x}", hasher.finalize())))
    }
}

impl DirectoryLoader {
    fn load_blocking(&self) -> Result<LoadedCorpus, IngestionError> {
        let mut corpus = LoadedCorpus::default();
        let walk = self.walk()?;
        for (path, reason) in walk.unreadable {
            corpus.report.record_unreadable(path, reason);
        }
        for path in walk.files {
            match extract_file(&path).into_result() {
                Ok(extracted) => {
                    tracing::debug!(path = %path.display(), elements = extracted.texts.len(), "extracted");
                    corpus.units.extend(
                        extracted
                            .texts
                            .into_iter()
                            .enumerate()
                            .map(|(i, text)| DocumentUnit::new(text, path.clone(), i)),
                    );
                    corpus.report.record_success(path);
                }
                Err(failure) => {
                    tracing::warn!(path = %failure.path.display(), error = %failure.reason, "skipping file");
                    corpus.report.record_failure(&failure);
                }
            }
        }
        Ok(corpus)
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, IngestionError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|source| IngestionError::InvalidGlob {
            pattern: pattern.clone(),
            source,
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|source| IngestionError::InvalidGlob {
        pattern: patterns.join(","),
        source,
    })
}
