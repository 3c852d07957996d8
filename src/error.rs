//! Error taxonomy for the ingestion, indexing, and answering pipeline.
//!
//! | Error | Raised by | Fatal? |
//! |-------|-----------|--------|
//! | [`IngestionError`] | corpus loader | aborts the build |
//! | [`ExtractionFailure`] | extractor, per file | no, logged and skipped |
//! | [`ChunkingError`] | chunker | aborts the build |
//! | [`SummarizationError`] | summarizer | aborts the build |
//! | [`IndexError`] | dual index | aborts the build / fails the query |
//! | [`IndexConsistencyFault`] | dual index search | no, logged and skipped |
//! | [`GenerationFailure`] | generation chain | fails the query |
//! | [`InitializationFailure`] | pipeline initializer | fails the triggering query |
//! | [`RagError`] | `Pipeline::try_answer` | per query |

use std::path::PathBuf;

use thiserror::Error;

use crate::extract::ExtractError;
use crate::models::ElementKind;

#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("corpus directory does not exist: {}", .0.display())]
    MissingDirectory(PathBuf),
    #[error("corpus directory is unreadable: {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    #[error("invalid glob pattern '{pattern}': {source}")]
    InvalidGlob {
        pattern: String,
        #[source]
        source: globset::Error,
    },
}

/// A single file that could not be extracted.
#[derive(Debug, Error)]
#[error("failed to extract {}: {reason}", path.display())]
pub struct ExtractionFailure {
    pub path: PathBuf,
    #[source]
    pub reason: ExtractError,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkingError {
    #[error("invalid chunk parameters: size={size}, overlap={overlap} (need 0 < overlap < size)")]
    InvalidParameters { size: usize, overlap: usize },
}

#[derive(Debug, Error)]
#[error("summarization failed for {kind} element {index}: {source}")]
pub struct SummarizationError {
    pub kind: ElementKind,
    pub index: usize,
    #[source]
    pub source: anyhow::Error,
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("summary/content length mismatch: {summaries} summaries vs {contents} contents")]
    LengthMismatch { summaries: usize, contents: usize },
    #[error("embedding failed: {0}")]
    Embedding(#[source] anyhow::Error),
    #[error("store operation failed: {0}")]
    Store(#[source] anyhow::Error),
    #[error("index left inconsistent for id {id}: content write failed ({write}) and rollback failed ({rollback})")]
    Inconsistent {
        id: String,
        write: anyhow::Error,
        rollback: anyhow::Error,
    },
}

/// A vector-store hit whose id has no content-store entry.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("index consistency fault: no content stored for summary id {id}")]
pub struct IndexConsistencyFault {
    pub id: String,
}

#[derive(Debug, Error)]
#[error("generation failed: {0}")]
pub struct GenerationFailure(#[source] pub anyhow::Error);

#[derive(Debug, Error)]
pub enum InitializationFailure {
    #[error(transparent)]
    Ingestion(#[from] IngestionError),
    #[error(transparent)]
    Chunking(#[from] ChunkingError),
    #[error(transparent)]
    Summarization(#[from] SummarizationError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error("index storage error: {0}")]
    Storage(#[source] anyhow::Error),
    /// The initialization task panicked or was cancelled.
    #[error("initialization aborted: {0}")]
    Aborted(String),
}

#[derive(Debug, Error)]
pub enum RagError {
    #[error("query is required")]
    EmptyQuery,
    #[error("RAG system error: {0}")]
    Initialization(#[source] InitializationFailure),
    #[error("Error during query processing: {0}")]
    Retrieval(#[source] IndexError),
    #[error("Error during query processing: {0}")]
    Generation(#[source] GenerationFailure),
}
