//! Core data models used throughout finrag.
//!
//! These types represent the document units, chunks, summaries, and retrieved
//! context that flow through the ingestion and question-answering pipeline.

use std::collections::BTreeMap;
use std::path::PathBuf;

/// Metadata key holding the originating file path.
pub const META_SOURCE: &str = "source";
/// Metadata key holding the index of the extracted element within its file.
pub const META_ELEMENT: &str = "element";
/// Metadata key holding the chunk position within its document unit.
pub const META_CHUNK_INDEX: &str = "chunk_index";

/// Raw unit of text produced by the corpus loader.
///
/// One file yields one unit per non-empty extracted text element
/// (e.g. one per PDF page).
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentUnit {
    pub content: String,
    pub source_path: PathBuf,
    pub metadata: BTreeMap<String, String>,
}

impl DocumentUnit {
    pub fn new(content: impl Into<String>, source_path: impl Into<PathBuf>, element: usize) -> Self {
        let source_path = source_path.into();
        let mut metadata = BTreeMap::new();
        metadata.insert(
            META_SOURCE.to_string(),
            source_path.display().to_string(),
        );
        metadata.insert(META_ELEMENT.to_string(), element.to_string());
        Self {
            content: content.into(),
            source_path,
            metadata,
        }
    }

    /// The originating file path as recorded in metadata.
    pub fn source(&self) -> &str {
        self.metadata
            .get(META_SOURCE)
            .map(String::as_str)
            .unwrap_or_default()
    }
}

/// A bounded, overlapping slice of a [`DocumentUnit`].
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub id: String,
    pub content: String,
    pub source_path: PathBuf,
    pub metadata: BTreeMap<String, String>,
    pub chunk_index: usize,
    /// SHA-256 of `content`, hex encoded.
    pub hash: String,
}

/// Which summarizer input a failing element came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Text,
    Table,
}

impl std::fmt::Display for ElementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ElementKind::Text => write!(f, "text"),
            ElementKind::Table => write!(f, "table"),
        }
    }
}

/// A retrieval-optimized summary linked to its original content by `id`.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub id: String,
    pub content: String,
    /// Key of the original content in the content store (same as `id`).
    pub source_id: String,
}

/// Full-fidelity content held by the content store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredContent {
    pub text: String,
    pub source: Option<String>,
}

impl StoredContent {
    pub fn raw(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: None,
        }
    }

    pub fn with_source(text: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: Some(source.into()),
        }
    }
}

impl From<&Chunk> for StoredContent {
    fn from(chunk: &Chunk) -> Self {
        StoredContent::with_source(chunk.content.clone(), chunk.source_path.display().to_string())
    }
}

/// Content resolved for a query, handed to the generation chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextItem {
    RawText(String),
    DocumentWithMetadata { text: String, source: String },
}

impl ContextItem {
    pub fn text(&self) -> &str {
        match self {
            ContextItem::RawText(text) => text,
            ContextItem::DocumentWithMetadata { text, .. } => text,
        }
    }

    pub fn source(&self) -> Option<&str> {
        match self {
            ContextItem::RawText(_) => None,
            ContextItem::DocumentWithMetadata { source, .. } => Some(source),
        }
    }
}

impl From<StoredContent> for ContextItem {
    fn from(content: StoredContent) -> Self {
        match content.source {
            Some(source) => ContextItem::DocumentWithMetadata {
                text: content.text,
                source,
            },
            None => ContextItem::RawText(content.text),
        }
    }
}
