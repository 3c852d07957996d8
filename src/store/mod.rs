//! Storage abstraction for the dual index.
//!
//! The dual index keeps two stores linked by a summary id:
//!
//! - a [`VectorStore`] holding `(id, summary, embedding)` for similarity search;
//! - a [`ContentStore`] holding `id → original content` for generation.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.
//!
//! | Backend | Module | Persistence |
//! |---------|--------|-------------|
//! | [`MemoryVectorStore`] / [`MemoryContentStore`] | [`memory`] | none |
//! | [`SqliteIndex`] (both traits) | [`sqlite`] | `<index.dir>/index.sqlite` |

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::StoredContent;

pub use memory::{MemoryContentStore, MemoryVectorStore};
pub use sqlite::{IndexManifest, SqliteIndex};

/// Similarity index over summary embeddings.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace the entry for `id`.
    async fn upsert(&self, id: &str, summary: &str, vector: &[f32]) -> Result<()>;

    /// Return up to `k` ids ordered by descending cosine similarity.
    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<String>>;

    /// Remove the entry for `id`; removing a missing id is not an error.
    async fn delete(&self, id: &str) -> Result<()>;

    /// Number of stored entries.
    async fn len(&self) -> Result<usize>;
}

/// Key-value store of original content, keyed by summary id.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn set(&self, id: &str, content: &StoredContent) -> Result<()>;

    async fn get(&self, id: &str) -> Result<Option<StoredContent>>;

    /// Remove the entry for `id`; removing a missing id is not an error.
    async fn delete(&self, id: &str) -> Result<()>;
}

/// Sort `(id, score)` pairs by descending score and keep the top `k` ids.
pub(crate) fn top_k(mut scored: Vec<(String, f32)>, k: usize) -> Vec<String> {
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(k);
    scored.into_iter().map(|(id, _)| id).collect()
}
