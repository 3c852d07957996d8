//! In-memory stores for tests and ephemeral pipelines.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock` for thread safety.
//! Vector search is brute-force cosine similarity over all stored vectors.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::StoredContent;

use super::{top_k, ContentStore, VectorStore};

fn poisoned() -> anyhow::Error {
    anyhow::anyhow!("in-memory store lock poisoned")
}

struct StoredVector {
    id: String,
    _summary: String,
    vector: Vec<f32>,
}

/// In-memory [`VectorStore`].
#[derive(Default)]
pub struct MemoryVectorStore {
    vectors: RwLock<Vec<StoredVector>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn upsert(&self, id: &str, summary: &str, vector: &[f32]) -> Result<()> {
        let mut vectors = self.vectors.write().map_err(|_| poisoned())?;
        vectors.retain(|sv| sv.id != id);
        vectors.push(StoredVector {
            id: id.to_string(),
            _summary: summary.to_string(),
            vector: vector.to_vec(),
        });
        Ok(())
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<String>> {
        let vectors = self.vectors.read().map_err(|_| poisoned())?;
        let scored = vectors
            .iter()
            .map(|sv| (sv.id.clone(), cosine_similarity(query, &sv.vector)))
            .collect();
        Ok(top_k(scored, k))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.vectors
            .write()
            .map_err(|_| poisoned())?
            .retain(|sv| sv.id != id);
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.vectors.read().map_err(|_| poisoned())?.len())
    }
}

/// In-memory [`ContentStore`].
#[derive(Default)]
pub struct MemoryContentStore {
    contents: RwLock<HashMap<String, StoredContent>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.contents.read().map(|c| c.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn set(&self, id: &str, content: &StoredContent) -> Result<()> {
        self.contents
            .write()
            .map_err(|_| poisoned())?
            .insert(id.to_string(), content.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<StoredContent>> {
        Ok(self.contents.read().map_err(|_| poisoned())?.get(id).cloned())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.contents.write().map_err(|_| poisoned())?.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn vector_search_orders_by_similarity() {
        let store = MemoryVectorStore::new();
        store.upsert("far", "s", &[0.0, 1.0]).await.unwrap();
        store.upsert("near", "s", &[1.0, 0.1]).await.unwrap();
        store.upsert("mid", "s", &[1.0, 1.0]).await.unwrap();

        let ids = store.search(&[1.0, 0.0], 2).await.unwrap();
        assert_eq!(ids, vec!["near".to_string(), "mid".to_string()]);
    }

    #[tokio::test]
    async fn upsert_replaces_and_delete_removes() {
        let store = MemoryVectorStore::new();
        store.upsert("a", "one", &[1.0]).await.unwrap();
        store.upsert("a", "two", &[1.0]).await.unwrap();
        assert_eq!(store.len().await.unwrap(), 1);
        store.delete("a").await.unwrap();
        store.delete("a").await.unwrap();
        assert_eq!(store.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn content_roundtrip() {
        let store = MemoryContentStore::new();
        let content = StoredContent::with_source("Revenue grew.", "q4.txt");
        store.set("id-1", &content).await.unwrap();
        assert_eq!(store.get("id-1").await.unwrap(), Some(content));
        assert_eq!(store.get("missing").await.unwrap(), None);
        store.delete("id-1").await.unwrap();
        assert!(store.is_empty());
    }
}
