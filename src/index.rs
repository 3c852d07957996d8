//! The dual index: summary vectors for search, original content for answers.
//!
//! Every entry gets a fresh UUID that keys both halves. A search embeds the
//! query, ranks summary vectors, and resolves each hit back to its original
//! content, so the generation chain never sees summaries.
//!
//! # Consistency
//!
//! Writes go vector first, then content. If the content write fails the
//! vector entry is deleted again so no search can return an id without
//! content. Should that rollback also fail the error is surfaced as
//! [`IndexError::Inconsistent`]; a search that still hits such an id logs an
//! [`IndexConsistencyFault`] and skips it.

use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::embedding::Embedder;
use crate::error::{IndexConsistencyFault, IndexError};
use crate::models::{ContextItem, StoredContent, Summary};
use crate::store::{ContentStore, VectorStore};

const DEFAULT_EMBED_BATCH: usize = 64;

pub struct DualIndex {
    embedder: Arc<dyn Embedder>,
    vectors: Arc<dyn VectorStore>,
    contents: Arc<dyn ContentStore>,
    batch_size: usize,
}

impl DualIndex {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        vectors: Arc<dyn VectorStore>,
        contents: Arc<dyn ContentStore>,
    ) -> Self {
        Self {
            embedder,
            vectors,
            contents,
            batch_size: DEFAULT_EMBED_BATCH,
        }
    }

    /// Number of summaries embedded per embedder call during [`add`](Self::add).
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn embedding_model(&self) -> &str {
        self.embedder.model_name()
    }

    /// Index `summaries[i]` as the searchable stand-in for `contents[i]`.
    ///
    /// All summaries are embedded before the first write, so an embedding
    /// failure leaves the stores untouched.
    pub async fn add(
        &self,
        summaries: &[String],
        contents: &[StoredContent],
    ) -> Result<Vec<Summary>, IndexError> {
        if summaries.len() != contents.len() {
            return Err(IndexError::LengthMismatch {
                summaries: summaries.len(),
                contents: contents.len(),
            });
        }
        if summaries.is_empty() {
            return Ok(Vec::new());
        }

        let mut vectors = Vec::with_capacity(summaries.len());
        for batch in summaries.chunks(self.batch_size) {
            let embedded = self
                .embedder
                .embed(batch)
                .await
                .map_err(IndexError::Embedding)?;
            if embedded.len() != batch.len() {
                return Err(IndexError::Embedding(anyhow::anyhow!(
                    "embedder returned {} vectors for {} inputs",
                    embedded.len(),
                    batch.len()
                )));
            }
            vectors.extend(embedded);
        }

        let mut added = Vec::with_capacity(summaries.len());
        for ((summary, content), vector) in summaries.iter().zip(contents).zip(vectors) {
            let id = Uuid::new_v4().to_string();
            self.vectors
                .upsert(&id, summary, &vector)
                .await
                .map_err(IndexError::Store)?;

            if let Err(write) = self.contents.set(&id, content).await {
                if let Err(rollback) = self.vectors.delete(&id).await {
                    return Err(IndexError::Inconsistent {
                        id,
                        write,
                        rollback,
                    });
                }
                return Err(IndexError::Store(write));
            }

            debug!(%id, "indexed summary");
            added.push(Summary {
                source_id: id.clone(),
                id,
                content: summary.clone(),
            });
        }
        Ok(added)
    }

    /// Return the original content behind the `k` summaries closest to `query`.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<ContextItem>, IndexError> {
        let vector = self
            .embedder
            .embed_one(query)
            .await
            .map_err(IndexError::Embedding)?;
        let ids = self
            .vectors
            .search(&vector, k)
            .await
            .map_err(IndexError::Store)?;

        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            match self.contents.get(&id).await.map_err(IndexError::Store)? {
                Some(content) => items.push(ContextItem::from(content)),
                None => {
                    let fault = IndexConsistencyFault { id };
                    warn!(error = %fault, "skipping search hit");
                }
            }
        }
        Ok(items)
    }

    pub async fn len(&self) -> Result<usize, IndexError> {
        self.vectors.len().await.map_err(IndexError::Store)
    }

    pub async fn is_empty(&self) -> Result<bool, IndexError> {
        Ok(self.len().await? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryContentStore, MemoryVectorStore};
    use anyhow::Result;
    use async_trait::async_trait;

    const VOCAB: &[&str] = &["revenue", "q4", "debt", "bonds", "cash", "margin"];

    /// Counts vocabulary words; good enough to make texts retrieve themselves.
    struct BagOfWords;

    #[async_trait]
    impl Embedder for BagOfWords {
        fn model_name(&self) -> &str {
            "bag-of-words"
        }

        fn dims(&self) -> usize {
            VOCAB.len()
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let lower = t.to_lowercase();
                    VOCAB
                        .iter()
                        .map(|w| lower.matches(w).count() as f32)
                        .collect()
                })
                .collect())
        }
    }

    struct FailingContents;

    #[async_trait]
    impl ContentStore for FailingContents {
        async fn set(&self, _id: &str, _content: &StoredContent) -> Result<()> {
            anyhow::bail!("disk full")
        }

        async fn get(&self, _id: &str) -> Result<Option<StoredContent>> {
            Ok(None)
        }

        async fn delete(&self, _id: &str) -> Result<()> {
            Ok(())
        }
    }

    fn memory_index() -> (DualIndex, Arc<MemoryVectorStore>, Arc<MemoryContentStore>) {
        let vectors = Arc::new(MemoryVectorStore::new());
        let contents = Arc::new(MemoryContentStore::new());
        let index = DualIndex::new(Arc::new(BagOfWords), vectors.clone(), contents.clone());
        (index, vectors, contents)
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn each_summary_retrieves_its_own_content() {
        let (index, _, contents) = memory_index();
        let summaries = strings(&["revenue q4", "debt bonds", "cash margin"]);
        let originals = vec![
            StoredContent::with_source("Revenue grew 10% in Q4.", "q4.txt"),
            StoredContent::with_source("The company issued bonds to refinance debt.", "debt.txt"),
            StoredContent::raw("Cash position improved; margin stable."),
        ];

        let added = index.add(&summaries, &originals).await.unwrap();
        assert_eq!(added.len(), 3);
        assert_eq!(contents.len(), 3);
        assert!(added.iter().all(|s| s.id == s.source_id));

        for (summary, original) in summaries.iter().zip(&originals) {
            let hits = index.search(summary, 1).await.unwrap();
            assert_eq!(hits, vec![ContextItem::from(original.clone())]);
        }
    }

    #[tokio::test]
    async fn mismatched_lengths_write_nothing() {
        let (index, vectors, contents) = memory_index();
        let err = index
            .add(&strings(&["a", "b"]), &[StoredContent::raw("a")])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            IndexError::LengthMismatch {
                summaries: 2,
                contents: 1
            }
        ));
        assert_eq!(vectors.len().await.unwrap(), 0);
        assert!(contents.is_empty());
    }

    #[tokio::test]
    async fn empty_input_is_a_no_op() {
        let (index, _, _) = memory_index();
        assert!(index.add(&[], &[]).await.unwrap().is_empty());
        assert!(index.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn failed_content_write_rolls_back_vector() {
        let vectors = Arc::new(MemoryVectorStore::new());
        let index = DualIndex::new(Arc::new(BagOfWords), vectors.clone(), Arc::new(FailingContents));

        let err = index
            .add(&strings(&["revenue"]), &[StoredContent::raw("Revenue grew.")])
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::Store(_)));
        assert_eq!(vectors.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn hit_without_content_is_skipped() {
        let (index, vectors, _) = memory_index();
        index
            .add(&strings(&["revenue q4"]), &[StoredContent::raw("Revenue grew.")])
            .await
            .unwrap();
        vectors.upsert("orphan", "revenue", &[1.0, 0.0, 0.0, 0.0, 0.0, 0.0]).await.unwrap();

        let hits = index.search("revenue", 5).await.unwrap();
        assert_eq!(hits, vec![ContextItem::RawText("Revenue grew.".to_string())]);
    }

    #[tokio::test]
    async fn search_on_empty_index_returns_nothing() {
        let (index, _, _) = memory_index();
        assert!(index.search("revenue", 5).await.unwrap().is_empty());
    }
}
