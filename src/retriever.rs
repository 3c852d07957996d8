//! Fixed-`k` retrieval over the dual index.

use std::sync::Arc;

use crate::error::IndexError;
use crate::index::DualIndex;
use crate::models::ContextItem;

pub const DEFAULT_K: usize = 5;

#[derive(Clone)]
pub struct Retriever {
    index: Arc<DualIndex>,
    k: usize,
}

impl Retriever {
    pub fn new(index: Arc<DualIndex>, k: usize) -> Self {
        Self { index, k }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn index(&self) -> &Arc<DualIndex> {
        &self.index
    }

    /// Up to `k` context items, most relevant first.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<ContextItem>, IndexError> {
        self.index.search(query, self.k).await
    }
}
