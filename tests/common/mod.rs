//! Stub collaborators shared by the integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use finrag::embedding::Embedder;
use finrag::error::IngestionError;
use finrag::llm::GenerativeModel;
use finrag::loader::{CorpusLoader, DirectoryLoader, LoadedCorpus};
use finrag::pipeline::{Collaborators, Pipeline, PipelineSettings};

const DIMS: usize = 64;

/// Hashes lowercase words into a fixed number of buckets.
pub struct BagOfWords;

#[async_trait]
impl Embedder for BagOfWords {
    fn model_name(&self) -> &str {
        "bag-of-words"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| bag_of_words(t)).collect())
    }
}

fn bag_of_words(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0; DIMS];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let mut hash: u64 = 0xcbf29ce484222325;
        for byte in word.to_lowercase().bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        vector[(hash % DIMS as u64) as usize] += 1.0;
    }
    vector
}

/// Returns the prompt it was given and counts calls.
#[derive(Default)]
pub struct EchoModel {
    pub calls: AtomicUsize,
}

impl EchoModel {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerativeModel for EchoModel {
    fn model_name(&self) -> &str {
        "echo"
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(prompt.to_string())
    }
}

/// Fails every call.
pub struct DownModel;

#[async_trait]
impl GenerativeModel for DownModel {
    fn model_name(&self) -> &str {
        "down"
    }

    async fn generate(&self, _prompt: &str) -> Result<String> {
        anyhow::bail!("model unavailable")
    }
}

/// A [`DirectoryLoader`] that counts loads and can be slowed down to widen
/// race windows.
pub struct CountingLoader {
    inner: DirectoryLoader,
    delay: Duration,
    pub loads: AtomicUsize,
}

impl CountingLoader {
    pub fn new(root: &Path) -> Self {
        Self {
            inner: DirectoryLoader::new(root),
            delay: Duration::ZERO,
            loads: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CorpusLoader for CountingLoader {
    fn describe(&self) -> String {
        self.inner.describe()
    }

    async fn load(&self) -> Result<LoadedCorpus, IngestionError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.load().await
    }

    async fn fingerprint(&self) -> Result<Option<String>, IngestionError> {
        self.inner.fingerprint().await
    }
}

/// Panics while loading, as a buggy extractor would.
pub struct PanickingLoader;

#[async_trait]
impl CorpusLoader for PanickingLoader {
    fn describe(&self) -> String {
        "panicking loader".to_string()
    }

    async fn load(&self) -> Result<LoadedCorpus, IngestionError> {
        panic!("extractor blew up")
    }
}

/// Temporary corpus and index directories.
pub struct Workspace {
    pub dir: tempfile::TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("data")).unwrap();
        Self { dir }
    }

    pub fn corpus(&self) -> PathBuf {
        self.dir.path().join("data")
    }

    pub fn index(&self) -> PathBuf {
        self.dir.path().join("rag_index")
    }

    pub fn write(&self, name: &str, contents: &[u8]) {
        std::fs::write(self.corpus().join(name), contents).unwrap();
    }

    pub fn settings(&self) -> PipelineSettings {
        PipelineSettings {
            index_dir: self.index(),
            chunk_size: 200,
            chunk_overlap: 20,
            embed_batch_size: 16,
            ..PipelineSettings::default()
        }
    }
}

/// Handles to the stubs behind a test pipeline.
pub struct Harness {
    pub pipeline: Arc<Pipeline>,
    pub loader: Arc<CountingLoader>,
    pub summary_model: Arc<EchoModel>,
    pub answer_model: Arc<EchoModel>,
}

pub fn harness(settings: PipelineSettings, loader: CountingLoader) -> Harness {
    let loader = Arc::new(loader);
    let summary_model = Arc::new(EchoModel::default());
    let answer_model = Arc::new(EchoModel::default());
    let pipeline = Pipeline::new(
        settings,
        Collaborators {
            loader: loader.clone(),
            embedder: Arc::new(BagOfWords),
            summary_model: summary_model.clone(),
            answer_model: answer_model.clone(),
        },
    );
    Harness {
        pipeline: Arc::new(pipeline),
        loader,
        summary_model,
        answer_model,
    }
}
