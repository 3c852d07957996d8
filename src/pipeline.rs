//! Pipeline initialization and the query entry point.
//!
//! A [`Pipeline`] starts [`Uninitialized`](PipelineState::Uninitialized).
//! The first query (or an explicit [`Pipeline::initialize`]) either loads
//! the persisted index or builds one from the corpus:
//!
//! ```text
//! Uninitialized ──▶ LoadingPersisted ──▶ Ready
//!        │                 │
//!        │                 ▼ (no completion record / stale + rebuild_on_change)
//!        └────────────▶ Building ──▶ Ready
//! ```
//!
//! A build runs Loader → Chunker → Summarizer → [`DualIndex::add`] into
//! staging tables, then promotes them together with the completion record.
//! A failed rebuild leaves the previous index on disk.
//!
//! Initialization is memoized in a [`tokio::sync::OnceCell`]: concurrent
//! first callers wait on a single attempt, and a failed attempt leaves the
//! cell empty so the next query retries from scratch. The attempt runs in
//! its own task, so a caller that stops waiting (a dropped request, a
//! timeout) does not abandon a half-finished build.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::{error, info, warn};

use crate::chunk::split_documents;
use crate::config::Config;
use crate::embedding::{create_embedder, Embedder};
use crate::error::{InitializationFailure, RagError};
use crate::generate::{GenerationChain, RagChain};
use crate::index::DualIndex;
use crate::llm::{create_model, GenerativeModel};
use crate::loader::{CorpusLoader, DirectoryLoader};
use crate::models::StoredContent;
use crate::retriever::Retriever;
use crate::store::{IndexManifest, SqliteIndex};
use crate::summarize::Summarizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Uninitialized,
    LoadingPersisted,
    Building,
    Ready,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PipelineState::Uninitialized => "uninitialized",
            PipelineState::LoadingPersisted => "loading_persisted",
            PipelineState::Building => "building",
            PipelineState::Ready => "ready",
        };
        f.write_str(name)
    }
}

/// Tunables for one pipeline, usually taken from [`Config`].
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub index_dir: PathBuf,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub k: usize,
    pub summarize_texts: bool,
    pub rebuild_on_change: bool,
    pub embed_batch_size: usize,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            index_dir: config.index.dir.clone(),
            chunk_size: config.chunking.chunk_size,
            chunk_overlap: config.chunking.chunk_overlap,
            k: config.retrieval.k,
            summarize_texts: config.summarizer.summarize_texts,
            rebuild_on_change: config.index.rebuild_on_change,
            embed_batch_size: config.embedding.batch_size,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// External services the pipeline depends on.
#[derive(Clone)]
pub struct Collaborators {
    pub loader: Arc<dyn CorpusLoader>,
    pub embedder: Arc<dyn Embedder>,
    pub summary_model: Arc<dyn GenerativeModel>,
    pub answer_model: Arc<dyn GenerativeModel>,
}

impl Collaborators {
    /// Directory loader plus the configured embedding and model providers.
    /// The same model instance serves summarization and answering.
    pub fn from_config(config: &Config) -> Result<Self> {
        let model = create_model(&config.model)?;
        Ok(Self {
            loader: Arc::new(DirectoryLoader::from_config(&config.corpus)),
            embedder: create_embedder(&config.embedding)?,
            summary_model: model.clone(),
            answer_model: model,
        })
    }
}

/// Counts from the most recent index build.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BuildReport {
    pub files_succeeded: usize,
    pub files_failed: Vec<(PathBuf, String)>,
    pub units: usize,
    pub chunks: usize,
    pub entries: usize,
}

/// How the pipeline reached [`PipelineState::Ready`].
#[derive(Debug, Clone, PartialEq)]
pub enum IndexOrigin {
    Loaded(IndexManifest),
    Built(BuildReport),
}

/// Snapshot of a persisted index, read without initializing a pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexStatus {
    pub path: PathBuf,
    pub manifest: Option<IndexManifest>,
    pub entries: usize,
    pub orphans: usize,
}

/// Inspect the index in `dir`. Returns `None` when no index exists.
pub async fn inspect_index(dir: &Path) -> Result<Option<IndexStatus>> {
    if !SqliteIndex::exists(dir) {
        return Ok(None);
    }
    let store = SqliteIndex::open(dir).await?;
    let status = IndexStatus {
        path: store.path().to_path_buf(),
        manifest: store.manifest().await?,
        entries: crate::store::VectorStore::len(&store).await?,
        orphans: store.orphaned_ids().await?.len(),
    };
    store.close().await;
    Ok(Some(status))
}

struct Ready {
    chain: Arc<RagChain>,
    origin: IndexOrigin,
}

pub struct Pipeline {
    init: Initializer,
    ready: Arc<OnceCell<Ready>>,
}

impl Pipeline {
    pub fn new(settings: PipelineSettings, collaborators: Collaborators) -> Self {
        Self {
            init: Initializer {
                settings,
                collaborators,
                state: Arc::new(RwLock::new(PipelineState::Uninitialized)),
            },
            ready: Arc::new(OnceCell::new()),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            PipelineSettings::from_config(config),
            Collaborators::from_config(config)?,
        ))
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.init.settings
    }

    pub fn state(&self) -> PipelineState {
        self.init.state()
    }

    /// How the index was obtained, once the pipeline is ready.
    pub fn origin(&self) -> Option<&IndexOrigin> {
        self.ready.get().map(|r| &r.origin)
    }

    /// Load or build the index if that has not happened yet.
    pub async fn initialize(&self) -> Result<&IndexOrigin, InitializationFailure> {
        Ok(&self.ready().await?.origin)
    }

    /// The memoized retrieval + generation chain.
    pub async fn chain(&self) -> Result<Arc<RagChain>, InitializationFailure> {
        Ok(self.ready().await?.chain.clone())
    }

    async fn ready(&self) -> Result<&Ready, InitializationFailure> {
        if let Some(ready) = self.ready.get() {
            return Ok(ready);
        }

        let cell = self.ready.clone();
        let init = self.init.clone();
        let attempt = tokio::spawn(async move {
            cell.get_or_try_init(|| init.run()).await.map(|_| ())
        });

        match attempt.await {
            Ok(result) => result?,
            Err(join_err) => {
                error!(error = %join_err, "pipeline initialization aborted");
                return Err(InitializationFailure::Aborted(join_err.to_string()));
            }
        }
        self.ready.get().ok_or_else(|| {
            InitializationFailure::Aborted("initialization finished without a result".to_string())
        })
    }

    /// Answer `query`, reporting failures as typed errors.
    pub async fn try_answer(&self, query: &str) -> Result<String, RagError> {
        if query.trim().is_empty() {
            return Err(RagError::EmptyQuery);
        }
        let chain = self.chain().await.map_err(RagError::Initialization)?;
        chain.invoke(query).await
    }

    /// Answer `query`. Never fails: errors are rendered into the returned text.
    pub async fn answer(&self, query: &str) -> String {
        match self.try_answer(query).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!(error = %e, "query failed");
                e.to_string()
            }
        }
    }
}

/// Everything one initialization attempt needs, detached from the
/// [`Pipeline`] so the attempt can run as its own task.
#[derive(Clone)]
struct Initializer {
    settings: PipelineSettings,
    collaborators: Collaborators,
    state: Arc<RwLock<PipelineState>>,
}

/// Puts an in-progress state back to `Uninitialized` if the attempt unwinds
/// or its task is aborted before reaching a final state.
struct StateGuard(Arc<RwLock<PipelineState>>);

impl Drop for StateGuard {
    fn drop(&mut self) {
        if let Ok(mut state) = self.0.write() {
            if matches!(*state, PipelineState::LoadingPersisted | PipelineState::Building) {
                *state = PipelineState::Uninitialized;
            }
        }
    }
}

impl Initializer {
    fn state(&self) -> PipelineState {
        self.state
            .read()
            .map(|s| *s)
            .unwrap_or(PipelineState::Uninitialized)
    }

    fn set_state(&self, next: PipelineState) {
        if let Ok(mut state) = self.state.write() {
            *state = next;
        }
    }

    async fn run(&self) -> Result<Ready, InitializationFailure> {
        let _guard = StateGuard(self.state.clone());
        let result = self.open_or_build().await;
        match &result {
            Ok(_) => self.set_state(PipelineState::Ready),
            Err(e) => {
                error!(error = %e, "pipeline initialization failed");
                self.set_state(PipelineState::Uninitialized);
            }
        }
        result
    }

    async fn open_or_build(&self) -> Result<Ready, InitializationFailure> {
        let dir = &self.settings.index_dir;
        let persisted = SqliteIndex::exists(dir);
        self.set_state(if persisted {
            PipelineState::LoadingPersisted
        } else {
            PipelineState::Building
        });

        let store = SqliteIndex::open(dir)
            .await
            .map_err(InitializationFailure::Storage)?;

        let manifest = if persisted {
            store
                .manifest()
                .await
                .map_err(InitializationFailure::Storage)?
        } else {
            None
        };

        let origin = match manifest {
            Some(manifest) if self.accept_persisted(&manifest).await => {
                info!(
                    path = %store.path().display(),
                    entries = manifest.entries,
                    built_at = %manifest.built_at,
                    "using persisted index"
                );
                IndexOrigin::Loaded(manifest)
            }
            manifest => {
                if persisted && manifest.is_none() {
                    warn!(path = %store.path().display(), "discarding incomplete index");
                }
                self.set_state(PipelineState::Building);
                IndexOrigin::Built(self.build(&store).await?)
            }
        };

        let store = Arc::new(store);
        let index = DualIndex::new(self.collaborators.embedder.clone(), store.clone(), store)
            .with_batch_size(self.settings.embed_batch_size);
        let retriever = Retriever::new(Arc::new(index), self.settings.k);
        let generation = GenerationChain::new(self.collaborators.answer_model.clone());
        Ok(Ready {
            chain: Arc::new(RagChain::new(retriever, generation)),
            origin,
        })
    }

    /// Whether a complete persisted index may be served as is.
    async fn accept_persisted(&self, manifest: &IndexManifest) -> bool {
        let mut stale = false;

        let current_model = self.collaborators.embedder.model_name();
        if !manifest.embedding_model.is_empty() && manifest.embedding_model != current_model {
            warn!(
                indexed_with = %manifest.embedding_model,
                configured = %current_model,
                "persisted index was built with a different embedding model"
            );
            stale = true;
        }

        // A persisted index must stay usable without the corpus, so a failed
        // fingerprint only disables the check.
        match self.collaborators.loader.fingerprint().await {
            Ok(Some(current)) => {
                if manifest.corpus_fingerprint.as_deref().is_some_and(|fp| fp != current) {
                    warn!("corpus changed since the persisted index was built");
                    stale = true;
                }
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "could not fingerprint corpus; skipping staleness check"),
        }

        if stale && self.settings.rebuild_on_change {
            info!("rebuilding stale index (index.rebuild_on_change = true)");
            return false;
        }
        true
    }

    /// Build into staging tables and promote them on success.
    async fn build(&self, store: &SqliteIndex) -> Result<BuildReport, InitializationFailure> {
        let staging = store
            .staging()
            .await
            .map_err(InitializationFailure::Storage)?;
        let result = self.build_into(&staging).await;
        if result.is_err() {
            if let Err(e) = staging.discard().await {
                warn!(error = %e, "could not drop staging tables");
            }
        }
        result
    }

    async fn build_into(&self, staging: &SqliteIndex) -> Result<BuildReport, InitializationFailure> {
        let loader = &self.collaborators.loader;
        info!(corpus = %loader.describe(), "building index");

        let fingerprint = loader.fingerprint().await?;
        let corpus = loader.load().await?;
        let chunks = split_documents(
            &corpus.units,
            self.settings.chunk_size,
            self.settings.chunk_overlap,
        )?;
        info!(
            files = corpus.report.succeeded.len(),
            failed = corpus.report.failed.len(),
            units = corpus.units.len(),
            chunks = chunks.len(),
            "corpus loaded"
        );

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let contents: Vec<StoredContent> = chunks.iter().map(StoredContent::from).collect();
        let summaries = Summarizer::new(self.collaborators.summary_model.clone())
            .summarize(&texts, &[], self.settings.summarize_texts)
            .await?;

        let staged = Arc::new(staging.clone());
        let index = DualIndex::new(self.collaborators.embedder.clone(), staged.clone(), staged)
            .with_batch_size(self.settings.embed_batch_size);
        let added = index.add(&summaries.texts, &contents).await?;

        let manifest = IndexManifest {
            corpus_fingerprint: fingerprint,
            entries: added.len(),
            built_at: Utc::now(),
            embedding_model: index.embedding_model().to_string(),
        };
        staging
            .promote(&manifest)
            .await
            .map_err(InitializationFailure::Storage)?;

        let report = BuildReport {
            files_succeeded: corpus.report.succeeded.len(),
            files_failed: corpus.report.failed,
            units: corpus.units.len(),
            chunks: chunks.len(),
            entries: added.len(),
        };
        info!(entries = report.entries, path = %staging.path().display(), "index build complete");
        Ok(report)
    }
}
