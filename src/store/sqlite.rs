//! SQLite-backed persisted dual index.
//!
//! One database file, `<index.dir>/index.sqlite`, holds both halves of the
//! dual index plus a manifest:
//!
//! | Table | Contents |
//! |-------|----------|
//! | `summaries` | `id`, summary text, embedding BLOB (little-endian f32) |
//! | `contents` | `id`, original text, source path |
//! | `index_meta` | key/value manifest written when a build completes |
//!
//! An index without a manifest is a partial build and must not be served.
//! Builds write into `summaries_staging` / `contents_staging` through a
//! [`SqliteIndex::staging`] handle; [`SqliteIndex::promote`] swaps them in
//! and writes the manifest in one transaction, so a failed rebuild leaves
//! the previous index untouched.
//! Vector search is brute-force cosine similarity computed in Rust.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::models::StoredContent;

use super::{top_k, ContentStore, VectorStore};

const DB_FILE: &str = "index.sqlite";

const META_FINGERPRINT: &str = "corpus_fingerprint";
const META_ENTRIES: &str = "entries";
const META_BUILT_AT: &str = "built_at";
const META_EMBEDDING_MODEL: &str = "embedding_model";

/// Table names one handle reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Tables {
    summaries: &'static str,
    contents: &'static str,
}

const LIVE: Tables = Tables {
    summaries: "summaries",
    contents: "contents",
};

const STAGING: Tables = Tables {
    summaries: "summaries_staging",
    contents: "contents_staging",
};

/// Record written when an index build completes.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexManifest {
    pub corpus_fingerprint: Option<String>,
    pub entries: usize,
    pub built_at: DateTime<Utc>,
    pub embedding_model: String,
}

/// Persisted vector + content store sharing one SQLite pool.
#[derive(Clone)]
pub struct SqliteIndex {
    pool: SqlitePool,
    path: PathBuf,
    tables: Tables,
}

impl SqliteIndex {
    /// Path of the database file inside an index directory.
    pub fn db_path(dir: &Path) -> PathBuf {
        dir.join(DB_FILE)
    }

    /// Whether an index database exists in `dir` (complete or not).
    pub fn exists(dir: &Path) -> bool {
        Self::db_path(dir).is_file()
    }

    /// Open (creating if missing) the index database in `dir` and ensure
    /// the schema exists.
    pub async fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create index directory: {}", dir.display()))?;
        let path = Self::db_path(dir);

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open index database: {}", path.display()))?;

        let index = Self {
            pool,
            path,
            tables: LIVE,
        };
        index.migrate().await?;
        Ok(index)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn migrate(&self) -> Result<()> {
        self.create_tables(LIVE).await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS index_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn create_tables(&self, tables: Tables) -> Result<()> {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id TEXT PRIMARY KEY,
                summary TEXT NOT NULL,
                embedding BLOB NOT NULL,
                dims INTEGER NOT NULL
            )
            "#,
            tables.summaries
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id TEXT PRIMARY KEY,
                text TEXT NOT NULL,
                source TEXT
            )
            "#,
            tables.contents
        ))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn drop_tables(&self, tables: Tables) -> Result<()> {
        for table in [tables.summaries, tables.contents] {
            sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    /// A handle on empty staging tables in the same database. Leftovers
    /// from an earlier failed build are dropped first.
    pub async fn staging(&self) -> Result<Self> {
        self.drop_tables(STAGING).await?;
        self.create_tables(STAGING).await?;
        Ok(Self {
            tables: STAGING,
            ..self.clone()
        })
    }

    /// Drop the staging tables behind this handle.
    pub async fn discard(&self) -> Result<()> {
        if self.tables != STAGING {
            bail!("only a staging index can be discarded");
        }
        self.drop_tables(STAGING).await
    }

    /// Replace the live tables with this staging handle's tables and write
    /// the completion manifest, atomically. Until this commits, readers of
    /// the live tables keep seeing the previous index.
    pub async fn promote(&self, manifest: &IndexManifest) -> Result<()> {
        if self.tables != STAGING {
            bail!("only a staging index can be promoted");
        }

        let mut tx = self.pool.begin().await?;
        for (live, staged) in [
            (LIVE.summaries, STAGING.summaries),
            (LIVE.contents, STAGING.contents),
        ] {
            sqlx::query(&format!("DROP TABLE IF EXISTS {}", live))
                .execute(&mut *tx)
                .await?;
            sqlx::query(&format!("ALTER TABLE {} RENAME TO {}", staged, live))
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query("DELETE FROM index_meta")
            .execute(&mut *tx)
            .await?;
        let mut pairs = vec![
            (META_ENTRIES, manifest.entries.to_string()),
            (META_BUILT_AT, manifest.built_at.to_rfc3339()),
            (META_EMBEDDING_MODEL, manifest.embedding_model.clone()),
        ];
        if let Some(fp) = &manifest.corpus_fingerprint {
            pairs.push((META_FINGERPRINT, fp.clone()));
        }
        for (key, value) in pairs {
            sqlx::query("INSERT INTO index_meta (key, value) VALUES (?, ?)")
                .bind(key)
                .bind(value)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Read the completion manifest, if the build that produced this index finished.
    pub async fn manifest(&self) -> Result<Option<IndexManifest>> {
        let rows = sqlx::query("SELECT key, value FROM index_meta")
            .fetch_all(&self.pool)
            .await?;
        let lookup = |key: &str| -> Option<String> {
            rows.iter()
                .find(|r| r.get::<String, _>("key") == key)
                .map(|r| r.get::<String, _>("value"))
        };

        let Some(built_at) = lookup(META_BUILT_AT) else {
            return Ok(None);
        };
        let built_at = DateTime::parse_from_rfc3339(&built_at)
            .context("Corrupt index manifest: built_at")?
            .with_timezone(&Utc);
        let entries = lookup(META_ENTRIES)
            .and_then(|v| v.parse().ok())
            .unwrap_or_default();

        Ok(Some(IndexManifest {
            corpus_fingerprint: lookup(META_FINGERPRINT),
            entries,
            built_at,
            embedding_model: lookup(META_EMBEDDING_MODEL).unwrap_or_default(),
        }))
    }

    /// Ids present in one half of the index but not the other.
    pub async fn orphaned_ids(&self) -> Result<Vec<String>> {
        let Tables {
            summaries,
            contents,
        } = self.tables;
        let rows = sqlx::query(&format!(
            r#"
            SELECT s.id AS id FROM {summaries} s LEFT JOIN {contents} c ON c.id = s.id WHERE c.id IS NULL
            UNION ALL
            SELECT c.id AS id FROM {contents} c LEFT JOIN {summaries} s ON s.id = c.id WHERE s.id IS NULL
            "#
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(|r| r.get("id")).collect())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl VectorStore for SqliteIndex {
    async fn upsert(&self, id: &str, summary: &str, vector: &[f32]) -> Result<()> {
        sqlx::query(&format!(
            r#"
            INSERT INTO {} (id, summary, embedding, dims) VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                summary = excluded.summary,
                embedding = excluded.embedding,
                dims = excluded.dims
            "#,
            self.tables.summaries
        ))
        .bind(id)
        .bind(summary)
        .bind(vec_to_blob(vector))
        .bind(vector.len() as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<String>> {
        let rows = sqlx::query(&format!("SELECT id, embedding FROM {}", self.tables.summaries))
            .fetch_all(&self.pool)
            .await?;

        let scored = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let similarity = cosine_similarity(query, &blob_to_vec(&blob));
                (row.get::<String, _>("id"), similarity)
            })
            .collect();

        Ok(top_k(scored, k))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        sqlx::query(&format!("DELETE FROM {} WHERE id = ?", self.tables.summaries))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", self.tables.summaries))
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }
}

#[async_trait]
impl ContentStore for SqliteIndex {
    async fn set(&self, id: &str, content: &StoredContent) -> Result<()> {
        sqlx::query(&format!(
            r#"
            INSERT INTO {} (id, text, source) VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET text = excluded.text, source = excluded.source
            "#,
            self.tables.contents
        ))
        .bind(id)
        .bind(&content.text)
        .bind(&content.source)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<StoredContent>> {
        let row = sqlx::query(&format!("SELECT text, source FROM {} WHERE id = ?", self.tables.contents))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| StoredContent {
            text: r.get("text"),
            source: r.get("source"),
        }))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        sqlx::query(&format!("DELETE FROM {} WHERE id = ?", self.tables.contents))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn open_creates_database_and_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("idx");
        assert!(!SqliteIndex::exists(&dir));

        let index = SqliteIndex::open(&dir).await.unwrap();
        assert!(SqliteIndex::exists(&dir));
        assert_eq!(index.manifest().await.unwrap(), None);
        index.close().await;

        let again = SqliteIndex::open(&dir).await.unwrap();
        assert_eq!(VectorStore::len(&again).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn entries_survive_reopen() {
        let tmp = TempDir::new().unwrap();
        {
            let index = SqliteIndex::open(tmp.path()).await.unwrap();
            index.upsert("a", "summary a", &[1.0, 0.0]).await.unwrap();
            index.upsert("b", "summary b", &[0.0, 1.0]).await.unwrap();
            index
                .set("a", &StoredContent::with_source("full a", "a.txt"))
                .await
                .unwrap();
            index.set("b", &StoredContent::raw("full b")).await.unwrap();
            index.close().await;
        }

        let index = SqliteIndex::open(tmp.path()).await.unwrap();
        assert_eq!(index.search(&[0.9, 0.1], 1).await.unwrap(), vec!["a"]);
        assert_eq!(
            index.get("b").await.unwrap(),
            Some(StoredContent::raw("full b"))
        );
        assert!(index.orphaned_ids().await.unwrap().is_empty());
    }

    fn manifest(entries: usize) -> IndexManifest {
        IndexManifest {
            corpus_fingerprint: Some("abc123".to_string()),
            entries,
            built_at: DateTime::parse_from_rfc3339("2026-01-02T03:04:05Z")
                .unwrap()
                .with_timezone(&Utc),
            embedding_model: "stub".to_string(),
        }
    }

    #[tokio::test]
    async fn promote_swaps_in_staged_entries_with_manifest() {
        let tmp = TempDir::new().unwrap();
        let index = SqliteIndex::open(tmp.path()).await.unwrap();
        index.upsert("old", "s", &[1.0]).await.unwrap();
        index.set("old", &StoredContent::raw("old text")).await.unwrap();

        let staging = index.staging().await.unwrap();
        staging.upsert("new", "s", &[1.0]).await.unwrap();
        staging.set("new", &StoredContent::raw("new text")).await.unwrap();
        // Live readers see the old entries until promotion.
        assert_eq!(index.search(&[1.0], 5).await.unwrap(), vec!["old"]);
        assert_eq!(index.manifest().await.unwrap(), None);

        staging.promote(&manifest(1)).await.unwrap();
        assert_eq!(index.manifest().await.unwrap(), Some(manifest(1)));
        assert_eq!(index.search(&[1.0], 5).await.unwrap(), vec!["new"]);
        assert_eq!(index.get("old").await.unwrap(), None);
        assert_eq!(
            index.get("new").await.unwrap(),
            Some(StoredContent::raw("new text"))
        );
    }

    #[tokio::test]
    async fn abandoned_staging_leaves_live_index_intact() {
        let tmp = TempDir::new().unwrap();
        let index = SqliteIndex::open(tmp.path()).await.unwrap();
        let first = index.staging().await.unwrap();
        first.upsert("kept", "s", &[1.0]).await.unwrap();
        first.set("kept", &StoredContent::raw("kept")).await.unwrap();
        first.promote(&manifest(1)).await.unwrap();

        let failed = index.staging().await.unwrap();
        failed.upsert("half", "s", &[1.0]).await.unwrap();
        failed.discard().await.unwrap();

        assert_eq!(index.manifest().await.unwrap(), Some(manifest(1)));
        assert_eq!(VectorStore::len(&index).await.unwrap(), 1);

        // A later staging handle starts empty even if a discard never ran.
        let leftover = index.staging().await.unwrap();
        leftover.upsert("half", "s", &[1.0]).await.unwrap();
        let fresh = index.staging().await.unwrap();
        assert_eq!(VectorStore::len(&fresh).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn live_handle_cannot_be_promoted() {
        let tmp = TempDir::new().unwrap();
        let index = SqliteIndex::open(tmp.path()).await.unwrap();
        assert!(index.promote(&manifest(0)).await.is_err());
        assert!(index.discard().await.is_err());
    }

    #[tokio::test]
    async fn orphans_are_detected() {
        let tmp = TempDir::new().unwrap();
        let index = SqliteIndex::open(tmp.path()).await.unwrap();
        index.upsert("lonely-vector", "s", &[1.0]).await.unwrap();
        index
            .set("lonely-content", &StoredContent::raw("x"))
            .await
            .unwrap();
        let mut orphans = index.orphaned_ids().await.unwrap();
        orphans.sort();
        assert_eq!(orphans, vec!["lonely-content", "lonely-vector"]);
    }
}
