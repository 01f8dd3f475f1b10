//! Append-only history of analyzed articles.
//!
//! Records are written once and never updated or deleted. The SQLite
//! implementation opens a fresh connection for every operation (connect,
//! execute, commit, close); it holds no long-lived handle, and concurrent
//! writers are serialised by SQLite itself.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE news (
//!     id INTEGER PRIMARY KEY AUTOINCREMENT,
//!     title TEXT, publish_date TEXT, content TEXT, url TEXT,
//!     summary TEXT, sentiment TEXT, ner TEXT
//! )
//! ```
//!
//! Date filtering compares `publish_date` as text. Sentinel dates such as
//! `date unknown` therefore sort after every numeric date and fall outside
//! most ranges, but nothing guarantees it.

use crate::errors::StoreError;
use crate::models::{Analysis, Article, StoredRecord};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{Connection, Row};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// Maximum number of records a history query returns.
pub const QUERY_LIMIT: i64 = 10;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS news (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        publish_date TEXT NOT NULL,
        content TEXT NOT NULL,
        url TEXT NOT NULL,
        summary TEXT NOT NULL,
        sentiment TEXT NOT NULL,
        ner TEXT NOT NULL
    )
"#;

/// Keyed persistence for Article+Analysis pairs.
pub trait ResultStore {
    /// Persist one pair and return the identity assigned to it.
    async fn append(&self, article: &Article, analysis: &Analysis) -> Result<i64, StoreError>;

    /// Records whose content contains `keyword` and whose `publish_date` lies in
    /// `[date_from, date_to]` (string comparison), newest date first, at most
    /// [`QUERY_LIMIT`]. An empty `keyword` matches everything. An inverted
    /// range yields an empty list.
    async fn query(
        &self,
        keyword: &str,
        date_from: &str,
        date_to: &str,
    ) -> Result<Vec<StoredRecord>, StoreError>;
}

impl<T: ResultStore> ResultStore for &T {
    async fn append(&self, article: &Article, analysis: &Analysis) -> Result<i64, StoreError> {
        (**self).append(article, analysis).await
    }

    async fn query(
        &self,
        keyword: &str,
        date_from: &str,
        date_to: &str,
    ) -> Result<Vec<StoredRecord>, StoreError> {
        (**self).query(keyword, date_from, date_to).await
    }
}

/// SQLite-backed [`ResultStore`].
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db_path: PathBuf,
}

impl SqliteStore {
    /// Create the database file and table if they do not exist yet.
    #[instrument(level = "info", skip_all, fields(path = %db_path.as_ref().display()))]
    pub async fn open(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let store = Self { db_path };

        let mut conn = store.connect().await?;
        sqlx::query(SCHEMA).execute(&mut conn).await?;
        conn.close().await?;

        info!("Result store ready");
        Ok(store)
    }

    async fn connect(&self) -> Result<SqliteConnection, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(&self.db_path)
            .create_if_missing(true);
        Ok(SqliteConnection::connect_with(&options).await?)
    }
}

impl ResultStore for SqliteStore {
    #[instrument(level = "info", skip_all, fields(url = %article.url))]
    async fn append(&self, article: &Article, analysis: &Analysis) -> Result<i64, StoreError> {
        let mut conn = self.connect().await?;
        let mut tx = conn.begin().await?;
        let id = sqlx::query(
            r#"
            INSERT INTO news
            (title, publish_date, content, url, summary, sentiment, ner)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&article.title)
        .bind(&article.publish_date)
        .bind(&article.content)
        .bind(&article.url)
        .bind(&analysis.summary)
        .bind(&analysis.sentiment)
        .bind(&analysis.ner)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();
        tx.commit().await?;
        conn.close().await?;

        info!(id, "Stored analyzed article");
        Ok(id)
    }

    #[instrument(level = "info", skip(self))]
    async fn query(
        &self,
        keyword: &str,
        date_from: &str,
        date_to: &str,
    ) -> Result<Vec<StoredRecord>, StoreError> {
        let pattern = format!("%{}%", escape_like(keyword));
        let mut conn = self.connect().await?;
        let rows = sqlx::query(
            r#"
            SELECT id, title, publish_date, content, url, summary, sentiment, ner
            FROM news
            WHERE content LIKE ? ESCAPE '\' AND publish_date BETWEEN ? AND ?
            ORDER BY publish_date DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(pattern)
        .bind(date_from)
        .bind(date_to)
        .bind(QUERY_LIMIT)
        .fetch_all(&mut conn)
        .await?;
        conn.close().await?;

        let records = rows
            .iter()
            .map(record_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        debug!(count = records.len(), "History query finished");
        Ok(records)
    }
}

fn record_from_row(row: &SqliteRow) -> Result<StoredRecord, sqlx::Error> {
    Ok(StoredRecord {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        publish_date: row.try_get("publish_date")?,
        content: row.try_get("content")?,
        url: row.try_get("url")?,
        summary: row.try_get("summary")?,
        sentiment: row.try_get("sentiment")?,
        ner: row.try_get("ner")?,
    })
}

/// Escape LIKE wildcards so the keyword matches literally.
fn escape_like(keyword: &str) -> String {
    let mut out = String::with_capacity(keyword.len());
    for c in keyword.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
