//! Database operations for Reelcast

use async_trait::async_trait;
use serde::Serialize;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::path::Path;

use crate::error::{DbError, Result};
use crate::store::PostRepository;
use crate::types::{Media, MediaKind, Metrics, Post, PostStatus, PostUpdate};

const POST_COLUMNS: &str = "id, status, caption, media_kind, media_path, scheduled_for, \
     published_at, remote_post_id, remote_url, metrics, error, created_at, last_updated";

/// Post counts per status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub total: u64,
    pub scheduled: u64,
    pub publishing: u64,
    pub published: u64,
    pub failed: u64,
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection
    pub async fn new(db_path: &str) -> Result<Self> {
        // Expand path and create parent directories
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
        }

        // Forward slashes work on both Windows and Unix; mode=rwc creates the file
        let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));

        let pool = SqlitePool::connect(&db_url)
            .await
            .map_err(DbError::SqlxError)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        Ok(Self { pool })
    }

    /// All posts with the given status, oldest schedule first
    pub async fn list_by_status(&self, status: PostStatus) -> Result<Vec<Post>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM posts WHERE status = ? ORDER BY scheduled_for ASC, created_at ASC",
            POST_COLUMNS
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter().map(row_to_post).collect()
    }

    /// Scheduled posts whose time is still ahead of `now`, soonest first
    pub async fn upcoming(&self, now: i64, limit: usize) -> Result<Vec<Post>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM posts
            WHERE status = 'scheduled' AND scheduled_for IS NOT NULL AND scheduled_for > ?
            ORDER BY scheduled_for ASC
            LIMIT ?
            "#,
            POST_COLUMNS
        ))
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter().map(row_to_post).collect()
    }

    /// Count posts per status
    pub async fn stats(&self) -> Result<QueueStats> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS count FROM posts GROUP BY status")
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        let mut stats = QueueStats::default();
        for row in rows {
            let status: String = row.try_get("status").map_err(DbError::SqlxError)?;
            let count = row.try_get::<i64, _>("count").map_err(DbError::SqlxError)? as u64;
            stats.total += count;
            match status.parse::<PostStatus>() {
                Ok(PostStatus::Scheduled) => stats.scheduled = count,
                Ok(PostStatus::Publishing) => stats.publishing = count,
                Ok(PostStatus::Published) => stats.published = count,
                Ok(PostStatus::Failed) => stats.failed = count,
                Err(_) => {}
            }
        }

        Ok(stats)
    }

    async fn apply_update(
        &self,
        id: &str,
        expected: Option<PostStatus>,
        update: &PostUpdate,
    ) -> Result<Option<Post>> {
        let metrics = update
            .metrics
            .as_ref()
            .map(encode_metrics)
            .transpose()
            .map_err(|reason| DbError::CorruptRow {
                id: id.to_string(),
                reason,
            })?;
        let expected = expected.map(|s| s.as_str());

        // One statement: the status guard and the merge happen atomically
        let row = sqlx::query(&format!(
            r#"
            UPDATE posts SET
                status = COALESCE(?, status),
                scheduled_for = COALESCE(?, scheduled_for),
                published_at = COALESCE(?, published_at),
                remote_post_id = COALESCE(?, remote_post_id),
                remote_url = COALESCE(?, remote_url),
                metrics = COALESCE(?, metrics),
                error = COALESCE(?, error),
                last_updated = COALESCE(?, last_updated)
            WHERE id = ? AND (? IS NULL OR status = ?)
            RETURNING {}
            "#,
            POST_COLUMNS
        ))
        .bind(update.status.map(|s| s.as_str()))
        .bind(update.scheduled_for)
        .bind(update.published_at)
        .bind(update.remote_post_id.as_deref())
        .bind(update.remote_url.as_deref())
        .bind(metrics)
        .bind(update.error.as_deref())
        .bind(update.last_updated)
        .bind(id)
        .bind(expected)
        .bind(expected)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        row.as_ref().map(row_to_post).transpose()
    }
}

#[async_trait]
impl PostRepository for Database {
    async fn get_all(&self) -> Result<Vec<Post>> {
        let rows = sqlx::query(&format!("SELECT {} FROM posts", POST_COLUMNS))
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        rows.iter().map(row_to_post).collect()
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Post>> {
        let row = sqlx::query(&format!("SELECT {} FROM posts WHERE id = ?", POST_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        row.as_ref().map(row_to_post).transpose()
    }

    async fn insert(&self, post: &Post) -> Result<()> {
        let metrics = post
            .metrics
            .as_ref()
            .map(encode_metrics)
            .transpose()
            .map_err(|reason| DbError::CorruptRow {
                id: post.id.clone(),
                reason,
            })?;

        sqlx::query(
            r#"
            INSERT INTO posts (id, status, caption, media_kind, media_path, scheduled_for,
                               published_at, remote_post_id, remote_url, metrics, error,
                               created_at, last_updated)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&post.id)
        .bind(post.status.as_str())
        .bind(&post.caption)
        .bind(post.media.as_ref().map(|m| m.kind.as_str()))
        .bind(post.media.as_ref().map(|m| m.path.as_str()))
        .bind(post.scheduled_for)
        .bind(post.published_at)
        .bind(&post.remote_post_id)
        .bind(&post.remote_url)
        .bind(metrics)
        .bind(&post.error)
        .bind(post.created_at)
        .bind(post.last_updated)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    async fn update(&self, id: &str, update: &PostUpdate) -> Result<Option<Post>> {
        self.apply_update(id, None, update).await
    }

    async fn update_if_status(
        &self,
        id: &str,
        expected: PostStatus,
        update: &PostUpdate,
    ) -> Result<Option<Post>> {
        self.apply_update(id, Some(expected), update).await
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_if_status(&self, id: &str, expected: PostStatus) -> Result<bool> {
        let result = sqlx::query("DELETE FROM posts WHERE id = ? AND status = ?")
            .bind(id)
            .bind(expected.as_str())
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() > 0)
    }
}

fn encode_metrics(metrics: &Metrics) -> std::result::Result<String, String> {
    serde_json::to_string(metrics).map_err(|e| format!("invalid metrics: {}", e))
}

fn row_to_post(row: &SqliteRow) -> Result<Post> {
    let id: String = row.try_get("id").map_err(DbError::SqlxError)?;
    let corrupt = |reason: String| DbError::CorruptRow {
        id: id.clone(),
        reason,
    };

    let status = row
        .try_get::<String, _>("status")
        .map_err(DbError::SqlxError)?
        .parse::<PostStatus>()
        .map_err(corrupt)?;

    let media_kind: Option<String> = row.try_get("media_kind").map_err(DbError::SqlxError)?;
    let media_path: Option<String> = row.try_get("media_path").map_err(DbError::SqlxError)?;
    let media = match (media_kind, media_path) {
        (Some(kind), Some(path)) => Some(Media {
            kind: kind.parse::<MediaKind>().map_err(corrupt)?,
            path,
        }),
        _ => None,
    };

    let metrics = row
        .try_get::<Option<String>, _>("metrics")
        .map_err(DbError::SqlxError)?
        .map(|raw| serde_json::from_str::<Metrics>(&raw))
        .transpose()
        .map_err(|e| corrupt(format!("invalid metrics: {}", e)))?;

    Ok(Post {
        status,
        caption: row.try_get("caption").map_err(DbError::SqlxError)?,
        media,
        scheduled_for: row.try_get("scheduled_for").map_err(DbError::SqlxError)?,
        published_at: row.try_get("published_at").map_err(DbError::SqlxError)?,
        remote_post_id: row.try_get("remote_post_id").map_err(DbError::SqlxError)?,
        remote_url: row.try_get("remote_url").map_err(DbError::SqlxError)?,
        metrics,
        error: row.try_get("error").map_err(DbError::SqlxError)?,
        created_at: row.try_get("created_at").map_err(DbError::SqlxError)?,
        last_updated: row.try_get("last_updated").map_err(DbError::SqlxError)?,
        id,
    })
}
