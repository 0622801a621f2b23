//! Database operations for Crosspost
//!
//! SQLite via sqlx. Posts and their queue entries are written in one
//! transaction; the claim step for dispatch is a conditional update so a
//! given entry is only ever processed by one worker at a time.

use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;

use crate::error::{DbError, Result};
use crate::types::{
    Connection, ConnectionStatus, ContentKind, EntryStatus, MediaRef, PlatformId, Post,
    PostStatus, QueueEntry,
};

/// Per-status entry counts for the queue CLI
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct QueueStats {
    pub pending: i64,
    pub in_flight: i64,
    pub succeeded: i64,
    pub failed: i64,
    pub abandoned: i64,
}

/// Credential fields written on a successful OAuth completion
#[derive(Debug, Clone)]
pub struct NewConnection {
    pub account_id: String,
    pub platform: PlatformId,
    pub external_id: String,
    pub handle: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<i64>,
    pub scope: String,
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if necessary) the database at `db_path` and run
    /// pending migrations.
    pub async fn new(db_path: &str) -> Result<Self> {
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
        }

        // Forward slashes work on both Windows and Unix; mode=rwc creates
        // the file when missing.
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

    // ------------------------------------------------------------------
    // Posts and fan-out
    // ------------------------------------------------------------------

    /// Persist a post and one queue entry per target platform atomically.
    ///
    /// Either everything lands or nothing does; a validation or storage
    /// failure never leaves a post without its entries.
    pub async fn create_post_with_entries(&self, post: &Post, process_after: i64) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await.map_err(DbError::SqlxError)?;

        sqlx::query(
            r#"
            INSERT INTO posts (id, account_id, content, platforms, created_at, scheduled_at,
                               status, media, hashtags, content_kind)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&post.id)
        .bind(&post.account_id)
        .bind(&post.content)
        .bind(encode_json(&post.platforms)?)
        .bind(post.created_at)
        .bind(post.scheduled_at)
        .bind(post.status.as_str())
        .bind(encode_json(&post.media)?)
        .bind(encode_json(&post.hashtags)?)
        .bind(post.content_kind.as_str())
        .execute(&mut *tx)
        .await
        .map_err(DbError::SqlxError)?;

        for platform in &post.platforms {
            sqlx::query(
                r#"
                INSERT INTO queue_entries (post_id, platform, process_after, status,
                                           attempts, created_at, updated_at)
                VALUES (?, ?, ?, 'pending', 0, ?, ?)
                "#,
            )
            .bind(&post.id)
            .bind(platform.as_str())
            .bind(process_after)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(DbError::SqlxError)?;
        }

        tx.commit().await.map_err(DbError::SqlxError)?;
        Ok(())
    }

    /// Get a post by ID
    pub async fn get_post(&self, post_id: &str) -> Result<Option<Post>> {
        let row = sqlx::query(
            r#"
            SELECT id, account_id, content, platforms, created_at, scheduled_at,
                   status, media, hashtags, content_kind
            FROM posts WHERE id = ?
            "#,
        )
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        row.map(row_to_post).transpose()
    }

    /// List an account's posts, newest first
    pub async fn list_posts(&self, account_id: &str, limit: usize) -> Result<Vec<Post>> {
        let rows = sqlx::query(
            r#"
            SELECT id, account_id, content, platforms, created_at, scheduled_at,
                   status, media, hashtags, content_kind
            FROM posts
            WHERE account_id = ?
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(account_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.into_iter().map(row_to_post).collect()
    }

    /// Update post status
    pub async fn update_post_status(&self, post_id: &str, status: PostStatus) -> Result<()> {
        sqlx::query("UPDATE posts SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(post_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;
        Ok(())
    }

    /// Recompute a post's aggregate status from its queue entries.
    ///
    /// Purely derived: all entries succeeded means published; once nothing
    /// is still open, any success means partially published and none means
    /// failed. While entries remain open the stored status stands.
    pub async fn recompute_post_status(&self, post_id: &str) -> Result<PostStatus> {
        let post = self
            .get_post(post_id)
            .await?
            .ok_or_else(|| DbError::CorruptRecord(format!("post {} missing", post_id)))?;
        let entries = self.entries_for_post(post_id).await?;

        if entries.is_empty() {
            return Ok(post.status);
        }

        let open = entries
            .iter()
            .any(|e| matches!(e.status, EntryStatus::Pending | EntryStatus::InFlight));
        let succeeded = entries
            .iter()
            .filter(|e| e.status == EntryStatus::Succeeded)
            .count();

        let new_status = if succeeded == entries.len() {
            PostStatus::Published
        } else if open {
            post.status
        } else if succeeded > 0 {
            PostStatus::PartiallyPublished
        } else {
            PostStatus::Failed
        };

        if new_status != post.status {
            self.update_post_status(post_id, new_status).await?;
        }
        Ok(new_status)
    }

    // ------------------------------------------------------------------
    // Queue entries
    // ------------------------------------------------------------------

    /// All entries for one post
    pub async fn entries_for_post(&self, post_id: &str) -> Result<Vec<QueueEntry>> {
        let rows = sqlx::query(&format!("{} WHERE post_id = ? ORDER BY id ASC", ENTRY_SELECT))
            .bind(post_id)
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        rows.into_iter().map(row_to_entry).collect()
    }

    /// Get a queue entry by ID
    pub async fn get_entry(&self, entry_id: i64) -> Result<Option<QueueEntry>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", ENTRY_SELECT))
            .bind(entry_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        row.map(row_to_entry).transpose()
    }

    /// Pending entries due at `now`, in deterministic dispatch order
    pub async fn due_entries(&self, now: i64, limit: usize) -> Result<Vec<QueueEntry>> {
        let rows = sqlx::query(&format!(
            "{} WHERE status = 'pending' AND process_after <= ?
             ORDER BY process_after ASC, id ASC LIMIT ?",
            ENTRY_SELECT
        ))
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.into_iter().map(row_to_entry).collect()
    }

    /// Open (pending or in-flight) entries across all posts, soonest first
    pub async fn list_open_entries(&self, limit: usize) -> Result<Vec<QueueEntry>> {
        let rows = sqlx::query(&format!(
            "{} WHERE status IN ('pending', 'in_flight')
             ORDER BY process_after ASC, id ASC LIMIT ?",
            ENTRY_SELECT
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.into_iter().map(row_to_entry).collect()
    }

    /// Claim an entry for dispatch: pending -> in_flight.
    ///
    /// Compare-and-swap on status; returns false when another tick already
    /// claimed it. This is what guarantees at-most-one active attempt per
    /// entry. A successful claim starts an attempt, so the counter moves
    /// here and nowhere else.
    pub async fn claim_entry(&self, entry_id: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE queue_entries SET status = 'in_flight', attempts = attempts + 1, updated_at = ?
             WHERE id = ? AND status = 'pending'",
        )
        .bind(chrono::Utc::now().timestamp())
        .bind(entry_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    /// in_flight -> succeeded, recording the platform's post id
    pub async fn complete_entry(&self, entry_id: i64, platform_post_id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE queue_entries
             SET status = 'succeeded', platform_post_id = ?, last_error = NULL, updated_at = ?
             WHERE id = ? AND status = 'in_flight'",
        )
        .bind(platform_post_id)
        .bind(chrono::Utc::now().timestamp())
        .bind(entry_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;
        Ok(())
    }

    /// in_flight -> pending with a pushed-forward process_after, after a
    /// retryable publish failure
    pub async fn retry_entry(&self, entry_id: i64, process_after: i64, error: &str) -> Result<()> {
        sqlx::query(
            "UPDATE queue_entries
             SET status = 'pending', process_after = ?, last_error = ?, updated_at = ?
             WHERE id = ? AND status = 'in_flight'",
        )
        .bind(process_after)
        .bind(error)
        .bind(chrono::Utc::now().timestamp())
        .bind(entry_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;
        Ok(())
    }

    /// in_flight -> abandoned (permanent failure or retry budget exhausted)
    pub async fn abandon_entry(&self, entry_id: i64, error: &str) -> Result<()> {
        sqlx::query(
            "UPDATE queue_entries
             SET status = 'abandoned', last_error = ?, updated_at = ?
             WHERE id = ? AND status = 'in_flight'",
        )
        .bind(error)
        .bind(chrono::Utc::now().timestamp())
        .bind(entry_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;
        Ok(())
    }

    /// in_flight -> failed, when the connection could not be resolved.
    ///
    /// Retrying is pointless here: the operator has to reauthorize.
    pub async fn fail_entry(&self, entry_id: i64, error: &str) -> Result<()> {
        sqlx::query(
            "UPDATE queue_entries
             SET status = 'failed', last_error = ?, updated_at = ?
             WHERE id = ? AND status = 'in_flight'",
        )
        .bind(error)
        .bind(chrono::Utc::now().timestamp())
        .bind(entry_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;
        Ok(())
    }

    /// Operator cancellation: pending -> abandoned.
    ///
    /// In-flight and terminal entries are not cancellable; returns false
    /// when nothing changed.
    pub async fn cancel_entry(&self, entry_id: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE queue_entries
             SET status = 'abandoned', last_error = 'cancelled', updated_at = ?
             WHERE id = ? AND status = 'pending'",
        )
        .bind(chrono::Utc::now().timestamp())
        .bind(entry_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    /// Move a pending entry to a new process_after time
    pub async fn reschedule_entry(&self, entry_id: i64, process_after: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE queue_entries SET process_after = ?, updated_at = ?
             WHERE id = ? AND status = 'pending'",
        )
        .bind(process_after)
        .bind(chrono::Utc::now().timestamp())
        .bind(entry_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    /// Reset entries left in_flight by a crashed dispatcher back to pending.
    ///
    /// Called once at daemon startup, before the first tick.
    pub async fn recover_stalled_entries(&self) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE queue_entries SET status = 'pending', updated_at = ?
             WHERE status = 'in_flight'",
        )
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected())
    }

    /// Per-status entry counts
    pub async fn queue_stats(&self) -> Result<QueueStats> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM queue_entries GROUP BY status")
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        let mut stats = QueueStats::default();
        for row in rows {
            let status: String = row.get("status");
            let count: i64 = row.get("n");
            match status.as_str() {
                "pending" => stats.pending = count,
                "in_flight" => stats.in_flight = count,
                "succeeded" => stats.succeeded = count,
                "failed" => stats.failed = count,
                "abandoned" => stats.abandoned = count,
                _ => {}
            }
        }
        Ok(stats)
    }

    // ------------------------------------------------------------------
    // Connections
    // ------------------------------------------------------------------

    /// Insert or replace the credential for (account, platform).
    ///
    /// Reconnecting replaces tokens in place and reactivates the row; a
    /// connection row, once created, is never deleted.
    pub async fn upsert_connection(&self, new: &NewConnection) -> Result<Connection> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO connections (account_id, platform, external_id, handle, access_token,
                                     refresh_token, expires_at, scope, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'active', ?, ?)
            ON CONFLICT(account_id, platform) DO UPDATE SET
                external_id = excluded.external_id,
                handle = excluded.handle,
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                expires_at = excluded.expires_at,
                scope = excluded.scope,
                status = 'active',
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&new.account_id)
        .bind(new.platform.as_str())
        .bind(&new.external_id)
        .bind(&new.handle)
        .bind(&new.access_token)
        .bind(&new.refresh_token)
        .bind(new.expires_at)
        .bind(&new.scope)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        self.get_connection(&new.account_id, new.platform)
            .await?
            .ok_or_else(|| {
                DbError::CorruptRecord(format!(
                    "connection {}/{} missing after upsert",
                    new.account_id, new.platform
                ))
                .into()
            })
    }

    /// Get the connection for (account, platform)
    pub async fn get_connection(
        &self,
        account_id: &str,
        platform: PlatformId,
    ) -> Result<Option<Connection>> {
        let row = sqlx::query(&format!(
            "{} WHERE account_id = ? AND platform = ?",
            CONNECTION_SELECT
        ))
        .bind(account_id)
        .bind(platform.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        row.map(row_to_connection).transpose()
    }

    /// All of an account's connections
    pub async fn list_connections(&self, account_id: &str) -> Result<Vec<Connection>> {
        let rows = sqlx::query(&format!(
            "{} WHERE account_id = ? ORDER BY platform ASC",
            CONNECTION_SELECT
        ))
        .bind(account_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.into_iter().map(row_to_connection).collect()
    }

    /// Replace tokens after a successful refresh and reactivate the row
    pub async fn update_connection_tokens(
        &self,
        connection_id: i64,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: Option<i64>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE connections
             SET access_token = ?, refresh_token = COALESCE(?, refresh_token),
                 expires_at = ?, status = 'active', updated_at = ?
             WHERE id = ?",
        )
        .bind(access_token)
        .bind(refresh_token)
        .bind(expires_at)
        .bind(chrono::Utc::now().timestamp())
        .bind(connection_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;
        Ok(())
    }

    /// Flip a connection's status (deactivation, expiry)
    pub async fn set_connection_status(
        &self,
        account_id: &str,
        platform: PlatformId,
        status: ConnectionStatus,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE connections SET status = ?, updated_at = ?
             WHERE account_id = ? AND platform = ?",
        )
        .bind(status.as_str())
        .bind(chrono::Utc::now().timestamp())
        .bind(account_id)
        .bind(platform.as_str())
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }
}

const ENTRY_SELECT: &str = "SELECT id, post_id, platform, process_after, status, attempts, \
                            last_error, platform_post_id, created_at, updated_at FROM queue_entries";

const CONNECTION_SELECT: &str = "SELECT id, account_id, platform, external_id, handle, \
                                 access_token, refresh_token, expires_at, scope, status, \
                                 created_at, updated_at FROM connections";

fn encode_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| DbError::CorruptRecord(format!("encode failed: {}", e)).into())
}

fn decode_json<T: serde::de::DeserializeOwned>(text: &str, what: &str) -> Result<T> {
    serde_json::from_str(text)
        .map_err(|e| DbError::CorruptRecord(format!("bad {} column: {}", what, e)).into())
}

fn row_to_post(row: sqlx::sqlite::SqliteRow) -> Result<Post> {
    let status_text: String = row.get("status");
    let status = PostStatus::parse(&status_text)
        .ok_or_else(|| DbError::CorruptRecord(format!("bad post status: {}", status_text)))?;
    let kind_text: String = row.get("content_kind");
    let content_kind = ContentKind::from_str(&kind_text)
        .map_err(|_| DbError::CorruptRecord(format!("bad content kind: {}", kind_text)))?;

    let platforms: Vec<PlatformId> = decode_json(row.get::<String, _>("platforms").as_str(), "platforms")?;
    let media: Vec<MediaRef> = decode_json(row.get::<String, _>("media").as_str(), "media")?;
    let hashtags: Vec<String> = decode_json(row.get::<String, _>("hashtags").as_str(), "hashtags")?;

    Ok(Post {
        id: row.get("id"),
        account_id: row.get("account_id"),
        content: row.get("content"),
        platforms,
        created_at: row.get("created_at"),
        scheduled_at: row.get("scheduled_at"),
        status,
        media,
        hashtags,
        content_kind,
    })
}

fn row_to_entry(row: sqlx::sqlite::SqliteRow) -> Result<QueueEntry> {
    let status_text: String = row.get("status");
    let status = EntryStatus::parse(&status_text)
        .ok_or_else(|| DbError::CorruptRecord(format!("bad entry status: {}", status_text)))?;
    let platform_text: String = row.get("platform");
    let platform = PlatformId::from_str(&platform_text)
        .map_err(|_| DbError::CorruptRecord(format!("bad entry platform: {}", platform_text)))?;

    Ok(QueueEntry {
        id: row.get("id"),
        post_id: row.get("post_id"),
        platform,
        process_after: row.get("process_after"),
        status,
        attempts: row.get::<i64, _>("attempts") as u32,
        last_error: row.get("last_error"),
        platform_post_id: row.get("platform_post_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn row_to_connection(row: sqlx::sqlite::SqliteRow) -> Result<Connection> {
    let status_text: String = row.get("status");
    let status = ConnectionStatus::parse(&status_text)
        .ok_or_else(|| DbError::CorruptRecord(format!("bad connection status: {}", status_text)))?;
    let platform_text: String = row.get("platform");
    let platform = PlatformId::from_str(&platform_text)
        .map_err(|_| DbError::CorruptRecord(format!("bad connection platform: {}", platform_text)))?;

    Ok(Connection {
        id: row.get("id"),
        account_id: row.get("account_id"),
        platform,
        external_id: row.get("external_id"),
        handle: row.get("handle"),
        access_token: row.get("access_token"),
        refresh_token: row.get("refresh_token"),
        expires_at: row.get("expires_at"),
        scope: row.get("scope"),
        status,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
