/*!
SQLite checkpoint backend.

Stores one denormalized `threads` row per thread (latest version + state,
for fast resume) and an append-only `checkpoints` history table. Both are
written in one transaction together with an optimistic version check, so a
partially applied save is never visible and a stale writer fails with
`VersionConflict` instead of silently overwriting newer state.

When the `sqlite-migrations` feature is enabled (default), embedded
migrations (`sqlx::migrate!("./migrations")`) run on connect; disabling the
feature assumes external migration orchestration.
*/

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::instrument;

use super::{Checkpoint, Checkpointer, CheckpointerError, Result};
use crate::state::GraphState;

/// SQLite-backed [`Checkpointer`].
///
/// Storage grows with `threads × turns`; the `checkpoints.created_at` column
/// supports time-based cleanup policies if history pruning is needed.
pub struct SqliteCheckpointer {
    pool: Arc<SqlitePool>,
}

impl std::fmt::Debug for SqliteCheckpointer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteCheckpointer").finish()
    }
}

fn backend_err(context: &str, e: impl std::fmt::Display) -> CheckpointerError {
    CheckpointerError::Backend {
        message: format!("{context}: {e}"),
    }
}

impl SqliteCheckpointer {
    /// Connect (or create) a SQLite database at `database_url`.
    /// Example URL: `sqlite://turnloom.db`.
    #[must_use = "checkpointer must be used to persist state"]
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str) -> Result<Self> {
        // Ensure the underlying sqlite file exists before connecting.
        if let Some(path) = database_url.strip_prefix("sqlite://") {
            let path = path.trim();
            if !path.is_empty() && path != ":memory:" {
                let p = std::path::Path::new(path);
                if let Some(parent) = p.parent() {
                    let _ = std::fs::create_dir_all(parent);
                }
                if !p.exists() {
                    // Ignore result; if it already exists or we lack permission we proceed anyway.
                    let _ = std::fs::File::create_new(p);
                }
            }
        }

        let pool = SqlitePool::connect(database_url)
            .await
            .map_err(|e| backend_err("connect", e))?;

        #[cfg(feature = "sqlite-migrations")]
        {
            if let Err(e) = sqlx::migrate!("./migrations").run(&pool).await {
                return Err(backend_err("migration failure", e));
            }
        }

        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

#[async_trait::async_trait]
impl Checkpointer for SqliteCheckpointer {
    #[instrument(skip(self), err)]
    async fn load_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        let row = sqlx::query(
            r#"
            SELECT latest_version, latest_state_json, updated_at
            FROM threads
            WHERE id = ?1
            "#,
        )
        .bind(thread_id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| backend_err("select latest", e))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let version: i64 = row.get("latest_version");
        let state_json: Option<String> = row
            .try_get("latest_state_json")
            .map_err(|e| backend_err("latest_state_json read", e))?;

        // Thread row exists but nothing has been persisted yet.
        let Some(state_json) = state_json else {
            return Ok(None);
        };

        let state: GraphState = serde_json::from_str(&state_json)
            .map_err(|source| CheckpointerError::Serde { source })?;

        let updated_at: String = row.get("updated_at");
        let created_at = DateTime::parse_from_rfc3339(&updated_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(Some(Checkpoint {
            thread_id: thread_id.to_string(),
            version: version as u64,
            state,
            created_at,
        }))
    }

    #[instrument(skip(self, checkpoint), err)]
    async fn save(&self, checkpoint: Checkpoint) -> Result<()> {
        let state_json = serde_json::to_string(&checkpoint.state)
            .map_err(|source| CheckpointerError::Serde { source })?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| backend_err("tx begin", e))?;

        let current: Option<i64> =
            sqlx::query_scalar("SELECT latest_version FROM threads WHERE id = ?1")
                .bind(&checkpoint.thread_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| backend_err("version check", e))?;

        let latest = current.unwrap_or(0) as u64;
        if checkpoint.version != latest + 1 {
            return Err(CheckpointerError::VersionConflict {
                thread_id: checkpoint.thread_id,
                expected: latest + 1,
                found: checkpoint.version,
            });
        }

        let created_at = checkpoint.created_at.to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO threads (id, latest_version, latest_state_json, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (id) DO UPDATE SET
                latest_version = excluded.latest_version,
                latest_state_json = excluded.latest_state_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&checkpoint.thread_id)
        .bind(checkpoint.version as i64)
        .bind(&state_json)
        .bind(&created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| backend_err("upsert thread", e))?;

        sqlx::query(
            r#"
            INSERT INTO checkpoints (thread_id, version, state_json, created_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(&checkpoint.thread_id)
        .bind(checkpoint.version as i64)
        .bind(&state_json)
        .bind(&created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| backend_err("insert checkpoint", e))?;

        tx.commit().await.map_err(|e| backend_err("tx commit", e))?;

        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn list_threads(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT id FROM threads
            ORDER BY updated_at DESC
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| backend_err("list threads", e))?;

        Ok(rows.into_iter().map(|r| r.get::<String, _>("id")).collect())
    }
}
