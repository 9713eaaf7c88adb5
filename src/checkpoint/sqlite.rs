//! SQLite 检查点存储
//!
//! 表 agent_checkpoints 以 (thread_id, checkpoint_id) 为主键，状态与元数据存 JSON 文本；
//! 读取时按写入时间取每个 thread 的最新一行。单条 INSERT 即原子写入，不同 thread 之间互不影响。

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;

use super::{Checkpoint, CheckpointMetadata, CheckpointStore};
use crate::core::{ExecutionState, PersistenceError};

pub struct SqliteCheckpointStore {
    pool: SqlitePool,
}

impl SqliteCheckpointStore {
    /// 打开（不存在则创建）数据库文件并建表
    pub async fn open(db_path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path.as_ref())
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_tables().await?;
        tracing::info!("Using SQLite checkpoint store: {:?}", db_path.as_ref());
        Ok(store)
    }

    /// 纯内存数据库（单连接，测试用）
    pub async fn open_in_memory() -> Result<Self, PersistenceError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.init_tables().await?;
        Ok(store)
    }

    async fn init_tables(&self) -> Result<(), PersistenceError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS agent_checkpoints (
                thread_id TEXT NOT NULL,
                checkpoint_id TEXT NOT NULL,
                parent_checkpoint_id TEXT,
                checkpoint_data TEXT NOT NULL,
                metadata TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (thread_id, checkpoint_id)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_agent_checkpoints_thread
             ON agent_checkpoints(thread_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// 固定微秒精度，保证 TEXT 字典序即时间序
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn row_to_checkpoint(row: &SqliteRow) -> Result<Checkpoint, PersistenceError> {
    let thread_id: String = row.try_get("thread_id")?;
    let checkpoint_id: String = row.try_get("checkpoint_id")?;
    let parent_checkpoint_id: Option<String> = row.try_get("parent_checkpoint_id")?;
    let data: String = row.try_get("checkpoint_data")?;
    let metadata: String = row.try_get("metadata")?;
    let created_at: String = row.try_get("created_at")?;

    let state: ExecutionState = serde_json::from_str(&data)?;
    let metadata: CheckpointMetadata = serde_json::from_str(&metadata)?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| PersistenceError::Corrupt {
            checkpoint_id: checkpoint_id.clone(),
            reason: format!("bad created_at '{created_at}': {e}"),
        })?
        .with_timezone(&Utc);

    Ok(Checkpoint {
        thread_id,
        checkpoint_id,
        parent_checkpoint_id,
        state,
        metadata,
        created_at,
    })
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn put_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), PersistenceError> {
        let data = serde_json::to_string(&checkpoint.state)?;
        let metadata = serde_json::to_string(&checkpoint.metadata)?;

        sqlx::query(
            "INSERT INTO agent_checkpoints
             (thread_id, checkpoint_id, parent_checkpoint_id, checkpoint_data, metadata, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(thread_id, checkpoint_id) DO NOTHING",
        )
        .bind(&checkpoint.thread_id)
        .bind(&checkpoint.checkpoint_id)
        .bind(&checkpoint.parent_checkpoint_id)
        .bind(&data)
        .bind(&metadata)
        .bind(format_timestamp(&checkpoint.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>, PersistenceError> {
        let row = sqlx::query(
            "SELECT thread_id, checkpoint_id, parent_checkpoint_id, checkpoint_data, metadata, created_at
             FROM agent_checkpoints
             WHERE thread_id = ?
             ORDER BY rowid DESC
             LIMIT 1",
        )
        .bind(thread_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_checkpoint).transpose()
    }

    async fn list(&self, thread_id: &str) -> Result<Vec<Checkpoint>, PersistenceError> {
        let rows = sqlx::query(
            "SELECT thread_id, checkpoint_id, parent_checkpoint_id, checkpoint_data, metadata, created_at
             FROM agent_checkpoints
             WHERE thread_id = ?
             ORDER BY rowid ASC",
        )
        .bind(thread_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_checkpoint).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ExecutionStatus;
    use serde_json::json;

    #[tokio::test]
    async fn test_round_trip_in_memory() {
        let store = SqliteCheckpointStore::open_in_memory().await.unwrap();
        let mut state = ExecutionState::new("top customers");
        state.status = ExecutionStatus::Executing;
        state.cursor = 1;
        state
            .results
            .insert("step_1".into(), json!([{"Customer": "ACME", "Total": 12.5}]));

        let id = store.put("t1", &state, None).await.unwrap();
        let latest = store.get_latest("t1").await.unwrap().unwrap();
        assert_eq!(latest.checkpoint_id, id);
        assert_eq!(latest.state, state);
        assert_eq!(latest.metadata.source, "executing");
        assert!(store.get_latest("t2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_put_is_noop() {
        let store = SqliteCheckpointStore::open_in_memory().await.unwrap();
        let checkpoint = Checkpoint::new("t1", ExecutionState::new("q"), None);
        store.put_checkpoint(&checkpoint).await.unwrap();
        store.put_checkpoint(&checkpoint).await.unwrap();
        assert_eq!(store.list("t1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_latest_follows_write_order_not_clock() {
        let store = SqliteCheckpointStore::open_in_memory().await.unwrap();
        let first = Checkpoint::new("t1", ExecutionState::new("q"), None);
        let mut second = Checkpoint::new(
            "t1",
            ExecutionState::new("q"),
            Some(first.checkpoint_id.clone()),
        );
        // 时钟回拨：后写入的检查点时间更早
        second.created_at = first.created_at - chrono::Duration::seconds(60);
        store.put_checkpoint(&first).await.unwrap();
        store.put_checkpoint(&second).await.unwrap();

        let latest = store.get_latest("t1").await.unwrap().unwrap();
        assert_eq!(latest.checkpoint_id, second.checkpoint_id);
        let ids: Vec<_> = store
            .list("t1")
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.checkpoint_id)
            .collect();
        assert_eq!(ids, vec![first.checkpoint_id, second.checkpoint_id]);
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("checkpoints.db");
        let state = ExecutionState::new("persist me");
        let id = {
            let store = SqliteCheckpointStore::open(&path).await.unwrap();
            store.put("t1", &state, None).await.unwrap()
        };
        let store = SqliteCheckpointStore::open(&path).await.unwrap();
        let latest = store.get_latest("t1").await.unwrap().unwrap();
        assert_eq!(latest.checkpoint_id, id);
        assert_eq!(latest.state, state);
    }
}
