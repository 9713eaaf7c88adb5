//! 检查点存储抽象层
//!
//! 每个 thread 一条只追加的检查点链（parent_checkpoint_id 指向前一个），
//! 支持内存和 SQLite 两种实现。写入按 (thread_id, checkpoint_id) 幂等。

pub mod memory;
#[cfg(feature = "async-sqlite")]
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{ExecutionState, PersistenceError};

pub use memory::InMemoryCheckpointStore;
#[cfg(feature = "async-sqlite")]
pub use sqlite::SqliteCheckpointStore;

/// 检查点元数据：写入来源（写入时的阶段）与进度摘要
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    pub source: String,
    pub cursor: usize,
    pub retry_count: u32,
}

impl CheckpointMetadata {
    pub fn from_state(state: &ExecutionState) -> Self {
        Self {
            source: state.status.as_str().to_string(),
            cursor: state.cursor,
            retry_count: state.retry_count,
        }
    }
}

/// 一次 ExecutionState 的不可变快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub thread_id: String,
    pub checkpoint_id: String,
    pub parent_checkpoint_id: Option<String>,
    pub state: ExecutionState,
    pub metadata: CheckpointMetadata,
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    /// 生成新的检查点（新 id、当前时间），尚未写入
    pub fn new(
        thread_id: impl Into<String>,
        state: ExecutionState,
        parent_checkpoint_id: Option<String>,
    ) -> Self {
        let metadata = CheckpointMetadata::from_state(&state);
        Self {
            thread_id: thread_id.into(),
            checkpoint_id: uuid::Uuid::new_v4().to_string(),
            parent_checkpoint_id,
            state,
            metadata,
            // 与 SQLite 存储的微秒精度一致
            created_at: Utc::now().trunc_subsecs(6),
        }
    }
}

/// 检查点存储接口
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// 原子写入；同一 (thread_id, checkpoint_id) 重复写入为空操作
    async fn put_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), PersistenceError>;

    /// 该 thread 最新写入的检查点
    async fn get_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>, PersistenceError>;

    /// 完整历史，最早的在前
    async fn list(&self, thread_id: &str) -> Result<Vec<Checkpoint>, PersistenceError>;

    /// 基于状态生成并写入新检查点，返回 checkpoint_id
    async fn put(
        &self,
        thread_id: &str,
        state: &ExecutionState,
        parent_checkpoint_id: Option<&str>,
    ) -> Result<String, PersistenceError> {
        let checkpoint = Checkpoint::new(
            thread_id,
            state.clone(),
            parent_checkpoint_id.map(str::to_string),
        );
        self.put_checkpoint(&checkpoint).await?;
        Ok(checkpoint.checkpoint_id)
    }
}
