//! 内存检查点存储（测试与 backend = "memory" 使用，进程退出即丢失）

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Checkpoint, CheckpointStore};
use crate::core::PersistenceError;

/// thread_id -> 按写入顺序排列的检查点
#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    threads: RwLock<HashMap<String, Vec<Checkpoint>>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn thread_count(&self) -> usize {
        self.threads.read().await.len()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn put_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), PersistenceError> {
        let mut threads = self.threads.write().await;
        let history = threads.entry(checkpoint.thread_id.clone()).or_default();
        if history
            .iter()
            .any(|c| c.checkpoint_id == checkpoint.checkpoint_id)
        {
            return Ok(());
        }
        history.push(checkpoint.clone());
        Ok(())
    }

    async fn get_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>, PersistenceError> {
        Ok(self
            .threads
            .read()
            .await
            .get(thread_id)
            .and_then(|h| h.last().cloned()))
    }

    async fn list(&self, thread_id: &str) -> Result<Vec<Checkpoint>, PersistenceError> {
        Ok(self
            .threads
            .read()
            .await
            .get(thread_id)
            .cloned()
            .unwrap_or_default())
    }
}
