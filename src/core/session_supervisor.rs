//! 会话监管：按 thread_id 串行化
//!
//! 同一 thread 的 start / resume / amend_step 不能并发推进状态机；不同 thread 互不影响。
//! 锁表只保留正被持有或等待中的 thread，最后一个 guard 释放时条目随之移除。

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex, OwnedMutexGuard};

type LockTable = Arc<StdMutex<HashMap<String, Arc<Mutex<()>>>>>;

/// 每个 thread 一把锁，持有 guard 期间独占该 thread 的推进权
#[derive(Debug, Default)]
pub struct SessionSupervisor {
    locks: LockTable,
}

/// thread 推进权；drop 时释放锁，无人等待则清理锁表条目
#[derive(Debug)]
pub struct ThreadGuard {
    guard: Option<OwnedMutexGuard<()>>,
    thread_id: String,
    locks: LockTable,
}

impl Drop for ThreadGuard {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = match self.locks.lock() {
            Ok(locks) => locks,
            Err(poisoned) => poisoned.into_inner(),
        };
        // 表内的一份引用之外没有持有者或等待者
        if locks
            .get(&self.thread_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.thread_id);
        }
    }
}

impl SessionSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<Mutex<()>>>> {
        match self.locks.lock() {
            Ok(locks) => locks,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// 获取 thread 的推进权；同一 thread 的其他调用方在此等待
    pub async fn acquire(&self, thread_id: &str) -> ThreadGuard {
        let lock = self
            .table()
            .entry(thread_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock_owned().await;
        ThreadGuard {
            guard: Some(guard),
            thread_id: thread_id.to_string(),
            locks: self.locks.clone(),
        }
    }

    /// 当前正被持有的 thread 数
    pub fn active_threads(&self) -> usize {
        self.table()
            .values()
            .filter(|l| l.try_lock().is_err())
            .count()
    }

    /// 锁表中的条目数（持有中或等待中）
    pub fn tracked_threads(&self) -> usize {
        self.table().len()
    }
}
