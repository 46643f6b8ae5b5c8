//! 内存存储后端：模拟托管 KV 存储的单条记录上限与 TTL

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::session::backend::{StoreBackend, StoreError};
use crate::session::record::{now_secs, SessionRecord};

/// 托管 KV 存储常见的单条记录上限
pub const DEFAULT_MAX_ITEM_BYTES: usize = 400 * 1024;

type Partition = BTreeMap<i64, SessionRecord>;

/// 进程内存储；进程退出即丢失
#[derive(Debug)]
pub struct InMemoryBackend {
    partitions: Mutex<HashMap<String, Partition>>,
    max_item_bytes: usize,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::with_max_item_bytes(DEFAULT_MAX_ITEM_BYTES)
    }

    pub fn with_max_item_bytes(max_item_bytes: usize) -> Self {
        Self {
            partitions: Mutex::new(HashMap::new()),
            max_item_bytes,
        }
    }

    /// 分区内记录数（含已过期）
    pub fn raw_len(&self, partition_key: &str) -> usize {
        self.lock()
            .map(|p| p.get(partition_key).map_or(0, |part| part.len()))
            .unwrap_or(0)
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, Partition>>, StoreError> {
        self.partitions
            .lock()
            .map_err(|_| StoreError::Backend("in-memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl StoreBackend for InMemoryBackend {
    async fn ensure_table(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn put_item(&self, record: SessionRecord) -> Result<(), StoreError> {
        let size = record.size_bytes();
        if size > self.max_item_bytes {
            return Err(StoreError::ItemTooLarge {
                size,
                limit: self.max_item_bytes,
            });
        }
        let now = now_secs();
        let mut partitions = self.lock()?;
        let partition = partitions.entry(record.partition_key.clone()).or_default();
        // 与 SQLite 后端一致：写入时清理本分区已过期的记录
        partition.retain(|_, r| !r.is_expired_at(now));
        if partition.contains_key(&record.sort_key) {
            return Err(StoreError::Conflict {
                partition_key: record.partition_key,
                sort_key: record.sort_key,
            });
        }
        partition.insert(record.sort_key, record);
        Ok(())
    }

    async fn query(
        &self,
        partition_key: &str,
        limit: Option<usize>,
    ) -> Result<Vec<SessionRecord>, StoreError> {
        let now = now_secs();
        let partitions = self.lock()?;
        let Some(partition) = partitions.get(partition_key) else {
            return Ok(Vec::new());
        };
        let live = partition
            .values()
            .rev()
            .filter(|r| !r.is_expired_at(now))
            .cloned();
        Ok(match limit {
            Some(n) => live.take(n).collect(),
            None => live.collect(),
        })
    }

    fn name(&self) -> &str {
        "memory"
    }
}
