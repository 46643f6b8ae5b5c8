//! 存储后端抽象：按 (分区键, 排序键) 寻址的 KV 存储
//!
//! 后端负责：表的按需创建、单条记录大小上限（以 ItemTooLarge 单独报出）、
//! 按过期时间隐藏记录、按排序键降序带条数限制的查询。

use async_trait::async_trait;
use thiserror::Error;

use crate::session::record::SessionRecord;

#[derive(Debug, Error)]
pub enum StoreError {
    /// 单条记录超过后端上限；推理轨迹写入时据此触发裁剪
    #[error("Item too large: {size} bytes exceeds the backend limit of {limit} bytes")]
    ItemTooLarge { size: usize, limit: usize },

    /// 同一 (分区键, 排序键) 已有记录；记录从不原地覆盖，由调用方换一个排序键重试
    #[error("Record already exists: {partition_key} @ {sort_key}")]
    Conflict { partition_key: String, sort_key: i64 },

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Decode error: {0}")]
    Decode(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(e: tokio::task::JoinError) -> Self {
        StoreError::Backend(format!("blocking task failed: {}", e))
    }
}

/// 存储后端
#[async_trait]
pub trait StoreBackend: Send + Sync {
    /// 表不存在则创建；已存在时什么都不做
    async fn ensure_table(&self) -> Result<(), StoreError>;

    /// 写入一条新记录；同键记录已存在时返回 Conflict
    async fn put_item(&self, record: SessionRecord) -> Result<(), StoreError>;

    /// 查询分区内未过期的记录，按排序键降序；limit 为 None 时返回全部
    async fn query(
        &self,
        partition_key: &str,
        limit: Option<usize>,
    ) -> Result<Vec<SessionRecord>, StoreError>;

    /// 后端名称，用于日志
    fn name(&self) -> &str;
}
