//! SessionStore：消息与推理快照的 append-only 日志
//!
//! 每次写入都是一条新记录（排序键为写入时刻），读取取排序键最大者；不做原地更新。
//! 后端以 Conflict 拒绝已占用的键时换一个更大的键重试，
//! 因此共享后端的多个写入方不会互相覆盖，只是"最新"取决于谁后写。

use std::sync::Arc;

use crate::memory::Message;
use crate::reasoning::{deserialize_trace, ReasoningRecorder, ReasoningTrace, TraceError};
use crate::session::backend::{StoreBackend, StoreError};
use crate::session::record::{now_secs, partition_key, RecordKind, SessionRecord, SortKeyClock};

/// 默认记录存活时间（秒）
pub const DEFAULT_TTL_SECS: u64 = 3600;

/// 排序键冲突时的最大重试次数
const MAX_KEY_CONFLICT_RETRIES: usize = 8;

/// 会话存储
pub struct SessionStore {
    backend: Arc<dyn StoreBackend>,
    ttl_secs: u64,
    clock: SortKeyClock,
}

impl SessionStore {
    /// 包装后端并确保表存在
    pub async fn open(backend: Arc<dyn StoreBackend>, ttl_secs: u64) -> Result<Self, StoreError> {
        backend.ensure_table().await?;
        tracing::debug!(backend = backend.name(), ttl_secs, "Session store ready");
        Ok(Self {
            backend,
            ttl_secs,
            clock: SortKeyClock::new(),
        })
    }

    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    pub fn backend(&self) -> &Arc<dyn StoreBackend> {
        &self.backend
    }

    fn record(&self, kind: RecordKind, session_id: &str, payload: Vec<u8>) -> SessionRecord {
        let ttl = i64::try_from(self.ttl_secs).unwrap_or(i64::MAX);
        SessionRecord {
            partition_key: partition_key(kind, session_id),
            sort_key: self.clock.next(),
            payload,
            expiration_time: now_secs().saturating_add(ttl),
        }
    }

    /// 写入一条新记录；排序键与其他写入方冲突时跳过该键重试
    async fn put_new(
        &self,
        kind: RecordKind,
        session_id: &str,
        payload: Vec<u8>,
    ) -> Result<(), StoreError> {
        let mut attempt = 0;
        loop {
            let record = self.record(kind, session_id, payload.clone());
            match self.backend.put_item(record).await {
                Err(StoreError::Conflict {
                    partition_key,
                    sort_key,
                }) if attempt < MAX_KEY_CONFLICT_RETRIES => {
                    tracing::debug!(%partition_key, sort_key, attempt, "Sort key already taken, retrying");
                    self.clock.observe(sort_key);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// 写入完整消息序列的快照
    pub async fn append_messages(
        &self,
        session_id: &str,
        messages: &[Message],
    ) -> Result<(), StoreError> {
        let payload =
            serde_json::to_vec(messages).map_err(|e| StoreError::Encode(e.to_string()))?;
        self.put_new(RecordKind::Messages, session_id, payload).await?;
        tracing::debug!(session_id, count = messages.len(), "Saved conversation messages");
        Ok(())
    }

    /// 最新的消息快照；会话不存在时返回空
    pub async fn load_latest_messages(&self, session_id: &str) -> Result<Vec<Message>, StoreError> {
        let pk = partition_key(RecordKind::Messages, session_id);
        let records = self.backend.query(&pk, Some(1)).await?;
        match records.first() {
            Some(record) => serde_json::from_slice(&record.payload)
                .map_err(|e| StoreError::Decode(format!("messages for '{}': {}", session_id, e))),
            None => Ok(Vec::new()),
        }
    }

    /// 写入推理快照
    ///
    /// 先按记录器自身的上限序列化；后端以 ItemTooLarge 拒绝时继续裁剪并重试。
    /// 裁无可裁时只记录告警，不返回错误（轨迹本身仍在内存中返回给调用方）。
    pub async fn append_reasoning(
        &self,
        session_id: &str,
        recorder: &mut ReasoningRecorder,
    ) -> Result<(), StoreError> {
        loop {
            let payload = match recorder.serialize_fitting() {
                Ok(payload) => payload,
                Err(TraceError::SizeLimit(e)) => {
                    tracing::warn!(session_id, error = %e, "Reasoning trace cannot fit size limit, not saved");
                    return Ok(());
                }
                Err(e) => return Err(StoreError::Encode(e.to_string())),
            };
            match self.put_new(RecordKind::Reasoning, session_id, payload).await {
                Ok(()) => {
                    tracing::debug!(
                        session_id,
                        steps = recorder.step_count(),
                        complete = recorder.is_finalized(),
                        "Saved reasoning trace"
                    );
                    return Ok(());
                }
                Err(StoreError::ItemTooLarge { size, limit }) => {
                    tracing::debug!(session_id, size, limit, "Backend rejected reasoning trace as too large");
                    if !recorder.truncate_once() {
                        recorder.mark_exceeded();
                        tracing::warn!(
                            session_id,
                            size,
                            limit,
                            "Reasoning trace cannot fit backend item limit, not saved"
                        );
                        return Ok(());
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// 最新的推理快照（可能是实时模式下尚未完成的中间快照）
    pub async fn load_latest_reasoning(
        &self,
        session_id: &str,
    ) -> Result<Option<ReasoningTrace>, StoreError> {
        let pk = partition_key(RecordKind::Reasoning, session_id);
        let records = self.backend.query(&pk, Some(1)).await?;
        records
            .first()
            .map(|record| {
                deserialize_trace(&record.payload).map_err(|e| {
                    StoreError::Decode(format!("reasoning for '{}': {}", session_id, e))
                })
            })
            .transpose()
    }

    /// 已完成的推理轨迹，最新在前；中间快照与无法解析的记录被跳过
    pub async fn load_reasoning_history(
        &self,
        session_id: &str,
    ) -> Result<Vec<ReasoningTrace>, StoreError> {
        let pk = partition_key(RecordKind::Reasoning, session_id);
        let records = self.backend.query(&pk, None).await?;
        let traces = records
            .iter()
            .filter_map(|record| match deserialize_trace(&record.payload) {
                Ok(trace) => Some(trace),
                Err(e) => {
                    tracing::warn!(session_id, sort_key = record.sort_key, "Skipping undecodable reasoning record: {}", e);
                    None
                }
            })
            .filter(|trace| trace.is_complete())
            .collect();
        Ok(traces)
    }
}
