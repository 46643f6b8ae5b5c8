//! 会话记录：分区键 / 排序键 / 负载 / 过期时间
//!
//! 记录只追加不更新：同一分区内排序键更大的记录取代旧记录，读取总是取排序键最大者。

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::OnceLock;

use chrono::Utc;
use regex::Regex;

/// 记录种类，作为分区键前缀
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Messages,
    Reasoning,
}

impl RecordKind {
    pub fn prefix(self) -> &'static str {
        match self {
            RecordKind::Messages => "messages",
            RecordKind::Reasoning => "reasoning",
        }
    }
}

/// 分区键：`<kind>#<session_id>`
pub fn partition_key(kind: RecordKind, session_id: &str) -> String {
    format!("{}#{}", kind.prefix(), session_id)
}

/// 一条持久化快照
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionRecord {
    pub partition_key: String,
    /// 写入时刻（Unix 微秒），同一进程内严格递增
    pub sort_key: i64,
    pub payload: Vec<u8>,
    /// 过期时刻（Unix 秒）；过期后对读取不可见
    pub expiration_time: i64,
}

impl SessionRecord {
    pub fn is_expired_at(&self, now_secs: i64) -> bool {
        self.expiration_time <= now_secs
    }

    /// 估算的存储大小（键 + 负载 + 两个数值属性）
    pub fn size_bytes(&self) -> usize {
        self.partition_key.len() + self.payload.len() + 16
    }
}

fn session_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{1,128}$").expect("valid regex"))
}

/// 会话 ID：1-128 个字符，仅限字母、数字、`_`、`-`
pub fn validate_session_id(session_id: &str) -> bool {
    session_id_re().is_match(session_id)
}

/// 当前 Unix 秒
pub fn now_secs() -> i64 {
    Utc::now().timestamp()
}

/// 排序键时钟：取当前微秒时间戳，保证同一时钟发出的值严格递增
#[derive(Debug, Default)]
pub struct SortKeyClock {
    last: AtomicI64,
}

impl SortKeyClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> i64 {
        let now = Utc::now().timestamp_micros();
        let prev = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or_else(|last| last);
        now.max(prev + 1)
    }

    /// 记下别处已使用的排序键，此后发出的值都大于它
    pub fn observe(&self, sort_key: i64) {
        self.last.fetch_max(sort_key, Ordering::SeqCst);
    }
}
