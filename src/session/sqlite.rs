//! SQLite 存储后端（rusqlite，同步调用放在 spawn_blocking 中）
//!
//! 表结构：`(pk TEXT, sk INTEGER, payload BLOB, expiration_time INTEGER, PRIMARY KEY(pk, sk))`。
//! 读取时过滤过期记录；写入时顺带删除本分区已过期的行。同键写入以 Conflict 拒绝，不做 REPLACE。

use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use rusqlite::{params, Connection, ErrorCode};

use crate::session::backend::{StoreBackend, StoreError};
use crate::session::memory::DEFAULT_MAX_ITEM_BYTES;
use crate::session::record::{now_secs, SessionRecord};

/// SQLite 后端
pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
    table: String,
    max_item_bytes: usize,
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("table", &self.table)
            .field("max_item_bytes", &self.max_item_bytes)
            .finish_non_exhaustive()
    }
}

impl SqliteBackend {
    /// 打开（或创建）数据库文件；父目录不存在时一并创建
    pub fn open(path: impl AsRef<Path>, table: &str) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Backend(format!("create {}: {}", parent.display(), e))
                })?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        tracing::debug!(path = %path.display(), table, "Opened SQLite session store");
        Self::from_connection(conn, table)
    }

    /// 内存数据库，用于测试
    pub fn open_in_memory(table: &str) -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?, table)
    }

    fn from_connection(conn: Connection, table: &str) -> Result<Self, StoreError> {
        validate_table_name(table)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            table: table.to_string(),
            max_item_bytes: DEFAULT_MAX_ITEM_BYTES,
        })
    }

    pub fn with_max_item_bytes(mut self, max_item_bytes: usize) -> Self {
        self.max_item_bytes = max_item_bytes;
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// 在阻塞线程池中持锁执行一段同步数据库操作
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection, &str) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let table = quote_ident(&self.table);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| StoreError::Backend("sqlite connection lock poisoned".to_string()))?;
            f(&guard, &table)
        })
        .await?
    }
}

/// 表名规则与托管 KV 存储一致：3-255 个字符，字母数字与 `_ . -`
fn table_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_.-]{3,255}$").expect("valid regex"))
}

fn validate_table_name(table: &str) -> Result<(), StoreError> {
    if table_name_re().is_match(table) {
        Ok(())
    } else {
        Err(StoreError::Backend(format!("invalid table name '{}'", table)))
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[async_trait]
impl StoreBackend for SqliteBackend {
    async fn ensure_table(&self) -> Result<(), StoreError> {
        self.with_conn(|conn, table| {
            conn.execute_batch(&format!(
                r#"
                CREATE TABLE IF NOT EXISTS {table} (
                    pk TEXT NOT NULL,
                    sk INTEGER NOT NULL,
                    payload BLOB NOT NULL,
                    expiration_time INTEGER NOT NULL,
                    PRIMARY KEY (pk, sk)
                );
                "#
            ))?;
            Ok(())
        })
        .await
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
        self.with_conn(move |conn, table| {
            conn.execute(
                &format!("DELETE FROM {table} WHERE pk = ?1 AND expiration_time <= ?2"),
                params![record.partition_key, now],
            )?;
            let inserted = conn.execute(
                &format!(
                    "INSERT INTO {table} (pk, sk, payload, expiration_time) VALUES (?1, ?2, ?3, ?4)"
                ),
                params![
                    record.partition_key,
                    record.sort_key,
                    record.payload,
                    record.expiration_time
                ],
            );
            match inserted {
                Ok(_) => Ok(()),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == ErrorCode::ConstraintViolation =>
                {
                    Err(StoreError::Conflict {
                        partition_key: record.partition_key,
                        sort_key: record.sort_key,
                    })
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn query(
        &self,
        partition_key: &str,
        limit: Option<usize>,
    ) -> Result<Vec<SessionRecord>, StoreError> {
        let pk = partition_key.to_string();
        // SQLite 中 LIMIT -1 表示不限
        let limit = limit.map_or(-1, |n| i64::try_from(n).unwrap_or(i64::MAX));
        let now = now_secs();
        self.with_conn(move |conn, table| {
            let mut stmt = conn.prepare(&format!(
                "SELECT pk, sk, payload, expiration_time FROM {table} \
                 WHERE pk = ?1 AND expiration_time > ?2 ORDER BY sk DESC LIMIT ?3"
            ))?;
            let rows = stmt.query_map(params![pk, now, limit], |row| {
                Ok(SessionRecord {
                    partition_key: row.get(0)?,
                    sort_key: row.get(1)?,
                    payload: row.get(2)?,
                    expiration_time: row.get(3)?,
                })
            })?;
            let records = rows.collect::<Result<Vec<_>, _>>()?;
            Ok(records)
        })
        .await
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}
