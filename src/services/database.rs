use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{decode, Document};
use crate::services::{memory::MemoryStore, surreal::SurrealStore};
use crate::utils::serde_helpers::format_timestamp;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;
use std::sync::atomic::{AtomicI64, Ordering as AtomicOrdering};
use std::sync::Arc;
use tracing::{info, warn};

/// 文档的创建时间字段，由存储在写入时分配
pub const CREATED_AT: &str = "createdAt";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq { field: String, value: Value },
    /// "值在小集合中"
    In { field: String, values: Vec<Value> },
}

impl Filter {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Self::Eq {
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn is_in<V: Into<Value>>(field: &str, values: impl IntoIterator<Item = V>) -> Self {
        Self::In {
            field: field.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn field(&self) -> &str {
        match self {
            Self::Eq { field, .. } | Self::In { field, .. } => field,
        }
    }

    pub fn matches(&self, doc: &Value) -> bool {
        let actual = field_value(doc, self.field());
        match self {
            Self::Eq { value, .. } => actual == Some(value),
            Self::In { values, .. } => actual.map_or(false, |v| values.contains(v)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub direction: SortDirection,
}

/// 在既定排序中严格位于某个文档之后继续查询；ID 用于打破排序值相同的情况
#[derive(Debug, Clone, PartialEq)]
pub struct StartAfter {
    pub sort_value: Value,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<Filter>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<usize>,
    pub start_after: Option<StartAfter>,
}

impl Query {
    pub fn new(collection: &str) -> Self {
        Self {
            collection: collection.to_string(),
            filters: Vec::new(),
            order_by: None,
            limit: None,
            start_after: None,
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, field: &str, direction: SortDirection) -> Self {
        self.order_by = Some(OrderBy {
            field: field.to_string(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// 从游标文档恢复查询位置；游标文档缺少 ID 时忽略
    pub fn start_after_document(mut self, doc: &Value) -> Self {
        let Some(id) = doc.get("id").and_then(Value::as_str) else {
            return self;
        };
        let sort_value = self
            .order_by
            .as_ref()
            .and_then(|order| field_value(doc, &order.field).cloned())
            .unwrap_or(Value::Null);

        self.start_after = Some(StartAfter {
            sort_value,
            id: id.to_string(),
        });
        self
    }
}

/// 原子批量写入中的单个操作
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Create { collection: String, id: String, doc: Value },
    Merge { collection: String, id: String, fields: Value },
    Increment { collection: String, id: String, field: String, delta: i64 },
    Delete { collection: String, id: String },
}

impl WriteOp {
    pub fn collection(&self) -> &str {
        match self {
            Self::Create { collection, .. }
            | Self::Merge { collection, .. }
            | Self::Increment { collection, .. }
            | Self::Delete { collection, .. } => collection,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Create { id, .. }
            | Self::Merge { id, .. }
            | Self::Increment { id, .. }
            | Self::Delete { id, .. } => id,
        }
    }
}

/// 单次提交、全部成功或全部不生效的一组写入
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, collection: &str, id: &str, doc: Value) -> &mut Self {
        self.ops.push(WriteOp::Create {
            collection: collection.to_string(),
            id: id.to_string(),
            doc,
        });
        self
    }

    pub fn merge(&mut self, collection: &str, id: &str, fields: Value) -> &mut Self {
        self.ops.push(WriteOp::Merge {
            collection: collection.to_string(),
            id: id.to_string(),
            fields,
        });
        self
    }

    pub fn increment(&mut self, collection: &str, id: &str, field: &str, delta: i64) -> &mut Self {
        self.ops.push(WriteOp::Increment {
            collection: collection.to_string(),
            id: id.to_string(),
            field: field.to_string(),
            delta,
        });
        self
    }

    pub fn delete(&mut self, collection: &str, id: &str) -> &mut Self {
        self.ops.push(WriteOp::Delete {
            collection: collection.to_string(),
            id: id.to_string(),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

/// 文档存储：按集合保存以 ID 为键的 JSON 文档
///
/// 没有外键，也没有跨集合事务；只有 [`WriteBatch`] 提供原子的多文档写入。
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>>;

    async fn query(&self, query: &Query) -> Result<Vec<Value>>;

    /// 按 ID 集合批量读取；调用方负责控制集合大小
    async fn get_many(&self, collection: &str, ids: &[String]) -> Result<Vec<Value>>;

    /// ID 已存在时返回 `Conflict`；缺少 `createdAt` 时由存储分配
    async fn create(&self, collection: &str, id: &str, doc: Value) -> Result<Value>;

    /// 返回是否确实删除了文档
    async fn delete(&self, collection: &str, id: &str) -> Result<bool>;

    async fn commit(&self, batch: WriteBatch) -> Result<()>;

    /// 原子增量；文档不存在时返回 `NotFound`，字段支持点号路径
    async fn increment(&self, collection: &str, id: &str, field: &str, delta: i64) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.increment(collection, id, field, delta);
        self.commit(batch).await
    }

    /// 合并顶层字段；文档不存在时返回 `NotFound`
    async fn merge(&self, collection: &str, id: &str, fields: Value) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.merge(collection, id, fields);
        self.commit(batch).await
    }

    async fn verify_connection(&self) -> Result<()> {
        Ok(())
    }
}

/// 单调递增的服务器时间戳，同一进程内两次写入不会得到相同的时间
#[derive(Debug, Default)]
pub struct ServerClock {
    last_micros: AtomicI64,
}

impl ServerClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> DateTime<Utc> {
        let wall = Utc::now().timestamp_micros();
        let mut last = self.last_micros.load(AtomicOrdering::SeqCst);
        loop {
            let next = wall.max(last + 1);
            match self.last_micros.compare_exchange(last, next, AtomicOrdering::SeqCst, AtomicOrdering::SeqCst) {
                Ok(_) => {
                    let secs = next.div_euclid(1_000_000);
                    let nanos = (next.rem_euclid(1_000_000) * 1_000) as u32;
                    return Utc.timestamp_opt(secs, nanos).single().unwrap_or_else(Utc::now);
                }
                Err(current) => last = current,
            }
        }
    }

    pub fn now_string(&self) -> String {
        format_timestamp(&self.now())
    }
}

/// 读取点号路径字段
pub fn field_value<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |current, key| current.get(key))
}

/// 文档字段值的全序：null < bool < number < string < 其他
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// 数据库服务：持有具体存储实现，并提供强类型读写
#[derive(Clone)]
pub struct Database {
    store: Arc<dyn DocumentStore>,
    in_query_limit: usize,
}

impl Database {
    /// 按配置创建数据库实例，`DATABASE_URL=memory` 使用进程内存储
    pub async fn new(config: &Config) -> Result<Self> {
        let store: Arc<dyn DocumentStore> = if config.uses_memory_database() {
            warn!("Using in-process memory store; data will not survive restarts");
            Arc::new(MemoryStore::new())
        } else {
            info!("Initializing database connection to {}", config.database_url);
            Arc::new(SurrealStore::connect(config).await?)
        };

        Ok(Self::with_store(store, config.in_query_limit))
    }

    pub fn with_store(store: Arc<dyn DocumentStore>, in_query_limit: usize) -> Self {
        Self {
            store,
            in_query_limit: in_query_limit.max(1),
        }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// 验证数据库连接
    pub async fn verify_connection(&self) -> Result<()> {
        self.store.verify_connection().await
    }

    /// 通过ID获取单个记录
    pub async fn get_by_id<T: Document>(&self, id: &str) -> Result<Option<T>> {
        self.store
            .get(T::COLLECTION, id)
            .await?
            .map(decode::<T>)
            .transpose()
    }

    /// 执行查询并解码结果
    pub async fn find<T: Document>(&self, query: &Query) -> Result<Vec<T>> {
        self.store
            .query(query)
            .await?
            .into_iter()
            .map(decode::<T>)
            .collect()
    }

    /// "值在集合中"查找，按存储的批量上限分块；无法解码的文档跳过
    pub async fn get_many<T: Document>(&self, ids: &[String]) -> Result<Vec<T>> {
        let mut results = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(self.in_query_limit) {
            for doc in self.store.get_many(T::COLLECTION, chunk).await? {
                match decode::<T>(doc) {
                    Ok(item) => results.push(item),
                    Err(e) => warn!("Skipping undecodable {} document: {}", T::COLLECTION, e),
                }
            }
        }
        Ok(results)
    }

    /// 创建记录并返回存储后的文档
    pub async fn create<T, D>(&self, id: &str, data: &D) -> Result<T>
    where
        T: Document,
        D: Serialize,
    {
        let doc = serde_json::to_value(data)?;
        let created = self.store.create(T::COLLECTION, id, doc).await?;
        decode(created)
    }

    /// 通过ID删除记录
    pub async fn delete_by_id(&self, collection: &str, id: &str) -> Result<bool> {
        self.store.delete(collection, id).await
    }

    pub async fn increment(&self, collection: &str, id: &str, field: &str, delta: i64) -> Result<()> {
        self.store.increment(collection, id, field, delta).await
    }

    pub async fn merge(&self, collection: &str, id: &str, fields: Value) -> Result<()> {
        self.store.merge(collection, id, fields).await
    }

    pub async fn commit(&self, batch: WriteBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        self.store.commit(batch).await
    }
}

/// 文档不存在时的统一错误
pub fn missing_document(collection: &str, id: &str) -> AppError {
    AppError::NotFound(format!("{}/{} not found", collection, id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filter_matches() {
        let doc = json!({"postId": "p1", "author": {"id": "u1"}});
        assert!(Filter::eq("postId", "p1").matches(&doc));
        assert!(!Filter::eq("postId", "p2").matches(&doc));
        assert!(Filter::eq("author.id", "u1").matches(&doc));
        assert!(Filter::is_in("postId", ["p0", "p1"]).matches(&doc));
        assert!(!Filter::is_in("postId", Vec::<String>::new()).matches(&doc));
        assert!(!Filter::eq("missing", "x").matches(&doc));
    }

    #[test]
    fn test_compare_values() {
        assert_eq!(compare_values(&json!(1), &json!(2)), Ordering::Less);
        assert_eq!(compare_values(&json!("b"), &json!("a")), Ordering::Greater);
        assert_eq!(compare_values(&json!(null), &json!("a")), Ordering::Less);
        assert_eq!(compare_values(&json!(2.5), &json!(2.5)), Ordering::Equal);
    }

    #[test]
    fn test_start_after_document() {
        let query = Query::new("comments")
            .order_by(CREATED_AT, SortDirection::Descending)
            .start_after_document(&json!({"id": "c3", "createdAt": "2024-01-01T00:00:00.000000Z"}));

        assert_eq!(
            query.start_after,
            Some(StartAfter {
                sort_value: json!("2024-01-01T00:00:00.000000Z"),
                id: "c3".to_string(),
            })
        );

        let ignored = Query::new("comments").start_after_document(&json!({"createdAt": "x"}));
        assert_eq!(ignored.start_after, None);
    }

    #[test]
    fn test_server_clock_is_monotonic() {
        let clock = ServerClock::new();
        let mut previous = clock.now();
        for _ in 0..1000 {
            let next = clock.now();
            assert!(next > previous);
            previous = next;
        }
    }
}
