use crate::error::{AppError, Result};
use crate::services::database::{
    compare_values, field_value, missing_document, DocumentStore, OrderBy, Query, ServerClock,
    SortDirection, WriteBatch, WriteOp, CREATED_AT,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

type Collection = BTreeMap<String, Value>;

/// 进程内文档存储
///
/// 批量写入先在被触及文档的副本上执行，全部成功后才写回，保证原子性。
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
    clock: ServerClock,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 直接写入（覆盖）一个文档，不分配时间戳；用于导入已有数据
    pub fn seed(&self, collection: &str, doc: Value) -> Result<()> {
        let id = doc
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::bad_request("seeded document needs a string id"))?
            .to_string();

        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .insert(id, doc);
        Ok(())
    }

    pub fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map_or(0, |docs| docs.len())
    }

    pub fn documents(&self, collection: &str) -> Vec<Value> {
        self.collections
            .read()
            .get(collection)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default()
    }

    fn prepare_new(&self, id: &str, doc: Value) -> Result<Value> {
        let Value::Object(mut fields) = doc else {
            return Err(AppError::bad_request("document must be a JSON object"));
        };

        fields.insert("id".to_string(), Value::String(id.to_string()));
        if fields.get(CREATED_AT).map_or(true, Value::is_null) {
            fields.insert(CREATED_AT.to_string(), Value::String(self.clock.now_string()));
        }
        Ok(Value::Object(fields))
    }

    fn apply(&self, ops: Vec<WriteOp>) -> Result<()> {
        let mut guard = self.collections.write();
        // 只暂存批次触及的文档；None 表示已删除
        let mut staged: HashMap<(String, String), Option<Value>> = HashMap::new();

        for op in ops {
            let collection = op.collection().to_string();
            let id = op.id().to_string();
            let slot = staged.entry((collection.clone(), id.clone())).or_insert_with(|| {
                guard
                    .get(&collection)
                    .and_then(|docs| docs.get(&id))
                    .cloned()
            });

            match op {
                WriteOp::Create { doc, .. } => {
                    if slot.is_some() {
                        return Err(AppError::Conflict(format!("{}/{} already exists", collection, id)));
                    }
                    *slot = Some(self.prepare_new(&id, doc)?);
                }
                WriteOp::Merge { fields, .. } => {
                    let existing = slot.as_mut().ok_or_else(|| missing_document(&collection, &id))?;
                    merge_fields(existing, fields)?;
                }
                WriteOp::Increment { field, delta, .. } => {
                    let existing = slot.as_mut().ok_or_else(|| missing_document(&collection, &id))?;
                    apply_increment(existing, &field, delta)?;
                }
                WriteOp::Delete { .. } => {
                    *slot = None;
                }
            }
        }

        for ((collection, id), doc) in staged {
            match doc {
                Some(doc) => {
                    guard.entry(collection).or_default().insert(id, doc);
                }
                None => {
                    if let Some(docs) = guard.get_mut(&collection) {
                        docs.remove(&id);
                    }
                }
            }
        }
        Ok(())
    }
}

fn doc_id(doc: &Value) -> &str {
    doc.get("id").and_then(Value::as_str).unwrap_or_default()
}

/// 按 (排序字段, ID) 比较两个位置；降序时整体反转
fn compare_positions(order: Option<&OrderBy>, a: (&Value, &str), b: (&Value, &str)) -> Ordering {
    match order {
        Some(order) => {
            let ordering = compare_values(a.0, b.0).then_with(|| a.1.cmp(b.1));
            match order.direction {
                SortDirection::Ascending => ordering,
                SortDirection::Descending => ordering.reverse(),
            }
        }
        None => a.1.cmp(b.1),
    }
}

fn sort_value<'a>(order: Option<&OrderBy>, doc: &'a Value) -> &'a Value {
    order
        .and_then(|order| field_value(doc, &order.field))
        .unwrap_or(&Value::Null)
}

fn merge_fields(doc: &mut Value, fields: Value) -> Result<()> {
    let (Some(target), Value::Object(fields)) = (doc.as_object_mut(), fields) else {
        return Err(AppError::bad_request("merge requires JSON objects"));
    };

    for (key, value) in fields {
        if key != "id" {
            target.insert(key, value);
        }
    }
    Ok(())
}

fn apply_increment(doc: &mut Value, path: &str, delta: i64) -> Result<()> {
    let not_object = || AppError::Database(format!("cannot increment '{}' through a non-object field", path));
    let (parents, last) = match path.rsplit_once('.') {
        Some((parents, last)) => (Some(parents), last),
        None => (None, path),
    };

    let mut target = doc;
    if let Some(parents) = parents {
        for key in parents.split('.') {
            target = target
                .as_object_mut()
                .ok_or_else(not_object)?
                .entry(key.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }
    }

    let fields = target.as_object_mut().ok_or_else(not_object)?;
    let current = fields.get(last).and_then(Value::as_i64).unwrap_or(0);
    fields.insert(last.to_string(), Value::from(current + delta));
    Ok(())
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    async fn query(&self, query: &Query) -> Result<Vec<Value>> {
        let guard = self.collections.read();
        let Some(docs) = guard.get(&query.collection) else {
            return Ok(Vec::new());
        };

        let order = query.order_by.as_ref();
        let mut matched: Vec<&Value> = docs
            .values()
            .filter(|doc| query.filters.iter().all(|filter| filter.matches(doc)))
            .collect();

        matched.sort_by(|a, b| {
            compare_positions(order, (sort_value(order, a), doc_id(a)), (sort_value(order, b), doc_id(b)))
        });

        if let Some(start) = &query.start_after {
            matched.retain(|doc| {
                compare_positions(
                    order,
                    (sort_value(order, doc), doc_id(doc)),
                    (&start.sort_value, &start.id),
                ) == Ordering::Greater
            });
        }

        Ok(matched
            .into_iter()
            .take(query.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn get_many(&self, collection: &str, ids: &[String]) -> Result<Vec<Value>> {
        let guard = self.collections.read();
        let Some(docs) = guard.get(collection) else {
            return Ok(Vec::new());
        };

        Ok(ids.iter().filter_map(|id| docs.get(id)).cloned().collect())
    }

    async fn create(&self, collection: &str, id: &str, doc: Value) -> Result<Value> {
        let mut batch = WriteBatch::new();
        batch.create(collection, id, doc);
        self.apply(batch.into_ops())?;

        self.collections
            .read()
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned()
            .ok_or_else(|| AppError::internal("Failed to create record"))
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        Ok(self
            .collections
            .write()
            .get_mut(collection)
            .map_or(false, |docs| docs.remove(id).is_some()))
    }

    async fn commit(&self, batch: WriteBatch) -> Result<()> {
        self.apply(batch.into_ops())
    }
}
