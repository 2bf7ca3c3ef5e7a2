use crate::config::Config;
use crate::error::{AppError, Result};
use crate::services::database::{
    DocumentStore, Filter, Query, ServerClock, SortDirection, WriteBatch, WriteOp, CREATED_AT,
};
use crate::utils::serde_helpers::{normalize_record_id, plain_record_id};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use surrealdb::engine::remote::http::{Client, Http, Https};
use surrealdb::opt::auth::Root;
use surrealdb::sql::Thing;
use surrealdb::Surreal;
use tracing::{debug, error, info};

const FAILED_TRANSACTION: &str = "not executed due to a failed transaction";

/// 查询参数；记录 ID 必须以 `Thing` 绑定，其余按 JSON 绑定
#[derive(Debug, Clone, PartialEq)]
enum Binding {
    Json(Value),
    Thing(Thing),
    Things(Vec<Thing>),
}

#[derive(Debug, Default)]
struct Statement {
    sql: String,
    bindings: Vec<(String, Binding)>,
}

impl Statement {
    fn bind(&mut self, name: String, binding: Binding) -> String {
        let placeholder = format!("${}", name);
        self.bindings.push((name, binding));
        placeholder
    }
}

/// 基于 SurrealDB HTTP 协议的文档存储
#[derive(Debug, Clone)]
pub struct SurrealStore {
    db: Surreal<Client>,
    clock: std::sync::Arc<ServerClock>,
}

impl SurrealStore {
    pub async fn connect(config: &Config) -> Result<Self> {
        let url = config.database_url.trim().trim_end_matches('/');
        let db = match url.strip_prefix("https://") {
            Some(address) => Surreal::new::<Https>(address).await,
            None => Surreal::new::<Http>(url.strip_prefix("http://").unwrap_or(url)).await,
        }
        .map_err(map_surreal_error)?;

        if !config.database_username.is_empty() {
            db.signin(Root {
                username: &config.database_username,
                password: &config.database_password,
            })
            .await
            .map_err(map_surreal_error)?;
        }

        db.use_ns(&config.database_namespace)
            .use_db(&config.database_name)
            .await
            .map_err(map_surreal_error)?;

        info!(
            "Connected to SurrealDB {}/{}",
            config.database_namespace, config.database_name
        );

        Ok(Self {
            db,
            clock: std::sync::Arc::new(ServerClock::new()),
        })
    }

    async fn run(&self, statement: Statement) -> Result<surrealdb::Response> {
        debug!("Executing query: {}", statement.sql);

        let mut query = self.db.query(statement.sql);
        for (name, binding) in statement.bindings {
            query = match binding {
                Binding::Json(value) => query.bind((name, value)),
                Binding::Thing(thing) => query.bind((name, thing)),
                Binding::Things(things) => query.bind((name, things)),
            };
        }

        let mut response = query.await.map_err(map_surreal_error)?;
        let errors = response.take_errors();
        if errors.is_empty() {
            return Ok(response);
        }

        // 事务失败时其余语句只会报告"未执行"，真正的原因在失败的那条语句上
        let mut errors: Vec<(usize, surrealdb::Error)> = errors.into_iter().collect();
        errors.sort_by_key(|(index, _)| *index);
        let cause = errors
            .iter()
            .position(|(_, e)| !e.to_string().contains(FAILED_TRANSACTION))
            .unwrap_or(0);
        let (index, err) = errors.swap_remove(cause);
        debug!("Statement {} failed: {}", index, err);
        Err(map_surreal_error(err))
    }

    async fn rows(&self, statement: Statement) -> Result<Vec<Value>> {
        let mut response = self.run(statement).await?;
        let rows: Vec<Value> = response.take(0).map_err(map_surreal_error)?;
        Ok(rows.into_iter().map(normalize_record_id).collect())
    }

    fn prepare_content(&self, doc: Value) -> Result<Value> {
        let Value::Object(mut fields) = doc else {
            return Err(AppError::bad_request("document must be a JSON object"));
        };

        fields.remove("id");
        if fields.get(CREATED_AT).map_or(true, Value::is_null) {
            fields.insert(CREATED_AT.to_string(), Value::String(self.clock.now_string()));
        }
        Ok(Value::Object(fields))
    }
}

pub fn map_surreal_error(err: surrealdb::Error) -> AppError {
    let message = err.to_string();
    let lowered = message.to_lowercase();
    if lowered.contains("already exists") {
        AppError::Conflict(message)
    } else if lowered.contains("not found") {
        AppError::NotFound(message)
    } else {
        error!("SurrealDB error: {}", message);
        AppError::Database(message)
    }
}

/// 字段路径直接拼进 SQL，只接受标识符和点号
fn checked_field(field: &str) -> Result<&str> {
    let valid = !field.is_empty()
        && field
            .split('.')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));

    if valid {
        Ok(field)
    } else {
        Err(AppError::bad_request(&format!("Invalid field path '{}'", field)))
    }
}

fn record(collection: &str, id: &str) -> Thing {
    Thing::from((collection, id))
}

fn filter_value(collection: &str, field: &str, value: &Value) -> Binding {
    match (field, value.as_str()) {
        ("id", Some(id)) => Binding::Thing(record(collection, id)),
        _ => Binding::Json(value.clone()),
    }
}

fn build_select(query: &Query) -> Result<Statement> {
    let mut statement = Statement::default();
    let table = statement.bind("tb".to_string(), Binding::Json(Value::String(query.collection.clone())));
    let mut conditions = Vec::new();

    for (i, filter) in query.filters.iter().enumerate() {
        let field = checked_field(filter.field())?;
        let name = format!("f{}", i);
        match filter {
            Filter::Eq { value, .. } => {
                let param = statement.bind(name, filter_value(&query.collection, field, value));
                conditions.push(format!("{} = {}", field, param));
            }
            Filter::In { values, .. } => {
                let binding = if field == "id" {
                    Binding::Things(
                        values
                            .iter()
                            .filter_map(Value::as_str)
                            .map(|id| record(&query.collection, id))
                            .collect(),
                    )
                } else {
                    Binding::Json(Value::Array(values.clone()))
                };
                let param = statement.bind(name, binding);
                conditions.push(format!("{} IN {}", field, param));
            }
        }
    }

    let order = match &query.order_by {
        Some(order) => Some((checked_field(&order.field)?, order.direction)),
        None => None,
    };

    if let Some(start) = &query.start_after {
        let after_id = statement.bind(
            "after_id".to_string(),
            Binding::Thing(record(&query.collection, &start.id)),
        );
        match order {
            Some((field, direction)) => {
                let op = match direction {
                    SortDirection::Ascending => ">",
                    SortDirection::Descending => "<",
                };
                let after_value = statement.bind("after_value".to_string(), Binding::Json(start.sort_value.clone()));
                conditions.push(format!(
                    "({field} {op} {v} OR ({field} = {v} AND id {op} {id}))",
                    field = field,
                    op = op,
                    v = after_value,
                    id = after_id
                ));
            }
            None => conditions.push(format!("id > {}", after_id)),
        }
    }

    let mut sql = format!("SELECT * FROM type::table({})", table);
    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }

    match order {
        Some((field, direction)) => {
            let dir = match direction {
                SortDirection::Ascending => "ASC",
                SortDirection::Descending => "DESC",
            };
            sql.push_str(&format!(" ORDER BY {} {}, id {}", field, dir, dir));
        }
        None => sql.push_str(" ORDER BY id ASC"),
    }

    if let Some(limit) = query.limit {
        let param = statement.bind("limit".to_string(), Binding::Json(Value::from(limit as u64)));
        sql.push_str(&format!(" LIMIT {}", param));
    }

    statement.sql = sql;
    Ok(statement)
}

/// 把批量写入编排成单个事务；合并和增量只作用于已存在的记录，
/// 记录缺失时 THROW 使整个事务回滚
fn build_transaction(ops: Vec<WriteOp>, prepare: impl Fn(Value) -> Result<Value>) -> Result<Statement> {
    let mut statement = Statement::default();
    let mut lines = vec!["BEGIN TRANSACTION;".to_string()];

    for (i, op) in ops.into_iter().enumerate() {
        match op {
            WriteOp::Create { collection, id, doc } => {
                let thing = statement.bind(format!("r{}", i), Binding::Thing(record(&collection, &id)));
                let content = statement.bind(format!("d{}", i), Binding::Json(prepare(doc)?));
                lines.push(format!("CREATE {} CONTENT {};", thing, content));
            }
            WriteOp::Merge { collection, id, fields } => {
                let guard = guarded_update(&mut statement, i, &collection, &id);
                let content = statement.bind(format!("d{}", i), Binding::Json(fields));
                lines.push(guard.assert_found());
                lines.push(guard.update(&format!("MERGE {}", content)));
            }
            WriteOp::Increment { collection, id, field, delta } => {
                let field = checked_field(&field)?.to_string();
                let guard = guarded_update(&mut statement, i, &collection, &id);
                let amount = statement.bind(format!("d{}", i), Binding::Json(Value::from(delta)));
                lines.push(guard.assert_found());
                lines.push(guard.update(&format!("SET {} += {}", field, amount)));
            }
            WriteOp::Delete { collection, id } => {
                let thing = statement.bind(format!("r{}", i), Binding::Thing(record(&collection, &id)));
                lines.push(format!("DELETE {};", thing));
            }
        }
    }

    lines.push("COMMIT TRANSACTION;".to_string());
    statement.sql = lines.join("\n");
    Ok(statement)
}

struct GuardedUpdate {
    thing: String,
    label: String,
}

fn guarded_update(statement: &mut Statement, i: usize, collection: &str, id: &str) -> GuardedUpdate {
    GuardedUpdate {
        thing: statement.bind(format!("r{}", i), Binding::Thing(record(collection, id))),
        label: format!("{}/{}", collection, id),
    }
}

impl GuardedUpdate {
    /// 按记录 ID 直接读取，不扫描整张表
    fn assert_found(&self) -> String {
        format!(
            "IF array::len((SELECT id FROM {})) = 0 {{ THROW \"{} not found\" }};",
            self.thing,
            self.label.replace('"', "")
        )
    }

    // 记录不存在时 UPDATE <record> 会创建它，所以必须先经过 assert_found
    fn update(&self, action: &str) -> String {
        format!("UPDATE {} {};", self.thing, action)
    }
}

#[async_trait]
impl DocumentStore for SurrealStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        let mut statement = Statement::default();
        let thing = statement.bind("r".to_string(), Binding::Thing(record(collection, id)));
        statement.sql = format!("SELECT * FROM {}", thing);

        Ok(self.rows(statement).await?.into_iter().next())
    }

    async fn query(&self, query: &Query) -> Result<Vec<Value>> {
        self.rows(build_select(query)?).await
    }

    async fn get_many(&self, collection: &str, ids: &[String]) -> Result<Vec<Value>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut statement = Statement::default();
        let things = statement.bind(
            "ids".to_string(),
            Binding::Things(ids.iter().map(|id| record(collection, id)).collect()),
        );
        statement.sql = format!("SELECT * FROM {}", things);

        let mut by_id: HashMap<String, Value> = self
            .rows(statement)
            .await?
            .into_iter()
            .filter_map(|row| Some((row.get("id").and_then(plain_record_id)?, row)))
            .collect();

        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    async fn create(&self, collection: &str, id: &str, doc: Value) -> Result<Value> {
        let mut statement = Statement::default();
        let thing = statement.bind("r".to_string(), Binding::Thing(record(collection, id)));
        let content = statement.bind("d".to_string(), Binding::Json(self.prepare_content(doc)?));
        statement.sql = format!("CREATE {} CONTENT {}", thing, content);

        self.rows(statement)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::internal("Failed to create record"))
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        let mut statement = Statement::default();
        let thing = statement.bind("r".to_string(), Binding::Thing(record(collection, id)));
        statement.sql = format!("DELETE {} RETURN BEFORE", thing);

        Ok(!self.rows(statement).await?.is_empty())
    }

    async fn commit(&self, batch: WriteBatch) -> Result<()> {
        let statement = build_transaction(batch.into_ops(), |doc| self.prepare_content(doc))?;
        self.run(statement).await?;
        Ok(())
    }

    async fn verify_connection(&self) -> Result<()> {
        let mut statement = Statement::default();
        statement.sql = "INFO FOR DB".to_string();
        match self.run(statement).await {
            Ok(_) => {
                info!("Database connection verified successfully");
                Ok(())
            }
            Err(e) => {
                error!("Failed to verify database connection: {}", e);
                Err(e)
            }
        }
    }
}
