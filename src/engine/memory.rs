//! In-memory persistence engine.
//!
//! Tables of JSON records keyed by resource name. Transactions are
//! serialized: `begin` takes the writer lock and clones the database into a
//! working copy, `commit` swaps the copy in, `rollback` (or dropping the
//! handle) discards it.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::debug;

use super::{
    Criteria, EngineClient, EngineError, EngineResult, FindManyArgs, KnownErrorCode,
    KnownRequestError, ModelDelegate, Resource, SortOrder, ID_FIELD,
};

type Record = Map<String, Value>;

const CREATED_AT: &str = "createdAt";
const UPDATED_AT: &str = "updatedAt";

// == Storage ==
#[derive(Debug, Clone, Default)]
struct Table {
    rows: Vec<Record>,
    next_id: u64,
}

#[derive(Debug, Clone, Default)]
struct Database {
    tables: HashMap<String, Table>,
}

impl Database {
    fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    fn table_mut(&mut self, name: &str) -> &mut Table {
        self.tables.entry(name.to_string()).or_default()
    }
}

impl Table {
    fn position(&self, criteria: &Criteria) -> Option<usize> {
        self.rows.iter().position(|row| criteria.matches(row))
    }

    fn find(&self, criteria: &Criteria) -> Option<&Record> {
        self.rows.iter().find(|row| criteria.matches(row))
    }

    fn check_unique(
        &self,
        record: &Record,
        unique: &[String],
        skip: Option<usize>,
    ) -> EngineResult<()> {
        let fields = std::iter::once(ID_FIELD).chain(unique.iter().map(String::as_str));

        for field in fields {
            let Some(value) = record.get(field).filter(|v| !v.is_null()) else {
                continue;
            };
            let clash = self
                .rows
                .iter()
                .enumerate()
                .any(|(index, row)| Some(index) != skip && row.get(field) == Some(value));

            if clash {
                return Err(KnownRequestError::new(
                    KnownErrorCode::UniqueViolation,
                    format!("Unique constraint failed on the fields: (`{}`)", field),
                )
                .with_target(field)
                .into());
            }
        }
        Ok(())
    }

    fn insert(&mut self, mut record: Record, unique: &[String]) -> EngineResult<Record> {
        let has_id = matches!(record.get(ID_FIELD), Some(Value::String(id)) if !id.is_empty());
        if !has_id {
            self.next_id += 1;
            record.insert(ID_FIELD.to_string(), Value::String(self.next_id.to_string()));
        }

        let now = timestamp();
        record.entry(CREATED_AT).or_insert_with(|| now.clone());
        record.insert(UPDATED_AT.to_string(), now);

        self.check_unique(&record, unique, None)?;
        self.rows.push(record.clone());
        Ok(record)
    }

    fn update(
        &mut self,
        criteria: &Criteria,
        patch: Record,
        unique: &[String],
    ) -> EngineResult<Record> {
        let index = self
            .position(criteria)
            .ok_or_else(|| record_not_found("update"))?;

        let mut updated = self.rows[index].clone();
        for (field, value) in patch {
            if field != ID_FIELD {
                updated.insert(field, value);
            }
        }
        updated.insert(UPDATED_AT.to_string(), timestamp());

        self.check_unique(&updated, unique, Some(index))?;
        self.rows[index] = updated.clone();
        Ok(updated)
    }

    fn delete(&mut self, criteria: &Criteria) -> EngineResult<Record> {
        let index = self
            .position(criteria)
            .ok_or_else(|| record_not_found("delete"))?;
        Ok(self.rows.remove(index))
    }

    fn find_many(&self, args: &FindManyArgs) -> Vec<Record> {
        let mut rows: Vec<&Record> = self
            .rows
            .iter()
            .filter(|row| {
                args.filters.iter().all(|(field, expected)| {
                    row.get(field)
                        .map_or(false, |value| value_matches(value, expected))
                })
            })
            .collect();

        // Stable sorts applied last-key-first leave the first key primary
        for (field, order) in args.order_by.iter().rev() {
            rows.sort_by(|a, b| {
                let ordering = compare_values(a.get(field), b.get(field));
                match order {
                    SortOrder::Asc => ordering,
                    SortOrder::Desc => ordering.reverse(),
                }
            });
        }

        rows.into_iter()
            .skip(args.skip as usize)
            .take(args.take as usize)
            .cloned()
            .collect()
    }
}

fn timestamp() -> Value {
    Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true))
}

fn record_not_found(operation: &str) -> EngineError {
    KnownRequestError::new(
        KnownErrorCode::RecordNotFound,
        format!("Record to {} not found.", operation),
    )
    .into()
}

/// Query-string filters arrive as text; compare against the value's text form.
fn value_matches(value: &Value, expected: &str) -> bool {
    match value {
        Value::String(s) => s == expected,
        other => other.to_string() == expected,
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());

    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

fn to_record<T: Serialize>(payload: &T) -> EngineResult<Record> {
    match serde_json::to_value(payload) {
        Ok(Value::Object(record)) => Ok(record),
        Ok(_) => Err(EngineError::Other(
            "payload must serialize to a JSON object".to_string(),
        )),
        Err(err) => Err(EngineError::Other(format!("payload encoding failed: {}", err))),
    }
}

fn from_record<T: DeserializeOwned>(record: Record) -> EngineResult<T> {
    serde_json::from_value(Value::Object(record))
        .map_err(|err| EngineError::Other(format!("record decoding failed: {}", err)))
}

// == Connection ==
struct MemoryTx {
    working: Mutex<Database>,
    guard: Mutex<Option<OwnedMutexGuard<()>>>,
}

/// Connection handle of the in-memory engine: either direct access or an
/// open transaction over a working copy.
pub struct MemoryConn {
    tx: Option<MemoryTx>,
}

impl MemoryConn {
    pub fn is_transaction(&self) -> bool {
        self.tx.is_some()
    }
}

// == Memory Engine ==
struct Inner {
    state: RwLock<Database>,
    /// Held by an open transaction and by direct writes
    writer: Arc<Mutex<()>>,
    /// Unique fields per table, `id` is always unique
    unique: HashMap<String, Vec<String>>,
}

/// Thread-safe in-memory engine, cheap to clone.
#[derive(Clone)]
pub struct MemoryEngine {
    inner: Arc<Inner>,
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::with_unique(&[])
    }

    /// Creates an engine enforcing `(table, field)` unique constraints.
    pub fn with_unique(constraints: &[(&str, &str)]) -> Self {
        let mut unique: HashMap<String, Vec<String>> = HashMap::new();
        for (table, field) in constraints {
            unique
                .entry(table.to_string())
                .or_default()
                .push(field.to_string());
        }

        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(Database::default()),
                writer: Arc::new(Mutex::new(())),
                unique,
            }),
        }
    }

    /// Delegate serving resource `R` from the table named after it.
    pub fn model<R: Resource>(&self) -> MemoryModel<R> {
        MemoryModel {
            engine: self.clone(),
            table: R::NAME.to_string(),
            _resource: PhantomData,
        }
    }

    /// Number of committed rows in a table.
    pub async fn count(&self, table: &str) -> usize {
        self.inner
            .state
            .read()
            .await
            .table(table)
            .map_or(0, |t| t.rows.len())
    }

    fn unique_fields(&self, table: &str) -> Vec<String> {
        self.inner.unique.get(table).cloned().unwrap_or_default()
    }

    async fn read<T, F>(&self, conn: &MemoryConn, f: F) -> T
    where
        F: FnOnce(&Database) -> T + Send,
    {
        match &conn.tx {
            Some(tx) => {
                let db = tx.working.lock().await;
                f(&db)
            }
            None => {
                let db = self.inner.state.read().await;
                f(&db)
            }
        }
    }

    async fn write<T, F>(&self, conn: &MemoryConn, f: F) -> EngineResult<T>
    where
        F: FnOnce(&mut Database) -> EngineResult<T> + Send,
    {
        match &conn.tx {
            Some(tx) => {
                let mut db = tx.working.lock().await;
                f(&mut db)
            }
            None => {
                let _writer = self.inner.writer.lock().await;
                let mut db = self.inner.state.write().await;
                f(&mut db)
            }
        }
    }
}

#[async_trait]
impl EngineClient for MemoryEngine {
    type Conn = MemoryConn;

    fn connection(&self) -> MemoryConn {
        MemoryConn { tx: None }
    }

    async fn begin(&self) -> EngineResult<MemoryConn> {
        let guard = self.inner.writer.clone().lock_owned().await;
        let working = self.inner.state.read().await.clone();
        debug!("memory engine transaction opened");

        Ok(MemoryConn {
            tx: Some(MemoryTx {
                working: Mutex::new(working),
                guard: Mutex::new(Some(guard)),
            }),
        })
    }

    async fn commit(&self, conn: &MemoryConn) -> EngineResult<()> {
        let Some(tx) = &conn.tx else {
            return Ok(());
        };

        let mut guard = tx.guard.lock().await;
        if guard.is_none() {
            return Err(EngineError::Other("transaction already finished".to_string()));
        }

        let working = tx.working.lock().await;
        *self.inner.state.write().await = working.clone();
        guard.take();
        debug!("memory engine transaction committed");
        Ok(())
    }

    async fn rollback(&self, conn: &MemoryConn) -> EngineResult<()> {
        if let Some(tx) = &conn.tx {
            tx.guard.lock().await.take();
            debug!("memory engine transaction rolled back");
        }
        Ok(())
    }
}

// == Memory Model ==
/// [`ModelDelegate`] for one resource table of a [`MemoryEngine`].
pub struct MemoryModel<R> {
    engine: MemoryEngine,
    table: String,
    _resource: PhantomData<fn() -> R>,
}

#[async_trait]
impl<R: Resource> ModelDelegate<R, MemoryEngine> for MemoryModel<R> {
    async fn find_many(&self, conn: &MemoryConn, args: &FindManyArgs) -> EngineResult<Vec<R>> {
        let table = self.table.as_str();
        let rows = self
            .engine
            .read(conn, |db| {
                db.table(table)
                    .map(|t| t.find_many(args))
                    .unwrap_or_default()
            })
            .await;

        rows.into_iter().map(from_record).collect()
    }

    async fn find_unique(
        &self,
        conn: &MemoryConn,
        criteria: &Criteria,
    ) -> EngineResult<Option<R>> {
        let table = self.table.as_str();
        let row = self
            .engine
            .read(conn, |db| db.table(table).and_then(|t| t.find(criteria)).cloned())
            .await;

        row.map(from_record).transpose()
    }

    async fn create(&self, conn: &MemoryConn, data: &R::Create) -> EngineResult<R> {
        let record = to_record(data)?;
        let unique = self.engine.unique_fields(&self.table);
        let table = self.table.as_str();

        let row = self
            .engine
            .write(conn, |db| db.table_mut(table).insert(record, &unique))
            .await?;
        from_record(row)
    }

    async fn update(
        &self,
        conn: &MemoryConn,
        criteria: &Criteria,
        data: &R::Update,
    ) -> EngineResult<R> {
        let patch = to_record(data)?;
        let unique = self.engine.unique_fields(&self.table);
        let table = self.table.as_str();

        let row = self
            .engine
            .write(conn, |db| db.table_mut(table).update(criteria, patch, &unique))
            .await?;
        from_record(row)
    }

    async fn delete(&self, conn: &MemoryConn, criteria: &Criteria) -> EngineResult<R> {
        let table = self.table.as_str();
        let row = self
            .engine
            .write(conn, |db| db.table_mut(table).delete(criteria))
            .await?;
        from_record(row)
    }
}
