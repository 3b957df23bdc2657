//! Persistence Engine Boundary
//!
//! Capability traits the data-access layer needs from a persistence engine,
//! the query shapes passed across the boundary, and an in-memory engine.
//!
//! A resource is bound to the engine explicitly: a [`Repository`] is built
//! from an engine client plus the [`ModelDelegate`] that serves that
//! resource.
//!
//! [`Repository`]: crate::crud::Repository

mod error;
mod memory;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

pub use error::{EngineError, EngineResult, KnownErrorCode, KnownRequestError};
pub use memory::{MemoryConn, MemoryEngine, MemoryModel};

/// Identifier field every resource exposes.
pub const ID_FIELD: &str = "id";

// == Resource ==
/// A record type served by the CRUD pipeline.
pub trait Resource: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Payload accepted on create
    type Create: Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Partial payload accepted on update
    type Update: Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Resource name, used for cache-key namespacing and engine table lookup
    const NAME: &'static str;

    /// String form of the record identifier.
    fn id(&self) -> String;

    /// Update applied by a soft delete. `None` means the resource has no
    /// soft-delete support.
    fn soft_delete_patch() -> Option<Self::Update> {
        None
    }
}

// == Criteria ==
/// Equality criteria addressing records, e.g. `{ id: "42" }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Criteria(pub BTreeMap<String, Value>);

impl Criteria {
    pub fn id(id: &str) -> Self {
        Self::default().and(ID_FIELD, Value::String(id.to_string()))
    }

    pub fn and(mut self, field: impl Into<String>, value: Value) -> Self {
        self.0.insert(field.into(), value);
        self
    }

    /// Whether a record carries every criterion.
    pub fn matches(&self, record: &serde_json::Map<String, Value>) -> bool {
        self.0
            .iter()
            .all(|(field, expected)| record.get(field) == Some(expected))
    }
}

// == Sort Order ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "asc" => Some(SortOrder::Asc),
            "desc" => Some(SortOrder::Desc),
            _ => None,
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortOrder::Asc => f.write_str("asc"),
            SortOrder::Desc => f.write_str("desc"),
        }
    }
}

// == Find Many Args ==
/// Engine-side collection query: paging, one ordering key and equality filters.
///
/// Maps are ordered, so two equal queries always serialize identically.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FindManyArgs {
    pub skip: u64,
    pub take: u64,
    pub order_by: BTreeMap<String, SortOrder>,
    #[serde(rename = "where")]
    pub filters: BTreeMap<String, String>,
}

impl Default for FindManyArgs {
    fn default() -> Self {
        Self {
            skip: 0,
            take: 10,
            order_by: BTreeMap::new(),
            filters: BTreeMap::new(),
        }
    }
}

// == Model Delegate ==
/// CRUD capabilities of the engine for one resource type.
///
/// Every call runs on the given connection, which is either the engine's
/// plain handle or an open transaction.
#[async_trait]
pub trait ModelDelegate<R: Resource, C: EngineClient>: Send + Sync {
    async fn find_many(&self, conn: &C::Conn, args: &FindManyArgs) -> EngineResult<Vec<R>>;

    async fn find_unique(&self, conn: &C::Conn, criteria: &Criteria) -> EngineResult<Option<R>>;

    async fn create(&self, conn: &C::Conn, data: &R::Create) -> EngineResult<R>;

    async fn update(&self, conn: &C::Conn, criteria: &Criteria, data: &R::Update)
        -> EngineResult<R>;

    async fn delete(&self, conn: &C::Conn, criteria: &Criteria) -> EngineResult<R>;
}

// == Engine Client ==
/// Connection and transaction capabilities of the engine client handle.
#[async_trait]
pub trait EngineClient: Send + Sync + 'static {
    /// Handle operations run on: a plain connection or an open transaction
    type Conn: Send + Sync + 'static;

    /// Verifies the engine is reachable. Called once at startup.
    async fn connect(&self) -> EngineResult<()> {
        Ok(())
    }

    async fn disconnect(&self) -> EngineResult<()> {
        Ok(())
    }

    /// Returns a handle that runs operations outside any transaction.
    fn connection(&self) -> Self::Conn;

    /// Opens a transaction.
    async fn begin(&self) -> EngineResult<Self::Conn>;

    async fn commit(&self, conn: &Self::Conn) -> EngineResult<()>;

    async fn rollback(&self, conn: &Self::Conn) -> EngineResult<()>;
}
