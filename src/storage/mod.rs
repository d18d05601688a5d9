//! Storage adapter contract.
//!
//! The engine talks to its backing graph store only through [`GraphStore`] and
//! the unit-of-work [`GraphTx`] it hands out. Every public engine operation
//! opens exactly one transaction and finishes it with exactly one
//! [`GraphTx::commit`] or [`GraphTx::rollback`].

use crate::error::Result;
use crate::model::{
    Direction, Edge, EdgeId, EdgeLabel, Properties, PropertyValue, Vertex, VertexId, VertexKind,
};

/// SQLite-backed implementation of the contract.
pub mod sqlite;

pub use sqlite::SqliteGraphStore;

/// Whether a property key lives on vertices or edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyOwner {
    /// Vertex property.
    Vertex,
    /// Edge property.
    Edge,
}

impl KeyOwner {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            KeyOwner::Vertex => "vertex",
            KeyOwner::Edge => "edge",
        }
    }
}

/// Declared value type of a property key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    /// Boolean.
    Bool,
    /// 64-bit integer (ids, timestamps, durations).
    Int,
    /// String.
    String,
    /// List of values.
    List,
}

impl DataType {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            DataType::Bool => "bool",
            DataType::Int => "int",
            DataType::String => "string",
            DataType::List => "list",
        }
    }

    pub(crate) fn parse(s: &str) -> Option<Self> {
        match s {
            "bool" => Some(DataType::Bool),
            "int" => Some(DataType::Int),
            "string" => Some(DataType::String),
            "list" => Some(DataType::List),
            _ => None,
        }
    }
}

/// How a property key is indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    /// Not indexed; equality lookups scan.
    None,
    /// Equality index.
    Standard,
    /// Equality index enforcing uniqueness per vertex kind.
    Unique,
    /// Search-optimized ordering index used for range scans over numeric ids.
    Search,
}

impl IndexKind {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            IndexKind::None => "none",
            IndexKind::Standard => "standard",
            IndexKind::Unique => "unique",
            IndexKind::Search => "search",
        }
    }

    pub(crate) fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(IndexKind::None),
            "standard" => Some(IndexKind::Standard),
            "unique" => Some(IndexKind::Unique),
            "search" => Some(IndexKind::Search),
            _ => None,
        }
    }
}

/// Declaration of a property key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDef {
    pub name: String,
    pub owner: KeyOwner,
    pub data_type: DataType,
    pub index: IndexKind,
}

impl IndexDef {
    pub fn new(name: impl Into<String>, owner: KeyOwner, data_type: DataType, index: IndexKind) -> Self {
        Self {
            name: name.into(),
            owner,
            data_type,
            index,
        }
    }
}

/// Sort order for range scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// Range scan over a search-optimized key. Bounds are exclusive.
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchRange {
    pub above: Option<i64>,
    pub below: Option<i64>,
    pub order: SortOrder,
    pub limit: Option<usize>,
}

impl SearchRange {
    /// Every value strictly greater than `value`.
    pub fn above(value: i64) -> Self {
        Self {
            above: Some(value),
            ..Self::default()
        }
    }

    pub fn below(mut self, value: i64) -> Self {
        self.below = Some(value);
        self
    }

    pub fn descending(mut self) -> Self {
        self.order = SortOrder::Descending;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// One row returned by a range scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchHit {
    pub vertex_id: VertexId,
    pub value: i64,
}

/// A unit of work against the graph store.
///
/// Dropping a transaction without committing rolls it back.
pub trait GraphTx {
    /// Returns the declaration of a property key, if it exists.
    fn property_key(&mut self, name: &str, owner: KeyOwner) -> Result<Option<IndexDef>>;
    /// Declares a property key and builds its index. Declaring an existing key is a no-op.
    fn declare_property(&mut self, def: &IndexDef) -> Result<()>;
    fn edge_label_exists(&mut self, label: EdgeLabel) -> Result<bool>;
    fn declare_edge_label(&mut self, label: EdgeLabel) -> Result<()>;

    fn add_vertex(&mut self, kind: VertexKind, properties: Properties) -> Result<VertexId>;
    fn vertex(&mut self, id: VertexId) -> Result<Option<Vertex>>;
    fn set_vertex_property(&mut self, id: VertexId, key: &str, value: PropertyValue) -> Result<()>;
    fn vertices_of_kind(&mut self, kind: VertexKind) -> Result<Vec<VertexId>>;
    /// Equality lookup on a vertex property, restricted to one vertex kind.
    fn find_vertices(
        &mut self,
        kind: VertexKind,
        key: &str,
        value: &PropertyValue,
    ) -> Result<Vec<VertexId>>;
    /// Range scan over a key declared with [`IndexKind::Search`].
    fn search_range(&mut self, key: &str, range: SearchRange) -> Result<Vec<SearchHit>>;

    fn add_edge(
        &mut self,
        label: EdgeLabel,
        source: VertexId,
        target: VertexId,
        properties: Properties,
    ) -> Result<EdgeId>;
    fn edge(&mut self, id: EdgeId) -> Result<Option<Edge>>;
    fn set_edge_property(&mut self, id: EdgeId, key: &str, value: PropertyValue) -> Result<()>;
    fn remove_edge(&mut self, id: EdgeId) -> Result<()>;
    /// Edges with `label` whose target (incoming) or source (outgoing) is `vertex`.
    fn edges_of(
        &mut self,
        vertex: VertexId,
        direction: Direction,
        label: EdgeLabel,
    ) -> Result<Vec<Edge>>;
    /// Equality lookup on an edge property.
    fn find_edges(&mut self, label: EdgeLabel, key: &str, value: &PropertyValue)
        -> Result<Vec<Edge>>;

    fn savepoint(&mut self, name: &str) -> Result<()>;
    fn release_savepoint(&mut self, name: &str) -> Result<()>;
    fn rollback_to_savepoint(&mut self, name: &str) -> Result<()>;

    fn commit(self: Box<Self>) -> Result<()>;
    fn rollback(self: Box<Self>) -> Result<()>;
}

/// A transactional graph store.
pub trait GraphStore: Send + Sync {
    /// Opens a new transaction. Blocks while another transaction is open.
    fn begin(&self) -> Result<Box<dyn GraphTx + '_>>;
}
