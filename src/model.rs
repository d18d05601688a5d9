//! Raw vertex and edge records as they cross the storage boundary.
//!
//! Nothing above [`crate::entity`] works with these types directly; the
//! algorithm layers only ever see decoded entities.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ProvenanceError, Result};

/// Storage-assigned vertex identifier.
pub type VertexId = i64;
/// Storage-assigned edge identifier.
pub type EdgeId = i64;

/// Property bag attached to a vertex or edge.
pub type Properties = BTreeMap<String, PropertyValue>;

/// A single typed property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    /// Boolean flag.
    Bool(bool),
    /// Signed 64-bit integer; timestamps are stored as Unix milliseconds.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Ordered list of values.
    List(Vec<PropertyValue>),
    /// Nested record, used for inheritance entries.
    Map(BTreeMap<String, PropertyValue>),
}

impl PropertyValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[PropertyValue]> {
        match self {
            PropertyValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, PropertyValue>> {
        match self {
            PropertyValue::Map(map) => Some(map),
            _ => None,
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Int(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::String(value.to_owned())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::String(value)
    }
}

impl<T: Into<PropertyValue>> From<Vec<T>> for PropertyValue {
    fn from(values: Vec<T>) -> Self {
        PropertyValue::List(values.into_iter().map(Into::into).collect())
    }
}

/// Closed set of vertex kinds persisted by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VertexKind {
    /// A tracked document.
    Document,
    /// A retention rule.
    AgeOffRule,
    /// A purge campaign.
    PurgeEvent,
    /// Singleton holding the highest age-off event id handed out.
    AgeOffEvent,
}

impl VertexKind {
    /// All kinds, in declaration order.
    pub const ALL: [VertexKind; 4] = [
        VertexKind::Document,
        VertexKind::AgeOffRule,
        VertexKind::PurgeEvent,
        VertexKind::AgeOffEvent,
    ];

    /// The persisted `type` tag.
    pub fn as_str(self) -> &'static str {
        match self {
            VertexKind::Document => "Document",
            VertexKind::AgeOffRule => "AgeOffRule",
            VertexKind::PurgeEvent => "PurgeEvent",
            VertexKind::AgeOffEvent => "AgeOffEvent",
        }
    }
}

impl fmt::Display for VertexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VertexKind {
    type Err = ProvenanceError;

    fn from_str(s: &str) -> Result<Self> {
        VertexKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ProvenanceError::Corruption(format!("unknown vertex type tag '{s}'")))
    }
}

/// Edge labels used by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EdgeLabel {
    /// Parent document to derived child document.
    DerivedFrom,
    /// Retention edge from a rule or an ancestor document to a document.
    AgeOff,
}

impl EdgeLabel {
    /// All labels, in declaration order.
    pub const ALL: [EdgeLabel; 2] = [EdgeLabel::DerivedFrom, EdgeLabel::AgeOff];

    /// The persisted label name.
    pub fn as_str(self) -> &'static str {
        match self {
            EdgeLabel::DerivedFrom => "DerivedFrom",
            EdgeLabel::AgeOff => "AgeOff",
        }
    }
}

impl fmt::Display for EdgeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EdgeLabel {
    type Err = ProvenanceError;

    fn from_str(s: &str) -> Result<Self> {
        EdgeLabel::ALL
            .into_iter()
            .find(|label| label.as_str() == s)
            .ok_or_else(|| ProvenanceError::Corruption(format!("unknown edge label '{s}'")))
    }
}

/// Traversal direction relative to a vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Edges whose target is the vertex.
    Incoming,
    /// Edges whose source is the vertex.
    Outgoing,
}

/// A stored vertex.
#[derive(Debug, Clone, PartialEq)]
pub struct Vertex {
    pub id: VertexId,
    pub kind: VertexKind,
    pub properties: Properties,
}

impl Vertex {
    pub fn new(id: VertexId, kind: VertexKind) -> Self {
        Self {
            id,
            kind,
            properties: Properties::new(),
        }
    }

    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }
}

/// A stored edge.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub id: EdgeId,
    pub label: EdgeLabel,
    pub source_id: VertexId,
    pub target_id: VertexId,
    pub properties: Properties,
}

impl Edge {
    pub fn new(id: EdgeId, label: EdgeLabel, source_id: VertexId, target_id: VertexId) -> Self {
        Self {
            id,
            label,
            source_id,
            target_id,
            properties: Properties::new(),
        }
    }

    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }
}
