use std::num::NonZeroUsize;

use lru::LruCache;
use tracing::{debug, info};

use crate::entity::keys;
use crate::error::Result;
use crate::model::{EdgeLabel, PropertyValue, VertexKind};
use crate::storage::{DataType, GraphStore, GraphTx, IndexDef, IndexKind, KeyOwner};

use DataType::{Bool, Int, List, String as Str};
use IndexKind::{None as Plain, Standard, Unique};
use KeyOwner::{Edge, Vertex};

const KNOWN_CAPACITY: usize = 256;

struct KeySpec {
    name: &'static str,
    owner: KeyOwner,
    data_type: DataType,
    index: IndexKind,
    /// Primary key and vertex kind this search key mirrors.
    shadow_of: Option<(&'static str, VertexKind)>,
}

const fn key(name: &'static str, owner: KeyOwner, data_type: DataType, index: IndexKind) -> KeySpec {
    KeySpec {
        name,
        owner,
        data_type,
        index,
        shadow_of: None,
    }
}

const fn shadow(name: &'static str, primary: &'static str, kind: VertexKind) -> KeySpec {
    KeySpec {
        name,
        owner: KeyOwner::Vertex,
        data_type: DataType::Int,
        index: IndexKind::Search,
        shadow_of: Some((primary, kind)),
    }
}

// Primary keys come before their shadows so a backfill can read them.
const KEYS: &[KeySpec] = &[
    key(keys::APPLICATION, Vertex, Str, Plain),
    key(keys::USER, Vertex, Str, Plain),
    key(keys::TIMESTAMP, Vertex, Int, Plain),
    key(keys::URI, Vertex, Str, Unique),
    key(keys::DOCUMENT_ID, Vertex, Int, Unique),
    shadow(keys::DOCUMENT_ID_SEARCH, keys::DOCUMENT_ID, VertexKind::Document),
    key(keys::AGED, Vertex, Bool, Standard),
    key(keys::INHERITANCE_INFO_LIST, Vertex, List, Plain),
    key(keys::RULE_ID, Vertex, Int, Unique),
    shadow(keys::RULE_ID_SEARCH, keys::RULE_ID, VertexKind::AgeOffRule),
    key(keys::NAME, Vertex, Str, Unique),
    key(keys::DURATION, Vertex, Int, Plain),
    key(keys::MAXIMUM_EXECUTION_PERIOD, Vertex, Int, Plain),
    key(keys::PURGE_ID, Vertex, Int, Unique),
    shadow(keys::PURGE_ID_SEARCH, keys::PURGE_ID, VertexKind::PurgeEvent),
    key(keys::DESCRIPTION, Vertex, Str, Plain),
    key(keys::DOCUMENT_URIS, Vertex, List, Plain),
    key(keys::DOCUMENT_URIS_NOT_FOUND, Vertex, List, Plain),
    key(keys::PURGE_DOCUMENT_IDS, Vertex, List, Plain),
    key(keys::COMPLETELY_PURGED_DOCUMENT_IDS, Vertex, List, Plain),
    key(keys::RESOLVED, Vertex, Bool, Plain),
    key(keys::EVENT_MAX_ID, Vertex, Int, Plain),
    key(keys::RULE_ID, Edge, Int, Standard),
    key(keys::AGE_OFF_RELEVANT_DATE_TIME, Edge, Int, Plain),
    key(keys::APPLICATION, Edge, Str, Plain),
    key(keys::USER, Edge, Str, Plain),
    key(keys::TIMESTAMP, Edge, Int, Plain),
];

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Known {
    Key(&'static str, KeyOwner),
    Label(EdgeLabel),
}

/// Outcome of one schema pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchemaReport {
    /// Keys and labels created by this pass.
    pub declared: usize,
    /// Vertices whose search shadow was filled from the primary key.
    pub backfilled: usize,
}

/// Declares the engine's property keys and edge labels.
///
/// Keeps an LRU cache of declarations already seen in storage. A cached entry
/// skips the storage lookup; a missing or evicted entry only costs a lookup,
/// because re-declaring an existing key is a no-op. Entries are cached only
/// after the pass commits.
pub struct SchemaManager {
    known: LruCache<Known, ()>,
}

impl Default for SchemaManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaManager {
    pub fn new() -> Self {
        Self::with_capacity(KNOWN_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            known: LruCache::new(capacity),
        }
    }

    /// Runs one schema pass in a single transaction.
    pub fn ensure(&mut self, store: &dyn GraphStore) -> Result<SchemaReport> {
        let mut tx = store.begin()?;
        let mut report = SchemaReport::default();
        let mut seen = Vec::new();
        if let Err(err) = self.declare_all(tx.as_mut(), &mut report, &mut seen) {
            tx.rollback()?;
            return Err(err);
        }
        tx.commit()?;
        for entry in seen {
            self.known.put(entry, ());
        }
        if report.declared > 0 {
            info!(declared = report.declared, backfilled = report.backfilled, "schema updated");
        }
        Ok(report)
    }

    fn declare_all(
        &mut self,
        tx: &mut dyn GraphTx,
        report: &mut SchemaReport,
        seen: &mut Vec<Known>,
    ) -> Result<()> {
        let mut preexisting = Vec::new();
        for spec in KEYS {
            let entry = Known::Key(spec.name, spec.owner);
            if self.known.get(&entry).is_some() {
                preexisting.push(spec.name);
                continue;
            }
            if tx.property_key(spec.name, spec.owner)?.is_some() {
                preexisting.push(spec.name);
            } else {
                tx.declare_property(&IndexDef::new(spec.name, spec.owner, spec.data_type, spec.index))?;
                report.declared += 1;
                if let Some((primary, kind)) = spec.shadow_of {
                    if preexisting.contains(&primary) {
                        report.backfilled += backfill(tx, spec.name, primary, kind)?;
                    }
                }
            }
            seen.push(entry);
        }
        for label in EdgeLabel::ALL {
            let entry = Known::Label(label);
            if self.known.get(&entry).is_none() && !tx.edge_label_exists(label)? {
                tx.declare_edge_label(label)?;
                report.declared += 1;
            }
            seen.push(entry);
        }
        Ok(())
    }
}

fn backfill(tx: &mut dyn GraphTx, shadow: &str, primary: &str, kind: VertexKind) -> Result<usize> {
    let mut filled = 0;
    for id in tx.vertices_of_kind(kind)? {
        let Some(vertex) = tx.vertex(id)? else { continue };
        if let Some(value) = vertex.property(primary).and_then(PropertyValue::as_int) {
            tx.set_vertex_property(id, shadow, value.into())?;
            filled += 1;
        }
    }
    debug!(key = shadow, kind = %kind, filled, "backfilled search index");
    Ok(filled)
}
