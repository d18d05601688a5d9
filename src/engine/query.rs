//! Lineage traversal, expiry scan and document lookups.

use std::collections::{BTreeMap, BTreeSet};

use rustc_hash::FxHashSet;
use serde::Serialize;
use time::OffsetDateTime;
use tracing::info;

use super::{access, DocumentRef, ProvenanceGraph};
use crate::entity::{keys, AgeOffEdge, Document};
use crate::error::Result;
use crate::ids::IdClass;
use crate::model::{Direction, EdgeLabel, Properties, VertexId, VertexKind};
use crate::storage::GraphTx;

/// Ancestors or descendants of a set of uris.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DerivedResult {
    /// Every document reached, including the requested ones.
    pub document_ids: BTreeSet<i64>,
    pub uris_not_found: Vec<String>,
    /// Document ids of the direct children, set only for a single-uri request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub immediate_children: Option<Vec<i64>>,
}

/// Documents eligible for deletion under a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgeOffInitiation {
    pub event_id: i64,
    pub document_ids: BTreeSet<i64>,
}

/// One AgeOff edge on a document, as reported by [`ProvenanceGraph::document_info`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgeOffInfo {
    pub rule_id: i64,
    pub rule_name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub relevant_date: OffsetDateTime,
    pub maximum_execution_period: u32,
    pub inherited: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inherited_from_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inherited_from_uri: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentInfo {
    #[serde(flatten)]
    pub document: Document,
    pub parents: Vec<i64>,
    pub children: Vec<i64>,
    pub age_offs: Vec<AgeOffInfo>,
}

/// Id and uri translation in either direction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConversionResult {
    pub ids_by_uri: BTreeMap<String, i64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ids_not_found: Vec<i64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub uris_not_found: Vec<String>,
}

/// Every vertex reachable from `starts` along DerivedFrom edges, starts included.
pub(crate) fn reachable(
    tx: &mut dyn GraphTx,
    starts: &[VertexId],
    direction: Direction,
) -> Result<FxHashSet<VertexId>> {
    let mut visited: FxHashSet<VertexId> = starts.iter().copied().collect();
    let mut stack: Vec<VertexId> = visited.iter().copied().collect();
    while let Some(vertex) = stack.pop() {
        for edge in tx.edges_of(vertex, direction, EdgeLabel::DerivedFrom)? {
            let next = match direction {
                Direction::Outgoing => edge.target_id,
                Direction::Incoming => edge.source_id,
            };
            if visited.insert(next) {
                stack.push(next);
            }
        }
    }
    Ok(visited)
}

pub(crate) fn document_ids(
    tx: &mut dyn GraphTx,
    vertices: impl IntoIterator<Item = VertexId>,
) -> Result<BTreeSet<i64>> {
    vertices
        .into_iter()
        .map(|vertex| access::document(tx, vertex).map(|doc| doc.document_id))
        .collect()
}

/// Resolves uris to vertices, keeping unknown uris in request order.
pub(crate) fn resolve_uris(
    tx: &mut dyn GraphTx,
    uris: &[String],
) -> Result<(Vec<Document>, Vec<String>)> {
    let mut found = Vec::with_capacity(uris.len());
    let mut missing = Vec::new();
    for uri in uris {
        match access::document_by_uri(tx, uri)? {
            Some(doc) => found.push(doc),
            None => missing.push(uri.clone()),
        }
    }
    Ok((found, missing))
}

impl ProvenanceGraph {
    pub fn ancestors_of(&self, uris: &[String]) -> Result<DerivedResult> {
        self.read("ancestors_of", |tx| derived(tx, uris, Direction::Incoming))
    }

    pub fn descendants_of(&self, uris: &[String]) -> Result<DerivedResult> {
        self.read("descendants_of", |tx| derived(tx, uris, Direction::Outgoing))
    }

    /// Finds the documents whose relevant date for `rule_id` is older than
    /// `as_of` (default now) minus the rule's duration, and allocates an
    /// event id for the run.
    pub fn compute_expired(
        &self,
        rule_id: i64,
        as_of: Option<OffsetDateTime>,
    ) -> Result<AgeOffInitiation> {
        let expired = self.read("compute_expired", |tx| {
            let rule = access::require_rule(tx, rule_id)?;
            // A cutoff before the earliest representable date expires nothing.
            let Some(cutoff) = as_of
                .unwrap_or_else(OffsetDateTime::now_utc)
                .checked_sub(rule.duration)
            else {
                return Ok(BTreeSet::new());
            };

            let mut targets = FxHashSet::default();
            for edge in tx.find_edges(EdgeLabel::AgeOff, keys::RULE_ID, &rule_id.into())? {
                let edge = AgeOffEdge::from_edge(&edge)?;
                if edge.relevant_date < cutoff {
                    targets.insert(edge.target_id);
                }
            }
            document_ids(tx, targets)
        })?;

        let event_id = self.ids.next_id(IdClass::PurgeEvent)?;
        self.write("record_age_off_event", |tx| {
            match access::age_off_event(tx)? {
                Some(event) if event.event_max_id < event_id => {
                    tx.set_vertex_property(event.vertex_id, keys::EVENT_MAX_ID, event_id.into())?;
                }
                Some(_) => {}
                None => {
                    let mut props = Properties::new();
                    props.insert(keys::EVENT_MAX_ID.into(), event_id.into());
                    tx.add_vertex(VertexKind::AgeOffEvent, props)?;
                }
            }
            Ok(())
        })?;
        let initiation = AgeOffInitiation {
            event_id,
            document_ids: expired,
        };
        info!(
            rule_id,
            event_id = initiation.event_id,
            expired = initiation.document_ids.len(),
            "age-off computed"
        );
        Ok(initiation)
    }

    /// A document with its lineage neighbours and retention edges.
    pub fn document_info(&self, document: &DocumentRef) -> Result<DocumentInfo> {
        self.read("document_info", |tx| {
            let doc = access::require_document(tx, document)?;
            let parents = access::parents(tx, doc.vertex_id)?;
            let children = access::children(tx, doc.vertex_id)?;
            let mut age_offs = Vec::new();
            for edge in access::incoming_age_off(tx, doc.vertex_id)? {
                let rule = access::require_rule(tx, edge.rule_id)?;
                let source = if edge.source_id == rule.vertex_id {
                    None
                } else {
                    Some(access::document(tx, edge.source_id)?)
                };
                age_offs.push(AgeOffInfo {
                    rule_id: rule.rule_id,
                    rule_name: rule.name,
                    relevant_date: edge.relevant_date,
                    maximum_execution_period: rule.maximum_execution_period,
                    inherited: source.is_some(),
                    inherited_from_id: source.as_ref().map(|s| s.document_id),
                    inherited_from_uri: source.map(|s| s.uri),
                });
            }
            Ok(DocumentInfo {
                parents: document_ids(tx, parents)?.into_iter().collect(),
                children: document_ids(tx, children)?.into_iter().collect(),
                document: doc,
                age_offs,
            })
        })
    }

    /// The uri of the document with `document_id`.
    pub fn uri_for_id(&self, document_id: i64) -> Result<String> {
        self.read("uri_for_id", |tx| {
            access::require_document(tx, &DocumentRef::Id(document_id)).map(|doc| doc.uri)
        })
    }

    pub fn convert_ids(&self, document_ids: &[i64]) -> Result<ConversionResult> {
        self.read("convert_ids", |tx| {
            let mut result = ConversionResult::default();
            for &id in document_ids {
                match access::document_by_id(tx, id)? {
                    Some(doc) => {
                        result.ids_by_uri.insert(doc.uri, id);
                    }
                    None => result.ids_not_found.push(id),
                }
            }
            Ok(result)
        })
    }

    pub fn convert_uris(&self, uris: &[String]) -> Result<ConversionResult> {
        self.read("convert_uris", |tx| {
            let (found, uris_not_found) = resolve_uris(tx, uris)?;
            Ok(ConversionResult {
                ids_by_uri: found.into_iter().map(|doc| (doc.uri, doc.document_id)).collect(),
                ids_not_found: Vec::new(),
                uris_not_found,
            })
        })
    }
}

fn derived(tx: &mut dyn GraphTx, uris: &[String], direction: Direction) -> Result<DerivedResult> {
    let (found, uris_not_found) = resolve_uris(tx, uris)?;
    let starts: Vec<VertexId> = found.iter().map(|doc| doc.vertex_id).collect();
    let vertices = reachable(tx, &starts, direction)?;
    let immediate_children = match (uris.len(), starts.first()) {
        (1, Some(&only)) => {
            let children = access::children(tx, only)?;
            Some(document_ids(tx, children)?.into_iter().collect())
        }
        (1, None) => Some(Vec::new()),
        _ => None,
    };
    Ok(DerivedResult {
        document_ids: document_ids(tx, vertices)?,
        uris_not_found,
        immediate_children,
    })
}
