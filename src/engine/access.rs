//! Typed reads and writes shared by the engine operations.

use std::collections::BTreeMap;

use time::OffsetDateTime;

use super::DocumentRef;
use crate::entity::{
    inheritance_value, keys, AgeOffEdge, AgeOffEventRecord, AgeOffRule, Document, Entity,
    InheritanceInfo, PurgeEvent,
};
use crate::error::{ProvenanceError, Result};
use crate::identity::CallerIdentity;
use crate::model::{Direction, EdgeId, EdgeLabel, Properties, PropertyValue, VertexId, VertexKind};
use crate::storage::GraphTx;

fn load(tx: &mut dyn GraphTx, id: VertexId) -> Result<Entity> {
    let vertex = tx
        .vertex(id)?
        .ok_or_else(|| ProvenanceError::Corruption(format!("vertex {id} vanished")))?;
    Entity::decode(&vertex)
}

fn find_one(
    tx: &mut dyn GraphTx,
    kind: VertexKind,
    key: &str,
    value: PropertyValue,
) -> Result<Option<Entity>> {
    match tx.find_vertices(kind, key, &value)?.first() {
        Some(&id) => load(tx, id).map(Some),
        None => Ok(None),
    }
}

pub(crate) fn document(tx: &mut dyn GraphTx, vertex: VertexId) -> Result<Document> {
    load(tx, vertex)?.into_document()
}

pub(crate) fn document_by_uri(tx: &mut dyn GraphTx, uri: &str) -> Result<Option<Document>> {
    find_one(tx, VertexKind::Document, keys::URI, uri.into())?
        .map(Entity::into_document)
        .transpose()
}

pub(crate) fn document_by_id(tx: &mut dyn GraphTx, document_id: i64) -> Result<Option<Document>> {
    find_one(tx, VertexKind::Document, keys::DOCUMENT_ID, document_id.into())?
        .map(Entity::into_document)
        .transpose()
}

pub(crate) fn require_document(tx: &mut dyn GraphTx, reference: &DocumentRef) -> Result<Document> {
    let found = match reference {
        DocumentRef::Id(id) => document_by_id(tx, *id)?,
        DocumentRef::Uri(uri) => document_by_uri(tx, uri)?,
    };
    found.ok_or_else(|| ProvenanceError::DocumentNotFound(reference.to_string()))
}

pub(crate) fn rule_by_id(tx: &mut dyn GraphTx, rule_id: i64) -> Result<Option<AgeOffRule>> {
    find_one(tx, VertexKind::AgeOffRule, keys::RULE_ID, rule_id.into())?
        .map(Entity::into_rule)
        .transpose()
}

pub(crate) fn rule_by_name(tx: &mut dyn GraphTx, name: &str) -> Result<Option<AgeOffRule>> {
    find_one(tx, VertexKind::AgeOffRule, keys::NAME, name.into())?
        .map(Entity::into_rule)
        .transpose()
}

pub(crate) fn require_rule(tx: &mut dyn GraphTx, rule_id: i64) -> Result<AgeOffRule> {
    rule_by_id(tx, rule_id)?.ok_or_else(|| ProvenanceError::AgeOffRuleNotFound(rule_id.to_string()))
}

pub(crate) fn all_rules(tx: &mut dyn GraphTx) -> Result<Vec<AgeOffRule>> {
    tx.vertices_of_kind(VertexKind::AgeOffRule)?
        .into_iter()
        .map(|id| load(tx, id)?.into_rule())
        .collect()
}

pub(crate) fn purge_by_id(tx: &mut dyn GraphTx, purge_id: i64) -> Result<Option<PurgeEvent>> {
    find_one(tx, VertexKind::PurgeEvent, keys::PURGE_ID, purge_id.into())?
        .map(Entity::into_purge)
        .transpose()
}

pub(crate) fn purge_by_name(tx: &mut dyn GraphTx, name: &str) -> Result<Option<PurgeEvent>> {
    find_one(tx, VertexKind::PurgeEvent, keys::NAME, name.into())?
        .map(Entity::into_purge)
        .transpose()
}

pub(crate) fn age_off_event(tx: &mut dyn GraphTx) -> Result<Option<AgeOffEventRecord>> {
    match tx.vertices_of_kind(VertexKind::AgeOffEvent)?.first() {
        Some(&id) => load(tx, id)?.into_event().map(Some),
        None => Ok(None),
    }
}

pub(crate) fn incoming_age_off(tx: &mut dyn GraphTx, vertex: VertexId) -> Result<Vec<AgeOffEdge>> {
    tx.edges_of(vertex, Direction::Incoming, EdgeLabel::AgeOff)?
        .iter()
        .map(AgeOffEdge::from_edge)
        .collect()
}

/// Oldest relevant date over every AgeOff edge for `rule_id` reaching `vertex`.
pub(crate) fn oldest_date(
    tx: &mut dyn GraphTx,
    vertex: VertexId,
    rule_id: i64,
) -> Result<Option<OffsetDateTime>> {
    Ok(incoming_age_off(tx, vertex)?
        .into_iter()
        .filter(|edge| edge.rule_id == rule_id)
        .map(|edge| edge.relevant_date)
        .min())
}

pub(crate) fn oldest_dates_by_rule(
    tx: &mut dyn GraphTx,
    vertex: VertexId,
) -> Result<BTreeMap<i64, OffsetDateTime>> {
    let mut oldest = BTreeMap::new();
    for edge in incoming_age_off(tx, vertex)? {
        oldest
            .entry(edge.rule_id)
            .and_modify(|date: &mut OffsetDateTime| *date = (*date).min(edge.relevant_date))
            .or_insert(edge.relevant_date);
    }
    Ok(oldest)
}

pub(crate) fn children(tx: &mut dyn GraphTx, vertex: VertexId) -> Result<Vec<VertexId>> {
    Ok(tx
        .edges_of(vertex, Direction::Outgoing, EdgeLabel::DerivedFrom)?
        .into_iter()
        .map(|edge| edge.target_id)
        .collect())
}

pub(crate) fn parents(tx: &mut dyn GraphTx, vertex: VertexId) -> Result<Vec<VertexId>> {
    Ok(tx
        .edges_of(vertex, Direction::Incoming, EdgeLabel::DerivedFrom)?
        .into_iter()
        .map(|edge| edge.source_id)
        .collect())
}

pub(crate) fn store_inheritance(
    tx: &mut dyn GraphTx,
    vertex: VertexId,
    list: &[InheritanceInfo],
) -> Result<()> {
    tx.set_vertex_property(vertex, keys::INHERITANCE_INFO_LIST, inheritance_value(list))
}

pub(crate) fn add_age_off_edge(
    tx: &mut dyn GraphTx,
    identity: &CallerIdentity,
    source: VertexId,
    target: VertexId,
    rule_id: i64,
    relevant_date: OffsetDateTime,
) -> Result<EdgeId> {
    tx.add_edge(
        EdgeLabel::AgeOff,
        source,
        target,
        AgeOffEdge::new_properties(rule_id, relevant_date, identity),
    )
}

pub(crate) fn add_derived_from(
    tx: &mut dyn GraphTx,
    identity: &CallerIdentity,
    parent: VertexId,
    child: VertexId,
) -> Result<EdgeId> {
    let mut props = Properties::new();
    identity.stamp(&mut props);
    tx.add_edge(EdgeLabel::DerivedFrom, parent, child, props)
}
