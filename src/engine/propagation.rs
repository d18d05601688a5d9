//! Explicit and inherited age-off edges, and keeping descendants in sync.
//!
//! For every (document, rule) the effective relevant date is the oldest date
//! over the AgeOff edges reaching that document for the rule. A child that
//! inherits and tracks a parent carries one inherited edge per rule the
//! parent has, dated with the child's override date or else the parent's
//! effective date. Whenever a document's effective date for a rule changes,
//! [`reexamine`] walks its tracking descendants and restores that shape.

use std::collections::{BTreeMap, VecDeque};

use rustc_hash::FxHashSet;
use time::OffsetDateTime;
use tracing::{debug, info};

use super::lineage::link_parent;
use super::query::reachable;
use super::{access, DocumentRef, ProvenanceGraph};
use crate::entity::{keys, AgeOffMapping, Document, InheritanceInfo};
use crate::entity::to_millis;
use crate::error::{ProvenanceError, Result};
use crate::identity::CallerIdentity;
use crate::model::{Direction, VertexId};
use crate::storage::GraphTx;

impl ProvenanceGraph {
    /// Applies a rule directly to a document.
    pub fn attach_explicit_rule(
        &self,
        identity: &CallerIdentity,
        document: &DocumentRef,
        mapping: AgeOffMapping,
    ) -> Result<()> {
        self.write("attach_explicit_rule", |tx| {
            let doc = unaged_document(tx, document)?;
            let rule = access::require_rule(tx, mapping.rule_id)?;
            let edges = access::incoming_age_off(tx, doc.vertex_id)?;
            if edges.iter().any(|edge| edge.source_id == rule.vertex_id) {
                return Err(ProvenanceError::AgeOffAlreadyApplied {
                    uri: doc.uri,
                    rule_id: rule.rule_id,
                });
            }
            let before = edges
                .iter()
                .filter(|edge| edge.rule_id == rule.rule_id)
                .map(|edge| edge.relevant_date)
                .min();
            access::add_age_off_edge(
                tx,
                identity,
                rule.vertex_id,
                doc.vertex_id,
                rule.rule_id,
                mapping.relevant_date,
            )?;
            if before.map_or(true, |oldest| mapping.relevant_date < oldest) {
                reexamine(tx, identity, doc.vertex_id, rule.rule_id)?;
            }
            info!(uri = %doc.uri, rule_id = rule.rule_id, "age-off rule attached");
            Ok(())
        })
    }

    /// Removes the explicit edge for `rule_id`. Removing a rule that was never
    /// applied is a no-op.
    pub fn detach_explicit_rule(
        &self,
        identity: &CallerIdentity,
        document: &DocumentRef,
        rule_id: i64,
    ) -> Result<()> {
        self.write("detach_explicit_rule", |tx| {
            let doc = unaged_document(tx, document)?;
            let rule = access::require_rule(tx, rule_id)?;
            let before = access::oldest_date(tx, doc.vertex_id, rule_id)?;
            let explicit: Vec<_> = access::incoming_age_off(tx, doc.vertex_id)?
                .into_iter()
                .filter(|edge| edge.source_id == rule.vertex_id)
                .collect();
            if explicit.is_empty() {
                debug!(uri = %doc.uri, rule_id, "rule not applied; nothing to detach");
                return Ok(());
            }
            for edge in &explicit {
                tx.remove_edge(edge.edge_id)?;
            }
            if access::oldest_date(tx, doc.vertex_id, rule_id)? != before {
                reexamine(tx, identity, doc.vertex_id, rule_id)?;
            }
            info!(uri = %doc.uri, rule_id, "age-off rule detached");
            Ok(())
        })
    }

    /// Drops every rule inherited from `parent_uri` and stops tracking it.
    ///
    /// The lineage edge stays. Detaching from a document that is not a parent
    /// is a no-op.
    pub fn detach_inherited_rule(
        &self,
        identity: &CallerIdentity,
        document: &DocumentRef,
        parent_uri: &str,
    ) -> Result<()> {
        self.write("detach_inherited_rule", |tx| {
            let mut doc = unaged_document(tx, document)?;
            let parent = access::document_by_uri(tx, parent_uri)?
                .ok_or_else(|| ProvenanceError::DocumentNotFound(parent_uri.to_owned()))?;
            let Some(position) = doc
                .inheritance
                .iter()
                .position(|info| info.parent_uri == parent_uri)
            else {
                debug!(uri = %doc.uri, parent = parent_uri, "not a parent; nothing to detach");
                return Ok(());
            };

            let before = access::oldest_dates_by_rule(tx, doc.vertex_id)?;
            for edge in access::incoming_age_off(tx, doc.vertex_id)? {
                if edge.source_id == parent.vertex_id {
                    tx.remove_edge(edge.edge_id)?;
                }
            }
            let entry = &mut doc.inheritance[position];
            entry.inherit_parent_age_off = false;
            entry.track_parent_age_off = false;
            access::store_inheritance(tx, doc.vertex_id, &doc.inheritance)?;

            let after = access::oldest_dates_by_rule(tx, doc.vertex_id)?;
            for rule_id in changed_rules(&before, &after) {
                reexamine(tx, identity, doc.vertex_id, rule_id)?;
            }
            info!(uri = %doc.uri, parent = parent_uri, "inherited age-off detached");
            Ok(())
        })
    }

    /// Adds a parent to an existing document.
    pub fn add_inheritance_relationship(
        &self,
        identity: &CallerIdentity,
        document: &DocumentRef,
        info: InheritanceInfo,
    ) -> Result<()> {
        self.write("add_inheritance_relationship", |tx| {
            let mut doc = unaged_document(tx, document)?;
            let parent = access::document_by_uri(tx, &info.parent_uri)?
                .ok_or_else(|| ProvenanceError::DocumentNotFound(info.parent_uri.clone()))?;
            if doc.inheritance_from(&info.parent_uri).is_some() {
                return Err(ProvenanceError::AgeOffInheritanceExists {
                    uri: doc.uri,
                    parent_uri: info.parent_uri,
                });
            }
            if reachable(tx, &[doc.vertex_id], Direction::Outgoing)?.contains(&parent.vertex_id) {
                return Err(ProvenanceError::CircularInheritanceNotAllowed(format!(
                    "{} is derived from {}",
                    info.parent_uri, doc.uri
                )));
            }

            let before = access::oldest_dates_by_rule(tx, doc.vertex_id)?;
            link_parent(tx, identity, doc.vertex_id, &parent, &info)?;
            doc.inheritance.push(info);
            access::store_inheritance(tx, doc.vertex_id, &doc.inheritance)?;

            let after = access::oldest_dates_by_rule(tx, doc.vertex_id)?;
            for rule_id in changed_rules(&before, &after) {
                reexamine(tx, identity, doc.vertex_id, rule_id)?;
            }
            info!(uri = %doc.uri, parent = %parent.uri, "inheritance added");
            Ok(())
        })
    }
}

fn unaged_document(tx: &mut dyn GraphTx, reference: &DocumentRef) -> Result<Document> {
    let doc = access::require_document(tx, reference)?;
    if doc.aged {
        return Err(ProvenanceError::AlreadyAged(doc.uri));
    }
    Ok(doc)
}

fn changed_rules(
    before: &BTreeMap<i64, OffsetDateTime>,
    after: &BTreeMap<i64, OffsetDateTime>,
) -> Vec<i64> {
    let mut rules: Vec<i64> = before.keys().chain(after.keys()).copied().collect();
    rules.sort_unstable();
    rules.dedup();
    rules.retain(|rule| before.get(rule) != after.get(rule));
    rules
}

/// Brings the tracking descendants of `start` in line with its effective
/// date for `rule_id`.
///
/// Works over vertex ids and reads every edge fresh from the transaction. A
/// child is queued only when its own effective date changed.
pub(crate) fn reexamine(
    tx: &mut dyn GraphTx,
    identity: &CallerIdentity,
    start: VertexId,
    rule_id: i64,
) -> Result<()> {
    let mut worklist = VecDeque::from([start]);
    let mut queued = FxHashSet::default();
    queued.insert(start);
    let mut visits = 0usize;

    while let Some(current) = worklist.pop_front() {
        queued.remove(&current);
        visits += 1;
        let current_doc = access::document(tx, current)?;
        let oldest = access::oldest_date(tx, current, rule_id)?;

        for child in access::children(tx, current)? {
            let child_doc = access::document(tx, child)?;
            if child_doc.aged {
                continue;
            }
            let Some(info) = child_doc.inheritance_from(&current_doc.uri) else {
                continue;
            };
            if !(info.inherit_parent_age_off && info.track_parent_age_off) {
                continue;
            }

            let child_before = access::oldest_date(tx, child, rule_id)?;
            let target = oldest.map(|date| info.age_off_relevant_date.unwrap_or(date));
            sync_inherited_edge(tx, identity, current, child, rule_id, target)?;
            if access::oldest_date(tx, child, rule_id)? != child_before && queued.insert(child) {
                worklist.push_back(child);
            }
        }
    }
    debug!(start, rule_id, visits, "re-examined descendants");
    Ok(())
}

/// Leaves exactly one inherited edge from `parent` to `child` for `rule_id`
/// dated `target`, or none when `target` is `None`.
fn sync_inherited_edge(
    tx: &mut dyn GraphTx,
    identity: &CallerIdentity,
    parent: VertexId,
    child: VertexId,
    rule_id: i64,
    target: Option<OffsetDateTime>,
) -> Result<()> {
    let mut existing = access::incoming_age_off(tx, child)?
        .into_iter()
        .filter(|edge| edge.source_id == parent && edge.rule_id == rule_id);
    match target {
        Some(date) => match existing.next() {
            Some(edge) => {
                if edge.relevant_date != date {
                    tx.set_edge_property(
                        edge.edge_id,
                        keys::AGE_OFF_RELEVANT_DATE_TIME,
                        to_millis(date).into(),
                    )?;
                }
                for extra in existing {
                    tx.remove_edge(extra.edge_id)?;
                }
            }
            None => {
                access::add_age_off_edge(tx, identity, parent, child, rule_id, date)?;
            }
        },
        None => {
            for edge in existing {
                tx.remove_edge(edge.edge_id)?;
            }
        }
    }
    Ok(())
}
