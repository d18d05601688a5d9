//! Document creation, single and bulk.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};

use super::access;
use super::order::parent_first;
use super::ProvenanceGraph;
use crate::entity::{AgeOffMapping, AgeOffRule, Document, InheritanceInfo};
use crate::error::{ProvenanceError, Result};
use crate::identity::CallerIdentity;
use crate::ids::IdClass;
use crate::model::{VertexId, VertexKind};
use crate::storage::GraphTx;

const BULK_SAVEPOINT: &str = "bulk_entry";

/// One candidate document in a bulk call.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BulkDocument {
    pub uri: String,
    #[serde(default)]
    pub parents: Vec<InheritanceInfo>,
    #[serde(default)]
    pub age_off_rules: Vec<AgeOffMapping>,
}

impl BulkDocument {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            parents: Vec::new(),
            age_off_rules: Vec::new(),
        }
    }

    pub fn with_parent(mut self, parent: InheritanceInfo) -> Self {
        self.parents.push(parent);
        self
    }

    pub fn with_rule(mut self, mapping: AgeOffMapping) -> Self {
        self.age_off_rules.push(mapping);
        self
    }
}

/// Per-uri result code of a bulk call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BulkStatus {
    Success,
    AlreadyExists,
    ParentNotFound,
    CircularInheritanceNotAllowed,
    /// Validation passed but the batch could not be committed.
    UnknownError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkOutcome {
    pub status: BulkStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<i64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parents_not_found: Vec<String>,
}

impl BulkOutcome {
    fn status(status: BulkStatus) -> Self {
        Self {
            status,
            document_id: None,
            parents_not_found: Vec::new(),
        }
    }
}

impl ProvenanceGraph {
    /// Creates one document with its parents and explicit rules.
    ///
    /// Nothing is written unless every check passes.
    pub fn create_document(
        &self,
        identity: &CallerIdentity,
        uri: &str,
        parents: &[InheritanceInfo],
        age_off_rules: &[AgeOffMapping],
    ) -> Result<i64> {
        let document_id = self.ids.next_id(IdClass::Document)?;
        self.write("create_document", |tx| {
            if access::document_by_uri(tx, uri)?.is_some() {
                return Err(ProvenanceError::DocumentExists(uri.to_owned()));
            }
            let rules = resolve_rules(tx, age_off_rules)?;
            insert_document(tx, identity, uri, document_id, parents, &rules)
        })?;
        info!(uri, document_id, parents = parents.len(), "document created");
        Ok(document_id)
    }

    /// Creates a batch of documents that may name each other as parents.
    ///
    /// Entries sharing a uri are merged. Parents are always inserted before
    /// their children; entries on a cycle inside the batch are not inserted.
    /// Per-entry validation failures become result codes and leave nothing
    /// behind. An unknown rule id fails the whole call before anything is
    /// written.
    pub fn bulk_create(
        &self,
        identity: &CallerIdentity,
        documents: Vec<BulkDocument>,
        shared_age_off_rules: &[AgeOffMapping],
    ) -> Result<BTreeMap<String, BulkOutcome>> {
        let limit = self.bulk_max_size();
        if documents.len() > limit {
            return Err(ProvenanceError::ExceedsMaxBatchSize {
                size: documents.len(),
                limit,
            });
        }

        let batch = merge_entries(documents);
        let parents_by_uri: BTreeMap<String, BTreeSet<String>> = batch
            .iter()
            .map(|(uri, entry)| {
                let parents = entry.parents.iter().map(|p| p.parent_uri.clone()).collect();
                (uri.clone(), parents)
            })
            .collect();
        let order = parent_first(&parents_by_uri);
        let ids = match order.ordered.len() {
            0 => None,
            n => Some(self.ids.next_n_ids(IdClass::Document, n)?),
        };

        let mut tx = self.store.begin()?;
        let outcome = self.insert_batch(
            tx.as_mut(),
            identity,
            &batch,
            &order.ordered,
            ids,
            shared_age_off_rules,
        );
        let mut results = match outcome {
            Ok(results) => results,
            Err(err) => {
                warn!(error = %err, "bulk create failed; rolling back");
                if let Err(rollback) = tx.rollback() {
                    error!(error = %rollback, "rollback failed");
                }
                return Err(err);
            }
        };
        for uri in order.cyclic {
            results.insert(uri, BulkOutcome::status(BulkStatus::CircularInheritanceNotAllowed));
        }

        if let Err(err) = tx.commit() {
            error!(error = %err, "bulk commit failed; reporting successes as unknown errors");
            for result in results.values_mut() {
                if result.status == BulkStatus::Success {
                    result.status = BulkStatus::UnknownError;
                }
            }
        }
        info!(
            requested = batch.len(),
            created = results.values().filter(|r| r.status == BulkStatus::Success).count(),
            "bulk create finished"
        );
        Ok(results)
    }

    fn insert_batch(
        &self,
        tx: &mut dyn GraphTx,
        identity: &CallerIdentity,
        batch: &BTreeMap<String, BulkDocument>,
        ordered: &[String],
        ids: Option<RangeInclusive<i64>>,
        shared: &[AgeOffMapping],
    ) -> Result<BTreeMap<String, BulkOutcome>> {
        let shared = resolve_rules(tx, shared)?;
        let mut per_entry = BTreeMap::new();
        for uri in ordered {
            if let Some(entry) = batch.get(uri) {
                per_entry.insert(uri.as_str(), resolve_rules(tx, &entry.age_off_rules)?);
            }
        }

        let mut results = BTreeMap::new();
        for (uri, document_id) in ordered.iter().zip(ids.into_iter().flatten()) {
            let Some(entry) = batch.get(uri) else { continue };
            let mut rules = shared.clone();
            if let Some(own) = per_entry.remove(uri.as_str()) {
                for rule in own {
                    if !rules.iter().any(|(r, _)| r.rule_id == rule.0.rule_id) {
                        rules.push(rule);
                    }
                }
            }

            tx.savepoint(BULK_SAVEPOINT)?;
            let inserted = match access::document_by_uri(tx, uri)? {
                Some(_) => Err(ProvenanceError::DocumentExists(uri.clone())),
                None => insert_document(tx, identity, uri, document_id, &entry.parents, &rules),
            };
            let outcome = match inserted {
                Ok(_) => {
                    tx.release_savepoint(BULK_SAVEPOINT)?;
                    results.insert(
                        uri.clone(),
                        BulkOutcome {
                            document_id: Some(document_id),
                            ..BulkOutcome::status(BulkStatus::Success)
                        },
                    );
                    continue;
                }
                Err(ProvenanceError::DocumentExists(_)) => BulkOutcome::status(BulkStatus::AlreadyExists),
                Err(ProvenanceError::ParentNotFound(parents)) => BulkOutcome {
                    parents_not_found: parents,
                    ..BulkOutcome::status(BulkStatus::ParentNotFound)
                },
                Err(ProvenanceError::CircularInheritanceNotAllowed(_)) => {
                    BulkOutcome::status(BulkStatus::CircularInheritanceNotAllowed)
                }
                Err(other) => return Err(other),
            };
            tx.rollback_to_savepoint(BULK_SAVEPOINT)?;
            debug!(uri = %uri, status = ?outcome.status, "bulk entry rejected");
            results.insert(uri.clone(), outcome);
        }
        Ok(results)
    }
}

fn merge_entries(documents: Vec<BulkDocument>) -> BTreeMap<String, BulkDocument> {
    let mut batch: BTreeMap<String, BulkDocument> = BTreeMap::new();
    for document in documents {
        match batch.get_mut(&document.uri) {
            Some(existing) => {
                for parent in document.parents {
                    if !existing.parents.iter().any(|p| p.parent_uri == parent.parent_uri) {
                        existing.parents.push(parent);
                    }
                }
                existing.age_off_rules.extend(document.age_off_rules);
            }
            None => {
                batch.insert(document.uri.clone(), document);
            }
        }
    }
    batch
}

/// Looks up every rule named by `mappings`; repeated rule ids keep their first mapping.
pub(crate) fn resolve_rules(
    tx: &mut dyn GraphTx,
    mappings: &[AgeOffMapping],
) -> Result<Vec<(AgeOffRule, OffsetDateTime)>> {
    let mut seen = HashSet::new();
    let mut rules = Vec::with_capacity(mappings.len());
    for mapping in mappings {
        if !seen.insert(mapping.rule_id) {
            warn!(rule_id = mapping.rule_id, "ignoring repeated age-off rule");
            continue;
        }
        rules.push((access::require_rule(tx, mapping.rule_id)?, mapping.relevant_date));
    }
    Ok(rules)
}

/// Writes a document whose uri is known to be free.
///
/// Parent checks run before the vertex is created, so an error leaves only
/// what the caller's transaction or savepoint rolls back.
fn insert_document(
    tx: &mut dyn GraphTx,
    identity: &CallerIdentity,
    uri: &str,
    document_id: i64,
    parents: &[InheritanceInfo],
    rules: &[(AgeOffRule, OffsetDateTime)],
) -> Result<VertexId> {
    let mut seen = HashSet::new();
    let mut accepted = Vec::with_capacity(parents.len());
    let mut missing = Vec::new();
    for info in parents {
        if info.parent_uri.is_empty() {
            warn!(uri, "ignoring parent with empty uri");
            continue;
        }
        if info.parent_uri == uri {
            return Err(ProvenanceError::CircularInheritanceNotAllowed(uri.to_owned()));
        }
        if !seen.insert(info.parent_uri.as_str()) {
            warn!(uri, parent = %info.parent_uri, "ignoring duplicate parent");
            continue;
        }
        match access::document_by_uri(tx, &info.parent_uri)? {
            Some(parent) => accepted.push((info.clone(), parent)),
            None => missing.push(info.parent_uri.clone()),
        }
    }
    if !missing.is_empty() {
        return Err(ProvenanceError::ParentNotFound(missing));
    }

    let vertex = tx.add_vertex(
        VertexKind::Document,
        Document::new_properties(uri, document_id, identity),
    )?;
    for (info, parent) in &accepted {
        link_parent(tx, identity, vertex, parent, info)?;
    }
    let list: Vec<InheritanceInfo> = accepted.into_iter().map(|(info, _)| info).collect();
    access::store_inheritance(tx, vertex, &list)?;
    for (rule, relevant_date) in rules {
        access::add_age_off_edge(tx, identity, rule.vertex_id, vertex, rule.rule_id, *relevant_date)?;
    }
    debug!(uri, document_id, vertex, "document vertex written");
    Ok(vertex)
}

/// Adds the DerivedFrom edge and, when the relationship inherits, copies the
/// parent's oldest date per rule onto the child.
///
/// Returns the rules copied, with the date each copy carries.
pub(crate) fn link_parent(
    tx: &mut dyn GraphTx,
    identity: &CallerIdentity,
    child: VertexId,
    parent: &Document,
    info: &InheritanceInfo,
) -> Result<BTreeMap<i64, OffsetDateTime>> {
    access::add_derived_from(tx, identity, parent.vertex_id, child)?;
    if !info.inherit_parent_age_off {
        return Ok(BTreeMap::new());
    }
    let mut copied = access::oldest_dates_by_rule(tx, parent.vertex_id)?;
    for (rule_id, date) in copied.iter_mut() {
        if let Some(relevant) = info.age_off_relevant_date {
            *date = relevant;
        }
        access::add_age_off_edge(tx, identity, parent.vertex_id, child, *rule_id, *date)?;
    }
    Ok(copied)
}
