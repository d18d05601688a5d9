//! Purge campaigns and terminal aging.

use std::collections::BTreeSet;

use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use tracing::{info, warn};

use super::query::{document_ids, reachable, resolve_uris};
use super::{access, ProvenanceGraph};
use crate::entity::{id_list, keys, PurgeEvent};
use crate::error::{ProvenanceError, Result};
use crate::identity::CallerIdentity;
use crate::ids::IdClass;
use crate::model::{Direction, EdgeLabel, VertexId, VertexKind};
use crate::storage::SearchRange;

/// Result of [`ProvenanceGraph::mark_for_purge`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurgeInitiation {
    pub purge_id: i64,
    /// The requested documents and all of their descendants.
    pub document_ids: BTreeSet<i64>,
    pub uris_not_found: Vec<String>,
}

impl ProvenanceGraph {
    /// Opens a purge campaign over `uris` and everything derived from them.
    pub fn mark_for_purge(
        &self,
        identity: &CallerIdentity,
        uris: &[String],
        name: &str,
        description: &str,
    ) -> Result<PurgeInitiation> {
        let purge_id = self.ids.next_id(IdClass::PurgeEvent)?;
        let initiation = self.write("mark_for_purge", |tx| {
            if access::purge_by_name(tx, name)?.is_some() {
                return Err(ProvenanceError::PurgeNameExists(name.to_owned()));
            }
            let (found, uris_not_found) = resolve_uris(tx, uris)?;
            let starts: Vec<VertexId> = found.iter().map(|doc| doc.vertex_id).collect();
            let closure = reachable(tx, &starts, Direction::Outgoing)?;
            let document_ids = document_ids(tx, closure)?;

            let event = PurgeEvent {
                vertex_id: 0,
                purge_id,
                name: name.to_owned(),
                description: description.to_owned(),
                document_uris: uris.to_vec(),
                document_uris_not_found: uris_not_found.clone(),
                purge_document_ids: document_ids.clone(),
                completely_purged_document_ids: BTreeSet::new(),
                resolved: false,
                created: identity.clone(),
            };
            tx.add_vertex(VertexKind::PurgeEvent, event.to_properties())?;
            Ok(PurgeInitiation {
                purge_id,
                document_ids,
                uris_not_found,
            })
        })?;
        info!(
            purge_id = initiation.purge_id,
            name,
            documents = initiation.document_ids.len(),
            "purge started"
        );
        Ok(initiation)
    }

    /// Records documents confirmed deleted under a purge.
    ///
    /// Every id must belong to the purge's target set; otherwise nothing
    /// changes. A non-empty `note` is appended to the description with the
    /// caller's stamp.
    pub fn record_completion(
        &self,
        identity: &CallerIdentity,
        purge_id: i64,
        newly_purged: &BTreeSet<i64>,
        note: Option<&str>,
        resolved: bool,
    ) -> Result<PurgeEvent> {
        self.write("record_completion", |tx| {
            let mut purge = access::purge_by_id(tx, purge_id)?
                .ok_or(ProvenanceError::PurgeNotFound(purge_id))?;
            let outside: Vec<i64> = newly_purged
                .difference(&purge.purge_document_ids)
                .copied()
                .collect();
            if !outside.is_empty() {
                return Err(ProvenanceError::DocumentNotInPurge {
                    purge_id,
                    ids: outside,
                });
            }

            purge
                .completely_purged_document_ids
                .extend(newly_purged.iter().copied());
            tx.set_vertex_property(
                purge.vertex_id,
                keys::COMPLETELY_PURGED_DOCUMENT_IDS,
                id_list(&purge.completely_purged_document_ids),
            )?;

            if let Some(note) = note.filter(|note| !note.is_empty()) {
                let stamp = identity
                    .timestamp
                    .format(&Rfc3339)
                    .map_err(|err| ProvenanceError::InvalidArgument(err.to_string()))?;
                purge.description = format!(
                    "{}\n\nNote: {} {} {}\n{}",
                    purge.description, stamp, identity.application, identity.user, note
                );
                tx.set_vertex_property(
                    purge.vertex_id,
                    keys::DESCRIPTION,
                    purge.description.clone().into(),
                )?;
            }

            purge.resolved = resolved;
            tx.set_vertex_property(purge.vertex_id, keys::RESOLVED, resolved.into())?;
            info!(
                purge_id,
                purged = purge.completely_purged_document_ids.len(),
                resolved,
                "purge progress recorded"
            );
            Ok(purge)
        })
    }

    /// Marks documents aged and removes every AgeOff edge reaching them.
    ///
    /// Ids above the document allocator's current value are rejected before
    /// anything is written; ids with no document are skipped. Returns the ids
    /// that were aged.
    pub fn mark_aged(&self, document_ids: &[i64]) -> Result<Vec<i64>> {
        if let Some(&highest) = document_ids.iter().max() {
            let high_water = self.ids.current_value(IdClass::Document)?;
            if highest > high_water {
                return Err(ProvenanceError::DocumentIdTooLarge {
                    id: highest,
                    high_water,
                });
            }
        }
        self.write("mark_aged", |tx| {
            let mut aged = Vec::with_capacity(document_ids.len());
            for &id in document_ids {
                let Some(doc) = access::document_by_id(tx, id)? else {
                    warn!(document_id = id, "cannot age missing document");
                    continue;
                };
                tx.set_vertex_property(doc.vertex_id, keys::AGED, true.into())?;
                for edge in tx.edges_of(doc.vertex_id, Direction::Incoming, EdgeLabel::AgeOff)? {
                    tx.remove_edge(edge.id)?;
                }
                aged.push(id);
            }
            info!(aged = aged.len(), "documents aged");
            Ok(aged)
        })
    }

    pub fn purge_info(&self, purge_id: i64) -> Result<PurgeEvent> {
        self.read("purge_info", |tx| {
            access::purge_by_id(tx, purge_id)?.ok_or(ProvenanceError::PurgeNotFound(purge_id))
        })
    }

    /// Every purge id, ascending.
    pub fn all_purge_ids(&self) -> Result<Vec<i64>> {
        self.read("all_purge_ids", |tx| {
            Ok(tx
                .search_range(keys::PURGE_ID_SEARCH, SearchRange::default())?
                .into_iter()
                .map(|hit| hit.value)
                .collect())
        })
    }
}
