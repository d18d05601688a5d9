use tracing::{debug, info};

use super::access;
use super::ProvenanceGraph;
use crate::entity::keys;
use crate::error::Result;
use crate::ids::IdClass;
use crate::storage::{GraphTx, SearchRange};

impl ProvenanceGraph {
    /// Advances the allocator for `class` past the highest id present in
    /// storage and returns the allocator's resulting current value.
    ///
    /// Repairs the gap left by a crash between allocating an id and
    /// persisting it. Idempotent; [`ProvenanceGraph::open`] runs it for every
    /// class.
    pub fn reconcile(&self, class: IdClass) -> Result<i64> {
        let stored = self.read("reconcile", |tx| highest_stored_id(tx, class))?;
        let current = self.ids.current_value(class)?;
        if stored > current {
            self.ids.set_current_value(class, stored)?;
            info!(class = %class, from = current, to = stored, "advanced id allocator");
            Ok(stored)
        } else {
            debug!(class = %class, current, stored, "id allocator up to date");
            Ok(current)
        }
    }
}

fn highest_stored_id(tx: &mut dyn GraphTx, class: IdClass) -> Result<i64> {
    let key = match class {
        IdClass::Document => keys::DOCUMENT_ID_SEARCH,
        IdClass::AgeOffRule => keys::RULE_ID_SEARCH,
        IdClass::PurgeEvent => keys::PURGE_ID_SEARCH,
    };
    let highest = tx
        .search_range(key, SearchRange::above(0).descending().limit(1))?
        .first()
        .map_or(0, |hit| hit.value);
    if class != IdClass::PurgeEvent {
        return Ok(highest);
    }
    let event_max = access::age_off_event(tx)?.map_or(0, |event| event.event_max_id);
    Ok(highest.max(event_max))
}
