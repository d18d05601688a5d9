//! Parent-first ordering of a bulk batch.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use rustc_hash::FxHashMap;

/// Insertion order for a batch.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct BatchOrder {
    /// Every uri appears after all of its batch-local parents.
    pub ordered: Vec<String>,
    /// Uris on, or downstream of, a cycle confined to the batch.
    pub cyclic: BTreeSet<String>,
}

/// Orders `batch` (uri to requested parent uris) breadth-first from its roots.
///
/// Parents outside the batch are ignored here; they either already exist or
/// are reported when the entry is inserted. Ties are broken by uri so the
/// result is deterministic.
pub(crate) fn parent_first(batch: &BTreeMap<String, BTreeSet<String>>) -> BatchOrder {
    let mut pending: FxHashMap<&str, usize> = FxHashMap::default();
    let mut children: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (uri, parents) in batch {
        let local = parents.iter().filter(|p| batch.contains_key(p.as_str()));
        let mut count = 0;
        for parent in local {
            children.entry(parent.as_str()).or_default().push(uri.as_str());
            count += 1;
        }
        pending.insert(uri.as_str(), count);
    }

    let mut queue: VecDeque<&str> = pending
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(&uri, _)| uri)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let mut ordered = Vec::with_capacity(batch.len());
    while let Some(uri) = queue.pop_front() {
        ordered.push(uri.to_owned());
        for &child in children.get(uri).into_iter().flatten() {
            if let Some(count) = pending.get_mut(child) {
                *count -= 1;
                if *count == 0 {
                    queue.push_back(child);
                }
            }
        }
    }

    let cyclic = pending
        .into_iter()
        .filter(|(_, count)| *count > 0)
        .map(|(uri, _)| uri.to_owned())
        .collect();
    BatchOrder { ordered, cyclic }
}
