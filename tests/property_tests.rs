mod common;

use std::collections::{BTreeMap, BTreeSet};

use common::{day, who};
use proptest::prelude::*;
use provenance::{AgeOffMapping, DocumentRef, InheritanceInfo, ProvenanceGraph};
use time::Duration;

const DOCS: usize = 6;

#[derive(Debug, Clone)]
enum Operation {
    Inherit { child: usize, parent: usize },
    Attach { doc: usize, day: i64 },
    Detach { doc: usize },
}

fn arb_operation() -> impl Strategy<Value = Operation> {
    prop_oneof![
        3 => (0..DOCS, 0..DOCS).prop_map(|(child, parent)| Operation::Inherit { child, parent }),
        2 => (0..DOCS, 0i64..60).prop_map(|(doc, day)| Operation::Attach { doc, day }),
        1 => (0..DOCS).prop_map(|doc| Operation::Detach { doc }),
    ]
}

fn uri(index: usize) -> String {
    format!("doc://{index}")
}

fn setup() -> (ProvenanceGraph, i64) {
    let graph = common::graph();
    let rule = graph
        .add_age_off_rule(&who(), "r", Duration::days(30), 7)
        .expect("rule");
    for index in 0..DOCS {
        graph.create_document(&who(), &uri(index), &[], &[]).expect("document");
    }
    (graph, rule)
}

fn apply(graph: &ProvenanceGraph, rule: i64, op: &Operation) {
    // Rejected operations are expected; only the resulting state matters.
    let _ = match *op {
        Operation::Inherit { child, parent } => graph.add_inheritance_relationship(
            &who(),
            &DocumentRef::uri(uri(child)),
            InheritanceInfo::inheriting(uri(parent)),
        ),
        Operation::Attach { doc, day: n } => graph.attach_explicit_rule(
            &who(),
            &DocumentRef::uri(uri(doc)),
            AgeOffMapping::new(rule, day(n)),
        ),
        Operation::Detach { doc } => {
            graph.detach_explicit_rule(&who(), &DocumentRef::uri(uri(doc)), rule)
        }
    };
}

/// Oldest date per document id for `rule`.
fn effective_dates(graph: &ProvenanceGraph, rule: i64) -> BTreeMap<i64, Option<time::OffsetDateTime>> {
    (0..DOCS)
        .map(|index| {
            let info = graph.document_info(&DocumentRef::uri(uri(index))).expect("info");
            let oldest = info
                .age_offs
                .iter()
                .filter(|a| a.rule_id == rule)
                .map(|a| a.relevant_date)
                .min();
            (info.document.document_id, oldest)
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_lineage_stays_acyclic(ops in prop::collection::vec(arb_operation(), 1..40)) {
        let (graph, rule) = setup();
        for op in &ops {
            apply(&graph, rule, op);
        }
        for index in 0..DOCS {
            let start = vec![uri(index)];
            let up = graph.ancestors_of(&start).expect("ancestors");
            let down = graph.descendants_of(&start).expect("descendants");
            let both: BTreeSet<i64> = up.document_ids.intersection(&down.document_ids).copied().collect();
            prop_assert_eq!(both.len(), 1);
        }
    }

    #[test]
    fn prop_tracking_children_carry_parent_oldest_date(ops in prop::collection::vec(arb_operation(), 1..40)) {
        let (graph, rule) = setup();
        for op in &ops {
            apply(&graph, rule, op);
        }
        let oldest = effective_dates(&graph, rule);
        for index in 0..DOCS {
            let info = graph.document_info(&DocumentRef::uri(uri(index))).expect("info");
            for parent_id in &info.parents {
                let inherited: Vec<_> = info
                    .age_offs
                    .iter()
                    .filter(|a| a.rule_id == rule && a.inherited_from_id == Some(*parent_id))
                    .map(|a| a.relevant_date)
                    .collect();
                match oldest[parent_id] {
                    Some(date) => prop_assert_eq!(inherited, vec![date]),
                    None => prop_assert!(inherited.is_empty()),
                }
            }
        }
    }
}
