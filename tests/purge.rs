mod common;

use std::collections::BTreeSet;

use common::{dates, day, doc, doc_with_rule, rule, uris, who};
use provenance::{CallerIdentity, ErrorKind, ProvenanceError, Result};
use time::macros::datetime;

fn ids(values: &[i64]) -> BTreeSet<i64> {
    values.iter().copied().collect()
}

#[test]
fn purge_covers_every_descendant() -> Result<()> {
    let graph = common::graph();
    let a = doc(&graph, "doc://a", &[])?;
    let b = doc(&graph, "doc://b", &["doc://a"])?;
    let c = doc(&graph, "doc://c", &["doc://b"])?;
    doc(&graph, "doc://other", &[])?;

    let purge = graph.mark_for_purge(&who(), &uris(&["doc://a", "doc://nope"]), "spill", "leaked data")?;
    assert_eq!(purge.document_ids, ids(&[a, b, c]));
    assert_eq!(purge.uris_not_found, uris(&["doc://nope"]));

    let stored = graph.purge_info(purge.purge_id)?;
    assert_eq!(stored.name, "spill");
    assert_eq!(stored.document_uris, uris(&["doc://a", "doc://nope"]));
    assert_eq!(stored.purge_document_ids, ids(&[a, b, c]));
    assert!(stored.completely_purged_document_ids.is_empty());
    assert!(!stored.resolved);
    Ok(())
}

#[test]
fn purge_names_are_unique() -> Result<()> {
    let graph = common::graph();
    doc(&graph, "doc://a", &[])?;
    graph.mark_for_purge(&who(), &uris(&["doc://a"]), "spill", "")?;
    let err = graph
        .mark_for_purge(&who(), &uris(&["doc://a"]), "spill", "")
        .unwrap_err();
    assert!(matches!(err, ProvenanceError::PurgeNameExists(_)));
    assert_eq!(graph.all_purge_ids()?.len(), 1);
    Ok(())
}

#[test]
fn completion_accumulates_and_appends_notes() -> Result<()> {
    let graph = common::graph();
    let a = doc(&graph, "doc://a", &[])?;
    let b = doc(&graph, "doc://b", &["doc://a"])?;
    let purge = graph.mark_for_purge(&who(), &uris(&["doc://a"]), "spill", "leaked data")?;

    graph.record_completion(&who(), purge.purge_id, &ids(&[a]), None, false)?;
    let auditor = CallerIdentity::at("audit", "bob", datetime!(2024-07-04 12:00 UTC));
    let event = graph.record_completion(&auditor, purge.purge_id, &ids(&[b]), Some("all gone"), true)?;

    assert_eq!(event.completely_purged_document_ids, ids(&[a, b]));
    assert!(event.resolved);
    assert_eq!(
        event.description,
        "leaked data\n\nNote: 2024-07-04T12:00:00Z audit bob\nall gone"
    );
    assert_eq!(graph.purge_info(purge.purge_id)?, event);
    Ok(())
}

#[test]
fn completion_outside_the_purge_changes_nothing() -> Result<()> {
    let graph = common::graph();
    let a = doc(&graph, "doc://a", &[])?;
    let stranger = doc(&graph, "doc://stranger", &[])?;
    let purge = graph.mark_for_purge(&who(), &uris(&["doc://a"]), "spill", "")?;

    let err = graph
        .record_completion(&who(), purge.purge_id, &ids(&[a, stranger]), Some("note"), true)
        .unwrap_err();
    match err {
        ProvenanceError::DocumentNotInPurge { purge_id, ids } => {
            assert_eq!(purge_id, purge.purge_id);
            assert_eq!(ids, vec![stranger]);
        }
        other => panic!("unexpected error {other}"),
    }
    let stored = graph.purge_info(purge.purge_id)?;
    assert!(stored.completely_purged_document_ids.is_empty());
    assert!(!stored.resolved);
    assert_eq!(stored.description, "");
    Ok(())
}

#[test]
fn unknown_purge_is_not_found() {
    let graph = common::graph();
    let err = graph
        .record_completion(&who(), 42, &BTreeSet::new(), None, false)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn purge_ids_come_back_in_order() -> Result<()> {
    let graph = common::graph();
    doc(&graph, "doc://a", &[])?;
    let first = graph.mark_for_purge(&who(), &uris(&["doc://a"]), "one", "")?.purge_id;
    let second = graph.mark_for_purge(&who(), &uris(&["doc://a"]), "two", "")?.purge_id;
    assert_eq!(graph.all_purge_ids()?, vec![first, second]);
    Ok(())
}

#[test]
fn aging_is_terminal_and_clears_age_off_edges() -> Result<()> {
    let graph = common::graph();
    let r = rule(&graph, "thirty", 30)?;
    let a = doc_with_rule(&graph, "doc://a", r, day(0))?;
    let b = doc(&graph, "doc://b", &["doc://a"])?;

    assert_eq!(graph.mark_aged(&[a, b])?, vec![a, b]);
    for uri in ["doc://a", "doc://b"] {
        let info = graph.document_info(&uri.into())?;
        assert!(info.document.aged);
        assert!(dates(&graph, uri, r).is_empty());
    }
    assert!(graph.compute_expired(r, Some(day(365)))?.document_ids.is_empty());
    Ok(())
}

#[test]
fn aging_rejects_ids_never_allocated() -> Result<()> {
    let graph = common::graph();
    let a = doc(&graph, "doc://a", &[])?;
    let err = graph.mark_aged(&[a, a + 10]).unwrap_err();
    assert!(matches!(
        err,
        ProvenanceError::DocumentIdTooLarge { id, high_water } if id == a + 10 && high_water == a
    ));
    assert!(!graph.document_info(&"doc://a".into())?.document.aged);
    Ok(())
}
