mod common;

use common::{doc, graph, rule, uris, who};
use provenance::{
    AgeOffMapping, DocumentRef, ErrorKind, InheritanceInfo, ProvenanceError, Result,
};

#[test]
fn documents_get_distinct_increasing_ids() -> Result<()> {
    let graph = graph();
    let a = doc(&graph, "doc://a", &[])?;
    let b = doc(&graph, "doc://b", &["doc://a"])?;
    assert!(b > a);

    let info = graph.document_info(&DocumentRef::Id(b))?;
    assert_eq!(info.document.uri, "doc://b");
    assert_eq!(info.parents, vec![a]);
    assert_eq!(info.document.created, who());
    assert_eq!(graph.document_info(&"doc://a".into())?.children, vec![b]);
    Ok(())
}

#[test]
fn duplicate_uri_is_rejected_without_consuming_state() -> Result<()> {
    let graph = graph();
    doc(&graph, "doc://a", &[])?;
    let err = doc(&graph, "doc://a", &[]).unwrap_err();
    assert!(matches!(err, ProvenanceError::DocumentExists(ref uri) if uri == "doc://a"));
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    assert_eq!(graph.convert_uris(&uris(&["doc://a"]))?.ids_by_uri.len(), 1);
    Ok(())
}

#[test]
fn self_parent_is_circular() -> Result<()> {
    let graph = graph();
    let err = doc(&graph, "doc://a", &["doc://a"]).unwrap_err();
    assert!(matches!(err, ProvenanceError::CircularInheritanceNotAllowed(_)));
    assert_eq!(err.kind(), ErrorKind::InvariantViolation);
    assert_eq!(
        graph.convert_uris(&uris(&["doc://a"]))?.uris_not_found,
        uris(&["doc://a"])
    );
    Ok(())
}

#[test]
fn every_missing_parent_is_reported_together() -> Result<()> {
    let graph = graph();
    doc(&graph, "doc://present", &[])?;
    let err = doc(&graph, "doc://child", &["doc://x", "doc://present", "doc://y"]).unwrap_err();
    match err {
        ProvenanceError::ParentNotFound(missing) => assert_eq!(missing, uris(&["doc://x", "doc://y"])),
        other => panic!("unexpected error {other}"),
    }
    assert!(graph.uri_for_id(2).is_err(), "no partial document is left behind");
    Ok(())
}

#[test]
fn duplicate_and_empty_parents_are_dropped() -> Result<()> {
    let graph = graph();
    let a = doc(&graph, "doc://a", &[])?;
    let parents = vec![
        InheritanceInfo::inheriting("doc://a"),
        InheritanceInfo::new("doc://a", false, false),
        InheritanceInfo::inheriting(""),
    ];
    let child = graph.create_document(&who(), "doc://child", &parents, &[])?;
    let info = graph.document_info(&DocumentRef::Id(child))?;
    assert_eq!(info.parents, vec![a]);
    assert_eq!(info.document.inheritance, vec![InheritanceInfo::inheriting("doc://a")]);
    Ok(())
}

#[test]
fn unknown_rule_leaves_no_document() -> Result<()> {
    let graph = graph();
    let rule_id = rule(&graph, "r", 30)?;
    let mappings = [
        AgeOffMapping::new(rule_id, common::day(0)),
        AgeOffMapping::new(rule_id + 100, common::day(0)),
    ];
    let err = graph
        .create_document(&who(), "doc://a", &[], &mappings)
        .unwrap_err();
    assert!(matches!(err, ProvenanceError::AgeOffRuleNotFound(_)));
    assert!(graph.document_info(&"doc://a".into()).is_err());
    Ok(())
}

#[test]
fn lineage_only_parents_do_not_pass_rules_down() -> Result<()> {
    let graph = graph();
    let rule_id = rule(&graph, "r", 30)?;
    common::doc_with_rule(&graph, "doc://p", rule_id, common::day(0))?;
    graph.create_document(
        &who(),
        "doc://c",
        &[InheritanceInfo::new("doc://p", false, false)],
        &[],
    )?;
    assert!(common::dates(&graph, "doc://c", rule_id).is_empty());
    assert_eq!(graph.ancestors_of(&uris(&["doc://c"]))?.document_ids.len(), 2);
    Ok(())
}

#[test]
fn ancestors_and_descendants_count_each_document_once() -> Result<()> {
    let graph = graph();
    let a = doc(&graph, "doc://a", &[])?;
    let b = doc(&graph, "doc://b", &["doc://a"])?;
    let c = doc(&graph, "doc://c", &["doc://a"])?;
    let d = doc(&graph, "doc://d", &["doc://b", "doc://c"])?;

    let down = graph.descendants_of(&uris(&["doc://a"]))?;
    assert_eq!(down.document_ids, [a, b, c, d].into_iter().collect());
    assert_eq!(down.immediate_children, Some(vec![b, c]));

    let up = graph.ancestors_of(&uris(&["doc://d", "doc://missing"]))?;
    assert_eq!(up.document_ids, [a, b, c, d].into_iter().collect());
    assert_eq!(up.uris_not_found, uris(&["doc://missing"]));
    assert_eq!(up.immediate_children, None);
    Ok(())
}

#[test]
fn single_unknown_uri_reports_no_children() -> Result<()> {
    let graph = graph();
    let down = graph.descendants_of(&uris(&["doc://missing"]))?;
    assert!(down.document_ids.is_empty());
    assert_eq!(down.uris_not_found, uris(&["doc://missing"]));
    assert_eq!(down.immediate_children, Some(Vec::new()));
    Ok(())
}

#[test]
fn ids_and_uris_convert_both_ways() -> Result<()> {
    let graph = graph();
    let a = doc(&graph, "doc://a", &[])?;
    let by_id = graph.convert_ids(&[a, 999])?;
    assert_eq!(by_id.ids_by_uri.get("doc://a"), Some(&a));
    assert_eq!(by_id.ids_not_found, vec![999]);
    assert_eq!(graph.uri_for_id(a)?, "doc://a");
    assert!(matches!(
        graph.uri_for_id(999),
        Err(ProvenanceError::DocumentNotFound(_))
    ));
    Ok(())
}
