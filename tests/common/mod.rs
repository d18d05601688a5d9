#![allow(dead_code)]

use provenance::{AgeOffMapping, CallerIdentity, DocumentRef, InheritanceInfo, ProvenanceGraph, Result};
use time::macros::datetime;
use time::{Duration, OffsetDateTime};

pub fn who() -> CallerIdentity {
    CallerIdentity::at("ingest", "alice", datetime!(2024-06-01 9:30 UTC))
}

/// Midnight UTC, `n` days after 2024-01-01.
pub fn day(n: i64) -> OffsetDateTime {
    datetime!(2024-01-01 0:00 UTC) + Duration::days(n)
}

pub fn graph() -> ProvenanceGraph {
    ProvenanceGraph::open_in_memory().expect("in-memory graph")
}

pub fn rule(graph: &ProvenanceGraph, name: &str, days: i64) -> Result<i64> {
    graph.add_age_off_rule(&who(), name, Duration::days(days), 7)
}

pub fn doc(graph: &ProvenanceGraph, uri: &str, parents: &[&str]) -> Result<i64> {
    let parents: Vec<InheritanceInfo> = parents.iter().map(|p| InheritanceInfo::inheriting(*p)).collect();
    graph.create_document(&who(), uri, &parents, &[])
}

pub fn doc_with_rule(graph: &ProvenanceGraph, uri: &str, rule_id: i64, date: OffsetDateTime) -> Result<i64> {
    graph.create_document(&who(), uri, &[], &[AgeOffMapping::new(rule_id, date)])
}

/// Relevant dates on `uri`'s AgeOff edges for `rule_id`, oldest first.
pub fn dates(graph: &ProvenanceGraph, uri: &str, rule_id: i64) -> Vec<OffsetDateTime> {
    let info = graph.document_info(&DocumentRef::uri(uri)).expect("document info");
    let mut dates: Vec<_> = info
        .age_offs
        .iter()
        .filter(|a| a.rule_id == rule_id)
        .map(|a| a.relevant_date)
        .collect();
    dates.sort();
    dates
}

pub fn uris(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}
