mod common;

use std::collections::BTreeMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use common::{dates, day, doc, rule, uris, who};
use provenance::model::{
    Direction, Edge, EdgeId, EdgeLabel, Properties, PropertyValue, Vertex, VertexId, VertexKind,
};
use provenance::storage::{IndexDef, KeyOwner, SearchHit, SearchRange};
use provenance::{
    AgeOffMapping, BulkDocument, BulkStatus, EngineConfig, GraphStore, GraphTx, InheritanceInfo,
    MemoryIdAllocator, ProvenanceError, ProvenanceGraph, Result, SqliteGraphStore,
};

/// Wraps a SQLite store and fails commits on demand.
struct FlakyStore {
    inner: SqliteGraphStore,
    fail_commit: AtomicBool,
}

struct FlakyTx<'a> {
    inner: Box<dyn GraphTx + 'a>,
    fail_commit: bool,
}

impl GraphStore for FlakyStore {
    fn begin(&self) -> Result<Box<dyn GraphTx + '_>> {
        Ok(Box::new(FlakyTx {
            inner: self.inner.begin()?,
            fail_commit: self.fail_commit.load(Ordering::SeqCst),
        }))
    }
}

impl GraphTx for FlakyTx<'_> {
    fn property_key(&mut self, name: &str, owner: KeyOwner) -> Result<Option<IndexDef>> {
        self.inner.property_key(name, owner)
    }
    fn declare_property(&mut self, def: &IndexDef) -> Result<()> {
        self.inner.declare_property(def)
    }
    fn edge_label_exists(&mut self, label: EdgeLabel) -> Result<bool> {
        self.inner.edge_label_exists(label)
    }
    fn declare_edge_label(&mut self, label: EdgeLabel) -> Result<()> {
        self.inner.declare_edge_label(label)
    }
    fn add_vertex(&mut self, kind: VertexKind, properties: Properties) -> Result<VertexId> {
        self.inner.add_vertex(kind, properties)
    }
    fn vertex(&mut self, id: VertexId) -> Result<Option<Vertex>> {
        self.inner.vertex(id)
    }
    fn set_vertex_property(&mut self, id: VertexId, key: &str, value: PropertyValue) -> Result<()> {
        self.inner.set_vertex_property(id, key, value)
    }
    fn vertices_of_kind(&mut self, kind: VertexKind) -> Result<Vec<VertexId>> {
        self.inner.vertices_of_kind(kind)
    }
    fn find_vertices(
        &mut self,
        kind: VertexKind,
        key: &str,
        value: &PropertyValue,
    ) -> Result<Vec<VertexId>> {
        self.inner.find_vertices(kind, key, value)
    }
    fn search_range(&mut self, key: &str, range: SearchRange) -> Result<Vec<SearchHit>> {
        self.inner.search_range(key, range)
    }
    fn add_edge(
        &mut self,
        label: EdgeLabel,
        source: VertexId,
        target: VertexId,
        properties: Properties,
    ) -> Result<EdgeId> {
        self.inner.add_edge(label, source, target, properties)
    }
    fn edge(&mut self, id: EdgeId) -> Result<Option<Edge>> {
        self.inner.edge(id)
    }
    fn set_edge_property(&mut self, id: EdgeId, key: &str, value: PropertyValue) -> Result<()> {
        self.inner.set_edge_property(id, key, value)
    }
    fn remove_edge(&mut self, id: EdgeId) -> Result<()> {
        self.inner.remove_edge(id)
    }
    fn edges_of(
        &mut self,
        vertex: VertexId,
        direction: Direction,
        label: EdgeLabel,
    ) -> Result<Vec<Edge>> {
        self.inner.edges_of(vertex, direction, label)
    }
    fn find_edges(
        &mut self,
        label: EdgeLabel,
        key: &str,
        value: &PropertyValue,
    ) -> Result<Vec<Edge>> {
        self.inner.find_edges(label, key, value)
    }
    fn savepoint(&mut self, name: &str) -> Result<()> {
        self.inner.savepoint(name)
    }
    fn release_savepoint(&mut self, name: &str) -> Result<()> {
        self.inner.release_savepoint(name)
    }
    fn rollback_to_savepoint(&mut self, name: &str) -> Result<()> {
        self.inner.rollback_to_savepoint(name)
    }
    fn commit(self: Box<Self>) -> Result<()> {
        let this = *self;
        if this.fail_commit {
            this.inner.rollback()?;
            return Err(ProvenanceError::Io(io::Error::other("injected commit failure")));
        }
        this.inner.commit()
    }
    fn rollback(self: Box<Self>) -> Result<()> {
        self.inner.rollback()
    }
}

fn status_of(results: &BTreeMap<String, provenance::BulkOutcome>, uri: &str) -> BulkStatus {
    results[uri].status
}

#[test]
fn parents_in_the_batch_get_smaller_ids() -> Result<()> {
    let graph = common::graph();
    // Child listed first; it must still be inserted after its parent.
    let batch = vec![
        BulkDocument::new("doc://b").with_parent(InheritanceInfo::inheriting("doc://a")),
        BulkDocument::new("doc://a"),
    ];
    let results = graph.bulk_create(&who(), batch, &[])?;
    let a = results["doc://a"].document_id.expect("a created");
    let b = results["doc://b"].document_id.expect("b created");
    assert!(a < b);
    assert_eq!(graph.document_info(&"doc://b".into())?.parents, vec![a]);
    Ok(())
}

#[test]
fn batch_local_cycles_are_quarantined() -> Result<()> {
    let graph = common::graph();
    let batch = vec![
        BulkDocument::new("doc://x").with_parent(InheritanceInfo::inheriting("doc://y")),
        BulkDocument::new("doc://y").with_parent(InheritanceInfo::inheriting("doc://x")),
        BulkDocument::new("doc://solo"),
    ];
    let results = graph.bulk_create(&who(), batch, &[])?;
    assert_eq!(status_of(&results, "doc://x"), BulkStatus::CircularInheritanceNotAllowed);
    assert_eq!(status_of(&results, "doc://y"), BulkStatus::CircularInheritanceNotAllowed);
    assert_eq!(status_of(&results, "doc://solo"), BulkStatus::Success);
    let converted = graph.convert_uris(&uris(&["doc://x", "doc://y", "doc://solo"]))?;
    assert_eq!(converted.uris_not_found, uris(&["doc://x", "doc://y"]));
    Ok(())
}

#[test]
fn entry_failures_leave_the_rest_of_the_batch_intact() -> Result<()> {
    let graph = common::graph();
    doc(&graph, "doc://old", &[])?;
    let batch = vec![
        BulkDocument::new("doc://old"),
        BulkDocument::new("doc://orphan")
            .with_parent(InheritanceInfo::inheriting("doc://gone"))
            .with_parent(InheritanceInfo::inheriting("doc://old")),
        BulkDocument::new("doc://self").with_parent(InheritanceInfo::inheriting("doc://self")),
        BulkDocument::new("doc://fine").with_parent(InheritanceInfo::inheriting("doc://old")),
    ];
    let results = graph.bulk_create(&who(), batch, &[])?;

    assert_eq!(status_of(&results, "doc://old"), BulkStatus::AlreadyExists);
    assert_eq!(status_of(&results, "doc://orphan"), BulkStatus::ParentNotFound);
    assert_eq!(results["doc://orphan"].parents_not_found, uris(&["doc://gone"]));
    assert_eq!(status_of(&results, "doc://self"), BulkStatus::CircularInheritanceNotAllowed);
    assert_eq!(status_of(&results, "doc://fine"), BulkStatus::Success);

    let old = graph.document_info(&"doc://old".into())?;
    assert_eq!(old.children, vec![results["doc://fine"].document_id.expect("fine created")]);
    assert!(graph.document_info(&"doc://orphan".into()).is_err());
    Ok(())
}

#[test]
fn repeated_uris_are_merged() -> Result<()> {
    let graph = common::graph();
    doc(&graph, "doc://p1", &[])?;
    doc(&graph, "doc://p2", &[])?;
    let batch = vec![
        BulkDocument::new("doc://c").with_parent(InheritanceInfo::inheriting("doc://p1")),
        BulkDocument::new("doc://c")
            .with_parent(InheritanceInfo::inheriting("doc://p1"))
            .with_parent(InheritanceInfo::inheriting("doc://p2")),
    ];
    let results = graph.bulk_create(&who(), batch, &[])?;
    assert_eq!(results.len(), 1);
    let info = graph.document_info(&"doc://c".into())?;
    assert_eq!(info.parents.len(), 2);
    Ok(())
}

#[test]
fn shared_and_entry_rules_are_applied() -> Result<()> {
    let graph = common::graph();
    let shared = rule(&graph, "shared", 30)?;
    let own = rule(&graph, "own", 10)?;
    let batch = vec![
        BulkDocument::new("doc://a").with_rule(AgeOffMapping::new(own, day(3))),
        BulkDocument::new("doc://b").with_parent(InheritanceInfo::inheriting("doc://a")),
    ];
    graph.bulk_create(&who(), batch, &[AgeOffMapping::new(shared, day(1))])?;

    assert_eq!(dates(&graph, "doc://a", shared), vec![day(1)]);
    assert_eq!(dates(&graph, "doc://a", own), vec![day(3)]);
    // b carries its own shared edge plus copies of a's rules.
    assert_eq!(dates(&graph, "doc://b", shared), vec![day(1), day(1)]);
    assert_eq!(dates(&graph, "doc://b", own), vec![day(3)]);
    Ok(())
}

#[test]
fn unknown_rule_fails_the_whole_batch() -> Result<()> {
    let graph = common::graph();
    let known = rule(&graph, "known", 30)?;
    let batch = vec![
        BulkDocument::new("doc://a"),
        BulkDocument::new("doc://b").with_rule(AgeOffMapping::new(known + 7, day(0))),
    ];
    let err = graph.bulk_create(&who(), batch, &[AgeOffMapping::new(known, day(0))]).unwrap_err();
    assert!(matches!(err, ProvenanceError::AgeOffRuleNotFound(_)));
    assert_eq!(graph.convert_uris(&uris(&["doc://a"]))?.uris_not_found.len(), 1);
    Ok(())
}

#[test]
fn oversized_batches_are_rejected() -> Result<()> {
    let graph = ProvenanceGraph::from_config(EngineConfig {
        bulk_max_size: 2,
        ..EngineConfig::default()
    })?;
    let batch = (0..3).map(|i| BulkDocument::new(format!("doc://{i}"))).collect();
    let err = graph.bulk_create(&who(), batch, &[]).unwrap_err();
    assert!(matches!(
        err,
        ProvenanceError::ExceedsMaxBatchSize { size: 3, limit: 2 }
    ));
    Ok(())
}

#[test]
fn empty_batch_is_a_no_op() -> Result<()> {
    let graph = common::graph();
    assert!(graph.bulk_create(&who(), Vec::new(), &[])?.is_empty());
    Ok(())
}

#[test]
fn failed_commit_reports_unknown_error() -> Result<()> {
    let store = Arc::new(FlakyStore {
        inner: SqliteGraphStore::open_in_memory()?,
        fail_commit: AtomicBool::new(false),
    });
    let graph = ProvenanceGraph::open(
        store.clone(),
        Arc::new(MemoryIdAllocator::new()),
        EngineConfig::default(),
    )?;
    doc(&graph, "doc://old", &[])?;

    store.fail_commit.store(true, Ordering::SeqCst);
    let batch = vec![BulkDocument::new("doc://new"), BulkDocument::new("doc://old")];
    let results = graph.bulk_create(&who(), batch, &[])?;
    store.fail_commit.store(false, Ordering::SeqCst);

    assert_eq!(status_of(&results, "doc://new"), BulkStatus::UnknownError);
    assert_eq!(status_of(&results, "doc://old"), BulkStatus::AlreadyExists);
    assert!(graph.document_info(&"doc://new".into()).is_err());
    Ok(())
}
