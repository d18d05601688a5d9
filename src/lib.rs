//! Lineage and age-off retention engine for a document provenance service.
//!
//! Documents are vertices linked by `DerivedFrom` edges into a DAG. Retention
//! rules reach documents through `AgeOff` edges, either explicitly from a rule
//! or inherited from an ancestor, and the engine keeps every tracking
//! descendant's inherited dates in sync as edges come and go. Purge campaigns
//! cover a document set plus its descendants and accumulate completion state.
//!
//! ```no_run
//! use provenance::{CallerIdentity, InheritanceInfo, ProvenanceGraph};
//! use time::Duration;
//!
//! # fn main() -> provenance::Result<()> {
//! let graph = ProvenanceGraph::open_in_memory()?;
//! let who = CallerIdentity::new("ingest", "alice");
//! let rule = graph.add_age_off_rule(&who, "thirty-days", Duration::days(30), 7)?;
//! graph.create_document(&who, "doc://parent", &[], &[])?;
//! graph.create_document(&who, "doc://child", &[InheritanceInfo::inheriting("doc://parent")], &[])?;
//! let expired = graph.compute_expired(rule, None)?;
//! # let _ = expired;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod engine;
pub mod entity;
pub mod error;
pub mod identity;
pub mod ids;
pub mod model;
pub mod storage;

pub use config::{ConfigError, EngineConfig};
pub use engine::{
    AgeOffInfo, AgeOffInitiation, BulkDocument, BulkOutcome, BulkStatus, ConversionResult,
    DerivedResult, DocumentInfo, DocumentRef, ProvenanceGraph, PurgeInitiation, SchemaManager,
    SchemaReport,
};
pub use entity::{AgeOffMapping, AgeOffRule, Document, InheritanceInfo, PurgeEvent};
pub use error::{ErrorKind, ProvenanceError, Result};
pub use identity::CallerIdentity;
pub use ids::{IdAllocator, IdClass, MemoryIdAllocator, SqliteIdAllocator};
pub use storage::{GraphStore, GraphTx, SqliteGraphStore};
