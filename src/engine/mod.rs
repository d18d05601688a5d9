//! The lineage and age-off engine.
//!
//! [`ProvenanceGraph`] is the single entry point. Every public operation runs
//! inside exactly one storage transaction that is either committed or rolled
//! back before the call returns.

mod access;
mod lineage;
mod order;
mod propagation;
mod purge;
mod query;
mod recovery;
mod rules;
mod schema;

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::config::EngineConfig;
use crate::error::Result;
use crate::ids::{IdAllocator, IdClass, MemoryIdAllocator, SqliteIdAllocator};
use crate::storage::{GraphStore, GraphTx, SqliteGraphStore};

pub use lineage::{BulkDocument, BulkOutcome, BulkStatus};
pub use purge::PurgeInitiation;
pub use query::{AgeOffInfo, AgeOffInitiation, ConversionResult, DerivedResult, DocumentInfo};
pub use schema::{SchemaManager, SchemaReport};

/// How a caller names a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DocumentRef {
    /// By `documentId`.
    Id(i64),
    /// By `uri`.
    Uri(String),
}

impl DocumentRef {
    pub fn uri(uri: impl Into<String>) -> Self {
        DocumentRef::Uri(uri.into())
    }
}

impl From<i64> for DocumentRef {
    fn from(id: i64) -> Self {
        DocumentRef::Id(id)
    }
}

impl From<&str> for DocumentRef {
    fn from(uri: &str) -> Self {
        DocumentRef::Uri(uri.to_owned())
    }
}

impl fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentRef::Id(id) => write!(f, "{id}"),
            DocumentRef::Uri(uri) => f.write_str(uri),
        }
    }
}

/// Handle to a provenance graph.
///
/// Opening runs the schema pass and id recovery before the handle is
/// returned, so no operation can observe an unreconciled allocator.
pub struct ProvenanceGraph {
    store: Arc<dyn GraphStore>,
    ids: Arc<dyn IdAllocator>,
    schema: Mutex<SchemaManager>,
    config: EngineConfig,
}

impl ProvenanceGraph {
    pub fn open(
        store: Arc<dyn GraphStore>,
        ids: Arc<dyn IdAllocator>,
        config: EngineConfig,
    ) -> Result<Self> {
        let graph = Self {
            store,
            ids,
            schema: Mutex::new(SchemaManager::new()),
            config,
        };
        let report = graph.ensure_schema()?;
        for class in IdClass::ALL {
            graph.reconcile(class)?;
        }
        info!(
            declared = report.declared,
            backfilled = report.backfilled,
            "provenance graph ready"
        );
        Ok(graph)
    }

    /// In-memory graph and counters with default settings.
    pub fn open_in_memory() -> Result<Self> {
        Self::open(
            Arc::new(SqliteGraphStore::open_in_memory()?),
            Arc::new(MemoryIdAllocator::new()),
            EngineConfig::default(),
        )
    }

    /// Opens the stores named by `config`, in memory where no path is set.
    pub fn from_config(config: EngineConfig) -> Result<Self> {
        let store: Arc<dyn GraphStore> = match &config.database {
            Some(path) => Arc::new(SqliteGraphStore::open(path)?),
            None => Arc::new(SqliteGraphStore::open_in_memory()?),
        };
        let ids: Arc<dyn IdAllocator> = match &config.id_allocator {
            Some(path) => Arc::new(SqliteIdAllocator::open(path)?),
            None => Arc::new(MemoryIdAllocator::new()),
        };
        Self::open(store, ids, config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Largest batch accepted by [`ProvenanceGraph::bulk_create`].
    pub fn bulk_max_size(&self) -> usize {
        self.config.bulk_max_size
    }

    pub fn id_allocator(&self) -> &Arc<dyn IdAllocator> {
        &self.ids
    }

    /// Declares every property key and edge label the engine uses.
    pub fn ensure_schema(&self) -> Result<SchemaReport> {
        self.schema.lock().ensure(self.store.as_ref())
    }

    /// Runs `op` in a transaction that is committed when it succeeds.
    fn write<T>(
        &self,
        operation: &'static str,
        op: impl FnOnce(&mut dyn GraphTx) -> Result<T>,
    ) -> Result<T> {
        let mut tx = self.store.begin()?;
        match op(tx.as_mut()) {
            Ok(value) => {
                tx.commit().map_err(|err| {
                    error!(operation, error = %err, "commit failed");
                    err
                })?;
                Ok(value)
            }
            Err(err) => {
                warn!(operation, error = %err, "rolling back");
                if let Err(rollback) = tx.rollback() {
                    error!(operation, error = %rollback, "rollback failed");
                }
                Err(err)
            }
        }
    }

    /// Runs `op` in a transaction that is always rolled back.
    fn read<T>(
        &self,
        operation: &'static str,
        op: impl FnOnce(&mut dyn GraphTx) -> Result<T>,
    ) -> Result<T> {
        let mut tx = self.store.begin()?;
        let result = op(tx.as_mut());
        if let Err(err) = tx.rollback() {
            error!(operation, error = %err, "closing read transaction failed");
        }
        result
    }
}
