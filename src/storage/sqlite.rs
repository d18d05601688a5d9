use std::collections::HashSet;
use std::path::Path;

use parking_lot::{Mutex, MutexGuard};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use tracing::{debug, warn};

use super::{
    DataType, GraphStore, GraphTx, IndexDef, IndexKind, KeyOwner, SearchHit, SearchRange,
    SortOrder,
};
use crate::error::{ProvenanceError, Result};
use crate::model::{
    Direction, Edge, EdgeId, EdgeLabel, Properties, PropertyValue, Vertex, VertexId, VertexKind,
};

const BASE_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS vertices (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        kind TEXT NOT NULL,
        properties TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_vertices_kind ON vertices (kind);

    CREATE TABLE IF NOT EXISTS edges (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        label TEXT NOT NULL,
        source_id INTEGER NOT NULL,
        target_id INTEGER NOT NULL,
        properties TEXT NOT NULL,
        FOREIGN KEY (source_id) REFERENCES vertices (id),
        FOREIGN KEY (target_id) REFERENCES vertices (id)
    );
    CREATE INDEX IF NOT EXISTS idx_edges_source ON edges (source_id, label);
    CREATE INDEX IF NOT EXISTS idx_edges_target ON edges (target_id, label);

    CREATE TABLE IF NOT EXISTS property_keys (
        name TEXT NOT NULL,
        owner TEXT NOT NULL,
        data_type TEXT NOT NULL,
        index_kind TEXT NOT NULL,
        PRIMARY KEY (name, owner)
    );
    CREATE TABLE IF NOT EXISTS edge_labels (name TEXT PRIMARY KEY);

    CREATE TABLE IF NOT EXISTS search_index (
        key TEXT NOT NULL,
        value INTEGER NOT NULL,
        vertex_id INTEGER NOT NULL,
        PRIMARY KEY (key, vertex_id)
    );
    CREATE INDEX IF NOT EXISTS idx_search_value ON search_index (key, value);
";

/// Graph store persisted in a single SQLite database.
///
/// Vertex and edge properties are stored as JSON documents. Declared keys are
/// indexed with expression indexes over `json_extract`, and search-optimized
/// keys are mirrored into a separate ordering table for range scans.
///
/// Transactions are serialized on one connection; a second [`GraphStore::begin`]
/// blocks until the first transaction finishes.
pub struct SqliteGraphStore {
    conn: Mutex<Connection>,
}

impl SqliteGraphStore {
    /// Opens (or creates) a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;

        conn.pragma_update(None, "synchronous", "FULL")?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;

        debug!(path = %path.as_ref().display(), "opened sqlite graph store");
        Self::init(conn)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(BASE_SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl GraphStore for SqliteGraphStore {
    fn begin(&self) -> Result<Box<dyn GraphTx + '_>> {
        let conn = self.conn.lock();
        conn.execute_batch("BEGIN IMMEDIATE")?;
        let mut tx = SqliteTx {
            conn,
            search_keys: HashSet::new(),
            finished: false,
        };
        tx.load_search_keys()?;
        Ok(Box::new(tx))
    }
}

struct SqliteTx<'a> {
    conn: MutexGuard<'a, Connection>,
    search_keys: HashSet<String>,
    finished: bool,
}

impl SqliteTx<'_> {
    fn load_search_keys(&mut self) -> Result<()> {
        let mut stmt = self.conn.prepare(
            "SELECT name FROM property_keys WHERE owner = 'vertex' AND index_kind = 'search'",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        drop(stmt);
        self.search_keys = names.into_iter().collect();
        Ok(())
    }

    fn sync_search_entry(&mut self, vertex: VertexId, key: &str, value: Option<&PropertyValue>) -> Result<()> {
        if !self.search_keys.contains(key) {
            return Ok(());
        }
        match value.and_then(PropertyValue::as_int) {
            Some(v) => {
                self.conn.execute(
                    "INSERT OR REPLACE INTO search_index (key, value, vertex_id) VALUES (?1, ?2, ?3)",
                    params![key, v, vertex],
                )?;
            }
            None => {
                self.conn.execute(
                    "DELETE FROM search_index WHERE key = ?1 AND vertex_id = ?2",
                    params![key, vertex],
                )?;
            }
        }
        Ok(())
    }

    fn load_properties(&mut self, table: &str, id: i64) -> Result<Option<Properties>> {
        let sql = format!("SELECT properties FROM {table} WHERE id = ?1");
        let raw: Option<String> = self
            .conn
            .query_row(&sql, [id], |row| row.get(0))
            .optional()?;
        raw.map(|json| serde_json::from_str(&json).map_err(Into::into))
            .transpose()
    }

    fn store_properties(&mut self, table: &str, id: i64, properties: &Properties) -> Result<()> {
        let sql = format!("UPDATE {table} SET properties = ?1 WHERE id = ?2");
        let json = serde_json::to_string(properties)?;
        self.conn.execute(&sql, params![json, id])?;
        Ok(())
    }

    fn query_edges(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Edge>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params_from_iter(params.iter()), |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter()
            .map(|(id, label, source, target, json)| decode_edge(id, &label, source, target, &json))
            .collect()
    }

    fn finish(&mut self, statement: &str) -> Result<()> {
        self.finished = true;
        self.conn.execute_batch(statement)?;
        Ok(())
    }
}

impl GraphTx for SqliteTx<'_> {
    fn property_key(&mut self, name: &str, owner: KeyOwner) -> Result<Option<IndexDef>> {
        let row: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT data_type, index_kind FROM property_keys WHERE name = ?1 AND owner = ?2",
                params![name, owner.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((data_type, index)) = row else {
            return Ok(None);
        };
        let data_type = DataType::parse(&data_type).ok_or_else(|| {
            ProvenanceError::Corruption(format!("property key {name} has data type '{data_type}'"))
        })?;
        let index = IndexKind::parse(&index).ok_or_else(|| {
            ProvenanceError::Corruption(format!("property key {name} has index kind '{index}'"))
        })?;
        Ok(Some(IndexDef::new(name, owner, data_type, index)))
    }

    fn declare_property(&mut self, def: &IndexDef) -> Result<()> {
        if self.property_key(&def.name, def.owner)?.is_some() {
            return Ok(());
        }
        let path = json_path(&def.name)?;
        let (table, scope) = match def.owner {
            KeyOwner::Vertex => ("vertices", "kind"),
            KeyOwner::Edge => ("edges", "label"),
        };
        match def.index {
            IndexKind::None => {}
            IndexKind::Standard => {
                self.conn.execute_batch(&format!(
                    "CREATE INDEX IF NOT EXISTS idx_{table}_{name} ON {table} ({scope}, json_extract(properties, {path}))",
                    name = def.name
                ))?;
            }
            IndexKind::Unique => {
                self.conn.execute_batch(&format!(
                    "CREATE UNIQUE INDEX IF NOT EXISTS uq_{table}_{name} ON {table} ({scope}, json_extract(properties, {path}))",
                    name = def.name
                ))?;
            }
            IndexKind::Search => {
                if def.owner != KeyOwner::Vertex {
                    return Err(ProvenanceError::InvalidArgument(format!(
                        "search index on edge key {} is not supported",
                        def.name
                    )));
                }
                self.search_keys.insert(def.name.clone());
            }
        }
        self.conn.execute(
            "INSERT INTO property_keys (name, owner, data_type, index_kind) VALUES (?1, ?2, ?3, ?4)",
            params![
                def.name,
                def.owner.as_str(),
                def.data_type.as_str(),
                def.index.as_str()
            ],
        )?;
        debug!(key = %def.name, owner = def.owner.as_str(), index = def.index.as_str(), "declared property key");
        Ok(())
    }

    fn edge_label_exists(&mut self, label: EdgeLabel) -> Result<bool> {
        let found: Option<String> = self
            .conn
            .query_row(
                "SELECT name FROM edge_labels WHERE name = ?1",
                [label.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn declare_edge_label(&mut self, label: EdgeLabel) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO edge_labels (name) VALUES (?1)",
            [label.as_str()],
        )?;
        Ok(())
    }

    fn add_vertex(&mut self, kind: VertexKind, properties: Properties) -> Result<VertexId> {
        let json = serde_json::to_string(&properties)?;
        self.conn.execute(
            "INSERT INTO vertices (kind, properties) VALUES (?1, ?2)",
            params![kind.as_str(), json],
        )?;
        let id = self.conn.last_insert_rowid();
        let search_keys: Vec<String> = self.search_keys.iter().cloned().collect();
        for key in search_keys {
            if let Some(value) = properties.get(&key) {
                self.sync_search_entry(id, &key, Some(value))?;
            }
        }
        Ok(id)
    }

    fn vertex(&mut self, id: VertexId) -> Result<Option<Vertex>> {
        let row: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT kind, properties FROM vertices WHERE id = ?1",
                [id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        row.map(|(kind, json)| {
            Ok(Vertex {
                id,
                kind: kind.parse()?,
                properties: serde_json::from_str(&json)?,
            })
        })
        .transpose()
    }

    fn set_vertex_property(&mut self, id: VertexId, key: &str, value: PropertyValue) -> Result<()> {
        let mut properties = self
            .load_properties("vertices", id)?
            .ok_or_else(|| ProvenanceError::InvalidArgument(format!("vertex {id} does not exist")))?;
        self.sync_search_entry(id, key, Some(&value))?;
        properties.insert(key.to_owned(), value);
        self.store_properties("vertices", id, &properties)
    }

    fn vertices_of_kind(&mut self, kind: VertexKind) -> Result<Vec<VertexId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM vertices WHERE kind = ?1 ORDER BY id")?;
        let ids = stmt
            .query_map([kind.as_str()], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    fn find_vertices(
        &mut self,
        kind: VertexKind,
        key: &str,
        value: &PropertyValue,
    ) -> Result<Vec<VertexId>> {
        let sql = format!(
            "SELECT id FROM vertices WHERE kind = ?1 AND json_extract(properties, {}) = ?2 ORDER BY id",
            json_path(key)?
        );
        let bound = sql_value(value)?;
        let mut stmt = self.conn.prepare(&sql)?;
        let ids = stmt
            .query_map(params![kind.as_str(), bound], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    fn search_range(&mut self, key: &str, range: SearchRange) -> Result<Vec<SearchHit>> {
        if !self.search_keys.contains(key) {
            return Err(ProvenanceError::InvalidArgument(format!(
                "key {key} has no search index"
            )));
        }
        let mut sql = String::from("SELECT vertex_id, value FROM search_index WHERE key = ?1");
        let mut bound = vec![SqlValue::Text(key.to_owned())];
        if let Some(above) = range.above {
            bound.push(SqlValue::Integer(above));
            sql.push_str(&format!(" AND value > ?{}", bound.len()));
        }
        if let Some(below) = range.below {
            bound.push(SqlValue::Integer(below));
            sql.push_str(&format!(" AND value < ?{}", bound.len()));
        }
        sql.push_str(match range.order {
            SortOrder::Ascending => " ORDER BY value ASC, vertex_id ASC",
            SortOrder::Descending => " ORDER BY value DESC, vertex_id DESC",
        });
        if let Some(limit) = range.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        let mut stmt = self.conn.prepare(&sql)?;
        let hits = stmt
            .query_map(params_from_iter(bound.iter()), |row| {
                Ok(SearchHit {
                    vertex_id: row.get(0)?,
                    value: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(hits)
    }

    fn add_edge(
        &mut self,
        label: EdgeLabel,
        source: VertexId,
        target: VertexId,
        properties: Properties,
    ) -> Result<EdgeId> {
        let json = serde_json::to_string(&properties)?;
        self.conn.execute(
            "INSERT INTO edges (label, source_id, target_id, properties) VALUES (?1, ?2, ?3, ?4)",
            params![label.as_str(), source, target, json],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn edge(&mut self, id: EdgeId) -> Result<Option<Edge>> {
        let edges = self.query_edges(
            "SELECT id, label, source_id, target_id, properties FROM edges WHERE id = ?1",
            &[SqlValue::Integer(id)],
        )?;
        Ok(edges.into_iter().next())
    }

    fn set_edge_property(&mut self, id: EdgeId, key: &str, value: PropertyValue) -> Result<()> {
        let mut properties = self
            .load_properties("edges", id)?
            .ok_or_else(|| ProvenanceError::InvalidArgument(format!("edge {id} does not exist")))?;
        properties.insert(key.to_owned(), value);
        self.store_properties("edges", id, &properties)
    }

    fn remove_edge(&mut self, id: EdgeId) -> Result<()> {
        let removed = self.conn.execute("DELETE FROM edges WHERE id = ?1", [id])?;
        if removed == 0 {
            return Err(ProvenanceError::InvalidArgument(format!(
                "edge {id} does not exist"
            )));
        }
        Ok(())
    }

    fn edges_of(
        &mut self,
        vertex: VertexId,
        direction: Direction,
        label: EdgeLabel,
    ) -> Result<Vec<Edge>> {
        let column = match direction {
            Direction::Incoming => "target_id",
            Direction::Outgoing => "source_id",
        };
        let sql = format!(
            "SELECT id, label, source_id, target_id, properties FROM edges WHERE {column} = ?1 AND label = ?2 ORDER BY id"
        );
        self.query_edges(
            &sql,
            &[
                SqlValue::Integer(vertex),
                SqlValue::Text(label.as_str().to_owned()),
            ],
        )
    }

    fn find_edges(
        &mut self,
        label: EdgeLabel,
        key: &str,
        value: &PropertyValue,
    ) -> Result<Vec<Edge>> {
        let sql = format!(
            "SELECT id, label, source_id, target_id, properties FROM edges WHERE label = ?1 AND json_extract(properties, {}) = ?2 ORDER BY id",
            json_path(key)?
        );
        self.query_edges(
            &sql,
            &[SqlValue::Text(label.as_str().to_owned()), sql_value(value)?],
        )
    }

    fn savepoint(&mut self, name: &str) -> Result<()> {
        check_identifier(name)?;
        self.conn.execute_batch(&format!("SAVEPOINT {name}"))?;
        Ok(())
    }

    fn release_savepoint(&mut self, name: &str) -> Result<()> {
        check_identifier(name)?;
        self.conn.execute_batch(&format!("RELEASE SAVEPOINT {name}"))?;
        Ok(())
    }

    /// Undoes everything since the savepoint and then releases it.
    fn rollback_to_savepoint(&mut self, name: &str) -> Result<()> {
        check_identifier(name)?;
        self.conn.execute_batch(&format!(
            "ROLLBACK TO SAVEPOINT {name}; RELEASE SAVEPOINT {name}"
        ))?;
        Ok(())
    }

    fn commit(mut self: Box<Self>) -> Result<()> {
        if let Err(err) = self.finish("COMMIT") {
            let _ = self.conn.execute_batch("ROLLBACK");
            return Err(err);
        }
        Ok(())
    }

    fn rollback(mut self: Box<Self>) -> Result<()> {
        self.finish("ROLLBACK")
    }
}

impl Drop for SqliteTx<'_> {
    fn drop(&mut self) {
        if !self.finished {
            warn!("graph transaction dropped without commit or rollback; rolling back");
            let _ = self.conn.execute_batch("ROLLBACK");
        }
    }
}

fn decode_edge(id: EdgeId, label: &str, source: VertexId, target: VertexId, json: &str) -> Result<Edge> {
    Ok(Edge {
        id,
        label: label.parse()?,
        source_id: source,
        target_id: target,
        properties: serde_json::from_str(json)?,
    })
}

fn json_path(key: &str) -> Result<String> {
    check_identifier(key)?;
    Ok(format!("'$.{key}'"))
}

fn check_identifier(name: &str) -> Result<()> {
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ProvenanceError::InvalidArgument(format!(
            "'{name}' is not a valid identifier"
        )));
    }
    Ok(())
}

fn sql_value(value: &PropertyValue) -> Result<SqlValue> {
    match value {
        PropertyValue::Bool(b) => Ok(SqlValue::Integer(i64::from(*b))),
        PropertyValue::Int(i) => Ok(SqlValue::Integer(*i)),
        PropertyValue::Float(f) => Ok(SqlValue::Real(*f)),
        PropertyValue::String(s) => Ok(SqlValue::Text(s.clone())),
        PropertyValue::List(_) | PropertyValue::Map(_) => Err(ProvenanceError::InvalidArgument(
            "only scalar properties can be matched".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(entries: &[(&str, PropertyValue)]) -> Properties {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn declare(tx: &mut dyn GraphTx, name: &str, owner: KeyOwner, index: IndexKind) {
        tx.declare_property(&IndexDef::new(name, owner, DataType::Int, index))
            .unwrap();
    }

    #[test]
    fn committed_vertices_are_visible_to_later_transactions() -> Result<()> {
        let store = SqliteGraphStore::open_in_memory()?;
        let id = {
            let mut tx = store.begin()?;
            let id = tx.add_vertex(
                VertexKind::Document,
                props(&[("uri", "doc://a".into()), ("aged", false.into())]),
            )?;
            tx.commit()?;
            id
        };

        let mut tx = store.begin()?;
        let vertex = tx.vertex(id)?.expect("vertex committed");
        assert_eq!(vertex.kind, VertexKind::Document);
        assert_eq!(vertex.property("uri"), Some(&PropertyValue::from("doc://a")));
        let found = tx.find_vertices(VertexKind::Document, "aged", &PropertyValue::Bool(false))?;
        assert_eq!(found, vec![id]);
        tx.rollback()?;
        Ok(())
    }

    #[test]
    fn rollback_discards_writes() -> Result<()> {
        let store = SqliteGraphStore::open_in_memory()?;
        {
            let mut tx = store.begin()?;
            tx.add_vertex(VertexKind::Document, props(&[("uri", "doc://a".into())]))?;
            tx.rollback()?;
        }
        {
            let mut tx = store.begin()?;
            tx.add_vertex(VertexKind::Document, props(&[("uri", "doc://b".into())]))?;
            // dropped without commit
        }
        let mut tx = store.begin()?;
        assert!(tx.vertices_of_kind(VertexKind::Document)?.is_empty());
        tx.commit()?;
        Ok(())
    }

    #[test]
    fn unique_keys_are_scoped_per_kind() -> Result<()> {
        let store = SqliteGraphStore::open_in_memory()?;
        let mut tx = store.begin()?;
        tx.declare_property(&IndexDef::new(
            "name",
            KeyOwner::Vertex,
            DataType::String,
            IndexKind::Unique,
        ))?;
        tx.add_vertex(VertexKind::AgeOffRule, props(&[("name", "pii".into())]))?;
        tx.add_vertex(VertexKind::PurgeEvent, props(&[("name", "pii".into())]))?;
        let duplicate = tx.add_vertex(VertexKind::AgeOffRule, props(&[("name", "pii".into())]));
        assert!(matches!(duplicate, Err(ProvenanceError::Storage(_))));
        tx.rollback()?;
        Ok(())
    }

    #[test]
    fn search_range_tracks_property_updates() -> Result<()> {
        let store = SqliteGraphStore::open_in_memory()?;
        let mut tx = store.begin()?;
        declare(tx.as_mut(), "documentIdSearch", KeyOwner::Vertex, IndexKind::Search);
        let a = tx.add_vertex(VertexKind::Document, props(&[("documentIdSearch", 3.into())]))?;
        let b = tx.add_vertex(VertexKind::Document, props(&[("documentIdSearch", 7.into())]))?;
        let c = tx.add_vertex(VertexKind::Document, Properties::new())?;
        tx.set_vertex_property(c, "documentIdSearch", 5.into())?;

        let top = tx.search_range("documentIdSearch", SearchRange::above(0).descending().limit(1))?;
        assert_eq!(top, vec![SearchHit { vertex_id: b, value: 7 }]);

        let middle = tx.search_range("documentIdSearch", SearchRange::above(3).below(7))?;
        assert_eq!(middle, vec![SearchHit { vertex_id: c, value: 5 }]);

        let all = tx.search_range("documentIdSearch", SearchRange::default())?;
        assert_eq!(all.iter().map(|h| h.vertex_id).collect::<Vec<_>>(), vec![a, c, b]);

        assert!(tx.search_range("documentId", SearchRange::default()).is_err());
        tx.commit()?;
        Ok(())
    }

    #[test]
    fn edges_are_listed_by_direction_and_matched_by_property() -> Result<()> {
        let store = SqliteGraphStore::open_in_memory()?;
        let mut tx = store.begin()?;
        declare(tx.as_mut(), "ruleId", KeyOwner::Edge, IndexKind::Standard);
        let parent = tx.add_vertex(VertexKind::Document, Properties::new())?;
        let child = tx.add_vertex(VertexKind::Document, Properties::new())?;
        let derived = tx.add_edge(EdgeLabel::DerivedFrom, parent, child, Properties::new())?;
        let age_off = tx.add_edge(
            EdgeLabel::AgeOff,
            parent,
            child,
            props(&[("ruleId", 9.into())]),
        )?;

        let out = tx.edges_of(parent, Direction::Outgoing, EdgeLabel::DerivedFrom)?;
        assert_eq!(out.iter().map(|e| e.id).collect::<Vec<_>>(), vec![derived]);
        let incoming = tx.edges_of(child, Direction::Incoming, EdgeLabel::AgeOff)?;
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].source_id, parent);

        let matched = tx.find_edges(EdgeLabel::AgeOff, "ruleId", &PropertyValue::Int(9))?;
        assert_eq!(matched.iter().map(|e| e.id).collect::<Vec<_>>(), vec![age_off]);

        tx.set_edge_property(age_off, "ruleId", 10.into())?;
        assert!(tx.find_edges(EdgeLabel::AgeOff, "ruleId", &PropertyValue::Int(9))?.is_empty());

        tx.remove_edge(age_off)?;
        assert!(tx.edge(age_off)?.is_none());
        assert!(tx.remove_edge(age_off).is_err());
        tx.commit()?;
        Ok(())
    }

    #[test]
    fn savepoint_rollback_keeps_outer_work() -> Result<()> {
        let store = SqliteGraphStore::open_in_memory()?;
        let mut tx = store.begin()?;
        let kept = tx.add_vertex(VertexKind::Document, Properties::new())?;
        tx.savepoint("entry")?;
        tx.add_vertex(VertexKind::Document, Properties::new())?;
        tx.rollback_to_savepoint("entry")?;
        tx.commit()?;

        let mut tx = store.begin()?;
        assert_eq!(tx.vertices_of_kind(VertexKind::Document)?, vec![kept]);
        assert!(tx.savepoint("bad name").is_err());
        tx.rollback()?;
        Ok(())
    }

    #[test]
    fn declared_keys_survive_reopen() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("graph.db");
        {
            let store = SqliteGraphStore::open(&path)?;
            let mut tx = store.begin()?;
            declare(tx.as_mut(), "purgeIdSearch", KeyOwner::Vertex, IndexKind::Search);
            tx.declare_edge_label(EdgeLabel::AgeOff)?;
            tx.commit()?;
        }
        let store = SqliteGraphStore::open(&path)?;
        let mut tx = store.begin()?;
        let def = tx.property_key("purgeIdSearch", KeyOwner::Vertex)?.expect("declared");
        assert_eq!(def.index, IndexKind::Search);
        assert!(tx.edge_label_exists(EdgeLabel::AgeOff)?);
        assert!(!tx.edge_label_exists(EdgeLabel::DerivedFrom)?);
        tx.rollback()?;
        Ok(())
    }
}
