//! Typed views over stored vertices and edges.
//!
//! Every vertex carries its kind tag; [`Entity::decode`] turns a raw
//! [`Vertex`] into exactly one of the closed set of entity types, and the
//! algorithm layers above only ever work with those.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::error::{ProvenanceError, Result};
use crate::identity::CallerIdentity;
use crate::model::{Edge, EdgeId, Properties, PropertyValue, Vertex, VertexId, VertexKind};

/// Persisted property key names.
pub mod keys {
    pub const APPLICATION: &str = "application";
    pub const USER: &str = "user";
    pub const TIMESTAMP: &str = "timestamp";

    pub const URI: &str = "uri";
    pub const DOCUMENT_ID: &str = "documentId";
    pub const DOCUMENT_ID_SEARCH: &str = "documentIdSearch";
    pub const AGED: &str = "aged";
    pub const INHERITANCE_INFO_LIST: &str = "inheritanceInfoList";
    pub const PARENT_URI: &str = "parentUri";
    pub const INHERIT_PARENT_AGE_OFF: &str = "inheritParentAgeOff";
    pub const TRACK_PARENT_AGE_OFF: &str = "trackParentAgeOff";

    pub const RULE_ID: &str = "ruleId";
    pub const RULE_ID_SEARCH: &str = "ruleIdSearch";
    pub const NAME: &str = "name";
    pub const DURATION: &str = "duration";
    pub const MAXIMUM_EXECUTION_PERIOD: &str = "maximumExecutionPeriod";
    pub const AGE_OFF_RELEVANT_DATE_TIME: &str = "ageOffRelevantDateTime";

    pub const PURGE_ID: &str = "purgeId";
    pub const PURGE_ID_SEARCH: &str = "purgeIdSearch";
    pub const DESCRIPTION: &str = "description";
    pub const DOCUMENT_URIS: &str = "documentUris";
    pub const DOCUMENT_URIS_NOT_FOUND: &str = "documentUrisNotFound";
    pub const PURGE_DOCUMENT_IDS: &str = "purgeDocumentIds";
    pub const COMPLETELY_PURGED_DOCUMENT_IDS: &str = "completelyPurgedDocumentIds";
    pub const RESOLVED: &str = "resolved";

    pub const EVENT_MAX_ID: &str = "eventMaxId";
}

pub(crate) fn to_millis(at: OffsetDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000_000) as i64
}

pub(crate) fn from_millis(millis: i64) -> Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
        .map_err(|err| ProvenanceError::Corruption(format!("timestamp {millis} out of range: {err}")))
}

/// Retention rule applied to a document together with its relevant date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeOffMapping {
    pub rule_id: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub relevant_date: OffsetDateTime,
}

impl AgeOffMapping {
    pub fn new(rule_id: i64, relevant_date: OffsetDateTime) -> Self {
        Self {
            rule_id,
            relevant_date,
        }
    }
}

/// One parent relationship of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InheritanceInfo {
    pub parent_uri: String,
    /// Copy the parent's rules when the relationship is created.
    pub inherit_parent_age_off: bool,
    /// Keep following later rule changes on the parent.
    pub track_parent_age_off: bool,
    /// Relevant date used for inherited edges instead of the parent's.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub age_off_relevant_date: Option<OffsetDateTime>,
}

impl InheritanceInfo {
    pub fn new(parent_uri: impl Into<String>, inherit: bool, track: bool) -> Self {
        Self {
            parent_uri: parent_uri.into(),
            inherit_parent_age_off: inherit,
            track_parent_age_off: track,
            age_off_relevant_date: None,
        }
    }

    /// Inherits and tracks every rule of `parent_uri`.
    pub fn inheriting(parent_uri: impl Into<String>) -> Self {
        Self::new(parent_uri, true, true)
    }

    pub fn with_relevant_date(mut self, date: OffsetDateTime) -> Self {
        self.age_off_relevant_date = Some(date);
        self
    }

    fn to_value(&self) -> PropertyValue {
        let mut map = BTreeMap::new();
        map.insert(keys::PARENT_URI.to_owned(), self.parent_uri.clone().into());
        map.insert(
            keys::INHERIT_PARENT_AGE_OFF.to_owned(),
            self.inherit_parent_age_off.into(),
        );
        map.insert(
            keys::TRACK_PARENT_AGE_OFF.to_owned(),
            self.track_parent_age_off.into(),
        );
        if let Some(date) = self.age_off_relevant_date {
            map.insert(
                keys::AGE_OFF_RELEVANT_DATE_TIME.to_owned(),
                to_millis(date).into(),
            );
        }
        PropertyValue::Map(map)
    }

    fn from_value(value: &PropertyValue) -> Result<Self> {
        let map = value
            .as_map()
            .ok_or_else(|| ProvenanceError::Corruption("inheritance entry is not a record".into()))?;
        let flag = |key: &str| map.get(key).and_then(PropertyValue::as_bool).unwrap_or(false);
        let parent_uri = map
            .get(keys::PARENT_URI)
            .and_then(PropertyValue::as_str)
            .ok_or_else(|| ProvenanceError::Corruption("inheritance entry without parentUri".into()))?;
        let age_off_relevant_date = map
            .get(keys::AGE_OFF_RELEVANT_DATE_TIME)
            .and_then(PropertyValue::as_int)
            .map(from_millis)
            .transpose()?;
        Ok(Self {
            parent_uri: parent_uri.to_owned(),
            inherit_parent_age_off: flag(keys::INHERIT_PARENT_AGE_OFF),
            track_parent_age_off: flag(keys::TRACK_PARENT_AGE_OFF),
            age_off_relevant_date,
        })
    }
}

pub(crate) fn inheritance_value(list: &[InheritanceInfo]) -> PropertyValue {
    PropertyValue::List(list.iter().map(InheritanceInfo::to_value).collect())
}

/// A tracked document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    #[serde(skip)]
    pub vertex_id: VertexId,
    pub document_id: i64,
    pub uri: String,
    pub aged: bool,
    pub inheritance: Vec<InheritanceInfo>,
    pub created: CallerIdentity,
}

impl Document {
    pub(crate) fn new_properties(uri: &str, document_id: i64, identity: &CallerIdentity) -> Properties {
        let mut props = Properties::new();
        props.insert(keys::URI.into(), uri.into());
        props.insert(keys::DOCUMENT_ID.into(), document_id.into());
        props.insert(keys::DOCUMENT_ID_SEARCH.into(), document_id.into());
        props.insert(keys::AGED.into(), false.into());
        props.insert(keys::INHERITANCE_INFO_LIST.into(), PropertyValue::List(Vec::new()));
        identity.stamp(&mut props);
        props
    }

    fn from_vertex(vertex: &Vertex) -> Result<Self> {
        let props = &vertex.properties;
        let inheritance = match props.get(keys::INHERITANCE_INFO_LIST) {
            Some(value) => value
                .as_list()
                .ok_or_else(|| corrupt(vertex, keys::INHERITANCE_INFO_LIST))?
                .iter()
                .map(InheritanceInfo::from_value)
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };
        Ok(Self {
            vertex_id: vertex.id,
            document_id: required_int(vertex, keys::DOCUMENT_ID)?,
            uri: required_str(vertex, keys::URI)?,
            aged: flag(props, keys::AGED),
            inheritance,
            created: CallerIdentity::from_properties(props)?,
        })
    }

    /// The inheritance entry for `parent_uri`, if that document is a parent.
    pub fn inheritance_from(&self, parent_uri: &str) -> Option<&InheritanceInfo> {
        self.inheritance.iter().find(|info| info.parent_uri == parent_uri)
    }
}

/// A retention rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgeOffRule {
    #[serde(skip)]
    pub vertex_id: VertexId,
    pub rule_id: i64,
    pub name: String,
    #[serde(with = "duration_seconds")]
    pub duration: Duration,
    /// Days allowed for a purge under this rule to finish.
    pub maximum_execution_period: u32,
    pub created: CallerIdentity,
}

impl AgeOffRule {
    pub(crate) fn new_properties(
        rule_id: i64,
        name: &str,
        duration: Duration,
        maximum_execution_period: u32,
        identity: &CallerIdentity,
    ) -> Properties {
        let mut props = Properties::new();
        props.insert(keys::RULE_ID.into(), rule_id.into());
        props.insert(keys::RULE_ID_SEARCH.into(), rule_id.into());
        props.insert(keys::NAME.into(), name.into());
        props.insert(keys::DURATION.into(), duration.whole_seconds().into());
        props.insert(
            keys::MAXIMUM_EXECUTION_PERIOD.into(),
            i64::from(maximum_execution_period).into(),
        );
        identity.stamp(&mut props);
        props
    }

    fn from_vertex(vertex: &Vertex) -> Result<Self> {
        let period = required_int(vertex, keys::MAXIMUM_EXECUTION_PERIOD)?;
        Ok(Self {
            vertex_id: vertex.id,
            rule_id: required_int(vertex, keys::RULE_ID)?,
            name: required_str(vertex, keys::NAME)?,
            duration: Duration::seconds(required_int(vertex, keys::DURATION)?),
            maximum_execution_period: u32::try_from(period)
                .map_err(|_| corrupt(vertex, keys::MAXIMUM_EXECUTION_PERIOD))?,
            created: CallerIdentity::from_properties(&vertex.properties)?,
        })
    }
}

/// A purge campaign.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PurgeEvent {
    #[serde(skip)]
    pub vertex_id: VertexId,
    pub purge_id: i64,
    pub name: String,
    pub description: String,
    pub document_uris: Vec<String>,
    pub document_uris_not_found: Vec<String>,
    pub purge_document_ids: BTreeSet<i64>,
    pub completely_purged_document_ids: BTreeSet<i64>,
    pub resolved: bool,
    pub created: CallerIdentity,
}

impl PurgeEvent {
    pub(crate) fn to_properties(&self) -> Properties {
        let mut props = Properties::new();
        props.insert(keys::PURGE_ID.into(), self.purge_id.into());
        props.insert(keys::PURGE_ID_SEARCH.into(), self.purge_id.into());
        props.insert(keys::NAME.into(), self.name.clone().into());
        props.insert(keys::DESCRIPTION.into(), self.description.clone().into());
        props.insert(keys::DOCUMENT_URIS.into(), self.document_uris.clone().into());
        props.insert(
            keys::DOCUMENT_URIS_NOT_FOUND.into(),
            self.document_uris_not_found.clone().into(),
        );
        props.insert(keys::PURGE_DOCUMENT_IDS.into(), id_list(&self.purge_document_ids));
        props.insert(
            keys::COMPLETELY_PURGED_DOCUMENT_IDS.into(),
            id_list(&self.completely_purged_document_ids),
        );
        props.insert(keys::RESOLVED.into(), self.resolved.into());
        self.created.stamp(&mut props);
        props
    }

    fn from_vertex(vertex: &Vertex) -> Result<Self> {
        let props = &vertex.properties;
        Ok(Self {
            vertex_id: vertex.id,
            purge_id: required_int(vertex, keys::PURGE_ID)?,
            name: required_str(vertex, keys::NAME)?,
            description: props
                .get(keys::DESCRIPTION)
                .and_then(PropertyValue::as_str)
                .unwrap_or_default()
                .to_owned(),
            document_uris: str_list(vertex, keys::DOCUMENT_URIS)?,
            document_uris_not_found: str_list(vertex, keys::DOCUMENT_URIS_NOT_FOUND)?,
            purge_document_ids: id_set(vertex, keys::PURGE_DOCUMENT_IDS)?,
            completely_purged_document_ids: id_set(vertex, keys::COMPLETELY_PURGED_DOCUMENT_IDS)?,
            resolved: flag(props, keys::RESOLVED),
            created: CallerIdentity::from_properties(props)?,
        })
    }
}

pub(crate) fn id_list(ids: &BTreeSet<i64>) -> PropertyValue {
    PropertyValue::List(ids.iter().copied().map(PropertyValue::Int).collect())
}

/// Bookkeeping singleton for the shared purge and age-off event sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgeOffEventRecord {
    pub vertex_id: VertexId,
    pub event_max_id: i64,
}

impl AgeOffEventRecord {
    fn from_vertex(vertex: &Vertex) -> Result<Self> {
        Ok(Self {
            vertex_id: vertex.id,
            event_max_id: required_int(vertex, keys::EVENT_MAX_ID)?,
        })
    }
}

/// Decoded AgeOff edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgeOffEdge {
    pub edge_id: EdgeId,
    /// Rule vertex for explicit edges, ancestor document vertex for inherited ones.
    pub source_id: VertexId,
    pub target_id: VertexId,
    pub rule_id: i64,
    pub relevant_date: OffsetDateTime,
}

impl AgeOffEdge {
    pub(crate) fn new_properties(
        rule_id: i64,
        relevant_date: OffsetDateTime,
        identity: &CallerIdentity,
    ) -> Properties {
        let mut props = Properties::new();
        props.insert(keys::RULE_ID.into(), rule_id.into());
        props.insert(
            keys::AGE_OFF_RELEVANT_DATE_TIME.into(),
            to_millis(relevant_date).into(),
        );
        identity.stamp(&mut props);
        props
    }

    pub(crate) fn from_edge(edge: &Edge) -> Result<Self> {
        let int = |key: &str| {
            edge.property(key).and_then(PropertyValue::as_int).ok_or_else(|| {
                ProvenanceError::Corruption(format!("AgeOff edge {} missing {key}", edge.id))
            })
        };
        Ok(Self {
            edge_id: edge.id,
            source_id: edge.source_id,
            target_id: edge.target_id,
            rule_id: int(keys::RULE_ID)?,
            relevant_date: from_millis(int(keys::AGE_OFF_RELEVANT_DATE_TIME)?)?,
        })
    }
}

/// Closed set of vertex entity types.
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Document(Document),
    AgeOffRule(AgeOffRule),
    PurgeEvent(PurgeEvent),
    AgeOffEvent(AgeOffEventRecord),
}

impl Entity {
    /// Decodes a vertex according to its kind tag.
    pub fn decode(vertex: &Vertex) -> Result<Self> {
        Ok(match vertex.kind {
            VertexKind::Document => Entity::Document(Document::from_vertex(vertex)?),
            VertexKind::AgeOffRule => Entity::AgeOffRule(AgeOffRule::from_vertex(vertex)?),
            VertexKind::PurgeEvent => Entity::PurgeEvent(PurgeEvent::from_vertex(vertex)?),
            VertexKind::AgeOffEvent => Entity::AgeOffEvent(AgeOffEventRecord::from_vertex(vertex)?),
        })
    }

    pub fn kind(&self) -> VertexKind {
        match self {
            Entity::Document(_) => VertexKind::Document,
            Entity::AgeOffRule(_) => VertexKind::AgeOffRule,
            Entity::PurgeEvent(_) => VertexKind::PurgeEvent,
            Entity::AgeOffEvent(_) => VertexKind::AgeOffEvent,
        }
    }

    pub(crate) fn into_document(self) -> Result<Document> {
        match self {
            Entity::Document(doc) => Ok(doc),
            other => Err(mismatch(VertexKind::Document, other.kind())),
        }
    }

    pub(crate) fn into_rule(self) -> Result<AgeOffRule> {
        match self {
            Entity::AgeOffRule(rule) => Ok(rule),
            other => Err(mismatch(VertexKind::AgeOffRule, other.kind())),
        }
    }

    pub(crate) fn into_purge(self) -> Result<PurgeEvent> {
        match self {
            Entity::PurgeEvent(purge) => Ok(purge),
            other => Err(mismatch(VertexKind::PurgeEvent, other.kind())),
        }
    }

    pub(crate) fn into_event(self) -> Result<AgeOffEventRecord> {
        match self {
            Entity::AgeOffEvent(event) => Ok(event),
            other => Err(mismatch(VertexKind::AgeOffEvent, other.kind())),
        }
    }
}

fn mismatch(expected: VertexKind, found: VertexKind) -> ProvenanceError {
    ProvenanceError::Corruption(format!("expected a {expected} vertex, found {found}"))
}

fn corrupt(vertex: &Vertex, key: &str) -> ProvenanceError {
    ProvenanceError::Corruption(format!(
        "{} vertex {} has a missing or malformed {key}",
        vertex.kind, vertex.id
    ))
}

fn required_int(vertex: &Vertex, key: &str) -> Result<i64> {
    vertex
        .property(key)
        .and_then(PropertyValue::as_int)
        .ok_or_else(|| corrupt(vertex, key))
}

fn required_str(vertex: &Vertex, key: &str) -> Result<String> {
    vertex
        .property(key)
        .and_then(PropertyValue::as_str)
        .map(str::to_owned)
        .ok_or_else(|| corrupt(vertex, key))
}

fn flag(props: &Properties, key: &str) -> bool {
    props.get(key).and_then(PropertyValue::as_bool).unwrap_or(false)
}

fn str_list(vertex: &Vertex, key: &str) -> Result<Vec<String>> {
    let Some(value) = vertex.property(key) else {
        return Ok(Vec::new());
    };
    value
        .as_list()
        .ok_or_else(|| corrupt(vertex, key))?
        .iter()
        .map(|item| item.as_str().map(str::to_owned).ok_or_else(|| corrupt(vertex, key)))
        .collect()
}

fn id_set(vertex: &Vertex, key: &str) -> Result<BTreeSet<i64>> {
    let Some(value) = vertex.property(key) else {
        return Ok(BTreeSet::new());
    };
    value
        .as_list()
        .ok_or_else(|| corrupt(vertex, key))?
        .iter()
        .map(|item| item.as_int().ok_or_else(|| corrupt(vertex, key)))
        .collect()
}

mod duration_seconds {
    use serde::Serializer;
    use time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(duration.whole_seconds())
    }
}
