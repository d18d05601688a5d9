//! Error types for the provenance engine.
#![allow(missing_docs)]

use std::io;

use thiserror::Error;

use crate::config::ConfigError;

/// Result alias used throughout the engine.
pub type Result<T> = std::result::Result<T, ProvenanceError>;

/// Coarse classification of a [`ProvenanceError`], stable across variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A document, rule or purge referenced by the caller is absent.
    NotFound,
    /// The caller tried to create something that already exists.
    AlreadyExists,
    /// The request would break a graph or purge invariant.
    InvariantViolation,
    /// The target is in a state that forbids the operation.
    IllegalState,
    /// The storage layer or the id allocator could not be used.
    DependencyUnavailable,
    /// The request itself is malformed.
    InvalidArgument,
    /// Stored data could not be decoded.
    Internal,
}

#[derive(Debug, Error)]
pub enum ProvenanceError {
    #[error("document not found: {0}")]
    DocumentNotFound(String),
    #[error("document already exists: {0}")]
    DocumentExists(String),
    #[error("parent documents not found: {}", .0.join(", "))]
    ParentNotFound(Vec<String>),
    #[error("circular inheritance not allowed: {0}")]
    CircularInheritanceNotAllowed(String),
    #[error("age-off rule not found: {0}")]
    AgeOffRuleNotFound(String),
    #[error("age-off rule name already exists: {0}")]
    AgeOffRuleNameExists(String),
    #[error("age-off rule {rule_id} already applied to document {uri}")]
    AgeOffAlreadyApplied { uri: String, rule_id: i64 },
    #[error("document {uri} already has inheritance from {parent_uri}")]
    AgeOffInheritanceExists { uri: String, parent_uri: String },
    #[error("document already aged: {0}")]
    AlreadyAged(String),
    #[error("purge {0} not found")]
    PurgeNotFound(i64),
    #[error("purge name already exists: {0}")]
    PurgeNameExists(String),
    #[error("documents {ids:?} are not part of purge {purge_id}")]
    DocumentNotInPurge { purge_id: i64, ids: Vec<i64> },
    #[error("document id {id} exceeds allocator high-water mark {high_water}")]
    DocumentIdTooLarge { id: i64, high_water: i64 },
    #[error("batch of {size} documents exceeds the limit of {limit}")]
    ExceedsMaxBatchSize { size: usize, limit: usize },
    #[error("age-off rule name cannot be empty")]
    InvalidRuleName,
    #[error("age-off duration must be positive, got {0} seconds")]
    InvalidDuration(i64),
    #[error("maximum execution period must be between 1 and 90 days, got {0}")]
    InvalidExecutionPeriod(u32),
    #[error("not authorized: {0}")]
    NotAuthorized(String),
    #[error("id allocator unavailable: {0}")]
    AllocatorUnavailable(String),
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("corruption detected: {0}")]
    Corruption(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ProvenanceError {
    /// Maps the error onto the engine's error taxonomy.
    pub fn kind(&self) -> ErrorKind {
        use ProvenanceError::*;
        match self {
            DocumentNotFound(_) | ParentNotFound(_) | AgeOffRuleNotFound(_) | PurgeNotFound(_) => {
                ErrorKind::NotFound
            }
            DocumentExists(_)
            | AgeOffRuleNameExists(_)
            | AgeOffAlreadyApplied { .. }
            | AgeOffInheritanceExists { .. }
            | PurgeNameExists(_) => ErrorKind::AlreadyExists,
            CircularInheritanceNotAllowed(_)
            | DocumentNotInPurge { .. }
            | DocumentIdTooLarge { .. } => ErrorKind::InvariantViolation,
            AlreadyAged(_) | NotAuthorized(_) => ErrorKind::IllegalState,
            AllocatorUnavailable(_) | Storage(_) | Io(_) => ErrorKind::DependencyUnavailable,
            ExceedsMaxBatchSize { .. }
            | InvalidRuleName
            | InvalidDuration(_)
            | InvalidExecutionPeriod(_)
            | InvalidArgument(_)
            | Config(_) => ErrorKind::InvalidArgument,
            Serialization(_) | Corruption(_) => ErrorKind::Internal,
        }
    }
}
