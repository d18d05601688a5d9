//! Caller identity used to stamp audit fields.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::entity::{from_millis, keys, to_millis};
use crate::error::{ProvenanceError, Result};
use crate::model::{Properties, PropertyValue};

/// Who performed a mutation and when.
///
/// The engine never authenticates this value; it is copied verbatim onto the
/// vertices and edges a call creates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerIdentity {
    pub application: String,
    pub user: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl CallerIdentity {
    /// Identity stamped with the current time.
    pub fn new(application: impl Into<String>, user: impl Into<String>) -> Self {
        Self::at(application, user, OffsetDateTime::now_utc())
    }

    pub fn at(
        application: impl Into<String>,
        user: impl Into<String>,
        timestamp: OffsetDateTime,
    ) -> Self {
        Self {
            application: application.into(),
            user: user.into(),
            timestamp,
        }
    }

    pub(crate) fn stamp(&self, properties: &mut Properties) {
        properties.insert(keys::APPLICATION.into(), self.application.clone().into());
        properties.insert(keys::USER.into(), self.user.clone().into());
        properties.insert(keys::TIMESTAMP.into(), to_millis(self.timestamp).into());
    }

    pub(crate) fn from_properties(properties: &Properties) -> Result<Self> {
        let text = |key: &str| {
            properties
                .get(key)
                .and_then(PropertyValue::as_str)
                .map(str::to_owned)
                .ok_or_else(|| ProvenanceError::Corruption(format!("audit field {key} missing")))
        };
        let millis = properties
            .get(keys::TIMESTAMP)
            .and_then(PropertyValue::as_int)
            .ok_or_else(|| ProvenanceError::Corruption("audit timestamp missing".into()))?;
        Ok(Self {
            application: text(keys::APPLICATION)?,
            user: text(keys::USER)?,
            timestamp: from_millis(millis)?,
        })
    }
}
