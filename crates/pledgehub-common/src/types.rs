//! Core type definitions for PledgeHub
//!
//! Records are schemaless JSON objects so that every field the frontend
//! sends (`title`, `goal`, `donorEmail`, ...) round-trips verbatim. Only the
//! two fields the persistence layer depends on get typed accessors.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// A single stored record (project, donation, feedback entry or admin).
pub type Record = Map<String, Value>;

/// Shard directory that holds donations without a live project.
pub const UNASSIGNED_SHARD: &str = "_unassigned";

/// Field carrying a record's identity.
pub const ID_FIELD: &str = "id";

/// Field on a donation referencing its owning project.
pub const PROJECT_ID_FIELD: &str = "projectId";

/// One of the four top-level named record sets
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Projects,
    Donations,
    Feedback,
    Admins,
}

impl Collection {
    /// All collections, in snapshot order
    pub const ALL: [Self; 4] = [Self::Projects, Self::Donations, Self::Feedback, Self::Admins];

    /// Route and file stem for this collection
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Projects => "projects",
            Self::Donations => "donations",
            Self::Feedback => "feedback",
            Self::Admins => "admins",
        }
    }

    /// Whether this collection is persisted as a single flat file.
    ///
    /// Donations are the only sharded collection.
    #[must_use]
    pub const fn is_flat(self) -> bool {
        !matches!(self, Self::Donations)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a path segment does not name a collection
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown collection: {0}")]
pub struct UnknownCollection(pub String);

impl FromStr for Collection {
    type Err = UnknownCollection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "projects" => Ok(Self::Projects),
            "donations" => Ok(Self::Donations),
            "feedback" => Ok(Self::Feedback),
            "admins" => Ok(Self::Admins),
            other => Err(UnknownCollection(other.to_string())),
        }
    }
}

/// Render a scalar JSON value the way ids are compared.
///
/// Strings are taken as-is and numbers are rendered in decimal, so `1` and
/// `"1"` name the same record. Anything else has no key form.
#[must_use]
pub fn key_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// The record's `id`, if it has a usable one
#[must_use]
pub fn record_id(record: &Record) -> Option<String> {
    record.get(ID_FIELD).and_then(key_string)
}

/// The donation's `projectId`; null, missing and empty references are `None`
#[must_use]
pub fn donation_project_id(record: &Record) -> Option<String> {
    record
        .get(PROJECT_ID_FIELD)
        .and_then(key_string)
        .filter(|id| !id.is_empty())
}
