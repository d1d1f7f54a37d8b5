//! In-memory collection store.
//!
//! The store is the live source of truth for the REST layer. It is shared
//! as a cloneable handle; the reconciler only ever sees [`Snapshot`]s taken
//! from it, never the live arrays.

use parking_lot::RwLock;
use pledgehub_common::{Collection, Error, ID_FIELD, Record, Result, record_id};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// The four top-level collections.
///
/// Serialises as `{projects, donations, feedback, admins}`, which is also
/// the shape of `db.json`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Collections {
    pub projects: Vec<Record>,
    pub donations: Vec<Record>,
    pub feedback: Vec<Record>,
    pub admins: Vec<Record>,
}

/// Point-in-time copy of the store handed to the reconciler.
pub type Snapshot = Collections;

impl Collections {
    #[must_use]
    pub fn collection(&self, collection: Collection) -> &[Record] {
        match collection {
            Collection::Projects => &self.projects,
            Collection::Donations => &self.donations,
            Collection::Feedback => &self.feedback,
            Collection::Admins => &self.admins,
        }
    }

    fn collection_mut(&mut self, collection: Collection) -> &mut Vec<Record> {
        match collection {
            Collection::Projects => &mut self.projects,
            Collection::Donations => &mut self.donations,
            Collection::Feedback => &mut self.feedback,
            Collection::Admins => &mut self.admins,
        }
    }

    /// Total number of records across all collections
    #[must_use]
    pub fn len(&self) -> usize {
        Collection::ALL
            .iter()
            .map(|c| self.collection(*c).len())
            .sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Shared handle to the live collections
#[derive(Clone, Debug, Default)]
pub struct CollectionStore {
    inner: Arc<RwLock<Collections>>,
}

impl CollectionStore {
    /// Create a store seeded with `initial` (usually the bootstrap load)
    #[must_use]
    pub fn new(initial: Collections) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial)),
        }
    }

    /// Deep copy of the current state
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.inner.read().clone()
    }

    #[must_use]
    pub fn list(&self, collection: Collection) -> Vec<Record> {
        self.inner.read().collection(collection).to_vec()
    }

    #[must_use]
    pub fn get(&self, collection: Collection, id: &str) -> Option<Record> {
        self.inner
            .read()
            .collection(collection)
            .iter()
            .find(|r| record_id(r).as_deref() == Some(id))
            .cloned()
    }

    /// Append a record, generating an id when none was supplied.
    ///
    /// # Errors
    /// `InvalidRequest` if `id` is neither a string, a number nor null;
    /// `Conflict` if a record with the same id already exists.
    pub fn insert(&self, collection: Collection, mut record: Record) -> Result<Record> {
        let id = if matches!(record.get(ID_FIELD), None | Some(Value::Null)) {
            let id = uuid::Uuid::new_v4().simple().to_string();
            record.insert(ID_FIELD.to_string(), Value::String(id.clone()));
            id
        } else {
            record_id(&record)
                .ok_or_else(|| Error::invalid_request("id must be a string or a number"))?
        };

        let mut guard = self.inner.write();
        let records = guard.collection_mut(collection);
        if records.iter().any(|r| record_id(r).as_deref() == Some(id.as_str())) {
            return Err(Error::Conflict { collection, id });
        }
        records.push(record.clone());
        Ok(record)
    }

    /// Replace the record with `id` wholesale (PUT). The stored id is kept.
    ///
    /// # Errors
    /// `NotFound` if no record has this id.
    pub fn replace(&self, collection: Collection, id: &str, mut record: Record) -> Result<Record> {
        let mut guard = self.inner.write();
        let slot = find_mut(guard.collection_mut(collection), collection, id)?;
        if let Some(existing_id) = slot.get(ID_FIELD).cloned() {
            record.insert(ID_FIELD.to_string(), existing_id);
        }
        *slot = record.clone();
        Ok(record)
    }

    /// Shallow-merge `patch` into the record with `id` (PATCH).
    ///
    /// # Errors
    /// `NotFound` if no record has this id.
    pub fn merge(&self, collection: Collection, id: &str, patch: Record) -> Result<Record> {
        let mut guard = self.inner.write();
        let slot = find_mut(guard.collection_mut(collection), collection, id)?;
        for (key, value) in patch {
            if key != ID_FIELD {
                slot.insert(key, value);
            }
        }
        Ok(slot.clone())
    }

    /// Remove and return the record with `id`.
    ///
    /// Removing a project leaves its donations in place; they become
    /// unassigned on the next sync.
    ///
    /// # Errors
    /// `NotFound` if no record has this id.
    pub fn remove(&self, collection: Collection, id: &str) -> Result<Record> {
        let mut guard = self.inner.write();
        let records = guard.collection_mut(collection);
        let pos = records
            .iter()
            .position(|r| record_id(r).as_deref() == Some(id))
            .ok_or_else(|| not_found(collection, id))?;
        Ok(records.remove(pos))
    }
}

fn find_mut<'a>(
    records: &'a mut [Record],
    collection: Collection,
    id: &str,
) -> Result<&'a mut Record> {
    records
        .iter_mut()
        .find(|r| record_id(r).as_deref() == Some(id))
        .ok_or_else(|| not_found(collection, id))
}

fn not_found(collection: Collection, id: &str) -> Error {
    Error::NotFound {
        collection,
        id: id.to_string(),
    }
}
