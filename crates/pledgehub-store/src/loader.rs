//! Bootstrap loader.
//!
//! Rebuilds the initial collections from the sharded layout. Loading never
//! fails: a missing or unreadable file contributes an empty list, since the
//! layout is a mirror that the next sync rewrites anyway.

use crate::collections::Collections;
use crate::layout::{DataLayout, SHARD_FILE};
use pledgehub_common::{Collection, Record};
use serde_json::Value;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, info, warn};

/// Read the on-disk layout into a fresh set of collections.
#[must_use]
pub fn load(layout: &DataLayout) -> Collections {
    let mut collections = Collections {
        donations: load_donation_shards(&layout.projects_dir()),
        ..Collections::default()
    };

    for collection in Collection::ALL {
        let Some(path) = layout.collection_file(collection) else {
            continue;
        };
        let records = read_records(&path);
        match collection {
            Collection::Projects => collections.projects = records,
            Collection::Feedback => collections.feedback = records,
            Collection::Admins => collections.admins = records,
            Collection::Donations => {}
        }
    }

    info!(
        "Loaded {} projects, {} donations, {} feedback, {} admins from {}",
        collections.projects.len(),
        collections.donations.len(),
        collections.feedback.len(),
        collections.admins.len(),
        layout.data_dir().display()
    );
    collections
}

/// Concatenate every `projects/<shard>/donations.json`, in shard name order.
fn load_donation_shards(projects_dir: &Path) -> Vec<Record> {
    let entries = match std::fs::read_dir(projects_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("No shard directory at {}", projects_dir.display());
            return Vec::new();
        }
        Err(e) => {
            warn!("Failed to list {}: {}", projects_dir.display(), e);
            return Vec::new();
        }
    };

    let mut shard_dirs: Vec<_> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
        .map(|entry| entry.path())
        .collect();
    shard_dirs.sort();

    shard_dirs
        .iter()
        .flat_map(|dir| read_records(&dir.join(SHARD_FILE)))
        .collect()
}

/// Read a JSON array of objects, degrading to an empty list on any failure.
///
/// Elements that are not objects are dropped.
pub(crate) fn read_records(path: &Path) -> Vec<Record> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("{} not found, starting empty", path.display());
            return Vec::new();
        }
        Err(e) => {
            warn!("Failed to read {}: {}", path.display(), e);
            return Vec::new();
        }
    };

    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Array(items)) => {
            let total = items.len();
            let records: Vec<Record> = items
                .into_iter()
                .filter_map(|item| match item {
                    Value::Object(record) => Some(record),
                    _ => None,
                })
                .collect();
            if records.len() != total {
                warn!(
                    "Dropped {} non-object entries from {}",
                    total - records.len(),
                    path.display()
                );
            }
            records
        }
        Ok(_) => {
            warn!("{} is not a JSON array, ignoring", path.display());
            Vec::new()
        }
        Err(e) => {
            warn!("Failed to parse {}: {}", path.display(), e);
            Vec::new()
        }
    }
}
