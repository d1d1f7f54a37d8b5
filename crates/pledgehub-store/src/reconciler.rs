//! Shard reconciler.
//!
//! Rewrites the on-disk layout so it matches a snapshot of the store:
//!
//! 1. ensure `collections/` and `projects/` exist
//! 2. write the flat collection files
//! 3. partition donations by live project id
//! 4. write `projects/<id>/donations.json` for every live project
//! 5. write or remove `projects/_unassigned/`
//! 6. prune shard directories of projects that no longer exist
//! 7. write the merged `db.json`
//!
//! Projects whose id cannot name a directory, or whose shard path is taken
//! by a non-directory entry, get no shard; their donations are unassigned.
//! The partition is computed before anything is deleted, and pruning scans
//! the existing directory listing rather than the desired one. Writes are
//! not transactional: a pass that fails part-way leaves a mixed layout, which
//! the lenient loader tolerates and the next pass repairs.

use crate::collections::Snapshot;
use crate::layout::{DataLayout, is_valid_shard_name};
use crate::scope::SyncScope;
use pledgehub_common::{
    Collection, Error, Record, Result, UNASSIGNED_SHARD, donation_project_id, record_id,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, warn};

/// Donations split by owning project
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Partition {
    /// One entry per live project, possibly empty
    pub by_project: BTreeMap<String, Vec<Record>>,
    /// Donations with no live project
    pub unassigned: Vec<Record>,
}

/// Partition the snapshot's donations by project.
///
/// A donation belongs to a shard iff its `projectId` names a current project
/// that can own a shard directory; everything else is unassigned. Order
/// within each list follows the donations array.
#[must_use]
pub fn partition(snapshot: &Snapshot) -> Partition {
    let mut by_project: BTreeMap<String, Vec<Record>> = snapshot
        .projects
        .iter()
        .filter_map(record_id)
        .filter(|id| is_valid_shard_name(id))
        .map(|id| (id, Vec::new()))
        .collect();
    let mut unassigned = Vec::new();

    for donation in &snapshot.donations {
        let shard = match donation_project_id(donation) {
            Some(id) => by_project.get_mut(&id),
            None => None,
        };
        match shard {
            Some(shard) => shard.push(donation.clone()),
            None => unassigned.push(donation.clone()),
        }
    }

    Partition {
        by_project,
        unassigned,
    }
}

/// Summary of one sync pass
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Whether the pass reconciled shards or only flat collections
    pub full: bool,
    pub projects: usize,
    pub shards_written: usize,
    pub donations_assigned: usize,
    pub unassigned: usize,
    /// Stale shard directories removed
    pub pruned: Vec<String>,
    pub unassigned_removed: bool,
}

/// Writes snapshots to a [`DataLayout`]
#[derive(Clone, Debug)]
pub struct Reconciler {
    layout: DataLayout,
}

impl Reconciler {
    #[must_use]
    pub const fn new(layout: DataLayout) -> Self {
        Self { layout }
    }

    #[must_use]
    pub const fn layout(&self) -> &DataLayout {
        &self.layout
    }

    /// Full reconciliation pass.
    ///
    /// # Errors
    /// Returns the first filesystem or serialization failure. Earlier steps
    /// of the pass are not rolled back.
    pub fn sync(&self, snapshot: &Snapshot) -> Result<SyncReport> {
        let layout = &self.layout;
        create_dir_all(&layout.collections_dir())?;
        create_dir_all(&layout.projects_dir())?;

        for collection in Collection::ALL {
            self.write_collection(snapshot, collection)?;
        }

        let Partition {
            mut by_project,
            mut unassigned,
        } = partition(snapshot);

        // A stray file sitting where a shard directory belongs is kept, and
        // that project's donations are parked with the unassigned ones.
        by_project.retain(|id, donations| {
            let blocked = std::fs::symlink_metadata(layout.shard_dir(id))
                .is_ok_and(|meta| !meta.is_dir());
            if blocked {
                warn!(
                    "Shard path for project {} is not a directory, treating as unassigned",
                    id
                );
                unassigned.append(donations);
            }
            !blocked
        });

        let mut report = SyncReport {
            full: true,
            projects: snapshot.projects.len(),
            unassigned: unassigned.len(),
            ..SyncReport::default()
        };

        for (id, donations) in &by_project {
            create_dir_all(&layout.shard_dir(id))?;
            write_json(&layout.shard_file(id), donations)?;
            debug!("Wrote {} donations to shard {}", donations.len(), id);
            report.shards_written += 1;
            report.donations_assigned += donations.len();
        }

        if unassigned.is_empty() {
            report.unassigned_removed = remove_dir_forced(&layout.unassigned_dir())?;
        } else {
            create_dir_all(&layout.unassigned_dir())?;
            write_json(&layout.shard_file(UNASSIGNED_SHARD), &unassigned)?;
            debug!("Wrote {} unassigned donations", unassigned.len());
        }

        report.pruned = self.prune_stale_shards(&by_project)?;

        write_json(&layout.db_snapshot(), snapshot)?;
        Ok(report)
    }

    /// Pass limited to `scope`; a full scope runs [`Reconciler::sync`].
    ///
    /// # Errors
    /// See [`Reconciler::sync`].
    pub fn sync_scoped(&self, snapshot: &Snapshot, scope: &SyncScope) -> Result<SyncReport> {
        let collections = match scope {
            SyncScope::Flat(collections)
                if collections
                    .iter()
                    .all(|c| c.is_flat() && *c != Collection::Projects) =>
            {
                collections
            }
            _ => return self.sync(snapshot),
        };

        create_dir_all(&self.layout.collections_dir())?;
        for collection in collections {
            self.write_collection(snapshot, *collection)?;
        }
        write_json(&self.layout.db_snapshot(), snapshot)?;

        Ok(SyncReport {
            full: false,
            projects: snapshot.projects.len(),
            ..SyncReport::default()
        })
    }

    fn write_collection(&self, snapshot: &Snapshot, collection: Collection) -> Result<()> {
        match self.layout.collection_file(collection) {
            Some(path) => write_json(&path, snapshot.collection(collection)),
            None => Ok(()),
        }
    }

    /// Remove every directory under `projects/` that is neither the
    /// unassigned bucket nor a live shard.
    fn prune_stale_shards(&self, live: &BTreeMap<String, Vec<Record>>) -> Result<Vec<String>> {
        let projects_dir = self.layout.projects_dir();
        let entries =
            std::fs::read_dir(&projects_dir).map_err(|e| Error::io(&projects_dir, e))?;

        let mut pruned = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::io(&projects_dir, e))?;
            let is_dir = entry
                .file_type()
                .map_err(|e| Error::io(entry.path(), e))?
                .is_dir();
            if !is_dir {
                continue;
            }

            let name = entry.file_name().to_string_lossy().into_owned();
            if name == UNASSIGNED_SHARD || live.contains_key(&name) {
                continue;
            }
            if remove_dir_forced(&entry.path())? {
                debug!("Pruned stale shard {}", name);
                pruned.push(name);
            }
        }
        pruned.sort();
        Ok(pruned)
    }
}

fn create_dir_all(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| Error::io(path, e))
}

/// Pretty-printed JSON, overwriting whatever is there.
fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|e| Error::json(path, e))?;
    std::fs::write(path, bytes).map_err(|e| Error::io(path, e))
}

/// `rm -rf`: a missing directory is not an error. Returns whether anything
/// was removed.
fn remove_dir_forced(path: &Path) -> Result<bool> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collections::Collections;
    use crate::loader;
    use serde_json::{Value, json};
    use std::collections::BTreeSet;
    use std::fs;
    use tempfile::tempdir;

    fn records(value: Value) -> Vec<Record> {
        serde_json::from_value(value).unwrap()
    }

    fn read_json(path: &Path) -> Value {
        serde_json::from_slice(&fs::read(path).unwrap()).unwrap()
    }

    fn shard_names(layout: &DataLayout) -> BTreeSet<String> {
        fs::read_dir(layout.projects_dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }

    /// Every file under the data root, with its bytes
    fn tree(root: &Path) -> BTreeMap<String, Vec<u8>> {
        fn walk(dir: &Path, root: &Path, out: &mut BTreeMap<String, Vec<u8>>) {
            for entry in fs::read_dir(dir).unwrap() {
                let path = entry.unwrap().path();
                let rel = path.strip_prefix(root).unwrap().display().to_string();
                if path.is_dir() {
                    out.insert(format!("{rel}/"), Vec::new());
                    walk(&path, root, out);
                } else {
                    out.insert(rel, fs::read(&path).unwrap());
                }
            }
        }
        let mut out = BTreeMap::new();
        walk(root, root, &mut out);
        out
    }

    #[test]
    fn test_partition_assigns_each_donation_once() {
        let snapshot = Collections {
            projects: records(json!([{"id": "p1"}, {"id": "p2"}, {"id": 3}])),
            donations: records(json!([
                {"id": "d1", "projectId": "p1"},
                {"id": "d2", "projectId": "p-missing"},
                {"id": "d3", "projectId": 3},
                {"id": "d4"},
                {"id": "d5", "projectId": "p1"},
                {"id": "d6", "projectId": null},
            ])),
            ..Default::default()
        };

        let partition = partition(&snapshot);
        assert_eq!(
            partition.by_project.keys().cloned().collect::<Vec<_>>(),
            vec!["3", "p1", "p2"]
        );
        assert_eq!(partition.by_project["p1"], records(json!([
            {"id": "d1", "projectId": "p1"},
            {"id": "d5", "projectId": "p1"},
        ])));
        assert!(partition.by_project["p2"].is_empty());
        assert_eq!(partition.by_project["3"].len(), 1);

        let unassigned: Vec<_> = partition.unassigned.iter().map(|d| d["id"].clone()).collect();
        assert_eq!(unassigned, vec![json!("d2"), json!("d4"), json!("d6")]);

        let total: usize = partition.by_project.values().map(Vec::len).sum::<usize>()
            + partition.unassigned.len();
        assert_eq!(total, snapshot.donations.len());
    }

    #[test]
    fn test_partition_ignores_unsafe_project_ids() {
        let snapshot = Collections {
            projects: records(json!([{"id": "../escape"}, {"id": "_unassigned"}])),
            donations: records(json!([{"id": "d1", "projectId": "../escape"}])),
            ..Default::default()
        };
        let partition = partition(&snapshot);
        assert!(partition.by_project.is_empty());
        assert_eq!(partition.unassigned.len(), 1);
    }

    #[test]
    fn test_create_then_sync() {
        let dir = tempdir().unwrap();
        let layout = DataLayout::new(dir.path(), "data");
        let reconciler = Reconciler::new(layout.clone());

        let mut snapshot = Collections {
            projects: records(json!([{"id": "p1", "title": "Clean water"}])),
            ..Default::default()
        };
        snapshot
            .donations
            .extend(records(json!([{"id": "d1", "projectId": "p1", "amount": 500}])));

        let report = reconciler.sync(&snapshot).unwrap();
        assert_eq!(report.shards_written, 1);
        assert_eq!(report.unassigned, 0);

        assert_eq!(
            read_json(&layout.shard_file("p1")),
            json!([{"id": "d1", "projectId": "p1", "amount": 500}])
        );
        assert!(!layout.unassigned_dir().exists());
        assert_eq!(
            read_json(&layout.collection_file(Collection::Projects).unwrap()),
            json!([{"id": "p1", "title": "Clean water"}])
        );
        assert_eq!(
            read_json(&layout.collection_file(Collection::Feedback).unwrap()),
            json!([])
        );
    }

    #[test]
    fn test_orphaned_donation() {
        let dir = tempdir().unwrap();
        let layout = DataLayout::new(dir.path(), "data");
        let reconciler = Reconciler::new(layout.clone());

        let snapshot = Collections {
            donations: records(json!([{"id": "d1", "projectId": "p-missing", "amount": 100}])),
            ..Default::default()
        };
        reconciler.sync(&snapshot).unwrap();

        assert_eq!(
            read_json(&layout.shard_file(UNASSIGNED_SHARD)),
            json!([{"id": "d1", "projectId": "p-missing", "amount": 100}])
        );
        assert!(!layout.shard_dir("p-missing").exists());
    }

    #[test]
    fn test_project_deletion_moves_donations_to_unassigned() {
        let dir = tempdir().unwrap();
        let layout = DataLayout::new(dir.path(), "data");
        let reconciler = Reconciler::new(layout.clone());

        let mut snapshot = Collections {
            projects: records(json!([{"id": "p1"}])),
            donations: records(json!([{"id": "d1", "projectId": "p1", "amount": 20}])),
            ..Default::default()
        };
        reconciler.sync(&snapshot).unwrap();
        assert_eq!(read_json(&layout.shard_file("p1")).as_array().unwrap().len(), 1);

        snapshot.projects.clear();
        let report = reconciler.sync(&snapshot).unwrap();

        assert_eq!(report.pruned, vec!["p1".to_string()]);
        assert!(!layout.shard_dir("p1").exists());
        assert_eq!(
            read_json(&layout.shard_file(UNASSIGNED_SHARD)),
            json!([{"id": "d1", "projectId": "p1", "amount": 20}])
        );
    }

    #[test]
    fn test_unassigned_dir_removed_when_empty() {
        let dir = tempdir().unwrap();
        let layout = DataLayout::new(dir.path(), "data");
        let reconciler = Reconciler::new(layout.clone());

        let mut snapshot = Collections {
            donations: records(json!([{"id": "d1", "projectId": "p1"}])),
            ..Default::default()
        };
        reconciler.sync(&snapshot).unwrap();
        assert!(layout.unassigned_dir().exists());

        // project shows up, so the donation is assigned again
        snapshot.projects = records(json!([{"id": "p1"}]));
        let report = reconciler.sync(&snapshot).unwrap();

        assert!(report.unassigned_removed);
        assert!(!layout.unassigned_dir().exists());
        assert_eq!(
            shard_names(&layout),
            BTreeSet::from(["p1".to_string()])
        );
    }

    #[test]
    fn test_live_project_without_donations_gets_empty_shard() {
        let dir = tempdir().unwrap();
        let layout = DataLayout::new(dir.path(), "data");
        let reconciler = Reconciler::new(layout.clone());

        let snapshot = Collections {
            projects: records(json!([{"id": "p1"}, {"id": "p2"}])),
            ..Default::default()
        };
        reconciler.sync(&snapshot).unwrap();

        assert_eq!(read_json(&layout.shard_file("p1")), json!([]));
        assert_eq!(read_json(&layout.shard_file("p2")), json!([]));
    }

    #[test]
    fn test_prune_leaves_files_alone() {
        let dir = tempdir().unwrap();
        let layout = DataLayout::new(dir.path(), "data");
        let reconciler = Reconciler::new(layout.clone());

        fs::create_dir_all(layout.shard_dir("old")).unwrap();
        fs::write(layout.shard_file("old"), "[]").unwrap();
        fs::write(layout.projects_dir().join("notes.txt"), "keep").unwrap();

        let report = reconciler.sync(&Collections::default()).unwrap();
        assert_eq!(report.pruned, vec!["old".to_string()]);
        assert_eq!(
            shard_names(&layout),
            BTreeSet::from(["notes.txt".to_string()])
        );
    }

    #[test]
    fn test_unusable_shard_names_do_not_abort_the_pass() {
        let dir = tempdir().unwrap();
        let layout = DataLayout::new(dir.path(), "data");
        let reconciler = Reconciler::new(layout.clone());

        fs::create_dir_all(layout.projects_dir()).unwrap();
        fs::write(layout.projects_dir().join("notes.txt"), "keep").unwrap();

        let long_id = "x".repeat(300);
        let snapshot = Collections {
            projects: records(json!([{"id": "p1"}, {"id": long_id}, {"id": "notes.txt"}])),
            donations: records(json!([
                {"id": "d1", "projectId": "p1"},
                {"id": "d2", "projectId": long_id},
                {"id": "d3", "projectId": "notes.txt"},
            ])),
            ..Default::default()
        };
        let report = reconciler.sync(&snapshot).unwrap();

        assert_eq!(report.shards_written, 1);
        assert_eq!(report.unassigned, 2);
        assert_eq!(
            read_json(&layout.shard_file("p1")),
            json!([{"id": "d1", "projectId": "p1"}])
        );
        assert_eq!(
            read_json(&layout.shard_file(UNASSIGNED_SHARD)),
            json!([
                {"id": "d2", "projectId": long_id},
                {"id": "d3", "projectId": "notes.txt"},
            ])
        );
        assert_eq!(
            fs::read_to_string(layout.projects_dir().join("notes.txt")).unwrap(),
            "keep"
        );
        assert_eq!(
            read_json(&layout.db_snapshot()),
            serde_json::to_value(&snapshot).unwrap()
        );

        // and the next pass still converges
        let report = reconciler.sync(&snapshot).unwrap();
        assert!(report.pruned.is_empty());
    }

    #[test]
    fn test_sync_is_idempotent() {
        let dir = tempdir().unwrap();
        let layout = DataLayout::new(dir.path(), "data");
        let reconciler = Reconciler::new(layout);

        let snapshot = Collections {
            projects: records(json!([{"id": "p1", "goal": 1000}, {"id": "p2"}])),
            donations: records(json!([
                {"id": "d1", "projectId": "p1", "amount": 10},
                {"id": "d2", "projectId": "zzz", "amount": 3},
            ])),
            feedback: records(json!([{"id": "f1", "message": "great"}])),
            admins: records(json!([{"id": "a1"}])),
        };

        reconciler.sync(&snapshot).unwrap();
        let first = tree(dir.path());
        let report = reconciler.sync(&snapshot).unwrap();
        let second = tree(dir.path());

        assert_eq!(first, second);
        assert!(report.pruned.is_empty());
        assert!(!report.unassigned_removed);
    }

    #[test]
    fn test_db_snapshot_and_reload() {
        let dir = tempdir().unwrap();
        let layout = DataLayout::new(dir.path(), "data");
        let reconciler = Reconciler::new(layout.clone());

        let snapshot = Collections {
            projects: records(json!([{"id": "p1"}])),
            donations: records(json!([
                {"id": "d1", "projectId": "p1"},
                {"id": "d2", "projectId": "nope"},
            ])),
            feedback: records(json!([{"id": "f1"}])),
            admins: records(json!([{"id": "a1"}])),
        };
        reconciler.sync(&snapshot).unwrap();

        assert_eq!(
            read_json(&layout.db_snapshot()),
            serde_json::to_value(&snapshot).unwrap()
        );

        let reloaded = loader::load(&layout);
        assert_eq!(reloaded.projects, snapshot.projects);
        assert_eq!(reloaded.feedback, snapshot.feedback);
        assert_eq!(reloaded.admins, snapshot.admins);
        assert_eq!(reloaded.donations.len(), 2);
    }

    #[test]
    fn test_scoped_sync_leaves_shards_untouched() {
        let dir = tempdir().unwrap();
        let layout = DataLayout::new(dir.path(), "data");
        let reconciler = Reconciler::new(layout.clone());

        // stale shard that only a full pass would prune
        fs::create_dir_all(layout.shard_dir("stale")).unwrap();

        let snapshot = Collections {
            feedback: records(json!([{"id": "f1", "message": "thanks"}])),
            ..Default::default()
        };
        let scope = SyncScope::for_collection(Collection::Feedback, true);
        let report = reconciler.sync_scoped(&snapshot, &scope).unwrap();

        assert!(!report.full);
        assert!(layout.shard_dir("stale").exists());
        assert_eq!(
            read_json(&layout.collection_file(Collection::Feedback).unwrap()),
            json!([{"id": "f1", "message": "thanks"}])
        );
        assert!(!layout.collection_file(Collection::Projects).unwrap().exists());
        assert!(layout.db_snapshot().exists());

        let report = reconciler.sync_scoped(&snapshot, &SyncScope::Full).unwrap();
        assert!(report.full);
        assert!(!layout.shard_dir("stale").exists());
    }

    #[test]
    fn test_write_failure_is_returned() {
        let dir = tempdir().unwrap();
        // a file where the data directory should be
        fs::write(dir.path().join("data"), "blocker").unwrap();
        let reconciler = Reconciler::new(DataLayout::new(dir.path(), "data"));

        let err = reconciler.sync(&Collections::default()).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
