//! On-disk layout
//!
//! Every path the loader and reconciler touch is derived here so the two
//! always agree on where things live.

use pledgehub_common::config::StorageConfig;
use pledgehub_common::{Collection, UNASSIGNED_SHARD};
use std::path::{Path, PathBuf};

/// File name of the merged debug snapshot at the root.
pub const DB_SNAPSHOT_FILE: &str = "db.json";
/// File name of a donation shard inside its project directory.
pub const SHARD_FILE: &str = "donations.json";

/// Longest directory name most filesystems accept (`NAME_MAX`).
pub const MAX_SHARD_NAME_LEN: usize = 255;

const COLLECTIONS_DIR: &str = "collections";
const PROJECTS_DIR: &str = "projects";

/// Resolved paths for one data root
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataLayout {
    root: PathBuf,
    data_dir: PathBuf,
}

impl DataLayout {
    /// Layout rooted at `root`, with shards under `root/<data_dir_name>`.
    pub fn new(root: impl AsRef<Path>, data_dir_name: &str) -> Self {
        let root = root.as_ref().to_path_buf();
        Self {
            data_dir: root.join(data_dir_name),
            root,
        }
    }

    #[must_use]
    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(&config.root, &config.data_dir_name)
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// `db.json` at the root
    #[must_use]
    pub fn db_snapshot(&self) -> PathBuf {
        self.root.join(DB_SNAPSHOT_FILE)
    }

    #[must_use]
    pub fn collections_dir(&self) -> PathBuf {
        self.data_dir.join(COLLECTIONS_DIR)
    }

    /// File holding a flat collection. Donations have no single file.
    #[must_use]
    pub fn collection_file(&self, collection: Collection) -> Option<PathBuf> {
        collection
            .is_flat()
            .then(|| self.collections_dir().join(format!("{collection}.json")))
    }

    #[must_use]
    pub fn projects_dir(&self) -> PathBuf {
        self.data_dir.join(PROJECTS_DIR)
    }

    #[must_use]
    pub fn shard_dir(&self, shard: &str) -> PathBuf {
        self.projects_dir().join(shard)
    }

    #[must_use]
    pub fn shard_file(&self, shard: &str) -> PathBuf {
        self.shard_dir(shard).join(SHARD_FILE)
    }

    #[must_use]
    pub fn unassigned_dir(&self) -> PathBuf {
        self.shard_dir(UNASSIGNED_SHARD)
    }
}

/// Whether a project id can name its own shard directory.
///
/// Ids that would escape `projects/`, collide with the unassigned bucket,
/// or are not representable as a single path component cannot own a shard.
#[must_use]
pub fn is_valid_shard_name(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_SHARD_NAME_LEN
        && id != "."
        && id != ".."
        && id != UNASSIGNED_SHARD
        && !id.contains(['/', '\\', '\0'])
}
