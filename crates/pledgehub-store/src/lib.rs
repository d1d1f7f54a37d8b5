//! PledgeHub Store - collection store and sharded disk persistence
//!
//! The in-memory [`CollectionStore`] is authoritative while the process
//! runs. After every successful write the [`SyncScheduler`] asks the
//! [`Reconciler`] to re-derive the on-disk layout from a snapshot of it:
//!
//! ```text
//! db.json                                  full merged snapshot
//! data/collections/{projects,feedback,admins}.json
//! data/projects/<projectId>/donations.json
//! data/projects/_unassigned/donations.json
//! ```
//!
//! [`loader::load`] reads that layout back at startup.

pub mod collections;
pub mod layout;
pub mod loader;
pub mod reconciler;
pub mod scheduler;
pub mod scope;

// Re-exports
pub use collections::{CollectionStore, Collections, Snapshot};
pub use layout::DataLayout;
pub use reconciler::{Partition, Reconciler, SyncReport};
pub use scheduler::{SyncScheduler, SyncStatsSnapshot, SyncTrigger};
pub use scope::SyncScope;
