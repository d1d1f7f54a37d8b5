//! PledgeHub Server - REST surface over the collection store
//!
//! Serves the json-server style collection routes the frontend uses and
//! mirrors every successful write to disk through the mutation gate.

pub mod app;
pub mod error;
pub mod gate;
pub mod rest;
pub mod settings;

pub use app::router;
