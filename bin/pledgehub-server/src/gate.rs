//! Mutation gate middleware
//!
//! Lets every request through to the router untouched and, once a
//! write-class request (POST/PUT/PATCH/DELETE) has produced a 2xx response,
//! asks the sync trigger to mirror the store to disk. Failed writes never
//! trigger a sync.

use axum::{
    body::Body,
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::Response,
};
use pledgehub_common::Collection;
use pledgehub_store::{SyncScope, SyncTrigger};
use std::sync::Arc;
use tracing::debug;

/// State for [`mutation_gate`]
#[derive(Clone)]
pub struct GateState {
    pub trigger: Arc<dyn SyncTrigger>,
    /// Narrow feedback/admin writes to a flat-only sync
    pub scoped: bool,
}

/// Exact, case-sensitive match against the four write verbs
#[must_use]
pub fn is_write_class(method: &Method) -> bool {
    method == Method::POST
        || method == Method::PUT
        || method == Method::PATCH
        || method == Method::DELETE
}

/// Scope of the sync a write to `path` needs
#[must_use]
pub fn scope_for_path(path: &str, scoped: bool) -> SyncScope {
    path.trim_start_matches('/')
        .split('/')
        .next()
        .and_then(|segment| segment.parse::<Collection>().ok())
        .map_or(SyncScope::Full, |collection| {
            SyncScope::for_collection(collection, scoped)
        })
}

/// Middleware that triggers a disk sync after successful writes
pub async fn mutation_gate(
    State(gate): State<GateState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let scope = is_write_class(request.method())
        .then(|| scope_for_path(request.uri().path(), gate.scoped));

    // The handler has applied the mutation by the time this returns.
    let response = next.run(request).await;

    if let Some(scope) = scope {
        if response.status().is_success() {
            debug!("Write succeeded ({}), requesting sync", response.status());
            gate.trigger.trigger(scope);
        } else {
            debug!("Write failed ({}), skipping sync", response.status());
        }
    }

    response
}
