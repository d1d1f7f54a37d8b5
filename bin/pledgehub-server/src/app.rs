//! Router assembly.

use crate::gate::{self, GateState};
use crate::rest::{self, AppState};
use axum::{Router, middleware, routing::get};
use pledgehub_store::{CollectionStore, SyncTrigger};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the application router.
///
/// Every route sits behind the mutation gate, so any successful write
/// reaches `trigger`.
pub fn router(store: CollectionStore, trigger: Arc<dyn SyncTrigger>, scoped_sync: bool) -> Router {
    let state = Arc::new(AppState {
        store,
        sync: Arc::clone(&trigger),
    });
    let gate = GateState {
        trigger,
        scoped: scoped_sync,
    };

    Router::new()
        // Service routes FIRST (must come before the collection wildcard)
        .route("/health", get(rest::health_check))
        .route("/db", get(rest::dump_db))
        // Collection routes
        .route(
            "/{collection}",
            get(rest::list_records).post(rest::create_record),
        )
        .route(
            "/{collection}/{id}",
            get(rest::get_record)
                .put(rest::replace_record)
                .patch(rest::patch_record)
                .delete(rest::delete_record),
        )
        // GET/POST /projects/{id}/donations
        .route(
            "/{collection}/{id}/{nested}",
            get(rest::list_nested).post(rest::create_nested),
        )
        .layer(middleware::from_fn_with_state(gate, gate::mutation_gate))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
