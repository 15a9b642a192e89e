use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::api::handlers;
use crate::store::traits::Store;

pub fn create_router<S: Store + 'static>() -> Router<Arc<S>> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Screens
        .route("/plan", get(handlers::get_plan::<S>))
        .route("/shop", get(handlers::get_shop::<S>))
        .route("/items/:item_id", get(handlers::get_item_form::<S>))
        .route("/items/:item_id/history", get(handlers::get_item_history::<S>))
        // Mutations, all form posts carrying an idempotency key
        .route("/items", post(handlers::add_item::<S>))
        .route("/items/:item_id/quantity", post(handlers::set_quantity::<S>))
        .route("/items/:item_id/check", post(handlers::check_item::<S>))
        .route("/items/:item_id/remove", post(handlers::remove_item::<S>))
        .route("/items/:item_id/undo", post(handlers::undo_item::<S>))
        .layer(TraceLayer::new_for_http())
}
