use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};

use crate::server::{api_key_auth, AppState};

use super::emails::{
    create_email, delete_email, filter_delivery_attempts, filter_emails, send_custom_email,
    send_email, update_email,
};
use super::folders::{create_folder, delete_folder, filter_folders, update_folder};
use super::health::health;
use super::metrics::prometheus_metrics;

pub fn api_routes(state: AppState) -> Router<AppState> {
    let v1 = Router::new()
        // Folders
        .route("/folders", post(create_folder))
        .route("/folders/filter", post(filter_folders))
        .route("/folders/{id}", patch(update_folder).delete(delete_folder))
        // Templates
        .route("/emails", post(create_email))
        .route("/emails/filter", post(filter_emails))
        .route("/emails/{id}", patch(update_email).delete(delete_email))
        // Sending
        .route("/emails/send", post(send_email))
        .route("/emails/send-custom", post(send_custom_email))
        // Delivery log
        .route("/emails/logs/filter", post(filter_delivery_attempts))
        .route_layer(middleware::from_fn_with_state(state, api_key_auth));

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(prometheus_metrics))
        .nest("/api/v1", v1)
}
