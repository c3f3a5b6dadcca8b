//! API layer - HTTP endpoint handlers organized by resource.

mod emails;
mod folders;
mod health;
mod metrics;
mod routes;
pub mod validation;

use axum::extract::FromRequest;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::error::AppError;

pub use emails::{
    create_email, delete_email, filter_delivery_attempts, filter_emails, send_custom_email,
    send_email, update_email,
};
pub use folders::{create_folder, delete_folder, filter_folders, update_folder};
pub use health::health;
pub use metrics::prometheus_metrics;
pub use routes::api_routes;

/// JSON body extractor whose rejections use the API error format.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// Token cancelled when the handler future is dropped, e.g. on client
/// disconnect. Hold the guard for the whole handler.
pub(crate) fn request_scope() -> (CancellationToken, DropGuard) {
    let token = CancellationToken::new();
    let guard = token.clone().drop_guard();
    (token, guard)
}
