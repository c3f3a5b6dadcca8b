//! HTTP server wiring: shared state, middleware and the router.

mod app;
mod middleware;
mod state;

pub use app::create_app;
pub use middleware::{api_key_auth, API_KEY_HEADER};
pub use state::AppState;
